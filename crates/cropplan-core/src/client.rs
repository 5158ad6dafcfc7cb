//! HTTP client for the prediction service's `/chat` endpoint.

use crate::config::Config;
use crate::form::FormData;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/chat";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("response has neither `prediction` nor `reply`")]
    MissingFields,
    #[error("request task ended early: {0}")]
    Aborted(String),
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a FormData>,
}

/// Body returned by the prediction service.
///
/// Two shapes are seen in the wild: `{prediction, details, explanation}` and
/// `{reply}`. Both are accepted; see [`PredictionResponse::bot_message`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(default, deserialize_with = "text_or_number")]
    pub prediction: Option<String>,
    #[serde(default)]
    pub details: serde_json::Value,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

impl PredictionResponse {
    pub fn has_content(&self) -> bool {
        self.prediction.is_some() || self.reply.is_some()
    }

    /// Text shown in the transcript for this response.
    ///
    /// A prediction-shaped body wins over a reply-shaped one when both are present.
    pub fn bot_message(&self) -> String {
        match (&self.prediction, &self.reply) {
            (Some(prediction), _) => {
                let details = serde_json::to_string_pretty(&self.details)
                    .unwrap_or_else(|_| self.details.to_string());
                format!(
                    "**Prediction:** {}\n\n**Details:** {}\n\n**Explanation:** {}",
                    prediction,
                    details,
                    self.explanation.as_deref().unwrap_or_default()
                )
            }
            (None, Some(reply)) => reply.clone(),
            (None, None) => String::new(),
        }
    }
}

// Yield models may answer with a bare number instead of a string.
fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Anything that can answer a prediction query.
#[async_trait]
pub trait PredictionBackend: Send + Sync {
    async fn predict(
        &self,
        query: &str,
        context: Option<&FormData>,
    ) -> Result<PredictionResponse, PredictionError>;
}

#[derive(Clone)]
pub struct PredictionClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    send_context: bool,
}

impl PredictionClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            timeout: DEFAULT_TIMEOUT,
            send_context: false,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.endpoint)
            .with_timeout(config.timeout())
            .with_form_context(config.send_form_context)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Include the form data in the request body as `context`
    pub fn with_form_context(mut self, enabled: bool) -> Self {
        self.send_context = enabled;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn send_prediction_request(
        &self,
        query: &str,
        context: Option<&FormData>,
    ) -> Result<PredictionResponse, PredictionError> {
        let request = PredictionRequest {
            query,
            context: context.filter(|_| self.send_context),
        };

        info!(endpoint = %self.endpoint, with_context = request.context.is_some(), "sending prediction request");

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "prediction service returned an error");
            return Err(PredictionError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| self.classify(e))?;
        let prediction: PredictionResponse = serde_json::from_str(&body)?;
        if !prediction.has_content() {
            return Err(PredictionError::MissingFields);
        }

        info!("prediction received");
        Ok(prediction)
    }

    fn classify(&self, error: reqwest::Error) -> PredictionError {
        if error.is_timeout() {
            warn!(timeout = ?self.timeout, "prediction request timed out");
            PredictionError::Timeout(self.timeout)
        } else {
            warn!(error = %error, "prediction request failed");
            PredictionError::Http(error)
        }
    }
}

#[async_trait]
impl PredictionBackend for PredictionClient {
    async fn predict(
        &self,
        query: &str,
        context: Option<&FormData>,
    ) -> Result<PredictionResponse, PredictionError> {
        self.send_prediction_request(query, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::Crop;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/chat", addr)
    }

    #[test]
    fn test_prediction_shape_formats_all_parts() {
        let response: PredictionResponse = serde_json::from_value(json!({
            "prediction": "12 t/ha",
            "details": {},
            "explanation": "based on soil"
        }))
        .unwrap();

        let text = response.bot_message();
        assert!(text.contains("12 t/ha"));
        assert!(text.contains("{}"));
        assert!(text.contains("based on soil"));
    }

    #[test]
    fn test_reply_shape_is_shown_verbatim() {
        let response: PredictionResponse =
            serde_json::from_value(json!({ "reply": "Sow after the first rains." })).unwrap();
        assert_eq!(response.bot_message(), "Sow after the first rains.");
    }

    #[test]
    fn test_numeric_prediction_accepted() {
        let response: PredictionResponse =
            serde_json::from_value(json!({ "prediction": 2450.5 })).unwrap();
        assert_eq!(response.prediction.as_deref(), Some("2450.5"));
        assert_eq!(response.details, serde_json::Value::Null);
    }

    #[tokio::test]
    async fn test_request_body_is_query_only_by_default() {
        let router = Router::new().route(
            "/chat",
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(json!({ "reply": body.to_string() }))
            }),
        );
        let endpoint = serve(router).await;

        let form = FormData {
            crop: Some(Crop::Paddy),
            ..FormData::default()
        };
        let client = PredictionClient::new(&endpoint);
        let response = client
            .send_prediction_request("Predict yield", Some(&form))
            .await
            .unwrap();

        let echoed: serde_json::Value = serde_json::from_str(response.reply.as_deref().unwrap()).unwrap();
        assert_eq!(echoed, json!({ "query": "Predict yield" }));
    }

    #[tokio::test]
    async fn test_form_context_sent_when_enabled() {
        let router = Router::new().route(
            "/chat",
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(json!({ "reply": body.to_string() }))
            }),
        );
        let endpoint = serve(router).await;

        let form = FormData {
            crop: Some(Crop::Millets),
            ..FormData::default()
        };
        let client = PredictionClient::new(&endpoint).with_form_context(true);
        let response = client.send_prediction_request("q", Some(&form)).await.unwrap();

        let echoed: serde_json::Value = serde_json::from_str(response.reply.as_deref().unwrap()).unwrap();
        assert_eq!(echoed["context"]["crop"], "Millets");
        assert_eq!(echoed["context"]["district"], "Kadapa");
    }

    #[tokio::test]
    async fn test_server_error_status() {
        let router = Router::new().route(
            "/chat",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let endpoint = serve(router).await;

        let err = PredictionClient::new(&endpoint)
            .send_prediction_request("q", None)
            .await
            .unwrap_err();
        match err {
            PredictionError::Server { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_body_without_known_fields() {
        let router = Router::new().route("/chat", post(|| async { Json(json!({ "status": "ok" })) }));
        let endpoint = serve(router).await;

        let err = PredictionClient::new(&endpoint)
            .send_prediction_request("q", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::MissingFields));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let router = Router::new().route(
            "/chat",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "reply": "late" }))
            }),
        );
        let endpoint = serve(router).await;

        let err = PredictionClient::new(&endpoint)
            .with_timeout(Duration::from_millis(100))
            .send_prediction_request("q", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = PredictionClient::new(&format!("http://{}/chat", addr))
            .send_prediction_request("q", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PredictionError::Http(_)));
    }
}
