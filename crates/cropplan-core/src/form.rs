//! Crop-planning form data
//!
//! Everything the six form steps collect lives in [`FormData`]. Enum fields
//! start unset (`None`) and are filled in as the user makes selections.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_STATE: &str = "Andhra Pradesh";
pub const DEFAULT_DISTRICT: &str = "Kadapa";

/// States and their districts offered in the region step
pub const REGIONS: &[(&str, &[&str])] = &[(
    "Andhra Pradesh",
    &["Kadapa", "Visakhapatnam", "Vijayawada", "Guntur", "Nellore"],
)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crop {
    Paddy,
    Groundnut,
    Millets,
}

impl Crop {
    pub fn all() -> Vec<Crop> {
        vec![Crop::Paddy, Crop::Groundnut, Crop::Millets]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Crop::Paddy => "Paddy",
            Crop::Groundnut => "Groundnut",
            Crop::Millets => "Millets",
        }
    }

}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FarmingType {
    Organic,
    Inorganic,
}

impl FarmingType {
    pub fn all() -> Vec<FarmingType> {
        vec![FarmingType::Organic, FarmingType::Inorganic]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            FarmingType::Organic => "Organic",
            FarmingType::Inorganic => "Inorganic",
        }
    }
}

/// Optional soil health readings, kept as the free-form text the user typed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoilParameters {
    pub ph: String,
    pub nitrogen: String,
    pub phosphorus: String,
    pub potassium: String,
    pub organic_matter: String,
}

/// Identifies one soil reading so the UI can edit fields generically
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoilField {
    Ph,
    Nitrogen,
    Phosphorus,
    Potassium,
    OrganicMatter,
}

impl SoilField {
    pub fn all() -> Vec<SoilField> {
        vec![
            SoilField::Ph,
            SoilField::Nitrogen,
            SoilField::Phosphorus,
            SoilField::Potassium,
            SoilField::OrganicMatter,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            SoilField::Ph => "pH Level",
            SoilField::Nitrogen => "Nitrogen (N)",
            SoilField::Phosphorus => "Phosphorus (P)",
            SoilField::Potassium => "Potassium (K)",
            SoilField::OrganicMatter => "Organic Matter",
        }
    }

    pub fn placeholder(&self) -> &'static str {
        match self {
            SoilField::Ph => "e.g., 6.5",
            SoilField::Nitrogen => "e.g., 120 kg/ha",
            SoilField::Phosphorus => "e.g., 30 kg/ha",
            SoilField::Potassium => "e.g., 40 kg/ha",
            SoilField::OrganicMatter => "e.g., 0.8 %",
        }
    }
}

impl SoilParameters {
    pub fn get(&self, field: SoilField) -> &str {
        match field {
            SoilField::Ph => &self.ph,
            SoilField::Nitrogen => &self.nitrogen,
            SoilField::Phosphorus => &self.phosphorus,
            SoilField::Potassium => &self.potassium,
            SoilField::OrganicMatter => &self.organic_matter,
        }
    }

    pub fn get_mut(&mut self, field: SoilField) -> &mut String {
        match field {
            SoilField::Ph => &mut self.ph,
            SoilField::Nitrogen => &mut self.nitrogen,
            SoilField::Phosphorus => &mut self.phosphorus,
            SoilField::Potassium => &mut self.potassium,
            SoilField::OrganicMatter => &mut self.organic_matter,
        }
    }

    pub fn is_empty(&self) -> bool {
        SoilField::all().iter().all(|f| self.get(*f).trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormData {
    pub crop: Option<Crop>,
    pub farming_type: Option<FarmingType>,
    pub state: String,
    pub district: String,
    pub previous_crop: Option<Crop>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soil_parameters: Option<SoilParameters>,
    #[serde(skip)]
    pub soil_test_file: Option<PathBuf>,
}

impl Default for FormData {
    fn default() -> Self {
        Self {
            crop: None,
            farming_type: None,
            state: DEFAULT_STATE.to_string(),
            district: DEFAULT_DISTRICT.to_string(),
            previous_crop: None,
            soil_parameters: None,
            soil_test_file: None,
        }
    }
}

impl FormData {
    /// Switch state, keeping the district only if it belongs to the new state
    pub fn set_state(&mut self, state: &str) {
        self.state = state.to_string();
        let districts = districts_for_state(state);
        if !districts.contains(&self.district.as_str()) {
            self.district = districts.first().map(|d| d.to_string()).unwrap_or_default();
        }
    }

    pub fn set_district(&mut self, district: &str) {
        self.district = district.to_string();
    }

    /// Soil readings, created on first edit
    pub fn soil_mut(&mut self) -> &mut SoilParameters {
        self.soil_parameters.get_or_insert_with(SoilParameters::default)
    }

    /// True when the crop being planned is the same as last season's
    pub fn repeats_previous_crop(&self) -> bool {
        matches!((self.crop, self.previous_crop), (Some(a), Some(b)) if a == b)
    }

    /// Query used by the direct submit path
    pub fn direct_query(&self) -> String {
        let crop = self
            .crop
            .map(|c| c.as_str().to_lowercase())
            .unwrap_or_else(|| "groundnut".to_string());
        format!("Predict {} yield in {}", crop, self.district)
    }

    /// Human-readable review of the collected inputs
    pub fn summary_lines(&self) -> Vec<(&'static str, String)> {
        let unset = || "-".to_string();
        let mut lines = vec![
            ("Crop", self.crop.map(|c| c.to_string()).unwrap_or_else(unset)),
            (
                "Farming Type",
                self.farming_type
                    .map(|t| t.display_name().to_string())
                    .unwrap_or_else(unset),
            ),
            ("Region", format!("{}, {}", self.district, self.state)),
            (
                "Previous Crop",
                self.previous_crop.map(|c| c.to_string()).unwrap_or_else(unset),
            ),
        ];

        if let Some(soil) = self.soil_parameters.as_ref().filter(|s| !s.is_empty()) {
            for field in SoilField::all() {
                let value = soil.get(field).trim();
                if !value.is_empty() {
                    lines.push((field.label(), value.to_string()));
                }
            }
        }

        if let Some(path) = &self.soil_test_file {
            lines.push(("Soil Test File", path.display().to_string()));
        }

        lines
    }
}

pub fn states() -> Vec<&'static str> {
    REGIONS.iter().map(|(state, _)| *state).collect()
}

pub fn districts_for_state(state: &str) -> Vec<&'static str> {
    REGIONS
        .iter()
        .find(|(s, _)| *s == state)
        .map(|(_, districts)| districts.to_vec())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fresh_session() {
        let form = FormData::default();
        assert_eq!(form.crop, None);
        assert_eq!(form.farming_type, None);
        assert_eq!(form.state, "Andhra Pradesh");
        assert_eq!(form.district, "Kadapa");
        assert_eq!(form.previous_crop, None);
        assert!(form.soil_parameters.is_none());
    }

    #[test]
    fn test_repeats_previous_crop_requires_both() {
        let mut form = FormData::default();
        form.crop = Some(Crop::Paddy);
        assert!(!form.repeats_previous_crop());

        form.previous_crop = Some(Crop::Groundnut);
        assert!(!form.repeats_previous_crop());

        form.previous_crop = Some(Crop::Paddy);
        assert!(form.repeats_previous_crop());
    }

    #[test]
    fn test_set_state_resets_foreign_district() {
        let mut form = FormData::default();
        form.set_district("Guntur");
        form.set_state("Andhra Pradesh");
        assert_eq!(form.district, "Guntur");

        form.set_state("Telangana");
        assert_eq!(form.state, "Telangana");
        assert_eq!(form.district, "");
    }

    #[test]
    fn test_direct_query_uses_form() {
        let mut form = FormData::default();
        assert_eq!(form.direct_query(), "Predict groundnut yield in Kadapa");

        form.crop = Some(Crop::Millets);
        form.set_district("Nellore");
        assert_eq!(form.direct_query(), "Predict millets yield in Nellore");
    }

    #[test]
    fn test_context_uses_camel_case_keys() {
        let mut form = FormData::default();
        form.crop = Some(Crop::Paddy);
        form.farming_type = Some(FarmingType::Organic);
        form.previous_crop = Some(Crop::Groundnut);
        form.soil_mut().organic_matter = "0.8".to_string();

        let json = serde_json::to_value(&form).unwrap();
        assert_eq!(json["farmingType"], "organic");
        assert_eq!(json["previousCrop"], "Groundnut");
        assert_eq!(json["soilParameters"]["organicMatter"], "0.8");
        assert!(json.get("farming_type").is_none());
        assert!(json.get("soilTestFile").is_none());
    }

    #[test]
    fn test_summary_skips_empty_soil_readings() {
        let mut form = FormData::default();
        form.crop = Some(Crop::Paddy);
        form.soil_mut().ph = "6.5".to_string();

        let lines = form.summary_lines();
        assert!(lines.contains(&("Crop", "Paddy".to_string())));
        assert!(lines.contains(&("pH Level", "6.5".to_string())));
        assert!(!lines.iter().any(|(label, _)| *label == "Nitrogen (N)"));
    }

    #[test]
    fn test_farming_type_serializes_lowercase() {
        let json = serde_json::to_string(&FarmingType::Inorganic).unwrap();
        assert_eq!(json, "\"inorganic\"");
    }
}
