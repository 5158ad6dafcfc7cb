use chrono::Local;
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Wrap},
};
use cropplan_core::form::{districts_for_state, states};
use cropplan_core::steps::{step_title, TOTAL_STEPS};
use cropplan_core::{Crop, FarmingType, Sender};
use crate::app::{App, InputMode, RegionFocus, SoilRow};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            chars.next();

            if !current_text.is_empty() {
                spans.push(Span::raw(std::mem::take(&mut current_text)));
            }

            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                spans.push(Span::styled(bold_text, Style::default().add_modifier(Modifier::BOLD)));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    Line::from(spans)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, progress_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_progress(app, frame, progress_area);

    let step = app.current_step();
    let body_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", step_title(step)));
    let inner = body_block.inner(body_area);
    frame.render_widget(body_block, body_area);

    match step {
        1 => render_crop_step(&mut app.crop_state, app.session.form().crop, frame, inner, "Choose a crop"),
        2 => render_farming_step(app, frame, inner),
        3 => render_region_step(app, frame, inner),
        4 => render_previous_crop_step(app, frame, inner),
        5 => render_soil_step(app, frame, inner),
        _ => render_chat_step(app, frame, inner),
    }

    render_footer(app, frame, footer_area);

    if let Some(toast) = &app.toast {
        render_toast(&toast.notice.title, &toast.notice.description, frame, body_area);
    }
    if app.show_help {
        render_help(frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Crop Prediction Form ", Style::default().fg(Color::Green).bold()),
        Span::styled(
            format!("Step {} of {} ", app.current_step(), TOTAL_STEPS),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_progress(app: &App, frame: &mut Frame, area: Rect) {
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
        .ratio(app.session.steps().progress())
        .label("");
    frame.render_widget(gauge, area);
}

/// Pick-one list where the chosen value carries a check mark
fn option_list<'a>(labels: Vec<(String, bool)>, title: &'a str, focused: bool) -> List<'a> {
    let items: Vec<ListItem> = labels
        .into_iter()
        .map(|(label, chosen)| {
            let marker = if chosen { "(x) " } else { "( ) " };
            let style = if chosen {
                Style::default().fg(Color::Green)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![Span::styled(marker, style), Span::styled(label, style)]))
        })
        .collect();

    let border = if focused { Color::Cyan } else { Color::DarkGray };
    List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(format!(" {} ", title)),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ")
}

fn render_crop_step(state: &mut ListState, chosen: Option<Crop>, frame: &mut Frame, area: Rect, title: &str) {
    let labels = Crop::all()
        .into_iter()
        .map(|crop| (crop.to_string(), chosen == Some(crop)))
        .collect();
    let [list_area] = Layout::vertical([Constraint::Length(5)]).areas(area);
    frame.render_stateful_widget(option_list(labels, title, true), list_area, state);
}

fn render_farming_step(app: &mut App, frame: &mut Frame, area: Rect) {
    let chosen = app.session.form().farming_type;
    let labels = FarmingType::all()
        .into_iter()
        .map(|kind| (kind.display_name().to_string(), chosen == Some(kind)))
        .collect();
    let [list_area] = Layout::vertical([Constraint::Length(4)]).areas(area);
    frame.render_stateful_widget(option_list(labels, "Farming type", true), list_area, &mut app.farming_state);
}

fn render_region_step(app: &mut App, frame: &mut Frame, area: Rect) {
    let [state_area, district_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(area);

    let form = app.session.form();
    let state_labels = states()
        .into_iter()
        .map(|s| (s.to_string(), s == form.state))
        .collect();
    let district_labels = districts_for_state(&form.state)
        .into_iter()
        .map(|d| (d.to_string(), d == form.district))
        .collect();

    let state_list = option_list(state_labels, "State", app.region_focus == RegionFocus::State);
    let district_list = option_list(district_labels, "District", app.region_focus == RegionFocus::District);

    frame.render_stateful_widget(state_list, state_area, &mut app.state_state);
    frame.render_stateful_widget(district_list, district_area, &mut app.district_state);
}

fn render_previous_crop_step(app: &mut App, frame: &mut Frame, area: Rect) {
    let [list_area, warning_area] =
        Layout::vertical([Constraint::Length(5), Constraint::Min(0)]).areas(area);

    render_crop_step(
        &mut app.previous_crop_state,
        app.session.form().previous_crop,
        frame,
        list_area,
        "Choose previous crop",
    );

    if app.session.show_warning() {
        let text = Text::from(vec![
            Line::from(Span::styled(
                "Crop rotation is recommended.",
                Style::default().fg(Color::Yellow).bold(),
            )),
            Line::from(
                "Growing the same crop repeatedly reduces soil nutrients and increases pest risks. \
                 Do you still want to continue with the same crop?",
            ),
            Line::default(),
            Line::from(vec![
                Span::styled(" c ", Style::default().bg(Color::DarkGray).fg(Color::White)),
                Span::raw(" Continue   "),
                Span::styled(" r ", Style::default().bg(Color::DarkGray).fg(Color::White)),
                Span::raw(" Start Planning Again"),
            ]),
        ]);

        let warning = Paragraph::new(text)
            .wrap(Wrap { trim: true })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Yellow))
                    .title(" Warning "),
            );
        frame.render_widget(warning, warning_area);
    }
}

fn render_soil_step(app: &mut App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let selected = app.selected_soil_row();
    let soil = app.session.form().soil_parameters.clone().unwrap_or_default();

    let items: Vec<ListItem> = SoilRow::all()
        .into_iter()
        .map(|row| {
            let value = match row {
                SoilRow::Reading(field) => soil.get(field).to_string(),
                SoilRow::TestFile => app.soil_test_file_input.clone(),
            };

            let value_span = if editing && row == selected {
                Span::styled(with_cursor(&value, app.cursor), Style::default().fg(Color::Yellow))
            } else if value.is_empty() {
                Span::styled(row.placeholder(), Style::default().fg(Color::DarkGray))
            } else {
                Span::raw(value)
            };

            ListItem::new(Line::from(vec![
                Span::styled(format!("{:<16}", row.label()), Style::default().bold()),
                value_span,
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(if editing { Color::Yellow } else { Color::Cyan }))
                .title(" Soil readings (all optional) "),
        )
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut app.soil_state);
}

/// Insert a block cursor at a character position
fn with_cursor(text: &str, cursor: usize) -> String {
    let mut out: String = text.chars().take(cursor).collect();
    out.push('▏');
    out.extend(text.chars().skip(cursor));
    out
}

fn render_chat_step(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_column, side_column] =
        Layout::horizontal([Constraint::Percentage(65), Constraint::Percentage(35)]).areas(area);
    let [chat_area, input_area] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(4)]).areas(chat_column);

    // Keep scroll calculations in step with the real widget size
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let session = &app.session;
    let chat_text = if session.transcript().is_empty() && !session.is_loading() {
        Text::from(vec![
            Line::from(Span::styled(
                "Ask me anything about your crop planning!",
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(Span::styled(
                "You can type your question or use the microphone to speak.",
                Style::default().fg(Color::DarkGray),
            )),
        ])
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for msg in session.transcript().messages() {
            let stamp = msg.timestamp.with_timezone(&Local).format("%H:%M").to_string();
            match msg.sender {
                Sender::User => {
                    lines.push(Line::from(vec![
                        Span::styled("You:", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
                        Span::styled(format!(" {}", stamp), Style::default().fg(Color::DarkGray)),
                    ]));
                    for line in msg.content.lines() {
                        lines.push(Line::from(line.to_string()));
                    }
                }
                Sender::Bot => {
                    lines.push(Line::from(vec![
                        Span::styled("CropBot:", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
                        Span::styled(format!(" {}", stamp), Style::default().fg(Color::DarkGray)),
                    ]));
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
            }
            lines.push(Line::default());
        }

        if session.is_loading() {
            lines.push(Line::from(Span::styled(
                "CropBot:",
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
            )));
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(chat_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(format!(" CropBot: {} ", app.client.endpoint())),
        )
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));
    frame.render_widget(chat, chat_area);

    render_chat_input(app, frame, input_area);
    render_side_panel(app, frame, side_column);
}

fn render_chat_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let input = &app.session.chat_input;

    let (text, style) = if editing {
        (with_cursor(input, app.cursor), Style::default().fg(Color::Yellow))
    } else if input.is_empty() {
        (
            "Ask about yield predictions, farming suggestions, or any crop-related questions...".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        (input.clone(), Style::default())
    };

    let title = if app.session.is_recording() {
        " Recording... press m to stop ".to_string()
    } else if app.session.is_loading() {
        " Waiting for prediction ".to_string()
    } else {
        " Message ".to_string()
    };
    let border = if app.session.is_recording() {
        Color::Red
    } else if editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let paragraph = Paragraph::new(text)
        .style(style)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(title),
        );
    frame.render_widget(paragraph, area);
}

fn render_side_panel(app: &App, frame: &mut Frame, area: Rect) {
    let [review_area, result_area] =
        Layout::vertical([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(area);

    let form = app.session.form();
    let mut review_lines: Vec<Line> = form
        .summary_lines()
        .into_iter()
        .map(|(label, value)| {
            Line::from(vec![
                Span::styled(format!("{}: ", label), Style::default().bold()),
                Span::raw(value),
            ])
        })
        .collect();
    if let Some(crop) = form.crop {
        review_lines.insert(
            0,
            Line::from(Span::styled(
                format!("{} farming in {}, {}", crop, form.district, form.state),
                Style::default().fg(Color::Green),
            )),
        );
        review_lines.insert(1, Line::default());
    }

    let review = Paragraph::new(review_lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Your Information "));
    frame.render_widget(review, review_area);

    let result_text = if app.session.is_direct_pending() {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        Text::from(Span::styled(format!("Fetching{}", dots), Style::default().fg(Color::DarkGray)))
    } else if let Some(result) = app.session.direct_result() {
        Text::from(result.bot_message().lines().map(parse_markdown_line).collect::<Vec<_>>())
    } else {
        Text::from(Span::styled(
            "Press d to query the backend directly with the form data.",
            Style::default().fg(Color::DarkGray),
        ))
    };

    let result = Paragraph::new(result_text)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(" Backend Result "));
    frame.render_widget(result, result_area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let disabled_style = Style::default().bg(Color::Black).fg(Color::DarkGray);

    let hint = |key: &'static str, label: &'static str| {
        vec![
            Span::styled(format!(" {} ", key), key_style),
            Span::styled(format!(" {} ", label), label_style),
        ]
    };

    let mut hints: Vec<Span> = Vec::new();
    let step = app.current_step();

    if app.session.show_warning() {
        hints.extend(hint("c", "continue"));
        hints.extend(hint("r", "start again"));
        hints.extend(hint("p", "previous"));
    } else if app.input_mode == InputMode::Editing {
        if step == TOTAL_STEPS {
            hints.extend(hint("Enter", "send"));
            hints.extend(hint("S-Enter", "newline"));
        } else {
            hints.extend(hint("Enter", "done"));
        }
        hints.extend(hint("Esc", "stop editing"));
    } else if step == TOTAL_STEPS {
        hints.extend(hint("i", "type"));
        hints.extend(hint("s", "start planning"));
        hints.extend(hint("d", "direct submit"));
        hints.extend(hint("m", "mic"));
        hints.extend(hint("j/k", "scroll"));
        hints.extend(hint("p", "previous"));
    } else {
        hints.extend(hint("j/k", "move"));
        hints.extend(hint("Enter", if step == 5 { "edit" } else { "select" }));
        if step == 3 {
            hints.extend(hint("Tab", "state/district"));
        }
        if step > 1 {
            hints.extend(hint("p", "previous"));
        }
        // Next is greyed out until the step is complete
        hints.push(Span::styled(" n ", key_style));
        hints.push(Span::styled(
            " next ",
            if app.session.can_advance() { label_style } else { disabled_style },
        ));
    }

    if app.input_mode == InputMode::Normal {
        hints.extend(hint("?", "help"));
        hints.extend(hint("q", "quit"));
    }

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

fn render_toast(title: &str, description: &str, frame: &mut Frame, area: Rect) {
    let width = (description.chars().count() as u16 + 4).clamp(24, area.width.max(24));
    let toast_area = Rect {
        x: area.x + area.width.saturating_sub(width + 1),
        y: area.y + 1,
        width: width.min(area.width),
        height: 3.min(area.height),
    };

    let toast = Paragraph::new(description.to_string())
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red))
                .title(format!(" {} ", title)),
        );
    frame.render_widget(Clear, toast_area);
    frame.render_widget(toast, toast_area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(Span::styled("Crop planning", Style::default().bold())),
        Line::from("Work through the six steps: crop, farming type, region,"),
        Line::from("previous crop, optional soil readings, then ask CropBot."),
        Line::default(),
        Line::from("j/k      move through options"),
        Line::from("Enter    select option / edit field"),
        Line::from("n / p    next / previous step"),
        Line::from("Tab      switch state and district lists"),
        Line::from("s        start planning with the form data"),
        Line::from("d        direct backend submit"),
        Line::from("m        voice input (when a microphone is available)"),
        Line::from("Ctrl-C   quit"),
        Line::default(),
        Line::from(Span::styled("Esc to close", Style::default().fg(Color::DarkGray))),
    ];

    let width = 62.min(area.width);
    let height = (lines.len() as u16 + 2).min(area.height);
    let popup = Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    };

    frame.render_widget(Clear, popup);
    frame.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Help "),
        ),
        popup,
    );
}
