use chrono::Utc;
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Gauge, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, NotificationLevel};
use growcab_core::plants::Band;
use growcab_core::ChatRole;

const TEMP_SCALE_MAX: f64 = 50.0;
const SPINNER: [&str; 4] = ["⠋", "⠙", "⠸", "⠴"];

/// Render `**bold**` runs; an unbalanced marker is kept literally.
fn markdown_line(text: &str) -> Line<'static> {
    let parts: Vec<&str> = text.split("**").collect();
    if parts.len() % 2 == 0 {
        return Line::raw(text.to_string());
    }
    let spans: Vec<Span<'static>> = parts
        .into_iter()
        .enumerate()
        .filter(|(_, part)| !part.is_empty())
        .map(|(i, part)| {
            if i % 2 == 1 {
                Span::styled(part.to_string(), Style::default().add_modifier(Modifier::BOLD))
            } else {
                Span::raw(part.to_string())
            }
        })
        .collect();
    Line::from(spans)
}

fn band_color(band: Option<Band>) -> Color {
    match band {
        Some(Band::Ideal) => Color::Green,
        Some(Band::Low) => Color::Cyan,
        Some(Band::High) => Color::Red,
        None => Color::DarkGray,
    }
}

fn format_age(seconds: i64) -> String {
    match seconds {
        s if s < 60 => format!("{}s", s.max(0)),
        s if s < 3600 => format!("{}m", s / 60),
        s => format!("{}h", s / 3600),
    }
}

/// Lines the chat can scroll before its top line reaches the top of the pane.
fn max_scroll(total_lines: usize, view_height: u16) -> u16 {
    u16::try_from(total_lines)
        .unwrap_or(u16::MAX)
        .saturating_sub(view_height)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let [header_area, gauges_area, status_area, body_area, input_area, footer_area] =
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(frame.area());

    render_header(app, frame, header_area);
    render_gauges(app, frame, gauges_area);
    render_status(app, frame, status_area);

    let [profile_area, chat_area] =
        Layout::horizontal([Constraint::Percentage(35), Constraint::Percentage(65)]).areas(body_area);
    render_profile(app, frame, profile_area);
    render_chat(app, frame, chat_area);

    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let plant = app.selected_plant();
    let line = Line::from(vec![
        Span::styled(" 🌱 GROW CABINET ", Style::default().fg(Color::Green).bold()),
        Span::raw("│ "),
        Span::styled(plant.common_name, Style::default().fg(Color::Yellow)),
        Span::styled(format!("  {}", app.poller.endpoint()), Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn render_gauges(app: &App, frame: &mut Frame, area: Rect) {
    let [temp_area, humidity_area] =
        Layout::horizontal([Constraint::Percentage(50), Constraint::Percentage(50)]).areas(area);

    let reading = app.sensor.data.as_ref().filter(|d| d.ok);
    let assessment = reading.map(|d| app.selected_plant().assess(d));

    let temp = reading.and_then(|d| d.temp_c);
    let temp_gauge = Gauge::default()
        .block(Block::bordered().title(" TEMPERATURE "))
        .gauge_style(Style::default().fg(band_color(assessment.and_then(|a| a.temperature))))
        .ratio(temp.map(|t| (t / TEMP_SCALE_MAX).clamp(0.0, 1.0)).unwrap_or(0.0))
        .label(temp.map(|t| format!("{t:.1} °C")).unwrap_or_else(|| "--".to_string()));
    frame.render_widget(temp_gauge, temp_area);

    let humidity = reading.and_then(|d| d.humidity_percent);
    let humidity_gauge = Gauge::default()
        .block(Block::bordered().title(" HUMIDITY "))
        .gauge_style(Style::default().fg(band_color(assessment.and_then(|a| a.humidity))))
        .ratio(humidity.map(|h| (h / 100.0).clamp(0.0, 1.0)).unwrap_or(0.0))
        .label(humidity.map(|h| format!("{h:.1} %")).unwrap_or_else(|| "--".to_string()));
    frame.render_widget(humidity_gauge, humidity_area);
}

fn render_status(app: &App, frame: &mut Frame, area: Rect) {
    let sensor = &app.sensor;
    let mut spans = Vec::new();

    if let Some(error) = &sensor.error {
        spans.push(Span::styled(format!(" ⚠ {error}"), Style::default().fg(Color::Red)));
    } else if sensor.data.is_none() && sensor.is_loading {
        spans.push(Span::styled(
            format!(" {} Connecting to sensor", SPINNER[app.animation_frame as usize]),
            Style::default().fg(Color::Yellow),
        ));
    } else if sensor.last_success_at.is_some() {
        spans.push(Span::styled(" ● LIVE", Style::default().fg(Color::Green)));
    } else {
        spans.push(Span::styled(" ○ No reading yet", Style::default().fg(Color::DarkGray)));
    }

    if let Some(at) = sensor.last_success_at {
        let age = (Utc::now() - at).num_seconds();
        spans.push(Span::styled(
            format!(" · last success {} ago", format_age(age)),
            Style::default().fg(Color::DarkGray),
        ));
    }
    spans.push(Span::styled(
        format!(" · refresh {:.1}s", app.settings.refresh.as_secs_f64()),
        Style::default().fg(Color::DarkGray),
    ));

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_profile(app: &App, frame: &mut Frame, area: Rect) {
    let plant = app.selected_plant();
    let sp = &plant.setpoints;
    let label = Style::default().fg(Color::DarkGray);

    let mut lines = vec![
        Line::styled(plant.common_name, Style::default().fg(Color::Yellow).bold()),
        Line::styled(format!("{} / {}", plant.name_ms, plant.name_zh), label),
        Line::styled(plant.latin_name, label.add_modifier(Modifier::ITALIC)),
        Line::raw(""),
        Line::from(vec![Span::styled("Type     ", label), Span::raw(plant.category.as_str())]),
        Line::from(vec![Span::styled("Fit      ", label), Span::raw(plant.cabinet_fit.as_str())]),
        Line::from(vec![Span::styled("Cycle    ", label), Span::raw(format!("{} days", plant.cycle_days))]),
        Line::from(vec![
            Span::styled("Air      ", label),
            Span::raw(format!(
                "{}–{} °C (min {}, max {})",
                sp.air_temp_ideal.0, sp.air_temp_ideal.1, sp.air_temp_min, sp.air_temp_max
            )),
        ]),
        Line::from(vec![
            Span::styled("Humidity ", label),
            Span::raw(format!("{}–{} %", sp.humidity_ideal.0, sp.humidity_ideal.1)),
        ]),
        Line::from(vec![
            Span::styled("pH       ", label),
            Span::raw(format!("{}–{}", sp.ph_ideal.0, sp.ph_ideal.1)),
        ]),
        Line::from(vec![
            Span::styled("Moisture ", label),
            Span::raw(format!("{}–{} %", sp.moisture_target.0, sp.moisture_target.1)),
        ]),
        Line::styled(format!("         {}", sp.moisture_hint), label),
        Line::raw(""),
        Line::raw(plant.notes),
    ];

    if let Some(temp) = app.sensor.data.as_ref().filter(|d| d.ok).and_then(|d| d.temp_c) {
        if plant.is_temperature_critical(temp) {
            lines.push(Line::raw(""));
            lines.push(Line::styled(
                format!("{temp:.1} °C is outside what {} tolerates", plant.common_name),
                Style::default().fg(Color::Red).bold(),
            ));
        }
    }

    if let Some(detected) = &app.detected_plant {
        lines.push(Line::raw(""));
        lines.push(Line::from(vec![
            Span::styled("Mentioned: ", label),
            Span::styled(detected.clone(), Style::default().fg(Color::Magenta)),
        ]));
    }

    let profile = Paragraph::new(lines)
        .block(Block::bordered().title(" PLANT PROFILE "))
        .wrap(Wrap { trim: true });
    frame.render_widget(profile, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();

    for message in app.conversation.messages() {
        let (label, color) = match message.role {
            ChatRole::User => ("You", Color::Cyan),
            ChatRole::Assistant => ("Grow", Color::Green),
            ChatRole::System => ("System", Color::DarkGray),
        };
        lines.push(Line::styled(format!("{label}:"), Style::default().fg(color).bold()));
        lines.extend(message.content.lines().map(markdown_line));
        lines.push(Line::raw(""));
    }

    let waiting = app.is_streaming()
        && app.conversation.last().map(|m| m.role) != Some(ChatRole::Assistant);
    if waiting {
        let dots = ".".repeat(app.animation_frame as usize % 3 + 1);
        lines.push(Line::styled(format!("Grow is thinking{dots}"), Style::default().fg(Color::DarkGray)));
    }

    // Estimate wrapped height to keep the newest text in view
    let inner_width = area.width.saturating_sub(2).max(1) as usize;
    let inner_height = area.height.saturating_sub(2);
    let total: usize = lines
        .iter()
        .map(|line| line.width().div_ceil(inner_width).max(1))
        .sum();
    let max_offset = max_scroll(total, inner_height);
    app.chat_scroll = app.chat_scroll.min(max_offset);
    let offset = max_offset - app.chat_scroll;

    let title = if app.is_streaming() {
        format!(" ASSISTANT {} ", SPINNER[app.animation_frame as usize])
    } else {
        " ASSISTANT ".to_string()
    };

    let chat = Paragraph::new(lines)
        .block(Block::bordered().title(title))
        .wrap(Wrap { trim: false })
        .scroll((offset, 0));
    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let title = if app.is_streaming() { " Esc to stop " } else { " Ask the grow assistant " };
    let input = Paragraph::new(app.input.as_str()).block(Block::bordered().title(title));
    frame.render_widget(input, area);

    let cursor_x = area.x + 1 + app.input_cursor as u16;
    frame.set_cursor_position((cursor_x.min(area.right().saturating_sub(2)), area.y + 1));
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let line = match &app.notification {
        Some(notification) => {
            let color = match notification.level {
                NotificationLevel::Info => Color::Yellow,
                NotificationLevel::Error => Color::Red,
            };
            Line::styled(format!(" {}", notification.message), Style::default().fg(color))
        }
        None => Line::styled(
            " Enter send · Esc stop · Tab/Shift-Tab plant · Ctrl-R refresh · PgUp/PgDn scroll · Ctrl-C quit",
            Style::default().fg(Color::DarkGray),
        ),
    };
    frame.render_widget(Paragraph::new(line), area);
}
