//! Segment list screen rendering
//!
//! Renders each booking segment as a card with its id, route codes and,
//! when known, the city pair.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::App;
use bookings::data::Segment;

/// Message shown when the dataset has no segments
pub const EMPTY_MESSAGE: &str = "No booking segments found";

/// Text lines for one segment: title, route, and the city pair if present
pub fn segment_lines(segment: &Segment) -> Vec<String> {
    let mut lines = vec![
        segment.title(),
        segment.route_label(),
    ];
    if let Some(cities) = segment.city_label() {
        lines.push(cities);
    }
    lines
}

/// Renders the segment list screen
///
/// # Arguments
/// * `frame` - The ratatui Frame to render to
/// * `app` - Application state holding the selection
/// * `segments` - Segments to show
pub fn render(frame: &mut Frame, app: &App, segments: &[Segment]) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2), // Header
            Constraint::Min(3),    // Segment list
            Constraint::Length(1), // Help text
        ])
        .split(area);

    render_header(frame, chunks[0], segments.len());
    render_list(frame, chunks[1], app, segments);
    render_help(frame, chunks[2], app);
}

fn render_header(frame: &mut Frame, area: Rect, count: usize) {
    let separator = "─".repeat((area.width as usize).saturating_sub(2));
    let lines = vec![
        Line::from(vec![
            Span::styled(
                "Booking Information",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(
                format!("{} segment{}", count, if count == 1 { "" } else { "s" }),
                Style::default().fg(Color::Gray),
            ),
        ]),
        Line::from(Span::styled(
            separator,
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(Paragraph::new(lines), area);
}

fn render_list(frame: &mut Frame, area: Rect, app: &App, segments: &[Segment]) {
    let block = Block::default().borders(Borders::ALL);

    if segments.is_empty() {
        let empty = Paragraph::new(Span::styled(
            EMPTY_MESSAGE,
            Style::default().fg(Color::DarkGray),
        ))
        .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    for (index, segment) in segments.iter().enumerate() {
        let is_selected = index == app.selected_index;
        let cursor = if is_selected { "\u{25B8} " } else { "  " }; // ▸ or space

        let title_style = if is_selected {
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::BOLD)
        };

        let mut text = segment_lines(segment).into_iter();
        if let Some(title) = text.next() {
            lines.push(Line::from(vec![
                Span::raw(cursor),
                Span::styled(title, title_style),
            ]));
        }
        if let Some(route) = text.next() {
            lines.push(Line::from(Span::styled(
                format!("    {}", route),
                Style::default().fg(Color::Gray),
            )));
        }
        for cities in text {
            lines.push(Line::from(Span::styled(
                format!("    {}", cities),
                Style::default().fg(Color::DarkGray),
            )));
        }
        lines.push(Line::from(""));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_help(frame: &mut Frame, area: Rect, app: &App) {
    let mut spans = vec![Span::styled(
        "↑/k ↓/j move  r refresh  q quit",
        Style::default().fg(Color::DarkGray),
    )];

    if let Some(error) = &app.refresh_error {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("Background refresh failed: {}", error),
            Style::default().fg(Color::Yellow),
        ));
    } else if let Some(at) = app.last_refresh {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("Updated {}", at.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookings::data::{Airport, BookingDataset, OriginAndDestinationPair, SegmentId};
    use bookings::provider::ViewState;
    use chrono::{Duration, TimeZone, Utc};
    use ratatui::{backend::TestBackend, Terminal};

    fn sfo_jfk() -> Segment {
        Segment {
            id: Some(SegmentId::Number(1)),
            origin_and_destination_pair: Some(OriginAndDestinationPair {
                origin: Some(Airport {
                    code: Some("SFO".to_string()),
                }),
                destination: Some(Airport {
                    code: Some("JFK".to_string()),
                }),
                origin_city: Some("San Francisco".to_string()),
                destination_city: Some("New York".to_string()),
            }),
        }
    }

    fn app_with(segments: Vec<Segment>) -> App {
        let fetched = Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap();
        let mut app = App::new();
        app.set_view(ViewState {
            data: Some(BookingDataset {
                segments,
                fetch_timestamp: fetched,
                expiry_timestamp: fetched + Duration::minutes(30),
            }),
            is_loading: false,
            error: None,
        });
        app
    }

    fn rendered(app: &App) -> String {
        let backend = TestBackend::new(80, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        terminal
            .draw(|frame| crate::ui::render(frame, app))
            .unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_segment_lines_include_route_and_cities() {
        assert_eq!(
            segment_lines(&sfo_jfk()),
            vec![
                "Segment 1".to_string(),
                "SFO - JFK".to_string(),
                "San Francisco - New York".to_string(),
            ]
        );
    }

    #[test]
    fn test_segment_lines_skip_missing_cities() {
        let segment = Segment {
            id: Some(SegmentId::Number(2)),
            origin_and_destination_pair: None,
        };

        assert_eq!(
            segment_lines(&segment),
            vec!["Segment 2".to_string(), "Unknown - Unknown".to_string()]
        );
    }

    #[test]
    fn test_list_renders_route() {
        let content = rendered(&app_with(vec![sfo_jfk()]));

        assert!(content.contains("Segment 1"));
        assert!(content.contains("SFO - JFK"));
        assert!(content.contains("San Francisco - New York"));
    }

    #[test]
    fn test_empty_list_renders_placeholder() {
        let content = rendered(&app_with(Vec::new()));

        assert!(content.contains(EMPTY_MESSAGE));
    }
}
