//! UI rendering module for the bookings viewer
//!
//! This module contains the rendering logic for the terminal user interface,
//! using the ratatui library for TUI components.

pub mod segment_list;

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Paragraph, Wrap},
    Frame,
};

use crate::app::App;
use bookings::provider::Screen;

/// Renders the screen matching the current view state
pub fn render(frame: &mut Frame, app: &App) {
    match app.view.screen() {
        Screen::Loading => render_centered(frame, "Loading booking data...", Color::Cyan),
        Screen::Error(message) => render_centered(
            frame,
            &format!("Failed to load data: {}", message),
            Color::Red,
        ),
        Screen::Populated(segments) => segment_list::render(frame, app, segments),
    }
}

/// Renders a single message centered vertically
fn render_centered(frame: &mut Frame, text: &str, color: Color) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Length(3),
            Constraint::Percentage(45),
        ])
        .split(area);

    let paragraph = Paragraph::new(text.to_string())
        .style(Style::default().fg(color))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    frame.render_widget(paragraph, chunks[1]);
}
