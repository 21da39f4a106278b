//! Application state management for the bookings viewer
//!
//! This module holds what the terminal UI needs between frames: the latest
//! view state from the provider, the list selection, and the flags the main
//! loop acts on (quit, refresh).

use chrono::{DateTime, Local};
use crossterm::event::{KeyCode, KeyEvent};

use bookings::provider::{Screen, ViewState};
use bookings::refresh::RefreshMessage;

/// Main application struct managing UI state
pub struct App {
    /// Latest booking view state
    pub view: ViewState,
    /// Index of currently selected segment in list view
    pub selected_index: usize,
    /// Flag indicating the application should quit
    pub should_quit: bool,
    /// Flag indicating a forced refresh has been requested
    pub refresh_requested: bool,
    /// When the data on screen was fetched, as last reported
    pub last_refresh: Option<DateTime<Local>>,
    /// Last background refresh problem, shown in the status line
    pub refresh_error: Option<String>,
}

impl App {
    /// Creates a new App instance with default state
    pub fn new() -> Self {
        Self {
            view: ViewState::default(),
            selected_index: 0,
            should_quit: false,
            refresh_requested: false,
            last_refresh: None,
            refresh_error: None,
        }
    }

    /// Number of segments currently loaded
    pub fn segment_count(&self) -> usize {
        self.view
            .data
            .as_ref()
            .map(|dataset| dataset.segments.len())
            .unwrap_or(0)
    }

    /// Replaces the view state, keeping the selection in range
    pub fn set_view(&mut self, view: ViewState) {
        if let Some(dataset) = &view.data {
            self.last_refresh = Some(dataset.fetch_timestamp.with_timezone(&Local));
        }
        self.view = view;

        let count = self.segment_count();
        if count == 0 {
            self.selected_index = 0;
        } else if self.selected_index >= count {
            self.selected_index = count - 1;
        }
    }

    /// Applies a message from the background refresh task
    pub fn handle_refresh_message(&mut self, message: RefreshMessage) {
        match message {
            RefreshMessage::RefreshStarted => {}
            RefreshMessage::RefreshCompleted { fetched_at } => {
                self.last_refresh = Some(fetched_at.with_timezone(&Local));
                self.refresh_error = None;
            }
            RefreshMessage::RefreshError(message) => {
                self.refresh_error = Some(message);
            }
        }
    }

    /// Handles keyboard input and updates state accordingly
    ///
    /// # Key Bindings
    /// - `q` or `Esc`: Quit the application
    /// - `Up`/`k`: Move selection up in list
    /// - `Down`/`j`: Move selection down in list
    /// - `r`: Force a fresh fetch
    pub fn handle_key(&mut self, key_event: KeyEvent) {
        if matches!(self.view.screen(), Screen::Loading) {
            // Only quit is allowed during loading
            if key_event.code == KeyCode::Char('q') {
                self.should_quit = true;
            }
            return;
        }

        match key_event.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_selection_up();
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_selection_down();
            }
            KeyCode::Char('r') => {
                self.refresh_requested = true;
            }
            _ => {}
        }
    }

    /// Moves the selection up in the list, wrapping to bottom if at top
    fn move_selection_up(&mut self) {
        let count = self.segment_count();
        if count == 0 {
            return;
        }
        if self.selected_index == 0 {
            self.selected_index = count - 1;
        } else {
            self.selected_index -= 1;
        }
    }

    /// Moves the selection down in the list, wrapping to top if at bottom
    fn move_selection_down(&mut self) {
        let count = self.segment_count();
        if count == 0 {
            return;
        }
        self.selected_index = (self.selected_index + 1) % count;
    }
}
