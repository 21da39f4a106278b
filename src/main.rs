//! Bookings - view booking travel segments
//!
//! A terminal UI that shows the segments of a booking. Data comes from a
//! simulated booking API through a read-through cache that persists between
//! runs and expires after 30 minutes.

mod app;
mod ui;

use std::error::Error;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::panic;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use app::App;
use bookings::cache::{CacheStore, FileBackend, MemoryBackend, StorageBackend};
use bookings::cli::{CacheLocation, Cli, StartupConfig};
use bookings::clock::{Clock, SystemClock};
use bookings::coordinator::BookingCoordinator;
use bookings::data::BookingService;
use bookings::provider::BookingProvider;
use bookings::refresh::{try_recv, RefreshHandle};

/// Default log filter when RUST_LOG is unset
const DEFAULT_LOG_FILTER: &str = "bookings=info";

/// Sets up a panic hook that restores the terminal before printing the panic message.
/// This ensures the terminal is usable even if the application panics.
fn setup_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        // Attempt to restore the terminal
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        // Call the original panic hook
        original_hook(panic_info);
    }));
}

/// Installs the tracing subscriber
///
/// Plain mode logs to stderr. The TUI owns the terminal, so there logs go to
/// `bookings.log` in the cache directory, or nowhere when nothing is persisted.
fn init_logging(plain: bool, log_dir: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if plain {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
        return;
    }

    let log_file = log_dir.and_then(|dir| {
        fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("bookings.log"))
            .ok()
    });

    if let Some(file) = log_file {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }
}

/// Builds the file backend for the configured cache location
fn file_backend(location: &CacheLocation) -> Option<FileBackend> {
    match location {
        CacheLocation::Default => FileBackend::new(),
        CacheLocation::Dir(dir) => Some(FileBackend::with_dir(dir.clone())),
        CacheLocation::Memory => None,
    }
}

/// Prints the segment list to stdout
async fn run_plain(provider: &BookingProvider, force_refresh: bool) -> Result<(), Box<dyn Error>> {
    let result = if force_refresh {
        provider.reload().await
    } else {
        provider.load().await
    };

    let dataset = match result {
        Ok(dataset) => dataset,
        Err(e) => {
            eprintln!("Failed to load data: {}", e);
            std::process::exit(1);
        }
    };

    let mut out = io::stdout().lock();
    if dataset.segments.is_empty() {
        writeln!(out, "{}", ui::segment_list::EMPTY_MESSAGE)?;
    }
    for segment in &dataset.segments {
        writeln!(out, "{}", ui::segment_list::segment_lines(segment).join("  |  "))?;
    }
    Ok(())
}

/// Runs the interactive terminal UI until the user quits
async fn run_tui(provider: BookingProvider, config: &StartupConfig) -> Result<(), Box<dyn Error>> {
    // Set up panic hook to restore terminal on crash
    setup_panic_hook();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new();

    // Kick off the initial load without blocking the first frame
    tokio::spawn({
        let provider = provider.clone();
        let force_refresh = config.force_refresh;
        async move {
            let _ = if force_refresh {
                provider.reload().await
            } else {
                provider.load().await
            };
        }
    });

    let mut refresh_handle = RefreshHandle::spawn(provider.clone(), config.refresh.clone());

    // Main event loop
    loop {
        app.set_view(provider.state());
        while let Some(message) = try_recv(&mut refresh_handle) {
            app.handle_refresh_message(message);
        }

        terminal.draw(|f| ui::render(f, &app))?;

        // Poll for keyboard events with 100ms timeout
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key);
            }
        }

        if app.refresh_requested {
            app.refresh_requested = false;
            let provider = provider.clone();
            tokio::spawn(async move {
                let _ = provider.reload().await;
            });
        }

        // Check if we should quit
        if app.should_quit {
            break;
        }
    }

    refresh_handle.shutdown().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = match StartupConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };

    let file_backend = file_backend(&config.cache);
    init_logging(config.plain, file_backend.as_ref().map(|b| b.dir()));

    let backend: Arc<dyn StorageBackend> = match file_backend {
        Some(backend) => Arc::new(backend),
        None => {
            if config.cache == CacheLocation::Default {
                warn!("no cache directory available, keeping cache in memory");
            }
            Arc::new(MemoryBackend::new())
        }
    };
    let store = CacheStore::new(backend);

    if config.clear_cache {
        store.clear_all()?;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let service = match config.payload.clone() {
        Some(payload) => BookingService::new(payload, config.source.clone(), clock.clone()),
        None => BookingService::sample(config.source.clone(), clock.clone()),
    };

    let coordinator = BookingCoordinator::new(Arc::new(service), store, clock);
    let provider = BookingProvider::new(coordinator);

    if config.plain {
        return run_plain(&provider, config.force_refresh).await;
    }

    run_tui(provider, &config).await
}
