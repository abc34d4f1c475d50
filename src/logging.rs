use crate::config::Settings;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;

/// Inicjalizacja logowania.
/// `RUST_LOG` ma pierwszeństwo przed `logging.level`; `logging.json = true` przełącza format na JSON.
pub fn init(settings: &Settings) {
    let level = settings
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "info".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(env_filter);

    // try_init: w testach subscriber mógł już zostać ustawiony
    let res = if settings.logging.json.unwrap_or(false) {
        registry.with(fmt::layer().json().with_current_span(false)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    if let Err(e) = res {
        eprintln!("logging already initialised: {e}");
    }
}
