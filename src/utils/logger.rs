use log::LevelFilter;

/// Maps a configured level name onto a filter, defaulting to `Off`.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Off,
    }
}

/// Initializes `env_logger`; `RUST_LOG` still refines the configured level.
pub fn setup_logger(config: &super::config::Config) {
    env_logger::Builder::new()
        .filter_level(level_filter(&config.log_level))
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}
