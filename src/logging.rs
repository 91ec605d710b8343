//! Logging setup.

use crate::RenderConfig;

/// Install `env_logger` as the `log` backend.
///
/// `RUST_LOG` overrides `default_filter`. Calling this more than once is
/// harmless, later calls are ignored.
pub fn init_logging(default_filter: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_millis()
        .try_init();
}

/// Install `env_logger` with the filter of `config`.
pub fn init_from_config(config: &RenderConfig) {
    init_logging(&config.log_filter);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init_logging("debug");
        init_logging("trace");
        log::debug!("logging initialized");
    }
}
