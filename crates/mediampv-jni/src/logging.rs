//! Log output for the bridge and the engine.
//!
//! `tracing` events are routed to logcat on Android (through the `log`
//! facade and `android_logger`) and to stderr elsewhere.

use std::sync::Once;

#[cfg(not(target_os = "android"))]
const DEFAULT_FILTER: &str = "mediampv=info,mediampv_core=info,mpv=info";

static INIT: Once = Once::new();

/// Installs the logger. Safe to call from every entry point; only the first
/// call has an effect.
pub fn init() {
    INIT.call_once(|| {
        #[cfg(target_os = "android")]
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(tracing::log::LevelFilter::Debug)
                .with_tag("mediampv"),
        );

        #[cfg(not(target_os = "android"))]
        {
            let filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
            // The host application may already own the global subscriber.
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
        assert!(INIT.is_completed());
        tracing::info!("logging initialized twice");
    }
}
