//! Per-handle configuration.
//!
//! Defaults match what the managed player expects from a freshly created
//! handle. A few values can be overridden from the environment for debugging
//! without rebuilding the host application.

use std::time::Duration;

/// Environment override for [`HandleConfig::log_request_level`].
pub const ENV_LOG_REQUEST: &str = "MEDIAMPV_LOG_REQUEST";
/// Environment override for [`HandleConfig::initial_msg_level`].
pub const ENV_MSG_LEVEL: &str = "MEDIAMPV_MSG_LEVEL";

/// argv slots available to a command, including the terminating null.
const COMMAND_ARGV_SLOTS: usize = 128;

/// Configuration applied when an [`EngineHandle`](crate::handle::EngineHandle)
/// is created and its pumps are spawned.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleConfig {
    /// Minimum level of engine log messages delivered as events.
    pub log_request_level: String,
    /// Initial `msg-level` option. Verbose so later adjustments via
    /// `--msg-level` take effect without re-creating the engine.
    pub initial_msg_level: String,
    /// Maximum number of arguments accepted by a single command.
    pub max_command_args: usize,
    /// Bounded sleep of the render pump when no update is pending.
    pub render_idle_interval: Duration,
    /// OS thread name of the event pump.
    pub event_thread_name: String,
    /// OS thread name of the render pump.
    pub render_thread_name: String,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            log_request_level: "terminal-default".to_string(),
            initial_msg_level: "all=v".to_string(),
            max_command_args: COMMAND_ARGV_SLOTS - 1,
            render_idle_interval: Duration::from_millis(10),
            event_thread_name: "mediampv-event".to_string(),
            render_thread_name: "mediampv-render".to_string(),
        }
    }
}

impl HandleConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var(ENV_LOG_REQUEST) {
            config.log_request_level = level;
        }
        if let Ok(level) = std::env::var(ENV_MSG_LEVEL) {
            config.initial_msg_level = level;
        }
        config
    }

    pub fn with_log_request_level(mut self, level: impl Into<String>) -> Self {
        self.log_request_level = level.into();
        self
    }

    pub fn with_initial_msg_level(mut self, level: impl Into<String>) -> Self {
        self.initial_msg_level = level.into();
        self
    }

    pub fn with_max_command_args(mut self, limit: usize) -> Self {
        self.max_command_args = limit;
        self
    }

    pub fn with_render_idle_interval(mut self, interval: Duration) -> Self {
        self.render_idle_interval = interval;
        self
    }

    pub fn with_thread_names(
        mut self,
        event: impl Into<String>,
        render: impl Into<String>,
    ) -> Self {
        self.event_thread_name = event.into();
        self.render_thread_name = render.into();
        self
    }
}
