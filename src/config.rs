//! Session construction options (spec §6).

use std::time::Duration;

const DEFAULT_PORT: u16 = 21;
const DEFAULT_USER: &str = "anonymous";
const DEFAULT_PASS: &str = "@anonymous";
const DEFAULT_TIMEOUT_MS: u64 = 600_000;
const DEFAULT_IDLE_TIME_MS: u64 = 30_000;

/// Options a [`crate::session::Session`] is constructed with.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Control connection hostname.
    pub host: String,
    /// Control connection port.
    pub port: u16,
    /// Login username.
    pub user: String,
    /// Login password.
    pub pass: String,
    /// Skip `STAT` probing in `ls` and always use `LIST`.
    pub use_list: bool,
    /// Passive-socket idle timeout.
    pub timeout: Duration,
    /// Default `keep_alive` interval.
    pub idle_time: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            pass: DEFAULT_PASS.to_string(),
            use_list: false,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            idle_time: Duration::from_millis(DEFAULT_IDLE_TIME_MS),
        }
    }
}

/// Builder for [`SessionConfig`], generalizing the teacher's several
/// `connect`/`connect_with_port` constructors into one fluent type.
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Start building a config targeting `host` with otherwise-default
    /// options.
    pub fn new(host: impl Into<String>) -> Self {
        SessionConfigBuilder {
            config: SessionConfig {
                host: host.into(),
                ..SessionConfig::default()
            },
        }
    }

    /// Override the control port (default `21`).
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the login credentials (default `anonymous`/`@anonymous`).
    pub fn credentials(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.config.user = user.into();
        self.config.pass = pass.into();
        self
    }

    /// Force `ls` to always use `LIST`, skipping the `STAT` probe.
    pub fn use_list(mut self, use_list: bool) -> Self {
        self.config.use_list = use_list;
        self
    }

    /// Override the passive-socket idle timeout (default 10 minutes).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Override the default `keep_alive` interval (default 30 seconds).
    pub fn idle_time(mut self, idle_time: Duration) -> Self {
        self.config.idle_time = idle_time;
        self
    }

    /// Finish building.
    pub fn build(self) -> SessionConfig {
        self.config
    }
}
