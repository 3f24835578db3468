//! Service and transport configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use partnerlink::ProtocolError;

use crate::api::CallContext;
use crate::event::{NoopEvent, RestEvent};

/// Creates the event sink of one call.
pub type EventFactory = Arc<dyn Fn(&CallContext) -> Box<dyn RestEvent> + Send + Sync>;

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(String),

    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid { name: String, value: String },
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

/// Credentials and location of one partner service.
#[derive(Clone)]
pub struct ServiceConfig {
    /// Registry key; an Api selects its config by this name.
    pub name: String,
    pub app_key: String,
    pub app_secret: String,
    /// Prefix of every call path, e.g. `"https://partner.example.com"`.
    pub base_url: String,
    pub event_factory: Option<EventFactory>,
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("name", &self.name)
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("event_factory", &self.event_factory.is_some())
            .finish()
    }
}

impl ServiceConfig {
    pub fn new(
        name: impl Into<String>,
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            base_url: base_url.into(),
            event_factory: None,
        }
    }

    pub fn with_event_factory(mut self, factory: EventFactory) -> Self {
        self.event_factory = Some(factory);
        self
    }

    /// Read a config from the environment.
    ///
    /// `name` is upper-cased, with every non-alphanumeric character replaced
    /// by `_`, to form the variable prefix:
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `PARTNERLINK_<NAME>_APP_KEY` | App key sent as `app_key` |
    /// | `PARTNERLINK_<NAME>_APP_SECRET` | Shared signing secret |
    /// | `PARTNERLINK_<NAME>_BASE_URL` | Base URL of the service |
    pub fn from_env(name: &str) -> Result<Self, ConfigError> {
        let prefix = env_prefix(name);
        let var = |suffix: &str| {
            let key = format!("{prefix}_{suffix}");
            std::env::var(&key).map_err(|_| ConfigError::Missing(key))
        };
        Ok(Self::new(
            name,
            var("APP_KEY")?,
            var("APP_SECRET")?,
            var("BASE_URL")?,
        ))
    }

    /// The sink for one call: from the factory, or a no-op.
    pub fn new_event(&self, ctx: &CallContext) -> Box<dyn RestEvent> {
        match &self.event_factory {
            Some(factory) => factory(ctx),
            None => Box::new(NoopEvent),
        }
    }

    /// Fails when a field needed to sign or address a request is empty.
    pub fn ensure_complete(&self) -> Result<(), ProtocolError> {
        let missing = if self.app_key.is_empty() {
            "app_key"
        } else if self.app_secret.is_empty() {
            "app_secret"
        } else if self.base_url.is_empty() {
            "base_url"
        } else {
            return Ok(());
        };
        Err(ProtocolError::InvalidConfig {
            name: self.name.clone(),
            reason: format!("{missing} is empty"),
        })
    }
}

fn env_prefix(name: &str) -> String {
    let upper: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("PARTNERLINK_{upper}")
}

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

/// Pool and timeout settings of the shared HTTP transport.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `PARTNERLINK_CONNECT_TIMEOUT_SECS` | `30` | TCP connect timeout |
/// | `PARTNERLINK_KEEPALIVE_SECS` | `300` | TCP keep-alive interval |
/// | `PARTNERLINK_POOL_MAX_IDLE_PER_HOST` | `12` | Idle connections kept per host |
/// | `PARTNERLINK_POOL_IDLE_TIMEOUT_SECS` | `15` | How long an idle connection is kept |
/// | `PARTNERLINK_RESPONSE_HEADER_TIMEOUT_SECS` | `60` | Default wait for response headers |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub connect_timeout: Duration,
    pub keepalive: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    /// Used by calls whose descriptor sets no timeout of its own.
    pub response_header_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            keepalive: Duration::from_secs(300),
            pool_max_idle_per_host: 12,
            pool_idle_timeout: Duration::from_secs(15),
            response_header_timeout: Duration::from_secs(60),
        }
    }
}

impl TransportConfig {
    /// Populate from environment variables, applying defaults where absent.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            connect_timeout: env_secs("PARTNERLINK_CONNECT_TIMEOUT_SECS", defaults.connect_timeout)?,
            keepalive: env_secs("PARTNERLINK_KEEPALIVE_SECS", defaults.keepalive)?,
            pool_max_idle_per_host: env_parse(
                "PARTNERLINK_POOL_MAX_IDLE_PER_HOST",
                defaults.pool_max_idle_per_host,
            )?,
            pool_idle_timeout: env_secs(
                "PARTNERLINK_POOL_IDLE_TIMEOUT_SECS",
                defaults.pool_idle_timeout,
            )?,
            response_header_timeout: env_secs(
                "PARTNERLINK_RESPONSE_HEADER_TIMEOUT_SECS",
                defaults.response_header_timeout,
            )?,
        })
    }

    /// Build the pooled client shared by every call.
    pub fn build_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .tcp_keepalive(self.keepalive)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            .build()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            name: name.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

fn env_secs(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    env_parse(name, default.as_secs()).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_prefix_normalises_name() {
        assert_eq!(env_prefix("hjx-app.v2"), "PARTNERLINK_HJX_APP_V2");
    }

    #[test]
    fn service_config_from_env() {
        std::env::set_var("PARTNERLINK_ENVTEST_APP_KEY", "k");
        std::env::set_var("PARTNERLINK_ENVTEST_APP_SECRET", "s");
        std::env::set_var("PARTNERLINK_ENVTEST_BASE_URL", "http://svc");
        let cfg = ServiceConfig::from_env("envtest").unwrap();
        assert_eq!(cfg.name, "envtest");
        assert_eq!(cfg.app_key, "k");
        assert_eq!(cfg.base_url, "http://svc");

        match ServiceConfig::from_env("envtest-missing") {
            Err(ConfigError::Missing(var)) => assert_eq!(var, "PARTNERLINK_ENVTEST_MISSING_APP_KEY"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn secret_is_not_debug_printed() {
        let cfg = ServiceConfig::new("svc", "key", "top-secret", "http://svc");
        assert!(!format!("{cfg:?}").contains("top-secret"));
    }

    #[test]
    fn incomplete_config_is_rejected() {
        let cfg = ServiceConfig::new("svc", "", "s", "http://svc");
        let err = cfg.ensure_complete().unwrap_err();
        assert_eq!(err.code(), "11");
        assert!(ServiceConfig::new("svc", "k", "s", "http://svc").ensure_complete().is_ok());
    }

    #[test]
    fn empty_secret_is_rejected() {
        let err = ServiceConfig::new("svc", "k", "", "http://svc")
            .ensure_complete()
            .unwrap_err();
        assert_eq!(err.code(), "11");
        assert!(err.to_string().contains("app_secret"));
    }

    #[test]
    fn transport_defaults() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.connect_timeout, Duration::from_secs(30));
        assert_eq!(cfg.keepalive, Duration::from_secs(300));
        assert_eq!(cfg.pool_max_idle_per_host, 12);
        assert_eq!(cfg.pool_idle_timeout, Duration::from_secs(15));
        assert_eq!(cfg.response_header_timeout, Duration::from_secs(60));
        assert!(cfg.build_client().is_ok());
    }

    #[test]
    fn invalid_transport_env_is_reported() {
        std::env::set_var("PARTNERLINK_TEST_ONLY_SECS", "soon");
        let err = env_secs("PARTNERLINK_TEST_ONLY_SECS", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert_eq!(
            env_secs("PARTNERLINK_TEST_UNSET_SECS", Duration::from_secs(7)).unwrap(),
            Duration::from_secs(7)
        );
    }
}
