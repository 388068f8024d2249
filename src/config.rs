use std::str::FromStr;
use std::time::Duration;

/// Server settings, read from `STAYBOOK_*` environment variables.
/// Unset or unparsable values fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    /// Startup password every client must present.
    pub password: String,
    pub max_connections: usize,
    pub session_ttl: Duration,
    pub seed_demo: bool,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub metrics_port: Option<u16>,
    /// Admin account created at startup when both are set.
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            password: "staybook".into(),
            max_connections: 256,
            session_ttl: Duration::from_secs(86_400),
            seed_demo: false,
            tls_cert: None,
            tls_key: None,
            metrics_port: None,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: parsed(&lookup, "STAYBOOK_PORT").unwrap_or(defaults.port),
            bind: lookup("STAYBOOK_BIND").unwrap_or(defaults.bind),
            password: lookup("STAYBOOK_PASSWORD").unwrap_or(defaults.password),
            max_connections: parsed::<usize>(&lookup, "STAYBOOK_MAX_CONNECTIONS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_connections),
            session_ttl: parsed(&lookup, "STAYBOOK_SESSION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.session_ttl),
            seed_demo: lookup("STAYBOOK_SEED_DEMO").is_some_and(|v| {
                matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
            }),
            tls_cert: lookup("STAYBOOK_TLS_CERT"),
            tls_key: lookup("STAYBOOK_TLS_KEY"),
            metrics_port: parsed(&lookup, "STAYBOOK_METRICS_PORT"),
            admin_email: lookup("STAYBOOK_ADMIN_EMAIL"),
            admin_password: lookup("STAYBOOK_ADMIN_PASSWORD"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
