//! HTTP server settings.

use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// `*` allows any origin
    pub cors_origins: Vec<String>,
    /// Sustained per-client rate on the detection routes
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,
    /// Upper bound on a request body, multipart framing included
    pub max_body_size: usize,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            cors_origins: vec!["*".into()],
            rate_limit_rps: 10,
            rate_limit_burst: 20,
            max_body_size: 10 << 20,
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Read overrides from the environment. Unparseable values keep the default.
    pub fn from_env() -> Self {
        let base = Self::default();

        Self {
            host: var("HOST").unwrap_or(base.host),
            port: parsed("PORT").unwrap_or(base.port),
            cors_origins: var("CORS_ORIGINS")
                .map(|v| split_list(&v))
                .unwrap_or(base.cors_origins),
            rate_limit_rps: parsed("RATE_LIMIT_RPS").unwrap_or(base.rate_limit_rps),
            rate_limit_burst: parsed("RATE_LIMIT_BURST").unwrap_or(base.rate_limit_burst),
            max_body_size: parsed("MAX_BODY_SIZE").unwrap_or(base.max_body_size),
            metrics_enabled: var("METRICS_ENABLED")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(base.metrics_enabled),
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    var(key).and_then(|v| v.trim().parse().ok())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
        assert_eq!(config.bind_addr().unwrap().to_string(), "0.0.0.0:5000");
    }

    #[test]
    fn test_split_list_drops_blanks() {
        assert_eq!(
            split_list("https://a.example, ,https://b.example"),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
