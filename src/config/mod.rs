use crate::error::{LimiterError, Result};
use crate::rate_limit::types::{
    ChainPolicy, Lookup, RateLimitOptions, Whitelist, DEFAULT_COUNT, DEFAULT_EXPIRE_MS,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Rate limiter settings
    pub limiter: LimiterSettings,
    /// Window store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Rate limiter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterSettings {
    /// Store namespace windows are written under
    #[serde(default)]
    pub namespace: String,
    /// Requests allowed per window
    #[serde(default = "default_count")]
    pub count: u32,
    /// Window length in milliseconds
    #[serde(default = "default_expire_ms")]
    pub expire_ms: u64,
    /// Fixed identity components prepended to the caller address
    #[serde(default)]
    pub lookup: Vec<String>,
    /// Caller addresses that bypass rate limiting
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub skip_headers: bool,
    #[serde(default)]
    pub noip: bool,
    /// Path used in keys instead of the request path
    #[serde(default)]
    pub path: Option<String>,
    /// Method used in keys instead of the request method
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub chain_policy: ChainPolicy,
}

/// Window store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL; windows stay in memory when unset
    #[serde(default)]
    pub redis_url: Option<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Expose `/metrics`
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_count() -> u32 {
    DEFAULT_COUNT
}

fn default_expire_ms() -> u64 {
    DEFAULT_EXPIRE_MS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

impl LimiterSettings {
    /// Convert file settings into limiter options
    pub fn to_options(&self) -> RateLimitOptions {
        let whitelist = if self.whitelist.is_empty() {
            Whitelist::None
        } else {
            Whitelist::from(self.whitelist.clone())
        };

        RateLimitOptions {
            lookup: Lookup::Fixed(self.lookup.clone()),
            count: self.count,
            expire: self.expire_ms,
            whitelist,
            on_rate_limited: None,
            skip_headers: self.skip_headers,
            noip: self.noip,
            path: self.path.clone(),
            method: self.method.clone(),
            chain_policy: self.chain_policy,
        }
    }
}

impl LimiterConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LimiterError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.limiter.namespace.is_empty() {
            return Err(LimiterError::Config(
                "The rate limiter store namespace can not be omitted".to_string(),
            ));
        }

        if self.limiter.count == 0 {
            return Err(LimiterError::Config("Rate limit count must be > 0".to_string()));
        }

        if self.limiter.expire_ms == 0 {
            return Err(LimiterError::Config("Rate limit window must be > 0".to_string()));
        }

        if let Some(url) = &self.store.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(LimiterError::Config(format!(
                    "Redis URL must start with redis:// or rediss://: {}",
                    url
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090

limiter:
  namespace: "api"
  count: 100
  expire_ms: 60000
  lookup: ["tenant"]
  whitelist: ["10.0.0.1"]
  skip_headers: true
  method: "GET"
  chain_policy: halt

store:
  redis_url: "redis://localhost:6379"
"#;

        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.limiter.namespace, "api");
        assert_eq!(config.limiter.count, 100);
        assert_eq!(config.limiter.lookup, vec!["tenant"]);
        assert_eq!(config.limiter.chain_policy, ChainPolicy::Halt);
        assert_eq!(
            config.store.redis_url.as_deref(),
            Some("redis://localhost:6379")
        );
        assert!(config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let yaml = r#"
limiter:
  namespace: "api"
"#;

        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.limiter.count, 250);
        assert_eq!(config.limiter.expire_ms, 300_000);
        assert_eq!(config.limiter.chain_policy, ChainPolicy::AlwaysAdvance);
        assert!(config.store.redis_url.is_none());
    }

    #[test]
    fn test_validate_missing_namespace() {
        let config = LimiterConfig::from_yaml("limiter: {}").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_count() {
        let config = LimiterConfig::from_yaml("limiter: { namespace: api, count: 0 }").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_redis_url() {
        let yaml = r#"
limiter:
  namespace: "api"
store:
  redis_url: "http://localhost:6379"
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_options() {
        let yaml = r#"
limiter:
  namespace: "api"
  count: 5
  expire_ms: 1000
  whitelist: ["127.0.0.1"]
  noip: true
"#;
        let config = LimiterConfig::from_yaml(yaml).unwrap();
        let options = config.limiter.to_options();
        assert_eq!(options.count, 5);
        assert_eq!(options.expire, 1000);
        assert!(options.noip);
        match options.whitelist {
            Whitelist::Addresses(addresses) => assert!(addresses.contains("127.0.0.1")),
            other => panic!("unexpected whitelist: {:?}", other),
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "limiter:\n  namespace: from-file\n  count: 3").unwrap();

        let config = LimiterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.limiter.namespace, "from-file");
        assert_eq!(config.limiter.count, 3);
    }

    #[test]
    fn test_from_missing_file() {
        let result = LimiterConfig::from_file("/nonexistent/limiter.yaml");
        assert!(matches!(result, Err(LimiterError::Config(_))));
    }
}
