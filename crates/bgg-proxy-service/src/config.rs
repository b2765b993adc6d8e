use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::types::BOARDGAME_TYPE;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the proxy.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A tag name to report the hostname to, for each metric. Defaults to not sending such a tag.
    pub hostname_tag: Option<String>,
    /// A tag name to report the environment to, for each metric. Defaults to not sending such a tag.
    pub environment_tag: Option<String>,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "bgg_proxy".into(),
            hostname_tag: None,
            environment_tag: None,
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Connection settings for the Redis cache store.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct RedisCacheConfig {
    /// A `redis://` or `rediss://` connection URL.
    pub url: String,

    /// Upper bound for a single Redis command, including connecting.
    ///
    /// A command that takes longer fails the lookup with a store error.
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl RedisCacheConfig {
    fn from_url(url: String) -> Self {
        Self {
            url,
            operation_timeout: default_operation_timeout(),
        }
    }
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Settings for the in-process cache store.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// Maximum number of cached entities across all kinds.
    pub capacity: u64,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self { capacity: 100_000 }
    }
}

/// The backend that stores cached entities.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendConfig {
    Redis(RedisCacheConfig),
    Memory(MemoryCacheConfig),
}

/// Cache settings shared by all entity kinds.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// The first segment of every cache key.
    pub key_prefix: String,

    /// How long a fetched thing is served from cache.
    #[serde(with = "humantime_serde")]
    pub thing_ttl: Duration,

    /// How long a fetched user is served from cache.
    #[serde(with = "humantime_serde")]
    pub user_ttl: Duration,

    /// The store backend. See [`CacheConfig::backend`] for the default.
    pub backend: Option<CacheBackendConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "bgg".into(),
            thing_ttl: Duration::from_secs(24 * 3600),
            user_ttl: Duration::from_secs(24 * 3600),
            backend: None,
        }
    }
}

impl CacheConfig {
    /// Returns the configured backend.
    ///
    /// Without an explicit backend, a non-empty `REDIS_URL` environment variable selects Redis,
    /// otherwise entities are cached in memory.
    pub fn backend(&self) -> CacheBackendConfig {
        if let Some(ref backend) = self.backend {
            return backend.clone();
        }
        match env::var("REDIS_URL") {
            Ok(url) if !url.trim().is_empty() => {
                CacheBackendConfig::Redis(RedisCacheConfig::from_url(url))
            }
            _ => CacheBackendConfig::Memory(MemoryCacheConfig::default()),
        }
    }
}

/// Settings for talking to the BGG XML API.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the XML API 2, including the trailing slash.
    pub base_url: Url,

    /// The timeout for establishing a connection.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Global timeout for one request, including reading the body.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// An application token sent as bearer authorization, if BGG requires one.
    pub token: Option<String>,

    /// The thing subtype served by the thing resolver. Items of other types are ignored.
    pub thing_type: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout: Duration::from_secs(2),
            // BGG is notoriously slow for large things, but requests should not hang forever.
            timeout: Duration::from_secs(30),
            token: None,
            thing_type: BOARDGAME_TYPE.into(),
        }
    }
}

fn default_base_url() -> Url {
    Url::parse("https://boardgamegeek.com/xmlapi2/").expect("static URL is valid")
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port to bind the HTTP webserver to.
    pub bind: String,

    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to.
    pub sentry_dsn: Option<Dsn>,

    /// Configuration of the entity cache.
    pub cache: CacheConfig,

    /// Configuration of the BGG API client.
    pub upstream: UpstreamConfig,
}

/// Checks if we are running in docker.
fn is_docker() -> bool {
    if fs::metadata("/.dockerenv").is_ok() {
        return true;
    }

    fs::read_to_string("/proc/self/cgroup")
        .map(|s| s.contains("/docker"))
        .unwrap_or(false)
}

/// Default value for the "bind" configuration.
fn default_bind() -> String {
    if is_docker() {
        // Docker images rely on this service being exposed
        "0.0.0.0:3030".to_owned()
    } else {
        "127.0.0.1:3030".to_owned()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            logging: Logging::default(),
            metrics: Metrics::default(),
            sentry_dsn: None,
            cache: CacheConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration from the YAML file at `path`, or the defaults without a path.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    pub fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.as_str() {
        "off" | "error" | "warn" | "info" | "debug" | "trace" => {
            raw.parse().map_err(de::Error::custom)
        }
        _ => Err(de::Error::unknown_variant(
            &raw,
            &["off", "error", "warn", "info", "debug", "trace"],
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_config() {
        let cfg = Config::get(None).unwrap();
        assert_eq!(cfg.cache.key_prefix, "bgg");
        assert_eq!(cfg.cache.thing_ttl, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.cache.user_ttl, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.upstream.thing_type, "boardgame");
        assert_eq!(
            cfg.upstream.base_url.as_str(),
            "https://boardgamegeek.com/xmlapi2/"
        );
    }

    #[test]
    fn test_cache_ttls() {
        // Setting one TTL in reasonable units must not affect the other defaults.
        let yaml = r#"
            cache:
              thing_ttl: 1h
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.cache.thing_ttl, Duration::from_secs(3600));
        assert_eq!(cfg.cache.user_ttl, Duration::from_secs(24 * 3600));
        assert_eq!(cfg.cache.key_prefix, "bgg");
    }

    #[test]
    fn test_redis_backend() {
        let yaml = r#"
            cache:
              backend:
                redis:
                  url: "redis://cache.internal:6379/2"
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(
            cfg.cache.backend(),
            CacheBackendConfig::Redis(RedisCacheConfig {
                url: "redis://cache.internal:6379/2".into(),
                operation_timeout: Duration::from_secs(2),
            })
        );

        let yaml = r#"
            cache:
              backend:
                redis:
                  url: "redis://cache.internal:6379/2"
                  operation_timeout: 250ms
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        let CacheBackendConfig::Redis(redis) = cfg.cache.backend() else {
            panic!("wrong backend");
        };
        assert_eq!(redis.operation_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_memory_backend() {
        let yaml = r#"
            cache:
              backend:
                memory:
                  capacity: 50
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(
            cfg.cache.backend(),
            CacheBackendConfig::Memory(MemoryCacheConfig { capacity: 50 })
        );

        let yaml = r#"
            cache:
              backend:
                memory: {}
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(
            cfg.cache.backend(),
            CacheBackendConfig::Memory(MemoryCacheConfig::default())
        );
    }

    #[test]
    fn test_upstream_config() {
        let yaml = r#"
            upstream:
              base_url: "http://localhost:1234/xmlapi2/"
              timeout: 5s
              token: "secret"
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.upstream.base_url.port(), Some(1234));
        assert_eq!(cfg.upstream.timeout, Duration::from_secs(5));
        assert_eq!(cfg.upstream.connect_timeout, Duration::from_secs(2));
        assert_eq!(cfg.upstream.token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_logging_level() {
        let yaml = r#"
            logging:
              level: debug
              format: json
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert!(cfg.logging.enable_backtraces);

        let yaml = r#"
            logging:
              level: loud
        "#;
        assert!(Config::from_reader(yaml.as_bytes()).is_err());
    }

    #[test]
    fn test_empty_config_file() {
        assert!(Config::from_reader("  \n".as_bytes()).is_err());
    }
}
