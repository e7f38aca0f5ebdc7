use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::fs;

/// Runtime configuration for the powgate server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub listener: ListenerConfig,
    pub pow: PowConfig,
    pub rate_limit: RateLimitConfig,
    pub quotes_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub max_connections: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub connection_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PowConfig {
    /// Leading zero bits required of every verification digest. One byte
    /// carries this on the wire, so the type bounds it to 255.
    pub base_difficulty: u8,
    /// Advisory bound on challenge age; reserved for deployments that
    /// persist or forward challenges beyond a single session.
    pub challenge_max_age: Duration,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            base_difficulty: 20,
            challenge_max_age: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
    pub cleanup_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Command-line overrides applied on top of the configuration file.
#[derive(Debug, Default)]
pub struct ServerConfigOverrides {
    pub max_connections: Option<usize>,
    pub pow_difficulty: Option<u8>,
    pub quotes_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    listen: Option<SocketAddr>,
    #[serde(default)]
    listener: ListenerSection,
    #[serde(default)]
    pow: PowSection,
    #[serde(default)]
    rate_limit: RateLimitSection,
    #[serde(default)]
    quotes: QuotesSection,
}

#[derive(Debug, Deserialize, Default)]
struct ListenerSection {
    max_connections: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    read_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    write_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    connection_timeout: Option<Duration>,
}

#[derive(Debug, Deserialize, Default)]
struct PowSection {
    base_difficulty: Option<u8>,
    #[serde(default, with = "humantime_serde")]
    challenge_max_age: Option<Duration>,
}

#[derive(Debug, Deserialize, Default)]
struct RateLimitSection {
    max_requests: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    window: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    cleanup_interval: Option<Duration>,
}

#[derive(Debug, Deserialize, Default)]
struct QuotesSection {
    path: Option<PathBuf>,
}

impl ServerConfig {
    /// Resolves the effective configuration from the optional TOML file,
    /// command-line overrides and built-in defaults, then validates it.
    pub async fn from_sources(
        listen: SocketAddr,
        config_path: Option<PathBuf>,
        overrides: ServerConfigOverrides,
    ) -> Result<Self> {
        let file_cfg = if let Some(path) = config_path.as_ref() {
            let contents = fs::read_to_string(path)
                .await
                .with_context(|| format!("reading configuration from {}", path.display()))?;
            parse_config(&contents, path)?
        } else {
            FileConfig::default()
        };

        let defaults = ListenerConfig::default();
        let listener = ListenerConfig {
            max_connections: overrides
                .max_connections
                .or(file_cfg.listener.max_connections)
                .unwrap_or(defaults.max_connections),
            read_timeout: file_cfg
                .listener
                .read_timeout
                .unwrap_or(defaults.read_timeout),
            write_timeout: file_cfg
                .listener
                .write_timeout
                .unwrap_or(defaults.write_timeout),
            connection_timeout: file_cfg
                .listener
                .connection_timeout
                .unwrap_or(defaults.connection_timeout),
        };

        let pow_defaults = PowConfig::default();
        let pow = PowConfig {
            base_difficulty: overrides
                .pow_difficulty
                .or(file_cfg.pow.base_difficulty)
                .unwrap_or(pow_defaults.base_difficulty),
            challenge_max_age: file_cfg
                .pow
                .challenge_max_age
                .unwrap_or(pow_defaults.challenge_max_age),
        };

        let rate_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            max_requests: file_cfg
                .rate_limit
                .max_requests
                .unwrap_or(rate_defaults.max_requests),
            window: file_cfg.rate_limit.window.unwrap_or(rate_defaults.window),
            cleanup_interval: file_cfg
                .rate_limit
                .cleanup_interval
                .unwrap_or(rate_defaults.cleanup_interval),
        };

        let quotes_path = overrides
            .quotes_path
            .or(file_cfg.quotes.path)
            .unwrap_or_else(|| PathBuf::from("quotes.txt"));

        let config = Self {
            listen: file_cfg.listen.unwrap_or(listen),
            listener,
            pow,
            rate_limit,
            quotes_path,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.listener.max_connections == 0 {
            bail!("listener.max_connections must be strictly positive");
        }
        if self.listener.read_timeout.is_zero()
            || self.listener.write_timeout.is_zero()
            || self.listener.connection_timeout.is_zero()
        {
            bail!("listener timeouts must be strictly positive");
        }
        if self.pow.challenge_max_age.is_zero() {
            bail!("pow.challenge_max_age must be strictly positive");
        }
        if self.rate_limit.max_requests == 0 {
            bail!("rate_limit.max_requests must be strictly positive");
        }
        if self.rate_limit.window.is_zero() || self.rate_limit.cleanup_interval.is_zero() {
            bail!("rate_limit durations must be strictly positive");
        }
        Ok(())
    }
}

fn parse_config(contents: &str, path: &Path) -> Result<FileConfig> {
    let deserializer = toml::Deserializer::new(contents);
    let parsed = serde_path_to_error::deserialize(deserializer)
        .with_context(|| format!("parsing configuration at {}", path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ServerConfig {
        ServerConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            listener: ListenerConfig::default(),
            pow: PowConfig::default(),
            rate_limit: RateLimitConfig::default(),
            quotes_path: PathBuf::from("quotes.txt"),
        }
    }

    #[test]
    fn file_sections_parse_with_humantime_durations() {
        let contents = r#"
            listen = "0.0.0.0:7777"

            [listener]
            max_connections = 32
            read_timeout = "5s"
            connection_timeout = "1m"

            [pow]
            base_difficulty = 18
            challenge_max_age = "2m"

            [rate_limit]
            max_requests = 4
            window = "30s"

            [quotes]
            path = "wisdom.txt"
        "#;
        let parsed = parse_config(contents, Path::new("test.toml")).unwrap();
        assert_eq!(parsed.listen, Some("0.0.0.0:7777".parse().unwrap()));
        assert_eq!(parsed.listener.max_connections, Some(32));
        assert_eq!(parsed.listener.read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(
            parsed.listener.connection_timeout,
            Some(Duration::from_secs(60))
        );
        assert_eq!(parsed.pow.base_difficulty, Some(18));
        assert_eq!(parsed.rate_limit.max_requests, Some(4));
        assert_eq!(parsed.rate_limit.window, Some(Duration::from_secs(30)));
        assert_eq!(parsed.quotes.path, Some(PathBuf::from("wisdom.txt")));
    }

    #[test]
    fn difficulty_beyond_one_byte_fails_to_parse() {
        let contents = "[pow]\nbase_difficulty = 300\n";
        assert!(parse_config(contents, Path::new("test.toml")).is_err());
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut config = base_config();
        config.rate_limit.window = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_connections_is_rejected() {
        let mut config = base_config();
        config.listener.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn defaults_validate() {
        base_config().validate().unwrap();
    }

    #[tokio::test]
    async fn overrides_win_over_defaults() {
        let config = ServerConfig::from_sources(
            "127.0.0.1:0".parse().unwrap(),
            None,
            ServerConfigOverrides {
                max_connections: Some(7),
                pow_difficulty: Some(3),
                quotes_path: Some(PathBuf::from("alt.txt")),
            },
        )
        .await
        .unwrap();
        assert_eq!(config.listener.max_connections, 7);
        assert_eq!(config.pow.base_difficulty, 3);
        assert_eq!(config.quotes_path, PathBuf::from("alt.txt"));
    }
}
