//! Cache configuration: defaults, an optional TOML file, then environment.
//!
//! Values are resolved in that order; each layer overrides the previous one.
//! Invalid numeric environment values fall back to the value from the lower
//! layer without failing. Unknown backend, codec, dtype or log format names
//! are rejected.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `GG_LATENT_CONFIG` | unset | Path to a TOML config file |
//! | `GG_LATENT_CHUNK_SIZE` | 256 | Tokens per chunk |
//! | `GG_LATENT_BACKEND` | memory | `memory`, `lmdb`, `redis` or `redis-pipelined` |
//! | `GG_LATENT_LMDB_PATH` | cache/latent | LMDB environment directory |
//! | `GG_LATENT_LMDB_MAP_SIZE` | 160000000 | LMDB map size (bytes) |
//! | `GG_LATENT_REDIS_URL` | redis://127.0.0.1:6379/ | Cache service URL |
//! | `GG_LATENT_REDIS_KEY_PREFIX` | latent: | Prefix for service keys |
//! | `GG_LATENT_REDIS_CONNECT_TIMEOUT` | 5 | Connect timeout (secs) |
//! | `GG_LATENT_CODEC` | safetensors | `safetensors` or `raw` |
//! | `GG_LATENT_RAW_DTYPE` | f16 | Raw view element type |
//! | `GG_LATENT_RAW_LAYERS` | 0 | Raw view layer count |
//! | `GG_LATENT_RAW_HIDDEN` | 0 | Raw view hidden dimension |
//! | `GG_LATENT_LOG_LEVEL` | info | Log filter directive |
//! | `GG_LATENT_LOG_FORMAT` | json | `json` or `pretty` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::latent::{CodecKind, LatentDType};
use crate::storage::{BackendKind, LmdbConfig, RedisConfig};
use crate::telemetry::{LogConfig, LogFormat};

pub use crate::latent::CodecConfig;
pub use crate::storage::BackendConfig;

pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatentCacheConfig {
    pub chunk_size: usize,
    pub backend: BackendConfig,
    pub codec: CodecConfig,
    pub log: LogConfig,
}

impl Default for LatentCacheConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            backend: BackendConfig::default(),
            codec: CodecConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Flat summary of the effective values, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub chunk_size: usize,
    pub backend: BackendKind,
    /// Directory, URL or `in-process`.
    pub location: String,
    pub lmdb_map_size: Option<usize>,
    pub redis_key_prefix: Option<String>,
    pub codec: CodecKind,
    pub raw_dtype: LatentDType,
    pub raw_layers: usize,
    pub raw_hidden: usize,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl fmt::Display for EffectiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "GG_LATENT_CHUNK_SIZE={}", self.chunk_size)?;
        writeln!(f, "GG_LATENT_BACKEND={}", self.backend)?;
        match self.backend {
            BackendKind::Memory => {}
            BackendKind::Lmdb => {
                writeln!(f, "GG_LATENT_LMDB_PATH={}", self.location)?;
                if let Some(size) = self.lmdb_map_size {
                    writeln!(f, "GG_LATENT_LMDB_MAP_SIZE={}", size)?;
                }
            }
            BackendKind::Redis | BackendKind::RedisPipelined => {
                writeln!(f, "GG_LATENT_REDIS_URL={}", self.location)?;
                if let Some(prefix) = &self.redis_key_prefix {
                    writeln!(f, "GG_LATENT_REDIS_KEY_PREFIX={}", prefix)?;
                }
            }
        }
        writeln!(f, "GG_LATENT_CODEC={}", self.codec)?;
        if self.codec == CodecKind::Raw {
            writeln!(f, "GG_LATENT_RAW_DTYPE={}", self.raw_dtype)?;
            writeln!(f, "GG_LATENT_RAW_LAYERS={}", self.raw_layers)?;
            writeln!(f, "GG_LATENT_RAW_HIDDEN={}", self.raw_hidden)?;
        }
        writeln!(f, "GG_LATENT_LOG_LEVEL={}", self.log_level)?;
        write!(f, "GG_LATENT_LOG_FORMAT={}", self.log_format)
    }
}

/// Parse a `usize` env var, returning `current` on missing or invalid.
fn parse_usize(key: &str, current: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(current),
        Err(_) => current,
    }
}

/// Parse a `u64` env var, returning `current` on missing or invalid.
fn parse_u64(key: &str, current: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(current),
        Err(_) => current,
    }
}

/// Parse a named-variant env var. Unknown names are an error.
fn parse_named<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key,
                value: val,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

fn backend_defaults(kind: BackendKind) -> BackendConfig {
    match kind {
        BackendKind::Memory => BackendConfig::default(),
        BackendKind::Lmdb => BackendConfig::Lmdb(LmdbConfig::default()),
        BackendKind::Redis => BackendConfig::Redis(RedisConfig::default()),
        BackendKind::RedisPipelined => BackendConfig::RedisPipelined(RedisConfig::default()),
    }
}

fn apply_redis_env(redis: &mut RedisConfig) {
    if let Ok(url) = std::env::var("GG_LATENT_REDIS_URL") {
        redis.url = url;
    }
    if let Ok(prefix) = std::env::var("GG_LATENT_REDIS_KEY_PREFIX") {
        redis.key_prefix = prefix;
    }
    redis.connect_timeout_secs =
        parse_u64("GG_LATENT_REDIS_CONNECT_TIMEOUT", redis.connect_timeout_secs);
}

impl LatentCacheConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Overlay `GG_LATENT_*` environment variables.
    ///
    /// Selecting a different backend kind resets that backend's settings to
    /// defaults before the backend-specific variables are applied.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        self.chunk_size = parse_usize("GG_LATENT_CHUNK_SIZE", self.chunk_size);

        if let Some(kind) = parse_named::<BackendKind>("GG_LATENT_BACKEND")? {
            if kind != self.backend.kind() {
                self.backend = backend_defaults(kind);
            }
        }
        match &mut self.backend {
            BackendConfig::Memory { .. } => {}
            BackendConfig::Lmdb(lmdb) => {
                if let Ok(path) = std::env::var("GG_LATENT_LMDB_PATH") {
                    lmdb.path = PathBuf::from(path);
                }
                lmdb.map_size = parse_usize("GG_LATENT_LMDB_MAP_SIZE", lmdb.map_size);
            }
            BackendConfig::Redis(redis) | BackendConfig::RedisPipelined(redis) => {
                apply_redis_env(redis);
            }
        }

        if let Some(kind) = parse_named::<CodecKind>("GG_LATENT_CODEC")? {
            self.codec.kind = kind;
        }
        if let Some(dtype) = parse_named::<LatentDType>("GG_LATENT_RAW_DTYPE")? {
            self.codec.raw_dtype = dtype;
        }
        self.codec.raw_layers = parse_usize("GG_LATENT_RAW_LAYERS", self.codec.raw_layers);
        self.codec.raw_hidden = parse_usize("GG_LATENT_RAW_HIDDEN", self.codec.raw_hidden);

        if let Ok(level) = std::env::var("GG_LATENT_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(format) = parse_named::<LogFormat>("GG_LATENT_LOG_FORMAT")? {
            self.log.format = format;
        }
        Ok(self)
    }

    /// Reject settings that cannot produce a working engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }
        if self.codec.kind == CodecKind::Raw
            && (self.codec.raw_layers == 0 || self.codec.raw_hidden == 0)
        {
            return Err(ConfigError::Invalid(
                "raw codec requires raw_layers and raw_hidden".into(),
            ));
        }
        match &self.backend {
            BackendConfig::Memory { .. } => {}
            BackendConfig::Lmdb(lmdb) => {
                if lmdb.map_size == 0 {
                    return Err(ConfigError::Invalid("lmdb map_size must be positive".into()));
                }
                if lmdb.path.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid("lmdb path is empty".into()));
                }
            }
            BackendConfig::Redis(redis) | BackendConfig::RedisPipelined(redis) => {
                if redis.url.trim().is_empty() {
                    return Err(ConfigError::Invalid("redis url is empty".into()));
                }
            }
        }
        Ok(())
    }

    /// Return a flat summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        let (location, lmdb_map_size, redis_key_prefix) = match &self.backend {
            BackendConfig::Memory { .. } => ("in-process".to_string(), None, None),
            BackendConfig::Lmdb(lmdb) => {
                (lmdb.path.display().to_string(), Some(lmdb.map_size), None)
            }
            BackendConfig::Redis(redis) | BackendConfig::RedisPipelined(redis) => {
                (redis.url.clone(), None, Some(redis.key_prefix.clone()))
            }
        };
        EffectiveConfig {
            chunk_size: self.chunk_size,
            backend: self.backend.kind(),
            location,
            lmdb_map_size,
            redis_key_prefix,
            codec: self.codec.kind,
            raw_dtype: self.codec.raw_dtype,
            raw_layers: self.codec.raw_layers,
            raw_hidden: self.codec.raw_hidden,
            log_level: self.log.level.clone(),
            log_format: self.log.format,
        }
    }
}

/// Load configuration: defaults, then `GG_LATENT_CONFIG` if set, then env.
pub fn load() -> Result<LatentCacheConfig, ConfigError> {
    let base = match std::env::var("GG_LATENT_CONFIG") {
        Ok(path) if !path.trim().is_empty() => LatentCacheConfig::from_file(Path::new(&path))?,
        _ => LatentCacheConfig::default(),
    };
    base.apply_env()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) const ENV_KEYS: &[&str] = &[
        "GG_LATENT_CONFIG",
        "GG_LATENT_CHUNK_SIZE",
        "GG_LATENT_BACKEND",
        "GG_LATENT_LMDB_PATH",
        "GG_LATENT_LMDB_MAP_SIZE",
        "GG_LATENT_REDIS_URL",
        "GG_LATENT_REDIS_KEY_PREFIX",
        "GG_LATENT_REDIS_CONNECT_TIMEOUT",
        "GG_LATENT_CODEC",
        "GG_LATENT_RAW_DTYPE",
        "GG_LATENT_RAW_LAYERS",
        "GG_LATENT_RAW_HIDDEN",
        "GG_LATENT_LOG_LEVEL",
        "GG_LATENT_LOG_FORMAT",
    ];

    pub(crate) fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load().unwrap();
        assert_eq!(cfg.chunk_size, 256);
        assert_eq!(cfg.backend.kind(), BackendKind::Memory);
        assert_eq!(cfg.codec.kind, CodecKind::Safetensors);
        assert_eq!(cfg.log.level, "info");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("GG_LATENT_CHUNK_SIZE", "64");
        std::env::set_var("GG_LATENT_BACKEND", "lmdb");
        std::env::set_var("GG_LATENT_LMDB_PATH", "/tmp/latent-env");
        std::env::set_var("GG_LATENT_LMDB_MAP_SIZE", "1048576");
        let cfg = load().unwrap();
        assert_eq!(cfg.chunk_size, 64);
        assert_eq!(
            cfg.backend,
            BackendConfig::Lmdb(LmdbConfig {
                path: PathBuf::from("/tmp/latent-env"),
                map_size: 1_048_576,
            })
        );
        clear_env_vars();
    }

    #[test]
    fn test_invalid_numeric_falls_back() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("GG_LATENT_CHUNK_SIZE", "not_a_number");
        std::env::set_var("GG_LATENT_RAW_LAYERS", "-3");
        let cfg = load().unwrap();
        assert_eq!(cfg.chunk_size, 256);
        assert_eq!(cfg.codec.raw_layers, 0);
        clear_env_vars();
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("GG_LATENT_BACKEND", "cassandra");
        let err = load().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: "GG_LATENT_BACKEND", .. }
        ));
        clear_env_vars();
    }

    #[test]
    fn test_redis_env_applies_to_pipelined() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("GG_LATENT_BACKEND", "redis-pipelined");
        std::env::set_var("GG_LATENT_REDIS_URL", "redis://cache:6380/2");
        std::env::set_var("GG_LATENT_REDIS_KEY_PREFIX", "m1:");
        let cfg = load().unwrap();
        match cfg.backend {
            BackendConfig::RedisPipelined(redis) => {
                assert_eq!(redis.url, "redis://cache:6380/2");
                assert_eq!(redis.key_prefix, "m1:");
                assert_eq!(redis.connect_timeout_secs, 5);
            }
            other => panic!("unexpected backend {:?}", other),
        }
        clear_env_vars();
    }

    #[test]
    fn test_toml_file_then_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latent.toml");
        std::fs::write(
            &path,
            r#"
chunk_size = 32

[backend]
kind = "redis"
url = "redis://file-host:6379/"

[codec]
kind = "raw"
raw_dtype = "bf16"
raw_layers = 4
raw_hidden = 8
"#,
        )
        .unwrap();
        std::env::set_var("GG_LATENT_CONFIG", &path);
        std::env::set_var("GG_LATENT_CHUNK_SIZE", "16");
        let cfg = load().unwrap();
        assert_eq!(cfg.chunk_size, 16);
        assert_eq!(cfg.backend.kind(), BackendKind::Redis);
        assert_eq!(cfg.codec.kind, CodecKind::Raw);
        assert_eq!(cfg.codec.raw_dtype, LatentDType::BF16);
        assert_eq!(cfg.effective_config().location, "redis://file-host:6379/");
        assert!(cfg.validate().is_ok());
        clear_env_vars();
    }

    #[test]
    fn test_missing_file_is_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("GG_LATENT_CONFIG", "/nonexistent/latent.toml");
        assert!(matches!(load(), Err(ConfigError::Read { .. })));
        clear_env_vars();
    }

    #[test]
    fn test_validate_rejects_incomplete_raw_codec() {
        let mut cfg = LatentCacheConfig::default();
        cfg.codec.kind = CodecKind::Raw;
        cfg.codec.raw_layers = 2;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
        cfg.codec.raw_hidden = 16;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_chunk_size() {
        let cfg = LatentCacheConfig {
            chunk_size: 0,
            ..LatentCacheConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_effective_config_display() {
        let text = LatentCacheConfig::default().effective_config().to_string();
        assert!(text.contains("GG_LATENT_CHUNK_SIZE=256"));
        assert!(text.contains("GG_LATENT_BACKEND=memory"));
        assert!(!text.contains("GG_LATENT_RAW_LAYERS"));
    }
}
