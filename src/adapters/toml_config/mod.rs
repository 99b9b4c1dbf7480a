// Config adapter - Application configuration from TOML/YAML files and FRAGCUT_* variables

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adapters::tracing_log::LoggingConfig;
use crate::domain::model::{EncoderTier, TrimStrategy};
use crate::domain::rules::ValidationLimits;
use crate::engine::ExecutorConfig;
use crate::error::{FragCutError, FragCutResult};

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "FRAGCUT_";

/// Files tried, in order, when no explicit config file is given
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["fragcut.toml", "config/fragcut.toml"];

/// Which adapter probes media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    #[default]
    Ffprobe,
    /// In-process probing; needs the `libav` feature
    Libav,
}

/// Media backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// `ffmpeg` binary name or path
    pub ffmpeg: String,
    /// `ffprobe` binary name or path
    pub ffprobe: String,
    pub probe: ProbeBackend,
    /// Encoder threads handed to FFmpeg
    pub threads: Option<usize>,
    /// FFmpeg `-v` level
    pub log_level: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            probe: ProbeBackend::Ffprobe,
            threads: Some(num_cpus::get()),
            log_level: "error".to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub limits: ValidationLimits,
    pub executor: ExecutorConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reject values that cannot work at runtime
    pub fn validate(&self) -> FragCutResult<()> {
        let executor = &self.executor;
        if !(0.0..=1.0).contains(&executor.progress_step) {
            return Err(FragCutError::Config(format!(
                "executor.progress_step must be within [0, 1], got {}",
                executor.progress_step
            )));
        }
        if executor.cancel_grace_ms == 0 {
            return Err(FragCutError::Config(
                "executor.cancel_grace_ms must be positive".to_string(),
            ));
        }
        if executor.default_timeout_secs == Some(0) {
            return Err(FragCutError::Config(
                "executor.default_timeout_secs must be positive when set".to_string(),
            ));
        }
        let max_fps = self.limits.max_fps;
        if self.limits.max_width == 0 || self.limits.max_height == 0 || !(max_fps.is_finite() && max_fps > 0.0) {
            return Err(FragCutError::Config(
                "limits must all be positive and finite".to_string(),
            ));
        }
        if self.backend.threads == Some(0) {
            return Err(FragCutError::Config(
                "backend.threads must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads `AppConfig` from files and the environment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            search_paths: DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// File layer: the explicit file if given, else the first default path that exists.
    ///
    /// Returns the defaults when no file is found; a missing explicit file is an error.
    pub fn load_file_layer(&self, explicit: Option<&Path>) -> FragCutResult<(AppConfig, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }

        for path in &self.search_paths {
            if path.is_file() {
                info!("Loading configuration from: {}", path.display());
                return Ok((Self::from_file(path)?, Some(path.clone())));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok((AppConfig::default(), None))
    }

    /// Parse one file, choosing the format from its extension
    pub fn from_file(path: &Path) -> FragCutResult<AppConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| FragCutError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let parsed = match extension.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
            "toml" | "" => toml::from_str(&content).map_err(|e| e.to_string()),
            other => Err(format!("unsupported configuration format '{}'", other)),
        };

        parsed.map_err(|message| FragCutError::ConfigFile {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Apply `FRAGCUT_*` overrides from the process environment
    pub fn apply_process_env(config: &mut AppConfig) -> FragCutResult<usize> {
        Self::apply_env(config, std::env::vars())
    }

    /// Apply `FRAGCUT_*` overrides from `vars`; returns how many were applied
    pub fn apply_env<I>(config: &mut AppConfig, vars: I) -> FragCutResult<usize>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut applied = 0;
        for (name, value) in vars {
            let Some(key) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if apply_env_value(config, key, value.trim())? {
                info!("Found environment override: {} = {}", name, value);
                applied += 1;
            }
        }
        Ok(applied)
    }
}

fn apply_env_value(config: &mut AppConfig, key: &str, value: &str) -> FragCutResult<bool> {
    match key {
        "FFMPEG" => config.backend.ffmpeg = value.to_string(),
        "FFPROBE" => config.backend.ffprobe = value.to_string(),
        "PROBE" => {
            config.backend.probe = match value.to_lowercase().as_str() {
                "ffprobe" => ProbeBackend::Ffprobe,
                "libav" => ProbeBackend::Libav,
                other => return Err(env_error(key, format!("unknown probe backend '{}'", other))),
            }
        }
        "THREADS" => config.backend.threads = Some(parse_env(key, value)?),
        "FFMPEG_LOG_LEVEL" => config.backend.log_level = value.to_string(),
        "TRIM_STRATEGY" => {
            config.executor.trim_strategy =
                TrimStrategy::parse(value).map_err(|e| env_error(key, e.to_string()))?
        }
        "ENCODER_TIER" => {
            config.executor.encoder_tier =
                EncoderTier::parse(value).map_err(|e| env_error(key, e.to_string()))?
        }
        "PROGRESS_INTERVAL_MS" => config.executor.progress_interval_ms = parse_env(key, value)?,
        "PROGRESS_STEP" => config.executor.progress_step = parse_env(key, value)?,
        "CANCEL_GRACE_MS" => config.executor.cancel_grace_ms = parse_env(key, value)?,
        "TIMEOUT_SECS" => config.executor.default_timeout_secs = Some(parse_env(key, value)?),
        "MAX_WIDTH" => config.limits.max_width = parse_env(key, value)?,
        "MAX_HEIGHT" => config.limits.max_height = parse_env(key, value)?,
        "MAX_FPS" => config.limits.max_fps = parse_env(key, value)?,
        "LOG_LEVEL" => config.logging.level = value.to_string(),
        "LOG_JSON" => config.logging.json = parse_env(key, value)?,
        _ => return Ok(false),
    }
    Ok(true)
}

fn parse_env<T>(key: &str, value: &str) -> FragCutResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| env_error(key, format!("'{}': {}", value, e)))
}

fn env_error(key: &str, message: String) -> FragCutError {
    FragCutError::Config(format!("{}{}: {}", ENV_PREFIX, key, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.executor.trim_strategy, TrimStrategy::Auto);
        assert_eq!(config.executor.encoder_tier, EncoderTier::Fast);
        assert_eq!(config.backend.ffmpeg, "ffmpeg");
        assert!(config.backend.threads.unwrap() >= 1);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[executor]\ntrim_strategy = \"reencode\"\nprogress_step = 0.1\n\n[limits]\nmax_fps = 120.0\n"
        )
        .unwrap();

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert_eq!(config.executor.trim_strategy, TrimStrategy::Reencode);
        assert_eq!(config.executor.progress_step, 0.1);
        assert_eq!(config.executor.progress_interval_ms, 1000);
        assert_eq!(config.limits.max_fps, 120.0);
        assert_eq!(config.limits.max_width, 7680);
    }

    #[test]
    fn test_yaml_file_is_supported() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "executor:\n  encoder_tier: quality\nlogging:\n  json: true").unwrap();

        let config = ConfigLoader::from_file(file.path()).unwrap();
        assert_eq!(config.executor.encoder_tier, EncoderTier::Quality);
        assert!(config.logging.json);
    }

    #[test]
    fn test_bad_file_reports_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[executor\n").unwrap();
        let err = ConfigLoader::from_file(file.path()).unwrap_err();
        assert!(matches!(err, FragCutError::ConfigFile { .. }));
    }

    #[test]
    fn test_missing_default_files_fall_back_to_defaults() {
        let loader = ConfigLoader::with_search_paths(vec![PathBuf::from("/nonexistent/fragcut.toml")]);
        let (config, source) = loader.load_file_layer(None).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(source.is_none());

        assert!(loader
            .load_file_layer(Some(Path::new("/nonexistent/explicit.toml")))
            .is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        let applied = ConfigLoader::apply_env(
            &mut config,
            vars(&[
                ("FRAGCUT_TRIM_STRATEGY", "copy"),
                ("FRAGCUT_TIMEOUT_SECS", "90"),
                ("FRAGCUT_LOG_JSON", "true"),
                ("FRAGCUT_UNKNOWN", "x"),
                ("PATH", "/usr/bin"),
            ]),
        )
        .unwrap();

        assert_eq!(applied, 3);
        assert_eq!(config.executor.trim_strategy, TrimStrategy::Copy);
        assert_eq!(config.executor.default_timeout_secs, Some(90));
        assert!(config.logging.json);
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        let mut config = AppConfig::default();
        let err = ConfigLoader::apply_env(&mut config, vars(&[("FRAGCUT_PROGRESS_STEP", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("FRAGCUT_PROGRESS_STEP"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.executor.progress_step = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.backend.threads = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_fps_limit_is_rejected() {
        for value in ["NaN", "inf"] {
            let mut config = AppConfig::default();
            ConfigLoader::apply_env(&mut config, vars(&[("FRAGCUT_MAX_FPS", value)])).unwrap();
            assert!(config.validate().is_err(), "max_fps = {}", value);
        }
    }
}
