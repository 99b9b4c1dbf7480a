//! Configuration initialization and hierarchy management

use std::path::PathBuf;

use tracing::info;

use crate::adapters::{AppConfig, ConfigLoader};
use crate::cli::{Cli, Commands};
use crate::error::FragCutResult;

/// Configuration after all layers were applied, plus where it came from
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
    pub env_overrides: usize,
    pub cli_overrides: usize,
}

impl ResolvedConfig {
    /// Log the resolution; call once logging is up
    pub fn log_summary(&self) {
        match &self.source {
            Some(path) => info!("Configuration loaded from: {}", path.display()),
            None => info!("No configuration file found, using defaults"),
        }
        if self.env_overrides > 0 {
            info!("Applied {} environment variable overrides", self.env_overrides);
        }
        if self.cli_overrides > 0 {
            info!("Applied {} CLI configuration overrides", self.cli_overrides);
        }
    }
}

/// Build the configuration following precedence: CLI > Env > File > Defaults
pub fn initialize_configuration_hierarchy(cli: &Cli) -> FragCutResult<ResolvedConfig> {
    initialize_with(&ConfigLoader::new(), cli, std::env::vars())
}

/// Same as [`initialize_configuration_hierarchy`] with an explicit loader and environment
pub fn initialize_with<I>(loader: &ConfigLoader, cli: &Cli, env: I) -> FragCutResult<ResolvedConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let (mut config, source) = loader.load_file_layer(cli.config.as_deref())?;
    let env_overrides = ConfigLoader::apply_env(&mut config, env)?;
    let cli_overrides = apply_cli_configuration_overrides(&mut config, cli);
    config.validate()?;

    Ok(ResolvedConfig {
        config,
        source,
        env_overrides,
        cli_overrides,
    })
}

/// Apply CLI argument overrides to configuration
fn apply_cli_configuration_overrides(config: &mut AppConfig, cli: &Cli) -> usize {
    let mut cli_overrides = 0;

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
        cli_overrides += 1;
    }
    if cli.log_json {
        config.logging.json = true;
        cli_overrides += 1;
    }
    if let Some(threads) = cli.threads {
        config.backend.threads = Some(threads);
        cli_overrides += 1;
    }

    let run = match &cli.command {
        Commands::Trim(args) => {
            if let Some(strategy) = args.strategy {
                config.executor.trim_strategy = strategy;
                cli_overrides += 1;
            }
            Some(&args.run)
        }
        Commands::Export(args) => Some(&args.run),
        Commands::Probe(_) | Commands::Verify(_) => None,
    };
    if let Some(tier) = run.and_then(|run| run.tier) {
        config.executor.encoder_tier = tier;
        cli_overrides += 1;
    }

    cli_overrides
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    use crate::domain::model::{EncoderTier, TrimStrategy};

    fn no_files() -> ConfigLoader {
        ConfigLoader::with_search_paths(Vec::new())
    }

    fn env(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_cli_beats_env_beats_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[executor]\ntrim_strategy = \"copy\"\nencoder_tier = \"quality\"\n\n[logging]\nlevel = \"warn\""
        )
        .unwrap();
        let config_path = file.path().to_string_lossy().to_string();

        let cli = Cli::try_parse_from([
            "fragcut",
            "--config",
            config_path.as_str(),
            "trim",
            "-i",
            "in.mp4",
            "-s",
            "1",
            "-e",
            "2",
            "--strategy",
            "reencode",
        ])
        .unwrap();

        let resolved = initialize_with(
            &no_files(),
            &cli,
            env(&[("FRAGCUT_TRIM_STRATEGY", "auto"), ("FRAGCUT_LOG_LEVEL", "debug")]),
        )
        .unwrap();

        let config = &resolved.config;
        assert_eq!(config.executor.trim_strategy, TrimStrategy::Reencode);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.executor.encoder_tier, EncoderTier::Quality);
        assert_eq!(resolved.env_overrides, 2);
        assert_eq!(resolved.cli_overrides, 1);
        assert!(resolved.source.is_some());
    }

    #[test]
    fn test_export_tier_override() {
        let cli = Cli::try_parse_from([
            "fragcut", "--threads", "2", "export", "-i", "in.mp4", "--preset", "9:16", "--tier",
            "balanced",
        ])
        .unwrap();

        let resolved = initialize_with(&no_files(), &cli, Vec::new()).unwrap();
        assert_eq!(resolved.config.executor.encoder_tier, EncoderTier::Balanced);
        assert_eq!(resolved.config.backend.threads, Some(2));
        assert_eq!(resolved.cli_overrides, 2);
    }

    #[test]
    fn test_invalid_layer_is_an_error() {
        let cli = Cli::try_parse_from(["fragcut", "probe", "-i", "in.mp4"]).unwrap();
        assert!(initialize_with(&no_files(), &cli, env(&[("FRAGCUT_THREADS", "0")])).is_err());
    }
}
