//! Loading `SimConfig` from JSON files and applying command-line overrides.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use citypulse_core::SimConfig;

/// Values supplied on the command line that take precedence over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub agent_count: Option<usize>,
    pub rng_seed: Option<u64>,
    pub base_tick_ms: Option<u64>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut SimConfig) {
        if let Some(count) = self.agent_count {
            config.agent_count = count;
        }
        if let Some(seed) = self.rng_seed {
            config.rng_seed = Some(seed);
        }
        if let Some(ms) = self.base_tick_ms {
            config.base_tick_ms = ms;
        }
    }
}

/// Parse a JSON config. Missing fields take their defaults; type errors name
/// the offending field path.
pub fn parse_config(raw: &str) -> Result<SimConfig> {
    let mut de = serde_json::Deserializer::from_str(raw);
    let config: SimConfig = serde_path_to_error::deserialize(&mut de)
        .map_err(|e: serde_path_to_error::Error<serde_json::Error>| {
            anyhow!("{} at {}", e.inner(), e.path())
        })?;
    Ok(config)
}

/// Read the config at `path`, or fall back to defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<SimConfig> {
    let Some(path) = path else {
        return Ok(SimConfig::default());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("invalid config file {}", path.display()))
}

/// Load, override, and validate in one step.
pub fn resolve_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<SimConfig> {
    let mut config = load_config(path)?;
    overrides.apply(&mut config);
    config.validate().context("configuration rejected")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_path_yields_defaults() {
        assert_eq!(load_config(None).expect("defaults"), SimConfig::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let mut file = NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"agent_count": 2500, "rng_seed": 99}}"#).expect("write");
        let config = load_config(Some(file.path())).expect("config");
        assert_eq!(config.agent_count, 2_500);
        assert_eq!(config.rng_seed, Some(99));
        assert_eq!(config.base_tick_ms, SimConfig::default().base_tick_ms);
    }

    #[test]
    fn type_errors_report_field_path() {
        let err = parse_config(r#"{"agent_count": "many"}"#).expect_err("bad type");
        assert!(err.to_string().contains("agent_count"), "{err}");
    }

    #[test]
    fn overrides_win_and_are_validated() {
        let mut file = NamedTempFile::new().expect("tempfile");
        write!(file, r#"{{"agent_count": 2500}}"#).expect("write");
        let overrides = ConfigOverrides {
            agent_count: Some(300),
            rng_seed: Some(4),
            base_tick_ms: None,
        };
        let config = resolve_config(Some(file.path()), &overrides).expect("config");
        assert_eq!(config.agent_count, 300);
        assert_eq!(config.rng_seed, Some(4));

        let zero = ConfigOverrides {
            agent_count: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(resolve_config(None, &zero).is_err());
    }

    #[test]
    fn unreadable_path_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("absent.json");
        let err = load_config(Some(&missing)).expect_err("missing file");
        assert!(format!("{err:#}").contains("absent.json"));
    }
}
