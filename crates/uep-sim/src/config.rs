//! # Run Configuration
//!
//! YAML run files describing one simulated point, plus the ambient settings
//! (seed, worker count, CDF cache location, logging).
//!
//! ## Configuration Search Path
//!
//! The run file is loaded from the first location found:
//! 1. Path given by the `UEP_SIM_CONFIG` environment variable
//! 2. `./uep-sim.yaml` (current directory)
//! 3. `~/.config/uep-sim/config.yaml` (user config)
//! 4. `/etc/uep-sim/config.yaml` (system config)
//!
//! ## Example Run File
//!
//! ```yaml
//! simulation:
//!   ks: [100, 900]
//!   rfs: [3, 1]
//!   ef: 4
//!   c: 0.1
//!   delta: 0.5
//!   overhead: 0.25
//!   nblocks: 1000
//!   channel: { kind: gilbert_elliott, p: 0.01, q: 0.1 }
//! seed: 42
//! workers: 0
//! logging:
//!   level: info
//!   format: compact
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use uep_core::observe::LogConfig;
use uep_core::{CdfCache, UepError, UepResult};

use crate::parallel::ParallelReducer;
use crate::simulation::{Simulation, SimulationParameters};

/// Environment variable naming the run file
pub const CONFIG_ENV: &str = "UEP_SIM_CONFIG";

/// Complete run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Simulated point
    pub simulation: SimulationParameters,
    /// Run seed; drawn from entropy when absent
    pub seed: Option<u64>,
    /// Worker threads, 0 for one per CPU
    pub workers: usize,
    /// Degree CDF cache directory; per-user cache directory when absent
    pub cache_dir: Option<PathBuf>,
    /// Logging configuration
    pub logging: LogConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationParameters::default(),
            seed: None,
            workers: 0,
            cache_dir: None,
            logging: LogConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load the run file from the default search path.
    ///
    /// A path in `UEP_SIM_CONFIG` must exist. Returns the default
    /// configuration if no file is found on the search path.
    pub fn load() -> UepResult<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        for path in Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load a run file.
    pub fn load_from(path: &Path) -> UepResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| UepError::Config(format!("{}: {}", path.display(), e)))?;

        Self::parse(&content).map_err(|e| UepError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a run file from YAML.
    pub fn parse(yaml: &str) -> UepResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| UepError::Config(e.to_string()))
    }

    /// Write the configuration as YAML.
    pub fn save(&self, path: &Path) -> UepResult<()> {
        let content = serde_yaml::to_string(self).map_err(|e| UepError::Config(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| UepError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Run file search paths, after `UEP_SIM_CONFIG`.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./uep-sim.yaml")];

        if let Some(dirs) = directories::ProjectDirs::from("", "", "uep-sim") {
            paths.push(dirs.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/uep-sim/config.yaml"));
        paths
    }

    /// Check the simulated point before any work is done.
    pub fn validate(&self) -> UepResult<()> {
        self.simulation.validate()
    }

    /// The configured seed, or a fresh one from entropy.
    pub fn resolve_seed(&self) -> u64 {
        match self.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random();
                info!(seed, "no seed configured, drew one from entropy");
                seed
            }
        }
    }

    /// CDF cache at `cache_dir`, or in the per-user cache directory.
    pub fn cache(&self) -> CdfCache {
        match &self.cache_dir {
            Some(dir) => CdfCache::new(dir),
            None => CdfCache::default_location(),
        }
    }

    /// Simulation for the configured point, with its CDF going through the cache.
    pub fn build_simulation(&self) -> UepResult<Simulation> {
        self.validate()?;
        Simulation::with_cache(&self.simulation, self.resolve_seed(), &self.cache())
    }

    /// Reducer with the configured worker count.
    pub fn reducer(&self) -> ParallelReducer {
        ParallelReducer::new(self.workers)
    }

    /// Example run file.
    pub fn example_yaml() -> String {
        let config = Self {
            seed: Some(42),
            ..Default::default()
        };
        serde_yaml::to_string(&config).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uep_core::observe::{LogFormat, LogLevel};
    use uep_core::{CdfOrigin, ChannelKind};

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.simulation.code.ks, vec![100, 900]);
        assert_eq!(config.workers, 0);
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
simulation:
  ks: [10, 40]
  rfs: [2, 1]
  ef: 2
  c: 0.1
  delta: 0.5
  overhead: 0.3
  nblocks: 24
  channel: { kind: gilbert_elliott, p: 0.01, q: 0.1 }
seed: 7
workers: 3
logging:
  level: debug
  format: json
"#;

        let config = RunConfig::parse(yaml).unwrap();
        assert_eq!(config.simulation.code.ks, vec![10, 40]);
        assert_eq!(config.simulation.code.rfs, vec![2, 1]);
        assert_eq!(config.simulation.code.ef, 2);
        assert_eq!(config.simulation.overhead, 0.3);
        assert_eq!(config.simulation.nblocks, 24);
        assert_eq!(
            config.simulation.channel,
            ChannelKind::GilbertElliott { p: 0.01, q: 0.1 }
        );
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.reducer().workers(), 3);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_channel_kinds() {
        let kinds = [
            ("{ kind: perfect }", ChannelKind::Perfect),
            ("{ kind: iid, erasure: 0.1 }", ChannelKind::Iid { erasure: 0.1 }),
            (
                "{ kind: gilbert_elliott_runs, avg_good_run: 100, avg_bad_run: 10 }",
                ChannelKind::GilbertElliottRuns {
                    avg_good_run: 100.0,
                    avg_bad_run: 10.0,
                },
            ),
        ];
        for (yaml, expected) in kinds {
            let parsed: ChannelKind = serde_yaml::from_str(yaml).unwrap();
            assert_eq!(parsed, expected);
        }
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
seed: 3
logging:
  format: compact
"#;
        let config = RunConfig::parse(yaml).unwrap();
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.logging.format, LogFormat::Compact);
        // Defaults should be applied
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.simulation, SimulationParameters::default());
    }

    #[test]
    fn test_validation() {
        let mut config = RunConfig::default();
        config.simulation.code.rfs = vec![1, 1, 1];
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.simulation.channel = ChannelKind::GilbertElliott { p: 0.0, q: 0.0 };
        assert!(config.validate().is_err());
        assert!(config.build_simulation().is_err());
    }

    #[test]
    fn test_malformed_yaml() {
        let err = RunConfig::parse("simulation: [1, 2").unwrap_err();
        assert!(matches!(err, UepError::Config(_)));

        let err = RunConfig::parse("simulation: { channel: { kind: laser } }").unwrap_err();
        assert!(matches!(err, UepError::Config(_)));
    }

    #[test]
    fn test_example_yaml() {
        let yaml = RunConfig::example_yaml();
        assert!(yaml.contains("simulation:"));
        assert!(yaml.contains("kind: perfect"));
        let parsed = RunConfig::parse(&yaml).unwrap();
        assert_eq!(parsed.seed, Some(42));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.yaml");

        let mut config = RunConfig::default();
        config.seed = Some(11);
        config.simulation.channel = ChannelKind::Iid { erasure: 0.05 };
        config.save(&path).unwrap();

        assert_eq!(RunConfig::load_from(&path).unwrap(), config);
        assert!(matches!(
            RunConfig::load_from(&dir.path().join("missing.yaml")),
            Err(UepError::Config(_))
        ));
    }

    #[test]
    fn test_build_simulation_uses_cache_dir() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig {
            cache_dir: Some(dir.path().to_path_buf()),
            seed: Some(1),
            ..Default::default()
        };

        let sim = config.build_simulation().unwrap();
        assert_eq!(sim.seed(), 1);
        assert_eq!(sim.nblocks(), 1000);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let again = config.cache();
        let key = uep_core::CdfKey::new(4800, 0.1, 0.5);
        assert!(again.path_for(&key).exists());
        let sampler = uep_core::DegreeSampler::cached(4800, 0.1, 0.5, &again).unwrap();
        assert_eq!(sampler.origin(), CdfOrigin::Loaded);
    }

    #[test]
    fn test_config_search_paths() {
        let paths = RunConfig::config_search_paths();
        assert!(!paths.is_empty());
        assert!(paths[0].ends_with("uep-sim.yaml"));
        assert!(paths.last().unwrap().starts_with("/etc/uep-sim"));
    }
}
