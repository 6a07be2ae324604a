use serde::Deserialize;
use std::path::Path;

/// Runtime settings of the manager.
///
/// Loaded from an optional TOML file layered with `SERVER_MANAGER_*`
/// environment variables. Missing keys fall back to [`ManagerConfig::default`].
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ManagerConfig {
    pub log_level: String,

    // Worker launch
    pub worker_program: String,
    pub worker_args: Vec<String>, // Placed before <name> <min> <max>

    // Policy
    pub min_replicas_floor: usize,

    // Console
    pub max_args: usize,
    pub prompt: String,

    pub shutdown_grace_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),

            worker_program: "./replica-server".to_string(),
            worker_args: Vec::new(),

            min_replicas_floor: 2,

            max_args: 5,
            prompt: "Please enter the next command --> ".to_string(),

            shutdown_grace_ms: 2000,
        }
    }
}

impl ManagerConfig {
    /// Environment prefix, e.g. `SERVER_MANAGER_WORKER_PROGRAM`.
    pub const ENV_PREFIX: &'static str = "SERVER_MANAGER";

    /// Loads the configuration from `path` (optional on disk) and the environment.
    pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::File::new(&path.to_string_lossy(), config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix(Self::ENV_PREFIX))
            .build()?
            .try_deserialize()
    }

    /// Builds the worker argv for one replica: program, fixed args, then `<name> <min> <max>`.
    pub fn worker_argv(&self, name: &str, min: usize, max: usize) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.worker_args.len() + 4);
        argv.push(self.worker_program.clone());
        argv.extend(self.worker_args.iter().cloned());
        argv.push(name.to_string());
        argv.push(min.to_string());
        argv.push(max.to_string());
        argv
    }
}
