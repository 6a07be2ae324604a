use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ManagerConfig;
use crate::parser::Command;

/// Command-line interface of the manager.
#[derive(Parser, Debug)]
#[command(name = "server-manager", version)]
#[command(about = "Spawns and supervises pools of local worker servers")]
pub struct Cli {
    /// How the first server group is seeded.
    #[command(subcommand)]
    pub mode: Mode,

    /// Path to a TOML configuration file (optional on disk).
    #[arg(long, global = true, default_value = "server-manager.toml")]
    pub config: PathBuf,

    /// Worker executable, overrides `worker_program`.
    #[arg(long, global = true)]
    pub worker: Option<String>,

    /// Extra argument placed before `<name> <min> <max>` (repeatable).
    #[arg(long = "worker-arg", global = true, allow_hyphen_values = true)]
    pub worker_args: Vec<String>,

    /// Log filter, overrides `log_level`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Create the first server group, then enter the interactive loop.
    #[command(name = "createServer")]
    CreateServer {
        /// Name of the server group.
        name: String,
        /// Minimum replica count (raised to the configured floor).
        min: usize,
        /// Maximum replica count.
        max: usize,
    },
}

impl Cli {
    /// Folds the command-line overrides into a loaded configuration.
    pub fn apply(&self, config: &mut ManagerConfig) {
        if let Some(worker) = &self.worker {
            config.worker_program = worker.clone();
        }
        if !self.worker_args.is_empty() {
            config.worker_args = self.worker_args.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }

    /// The command that seeds the registry before the loop starts.
    pub fn initial_command(&self) -> Command {
        match &self.mode {
            Mode::CreateServer { name, min, max } => Command::CreateServer {
                name: name.clone(),
                min: *min,
                max: *max,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_server_mode() {
        let cli = Cli::try_parse_from(["server-manager", "createServer", "webA", "1", "4"]).unwrap();
        assert_eq!(
            cli.initial_command(),
            Command::CreateServer {
                name: "webA".into(),
                min: 1,
                max: 4
            }
        );
    }

    #[test]
    fn test_missing_startup_arguments_fail() {
        assert!(Cli::try_parse_from(["server-manager"]).is_err());
        assert!(Cli::try_parse_from(["server-manager", "createServer", "webA"]).is_err());
        assert!(Cli::try_parse_from(["server-manager", "createServer", "webA", "x", "4"]).is_err());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let cli = Cli::try_parse_from([
            "server-manager",
            "createServer",
            "webA",
            "2",
            "4",
            "--worker",
            "/bin/sh",
            "--worker-arg",
            "-c",
            "--worker-arg",
            "sleep 30",
        ])
        .unwrap();
        let mut config = ManagerConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.worker_program, "/bin/sh");
        assert_eq!(config.worker_args, vec!["-c", "sleep 30"]);
        assert_eq!(config.log_level, "info");
    }
}
