//! Local process supervisor for named pools of worker servers.
//!
//! An operator issues line commands (`createServer`, `abortServer`,
//! `createProcess`, `abortProcess`, `displayStatus`); the [`Dispatcher`]
//! validates them against the [`Registry`] and drives the [`Supervisor`], which
//! spawns, signals and reaps the worker processes.

pub mod args;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod parser;
pub mod registry;
pub mod runtime;
pub mod supervisor;

pub use config::ManagerConfig;
pub use dispatcher::{Dispatcher, Flow, Report};
pub use error::{ManagerError, Result};
pub use parser::Command;
pub use registry::Registry;
pub use supervisor::Supervisor;
