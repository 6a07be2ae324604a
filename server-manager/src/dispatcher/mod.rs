//! The control loop: read a command, validate it against the registry, drive
//! the supervisor, report back to the operator.
//!
//! The dispatcher is the single owner of the [`Registry`]. Operator commands and
//! child-exit notifications are handled on the same task, so registry
//! mutations never interleave.

use crate::config::ManagerConfig;
use crate::error::{ManagerError, Result};
use crate::parser::Command;
use crate::registry::models::{GroupState, ReplicaState};
use crate::registry::Registry;
use crate::runtime::{LocalRuntime, ProcessRuntime};
use crate::supervisor::{ExitReport, Supervisor};
use log::{error, info, warn};
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time::{self, Duration, Instant};

const PREFIX: &str = "[Server Manager]:";

/// Whether the loop keeps going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

/// Operator-facing result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub lines: Vec<String>,
    pub flow: Flow,
}

impl Report {
    fn lines(lines: Vec<String>) -> Self {
        Self {
            lines,
            flow: Flow::Continue,
        }
    }

    fn line(line: String) -> Self {
        Self::lines(vec![line])
    }
}

pub struct Dispatcher<R: ProcessRuntime> {
    config: ManagerConfig,
    registry: Registry,
    supervisor: Supervisor<R>,
}

impl Dispatcher<LocalRuntime> {
    pub fn local(config: ManagerConfig) -> Self {
        Self::new(config, Supervisor::local())
    }
}

impl<R: ProcessRuntime> Dispatcher<R> {
    pub fn new(config: ManagerConfig, supervisor: Supervisor<R>) -> Self {
        let registry = Registry::new(config.min_replicas_floor);
        Self {
            config,
            registry,
            supervisor,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Validates and runs one command. On error the registry is unchanged.
    ///
    /// Signals are sent after the registry has moved on, so a failed signal is
    /// logged and shown in the report instead of being returned.
    pub async fn execute(&mut self, command: Command) -> Result<Report> {
        match command {
            Command::CreateServer { name, min, max } => {
                self.create_server(&name, min, max).await.map(Report::lines)
            }
            Command::AbortServer { name } => self.abort_server(&name).await.map(Report::line),
            Command::CreateProcess { name } => self.create_process(&name).await.map(Report::line),
            Command::AbortProcess { name } => self.abort_process(&name).await.map(Report::line),
            Command::DisplayStatus => Ok(Report::lines(self.display_status())),
            Command::Shutdown => Ok(Report {
                lines: vec![format!("{} Shutdown requested", PREFIX)],
                flow: Flow::Shutdown,
            }),
        }
    }

    async fn create_server(&mut self, name: &str, min: usize, max: usize) -> Result<Vec<String>> {
        let mut lines = Vec::new();

        let floor = self.registry.floor();
        let group = self.registry.insert(name, min, max)?;
        if min < floor {
            lines.push(format!(
                "{} Minimum processes set to default of {}",
                PREFIX, floor
            ));
        }
        let (min, max) = (group.min_replicas(), group.max_replicas());
        let argv = self.config.worker_argv(name, min, max);

        let handle = match self.supervisor.spawn(name, &argv).await {
            Ok(handle) => handle,
            Err(e) => {
                // Never leave a Pending entry without a process behind.
                self.registry.discard_pending(name);
                return Err(e);
            }
        };
        self.registry.attach_process(name, handle)?;

        lines.push(format!(
            "{} Started server {} (PID {}, min {}, max {})",
            PREFIX, name, handle, min, max
        ));
        Ok(lines)
    }

    async fn abort_server(&mut self, name: &str) -> Result<String> {
        let handles = self.registry.mark_terminating(name)?;
        if handles.is_empty() {
            return Ok(format!("{} Server {} is already terminating", PREFIX, name));
        }

        // The group is Terminating from here on; a failed signal is reported, not undone.
        let mut failed = 0;
        for handle in &handles {
            if let Err(e) = self.supervisor.signal_terminate(*handle).await {
                warn!("Dispatcher: [{}] PID {} not signalled: {}", name, handle, e);
                failed += 1;
            }
        }
        let mut line = format!(
            "{} Terminating server {} ({} process(es) signalled)",
            PREFIX,
            name,
            handles.len() - failed
        );
        if failed > 0 {
            line.push_str(&format!(", {} signal(s) failed", failed));
        }
        Ok(line)
    }

    async fn create_process(&mut self, name: &str) -> Result<String> {
        let group = self.registry.check_scale_up(name)?;
        let argv = self
            .config
            .worker_argv(name, group.min_replicas(), group.max_replicas());
        let max = group.max_replicas();

        let handle = self.supervisor.spawn(name, &argv).await?;
        let active = self.registry.add_replica(name, handle)?;
        Ok(format!(
            "{} Added process {} to {} ({}/{} active)",
            PREFIX, handle, name, active, max
        ))
    }

    async fn abort_process(&mut self, name: &str) -> Result<String> {
        if self.registry.lookup(name)?.state() == GroupState::Terminating {
            return Ok(format!("{} Server {} is already terminating", PREFIX, name));
        }
        let handle = self.registry.retire_replica(name)?;
        let mut line = format!("{} Terminating process {} of {}", PREFIX, handle, name);
        if let Err(e) = self.supervisor.signal_terminate(handle).await {
            warn!("Dispatcher: [{}] PID {} not signalled: {}", name, handle, e);
            line = format!("{} Retired process {} of {}, signal failed", PREFIX, handle, name);
        }

        let group = self.registry.lookup(name)?;
        line.push_str(&format!(
            " ({} active, min {})",
            group.active_count(),
            group.min_replicas()
        ));
        Ok(line)
    }

    fn display_status(&self) -> Vec<String> {
        if self.registry.is_empty() {
            return vec![format!("{} No servers registered", PREFIX)];
        }

        let mut lines = vec![
            format!(
                "{:<16} | {:<11} | {:>6} | {:>3} | {:>3} | {:>7} | {}",
                "NAME", "STATE", "ACTIVE", "MIN", "MAX", "PID", "REPLICAS"
            ),
            format!(
                "{:-<16}-+-{:-<11}-+-{:-<6}-+-{:-<3}-+-{:-<3}-+-{:-<7}-+-{:-<8}",
                "", "", "", "", "", "", ""
            ),
        ];
        for group in self.registry.iter() {
            let replicas: Vec<String> = group
                .replicas()
                .iter()
                .map(|r| match r.state() {
                    ReplicaState::Running => r.handle().to_string(),
                    ReplicaState::Terminating => format!("{}*", r.handle()),
                })
                .collect();
            let pid = group
                .process_handle()
                .map_or_else(|| "-".to_string(), |h| h.to_string());
            lines.push(format!(
                "{:<16} | {:<11} | {:>6} | {:>3} | {:>3} | {:>7} | {}",
                group.name(),
                group.state().to_string(),
                group.active_count(),
                group.min_replicas(),
                group.max_replicas(),
                pid,
                replicas.join(" ")
            ));
        }
        lines
    }

    /// Applies every exit notification already queued and describes them.
    pub fn reap(&mut self) -> Vec<String> {
        self.supervisor
            .reap_all(&mut self.registry)
            .iter()
            .flat_map(describe_exit)
            .collect()
    }

    /// Runs the interactive loop until the input closes or `shutdown` is issued,
    /// then stops every live group.
    ///
    /// Feedback goes to `out`, malformed commands and failures to `err`.
    pub async fn run<I, O, E>(&mut self, input: I, out: &mut O, err: &mut E) -> io::Result<()>
    where
        I: AsyncBufRead + Unpin,
        O: Write,
        E: Write,
    {
        let mut lines = input.lines();

        loop {
            for line in self.reap() {
                writeln!(out, "{}", line)?;
            }
            if !self.config.prompt.is_empty() {
                write!(out, "{}", self.config.prompt)?;
                out.flush()?;
            }

            // Exits that arrive while the operator is idle are applied right away.
            let read = tokio::select! {
                read = lines.next_line() => read,
                Some(event) = self.supervisor.next_exit() => {
                    if let Some(report) = self.supervisor.record_exit(&mut self.registry, event) {
                        writeln!(out)?;
                        for line in describe_exit(&report) {
                            writeln!(out, "{}", line)?;
                        }
                    }
                    continue;
                }
                _ = tokio::signal::ctrl_c() => {
                    writeln!(out)?;
                    info!("Dispatcher: Interrupted by operator");
                    break;
                }
            };

            let line = match read {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Dispatcher: {}", ManagerError::StreamClosed);
                    break;
                }
                // The reader has already consumed the offending line.
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    writeln!(err, "ERROR: {}", ManagerError::parse(e.to_string()))?;
                    continue;
                }
                Err(e) => {
                    writeln!(err, "There was an error reading user input: {}", e)?;
                    break;
                }
            };

            let command = match Command::parse_line(&line, self.config.max_args) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    writeln!(err, "ERROR: {}", e)?;
                    continue;
                }
            };

            // Bring the registry up to date before validating against it.
            for line in self.reap() {
                writeln!(out, "{}", line)?;
            }

            match self.execute(command).await {
                Ok(report) => {
                    for line in &report.lines {
                        writeln!(out, "{}", line)?;
                    }
                    if report.flow == Flow::Shutdown {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Dispatcher: Command failed: {}", e);
                    writeln!(err, "ERROR: {}", e)?;
                }
            }
        }

        self.shutdown(out).await
    }

    /// Signals every running group, then waits up to `shutdown_grace_ms` for the exits.
    pub async fn shutdown<O: Write>(&mut self, out: &mut O) -> io::Result<()> {
        for name in self.registry.live_names() {
            match self.abort_server(&name).await {
                Ok(line) => writeln!(out, "{}", line)?,
                Err(e) => error!("Dispatcher: Failed to stop [{}]: {}", name, e),
            }
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.shutdown_grace_ms);
        while self.registry.process_count() > 0 {
            match time::timeout_at(deadline, self.supervisor.next_exit()).await {
                Ok(Some(event)) => {
                    if let Some(report) = self.supervisor.record_exit(&mut self.registry, event) {
                        for line in describe_exit(&report) {
                            writeln!(out, "{}", line)?;
                        }
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    let remaining = self.registry.process_count();
                    warn!(
                        "Dispatcher: {} process(es) still running after {}ms",
                        remaining, self.config.shutdown_grace_ms
                    );
                    writeln!(
                        out,
                        "{} {} process(es) did not exit in time",
                        PREFIX, remaining
                    )?;
                    break;
                }
            }
        }

        writeln!(out, "{} Manager stopped", PREFIX)?;
        out.flush()
    }
}

fn describe_exit(report: &ExitReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} process {} of {} exited ({}){}",
        PREFIX,
        report.event.handle,
        report.name,
        report.event,
        if report.requested { "" } else { " unexpectedly" }
    )];
    if report.group_terminated {
        lines.push(format!("{} server {} terminated", PREFIX, report.name));
    }
    lines
}
