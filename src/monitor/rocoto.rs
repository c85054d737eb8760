//! Driving the Rocoto command-line tools.

use crate::error::MonitorError;
use crate::exec::{CommandOutput, CommandRunner, SystemRunner, command_line};
use std::path::Path;
use tracing::debug;

/// The two Rocoto commands the poller needs.
pub trait RocotoClient: Send + Sync {
    /// Advance the workflow (`rocotorun`).
    fn run(&self, xml: &Path, db: &Path) -> Result<CommandOutput, MonitorError>;

    /// Report the status of every task (`rocotostat`), as text.
    fn stat(&self, xml: &Path, db: &Path) -> Result<String, MonitorError>;
}

/// Runs the real `rocotorun` and `rocotostat` through a [`CommandRunner`].
#[derive(Debug, Clone, Default)]
pub struct SystemRocoto<R = SystemRunner> {
    runner: R,
}

impl<R: CommandRunner> SystemRocoto<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn invoke(&self, program: &str, xml: &Path, db: &Path) -> Result<CommandOutput, MonitorError> {
        let args = vec![
            "-w".to_string(),
            xml.display().to_string(),
            "-d".to_string(),
            db.display().to_string(),
            "-v".to_string(),
            "10".to_string(),
        ];
        let output = self
            .runner
            .run(program, &args, None)
            .map_err(|source| MonitorError::Spawn {
                command: command_line(program, &args),
                source,
            })?;
        debug!("{}", output.stdout);
        Ok(output)
    }
}

impl<R: CommandRunner> RocotoClient for SystemRocoto<R> {
    fn run(&self, xml: &Path, db: &Path) -> Result<CommandOutput, MonitorError> {
        self.invoke("rocotorun", xml, db)
    }

    fn stat(&self, xml: &Path, db: &Path) -> Result<String, MonitorError> {
        let output = self.invoke("rocotostat", xml, db)?;
        Ok(output.stdout)
    }
}
