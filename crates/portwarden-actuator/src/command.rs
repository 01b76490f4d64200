//! Stop the managed resource by running an operator-supplied command.
//!
//! The supervisor usually runs on the instance it manages, so the stop
//! command is something like `aws ec2 stop-instances --instance-ids i-...`
//! or `systemctl poweroff`.

use crate::{ActuatorError, ResourceActuator};

/// A [`ResourceActuator`] that spawns `program args...` and waits for it.
#[derive(Debug, Clone)]
pub struct CommandResourceActuator {
    program: String,
    args: Vec<String>,
}

impl CommandResourceActuator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a whitespace-separated command line into program and args.
    ///
    /// Returns `None` for a blank line. No shell quoting is interpreted.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl ResourceActuator for CommandResourceActuator {
    async fn stop(&self) -> Result<(), ActuatorError> {
        tracing::info!(program = %self.program, "running stop command");

        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(ActuatorError::Spawn)?;

        if status.success() {
            Ok(())
        } else {
            Err(ActuatorError::CommandFailed(status))
        }
    }
}
