//! Remote command execution over password-authenticated SSH.
//!
//! `RemoteRunner` is the seam the provisioning sequence drives. `SshRunner`
//! spawns `sshpass -e ssh ...` with the password handed over through the
//! child's environment, never through a shell string. `DryRunRunner` only
//! prints what would run, and `RecordingRunner` is the test double.

use std::fmt;
use std::process::Stdio;
use std::sync::Mutex;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::build_params::BuildParameters;

/// Where and as whom remote commands run.
#[derive(Clone)]
pub struct SshTarget {
    pub host: Option<String>,
    pub user: Option<String>,
    password: String,
}

impl SshTarget {
    pub fn new(host: Option<String>, user: Option<String>, password: impl Into<String>) -> Self {
        Self {
            host,
            user,
            password: password.into(),
        }
    }

    pub fn from_params(params: &BuildParameters) -> Self {
        Self::new(
            params.server_ip.clone(),
            params.server_user.clone(),
            params.server_pass.clone(),
        )
    }

    /// `user@host`, or the bare host when no user is configured.
    pub fn destination(&self) -> Option<String> {
        let host = self.host.as_deref()?;
        Some(match self.user.as_deref() {
            Some(user) => format!("{}@{}", user, host),
            None => host.to_string(),
        })
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTarget")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Result of one remote command. `exit_code` is `None` when no process ran
/// or it was killed by a signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn ok(command: &str, stdout: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(command: &str, exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            command: command.to_string(),
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Print the outcome: stdout on success, the command and stderr otherwise.
    pub fn report(&self) {
        if self.success() {
            println!("{}", self.stdout);
        } else {
            eprintln!("[ERROR] {}\n{}", self.command, self.stderr);
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait RemoteRunner {
    /// Run `cmd` on the remote host and report the outcome. Failures are
    /// returned as data, never as an error.
    async fn run(&self, cmd: &str) -> CommandOutcome;

    fn describe_target(&self) -> String;
}

/// Argument vector handed to `sshpass`. The password is not part of it;
/// `-e` makes sshpass read it from `SSHPASS`.
pub fn ssh_args(destination: &str, cmd: &str) -> Vec<String> {
    vec![
        "-e".to_string(),
        "ssh".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        destination.to_string(),
        cmd.to_string(),
    ]
}

pub const SSH_PASSWORD_HELPER: &str = "sshpass";

pub struct SshRunner {
    target: SshTarget,
    program: String,
}

impl SshRunner {
    pub fn new(target: SshTarget) -> Self {
        Self::with_program(target, SSH_PASSWORD_HELPER)
    }

    pub(crate) fn with_program(target: SshTarget, program: impl Into<String>) -> Self {
        Self {
            target,
            program: program.into(),
        }
    }

    async fn execute(&self, cmd: &str) -> CommandOutcome {
        let Some(destination) = self.target.destination() else {
            return CommandOutcome::failed(cmd, None, "no remote host configured (SERVER_IP)");
        };

        debug!("{} ssh {} {:?}", self.program, destination, cmd);
        let output = Command::new(&self.program)
            .args(ssh_args(&destination, cmd))
            .env("SSHPASS", self.target.password())
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => CommandOutcome {
                command: cmd.to_string(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            },
            Err(e) => CommandOutcome::failed(
                cmd,
                None,
                format!("failed to spawn {}: {}", self.program, e),
            ),
        }
    }
}

impl RemoteRunner for SshRunner {
    async fn run(&self, cmd: &str) -> CommandOutcome {
        let outcome = self.execute(cmd).await;
        if !outcome.success() {
            warn!("remote command failed (exit {:?}): {}", outcome.exit_code, cmd);
        }
        outcome.report();
        outcome
    }

    fn describe_target(&self) -> String {
        self.target
            .destination()
            .unwrap_or_else(|| "<no host>".to_string())
    }
}

/// Prints each command instead of running it.
pub struct DryRunRunner {
    target: SshTarget,
}

impl DryRunRunner {
    pub fn new(target: SshTarget) -> Self {
        Self { target }
    }
}

impl RemoteRunner for DryRunRunner {
    async fn run(&self, cmd: &str) -> CommandOutcome {
        println!("[dry-run] {}: {}", self.describe_target(), cmd);
        CommandOutcome::ok(cmd, "")
    }

    fn describe_target(&self) -> String {
        self.target
            .destination()
            .unwrap_or_else(|| "<no host>".to_string())
    }
}

/// Records every command and replays preset outcomes in order; once the
/// presets run out every command succeeds with empty output.
pub struct RecordingRunner {
    host: String,
    failures: Mutex<Vec<Option<String>>>,
    commands: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            failures: Mutex::new(Vec::new()),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// `None` entries succeed, `Some(stderr)` entries fail with exit code 1.
    pub fn with_failures(host: &str, failures: Vec<Option<String>>) -> Self {
        let mut reversed = failures;
        reversed.reverse();
        Self {
            host: host.to_string(),
            failures: Mutex::new(reversed),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl RemoteRunner for RecordingRunner {
    async fn run(&self, cmd: &str) -> CommandOutcome {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(cmd.to_string());
        }
        let preset = self.failures.lock().ok().and_then(|mut f| f.pop());
        match preset {
            Some(Some(stderr)) => CommandOutcome::failed(cmd, Some(1), stderr),
            _ => CommandOutcome::ok(cmd, ""),
        }
    }

    fn describe_target(&self) -> String {
        self.host.clone()
    }
}
