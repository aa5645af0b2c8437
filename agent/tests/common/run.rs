use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Output};

use anyhow::Context;
use assert_cmd::cargo::{CargoError, CommandCargoExt};

/// Prepares a `Command` that runs `binary` in `workdir`.
///
/// The binary is found by [`CommandCargoExt::cargo_bin`], `cargo run` is not involved.
/// `TRIBUTARY_CONFIG` is cleared so that the agent never reads the config of the developer.
pub fn agent_command(binary: &str, args: &[&str], workdir: &Path) -> Result<Command, CargoError> {
    let mut cmd = Command::cargo_bin(binary)?;
    cmd.args(args).current_dir(workdir).env_remove("TRIBUTARY_CONFIG");
    Ok(cmd)
}

/// Runs the agent with inherited stdout and stderr, and returns its exit status.
pub fn run_agent(binary: &str, args: &[&str], workdir: &Path) -> anyhow::Result<ExitStatus> {
    let mut cmd = agent_command(binary, args, workdir)?;
    cmd.status().with_context(|| format!("could not run {cmd:?}"))
}

/// Runs the agent, captures its output and replays it on the test output.
///
/// The replay makes the logs of the agent visible when an assertion fails.
pub fn run_agent_tee(binary: &str, args: &[&str], workdir: &Path) -> anyhow::Result<Output> {
    let mut cmd = agent_command(binary, args, workdir)?;
    let output = cmd.output().with_context(|| format!("could not run {cmd:?}"))?;
    std::io::stdout().write_all(&output.stdout)?;
    std::io::stderr().write_all(&output.stderr)?;
    Ok(output)
}

/// Kills the agent process when dropped.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        if let Err(e) = self.0.kill() {
            eprintln!("failed to kill agent process {}: {e}", self.0.id());
        }
        let _ = self.0.wait();
    }
}

impl Deref for KillOnDrop {
    type Target = Child;

    fn deref(&self) -> &Child {
        &self.0
    }
}

impl DerefMut for KillOnDrop {
    fn deref_mut(&mut self) -> &mut Child {
        &mut self.0
    }
}
