//! Collaborators that talk to the outside world: Slurm accounting tools, the
//! system group database and the user directory API.

pub mod groups;
pub mod sim_api;
pub mod slurm;

pub use groups::IdGroups;
pub use sim_api::SimApi;
pub use slurm::SlurmCli;

use std::process::Command;
use tracing::{debug, warn};

/// Run `program` with `args` and return its stdout, or a readable failure reason
pub(crate) fn run_command(program: &str, args: &[String]) -> Result<String, String> {
    debug!(program = %program, args = ?args, "Running command");

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| format!("failed to execute {program}: {err}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(
            program = %program,
            exit_code = output.status.code(),
            stderr = %stderr.trim(),
            "Command failed"
        );
        return Err(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_success_and_failure() {
        let out = run_command("echo", &["hello".to_string()]).unwrap();
        assert_eq!(out.trim(), "hello");

        assert!(run_command("false", &[]).is_err());
        assert!(run_command("definitely-not-a-real-binary-xyz", &[]).is_err());
    }
}
