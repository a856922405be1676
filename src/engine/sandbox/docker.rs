use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::engine::sandbox::{Invocation, SandboxBackend, language::MOUNT_PATH};

// 125 is also a legal exit status for the program itself, so it only counts
// together with the CLI's own error output.
const DOCKER_LAUNCH_FAILURE: i32 = 125;
const DOCKER_CLI_ERRORS: &[&str] = &["docker: ", "Error response from daemon"];

pub struct DockerSandbox {
    docker_bin: String,
    pids_limit: u64,
}

impl DockerSandbox {
    pub fn new(docker_bin: String, pids_limit: u64) -> Self {
        Self {
            docker_bin,
            pids_limit,
        }
    }

    pub fn args(&self, invocation: &Invocation<'_>) -> Vec<String> {
        let limits = invocation.limits;
        let profile = invocation.profile;
        vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            invocation.name.clone(),
            "--network=none".to_string(),
            format!("--memory={}m", limits.memory_mb),
            format!("--memory-swap={}m", limits.memory_mb),
            format!("--cpu-shares={}", limits.cpu_shares),
            format!("--pids-limit={}", self.pids_limit),
            "--security-opt=no-new-privileges".to_string(),
            "--cap-drop=ALL".to_string(),
            "-v".to_string(),
            format!("{}:{MOUNT_PATH}", invocation.workspace.display()),
            "-w".to_string(),
            MOUNT_PATH.to_string(),
            profile.image.to_string(),
            "sh".to_string(),
            "-c".to_string(),
            profile.command(MOUNT_PATH, invocation.has_stdin),
        ]
    }
}

#[async_trait]
impl SandboxBackend for DockerSandbox {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn command(&self, invocation: &Invocation<'_>) -> Command {
        let mut cmd = Command::new(&self.docker_bin);
        cmd.args(self.args(invocation));
        cmd
    }

    async fn terminate(&self, invocation: &Invocation<'_>, child: &mut Child) {
        // Killing the client alone leaves the container running.
        let removal = Command::new(&self.docker_bin)
            .args(["rm", "-f", invocation.name.as_str()])
            .output();
        match tokio::time::timeout(Duration::from_secs(10), removal).await {
            Ok(Ok(output)) if !output.status.success() => {
                tracing::warn!(
                    container = %invocation.name,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "docker rm failed"
                );
            }
            Ok(Err(err)) => {
                tracing::warn!(container = %invocation.name, error = %err, "docker rm could not run");
            }
            Err(_) => {
                tracing::warn!(container = %invocation.name, "docker rm timed out");
            }
            Ok(Ok(_)) => {}
        }
        let _ = child.start_kill();
        let _ = child.wait().await;
    }

    fn launch_failure(&self, exit_code: Option<i32>, stderr: &str) -> Option<String> {
        if exit_code != Some(DOCKER_LAUNCH_FAILURE) {
            return None;
        }
        DOCKER_CLI_ERRORS
            .iter()
            .any(|prefix| stderr.contains(prefix))
            .then(|| stderr.trim().to_string())
    }
}
