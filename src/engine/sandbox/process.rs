use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::engine::sandbox::{Invocation, SandboxBackend};

pub struct ProcessSandbox;

impl ProcessSandbox {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ProcessSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxBackend for ProcessSandbox {
    fn name(&self) -> &'static str {
        "process"
    }

    fn command(&self, invocation: &Invocation<'_>) -> Command {
        let dir = invocation.workspace.display().to_string();
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(invocation.profile.command(&dir, invocation.has_stdin))
            .current_dir(invocation.workspace)
            .env_remove("RUST_LOG")
            .process_group(0);
        cmd
    }

    async fn terminate(&self, invocation: &Invocation<'_>, child: &mut Child) {
        if let Some(pid) = child.id() {
            // process_group(0) made the shell its own group leader
            let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
            if rc != 0 {
                tracing::debug!(
                    sandbox = %invocation.name,
                    error = %std::io::Error::last_os_error(),
                    "killpg failed"
                );
            }
        }
        let _ = child.start_kill();
        let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
    }
}
