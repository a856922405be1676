use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{io::AsyncReadExt, task::JoinHandle};

use crate::engine::{
    models::ResourceLimits,
    sandbox::{
        ExecutionOutcome, Invocation, LanguageProfile, SandboxBackend, SandboxError, Workspace,
    },
};

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub workspace_root: PathBuf,
    pub max_output_bytes: usize,
    pub kill_grace: Duration,
}

pub struct SandboxRunner {
    backend: Arc<dyn SandboxBackend>,
    settings: RunnerSettings,
}

impl SandboxRunner {
    pub fn new(backend: Arc<dyn SandboxBackend>, settings: RunnerSettings) -> Self {
        Self { backend, settings }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn run(
        &self,
        source: &str,
        profile: &LanguageProfile,
        stdin: &str,
        limits: &ResourceLimits,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let workspace =
            Workspace::create(&self.settings.workspace_root).map_err(SandboxError::Workspace)?;
        workspace
            .write_file(profile.source_name, source)
            .await
            .map_err(|source| SandboxError::Write {
                file: profile.source_name.to_string(),
                source,
            })?;
        let has_stdin = !stdin.is_empty();
        if has_stdin {
            workspace
                .write_stdin(stdin)
                .await
                .map_err(|source| SandboxError::Write {
                    file: "stdin".to_string(),
                    source,
                })?;
        }

        let invocation = Invocation {
            name: format!("judge-{}", uuid::Uuid::new_v4().as_simple()),
            workspace: workspace.path(),
            profile,
            limits,
            has_stdin,
        };

        let mut cmd = self.backend.command(&invocation);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(SandboxError::Spawn)?;

        let limit = self.settings.max_output_bytes;
        let stdout = child.stdout.take().map(|pipe| spawn_reader(pipe, limit));
        let stderr = child.stderr.take().map(|pipe| spawn_reader(pipe, limit));

        let deadline = Duration::from_millis(limits.timeout_ms);
        let (status, timed_out): (Option<ExitStatus>, bool) =
            match tokio::time::timeout(deadline, child.wait()).await {
                Ok(Ok(status)) => (Some(status), false),
                Ok(Err(err)) => {
                    self.backend.terminate(&invocation, &mut child).await;
                    return Err(SandboxError::Wait(err));
                }
                Err(_) => {
                    tracing::warn!(
                        sandbox = %invocation.name,
                        timeout_ms = limits.timeout_ms,
                        "deadline reached, terminating sandbox"
                    );
                    self.backend.terminate(&invocation, &mut child).await;
                    (None, true)
                }
            };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let grace = self.settings.kill_grace;
        let stdout = collect(stdout, grace).await;
        let stderr = collect(stderr, grace).await;

        let exit_code = status.and_then(|s| s.code());
        if !timed_out {
            if let Some(reason) = self.backend.launch_failure(exit_code, &stderr) {
                return Err(SandboxError::Launch(reason));
            }
        }

        Ok(ExecutionOutcome {
            stdout,
            stderr,
            exited_normally: status.is_some_and(|s| s.success()),
            exit_code,
            timed_out,
            elapsed_ms,
        })
    }
}

fn spawn_reader<R>(reader: R, limit: usize) -> JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move { read_limited(reader, limit).await })
}

// A killed sandbox can leave grandchildren holding the pipe open, so the
// readers only get `grace` to finish.
async fn collect(task: Option<JoinHandle<Vec<u8>>>, grace: Duration) -> String {
    let Some(mut task) = task else {
        return String::new();
    };
    let bytes = match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(_)) => Vec::new(),
        Err(_) => {
            task.abort();
            Vec::new()
        }
    };
    String::from_utf8_lossy(&bytes).into_owned()
}

async fn read_limited<R>(mut reader: R, limit: usize) -> Vec<u8>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut out = Vec::with_capacity(limit.min(8192));
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if out.len() < limit {
                    let remaining = limit - out.len();
                    out.extend_from_slice(&chunk[..remaining.min(n)]);
                }
            }
            Err(_) => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sandbox::{LanguageRegistry, ProcessSandbox, language::LanguageFamily};

    fn runner(root: &std::path::Path, max_output_bytes: usize) -> SandboxRunner {
        SandboxRunner::new(
            Arc::new(ProcessSandbox::new()),
            RunnerSettings {
                workspace_root: root.to_path_buf(),
                max_output_bytes,
                kill_grace: Duration::from_millis(500),
            },
        )
    }

    fn limits(timeout_ms: u64) -> ResourceLimits {
        ResourceLimits {
            timeout_ms,
            memory_mb: 128,
            cpu_shares: 512,
        }
    }

    fn shell() -> LanguageProfile {
        LanguageRegistry::default().resolve("shell")
    }

    #[tokio::test]
    async fn captures_stdout_from_stdin_file() {
        let root = tempfile::tempdir().unwrap();
        let outcome = runner(root.path(), 4096)
            .run("read a b\necho $((a + b))", &shell(), "2 2\n", &limits(5000))
            .await
            .unwrap();

        assert_eq!(outcome.stdout.trim(), "4");
        assert!(outcome.exited_normally);
        assert!(!outcome.timed_out);
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn reports_nonzero_exit_with_stderr() {
        let root = tempfile::tempdir().unwrap();
        let outcome = runner(root.path(), 4096)
            .run("echo boom >&2\nexit 3", &shell(), "", &limits(5000))
            .await
            .unwrap();

        assert!(!outcome.exited_normally);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr.trim(), "boom");
    }

    #[tokio::test]
    async fn enforces_wall_clock_deadline() {
        let root = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let outcome = runner(root.path(), 4096)
            .run("echo partial\nsleep 10\necho never", &shell(), "", &limits(300))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert!(!outcome.exited_normally);
        assert!(!outcome.stdout.contains("never"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn caps_captured_output() {
        let root = tempfile::tempdir().unwrap();
        let outcome = runner(root.path(), 16)
            .run(
                "i=0\nwhile [ $i -lt 100 ]; do echo line$i; i=$((i+1)); done",
                &shell(),
                "",
                &limits(5000),
            )
            .await
            .unwrap();

        assert_eq!(outcome.stdout.len(), 16);
        assert!(outcome.exited_normally);
    }

    #[tokio::test]
    async fn build_failure_is_reported_on_stderr() {
        let root = tempfile::tempdir().unwrap();
        let checked_shell = LanguageProfile {
            id: "checked-shell",
            aliases: &[],
            source_name: "main.sh",
            image: "alpine:3.20",
            family: LanguageFamily::Compiled,
            build: Some("sh -n {dir}/main.sh"),
            run: "sh {dir}/main.sh",
        };
        let outcome = runner(root.path(), 4096)
            .run("if then fi (", &checked_shell, "", &limits(5000))
            .await
            .unwrap();

        assert!(!outcome.exited_normally);
        assert!(outcome.stdout.is_empty());
        assert!(outcome.stderr.contains("compilation failed"));
    }

    #[tokio::test]
    async fn workspace_is_removed_after_run() {
        let root = tempfile::tempdir().unwrap();
        runner(root.path(), 4096)
            .run("echo hi", &shell(), "x", &limits(5000))
            .await
            .unwrap();
        runner(root.path(), 4096)
            .run("sleep 5", &shell(), "", &limits(100))
            .await
            .unwrap();

        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn runs_under_a_workspace_root_with_shell_metacharacters() {
        let root = tempfile::tempdir().unwrap();
        let awkward = root.path().join("judge root; it's $HOME");
        std::fs::create_dir(&awkward).unwrap();

        let outcome = runner(&awkward, 4096)
            .run("read a b\necho $((a * b))", &shell(), "6 7", &limits(5000))
            .await
            .unwrap();

        assert!(outcome.exited_normally, "stderr: {}", outcome.stderr);
        assert_eq!(outcome.stdout.trim(), "42");
    }

    #[tokio::test]
    async fn missing_workspace_root_is_an_environment_failure() {
        let root = tempfile::tempdir().unwrap();
        let err = runner(&root.path().join("gone"), 4096)
            .run("echo hi", &shell(), "", &limits(5000))
            .await
            .unwrap_err();

        assert!(matches!(err, SandboxError::Workspace(_)));
    }
}
