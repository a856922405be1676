use std::sync::Arc;

use tokio::sync::{Mutex, mpsc::Receiver};

use crate::engine::{metrics::MetricsRegistry, queue::SandboxJob, sandbox::SandboxRunner};

pub fn spawn_worker_pool(
    workers: usize,
    receiver: Arc<Mutex<Receiver<SandboxJob>>>,
    runner: Arc<SandboxRunner>,
    metrics: Arc<MetricsRegistry>,
) {
    for worker_id in 0..workers.max(1) {
        let receiver = receiver.clone();
        let runner = runner.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            worker_loop(worker_id, receiver, runner, metrics).await;
        });
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<Receiver<SandboxJob>>>,
    runner: Arc<SandboxRunner>,
    metrics: Arc<MetricsRegistry>,
) {
    loop {
        let job = {
            let mut locked = receiver.lock().await;
            locked.recv().await
        };
        let Some(job) = job else {
            tracing::info!(worker_id, "sandbox queue closed, worker exiting");
            break;
        };

        metrics.started();
        tracing::debug!(worker_id, test_id = job.test_id, language = job.profile.id, "running test case");
        let result = runner
            .run(&job.source, &job.profile, &job.stdin, &job.limits)
            .await;
        metrics.finished(result.is_ok());
        if let Err(err) = &result {
            tracing::warn!(worker_id, test_id = job.test_id, error = %err, "sandbox run failed");
        }

        if job.reply.send(result).is_err() {
            tracing::debug!(worker_id, test_id = job.test_id, "dispatcher went away before the result");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use tokio::sync::oneshot;

    use super::*;
    use crate::engine::{
        models::ResourceLimits,
        queue::Scheduler,
        sandbox::{LanguageRegistry, ProcessSandbox, RunnerSettings},
    };

    fn runner(root: &Path) -> Arc<SandboxRunner> {
        Arc::new(SandboxRunner::new(
            Arc::new(ProcessSandbox::new()),
            RunnerSettings {
                workspace_root: root.to_path_buf(),
                max_output_bytes: 4096,
                kill_grace: Duration::from_millis(500),
            },
        ))
    }

    // mkdir is atomic, so a second sandbox running at the same time fails it.
    fn exclusive_echo(lock: &Path) -> String {
        format!(
            "read n\nmkdir '{lock}' 2>/dev/null || {{ echo overlap; exit 3; }}\nsleep 0.1\nrmdir '{lock}'\necho $n",
            lock = lock.display()
        )
    }

    #[tokio::test]
    async fn single_worker_runs_one_sandbox_at_a_time() {
        let root = tempfile::tempdir().unwrap();
        let lock = root.path().join("running");
        let metrics = Arc::new(MetricsRegistry::new());
        let scheduler = Scheduler::new(1, metrics.clone());
        spawn_worker_pool(1, scheduler.receiver(), runner(root.path()), metrics.clone());

        let source: Arc<str> = Arc::from(exclusive_echo(&lock).as_str());
        let profile = LanguageRegistry::default().resolve("shell");
        let mut replies = Vec::new();
        // More jobs than queue capacity plus workers, so submit has to wait.
        for n in 1..=6 {
            let (reply, receiver) = oneshot::channel();
            scheduler
                .submit(SandboxJob {
                    test_id: n,
                    source: source.clone(),
                    profile: profile.clone(),
                    stdin: n.to_string(),
                    limits: ResourceLimits {
                        timeout_ms: 5000,
                        memory_mb: 128,
                        cpu_shares: 512,
                    },
                    reply,
                })
                .await
                .unwrap();
            assert!(metrics.in_flight() <= 1);
            replies.push(receiver);
        }

        let mut outputs = Vec::new();
        for receiver in replies {
            let outcome = receiver.await.unwrap().unwrap();
            assert!(outcome.exited_normally, "stderr: {}", outcome.stderr);
            outputs.push(outcome.stdout.trim().to_string());
        }

        assert_eq!(outputs, ["1", "2", "3", "4", "5", "6"]);
        assert_eq!(metrics.queue_depth(), 0);
        assert_eq!(metrics.in_flight(), 0);
    }

    #[tokio::test]
    async fn worker_survives_an_abandoned_reply() {
        let root = tempfile::tempdir().unwrap();
        let metrics = Arc::new(MetricsRegistry::new());
        let scheduler = Scheduler::new(2, metrics.clone());
        spawn_worker_pool(1, scheduler.receiver(), runner(root.path()), metrics.clone());

        let profile = LanguageRegistry::default().resolve("shell");
        let limits = ResourceLimits {
            timeout_ms: 5000,
            memory_mb: 128,
            cpu_shares: 512,
        };
        let (dropped, abandoned) = oneshot::channel();
        drop(abandoned);
        scheduler
            .submit(SandboxJob {
                test_id: 1,
                source: Arc::from("echo first"),
                profile: profile.clone(),
                stdin: String::new(),
                limits,
                reply: dropped,
            })
            .await
            .unwrap();

        let (reply, receiver) = oneshot::channel();
        scheduler
            .submit(SandboxJob {
                test_id: 2,
                source: Arc::from("echo second"),
                profile,
                stdin: String::new(),
                limits,
                reply,
            })
            .await
            .unwrap();

        let outcome = receiver.await.unwrap().unwrap();
        assert_eq!(outcome.stdout.trim(), "second");
    }
}
