use std::sync::Arc;

use tokio::sync::{
    Mutex,
    mpsc::{self, Receiver, Sender},
    oneshot,
};

use crate::engine::{
    metrics::MetricsRegistry,
    models::ResourceLimits,
    sandbox::{ExecutionOutcome, LanguageProfile, SandboxError},
};

pub type JobReply = oneshot::Receiver<Result<ExecutionOutcome, SandboxError>>;

#[derive(Debug)]
pub struct SandboxJob {
    pub test_id: i64,
    pub source: Arc<str>,
    pub profile: LanguageProfile,
    pub stdin: String,
    pub limits: ResourceLimits,
    pub reply: oneshot::Sender<Result<ExecutionOutcome, SandboxError>>,
}

#[derive(Clone)]
pub struct Scheduler {
    sender: Sender<SandboxJob>,
    receiver: Arc<Mutex<Receiver<SandboxJob>>>,
    metrics: Arc<MetricsRegistry>,
}

impl Scheduler {
    pub fn new(capacity: usize, metrics: Arc<MetricsRegistry>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            metrics,
        }
    }

    pub async fn submit(&self, job: SandboxJob) -> Result<(), SandboxError> {
        self.metrics.enqueued();
        self.sender.send(job).await.map_err(|_| {
            self.metrics.enqueue_failed();
            SandboxError::PoolClosed
        })
    }

    pub fn receiver(&self) -> Arc<Mutex<Receiver<SandboxJob>>> {
        self.receiver.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sandbox::LanguageRegistry;

    fn job(test_id: i64) -> (SandboxJob, JobReply) {
        let (reply, receiver) = oneshot::channel();
        let job = SandboxJob {
            test_id,
            source: Arc::from("echo hi"),
            profile: LanguageRegistry::default().resolve("shell"),
            stdin: String::new(),
            limits: ResourceLimits::default(),
            reply,
        };
        (job, receiver)
    }

    #[tokio::test]
    async fn queued_jobs_are_counted_until_taken() {
        let metrics = Arc::new(MetricsRegistry::new());
        let scheduler = Scheduler::new(4, metrics.clone());

        let (first, _r1) = job(1);
        let (second, _r2) = job(2);
        scheduler.submit(first).await.unwrap();
        scheduler.submit(second).await.unwrap();
        assert_eq!(metrics.queue_depth(), 2);

        let taken = scheduler.receiver().lock().await.recv().await.unwrap();
        assert_eq!(taken.test_id, 1);
    }

    #[tokio::test]
    async fn closed_pool_rejects_without_leaking_depth() {
        let metrics = Arc::new(MetricsRegistry::new());
        let scheduler = Scheduler::new(1, metrics.clone());
        scheduler.receiver().lock().await.close();

        let (job, _reply) = job(1);
        let result = scheduler.submit(job).await;

        assert!(matches!(result, Err(SandboxError::PoolClosed)));
        assert_eq!(metrics.queue_depth(), 0);
    }
}
