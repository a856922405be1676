use std::sync::Arc;

use tokio::sync::oneshot;

use crate::engine::{
    aggregate::{AggregationPolicy, aggregate},
    classifier::classify,
    metrics::MetricsRegistry,
    models::{
        ExecutionRequest, ExecutionResult, IndividualTestResult, LimitCeiling, ResourceLimits,
        TestCase, TestCaseOrigin, Verdict,
    },
    queue::{JobReply, SandboxJob, Scheduler},
    sandbox::{ExecutionOutcome, LanguageProfile, LanguageRegistry, SandboxError},
    store::{StoreError, TestCaseStore},
};

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub default_limits: ResourceLimits,
    pub limit_ceiling: LimitCeiling,
    pub aggregation_policy: AggregationPolicy,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: LanguageRegistry,
    scheduler: Scheduler,
    store: Arc<dyn TestCaseStore>,
    metrics: Arc<MetricsRegistry>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        registry: LanguageRegistry,
        scheduler: Scheduler,
        store: Arc<dyn TestCaseStore>,
        metrics: Arc<MetricsRegistry>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            registry,
            scheduler,
            store,
            metrics,
            settings,
        }
    }

    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let result = match self.resolve(&request).await {
            Ok(cases) => self.judge(&request, cases).await,
            Err(rejected) => rejected,
        };
        self.metrics.request(result.overall_status);
        tracing::info!(
            language = %request.language,
            overall = %result.overall_status,
            passed = result.passed_tests,
            total = result.total_tests,
            "submission judged"
        );
        result
    }

    async fn resolve(&self, request: &ExecutionRequest) -> Result<Vec<TestCase>, ExecutionResult> {
        let origin = request.origin().map_err(|reason| {
            tracing::warn!(reason = %reason, "request has no usable test-case source");
            ExecutionResult::rejected(Verdict::ConfigurationError, reason)
        })?;

        match origin {
            TestCaseOrigin::Explicit(cases) => Ok(cases),
            TestCaseOrigin::AdHoc(input) => Ok(vec![TestCase::new(None, input, None)]),
            TestCaseOrigin::Problem(problem_id) => {
                let cases = self.store.fetch(problem_id).await.map_err(|err| {
                    tracing::warn!(problem_id, error = %err, "failed to load test cases");
                    match err {
                        StoreError::NotFound(_) => {
                            ExecutionResult::rejected(Verdict::ConfigurationError, err.to_string())
                        }
                        StoreError::Database(_) => {
                            ExecutionResult::rejected(Verdict::InternalError, err.to_string())
                        }
                    }
                })?;
                tracing::info!(problem_id, cases = cases.len(), "loaded stored test cases");
                Ok(cases)
            }
        }
    }

    async fn judge(&self, request: &ExecutionRequest, cases: Vec<TestCase>) -> ExecutionResult {
        let profile = self.registry.resolve(&request.language);
        let limits = request
            .limits
            .or_defaults(&self.settings.default_limits)
            .clamped(&self.settings.limit_ceiling);
        let source: Arc<str> = Arc::from(request.code.as_str());

        // Everything is queued before anything is awaited, so the pool runs
        // the cases concurrently.
        let mut pending = Vec::with_capacity(cases.len());
        for (index, case) in cases.iter().enumerate() {
            let test_id = case.id.unwrap_or(index as i64 + 1);
            let reply = self.enqueue(test_id, &source, &profile, case, limits).await;
            pending.push((test_id, reply));
        }

        let mut results = Vec::with_capacity(cases.len());
        for ((test_id, reply), case) in pending.into_iter().zip(&cases) {
            let outcome = match reply {
                Ok(reply) => reply.await.unwrap_or(Err(SandboxError::Dropped)),
                Err(err) => Err(err),
            };
            let result = match outcome {
                Ok(outcome) => judged(test_id, case, &profile, outcome),
                Err(err) => IndividualTestResult::internal_error(test_id, case, err.to_string()),
            };
            self.metrics.verdict(result.verdict);
            tracing::debug!(test_id, verdict = %result.verdict, elapsed_ms = result.elapsed_ms, "test case judged");
            results.push(result);
        }

        let overall_status = aggregate(&results, self.settings.aggregation_policy);
        ExecutionResult {
            overall_status,
            total_tests: results.len(),
            passed_tests: results.iter().filter(|r| r.is_correct).count(),
            test_results: results,
            error: None,
        }
    }

    async fn enqueue(
        &self,
        test_id: i64,
        source: &Arc<str>,
        profile: &LanguageProfile,
        case: &TestCase,
        limits: ResourceLimits,
    ) -> Result<JobReply, SandboxError> {
        let (reply, receiver) = oneshot::channel();
        self.scheduler
            .submit(SandboxJob {
                test_id,
                source: source.clone(),
                profile: profile.clone(),
                stdin: case.input.clone(),
                limits,
                reply,
            })
            .await?;
        Ok(receiver)
    }
}

fn judged(
    test_id: i64,
    case: &TestCase,
    profile: &LanguageProfile,
    outcome: ExecutionOutcome,
) -> IndividualTestResult {
    let verdict = classify(&outcome, profile.family, case.expected());
    IndividualTestResult {
        test_id,
        input: case.input.clone(),
        expected_output: case.expected_output.clone(),
        actual_output: outcome.stdout.trim().to_string(),
        verdict,
        is_correct: verdict.is_correct(),
        elapsed_ms: outcome.elapsed_ms,
        diagnostic: outcome.stderr,
    }
}
