use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, alias = "input_text")]
    pub input: String,
    #[serde(default, alias = "output_text")]
    pub expected_output: Option<String>,
}

impl TestCase {
    pub fn new(id: Option<i64>, input: impl Into<String>, expected: Option<&str>) -> Self {
        Self {
            id,
            input: input.into(),
            expected_output: expected.map(ToString::to_string),
        }
    }

    pub fn expected(&self) -> Option<&str> {
        self.expected_output.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default)]
    pub timeout_ms: u64,
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub cpu_shares: u64,
}

impl ResourceLimits {
    pub fn or_defaults(self, defaults: &ResourceLimits) -> Self {
        Self {
            timeout_ms: if self.timeout_ms == 0 {
                defaults.timeout_ms
            } else {
                self.timeout_ms
            },
            memory_mb: if self.memory_mb == 0 {
                defaults.memory_mb
            } else {
                self.memory_mb
            },
            cpu_shares: if self.cpu_shares == 0 {
                defaults.cpu_shares
            } else {
                self.cpu_shares
            },
        }
    }

    pub fn clamped(mut self, ceiling: &LimitCeiling) -> Self {
        self.timeout_ms = self.timeout_ms.clamp(1, ceiling.max_timeout_ms.max(1));
        self.memory_mb = self.memory_mb.clamp(6, ceiling.max_memory_mb.max(6));
        // docker rejects cpu-shares below 2
        self.cpu_shares = self.cpu_shares.clamp(2, 262_144);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitCeiling {
    pub max_timeout_ms: u64,
    pub max_memory_mb: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub problem_id: Option<i64>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub test_cases: Option<Vec<TestCase>>,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub language: String,
    #[serde(flatten)]
    pub limits: ResourceLimits,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestCaseOrigin {
    Problem(i64),
    AdHoc(String),
    Explicit(Vec<TestCase>),
}

impl ExecutionRequest {
    // Picks the single test-case source of the request. A problem id of 0 is
    // the zero value older clients send and counts as absent.
    pub fn origin(&self) -> Result<TestCaseOrigin, String> {
        let mut found = Vec::with_capacity(1);
        if let Some(id) = self.problem_id.filter(|id| *id != 0) {
            found.push(TestCaseOrigin::Problem(id));
        }
        if let Some(input) = &self.input {
            found.push(TestCaseOrigin::AdHoc(input.clone()));
        }
        if let Some(cases) = &self.test_cases {
            found.push(TestCaseOrigin::Explicit(cases.clone()));
        }

        match found.len() {
            0 => Err("no test-case source: supply problem_id, input, or test_cases".to_string()),
            1 => match found.pop() {
                Some(TestCaseOrigin::Explicit(cases)) if cases.is_empty() => {
                    Err("test_cases is empty".to_string())
                }
                Some(origin) => Ok(origin),
                None => Err("no test-case source".to_string()),
            },
            _ => Err(
                "ambiguous test-case source: supply only one of problem_id, input, test_cases"
                    .to_string(),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Accepted")]
    Accepted,
    #[serde(rename = "Wrong Answer")]
    WrongAnswer,
    #[serde(rename = "Executed")]
    Executed,
    #[serde(rename = "Time Limit Exceeded")]
    TimeLimitExceeded,
    #[serde(rename = "Memory Limit Exceeded")]
    MemoryLimitExceeded,
    #[serde(rename = "Runtime Error")]
    RuntimeError,
    #[serde(rename = "Compilation Error")]
    CompilationError,
    #[serde(rename = "Internal Error")]
    InternalError,
    #[serde(rename = "Configuration Error")]
    ConfigurationError,
}

impl Verdict {
    pub const ALL: [Verdict; 9] = [
        Verdict::Accepted,
        Verdict::WrongAnswer,
        Verdict::Executed,
        Verdict::TimeLimitExceeded,
        Verdict::MemoryLimitExceeded,
        Verdict::RuntimeError,
        Verdict::CompilationError,
        Verdict::InternalError,
        Verdict::ConfigurationError,
    ];

    pub fn is_correct(self) -> bool {
        matches!(self, Verdict::Accepted | Verdict::Executed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::Executed => "Executed",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
            Verdict::RuntimeError => "Runtime Error",
            Verdict::CompilationError => "Compilation Error",
            Verdict::InternalError => "Internal Error",
            Verdict::ConfigurationError => "Configuration Error",
        }
    }

    pub fn metric_label(self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::WrongAnswer => "wrong_answer",
            Verdict::Executed => "executed",
            Verdict::TimeLimitExceeded => "time_limit_exceeded",
            Verdict::MemoryLimitExceeded => "memory_limit_exceeded",
            Verdict::RuntimeError => "runtime_error",
            Verdict::CompilationError => "compilation_error",
            Verdict::InternalError => "internal_error",
            Verdict::ConfigurationError => "configuration_error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualTestResult {
    pub test_id: i64,
    pub input: String,
    pub expected_output: Option<String>,
    pub actual_output: String,
    pub verdict: Verdict,
    pub is_correct: bool,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diagnostic: String,
}

impl IndividualTestResult {
    pub fn internal_error(test_id: i64, case: &TestCase, diagnostic: String) -> Self {
        Self {
            test_id,
            input: case.input.clone(),
            expected_output: case.expected_output.clone(),
            actual_output: String::new(),
            verdict: Verdict::InternalError,
            is_correct: false,
            elapsed_ms: 0,
            diagnostic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub overall_status: Verdict,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub test_results: Vec<IndividualTestResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn rejected(status: Verdict, error: impl Into<String>) -> Self {
        Self {
            overall_status: status,
            total_tests: 0,
            passed_tests: 0,
            test_results: Vec::new(),
            error: Some(error.into()),
        }
    }
}
