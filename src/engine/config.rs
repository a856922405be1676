use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use crate::engine::{
    aggregate::AggregationPolicy,
    models::{LimitCeiling, ResourceLimits},
    sandbox::RunnerSettings,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_addr: SocketAddr,
    pub sandbox_backend: SandboxBackendKind,
    pub docker_bin: String,
    pub sandbox_workers: usize,
    pub queue_capacity: usize,
    pub default_limits: ResourceLimits,
    pub limit_ceiling: LimitCeiling,
    pub pids_limit: u64,
    pub max_output_bytes: usize,
    pub kill_grace_ms: u64,
    pub workspace_root: PathBuf,
    pub test_case_store: TestCaseStoreKind,
    pub aggregation_policy: AggregationPolicy,
    pub max_code_bytes: usize,
    pub max_test_cases: usize,
    pub log_level: String,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let default_bind = env::var("PORT")
            .ok()
            .and_then(|port| port.parse::<u16>().ok())
            .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));
        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            bind_addr: env_parse("BIND_ADDR", default_bind),
            sandbox_backend: env_parse("SANDBOX_BACKEND", SandboxBackendKind::Docker),
            docker_bin: env::var("DOCKER_BIN").unwrap_or_else(|_| "docker".to_string()),
            sandbox_workers: env_parse("SANDBOX_WORKERS", default_workers).max(1),
            queue_capacity: env_parse("SANDBOX_QUEUE_CAPACITY", 256usize).max(1),
            default_limits: ResourceLimits {
                timeout_ms: env_parse("DEFAULT_TIMEOUT_MS", 5000u64).max(1),
                memory_mb: env_parse("DEFAULT_MEMORY_MB", 128u64).max(1),
                cpu_shares: env_parse("DEFAULT_CPU_SHARES", 512u64),
            },
            limit_ceiling: LimitCeiling {
                max_timeout_ms: env_parse("MAX_TIMEOUT_MS", 30_000u64),
                max_memory_mb: env_parse("MAX_MEMORY_MB", 1024u64),
            },
            pids_limit: env_parse("PIDS_LIMIT", 100u64).max(1),
            max_output_bytes: env_parse("MAX_OUTPUT_BYTES", 64 * 1024usize),
            kill_grace_ms: env_parse("KILL_GRACE_MS", 2000u64),
            workspace_root: env::var("WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            test_case_store: TestCaseStoreKind::from_env(),
            aggregation_policy: env_parse("AGGREGATION_POLICY", AggregationPolicy::FirstFailure),
            max_code_bytes: env_parse("MAX_CODE_BYTES", 256 * 1024usize),
            max_test_cases: env_parse("MAX_TEST_CASES", 128usize),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            workspace_root: self.workspace_root.clone(),
            max_output_bytes: self.max_output_bytes,
            kill_grace: Duration::from_millis(self.kill_grace_ms),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            sandbox_backend: SandboxBackendKind::Docker,
            docker_bin: "docker".to_string(),
            sandbox_workers: 4,
            queue_capacity: 256,
            default_limits: ResourceLimits {
                timeout_ms: 5000,
                memory_mb: 128,
                cpu_shares: 512,
            },
            limit_ceiling: LimitCeiling {
                max_timeout_ms: 30_000,
                max_memory_mb: 1024,
            },
            pids_limit: 100,
            max_output_bytes: 64 * 1024,
            kill_grace_ms: 2000,
            workspace_root: env::temp_dir(),
            test_case_store: TestCaseStoreKind::InMemory,
            aggregation_policy: AggregationPolicy::FirstFailure,
            max_code_bytes: 256 * 1024,
            max_test_cases: 128,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SandboxBackendKind {
    #[default]
    Docker,
    Process,
}

impl FromStr for SandboxBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "process" => Ok(Self::Process),
            _ => Err(format!("unsupported sandbox backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestCaseStoreKind {
    InMemory,
    Redis { url: String, key_prefix: String },
    Postgres { url: String, max_connections: u32 },
}

impl TestCaseStoreKind {
    fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let database_url = var("DATABASE_URL");
        let kind = var("TEST_CASE_STORE")
            .map(|raw| raw.to_ascii_lowercase())
            .unwrap_or_else(|| {
                let fallback = if database_url.is_some() { "postgres" } else { "memory" };
                fallback.to_string()
            });

        match kind.as_str() {
            "postgres" | "postgresql" => Self::Postgres {
                url: database_url
                    .unwrap_or_else(|| "postgres://postgres@127.0.0.1:5432/postgres".to_string()),
                max_connections: var("DATABASE_MAX_CONNECTIONS")
                    .and_then(|raw| raw.parse().ok())
                    .unwrap_or(5u32)
                    .max(1),
            },
            "redis" => Self::Redis {
                url: var("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
                key_prefix: var("REDIS_KEY_PREFIX")
                    .unwrap_or_else(|| "judge:testcases".to_string()),
            },
            _ => Self::InMemory,
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
