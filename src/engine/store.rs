use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{AsyncCommands, aio::ConnectionManager};
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;

use crate::engine::{config::TestCaseStoreKind, models::TestCase};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no test cases found for problem {0}")]
    NotFound(i64),
    #[error("test case store error: {0}")]
    Database(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(value: redis::RedisError) -> Self {
        Self::Database(value.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(value: sqlx::Error) -> Self {
        Self::Database(value.to_string())
    }
}

#[async_trait]
pub trait TestCaseStore: Send + Sync {
    async fn fetch(&self, problem_id: i64) -> Result<Vec<TestCase>, StoreError>;
}

pub async fn from_config(kind: &TestCaseStoreKind) -> anyhow::Result<Arc<dyn TestCaseStore>> {
    match kind {
        TestCaseStoreKind::InMemory => {
            tracing::warn!("in-memory test case store selected, problem_id requests will not resolve");
            Ok(Arc::new(InMemoryTestCaseStore::new()))
        }
        TestCaseStoreKind::Postgres {
            url,
            max_connections,
        } => Ok(Arc::new(PostgresTestCaseStore::connect_lazy(
            url,
            *max_connections,
        )?)),
        TestCaseStoreKind::Redis { url, key_prefix } => Ok(Arc::new(
            RedisTestCaseStore::new(url, key_prefix.clone()).await?,
        )),
    }
}

fn sorted(mut cases: Vec<TestCase>) -> Vec<TestCase> {
    cases.sort_by_key(|case| case.id);
    cases
}

#[derive(Default)]
pub struct InMemoryTestCaseStore {
    problems: DashMap<i64, Vec<TestCase>>,
}

impl InMemoryTestCaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, problem_id: i64, cases: Vec<TestCase>) {
        self.problems.insert(problem_id, sorted(cases));
    }
}

#[async_trait]
impl TestCaseStore for InMemoryTestCaseStore {
    async fn fetch(&self, problem_id: i64) -> Result<Vec<TestCase>, StoreError> {
        self.problems
            .get(&problem_id)
            .map(|entry| entry.value().clone())
            .filter(|cases| !cases.is_empty())
            .ok_or(StoreError::NotFound(problem_id))
    }
}

pub struct RedisTestCaseStore {
    manager: ConnectionManager,
    key_prefix: String,
}

impl RedisTestCaseStore {
    pub async fn new(url: &str, key_prefix: String) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self {
            manager,
            key_prefix,
        })
    }

    fn key(&self, problem_id: i64) -> String {
        format!("{}:{}", self.key_prefix, problem_id)
    }
}

#[async_trait]
impl TestCaseStore for RedisTestCaseStore {
    async fn fetch(&self, problem_id: i64) -> Result<Vec<TestCase>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(self.key(problem_id)).await?;
        let raw = raw.ok_or(StoreError::NotFound(problem_id))?;
        let cases: Vec<TestCase> = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Database(format!("malformed test cases: {e}")))?;
        if cases.is_empty() {
            return Err(StoreError::NotFound(problem_id));
        }
        Ok(sorted(cases))
    }
}

const TEST_CASES_BY_PROBLEM: &str = "SELECT id::BIGINT, input_text, output_text \
     FROM problems_testcases WHERE problem_id = $1 ORDER BY id";

type TestCaseRow = (i64, Option<String>, Option<String>);

fn from_row((id, input, output): TestCaseRow) -> TestCase {
    TestCase {
        id: Some(id),
        input: input.unwrap_or_default(),
        expected_output: output,
    }
}

pub struct PostgresTestCaseStore {
    pool: PgPool,
}

impl PostgresTestCaseStore {
    pub fn connect_lazy(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_lazy(url)?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TestCaseStore for PostgresTestCaseStore {
    async fn fetch(&self, problem_id: i64) -> Result<Vec<TestCase>, StoreError> {
        let rows: Vec<TestCaseRow> = sqlx::query_as(TEST_CASES_BY_PROBLEM)
            .bind(problem_id)
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Err(StoreError::NotFound(problem_id));
        }
        Ok(rows.into_iter().map(from_row).collect())
    }
}
