mod docker;
pub mod language;
mod process;
mod runner;
mod workspace;

use std::{io, path::Path, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::{Child, Command};

use crate::engine::{
    config::{EngineConfig, SandboxBackendKind},
    models::ResourceLimits,
};

pub use docker::DockerSandbox;
pub use language::{LanguageFamily, LanguageProfile, LanguageRegistry};
pub use process::ProcessSandbox;
pub use runner::{RunnerSettings, SandboxRunner};
pub use workspace::Workspace;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exited_normally: bool,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to create workspace: {0}")]
    Workspace(#[source] io::Error),
    #[error("failed to write {file}: {source}")]
    Write { file: String, source: io::Error },
    #[error("failed to launch sandbox: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed waiting for sandbox: {0}")]
    Wait(#[source] io::Error),
    #[error("sandbox could not start the program: {0}")]
    Launch(String),
    #[error("sandbox pool is not accepting jobs")]
    PoolClosed,
    #[error("sandbox worker dropped the job")]
    Dropped,
}

#[derive(Debug)]
pub struct Invocation<'a> {
    pub name: String,
    pub workspace: &'a Path,
    pub profile: &'a LanguageProfile,
    pub limits: &'a ResourceLimits,
    pub has_stdin: bool,
}

#[async_trait]
pub trait SandboxBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn command(&self, invocation: &Invocation<'_>) -> Command;

    async fn terminate(&self, invocation: &Invocation<'_>, child: &mut Child);

    fn launch_failure(&self, _exit_code: Option<i32>, _stderr: &str) -> Option<String> {
        None
    }
}

pub struct SandboxFactory;

impl SandboxFactory {
    pub fn from_config(config: &EngineConfig) -> Arc<dyn SandboxBackend> {
        match config.sandbox_backend {
            SandboxBackendKind::Docker => Arc::new(DockerSandbox::new(
                config.docker_bin.clone(),
                config.pids_limit,
            )),
            SandboxBackendKind::Process => {
                tracing::warn!("process sandbox backend selected: submissions run WITHOUT isolation");
                Arc::new(ProcessSandbox::new())
            }
        }
    }
}
