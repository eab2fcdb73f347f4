//! Adapters over the command-line tools that build images and ship managed
//! apps.

use crate::clients::{AppDeployer, ImageBuilder};
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Run `program` with `args`; a non-zero exit becomes an error carrying the
/// last stderr line.
async fn run<I, S>(program: &str, args: I) -> ApiResult<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args);
    debug!(command = ?cmd.as_std(), "🛠️ Running command");

    let output = cmd
        .output()
        .await
        .map_err(|e| ApiError::unknown(format!("failed to start {program}: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        return Ok(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ApiError::unknown(format!(
        "{program} failed (exit {}): {}",
        output.status.code().unwrap_or(-1),
        stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("unknown error")
    )))
}

/// `docker build` / `docker push`.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ImageBuilder for DockerCli {
    async fn build(&self, tag: &str, context_dir: &Path) -> ApiResult<()> {
        run(
            &self.program,
            [OsStr::new("build"), OsStr::new("-t"), OsStr::new(tag), context_dir.as_os_str()],
        )
        .await
        .map(drop)
    }

    async fn push(&self, tag: &str) -> ApiResult<()> {
        run(&self.program, ["push", tag]).await.map(drop)
    }
}

/// `gcloud -q --project=<id> app deploy <app.yaml>`.
#[derive(Debug, Clone)]
pub struct GcloudAppDeployer {
    program: String,
}

impl Default for GcloudAppDeployer {
    fn default() -> Self {
        Self::new("gcloud")
    }
}

impl GcloudAppDeployer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn arguments(project_id: &str, app_yaml: &Path) -> Vec<String> {
        vec![
            "-q".to_string(),
            format!("--project={project_id}"),
            "app".to_string(),
            "deploy".to_string(),
            app_yaml.display().to_string(),
        ]
    }
}

#[async_trait]
impl AppDeployer for GcloudAppDeployer {
    async fn deploy(&self, project_id: &str, app_yaml: &Path) -> ApiResult<()> {
        run(&self.program, Self::arguments(project_id, app_yaml))
            .await
            .map(drop)
    }
}
