//! Job handlers: finalize a remote build, reclaim a deleted build.
//!
//! Both handlers are idempotent. A job may be delivered more than once and
//! may arrive after the container it names was deleted.

use super::{BuildJob, BuildParams};
use crate::services::registry_service::RegistryService;
use anyhow::{Context, Result};
use std::io::ErrorKind;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

pub const BUILD_MANIFEST: &str = "build.json";
pub const BUILD_LOG: &str = "build.log";

/// Executes queued jobs against the registry.
#[derive(Clone)]
pub struct JobRunner {
    service: RegistryService,
}

impl JobRunner {
    pub fn new(service: RegistryService) -> Self {
        Self { service }
    }

    pub async fn run(&self, job: &BuildJob) -> Result<()> {
        match job {
            BuildJob::CompleteBuild {
                container_id,
                params,
            } => self.complete_build(*container_id, params).await,
            BuildJob::DeleteBuild { container_id } => self.delete_build(*container_id).await,
        }
    }

    /// Store the build record on disk and fold the result into the container.
    pub async fn complete_build(&self, container_id: Uuid, params: &BuildParams) -> Result<()> {
        let Some(container) = self.service.fetch_container(container_id).await? else {
            info!("container {} is gone, skipping complete_build", container_id);
            return Ok(());
        };

        let dir = self.service.build_dir(container_id);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating build directory {}", dir.display()))?;

        let manifest = serde_json::to_vec_pretty(params)?;
        fs::write(dir.join(BUILD_MANIFEST), manifest)
            .await
            .context("writing build manifest")?;
        if let Some(log) = &params.log {
            fs::write(dir.join(BUILD_LOG), log)
                .await
                .context("writing build log")?;
        }

        let updated = self.service.apply_build_result(&container, params).await?;
        info!(
            "build {} for container {} finished as {:?}",
            params.build_id, container_id, updated.status
        );
        Ok(())
    }

    /// Remove everything stored under the container's build directory.
    pub async fn delete_build(&self, container_id: Uuid) -> Result<()> {
        let dir = self.service.build_dir(container_id);
        match fs::remove_dir_all(&dir).await {
            Ok(_) => info!("removed build artifacts at {}", dir.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no build artifacts at {}", dir.display());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("removing {}", dir.display()));
            }
        }
        Ok(())
    }
}
