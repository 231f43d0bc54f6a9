//! Publish orchestrator: the state machine that turns a site's declarative
//! configuration into a deployed static website.
//!
//! Single forward path, no retries within a run:
//!
//! ```text
//! START -> RENDERING -> SYNCING_STORAGE -> CONFIGURING_DNS -> DONE
//!                    \-> FAILED (from any state, terminal)
//! ```
//!
//! A failed render mutates nothing downstream. A storage failure after a
//! successful render leaves the site serving the previous deployment,
//! never half-written content. A DNS failure after storage succeeded is a
//! genuinely partial end state and is reported as FAILED so the operator
//! knows the site is hosted but not reachable under its intended name.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::contract::{
    Connection, DnsProvider, ObjectStore, PublishReport, Publisher, SiteStore,
};
use crate::dns::Provisioner;
use crate::error::{LoadError, PublishError, RenderError};
use crate::render::Renderer;
use crate::session::Registry;
use crate::site::Site;
use crate::storage::Reconciler;

/// Stages of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Start,
    Rendering,
    SyncingStorage,
    ConfiguringDns,
    Done,
    Failed,
}

impl PublishStage {
    fn notice_value(self) -> &'static str {
        match self {
            PublishStage::Start => "start",
            PublishStage::Rendering => "rendering",
            PublishStage::SyncingStorage => "syncing-storage",
            PublishStage::ConfiguringDns => "configuring-dns",
            PublishStage::Done => "done",
            PublishStage::Failed => "failed",
        }
    }
}

/// Owns the collaborators for publish runs. Explicitly constructed and
/// injected so tests can substitute fakes for every backend.
pub struct Orchestrator<St, S, D> {
    store: St,
    renderer: Renderer,
    reconciler: Reconciler<S>,
    /// `None` disables DNS provisioning (e.g. local preview publishes).
    dns: Option<Provisioner<D>>,
    registry: Registry,
    base_host: String,
}

impl<St, S, D> Orchestrator<St, S, D>
where
    St: SiteStore,
    S: ObjectStore,
    D: DnsProvider,
{
    pub fn new(
        store: St,
        renderer: Renderer,
        reconciler: Reconciler<S>,
        dns: Option<Provisioner<D>>,
        registry: Registry,
        base_host: impl Into<String>,
    ) -> Self {
        Self {
            store,
            renderer,
            reconciler,
            dns,
            registry,
            base_host: base_host.into(),
        }
    }

    /// Load the site for `identity`, locate its live observer (absence is
    /// normal) and run the pipeline to completion. Every failure is
    /// pushed to the observer as an error notice and returned to the
    /// caller as a single structured error.
    pub async fn publish_for(
        &self,
        identity: &str,
        site_id: i64,
    ) -> Result<PublishReport, PublishError> {
        let observer = self.registry.get(identity);
        let observer = observer.as_deref();

        let result = self.load_and_publish(identity, site_id, observer).await;
        if let Err(e) = &result {
            error!(identity, site_id, error = %e, "publish run failed");
            notify(observer, "error", &e.to_string()).await;
        }
        result
    }

    async fn load_and_publish(
        &self,
        identity: &str,
        site_id: i64,
        observer: Option<&dyn Connection>,
    ) -> Result<PublishReport, PublishError> {
        let site = self
            .store
            .load_site(identity, site_id)
            .await
            .map_err(|e| LoadError {
                identity: identity.to_string(),
                site_id,
                reason: e.to_string(),
            })?;
        self.publish(&site, observer).await
    }

    /// Run the publish state machine for an already-loaded site.
    pub async fn publish(
        &self,
        site: &Site,
        observer: Option<&dyn Connection>,
    ) -> Result<PublishReport, PublishError> {
        let mut stage = PublishStage::Start;
        notify(observer, "publish-start", &site.domain).await;

        // Build directory: ephemeral, destroyed on every exit path when
        // the guard drops.
        let build = tempfile::tempdir().map_err(RenderError::Io)?;

        transition(&mut stage, PublishStage::Rendering, site);
        let output_dir = self.renderer.render(site, build.path(), observer).await?;

        transition(&mut stage, PublishStage::SyncingStorage, site);
        notify(observer, "publish-status", stage.notice_value()).await;
        self.reconciler.ensure_public_endpoint(&site.domain).await?;
        let report = self.reconciler.sync(&site.domain, &output_dir).await?;

        if let Some(label) = site.managed_subdomain(&self.base_host) {
            transition(&mut stage, PublishStage::ConfiguringDns, site);
            notify(observer, "publish-status", stage.notice_value()).await;
            match &self.dns {
                Some(provisioner) => provisioner.ensure_cname(label).await?,
                None => warn!(domain = %site.domain, "dns provisioning disabled; skipping CNAME"),
            }
        }

        transition(&mut stage, PublishStage::Done, site);
        info!(
            domain = %site.domain,
            uploaded = report.uploaded,
            deleted = report.deleted,
            "site published"
        );
        notify(observer, "publish-success", &site.domain).await;

        Ok(PublishReport {
            domain: site.domain.clone(),
            uploaded: report.uploaded,
            deleted: report.deleted,
        })
    }

    /// Tear a published site down: empty and remove its bucket, then drop
    /// the CNAME for managed subdomains. Idempotent, like the operations
    /// it builds on.
    pub async fn teardown(&self, identity: &str, site_id: i64) -> Result<(), PublishError> {
        let site = self
            .store
            .load_site(identity, site_id)
            .await
            .map_err(|e| LoadError {
                identity: identity.to_string(),
                site_id,
                reason: e.to_string(),
            })?;

        self.reconciler.remove_all(&site.domain).await?;

        if site.managed_subdomain(&self.base_host).is_some() {
            if let Some(provisioner) = &self.dns {
                provisioner.remove_cname(&site.domain).await?;
            }
        }
        info!(domain = %site.domain, "site torn down");
        Ok(())
    }
}

#[async_trait]
impl<St, S, D> Publisher for Orchestrator<St, S, D>
where
    St: SiteStore,
    S: ObjectStore,
    D: DnsProvider,
{
    async fn publish_for(
        &self,
        identity: &str,
        site_id: i64,
    ) -> Result<PublishReport, PublishError> {
        Orchestrator::publish_for(self, identity, site_id).await
    }
}

fn transition(stage: &mut PublishStage, next: PublishStage, site: &Site) {
    debug!(domain = %site.domain, from = ?stage, to = ?next, "publish stage transition");
    *stage = next;
}

/// Push a `notice <key>=<value>` frame to the observer, if any. A failed
/// push is logged and ignored, never fatal to the pipeline.
pub async fn notify(observer: Option<&dyn Connection>, key: &str, value: &str) {
    if let Some(conn) = observer {
        if let Err(e) = conn.send(&format!("notice {key}={value}")).await {
            warn!(key, error = ?e, "failed to push notice to observer");
        }
    }
}
