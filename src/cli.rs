//! CLI for running publish and teardown out of band, without a live
//! connection. Site definitions come from a YAML file; the object store
//! is a local preview directory, and DNS provisioning activates only
//! when Cloudflare credentials are present in the environment.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::warn;

use crate::contract::{BackendError, SiteStore};
use crate::dns::{CloudflareDns, Provisioner};
use crate::load_config::load_config;
use crate::publish::Orchestrator;
use crate::render::Renderer;
use crate::session::Registry;
use crate::site::Site;
use crate::storage::{DirStore, Reconciler};

/// CLI for sitios: publish declarative static sites.
#[derive(Parser)]
#[clap(
    name = "sitios",
    version,
    about = "Render a declarative site, reconcile its storage bucket and provision DNS"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Publish a site definition into a local bucket directory
    Publish {
        /// Path to the YAML settings file
        #[clap(long)]
        config: PathBuf,
        /// Path to the YAML site definition
        #[clap(long)]
        site: PathBuf,
        /// Directory holding the local buckets
        #[clap(long)]
        out: PathBuf,
    },
    /// Remove a published site: empty its bucket, drop its CNAME
    Teardown {
        /// Path to the YAML settings file
        #[clap(long)]
        config: PathBuf,
        /// Path to the YAML site definition
        #[clap(long)]
        site: PathBuf,
        /// Directory holding the local buckets
        #[clap(long)]
        out: PathBuf,
    },
}

/// Single-site [`SiteStore`] backed by a parsed definition file. A wrong
/// identity or id is indistinguishable from a missing site, matching the
/// data layer's ownership contract.
struct FileSiteStore {
    site: Site,
}

#[async_trait]
impl SiteStore for FileSiteStore {
    async fn load_site(&self, identity: &str, site_id: i64) -> Result<Site, BackendError> {
        if self.site.owner == identity && self.site.id == site_id {
            Ok(self.site.clone())
        } else {
            Err(format!("site {site_id} not found").into())
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main().
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Publish { config, site, out } => {
            let site = load_site_file(&site)?;
            let (owner, site_id) = (site.owner.clone(), site.id);
            let orchestrator = build_orchestrator(&config, site, &out)?;
            println!("Publishing site {site_id}...");
            match orchestrator.publish_for(&owner, site_id).await {
                Ok(report) => {
                    println!(
                        "Published {} ({} uploaded, {} stale removed)",
                        report.domain, report.uploaded, report.deleted
                    );
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[ERROR] Publish failed: {e}");
                    Err(anyhow::Error::new(e))
                }
            }
        }
        Commands::Teardown { config, site, out } => {
            let site = load_site_file(&site)?;
            let (owner, site_id) = (site.owner.clone(), site.id);
            let orchestrator = build_orchestrator(&config, site, &out)?;
            println!("Tearing down site {site_id}...");
            match orchestrator.teardown(&owner, site_id).await {
                Ok(()) => {
                    println!("Teardown complete.");
                    Ok(())
                }
                Err(e) => {
                    eprintln!("[ERROR] Teardown failed: {e}");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}

fn build_orchestrator(
    config_path: &PathBuf,
    site: Site,
    out_dir: &PathBuf,
) -> Result<Orchestrator<FileSiteStore, DirStore, CloudflareDns>> {
    let config = load_config(config_path)?;

    let dns = match CloudflareDns::new_from_env() {
        Ok(client) => Some(Provisioner::new(
            client,
            config.storage_endpoint_host.clone(),
        )),
        Err(e) => {
            warn!(error = ?e, "Cloudflare credentials not available; DNS provisioning disabled");
            None
        }
    };

    Ok(Orchestrator::new(
        FileSiteStore { site },
        Renderer::new(&config.skeleton_dir, &config.renderer_bin),
        Reconciler::new(DirStore::new(out_dir)),
        dns,
        Registry::new(),
        config.base_host,
    ))
}

fn load_site_file(path: &PathBuf) -> Result<Site> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read site definition {path:?}"))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse site definition {path:?}"))
}
