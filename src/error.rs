//! Error types for the publish pipeline.
//!
//! Each pipeline stage has its own error type so the orchestrator's caller
//! can tell which stage failed. None of these are retried automatically:
//! a failed publish run must be re-triggered externally.

use thiserror::Error;

/// Site/source lookup or ownership failure from the data layer.
///
/// A site that exists but is owned by someone else is indistinguishable
/// from a site that does not exist.
#[derive(Debug, Error)]
#[error("failed to load site {site_id} for '{identity}': {reason}")]
pub struct LoadError {
    pub identity: String,
    pub site_id: i64,
    pub reason: String,
}

/// Configuration problems detected while preparing a render: unknown
/// provider tags, malformed globals, template expansion failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The source's provider tag does not match any registered plugin.
    #[error("unknown provider tag '{0}'")]
    UnknownProvider(String),

    /// Expanding the generation manifest template failed.
    #[error("failed to expand generation manifest: {0}")]
    Manifest(String),
}

/// Subprocess or manifest failure during the render stage. Blocks all
/// downstream stages: no storage or DNS mutation happens after this.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O failure while materialising the build directory or spawning
    /// the renderer.
    #[error("render i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The renderer subprocess exited non-zero. Carries the combined
    /// stdout/stderr captured up to that point.
    #[error("renderer exited with status {status:?}")]
    Subprocess {
        status: Option<i32>,
        output: String,
    },
}

/// Failure during storage reconciliation. Objects already uploaded are
/// left in place, never rolled back.
#[derive(Debug, Error)]
#[error("storage sync failed: {0}")]
pub struct StorageSyncError(pub String);

/// DNS record operation failure. When this happens after storage sync,
/// the site is hosted but not reachable under its intended name, which
/// is why it still fails the run.
#[derive(Debug, Error)]
#[error("dns operation failed: {0}")]
pub struct DnsError(pub String);

/// Unified error reported to the orchestrator's caller: exactly one
/// stage failure per run.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    StorageSync(#[from] StorageSyncError),

    #[error(transparent)]
    Dns(#[from] DnsError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
