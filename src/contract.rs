#![allow(unused)]

//! # contract: collaborator interfaces for the publish pipeline
//!
//! This module defines the traits the pipeline depends on — the object
//! storage backend, the DNS backend, the site data layer, the live
//! connection capability and the authentication verifier — plus the plain
//! data types they exchange.
//!
//! ## Interface & Extensibility
//! - Implement [`ObjectStore`] for a storage backend (S3-compatible API,
//!   local directory, in-memory test double).
//! - Implement [`DnsProvider`] for a DNS backend (Cloudflare, test mock).
//! - Implement [`Connection`] for a live push channel (websocket frame
//!   writer in production, a recording stub in tests).
//! - All methods are async, returning boxed error trait objects so
//!   implementors can surface any upstream failure uniformly.
//!
//! ## Mocking & Testing
//! - Every trait is annotated for `mockall`, so consumers can generate
//!   deterministic mocks for unit/integration tests. The mocks are
//!   exported under the `test-export-mocks` feature (on by default),
//!   mirroring how the pipeline itself is tested.

use async_trait::async_trait;
use mockall::{automock, predicate::*};

use crate::error::PublishError;
use crate::site::Site;

/// Uniform boxed error for collaborator implementations.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Data layer lookup for sites. Ownership is enforced here: a site not
/// owned by `identity` must be reported exactly like a missing site.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SiteStore: Send + Sync {
    /// Load a site with its current sources and configuration.
    async fn load_site(&self, identity: &str, site_id: i64) -> Result<Site, BackendError>;
}

/// Object storage backend operations needed by the reconciler.
///
/// Buckets are named after the site's public domain. Implementors must
/// tolerate concurrent use; the reconciler adds no locking of its own.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, BackendError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), BackendError>;

    /// Attach a public-read policy to the bucket.
    async fn set_bucket_public_read(&self, bucket: &str) -> Result<(), BackendError>;

    /// Configure the bucket as a static-website endpoint.
    async fn set_bucket_website(
        &self,
        bucket: &str,
        index_document: &str,
        error_document: &str,
    ) -> Result<(), BackendError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// List every object key in the bucket, recursively.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, BackendError>;

    /// Batch-delete the given object keys.
    async fn remove_objects(&self, bucket: &str, keys: Vec<String>) -> Result<(), BackendError>;

    async fn remove_bucket(&self, bucket: &str) -> Result<(), BackendError>;
}

/// Minimal data needed to create a DNS record.
pub struct NewDnsRecord<'a> {
    /// Record type, e.g. "CNAME".
    pub record_type: &'a str,
    /// Record name relative to the zone (the subdomain label).
    pub name: &'a str,
    /// Record target, e.g. the storage website endpoint host.
    pub content: &'a str,
    /// Whether edge proxying is enabled for the record.
    pub proxied: bool,
}

/// A DNS record as reported by the backend.
#[derive(Debug, Clone)]
pub struct DnsRecord {
    pub id: String,
    pub record_type: String,
    pub name: String,
    pub content: String,
}

/// DNS backend operations needed by the provisioner.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Create a record in the managed zone. A backend "already exists"
    /// rejection is surfaced as an error here; the provisioner normalises
    /// it to success.
    async fn create_record<'a>(&self, req: NewDnsRecord<'a>) -> Result<DnsRecord, BackendError>;

    /// Query records by exact (fully qualified) name.
    async fn find_records(&self, name: &str) -> Result<Vec<DnsRecord>, BackendError>;

    async fn delete_record(&self, id: &str) -> Result<(), BackendError>;
}

/// A live push channel bound once at login and passed by reference
/// thereafter. Sends are best-effort: callers log and ignore failures,
/// a dead connection never fails the pipeline.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Connection: Send + Sync {
    /// Push one text frame to the peer.
    async fn send(&self, frame: &str) -> Result<(), BackendError>;
}

/// Verifies an authentication token and resolves it to an identity.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, BackendError>;
}

/// Summary of one successful publish run.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub domain: String,
    pub uploaded: usize,
    pub deleted: usize,
}

/// Entry point the connection read loop uses to trigger a publish run
/// for an authenticated identity. Implemented by the orchestrator; the
/// live observer, if any, is located through the session registry.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_for(
        &self,
        identity: &str,
        site_id: i64,
    ) -> Result<PublishReport, PublishError>;
}
