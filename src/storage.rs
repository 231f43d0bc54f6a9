//! Storage reconciler: make a remote object set exactly equal a local
//! directory tree, and provision the container as a public website
//! endpoint.
//!
//! Reconciliation uploads before it deletes: every local file is uploaded
//! and its key recorded as kept, then the existing remote set is listed
//! and anything not kept is removed. A reader hitting the endpoint
//! mid-sync therefore never sees a still-needed file missing; deletions
//! only touch objects already superseded or truly orphaned.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::contract::ObjectStore;
use crate::error::StorageSyncError;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy)]
pub struct SyncReport {
    pub uploaded: usize,
    pub deleted: usize,
}

/// Reconciles a bucket against local build output through an
/// [`ObjectStore`] backend.
pub struct Reconciler<S> {
    store: S,
}

impl<S: ObjectStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Provision `bucket` as a public static-website endpoint. Idempotent:
    /// re-running on an already-configured bucket is a no-op success.
    pub async fn ensure_public_endpoint(&self, bucket: &str) -> Result<(), StorageSyncError> {
        let exists = self
            .store
            .bucket_exists(bucket)
            .await
            .map_err(|e| StorageSyncError(format!("bucket_exists({bucket}): {e}")))?;

        if !exists {
            self.store
                .create_bucket(bucket)
                .await
                .map_err(|e| StorageSyncError(format!("create_bucket({bucket}): {e}")))?;
            info!(bucket, "created bucket");
        }

        self.store
            .set_bucket_public_read(bucket)
            .await
            .map_err(|e| StorageSyncError(format!("set_bucket_public_read({bucket}): {e}")))?;

        self.store
            .set_bucket_website(bucket, "index.html", "error.html")
            .await
            .map_err(|e| StorageSyncError(format!("set_bucket_website({bucket}): {e}")))?;

        debug!(bucket, "bucket configured as public website endpoint");
        Ok(())
    }

    /// Upload every file under `local_dir` into `bucket`, then delete
    /// every remote key not present locally. After success the remote
    /// object set equals exactly the local tree.
    ///
    /// Individual upload and delete failures are logged and skipped; a
    /// filesystem error (unreadable file, broken walk) or a failed remote
    /// listing aborts immediately.
    pub async fn sync(&self, bucket: &str, local_dir: &Path) -> Result<SyncReport, StorageSyncError> {
        let mut files = Vec::new();
        collect_files(local_dir, local_dir, &mut files)
            .map_err(|e| StorageSyncError(format!("walking {}: {e}", local_dir.display())))?;

        let mut kept = HashSet::new();
        let mut uploaded = 0usize;
        for (path, key) in files {
            let content = std::fs::read(&path)
                .map_err(|e| StorageSyncError(format!("reading {}: {e}", path.display())))?;
            let content_type = content_type_for(&path);

            match self
                .store
                .put_object(bucket, &key, content, content_type)
                .await
            {
                Ok(()) => {
                    uploaded += 1;
                    debug!(bucket, key = %key, content_type, "uploaded object");
                }
                Err(e) => {
                    // Keep the key anyway so a failed re-upload does not
                    // delete the previously deployed copy below.
                    warn!(bucket, key = %key, error = ?e, "failed to upload object");
                }
            }
            kept.insert(key);
        }

        let remote = self
            .store
            .list_objects(bucket)
            .await
            .map_err(|e| StorageSyncError(format!("list_objects({bucket}): {e}")))?;

        let stale: Vec<String> = remote
            .into_iter()
            .filter(|key| !kept.contains(key))
            .collect();
        let deleted = stale.len();

        if !stale.is_empty() {
            if let Err(e) = self.store.remove_objects(bucket, stale).await {
                warn!(bucket, error = ?e, "failed to remove stale objects");
            }
        }

        info!(bucket, uploaded, deleted, "storage reconciliation finished");
        Ok(SyncReport { uploaded, deleted })
    }

    /// Delete every object and then the bucket itself. A bucket that is
    /// already gone counts as success.
    pub async fn remove_all(&self, bucket: &str) -> Result<(), StorageSyncError> {
        match self.store.list_objects(bucket).await {
            Ok(keys) if !keys.is_empty() => {
                if let Err(e) = self.store.remove_objects(bucket, keys).await {
                    warn!(bucket, error = ?e, "failed to empty bucket before removal");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(bucket, error = ?e, "failed to list bucket before removal"),
        }

        if let Err(remove_err) = self.store.remove_bucket(bucket).await {
            let exists = self
                .store
                .bucket_exists(bucket)
                .await
                .map_err(|e| StorageSyncError(format!("bucket_exists({bucket}): {e}")))?;
            if exists {
                return Err(StorageSyncError(format!(
                    "remove_bucket({bucket}): {remove_err}"
                )));
            }
            // Already deleted.
        }
        info!(bucket, "bucket removed");
        Ok(())
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(PathBuf, String)>,
) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            out.push((path, key));
        }
    }
    Ok(())
}

/// Content type inferred from the file extension, for the upload headers.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

/// Directory-backed [`ObjectStore`]: each bucket is a subdirectory, each
/// object a file. Used by the CLI for local preview publishes and by the
/// reconciliation tests. Policy and website configuration have no local
/// equivalent and succeed as no-ops.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }
}

#[async_trait::async_trait]
impl ObjectStore for DirStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, crate::contract::BackendError> {
        Ok(self.bucket_dir(bucket).is_dir())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), crate::contract::BackendError> {
        std::fs::create_dir_all(self.bucket_dir(bucket))?;
        Ok(())
    }

    async fn set_bucket_public_read(
        &self,
        bucket: &str,
    ) -> Result<(), crate::contract::BackendError> {
        debug!(bucket, "local store: public-read policy is a no-op");
        Ok(())
    }

    async fn set_bucket_website(
        &self,
        bucket: &str,
        _index_document: &str,
        _error_document: &str,
    ) -> Result<(), crate::contract::BackendError> {
        debug!(bucket, "local store: website configuration is a no-op");
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), crate::contract::BackendError> {
        let path = self.bucket_dir(bucket).join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
    ) -> Result<Vec<String>, crate::contract::BackendError> {
        let dir = self.bucket_dir(bucket);
        if !dir.is_dir() {
            return Err(format!("bucket '{bucket}' does not exist").into());
        }
        let mut files = Vec::new();
        collect_files(&dir, &dir, &mut files)?;
        Ok(files.into_iter().map(|(_, key)| key).collect())
    }

    async fn remove_objects(
        &self,
        bucket: &str,
        keys: Vec<String>,
    ) -> Result<(), crate::contract::BackendError> {
        let dir = self.bucket_dir(bucket);
        for key in keys {
            let path = dir.join(&key);
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(bucket, key = %key, error = ?e, "failed to remove local object");
            }
        }
        Ok(())
    }

    async fn remove_bucket(&self, bucket: &str) -> Result<(), crate::contract::BackendError> {
        let dir = self.bucket_dir(bucket);
        if !dir.exists() {
            return Err(format!("bucket '{bucket}' does not exist").into());
        }
        std::fs::remove_dir_all(dir)?;
        Ok(())
    }
}
