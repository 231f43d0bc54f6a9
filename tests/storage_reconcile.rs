use std::collections::HashSet;
use std::path::Path;

use sitios::contract::{MockObjectStore, ObjectStore};
use sitios::storage::{DirStore, Reconciler};

const BUCKET: &str = "blog.platformhost.example";

fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

async fn remote_keys(store: &DirStore) -> HashSet<String> {
    store
        .list_objects(BUCKET)
        .await
        .unwrap()
        .into_iter()
        .collect()
}

#[tokio::test]
async fn sync_makes_remote_set_equal_local_tree() {
    let remote_root = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    write_tree(
        local.path(),
        &[
            ("index.html", "<h1>home</h1>"),
            ("css/style.css", "body {}"),
            ("posts/2024/first.html", "<p>first</p>"),
        ],
    );

    let store = DirStore::new(remote_root.path());
    let reconciler = Reconciler::new(DirStore::new(remote_root.path()));

    reconciler.ensure_public_endpoint(BUCKET).await.unwrap();
    let report = reconciler.sync(BUCKET, local.path()).await.unwrap();
    assert_eq!(report.uploaded, 3);
    assert_eq!(report.deleted, 0);

    let expected: HashSet<String> = ["index.html", "css/style.css", "posts/2024/first.html"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(remote_keys(&store).await, expected);
}

#[tokio::test]
async fn sync_removes_files_dropped_from_the_tree() {
    let remote_root = tempfile::tempdir().unwrap();
    let store = DirStore::new(remote_root.path());
    let reconciler = Reconciler::new(DirStore::new(remote_root.path()));
    reconciler.ensure_public_endpoint(BUCKET).await.unwrap();

    // First build: three files.
    let first = tempfile::tempdir().unwrap();
    write_tree(
        first.path(),
        &[
            ("index.html", "v1"),
            ("about.html", "v1"),
            ("css/style.css", "v1"),
        ],
    );
    reconciler.sync(BUCKET, first.path()).await.unwrap();

    // Second build drops about.html and adds a post.
    let second = tempfile::tempdir().unwrap();
    write_tree(
        second.path(),
        &[
            ("index.html", "v2"),
            ("css/style.css", "v2"),
            ("posts/first.html", "v2"),
        ],
    );
    let report = reconciler.sync(BUCKET, second.path()).await.unwrap();
    assert_eq!(report.deleted, 1);

    let expected: HashSet<String> = ["index.html", "css/style.css", "posts/first.html"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(remote_keys(&store).await, expected);

    // The updated file really carries the new content.
    let updated = remote_root.path().join(BUCKET).join("index.html");
    assert_eq!(std::fs::read_to_string(updated).unwrap(), "v2");
}

#[tokio::test]
async fn ensure_public_endpoint_is_idempotent() {
    let mut store = MockObjectStore::new();
    let mut checks = 0;
    store.expect_bucket_exists().times(2).returning(move |_| {
        checks += 1;
        Ok(checks > 1)
    });
    // The bucket is only ever created once.
    store.expect_create_bucket().times(1).returning(|_| Ok(()));
    store
        .expect_set_bucket_public_read()
        .times(2)
        .returning(|_| Ok(()));
    store
        .expect_set_bucket_website()
        .withf(|_, index, error| index == "index.html" && error == "error.html")
        .times(2)
        .returning(|_, _, _| Ok(()));

    let reconciler = Reconciler::new(store);
    reconciler.ensure_public_endpoint(BUCKET).await.unwrap();
    reconciler.ensure_public_endpoint(BUCKET).await.unwrap();
}

#[tokio::test]
async fn failed_upload_is_skipped_and_its_old_copy_survives() {
    let local = tempfile::tempdir().unwrap();
    write_tree(local.path(), &[("good.html", "ok"), ("bad.html", "nope")]);

    let mut store = MockObjectStore::new();
    store.expect_put_object().returning(|_, key, _, _| {
        if key == "bad.html" {
            Err("transient upload failure".into())
        } else {
            Ok(())
        }
    });
    // The previously deployed copy of bad.html is listed remotely; it
    // must not be deleted just because its re-upload failed, so
    // remove_objects has no expectation here.
    store
        .expect_list_objects()
        .returning(|_| Ok(vec!["bad.html".to_string()]));

    let reconciler = Reconciler::new(store);
    let report = reconciler.sync(BUCKET, local.path()).await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.deleted, 0);
}

#[tokio::test]
async fn unreadable_local_tree_aborts_the_sync() {
    // No expectations: the walk fails before any backend call.
    let store = MockObjectStore::new();
    let reconciler = Reconciler::new(store);

    let err = reconciler
        .sync(BUCKET, Path::new("/definitely/not/a/real/dir"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("walking"));
}

#[tokio::test]
async fn remove_all_tolerates_an_absent_bucket() {
    let remote_root = tempfile::tempdir().unwrap();
    let reconciler = Reconciler::new(DirStore::new(remote_root.path()));

    // Never created, twice removed: both succeed.
    reconciler.remove_all(BUCKET).await.unwrap();
    reconciler.remove_all(BUCKET).await.unwrap();
}
