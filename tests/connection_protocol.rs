use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use futures::stream;
use serde_json::json;

use sitios::connection::{serve, ConnectionDeps};
use sitios::contract::{
    BackendError, Connection, MockAuthVerifier, MockPublisher, MockSiteStore, PublishReport,
};
use sitios::session::Registry;
use sitios::site::Site;

#[derive(Default)]
struct RecordingConn {
    frames: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl Connection for RecordingConn {
    async fn send(&self, frame: &str) -> Result<(), BackendError> {
        self.frames.lock().unwrap().push(frame.to_string());
        Ok(())
    }
}

impl RecordingConn {
    fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }
}

fn frames_of(messages: &[&str]) -> impl futures::Stream<Item = String> + Unpin {
    stream::iter(messages.iter().map(|m| m.to_string()).collect::<Vec<_>>())
}

fn verifier_accepting(token: &'static str, identity: &'static str) -> Arc<MockAuthVerifier> {
    let mut auth = MockAuthVerifier::new();
    auth.expect_verify().returning(move |t| {
        if t == token {
            Ok(identity.to_string())
        } else {
            Err("invalid token".into())
        }
    });
    Arc::new(auth)
}

fn deps(
    registry: Registry,
    auth: Arc<MockAuthVerifier>,
    store: MockSiteStore,
    publisher: MockPublisher,
) -> ConnectionDeps {
    ConnectionDeps {
        registry,
        auth,
        store: Arc::new(store),
        publisher: Arc::new(publisher),
    }
}

#[tokio::test]
async fn login_binds_the_session_and_replies_with_success() {
    let registry = Registry::new();
    let conn = Arc::new(RecordingConn::default());
    let deps = deps(
        registry.clone(),
        verifier_accepting("tok123", "alice"),
        MockSiteStore::new(),
        MockPublisher::new(),
    );

    serve(
        frames_of(&["login tok123"]),
        conn.clone() as Arc<dyn Connection>,
        &deps,
    )
    .await;

    assert!(conn
        .frames()
        .iter()
        .any(|f| f == "notice login-success=alice"));
    // The read loop ended, so the hygiene removal dropped the entry.
    assert!(registry.get("alice").is_none());
}

#[tokio::test]
async fn verbs_before_login_are_ignored() {
    // No publisher/store expectations: any dispatch fails the test.
    let deps = deps(
        Registry::new(),
        verifier_accepting("tok123", "alice"),
        MockSiteStore::new(),
        MockPublisher::new(),
    );
    let conn = Arc::new(RecordingConn::default());

    serve(
        frames_of(&["publish 1", "site-info 1", "login tok123"]),
        conn.clone() as Arc<dyn Connection>,
        &deps,
    )
    .await;

    assert!(conn
        .frames()
        .iter()
        .any(|f| f == "notice login-success=alice"));
}

#[tokio::test]
async fn publish_verb_dispatches_for_the_logged_in_identity() {
    let mut publisher = MockPublisher::new();
    publisher
        .expect_publish_for()
        .withf(|identity, site_id| identity == "alice" && *site_id == 42)
        .times(1)
        .returning(|_, _| {
            Ok(PublishReport {
                domain: "blog.platformhost.example".into(),
                uploaded: 2,
                deleted: 0,
            })
        });

    let deps = deps(
        Registry::new(),
        verifier_accepting("tok123", "alice"),
        MockSiteStore::new(),
        publisher,
    );
    let conn = Arc::new(RecordingConn::default());

    serve(
        frames_of(&["login tok123", "publish 42"]),
        conn as Arc<dyn Connection>,
        &deps,
    )
    .await;
}

#[tokio::test]
async fn malformed_site_id_yields_an_error_notice() {
    let deps = deps(
        Registry::new(),
        verifier_accepting("tok123", "alice"),
        MockSiteStore::new(),
        MockPublisher::new(),
    );
    let conn = Arc::new(RecordingConn::default());

    serve(
        frames_of(&["login tok123", "publish forty-two"]),
        conn.clone() as Arc<dyn Connection>,
        &deps,
    )
    .await;

    assert!(conn
        .frames()
        .iter()
        .any(|f| f == "notice error=couldn't convert 'forty-two' into a numeric id"));
}

#[tokio::test]
async fn failed_login_gets_an_error_notice_and_no_session() {
    let registry = Registry::new();
    let deps = deps(
        registry.clone(),
        verifier_accepting("tok123", "alice"),
        MockSiteStore::new(),
        MockPublisher::new(),
    );
    let conn = Arc::new(RecordingConn::default());

    serve(
        frames_of(&["login wrong-token"]),
        conn.clone() as Arc<dyn Connection>,
        &deps,
    )
    .await;

    assert!(conn
        .frames()
        .iter()
        .any(|f| f.starts_with("notice error=")));
    assert!(registry.get("alice").is_none());
}

#[tokio::test]
async fn site_info_pushes_the_full_site_payload() {
    let mut store = MockSiteStore::new();
    store
        .expect_load_site()
        .withf(|identity, id| identity == "alice" && *id == 7)
        .returning(|_, _| {
            Ok(Site {
                id: 7,
                owner: "alice".into(),
                domain: "blog.platformhost.example".into(),
                data: serde_json::Map::new(),
                sources: vec![],
            })
        });

    let deps = deps(
        Registry::new(),
        verifier_accepting("tok123", "alice"),
        store,
        MockPublisher::new(),
    );
    let conn = Arc::new(RecordingConn::default());

    serve(
        frames_of(&["login tok123", "site-info 7"]),
        conn.clone() as Arc<dyn Connection>,
        &deps,
    )
    .await;

    let frames = conn.frames();
    let payload = frames
        .iter()
        .find(|f| f.starts_with("site "))
        .expect("a site frame must be pushed");
    let parsed: serde_json::Value =
        serde_json::from_str(payload.strip_prefix("site ").unwrap()).unwrap();
    assert_eq!(parsed["id"], json!(7));
    assert_eq!(parsed["domain"], json!("blog.platformhost.example"));
}

#[tokio::test(start_paused = true)]
async fn silent_connection_gets_the_not_logged_notice_once() {
    let deps = deps(
        Registry::new(),
        verifier_accepting("tok123", "alice"),
        MockSiteStore::new(),
        MockPublisher::new(),
    );
    let conn = Arc::new(RecordingConn::default());

    // The peer says nothing for well past the login window.
    let silent = Box::pin(stream::once(async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        "ping".to_string()
    }));

    serve(silent, conn.clone() as Arc<dyn Connection>, &deps).await;

    let notices: Vec<String> = conn
        .frames()
        .into_iter()
        .filter(|f| f == "notice status=not-logged")
        .collect();
    assert_eq!(notices.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn prompt_login_wins_the_race_against_the_timer() {
    let registry = Registry::new();
    let deps = deps(
        registry.clone(),
        verifier_accepting("tok123", "alice"),
        MockSiteStore::new(),
        MockPublisher::new(),
    );
    let conn = Arc::new(RecordingConn::default());

    serve(
        frames_of(&["login tok123"]),
        conn.clone() as Arc<dyn Connection>,
        &deps,
    )
    .await;

    // Let the timer fire if it is going to; the login must have won.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!conn
        .frames()
        .iter()
        .any(|f| f == "notice status=not-logged"));
}
