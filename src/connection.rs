//! Real-time connection read loop and outbound push protocol.
//!
//! One message per text frame, `<verb> <argument>` split on the first
//! space. The read loop is single-threaded per connection: one message is
//! fully processed before the next is read. The `login` verb must precede
//! all others; anything else arriving first is ignored with a warning.
//!
//! Outbound frames are `notice <key>=<value>` for status and errors,
//! `site <json>` for full resource payloads, and raw text for forwarded
//! renderer log lines.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::contract::{AuthVerifier, Connection, Publisher, SiteStore};
use crate::publish::notify;
use crate::session::Registry;
use crate::site::Site;

/// How long after connection open to wait for a login before sending the
/// one-shot unauthenticated-status notice.
pub const LOGIN_NOTICE_TIMEOUT: Duration = Duration::from_secs(1);

/// Collaborators shared by every connection read loop.
pub struct ConnectionDeps {
    pub registry: Registry,
    pub auth: Arc<dyn AuthVerifier>,
    pub store: Arc<dyn SiteStore>,
    pub publisher: Arc<dyn Publisher>,
}

/// Drive one connection: consume `frames` until the stream ends,
/// dispatching verbs against `deps` and pushing replies on `conn`.
pub async fn serve<F>(mut frames: F, conn: Arc<dyn Connection>, deps: &ConnectionDeps)
where
    F: Stream<Item = String> + Unpin,
{
    // One-shot race: whichever of "login succeeded" and "timer fired"
    // happens first determines the only action taken.
    let (logged_in_tx, logged_in_rx) = oneshot::channel::<()>();
    {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            tokio::select! {
                _ = logged_in_rx => {}
                _ = tokio::time::sleep(LOGIN_NOTICE_TIMEOUT) => {
                    notify(Some(conn.as_ref()), "status", "not-logged").await;
                }
            }
        });
    }
    let mut logged_in_tx = Some(logged_in_tx);
    let mut identity: Option<String> = None;

    while let Some(frame) = frames.next().await {
        let (verb, rest) = match frame.split_once(' ') {
            Some((verb, rest)) => (verb, rest),
            None => (frame.as_str(), ""),
        };
        debug!(verb, user = ?identity, "got message");

        if identity.is_none() && verb != "login" {
            warn!(verb, "not logged in; waiting for login message");
            continue;
        }

        match verb {
            "login" => match deps.auth.verify(rest).await {
                Ok(user) => {
                    if let Some(tx) = logged_in_tx.take() {
                        let _ = tx.send(());
                    }
                    deps.registry.set(user.clone(), Arc::clone(&conn));
                    debug!(user = %user, "successful login");
                    notify(Some(conn.as_ref()), "login-success", &user).await;
                    identity = Some(user);
                }
                Err(e) => {
                    error!(error = ?e, "failed to verify auth token");
                    notify(Some(conn.as_ref()), "error", &e.to_string()).await;
                }
            },
            "publish" => {
                let Some(user) = identity.as_deref() else { continue };
                match rest.trim().parse::<i64>() {
                    Ok(site_id) => {
                        // Failure notices are pushed by the orchestrator
                        // through the registry; nothing more to do here.
                        if let Err(e) = deps.publisher.publish_for(user, site_id).await {
                            error!(user, site_id, error = %e, "publish trigger failed");
                        }
                    }
                    Err(_) => {
                        notify(
                            Some(conn.as_ref()),
                            "error",
                            &format!("couldn't convert '{rest}' into a numeric id"),
                        )
                        .await;
                    }
                }
            }
            "site-info" => {
                let Some(user) = identity.as_deref() else { continue };
                match rest.trim().parse::<i64>() {
                    Ok(site_id) => match deps.store.load_site(user, site_id).await {
                        Ok(site) => send_site(conn.as_ref(), &site).await,
                        Err(e) => {
                            error!(user, site_id, error = ?e, "couldn't fetch site");
                            notify(Some(conn.as_ref()), "error", &e.to_string()).await;
                        }
                    },
                    Err(_) => {
                        notify(
                            Some(conn.as_ref()),
                            "error",
                            &format!("couldn't convert '{rest}' into a numeric id"),
                        )
                        .await;
                    }
                }
            }
            other => {
                warn!(verb = other, "invalid message kind");
            }
        }
    }

    // Read loop ended: drop our registry entry unless a reconnect
    // already replaced it.
    if let Some(user) = identity {
        if deps.registry.remove_if_same(&user, &conn) {
            debug!(user = %user, "connection closed, session dropped");
        }
    }
}

/// Push a full site payload as a `site <json>` frame.
pub async fn send_site(conn: &dyn Connection, site: &Site) {
    match serde_json::to_string(site) {
        Ok(json) => {
            if let Err(e) = conn.send(&format!("site {json}")).await {
                warn!(site = site.id, error = ?e, "failed to send site payload");
            }
        }
        Err(e) => {
            error!(site = site.id, error = ?e, "couldn't serialise site");
            notify(Some(conn), "error", &e.to_string()).await;
        }
    }
}
