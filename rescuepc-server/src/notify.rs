//! Issuance notifications.
//!
//! The issuance service runs on the blocking pool, so it only pushes events
//! onto a channel. A separate task drains the channel and hands each event
//! to the email collaborator.

use rescuepc_license::{IssuanceObserver, LicenseIssued};
use tokio::sync::mpsc;

/// Forwards issued events onto an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<LicenseIssued>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LicenseIssued>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl IssuanceObserver for ChannelObserver {
    fn license_issued(&self, event: &LicenseIssued) {
        if self.tx.send(event.clone()).is_err() {
            tracing::warn!(key = %event.key, "notifier stopped, dropping issued event");
        }
    }
}

/// Drains issued events until every sender is dropped.
///
/// With a URL each event is POSTed as JSON; failures are logged and not
/// retried. Without one, events are only logged.
pub async fn run_delivery(
    mut rx: mpsc::UnboundedReceiver<LicenseIssued>,
    client: reqwest::Client,
    url: Option<String>,
) {
    while let Some(event) = rx.recv().await {
        let Some(url) = url.as_deref() else {
            tracing::info!(
                key = %event.key,
                owner_email = %event.owner_email,
                "license issued (no notify url configured)"
            );
            continue;
        };

        match client.post(url).json(&event).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(key = %event.key, "issued event delivered");
            }
            Ok(resp) => {
                tracing::warn!(key = %event.key, status = %resp.status(), "notify endpoint rejected event");
            }
            Err(e) => {
                tracing::warn!(key = %event.key, error = %e, "failed to deliver issued event");
            }
        }
    }
    tracing::debug!("notifier channel closed");
}
