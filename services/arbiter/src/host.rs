//! The runtime hosting the arbiter
//!
//! Notifications and client windows belong to the host, not to the arbiter.
//! The proxy binary has no windows to focus, so [`TracingHost`] only records
//! what would have happened.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// A system notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Identifies the notification for later dismissal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Opaque payload carried back on click
    #[serde(default)]
    pub data: Value,
}

#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Take over immediately instead of waiting for older instances
    async fn skip_waiting(&self);

    /// Govern every open client without a reload
    async fn claim_clients(&self);

    async fn show_notification(&self, notification: Notification);

    async fn close_notification(&self, notification: &Notification);

    /// Focus a client already showing `path`, or open a new one
    async fn focus_or_open(&self, path: &str);
}

/// Host that logs every call
#[derive(Debug, Clone, Default)]
pub struct TracingHost;

#[async_trait]
impl WorkerHost for TracingHost {
    async fn skip_waiting(&self) {
        info!("Skipping waiting, new arbiter takes over");
    }

    async fn claim_clients(&self) {
        info!("Claiming all clients");
    }

    async fn show_notification(&self, notification: Notification) {
        info!(
            title = %notification.title,
            tag = ?notification.tag,
            "Showing notification"
        );
    }

    async fn close_notification(&self, notification: &Notification) {
        info!(title = %notification.title, "Closing notification");
    }

    async fn focus_or_open(&self, path: &str) {
        info!("Opening client at {}", path);
    }
}
