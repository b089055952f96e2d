//! Push messages and notification clicks

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::{arbiter::Arbiter, host::Notification};

/// Title used when a push payload carries none
pub const DEFAULT_TITLE: &str = "Fitout";

/// Icon attached to every notification
pub const NOTIFICATION_ICON: &str = "/icons/icon-192x192.png";

#[derive(Debug, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    tag: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Build the notification for a push payload
///
/// A payload that is not a JSON object still yields a notification: the
/// default title with the raw text as body.
pub fn notification_from_payload(payload: &[u8]) -> Notification {
    let parsed = match serde_json::from_slice::<PushPayload>(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Malformed push payload: {}", e);
            let text = String::from_utf8_lossy(payload).trim().to_string();
            PushPayload {
                title: None,
                body: (!text.is_empty()).then_some(text),
                tag: None,
                data: Value::Null,
            }
        }
    };

    Notification {
        title: parsed
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        body: parsed.body,
        tag: parsed.tag,
        icon: Some(NOTIFICATION_ICON.to_string()),
        data: parsed.data,
    }
}

impl Arbiter {
    /// Show a notification for an incoming push message
    pub async fn handle_push(&self, payload: &[u8]) -> Notification {
        let notification = notification_from_payload(payload);
        info!("Push received: {}", notification.title);
        self.host.show_notification(notification.clone()).await;
        notification
    }

    /// Dismiss the notification and bring up the landing page
    pub async fn handle_notification_click(&self, notification: &Notification) {
        self.host.close_notification(notification).await;
        self.host.focus_or_open(&self.config.landing_page).await;
    }
}
