use reqwest::Client;
use tracing::{debug, warn};

use shared_config::AppConfig;

use crate::models::AppointmentEvent;

/// Fire-and-forget event dispatch to the notification collaborator.
///
/// Every `dispatch` call returns immediately; the POST runs on a detached
/// task so a slow or broken notifier can never block or fail the scheduling
/// operation that emitted the event.
#[derive(Clone)]
pub struct NotificationDispatcher {
    client: Client,
    webhook_url: String,
}

impl NotificationDispatcher {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            webhook_url: config.notification_webhook_url.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.webhook_url.is_empty()
    }

    pub fn dispatch(&self, event: AppointmentEvent) {
        if !self.is_enabled() {
            debug!(
                "Notification webhook not configured, dropping {:?} event for {}",
                event.kind, event.appointment_id
            );
            return;
        }

        let client = self.client.clone();
        let url = self.webhook_url.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(
                        "Delivered {:?} event for appointment {}",
                        event.kind, event.appointment_id
                    );
                }
                Ok(response) => {
                    warn!(
                        "Notifier rejected {:?} event for appointment {}: HTTP {}",
                        event.kind,
                        event.appointment_id,
                        response.status()
                    );
                }
                Err(e) => {
                    warn!(
                        "Failed to deliver {:?} event for appointment {}: {}",
                        event.kind, event.appointment_id, e
                    );
                }
            }
        });
    }
}
