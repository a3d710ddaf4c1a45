//! Notification sink that writes toasts to the log.

use crate::error::RelayResult;
use crate::traits::{Notification, Notifier};
use async_trait::async_trait;
use uuid::Uuid;

/// Renders notifications as structured log events.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn create(&self, notification: &Notification) -> RelayResult<String> {
        let id = Uuid::new_v4().to_string();
        tracing::info!(
            id = %id,
            kind = %notification.kind,
            icon = notification.icon.as_deref().unwrap_or("none"),
            title = %notification.title,
            message = %notification.message,
            "Notification"
        );
        Ok(id)
    }
}
