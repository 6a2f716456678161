//! services/api/src/adapters/notifier.rs
//!
//! A `NotificationSink` that routes due-item notifications into the tracing
//! log. Actual OS/browser delivery is a platform capability outside this
//! service; emission here is the end of our obligation.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use studydesk_core::ports::NotificationSink;

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn push(&self, owner: Uuid, title: &str, body: &str) {
        info!(target: "notifications", %owner, title, body, "notification emitted");
    }
}
