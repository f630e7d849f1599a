//! Notification sinks.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Destination for alert notifications.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish `message` on `topic`.
    ///
    /// # Errors
    ///
    /// Implementations may fail if delivery fails; callers treat delivery
    /// failures as non-fatal.
    async fn publish(&self, topic: &str, message: &serde_json::Value) -> Result<()>;
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _topic: &str, _message: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Sink that logs every event at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn publish(&self, topic: &str, message: &serde_json::Value) -> Result<()> {
        info!(topic, %message, "Alert published");
        Ok(())
    }
}

/// An event captured by [`RecordingEventSink`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    /// Topic the event was published on
    pub topic: String,

    /// Event payload
    pub message: serde_json::Value,
}

/// Sink that keeps every event in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<PublishedEvent>>>,
}

impl RecordingEventSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far, in order
    pub async fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().await.clone()
    }

    /// Topics published so far, in order
    pub async fn topics(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .map(|event| event.topic.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, topic: &str, message: &serde_json::Value) -> Result<()> {
        self.events.lock().await.push(PublishedEvent {
            topic: topic.to_string(),
            message: message.clone(),
        });
        Ok(())
    }
}
