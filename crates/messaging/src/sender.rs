use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: String,
    pub status: String,
    pub attempts: u32,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("messaging is not configured: {0}")]
    NotConfigured(String),
    #[error("invalid recipient `{0}`")]
    InvalidRecipient(String),
    #[error("provider rejected message with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("delivery outcome unknown: {0}")]
    Ambiguous(String),
    #[error("delivery failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl DeliveryError {
    /// Only failures where the provider cannot have accepted the message are retried:
    /// connect errors, throttling and 503. A request that may have reached the provider
    /// is `Ambiguous` and never resent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Rejected { status, .. } => *status == 429 || *status == 503,
            Self::Transport(_) => true,
            Self::Ambiguous(_)
            | Self::NotConfigured(_)
            | Self::InvalidRecipient(_)
            | Self::Exhausted { .. } => false,
        }
    }
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError>;
}

/// Used when messaging is disabled; the message is only logged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSender;

#[async_trait]
impl MessageSender for NoopSender {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        info!(
            event_name = "messaging.noop.skipped",
            to,
            body_chars = body.chars().count(),
            "messaging disabled; outbound message not sent"
        );
        Ok(DeliveryReceipt { message_id: "noop".to_string(), status: "skipped".to_string(), attempts: 0 })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub body: String,
}

/// Keeps every message in memory; optionally fails every send.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentMessage>>,
    failure: Option<DeliveryError>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(error: DeliveryError) -> Self {
        Self { sent: Mutex::new(Vec::new()), failure: Some(error) }
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, to: &str, body: &str) -> Result<DeliveryReceipt, DeliveryError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let mut sent = self.sent.lock().await;
        sent.push(SentMessage { to: to.to_string(), body: body.to_string() });
        Ok(DeliveryReceipt {
            message_id: format!("SM-test-{}", sent.len()),
            status: "queued".to_string(),
            attempts: 1,
        })
    }
}
