//! WhatsApp messaging channel.
//!
//! - **Outbound** (`sender`, `twilio`) - `MessageSender` trait and the Twilio Messages API client
//! - **Inbound** (`webhook`) - webhook form payload and TwiML replies
//! - **Retry** (`retry`) - exponential backoff shared by outbound clients
//!
//! ```text
//! Worker → MessageSender → TwilioSender → Twilio API
//! Twilio webhook → InboundMessage → ConversationService → twiml_reply
//! ```

pub mod retry;
pub mod sender;
pub mod twilio;
pub mod webhook;

use std::sync::Arc;

use casedesk_core::config::MessagingConfig;

pub use retry::RetryPolicy;
pub use sender::{DeliveryError, DeliveryReceipt, MessageSender, NoopSender, RecordingSender};
pub use twilio::TwilioSender;
pub use webhook::{twiml_reply, InboundMessage};

/// Twilio when messaging is enabled, otherwise a sender that only logs.
pub fn sender_from_config(
    config: &MessagingConfig,
) -> Result<Arc<dyn MessageSender>, DeliveryError> {
    if !config.enabled {
        return Ok(Arc::new(NoopSender));
    }
    Ok(Arc::new(TwilioSender::from_config(config)?))
}
