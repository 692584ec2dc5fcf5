//! SMS delivery seam.
//!
//! Delivery, retries and rate limits belong to the telephony provider. The
//! service only needs to hand a message to something and to turn an inbound
//! webhook payload into a sender and a body.
//!
//! Inbound payloads are trusted as-is: whoever can reach the inbound hook can
//! write a note for any registered number. Authenticating the provider's
//! request is the caller's job.

use serde::Deserialize;

use crate::context::CallContext;
use crate::error::{Result, SmsNoteError};

/// A message received from a phone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender number as the provider reported it
    pub from: String,
    pub text: String,
}

/// Outbound and inbound SMS collaborator.
pub trait SmsGateway: Send + Sync {
    /// Deliver `text` to the E.164 number `phone`.
    fn send(&self, ctx: &CallContext, phone: &str, text: &str) -> Result<()>;

    /// Extract the sender and body from a provider payload.
    fn parse_inbound(&self, payload: &[u8]) -> Result<InboundMessage>;
}

#[derive(Deserialize)]
struct InboundPayload {
    #[serde(rename = "From")]
    from: String,
    #[serde(rename = "Text")]
    text: String,
}

/// Gateway that records deliveries in the log instead of sending them.
///
/// Inbound payloads are JSON objects of the form
/// `{"From": "+12015550123", "Text": "..."}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogGateway;

impl SmsGateway for LogGateway {
    fn send(&self, ctx: &CallContext, phone: &str, text: &str) -> Result<()> {
        ctx.check()?;
        tracing::info!(to = phone, chars = text.chars().count(), "sms: delivered");
        Ok(())
    }

    fn parse_inbound(&self, payload: &[u8]) -> Result<InboundMessage> {
        let parsed: InboundPayload = serde_json::from_slice(payload)
            .map_err(|e| SmsNoteError::Validation(format!("Invalid inbound payload: {}", e)))?;
        Ok(InboundMessage {
            from: parsed.from,
            text: parsed.text,
        })
    }
}
