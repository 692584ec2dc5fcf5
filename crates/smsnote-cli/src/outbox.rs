//! SMS gateway that appends outgoing messages to a local JSON-lines file.
//!
//! Stands in for a telephony provider on a single machine: the reset link of
//! `smsnote forgot` ends up in the outbox, where `smsnote reset` can pick it up.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use smsnote_core::{CallContext, InboundMessage, LogGateway, SmsGateway, SmsNoteError};

#[derive(Debug, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub to: String,
    pub text: String,
    pub sent_at: String,
}

pub struct OutboxGateway {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OutboxGateway {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }
}

impl SmsGateway for OutboxGateway {
    fn send(&self, ctx: &CallContext, phone: &str, text: &str) -> smsnote_core::Result<()> {
        ctx.check()?;
        let message = OutboxMessage {
            to: phone.to_string(),
            text: text.to_string(),
            sent_at: Utc::now().to_rfc3339(),
        };
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');

        let _guard = self
            .lock
            .lock()
            .map_err(|_| SmsNoteError::Storage("Outbox lock poisoned".to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        tracing::info!(to = phone, outbox = %self.path.display(), "sms: queued");
        Ok(())
    }

    fn parse_inbound(&self, payload: &[u8]) -> smsnote_core::Result<InboundMessage> {
        LogGateway.parse_inbound(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let gateway = OutboxGateway::new(path.clone());
        let ctx = CallContext::background();

        gateway.send(&ctx, "+12015550123", "first").unwrap();
        gateway.send(&ctx, "+12015550123", "second\nline").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let messages: Vec<OutboxMessage> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].to, "+12015550123");
        assert_eq!(messages[1].text, "second\nline");
    }

    #[test]
    fn test_send_respects_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let gateway = OutboxGateway::new(path.clone());
        let ctx = CallContext::background();
        ctx.cancel_handle().cancel();

        assert!(matches!(
            gateway.send(&ctx, "+12015550123", "hi"),
            Err(SmsNoteError::Cancelled)
        ));
        assert!(!path.exists());
    }
}
