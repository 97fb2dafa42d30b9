use async_trait::async_trait;

use crate::domain::ContactResult;
use crate::error::{Result, TransportError};

/// Outbound message transport (SMS gateway or a test double).
#[async_trait]
pub trait NotifierPort: Send + Sync {
    async fn send(&self, to: &str, text: &str) -> std::result::Result<SendReceipt, TransportError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: Option<String>,
    pub diagnostic: String,
}

/// Tabular sink for a curated contact list.
pub trait ContactWriter {
    fn write_contacts(&mut self, contacts: &[ContactResult]) -> Result<()>;
}
