use async_trait::async_trait;
use std::sync::Arc;

use super::ProtocolError;
use crate::{
    definitions::DidCommMessage,
    store::{DocumentStore, key_document_for},
    transport::RelayTransport,
};

/// Delivers the messages the verification protocol emits
///
/// The sender is the message's `from` DID, the recipient its single `to` DID.
#[async_trait]
pub trait MessageProvider: Send + Sync {
    async fn send_message(&self, message: DidCommMessage) -> Result<(), ProtocolError>;
}

/// Sends protocol messages through a [RelayTransport], signing with the
/// sender's key document from the wallet store
pub struct RelayMessageProvider {
    transport: Arc<RelayTransport>,
    store: Arc<dyn DocumentStore>,
    use_did_service_endpoint: bool,
}

impl RelayMessageProvider {
    pub fn new(transport: Arc<RelayTransport>, store: Arc<dyn DocumentStore>) -> Self {
        RelayMessageProvider {
            transport,
            store,
            use_did_service_endpoint: false,
        }
    }

    /// Deliver to the recipients' own messaging services instead of the relay
    pub fn with_did_service_endpoint(mut self, use_did_service_endpoint: bool) -> Self {
        self.use_did_service_endpoint = use_did_service_endpoint;
        self
    }
}

#[async_trait]
impl MessageProvider for RelayMessageProvider {
    async fn send_message(&self, message: DidCommMessage) -> Result<(), ProtocolError> {
        let sender = message
            .from
            .as_deref()
            .ok_or(ProtocolError::MissingField("from"))?;

        let key_doc = key_document_for(self.store.as_ref(), sender).await?;

        self.transport
            .send_didcomm_message(&key_doc, &message, self.use_did_service_endpoint)
            .await?;

        Ok(())
    }
}
