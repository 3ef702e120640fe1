use base64ct::{Base64, Encoding};
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use url::Url;

use crate::{
    auth::{build_payload, build_payload_batch},
    crypto::{ENCRYPTED_CONTENT_TYPE, EncryptParams, derive_agreement_key, encrypt_for_dids},
    definitions::{DidCommMessage, KeyDocument},
    did::{DidResolver, KeyDidResolver},
    resolver::MessageResolver,
};

mod config;
pub mod error;
mod http;
mod message;

pub use config::RelayConfig;
pub use error::RelayError;
pub use message::RelayMessage;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Inputs of [RelayTransport::send_message]
pub struct SendMessage<'a> {
    pub sender: &'a KeyDocument,
    pub recipient_did: &'a str,
    pub message_type: &'a str,
    pub payload: Value,
    /// Deliver to the recipient's own messaging service instead of the relay
    pub use_did_service_endpoint: bool,
}

/// Inputs of [RelayTransport::get_messages]
#[derive(Clone, Copy)]
pub struct GetMessages<'a> {
    pub key_docs: &'a [KeyDocument],
    pub limit: Option<usize>,
    /// Return the relay records without decoding their `msg`
    pub skip_resolution: bool,
}

/// Result of [RelayTransport::receive_messages]
#[derive(Debug, Default)]
pub struct Inbox {
    /// Decoded messages, merged onto their relay records
    pub messages: Vec<RelayMessage>,
    /// Records whose `msg` could not be decoded, as the relay returned them
    pub undecodable: Vec<RelayMessage>,
}

/// Client of a store-and-forward relay
///
/// Holds no session: every call carries fresh authorization payloads signed
/// by the local key documents it acts for.
pub struct RelayTransport {
    service_url: RwLock<Url>,
    keep_messages: bool,
    client: reqwest::Client,
    resolver: MessageResolver,
    did_resolver: Arc<dyn DidResolver>,
}

impl RelayTransport {
    /// A transport for `config`, resolving `did:key` recipients offline
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        check_service_url(&config.service_url)?;

        let client = crate::http_client::build_client(config.request_timeout)
            .map_err(|e| RelayError::Http(e.context.to_string(), e.source))?;

        Ok(RelayTransport {
            service_url: RwLock::new(config.service_url),
            keep_messages: config.keep_messages,
            resolver: MessageResolver::with_client(client.clone()),
            client,
            did_resolver: Arc::new(KeyDidResolver),
        })
    }

    /// Use `did_resolver` for recipient keys and service endpoints
    pub fn with_did_resolver(mut self, did_resolver: Arc<dyn DidResolver>) -> Self {
        self.did_resolver = did_resolver;
        self
    }

    pub fn service_url(&self) -> Url {
        match self.service_url.read() {
            Ok(url) => url.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Point this transport at another relay
    pub fn set_service_url(&self, service_url: Url) -> Result<(), RelayError> {
        check_service_url(&service_url)?;
        tracing::info!("relay service URL set to {service_url}");

        *self.service_url.write().map_err(|_| RelayError::Internal)? = service_url;

        Ok(())
    }

    /// Encrypt a new message for `recipient_did` and deliver it
    pub async fn send_message(&self, params: SendMessage<'_>) -> Result<Value, RelayError> {
        if params.recipient_did.is_empty() {
            return Err(RelayError::MissingField("recipient DID"));
        }

        let message = DidCommMessage {
            id: crate::definitions::new_message_id(),
            message_type: params.message_type.to_string(),
            from: Some(params.sender.controller.clone()),
            to: vec![params.recipient_did.to_string()],
            body: params.payload,
        };

        self.send_didcomm_message(params.sender, &message, params.use_did_service_endpoint)
            .await
    }

    /// Encrypt `message` for its single recipient and deliver it
    ///
    /// Returns whatever the relay or service endpoint answered.
    pub async fn send_didcomm_message(
        &self,
        sender: &KeyDocument,
        message: &DidCommMessage,
        use_did_service_endpoint: bool,
    ) -> Result<Value, RelayError> {
        let recipient_did = match message.to.as_slice() {
            [did] if !did.is_empty() => did.as_str(),
            [] => return Err(RelayError::MissingField("recipient DID")),
            dids => return Err(RelayError::RecipientCount(dids.len())),
        };

        tracing::info!(
            "sending {} from {} to {recipient_did}",
            message.message_type,
            sender.controller
        );

        let result = if use_did_service_endpoint {
            self.deliver_direct(sender, recipient_did, message).await
        } else {
            self.deliver_to_relay(sender, recipient_did, message).await
        };

        result.inspect_err(|e| tracing::error!("sending message to {recipient_did} failed: {e}"))
    }

    async fn deliver_to_relay(
        &self,
        sender: &KeyDocument,
        recipient_did: &str,
        message: &DidCommMessage,
    ) -> Result<Value, RelayError> {
        let sender_key = derive_agreement_key(sender)?;
        let envelope = encrypt_for_dids(
            self.did_resolver.as_ref(),
            EncryptParams {
                sender: &sender_key,
                recipient_dids: &message.to,
                message,
            },
        )
        .await?;

        let msg = Base64::encode_string(&serde_json::to_vec(&envelope)?);
        let signed = build_payload(sender, json!({ "to": recipient_did, "msg": msg }))?;

        let url = self.endpoint(&["messages", &signed.did])?;
        tracing::trace!("posting message to {url}");

        http::post_json(
            &self.client,
            url,
            &json!({ "payload": signed.to_base64()? }),
            JSON_CONTENT_TYPE,
        )
        .await
    }

    async fn deliver_direct(
        &self,
        sender: &KeyDocument,
        recipient_did: &str,
        message: &DidCommMessage,
    ) -> Result<Value, RelayError> {
        let document = self.did_resolver.resolve(recipient_did).await?;
        let endpoint = document
            .messaging_endpoint()
            .ok_or_else(|| RelayError::ServiceEndpointNotFound(recipient_did.to_string()))?;

        let sender_key = derive_agreement_key(sender)?;
        let envelope = encrypt_for_dids(
            self.did_resolver.as_ref(),
            EncryptParams {
                sender: &sender_key,
                recipient_dids: &message.to,
                message,
            },
        )
        .await?;

        tracing::trace!("posting message to service endpoint {endpoint}");

        http::post_json(&self.client, endpoint, &envelope, ENCRYPTED_CONTENT_TYPE).await
    }

    /// Fetch the messages waiting for all of `key_docs` in one request
    ///
    /// Unless resolution is skipped, every message is decoded and merged onto
    /// its relay record; messages that fail to decode are dropped.
    pub async fn get_messages(
        &self,
        params: GetMessages<'_>,
    ) -> Result<Vec<RelayMessage>, RelayError> {
        Ok(self.receive_messages(params).await?.messages)
    }

    /// Like [get_messages](Self::get_messages), but also return the records
    /// that could not be decoded, so they can be acknowledged
    pub async fn receive_messages(&self, params: GetMessages<'_>) -> Result<Inbox, RelayError> {
        let records = self
            .fetch_messages(params)
            .await
            .inspect_err(|e| tracing::error!("fetching messages failed: {e}"))?;

        if params.skip_resolution {
            return Ok(Inbox {
                messages: records,
                ..Default::default()
            });
        }

        let resolved = self
            .resolver
            .resolve_all(records.iter().map(|record| &record.msg), params.key_docs)
            .await;

        let mut inbox = Inbox::default();

        for (record, resolved) in records.into_iter().zip(resolved) {
            match resolved {
                Some(resolved) => inbox.messages.push(record.merge_resolved(resolved)),
                None => {
                    tracing::debug!("dropping undecodable message {}", record.id);
                    inbox.undecodable.push(record);
                }
            }
        }

        Ok(inbox)
    }

    async fn fetch_messages(&self, params: GetMessages<'_>) -> Result<Vec<RelayMessage>, RelayError> {
        let batch = build_payload_batch(params.key_docs, json!({}))?;
        let dids = batch.dids_json()?;
        let payload = batch.to_base64()?;

        let mut url = self.endpoint(&["messages", "batch-dids"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("dids", &dids)
                .append_pair("payload", &payload)
                .append_pair("keepMessages", if self.keep_messages { "true" } else { "false" });

            if let Some(limit) = params.limit {
                query.append_pair("limit", &limit.to_string());
            }
        }

        let records: Vec<Value> = http::get_json(&self.client, url).await?;
        tracing::debug!("relay returned {} message(s)", records.len());

        Ok(records
            .into_iter()
            .filter_map(|record| {
                serde_json::from_value(record)
                    .inspect_err(|e| tracing::debug!("skipping malformed relay record: {e}"))
                    .ok()
            })
            .collect())
    }

    /// Tell the relay that `message_ids` for `did` were handled
    pub async fn ack_messages(&self, did: &str, message_ids: &[String]) -> Result<Value, RelayError> {
        if did.is_empty() {
            return Err(RelayError::MissingField("DID"));
        }
        if message_ids.is_empty() {
            return Err(RelayError::MissingField("message ids"));
        }

        let url = self.endpoint(&["messages", "ack"])?;
        tracing::debug!("acknowledging {} message(s) for {did}", message_ids.len());

        http::post_json(
            &self.client,
            url,
            &json!({ "ack": message_ids, "did": did }),
            JSON_CONTENT_TYPE,
        )
        .await
        .inspect_err(|e| tracing::error!("acknowledging messages failed: {e}"))
    }

    /// Register a push notification token for all of `key_docs`
    pub async fn register_push_token(
        &self,
        key_docs: &[KeyDocument],
        token: &str,
    ) -> Result<Value, RelayError> {
        if token.is_empty() {
            return Err(RelayError::MissingField("push token"));
        }

        self.push_token_request(key_docs, token)
            .await
            .inspect_err(|e| tracing::error!("registering push token failed: {e}"))
    }

    async fn push_token_request(
        &self,
        key_docs: &[KeyDocument],
        token: &str,
    ) -> Result<Value, RelayError> {
        let batch = build_payload_batch(key_docs, json!({ "token": token }))?;
        let dids = batch.dids_json()?;
        let payload = batch.to_base64()?;

        let mut url = self.endpoint(&["register", "batch-dids"])?;
        url.query_pairs_mut()
            .append_pair("dids", &dids)
            .append_pair("payload", &payload);

        http::post_json(&self.client, url, &json!({ "token": token }), JSON_CONTENT_TYPE).await
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RelayError> {
        let mut url = self.service_url();
        let base = url.to_string();

        url.path_segments_mut()
            .map_err(|_| RelayError::InvalidServiceUrl(base))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }
}

fn check_service_url(url: &Url) -> Result<(), RelayError> {
    if url.cannot_be_a_base() {
        return Err(RelayError::InvalidServiceUrl(url.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(url: &str) -> RelayTransport {
        RelayTransport::new(RelayConfig::new(Url::parse(url).unwrap())).unwrap()
    }

    #[test]
    fn endpoint_paths() {
        let transport = transport("https://relay.example/api/");

        assert_eq!(
            transport
                .endpoint(&["messages", "did:key:z6Mkholder"])
                .unwrap()
                .as_str(),
            "https://relay.example/api/messages/did:key:z6Mkholder"
        );

        transport
            .set_service_url(Url::parse("http://localhost:3000").unwrap())
            .unwrap();
        assert_eq!(
            transport.endpoint(&["messages", "ack"]).unwrap().as_str(),
            "http://localhost:3000/messages/ack"
        );
    }

    #[test]
    fn rejects_opaque_urls() {
        let transport = transport("https://relay.example");

        assert!(matches!(
            transport.set_service_url(Url::parse("mailto:relay@example.com").unwrap()),
            Err(RelayError::InvalidServiceUrl(_))
        ));
        assert_eq!(transport.service_url().as_str(), "https://relay.example/");
    }

    #[tokio::test]
    async fn missing_fields() {
        let transport = transport("https://relay.example");
        let key_doc = KeyDocument::generate_did_key();

        assert!(matches!(
            transport.ack_messages(&key_doc.controller, &[]).await,
            Err(RelayError::MissingField(_))
        ));
        assert!(matches!(
            transport.register_push_token(&[key_doc.clone()], "").await,
            Err(RelayError::MissingField(_))
        ));
        assert!(matches!(
            transport
                .send_message(SendMessage {
                    sender: &key_doc,
                    recipient_did: "",
                    message_type: "https://didcomm.org/basicmessage/2.0/message",
                    payload: json!({}),
                    use_did_service_endpoint: false,
                })
                .await,
            Err(RelayError::MissingField(_))
        ));
        assert!(matches!(
            transport
                .get_messages(GetMessages {
                    key_docs: &[],
                    limit: None,
                    skip_resolution: false,
                })
                .await,
            Err(RelayError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn direct_delivery_needs_a_service() {
        let transport = transport("https://relay.example");
        let sender = KeyDocument::generate_did_key();
        let recipient = KeyDocument::generate_did_key();

        assert!(matches!(
            transport
                .send_message(SendMessage {
                    sender: &sender,
                    recipient_did: &recipient.controller,
                    message_type: "https://didcomm.org/basicmessage/2.0/message",
                    payload: json!({ "content": "hi" }),
                    use_did_service_endpoint: true,
                })
                .await,
            Err(RelayError::ServiceEndpointNotFound(did)) if did == recipient.controller
        ));
    }
}
