//! Turns whatever arrived in a relay message into a plain JSON message
//!
//! A received value may be a link (possibly behind the `didcomm://` scheme or
//! carrying an out-of-band parameter), a JSON string, a base64 string, a
//! compact signed token or a ciphertext envelope, and these may be nested.
//! Detection runs in a fixed order and the first decoder that succeeds wins.

use base64ct::{Base64, Base64Unpadded, Base64Url, Base64UrlUnpadded, Encoding};
use serde_json::Value;
use url::Url;

use crate::{
    crypto::{CryptoError, Envelope, decrypt, derive_agreement_key},
    definitions::KeyDocument,
};

const DIDCOMM_SCHEME: &str = "didcomm://";
const OOB_PARAMETERS: [&str; 2] = ["_oob", "oob"];

/// How many nested encodings are unwrapped before giving up
pub const MAX_DEPTH: usize = 8;

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("fetching '{0}' failed: {1}")]
    Http(String, reqwest::Error),
    #[error("{0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Clone, Debug)]
pub struct MessageResolver {
    client: reqwest::Client,
}

impl MessageResolver {
    /// A resolver fetching links with the shared HTTP client
    pub fn new() -> Result<Self, ResolveError> {
        let client = crate::http_client::reqwest_client()
            .map_err(|e| ResolveError::Http(e.context.to_string(), e.source))?;

        Ok(Self::with_client(client.clone()))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        MessageResolver { client }
    }

    /// Resolve `raw` to an application message
    ///
    /// Returns `Ok(None)` when no decoder recognizes the value. Failing to fetch
    /// a link or to open an envelope addressed to us is an error.
    pub async fn resolve(
        &self,
        raw: &Value,
        key_docs: &[KeyDocument],
    ) -> Result<Option<Value>, ResolveError> {
        let mut current = raw.clone();

        for _ in 0..MAX_DEPTH {
            current = match current {
                Value::String(text) => match self.decode_text(&text).await? {
                    Some(decoded) => decoded,
                    None => {
                        tracing::debug!("could not decode received message, skipping");
                        return Ok(None);
                    }
                },
                Value::Object(_) if Envelope::is_envelope(&current) => {
                    open_envelope(current, key_docs)?
                }
                Value::Object(_) => return Ok(Some(normalize(current))),
                other => {
                    tracing::debug!("received message is a JSON {}, skipping", kind(&other));
                    return Ok(None);
                }
            };
        }

        tracing::debug!("received message is nested deeper than {MAX_DEPTH} levels, skipping");

        Ok(None)
    }

    /// Resolve a batch, one result per input
    ///
    /// Failures are logged and come back as `None`; they never affect the
    /// other messages.
    pub async fn resolve_all<'a, I>(&self, raw: I, key_docs: &[KeyDocument]) -> Vec<Option<Value>>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let resolutions = raw
            .into_iter()
            .map(|value| self.resolve(value, key_docs));

        futures::future::join_all(resolutions)
            .await
            .into_iter()
            .map(|resolution| {
                resolution
                    .inspect_err(|e| tracing::debug!("dropping message: {e}"))
                    .ok()
                    .flatten()
            })
            .collect()
    }

    async fn decode_text(&self, text: &str) -> Result<Option<Value>, ResolveError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let (text, is_link) = match text.strip_prefix(DIDCOMM_SCHEME) {
            Some(rest) => (rest, true),
            None => (text, http_url(text).is_some()),
        };

        if is_link {
            if let Some(oob) = oob_parameter(text) {
                return Ok(Some(Value::String(oob)));
            }

            if let Some(url) = http_url(text) {
                return self.fetch(url).await.map(Some);
            }
        }

        Ok(decode_json(text)
            .or_else(|| decode_base64(text))
            .or_else(|| decode_compact_token(text)))
    }

    async fn fetch(&self, url: Url) -> Result<Value, ResolveError> {
        tracing::debug!("fetching message from {url}");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ResolveError::Http(url.to_string(), e))?;

        let body = response
            .text()
            .await
            .map_err(|e| ResolveError::Http(url.to_string(), e))?;

        Ok(Value::String(body))
    }
}

fn open_envelope(value: Value, key_docs: &[KeyDocument]) -> Result<Value, ResolveError> {
    let envelope = Envelope::from_value(value)?;

    let key_doc = key_docs
        .iter()
        .find(|key_doc| {
            envelope
                .recipient_kids()
                .any(|kid| kid.contains(&key_doc.controller))
        })
        .ok_or_else(|| {
            CryptoError::RecipientKeyNotFound(envelope.recipient_kids().collect::<Vec<_>>().join(", "))
        })?;

    let agreement_key = derive_agreement_key(key_doc)?;
    tracing::trace!("opening envelope with {}", agreement_key.id);

    Ok(decrypt(&envelope, &agreement_key)?)
}

/// Older senders put the message content under `payload`
fn normalize(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        if !map.contains_key("body") {
            if let Some(payload) = map.get("payload").cloned() {
                map.insert("body".to_string(), payload);
            }
        }
    }

    value
}

fn http_url(text: &str) -> Option<Url> {
    Url::parse(text)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

fn oob_parameter(text: &str) -> Option<String> {
    let (_, query) = text.split_once('?')?;

    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| OOB_PARAMETERS.contains(&name.as_ref()))
        .map(|(_, value)| value.into_owned())
}

fn decode_json(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(|value| value.is_object() || value.is_string())
}

fn decode_base64(text: &str) -> Option<Value> {
    let bytes = Base64::decode_vec(text)
        .or_else(|_| Base64Unpadded::decode_vec(text))
        .or_else(|_| Base64Url::decode_vec(text))
        .or_else(|_| Base64UrlUnpadded::decode_vec(text))
        .ok()?;

    String::from_utf8(bytes).ok().map(Value::String)
}

/// The payload segment of a compact JWS
fn decode_compact_token(text: &str) -> Option<Value> {
    let mut segments = text.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let bytes = Base64UrlUnpadded::decode_vec(payload).ok()?;

    String::from_utf8(bytes).ok().map(Value::String)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
