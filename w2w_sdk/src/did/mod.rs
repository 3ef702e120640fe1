use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    crypto::{AgreementPublicKey, ed25519_to_x25519_public},
    definitions::{KeyType, PublicKeyData},
};

mod error;
pub mod key;

pub use error::DidError;

pub(crate) const SCHEME: &str = "did";

/// Service types that accept encrypted messages directly
pub const MESSAGING_SERVICE_TYPES: [&str; 2] = ["DIDCommMessaging", "DIDComm"];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context", default)]
    pub context: Vec<String>,
    pub id: String,
    #[serde(default)]
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<String>,
    #[serde(default)]
    pub assertion_method: Vec<String>,
    #[serde(default)]
    pub key_agreement: Vec<String>,
    #[serde(default)]
    pub service: Vec<Service>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    pub controller: String,
    #[serde(rename = "type")]
    pub method_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_base58: Option<PublicKeyData>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub service_endpoint: ServiceEndpoint,
}

/// A service endpoint is either a bare URI or an object carrying one
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServiceEndpoint {
    Uri(String),
    Object {
        uri: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        accept: Vec<String>,
    },
}

impl ServiceEndpoint {
    pub fn uri(&self) -> &str {
        match self {
            ServiceEndpoint::Uri(uri) => uri,
            ServiceEndpoint::Object { uri, .. } => uri,
        }
    }
}

impl DidDocument {
    fn method(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method
            .iter()
            .find(|method| method.id == id)
    }

    /// The first key-agreement key, converting an Ed25519 method if needed
    pub fn agreement_key(&self) -> Option<AgreementPublicKey> {
        self.key_agreement.iter().find_map(|id| {
            let method = self.method(id)?;
            let public_key = method.public_key_base58.as_ref()?;

            let public_key = match method.method_type.parse().ok()? {
                KeyType::X25519KeyAgreementKey2019 => public_key.clone(),
                KeyType::Ed25519VerificationKey2018 | KeyType::Ed25519VerificationKey2020 => {
                    ed25519_to_x25519_public(public_key).ok()?
                }
            };

            Some(AgreementPublicKey {
                id: method.id.clone(),
                public_key,
            })
        })
    }

    /// The Ed25519 key used for assertions, falling back to authentication keys
    pub fn verification_key(&self) -> Option<&PublicKeyData> {
        self.assertion_method
            .iter()
            .chain(&self.authentication)
            .filter_map(|id| self.method(id))
            .find(|method| {
                method
                    .method_type
                    .parse::<KeyType>()
                    .is_ok_and(|key_type| key_type.is_signature_key())
            })
            .and_then(|method| method.public_key_base58.as_ref())
    }

    /// The endpoint of the messaging service, `DIDCommMessaging` preferred over `DIDComm`
    pub fn messaging_endpoint(&self) -> Option<Url> {
        MESSAGING_SERVICE_TYPES.iter().find_map(|service_type| {
            self.service
                .iter()
                .filter(|service| service.service_type == *service_type)
                .find_map(|service| Url::parse(service.service_endpoint.uri()).ok())
        })
    }
}

/// Resolves a DID to its DID document
#[async_trait]
pub trait DidResolver: Send + Sync {
    async fn resolve(&self, did: &str) -> Result<DidDocument, DidError>;
}

/// Offline resolver for `did:key` identifiers
#[derive(Clone, Copy, Debug, Default)]
pub struct KeyDidResolver;

#[async_trait]
impl DidResolver for KeyDidResolver {
    async fn resolve(&self, did: &str) -> Result<DidDocument, DidError> {
        let parts = did.split(':').collect::<Vec<&str>>();

        match parts.get(0..2) {
            Some([SCHEME, key::SCHEME]) => key::resolve_did_key(did),
            Some([SCHEME, _]) => Err(DidError::UnsupportedMethod(did.to_string())),
            _ => Err(DidError::InvalidDid(did.to_string())),
        }
    }
}
