use core::fmt;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_json::Value;
use std::{fmt::Debug, ops::Deref, str::FromStr};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const ED25519_KEY_SIZE: usize = 32;
pub const X25519_KEY_SIZE: usize = 32;

/// The document type under which proof request templates are persisted
pub const PROOF_REQUEST_TEMPLATE_TYPE: &str = "ProofRequestTemplate";

#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKeyData(Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyData(Vec<u8>);

/// Signature and key-agreement key types a key document may carry
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KeyType {
    Ed25519VerificationKey2018,
    Ed25519VerificationKey2020,
    X25519KeyAgreementKey2019,
}

impl KeyType {
    pub const ALL: [KeyType; 3] = [
        KeyType::Ed25519VerificationKey2018,
        KeyType::Ed25519VerificationKey2020,
        KeyType::X25519KeyAgreementKey2019,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Ed25519VerificationKey2018 => "Ed25519VerificationKey2018",
            KeyType::Ed25519VerificationKey2020 => "Ed25519VerificationKey2020",
            KeyType::X25519KeyAgreementKey2019 => "X25519KeyAgreementKey2019",
        }
    }

    pub fn is_signature_key(&self) -> bool {
        !matches!(self, KeyType::X25519KeyAgreementKey2019)
    }
}

impl FromStr for KeyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyType::ALL
            .into_iter()
            .find(|key_type| key_type.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A keypair document as held by a wallet; exactly one per local DID
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDocument {
    pub id: String,
    pub controller: String,
    #[serde(rename = "type")]
    pub key_type: String,
    pub public_key_base58: PublicKeyData,
    pub private_key_base58: PrivateKeyData,
}

impl KeyDocument {
    /// The parsed key type, failing for types this crate cannot use
    pub fn parsed_key_type(&self) -> Result<KeyType, crate::crypto::CryptoError> {
        self.key_type
            .parse()
            .map_err(crate::crypto::CryptoError::UnsupportedKeyType)
    }

    /// Generate a fresh Ed25519 key controlled by a new `did:key` identifier
    pub fn generate_did_key() -> Self {
        let (private_key, public_key) = crate::crypto::gen_sign_keypair();
        let fingerprint = crate::did::key::ed25519_fingerprint(&public_key);

        KeyDocument {
            id: format!("did:key:{fingerprint}#{fingerprint}"),
            controller: format!("did:key:{fingerprint}"),
            key_type: KeyType::Ed25519VerificationKey2018.as_str().to_string(),
            public_key_base58: public_key,
            private_key_base58: private_key,
        }
    }

    /// Store representation of this key document
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// The application level message kinds of the verification handshake
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    Invitation,
    RequestPresentation,
    Presentation,
    Ack,
}

impl MessageType {
    pub const ALL: [MessageType; 4] = [
        MessageType::Invitation,
        MessageType::RequestPresentation,
        MessageType::Presentation,
        MessageType::Ack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Invitation => "https://didcomm.org/out-of-band/2.0/invitation",
            MessageType::RequestPresentation => {
                "https://didcomm.org/present-proof/3.0/request-presentation"
            }
            MessageType::Presentation => "https://didcomm.org/present-proof/3.0/presentation",
            MessageType::Ack => "https://didcomm.org/present-proof/3.0/ack",
        }
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|message_type| message_type.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Invitation => write!(f, "Invitation"),
            MessageType::RequestPresentation => write!(f, "RequestPresentation"),
            MessageType::Presentation => write!(f, "Presentation"),
            MessageType::Ack => write!(f, "Ack"),
        }
    }
}

/// Discriminates the two handshake steps that share the `Ack` wire type
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoalCode {
    #[serde(rename = "wallet-to-wallet-verification")]
    WalletToWalletVerification,
    #[serde(rename = "PresentationAckFromVerifier")]
    PresentationAckFromVerifier,
}

/// A decrypted application message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DidCommMessage {
    #[serde(default = "new_message_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    #[serde(default)]
    pub body: Value,
}

impl DidCommMessage {
    pub fn new(message_type: MessageType, from: &str, to: &str, body: Value) -> Self {
        DidCommMessage {
            id: new_message_id(),
            message_type: message_type.as_str().to_string(),
            from: Some(from.to_string()),
            to: vec![to.to_string()],
            body,
        }
    }

    /// The handshake message kind, `None` for messages of other protocols
    pub fn kind(&self) -> Option<MessageType> {
        self.message_type.parse().ok()
    }
}

/// Fields carried in the bodies of handshake messages
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationBody {
    #[serde(rename = "goal_code", default, skip_serializing_if = "Option::is_none")]
    pub goal_code: Option<GoalCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_request: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_result: Option<Value>,
}

/// A stored, reusable definition of what a verifier wants proven
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProofRequestTemplate {
    pub id: String,
    #[serde(rename = "type")]
    pub document_type: String,
    pub template: Value,
}

impl ProofRequestTemplate {
    pub fn new(id: impl Into<String>, template: Value) -> Self {
        ProofRequestTemplate {
            id: id.into(),
            document_type: PROOF_REQUEST_TEMPLATE_TYPE.to_string(),
            template,
        }
    }
}

pub(crate) fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null,
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(did) => vec![did],
        OneOrMany::Many(dids) => dids,
        OneOrMany::Null => vec![],
    })
}

impl Debug for PrivateKeyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKeyData([redacted])")
    }
}

impl AsRef<[u8]> for PrivateKeyData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for PublicKeyData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for PrivateKeyData {
    fn from(data: Vec<u8>) -> PrivateKeyData {
        PrivateKeyData(data)
    }
}

impl From<Vec<u8>> for PublicKeyData {
    fn from(data: Vec<u8>) -> PublicKeyData {
        PublicKeyData(data)
    }
}

impl Deref for PublicKeyData {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deref for PrivateKeyData {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// key material travels as base58btc strings in key documents

impl Serialize for PublicKeyData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&bs58::encode(&self.0).into_string())
    }
}

impl<'de> Deserialize<'de> for PublicKeyData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        bs58::decode(encoded)
            .into_vec()
            .map(PublicKeyData)
            .map_err(D::Error::custom)
    }
}

impl Serialize for PrivateKeyData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&bs58::encode(&self.0).into_string())
    }
}

impl<'de> Deserialize<'de> for PrivateKeyData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut encoded = String::deserialize(deserializer)?;
        let decoded = bs58::decode(&encoded).into_vec();
        encoded.zeroize();

        decoded.map(PrivateKeyData).map_err(D::Error::custom)
    }
}
