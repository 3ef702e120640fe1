use base64ct::{Base64UrlUnpadded, Encoding};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{AeadInPlace, KeyInit},
};
use crypto_box::{ChaChaBox, PublicKey, SecretKey, aead::Aead};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroizing;

use super::{AgreementKeyPair, AgreementPublicKey, CryptoError};
use crate::{
    definitions::DidCommMessage,
    did::{DidError, DidResolver},
};

/// Media type of a ciphertext envelope
pub const ENCRYPTED_CONTENT_TYPE: &str = "application/didcomm-encrypted+json";

const KEY_WRAP_ALGORITHM: &str = "ECDH-1PU+XC20PKW";
const CONTENT_ALGORITHM: &str = "XC20P";

const CEK_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;

type BoxNonce = crypto_box::aead::Nonce<ChaChaBox>;

/// JSON serialized ciphertext envelope with one key entry per recipient
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub protected: String,
    pub recipients: Vec<Recipient>,
    pub iv: String,
    pub ciphertext: String,
    pub tag: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub header: RecipientHeader,
    pub encrypted_key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientHeader {
    pub kid: String,
    pub nonce: String,
}

/// Header authenticated as associated data of the content encryption
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub typ: String,
    pub alg: String,
    pub enc: String,
    pub skid: String,
    pub spk: String,
}

impl Envelope {
    /// Whether `value` has the shape of a ciphertext envelope
    pub fn is_envelope(value: &Value) -> bool {
        value.get("recipients").is_some_and(Value::is_array)
    }

    pub fn from_value(value: Value) -> Result<Envelope, CryptoError> {
        Ok(serde_json::from_value(value)?)
    }

    /// The key ids of all recipients
    pub fn recipient_kids(&self) -> impl Iterator<Item = &str> {
        self.recipients
            .iter()
            .map(|recipient| recipient.header.kid.as_str())
    }

    pub fn protected_header(&self) -> Result<ProtectedHeader, CryptoError> {
        let bytes = decode_field("protected", &self.protected)?;

        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Inputs of [encrypt_for_dids]
pub struct EncryptParams<'a> {
    pub sender: &'a AgreementKeyPair,
    pub recipient_dids: &'a [String],
    pub message: &'a DidCommMessage,
}

/// Encrypt `message` for every one of `recipients`, authenticated as `sender`
pub fn encrypt(
    sender: &AgreementKeyPair,
    recipients: &[AgreementPublicKey],
    message: &DidCommMessage,
) -> Result<Envelope, CryptoError> {
    if recipients.is_empty() {
        return Err(CryptoError::MissingRecipients);
    }

    let protected = ProtectedHeader {
        typ: ENCRYPTED_CONTENT_TYPE.to_string(),
        alg: KEY_WRAP_ALGORITHM.to_string(),
        enc: CONTENT_ALGORITHM.to_string(),
        skid: sender.id.clone(),
        spk: Base64UrlUnpadded::encode_string(&sender.public_key),
    };
    let protected = Base64UrlUnpadded::encode_string(&serde_json::to_vec(&protected)?);

    let mut cek = Zeroizing::new([0u8; CEK_SIZE]);
    OsRng.fill_bytes(cek.as_mut_slice());
    let mut iv = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut iv);

    let mut content = serde_json::to_vec(message)?;
    let cipher = XChaCha20Poly1305::new(&chacha20poly1305::Key::from(*cek));
    let tag = cipher.encrypt_in_place_detached(
        &XNonce::from(iv),
        protected.as_bytes(),
        &mut content,
    )?;

    let sender_secret = secret_key(&sender.private_key)?;
    let recipients = recipients
        .iter()
        .map(|recipient| {
            let recipient_public = public_key(&recipient.public_key)?;
            let sender_box = ChaChaBox::new(&recipient_public, &sender_secret);

            let mut nonce = [0u8; NONCE_SIZE];
            OsRng.fill_bytes(&mut nonce);
            let encrypted_key =
                sender_box.encrypt(&BoxNonce::from(nonce), cek.as_slice())?;

            Ok(Recipient {
                header: RecipientHeader {
                    kid: recipient.id.clone(),
                    nonce: Base64UrlUnpadded::encode_string(&nonce),
                },
                encrypted_key: Base64UrlUnpadded::encode_string(&encrypted_key),
            })
        })
        .collect::<Result<Vec<_>, CryptoError>>()?;

    tracing::trace!(
        "encrypted {} for {} recipient(s)",
        message.message_type,
        recipients.len()
    );

    Ok(Envelope {
        protected,
        recipients,
        iv: Base64UrlUnpadded::encode_string(&iv),
        ciphertext: Base64UrlUnpadded::encode_string(&content),
        tag: Base64UrlUnpadded::encode_string(tag.as_slice()),
    })
}

/// Resolve the key-agreement keys of all recipient DIDs and encrypt for them
pub async fn encrypt_for_dids(
    resolver: &dyn DidResolver,
    params: EncryptParams<'_>,
) -> Result<Envelope, CryptoError> {
    let mut recipients = Vec::with_capacity(params.recipient_dids.len());

    for did in params.recipient_dids {
        let document = resolver.resolve(did).await?;
        let key = document
            .agreement_key()
            .ok_or_else(|| DidError::MissingKeyAgreement(did.clone()))?;

        recipients.push(key);
    }

    encrypt(params.sender, &recipients, params.message)
}

/// Open the envelope entry addressed to `receiver` and return the plaintext message
pub fn decrypt(envelope: &Envelope, receiver: &AgreementKeyPair) -> Result<Value, CryptoError> {
    let recipient = envelope
        .recipients
        .iter()
        .find(|recipient| recipient.header.kid.contains(&receiver.controller))
        .ok_or_else(|| CryptoError::RecipientKeyNotFound(receiver.controller.clone()))?;

    let protected = envelope.protected_header()?;
    if protected.enc != CONTENT_ALGORITHM {
        return Err(CryptoError::MalformedEnvelope("unsupported content encryption"));
    }

    let sender_public = public_key(&decode_field("spk", &protected.spk)?)?;
    let receiver_secret = secret_key(&receiver.private_key)?;
    let receiver_box = ChaChaBox::new(&sender_public, &receiver_secret);

    let key_nonce: [u8; NONCE_SIZE] = decode_array("nonce", &recipient.header.nonce)?;
    let cek = Zeroizing::new(receiver_box.decrypt(
        &BoxNonce::from(key_nonce),
        decode_field("encrypted_key", &recipient.encrypted_key)?.as_slice(),
    )?);
    let cek: [u8; CEK_SIZE] = cek
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::MalformedEnvelope("content key has the wrong size"))?;
    let cek = Zeroizing::new(cek);

    let iv: [u8; NONCE_SIZE] = decode_array("iv", &envelope.iv)?;
    let tag: [u8; TAG_SIZE] = decode_array("tag", &envelope.tag)?;
    let mut content = decode_field("ciphertext", &envelope.ciphertext)?;

    let cipher = XChaCha20Poly1305::new(&chacha20poly1305::Key::from(*cek));
    cipher.decrypt_in_place_detached(
        &XNonce::from(iv),
        envelope.protected.as_bytes(),
        &mut content,
        &chacha20poly1305::Tag::from(tag),
    )?;

    Ok(serde_json::from_slice(&content)?)
}

fn secret_key(bytes: &[u8]) -> Result<SecretKey, CryptoError> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("agreement key".to_string()))?;

    Ok(SecretKey::from(bytes))
}

fn public_key(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("agreement public key".to_string()))?;

    Ok(PublicKey::from(bytes))
}

fn decode_field(field: &'static str, encoded: &str) -> Result<Vec<u8>, CryptoError> {
    Base64UrlUnpadded::decode_vec(encoded).map_err(|_| CryptoError::Base64(field))
}

fn decode_array<const N: usize>(field: &'static str, encoded: &str) -> Result<[u8; N], CryptoError> {
    decode_field(field, encoded)?
        .try_into()
        .map_err(|_| CryptoError::MalformedEnvelope(field))
}
