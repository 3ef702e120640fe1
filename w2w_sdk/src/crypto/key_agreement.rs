use crate::{
    crypto::CryptoError,
    definitions::{
        ED25519_KEY_SIZE, KeyDocument, KeyType, PrivateKeyData, PublicKeyData, X25519_KEY_SIZE,
    },
};

/// A key-agreement keypair derived from a wallet key document
///
/// Never persisted; recomputed from the key document when needed.
#[derive(Clone, Debug)]
pub struct AgreementKeyPair {
    /// Fragment-qualified key id, `did#fingerprint`
    pub id: String,
    /// The DID controlling this key
    pub controller: String,
    pub public_key: PublicKeyData,
    pub private_key: PrivateKeyData,
}

/// The public half of some party's key-agreement key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgreementPublicKey {
    pub id: String,
    pub public_key: PublicKeyData,
}

impl AgreementKeyPair {
    pub fn public(&self) -> AgreementPublicKey {
        AgreementPublicKey {
            id: self.id.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

/// Derive the key-agreement keypair for `key_doc`
///
/// Ed25519 signing keys are converted to their X25519 counterparts,
/// X25519 key documents are used as they are.
pub fn derive_agreement_key(key_doc: &KeyDocument) -> Result<AgreementKeyPair, CryptoError> {
    let secret = match key_doc.parsed_key_type()? {
        KeyType::Ed25519VerificationKey2018 | KeyType::Ed25519VerificationKey2020 => {
            let signing_key = ed25519_signing_key(key_doc)?;

            crypto_box::SecretKey::from(signing_key.to_scalar_bytes())
        }
        KeyType::X25519KeyAgreementKey2019 => {
            let bytes: [u8; X25519_KEY_SIZE] = key_doc
                .private_key_base58
                .get(..X25519_KEY_SIZE)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(|| CryptoError::InvalidKey(key_doc.id.clone()))?;

            crypto_box::SecretKey::from(bytes)
        }
    };

    let public_key = secret.public_key().to_bytes().to_vec();
    let fingerprint = crate::did::key::x25519_fingerprint(&public_key);

    Ok(AgreementKeyPair {
        id: format!("{}#{fingerprint}", key_doc.controller),
        controller: key_doc.controller.clone(),
        public_key: public_key.into(),
        private_key: secret.to_bytes().to_vec().into(),
    })
}

/// Convert an Ed25519 verification key to its X25519 form
pub fn ed25519_to_x25519_public(public_key: &[u8]) -> Result<PublicKeyData, CryptoError> {
    let bytes: [u8; ED25519_KEY_SIZE] = public_key
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("ed25519 public key".to_string()))?;

    let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
        .map_err(|_| CryptoError::InvalidKey("ed25519 public key".to_string()))?;

    Ok(verifying_key.to_montgomery().to_bytes().to_vec().into())
}

/// The Ed25519 signing key held by `key_doc`
///
/// Accepts both the 32 byte seed and the 64 byte `seed || public key` encoding.
pub(crate) fn ed25519_signing_key(
    key_doc: &KeyDocument,
) -> Result<ed25519_dalek::SigningKey, CryptoError> {
    let private_key = key_doc.private_key_base58.as_slice();

    let seed: [u8; ED25519_KEY_SIZE] = match private_key.len() {
        32 | 64 => private_key[..ED25519_KEY_SIZE]
            .try_into()
            .map_err(|_| CryptoError::InvalidKey(key_doc.id.clone()))?,
        _ => return Err(CryptoError::InvalidKey(key_doc.id.clone())),
    };

    Ok(ed25519_dalek::SigningKey::from_bytes(&seed))
}
