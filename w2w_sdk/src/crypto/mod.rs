use crate::definitions::{ED25519_KEY_SIZE, KeyDocument, PrivateKeyData, PublicKeyData};
use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;

mod codec;
pub mod error;
mod key_agreement;

pub use codec::{
    ENCRYPTED_CONTENT_TYPE, EncryptParams, Envelope, ProtectedHeader, Recipient, RecipientHeader,
    decrypt, encrypt, encrypt_for_dids,
};
pub use error::CryptoError;
pub use key_agreement::{
    AgreementKeyPair, AgreementPublicKey, derive_agreement_key, ed25519_to_x25519_public,
};

/// Generate a new Ed25519 signing keypair
pub fn gen_sign_keypair() -> (PrivateKeyData, PublicKeyData) {
    let sigkey = ed25519_dalek::SigningKey::generate(&mut OsRng);

    (
        sigkey.to_bytes().to_vec().into(),
        sigkey.verifying_key().to_bytes().to_vec().into(),
    )
}

/// Sign `data` with the Ed25519 key held by `key_doc`
///
/// Key-agreement only documents cannot sign.
pub fn sign(key_doc: &KeyDocument, data: &[u8]) -> Result<[u8; 64], CryptoError> {
    if !key_doc.parsed_key_type()?.is_signature_key() {
        return Err(CryptoError::UnsupportedKeyType(key_doc.key_type.clone()));
    }

    let sign_key = key_agreement::ed25519_signing_key(key_doc)?;

    Ok(sign_key.sign(data).to_bytes())
}

/// Verify an Ed25519 `signature` over `data` made by `signer`
pub fn verify(
    signer: &str,
    public_key: &[u8],
    data: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    let public_key: [u8; ED25519_KEY_SIZE] = public_key
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(signer.to_string()))?;

    let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&public_key)
        .map_err(|err| CryptoError::Verify(signer.to_string(), err))?;
    let signature = ed25519_dalek::Signature::from_slice(signature)
        .map_err(|err| CryptoError::Verify(signer.to_string(), err))?;

    verifying_key
        .verify(data, &signature)
        .map_err(|err| CryptoError::Verify(signer.to_string(), err))
}
