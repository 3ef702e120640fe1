#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("unsupported key type '{0}'")]
    UnsupportedKeyType(String),
    #[error("invalid key material in '{0}'")]
    InvalidKey(String),
    #[error("encryption or decryption failed")]
    CryptographicNacl(#[from] crypto_box::aead::Error),
    #[error("no recipient entry matches key '{0}'")]
    RecipientKeyNotFound(String),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),
    #[error("invalid base64 in envelope field '{0}'")]
    Base64(&'static str),
    #[error("(de)serializing message failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("could not verify signature of '{0}': {1}")]
    Verify(String, ed25519_dalek::SignatureError),
    #[error("no recipients given")]
    MissingRecipients,
    #[error("resolving recipient key failed: {0}")]
    Did(#[from] crate::did::DidError),
}
