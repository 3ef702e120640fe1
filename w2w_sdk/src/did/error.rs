#[derive(thiserror::Error, Debug)]
pub enum DidError {
    #[error("invalid DID '{0}'")]
    InvalidDid(String),
    #[error("DID method of '{0}' is not supported")]
    UnsupportedMethod(String),
    #[error("could not resolve DID '{0}': {1}")]
    ResolveDid(String, &'static str),
    #[error("DID document of '{0}' has no key agreement method")]
    MissingKeyAgreement(String),
    #[error("DID document of '{0}' has no usable verification key")]
    MissingVerificationKey(String),
}
