/// Error originating from the w2w library
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),
    #[error("Error: {0}")]
    Did(#[from] crate::did::DidError),
    #[error("Error: {0}")]
    Auth(#[from] crate::auth::AuthError),
    #[error("Error: {0}")]
    Relay(#[from] crate::transport::RelayError),
    #[error("Error: {0}")]
    Resolve(#[from] crate::resolver::ResolveError),
    #[error("Error: {0}")]
    Protocol(#[from] crate::protocol::ProtocolError),
    #[error("Error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("Error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Internal error")]
    Internal,
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::Internal
    }
}
