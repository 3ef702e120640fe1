use crate::{auth::AuthError, crypto::CryptoError, did::DidError};

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("request to '{0}' failed: {1}")]
    Http(String, reqwest::Error),
    #[error("'{url}' responded with {status}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("relay URL '{0}' cannot carry endpoint paths")]
    InvalidServiceUrl(String),
    #[error("invalid configuration {0}: {1}")]
    Config(&'static str, String),
    #[error("DID document of '{0}' has no messaging service endpoint")]
    ServiceEndpointNotFound(String),
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("a message must be addressed to exactly one DID, found {0}")]
    RecipientCount(usize),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Crypto(#[from] CryptoError),
    #[error("{0}")]
    Did(#[from] DidError),
    #[error("(de)serializing relay message failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("internal error")]
    Internal,
}
