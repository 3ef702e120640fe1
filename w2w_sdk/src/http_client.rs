use once_cell::sync::OnceCell;
use std::time::Duration;

pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub(crate) struct ReqwestClientError {
    pub(crate) context: &'static str,
    pub(crate) source: reqwest::Error,
}

/// Process wide client for plain fetches (out-of-band links, message URLs)
pub(crate) fn reqwest_client() -> Result<&'static reqwest::Client, ReqwestClientError> {
    static CLIENT: OnceCell<reqwest::Client> = OnceCell::new();

    CLIENT.get_or_try_init(|| build_client(DEFAULT_TIMEOUT))
}

/// A client with its own request timeout, used by relay transports
pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ReqwestClientError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ReqwestClientError {
            context: "Client build error",
            source: e,
        })
}
