use reqwest::{Response, header::CONTENT_TYPE};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use super::RelayError;

pub(crate) async fn post_json<T: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: Url,
    body: &T,
    content_type: &str,
) -> Result<Value, RelayError> {
    let body = serde_json::to_vec(body)?;

    let response = client
        .post(url.clone())
        .header(CONTENT_TYPE, content_type)
        .body(body)
        .send()
        .await
        .map_err(|e| RelayError::Http(redacted(&url), e.without_url()))?;

    let text = checked(&url, response)
        .await?
        .text()
        .await
        .map_err(|e| RelayError::Http(redacted(&url), e.without_url()))?;

    // relays answer with JSON, plain text or nothing at all
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: Url,
) -> Result<T, RelayError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| RelayError::Http(redacted(&url), e.without_url()))?;

    let bytes = checked(&url, response)
        .await?
        .bytes()
        .await
        .map_err(|e| RelayError::Http(redacted(&url), e.without_url()))?;

    Ok(serde_json::from_slice(&bytes)?)
}

async fn checked(url: &Url, response: Response) -> Result<Response, RelayError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    Err(RelayError::Status {
        url: redacted(url),
        status,
        body,
    })
}

/// The URL without its query, which may carry authorization payloads
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);

    url.to_string()
}
