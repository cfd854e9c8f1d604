//! Client for the `bw serve` REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

use super::{VaultItem, VaultManager};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `{ success, message, data }` wrapper around every response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    template: StatusTemplate,
}

#[derive(Debug, Deserialize)]
struct StatusTemplate {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ListData<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StringData {
    data: String,
}

#[derive(Debug, Deserialize)]
struct ItemDetail {
    #[serde(default)]
    login: Option<LoginSecrets>,
}

#[derive(Debug, Deserialize)]
struct LoginSecrets {
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UnlockData {
    raw: String,
}

/// Vault backed by a running `bw serve`.
#[derive(Debug, Clone)]
pub struct ApiVault {
    base_url: Url,
    client: Client,
}

impl ApiVault {
    /// Client for the server at `base_url`, e.g. `http://127.0.0.1:8087`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Vault`] for an unparsable URL.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::Vault(format!("invalid backend URL '{base_url}': {e}")))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Vault(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { base_url, client })
    }

    /// Server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Vault(format!("backend URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str], what: &str) -> Result<T> {
        let url = self.endpoint(segments)?;
        tracing::debug!(path = url.path(), "GET");
        let response = self.client.get(url).send().await.map_err(|e| request_failed(what, &e))?;
        read_envelope(response, what).await
    }

    async fn get_item(&self, id: &str) -> Result<ItemDetail> {
        self.get(&["object", "item", id], "get item").await
    }
}

#[async_trait]
impl VaultManager for ApiVault {
    async fn is_logged_in(&self) -> Result<bool> {
        let status: StatusData = self.get(&["status"], "status check").await?;
        tracing::debug!(status = %status.template.status, "Vault status");
        Ok(status.template.status == "unlocked")
    }

    async fn get_items(&self) -> Result<Vec<VaultItem>> {
        let list: ListData<VaultItem> = self.get(&["list", "object", "items"], "get items").await?;
        tracing::debug!(count = list.data.len(), "Fetched vault items");
        Ok(list.data)
    }

    async fn get_password(&self, id: &str) -> Result<Zeroizing<String>> {
        self.get_item(id)
            .await?
            .login
            .and_then(|login| login.password)
            .map(Zeroizing::new)
            .ok_or_else(|| Error::FieldNotFound {
                field: "password",
                id: id.to_string(),
            })
    }

    async fn get_totp(&self, id: &str) -> Result<Zeroizing<String>> {
        let code: StringData = self.get(&["object", "totp", id], "get totp").await?;
        Ok(Zeroizing::new(code.data))
    }

    async fn unlock(&self, password: &str) -> Result<Zeroizing<String>> {
        let url = self.endpoint(&["unlock"])?;
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(|e| request_failed("unlock", &e))?;
        let unlocked: UnlockData = read_envelope(response, "unlock").await?;
        tracing::info!("Vault unlocked");
        Ok(Zeroizing::new(unlocked.raw))
    }
}

fn request_failed(what: &str, e: &reqwest::Error) -> Error {
    Error::Vault(format!("{what} request failed: {e}"))
}

async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::Vault(format!("{what}: failed to read response body: {e}")))?;
    tracing::debug!(%status, bytes = body.len(), "{} response", what);

    let parsed = parse_envelope(&body, what);
    let is_json = serde_json::from_slice::<serde::de::IgnoredAny>(&body).is_ok();
    if parsed.is_err() && !is_json && !status.is_success() {
        return Err(Error::Vault(format!("{what} failed: {status}")));
    }
    parsed
}

fn parse_envelope<T: DeserializeOwned>(body: &[u8], what: &str) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_slice(body)
        .map_err(|e| Error::Vault(format!("{what}: malformed response: {e}")))?;

    if !envelope.success {
        let message = envelope.message.unwrap_or_else(|| "no message".to_string());
        return Err(Error::Vault(format!("{what} failed: {message}")));
    }
    envelope
        .data
        .ok_or_else(|| Error::Vault(format!("{what}: response has no data")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Serves one canned JSON body per connection, regardless of the request.
    async fn canned_server(status: &'static str, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        url
    }

    #[test]
    fn test_status_envelope() {
        let body = br#"{"success":true,"data":{"object":"template","template":{"status":"locked"}}}"#;
        let status: StatusData = parse_envelope(body, "status").unwrap();
        assert_eq!(status.template.status, "locked");
    }

    #[test]
    fn test_failed_envelope_carries_message() {
        let body = br#"{"success":false,"message":"Invalid master password."}"#;
        let err = parse_envelope::<UnlockData>(body, "unlock").unwrap_err();
        assert!(err.to_string().contains("Invalid master password."));
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(parse_envelope::<StringData>(b"<html>", "get totp").is_err());
        assert!(parse_envelope::<StringData>(br#"{"success":true}"#, "get totp").is_err());
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let vault = ApiVault::new("http://127.0.0.1:8087/").unwrap();
        let url = vault.endpoint(&["object", "item", "../status"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8087/object/item/..%2Fstatus");
    }

    #[tokio::test]
    async fn test_get_items_over_http() {
        let url = canned_server(
            "200 OK",
            r#"{"success":true,"data":{"object":"list","data":[{"id":"a1","name":"GitHub","login":{"username":"octo"}}]}}"#,
        )
        .await;
        let vault = ApiVault::new(&url).unwrap();

        let items = vault.get_items().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "GitHub");
        assert_eq!(vault.get_username("a1").await.unwrap(), "octo");
        assert!(matches!(
            vault.get_username("zz").await,
            Err(Error::FieldNotFound { field: "username", .. })
        ));
    }

    #[tokio::test]
    async fn test_password_from_item() {
        let url = canned_server(
            "200 OK",
            r#"{"success":true,"data":{"object":"item","id":"a1","name":"GitHub","login":{"username":"octo","password":"p@ss"}}}"#,
        )
        .await;
        let vault = ApiVault::new(&url).unwrap();

        assert_eq!(vault.get_password("a1").await.unwrap().as_str(), "p@ss");
    }

    #[tokio::test]
    async fn test_http_error_without_envelope() {
        let url = canned_server("500 Internal Server Error", "oops").await;
        let vault = ApiVault::new(&url).unwrap();

        let err = vault.is_logged_in().await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
