use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::blocking::Client;

use super::{RemoteStorage, StoreError};

/// Remote tier backed by the managed backend's object storage API.
///
/// Error classification happens here, at the point the transport call fails:
/// connect/timeout errors become [`StoreError::Offline`], HTTP 404 becomes
/// [`StoreError::NotFound`], and a duplicate-object response to a
/// non-overwriting upload becomes [`StoreError::AlreadyExists`].
pub struct HttpRemoteStorage {
    http: Client,
    base_url: String,
    bucket: String,
    token: String,
}

impl HttpRemoteStorage {
    pub fn new(
        base_url: &str,
        bucket: &str,
        token: &str,
        request_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            token: token.to_string(),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }

    fn classify_transport(err: reqwest::Error) -> anyhow::Error {
        if err.is_connect() || err.is_timeout() {
            StoreError::Offline(err.to_string()).into()
        } else {
            err.into()
        }
    }
}

impl RemoteStorage for HttpRemoteStorage {
    fn upload_file(
        &self,
        path: &str,
        bytes: &[u8],
        media_type: &str,
        overwrite: bool,
    ) -> Result<()> {
        let resp = self
            .http
            .post(self.object_url(path))
            .bearer_auth(&self.token)
            .header("content-type", media_type)
            .header("x-upsert", if overwrite { "true" } else { "false" })
            .body(bytes.to_vec())
            .send()
            .map_err(Self::classify_transport)?;

        let status = resp.status();
        if status.as_u16() == 409 {
            return Err(StoreError::AlreadyExists(path.to_string()).into());
        }
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(anyhow!("storage upload failed: HTTP {status} {text}"));
        }
        Ok(())
    }

    fn download_file(&self, path: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(self.object_url(path))
            .bearer_auth(&self.token)
            .send()
            .map_err(Self::classify_transport)?;

        let status = resp.status();
        if status.as_u16() == 404 {
            return Err(StoreError::NotFound(path.to_string()).into());
        }
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(anyhow!("storage download failed: HTTP {status} {text}"));
        }

        Ok(resp.bytes().map_err(Self::classify_transport)?.to_vec())
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }
}
