//! store::kubo
//!
//! ContentStore implementation over the IPFS (Kubo) RPC API.
//!
//! # Endpoints
//!
//! All calls are `POST {api_url}/api/v0/<command>`:
//!
//! - `add` (multipart body, `pin`, `quieter`): the last NDJSON line carries
//!   the root hash
//! - `cat`, `pin/add`, `key/list`
//! - `name/resolve` (`nocache=true`), `name/publish` (`key`, `lifetime`, `ttl`)
//!
//! Tree uploads are streamed: the multipart body is produced on a blocking
//! thread and handed to the HTTP client through a small bounded channel, so
//! memory use does not depend on tree size.
//!
//! # Example
//!
//! ```ignore
//! use gh1000::store::{ContentStore, KuboStore};
//!
//! let store = KuboStore::new("http://127.0.0.1:5001");
//! let key = store.key_id("gh1000").await?;
//! let cid = store.resolve(&key).await?;
//! ```

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::SinkExt;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::traits::{duration_param, AddContent, ContentStore, NameRecord, StoreError};
use crate::core::types::Cid;
use crate::snapshot::multipart::{self, MultipartBody};

/// Chunks buffered between the body producer and the HTTP client.
const BODY_BUFFER: usize = 4;

/// Kubo error body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiErrorBody {
    message: String,
}

/// One NDJSON line of an `add` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddLine {
    hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyList {
    #[serde(default)]
    keys: Vec<KeyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyEntry {
    name: String,
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResolveResponse {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PublishResponse {
    name: String,
    value: String,
}

/// Kubo RPC client.
#[derive(Debug, Clone)]
pub struct KuboStore {
    client: Client,
    api_base: String,
}

impl KuboStore {
    /// Create a client for the daemon at `api_url` (e.g. `http://127.0.0.1:5001`).
    pub fn new(api_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_base: format!("{}/api/v0", api_url.trim_end_matches('/')),
        }
    }

    fn endpoint(&self, command: &str) -> String {
        format!("{}/{}", self.api_base, command)
    }

    /// POST a command without a body.
    async fn call(&self, command: &str, query: &[(&str, &str)]) -> Result<Response, StoreError> {
        debug!(command, "store rpc");
        let response = self
            .client
            .post(self.endpoint(command))
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await
    }

    /// POST a multipart body to `add` and return the root hash.
    async fn add_body(
        &self,
        body: reqwest::Body,
        boundary: &str,
        pin: bool,
    ) -> Result<Cid, StoreError> {
        let pin = if pin { "true" } else { "false" };
        let response = self
            .client
            .post(self.endpoint("add"))
            .query(&[("pin", pin), ("quieter", "true")])
            .header(reqwest::header::CONTENT_TYPE, multipart::content_type(boundary))
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let text = response.text().await.map_err(transport_error)?;
        parse_add_response(&text)
    }
}

#[async_trait]
impl ContentStore for KuboStore {
    fn name(&self) -> &'static str {
        "kubo"
    }

    #[instrument(skip(self, content))]
    async fn add(&self, content: AddContent, pin: bool) -> Result<Cid, StoreError> {
        let boundary = multipart::new_boundary();
        match content {
            AddContent::Bytes { name, data } => {
                let body = multipart::single_part(&boundary, &name, &data);
                self.add_body(body.into(), &boundary, pin).await
            }
            AddContent::Tree { root_name, walk } => {
                let body = MultipartBody::new(walk, root_name, boundary.clone());
                self.add_body(streaming_body(body), &boundary, pin).await
            }
        }
    }

    async fn cat(&self, cid: &Cid) -> Result<Bytes, StoreError> {
        let response = self
            .call("cat", &[("arg", cid.as_str())])
            .await
            .map_err(|e| not_found_as(e, || StoreError::NotFound(cid.to_string())))?;
        response.bytes().await.map_err(transport_error)
    }

    async fn pin(&self, cid: &Cid) -> Result<(), StoreError> {
        self.call("pin/add", &[("arg", cid.as_str())]).await?;
        Ok(())
    }

    async fn key_id(&self, key_name: &str) -> Result<String, StoreError> {
        let response = self.call("key/list", &[]).await?;
        let list: KeyList = parse_json(response).await?;
        list.keys
            .into_iter()
            .find(|k| k.name == key_name)
            .map(|k| k.id)
            .ok_or_else(|| StoreError::KeyNotFound(key_name.to_string()))
    }

    async fn resolve(&self, name: &str) -> Result<Cid, StoreError> {
        let response = self
            .call("name/resolve", &[("arg", name), ("nocache", "true")])
            .await
            .map_err(|e| not_found_as(e, || StoreError::NameNotFound(name.to_string())))?;
        let resolved: ResolveResponse = parse_json(response).await?;
        Cid::new(resolved.path).map_err(|e| StoreError::Malformed(e.to_string()))
    }

    async fn publish(
        &self,
        cid: &Cid,
        key_name: &str,
        lifetime: Duration,
        ttl: Duration,
    ) -> Result<NameRecord, StoreError> {
        let path = cid.ipfs_path();
        let lifetime = duration_param(lifetime);
        let ttl = duration_param(ttl);
        let response = self
            .call(
                "name/publish",
                &[
                    ("arg", path.as_str()),
                    ("key", key_name),
                    ("lifetime", lifetime.as_str()),
                    ("ttl", ttl.as_str()),
                ],
            )
            .await
            .map_err(|e| match e {
                StoreError::Api { ref message, .. } if message.contains("no key") => {
                    StoreError::KeyNotFound(key_name.to_string())
                }
                other => other,
            })?;
        let published: PublishResponse = parse_json(response).await?;
        Ok(NameRecord {
            name: published.name,
            value: Cid::new(published.value).map_err(|e| StoreError::Malformed(e.to_string()))?,
        })
    }
}

/// Feed a multipart body to the HTTP client from a blocking thread.
fn streaming_body(body: MultipartBody) -> reqwest::Body {
    let (mut tx, rx) = mpsc::channel::<io::Result<Bytes>>(BODY_BUFFER);
    tokio::task::spawn_blocking(move || {
        for chunk in body {
            let failed = chunk.is_err();
            if futures::executor::block_on(tx.send(chunk)).is_err() || failed {
                break;
            }
        }
    });
    reqwest::Body::wrap_stream(rx)
}

fn transport_error(err: reqwest::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Turn a non-success response into a [`StoreError::Api`].
async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Map "not found"-style API errors to a more specific error.
fn not_found_as(err: StoreError, specific: impl FnOnce() -> StoreError) -> StoreError {
    match &err {
        StoreError::Api { message, .. } => {
            let lower = message.to_ascii_lowercase();
            if lower.contains("could not resolve") || lower.contains("not found") {
                specific()
            } else {
                err
            }
        }
        _ => err,
    }
}

async fn parse_json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, StoreError> {
    let text = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&text).map_err(|e| StoreError::Malformed(e.to_string()))
}

/// Extract the root hash from an `add` NDJSON response (the last line that
/// carries one).
fn parse_add_response(text: &str) -> Result<Cid, StoreError> {
    let mut last = None;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let parsed: AddLine =
            serde_json::from_str(line).map_err(|e| StoreError::Malformed(e.to_string()))?;
        if parsed.hash.is_some() {
            last = parsed.hash;
        }
    }
    let hash = last.ok_or_else(|| StoreError::Malformed("add returned no hash".to_string()))?;
    Cid::new(hash).map_err(|e| StoreError::Malformed(e.to_string()))
}
