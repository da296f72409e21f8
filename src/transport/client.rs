use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{FileInfo, Item, Transport};
use crate::error::FetchError;
use crate::volume::ImagePayload;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Header carrying the session token.
const TOKEN_HEADER: &str = "girder-token";

/// HTTP implementation of [`Transport`] for a Girder server running the
/// segmentation plugin.
///
/// All paths are resolved relative to the API root, e.g.
/// `https://example.org/api/v1/`.
#[derive(Clone)]
pub struct GirderClient {
    client: Client,
    api_root: Url,
}

/// Item document; only the segmentation listing is of interest.
#[derive(Debug, Deserialize)]
struct ItemDocument {
    #[serde(default)]
    segmentation: Option<SegmentationMeta>,
}

#[derive(Debug, Deserialize)]
struct SegmentationMeta {
    #[serde(default)]
    images: Vec<Item>,
}

impl GirderClient {
    /// Create a client for the given API root.
    ///
    /// # Arguments
    /// * `api_url` - Base URL of the REST API
    /// * `token` - Optional session token sent with every request
    /// * `timeout` - Per-request timeout
    pub fn new(api_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, FetchError> {
        let api_root = normalize_root(api_url)?;

        let mut headers = header::HeaderMap::new();
        if let Some(token) = token {
            let value = header::HeaderValue::from_str(token)
                .map_err(|e| FetchError::Connection(format!("invalid token: {}", e)))?;
            headers.insert(TOKEN_HEADER, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Connection(e.to_string()))?;

        Ok(Self { client, api_root })
    }

    /// The normalized API root (always ends with `/`).
    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    /// Resolve a relative path under the API root.
    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.api_root
            .join(path)
            .map_err(|e| FetchError::Connection(format!("invalid path '{}': {}", path, e)))
    }

    fn endpoint_with_query(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, FetchError> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        debug!("GET {}", url);
        let response = send(self.client.get(url.clone()), &url).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| FetchError::InvalidPayload(format!("{}: {}", url, e)))
    }

    async fn post_form(&self, url: Url, form: &[(&str, &str)]) -> Result<(), FetchError> {
        debug!("POST {}", url);
        send(self.client.post(url.clone()).form(form), &url).await?;
        Ok(())
    }
}

/// Make sure the root ends with a slash so `join` appends instead of replacing.
fn normalize_root(api_url: &str) -> Result<Url, FetchError> {
    let mut root = api_url.trim().to_string();
    if !root.ends_with('/') {
        root.push('/');
    }
    Url::parse(&root).map_err(|e| FetchError::Connection(format!("invalid API URL: {}", e)))
}

/// Percent-encode an id for use as a path segment.
fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Send a request and map transport and status failures.
async fn send(request: RequestBuilder, url: &Url) -> Result<reqwest::Response, FetchError> {
    let response = request
        .send()
        .await
        .map_err(|e| FetchError::Connection(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound(url.path().to_string()));
    }

    let message = response.text().await.unwrap_or_default();
    Err(FetchError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Transport for GirderClient {
    async fn fetch_segmentation_slices(
        &self,
        segmentation_id: &str,
        volume_id: &str,
    ) -> Result<ImagePayload, FetchError> {
        let url = self.endpoint_with_query(
            "segmentation/segmentation_data/",
            &[("seg_id", segmentation_id), ("volume_id", volume_id)],
        )?;
        self.get_json(url).await
    }

    async fn fetch_diff_slices(
        &self,
        seg1_id: &str,
        seg2_id: &str,
    ) -> Result<ImagePayload, FetchError> {
        let url = self.endpoint_with_query(
            "segmentation/diff_data/",
            &[("seg1_id", seg1_id), ("seg2_id", seg2_id)],
        )?;
        self.get_json(url).await
    }

    async fn fetch_base_image_slices(&self, volume_id: &str) -> Result<ImagePayload, FetchError> {
        let url = self.endpoint(&format!(
            "segmentation/{}/base_image_data",
            segment(volume_id)
        ))?;
        self.get_json(url).await
    }

    async fn fetch_volumes(&self, container_id: &str) -> Result<Vec<Item>, FetchError> {
        let url = self.endpoint(&format!(
            "segmentation/{}/get_volumes",
            segment(container_id)
        ))?;
        self.get_json(url).await
    }

    async fn fetch_segmentations(&self, container_id: &str) -> Result<Vec<Item>, FetchError> {
        let url = self.endpoint(&format!("item/{}", segment(container_id)))?;
        let document: ItemDocument = self.get_json(url).await?;
        Ok(document
            .segmentation
            .map(|meta| meta.images)
            .unwrap_or_default())
    }

    async fn fetch_file_info(&self, file_id: &str) -> Result<FileInfo, FetchError> {
        let url = self.endpoint(&format!("file/{}", segment(file_id)))?;
        self.get_json(url).await
    }

    async fn set_file_tag(&self, file_id: &str, tag: &str) -> Result<(), FetchError> {
        let url = self.endpoint(&format!("file/{}/set_seg_tag", segment(file_id)))?;
        self.post_form(url, &[("tag", tag)]).await
    }

    async fn set_file_comment(&self, file_id: &str, comment: &str) -> Result<(), FetchError> {
        let url = self.endpoint(&format!("file/{}/set_seg_comment", segment(file_id)))?;
        self.post_form(url, &[("comment", comment)]).await
    }
}
