use std::io;
use std::path::Path;
use std::time::Duration;

use reqwest::header::{LOCATION, RANGE};
use reqwest::{Client, Method, RequestBuilder, StatusCode, redirect};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::locator::{DriveTarget, ItemLocator, ODataQuery, compose_url};
use crate::model::{
    ConflictBehavior, DeltaPage, DriveItem, ItemCollection, ItemReference, PreviewLinks,
    PreviewOptions, Thumbnail, ThumbnailSetCollection, UploadSessionInfo,
};
use crate::upload::{
    ChunkSource, FileChunkSource, ReqwestTransport, UploadConfig, UploadDriver, UploadError,
    UploadReport, UploadSession,
};

pub const DEFAULT_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Files above this size must go through an upload session.
pub const SIMPLE_UPLOAD_LIMIT: u64 = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("api response is missing the Location header")]
    MissingLocation,
    #[error("parent folder path must end with '/': {0}")]
    InvalidParentPath(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Where a simple (single request) upload lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleUploadTarget {
    /// Overwrite the content of an existing item.
    Replace(ItemLocator),
    /// Create `file_name` inside `parent`. Path parents must end with `/`; raw
    /// parents address the folder item, e.g. `/special/approot`.
    New {
        parent: ItemLocator,
        file_name: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CopyRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_reference: Option<&'a ItemReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    drive: DriveTarget,
    token: String,
    max_duration: Option<Duration>,
}

impl DriveClient {
    pub fn new(token: impl Into<String>) -> Result<Self, DriveError> {
        Self::with_base_url(DEFAULT_BASE_URL, token)
    }

    pub fn with_base_url(base_url: &str, token: impl Into<String>) -> Result<Self, DriveError> {
        // Redirects carry pre-authenticated download URLs that callers want
        // to see instead of following.
        let http = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            drive: DriveTarget::default(),
            token: token.into(),
            max_duration: None,
        })
    }

    pub fn set_drive(&mut self, drive: DriveTarget) {
        self.drive = drive;
    }

    pub fn drive(&self) -> &DriveTarget {
        &self.drive
    }

    /// Per-request timeout. `None` leaves requests unbounded.
    pub fn set_max_duration(&mut self, max_duration: Option<Duration>) {
        self.max_duration = max_duration.filter(|d| !d.is_zero());
    }

    pub fn set_access_token(&mut self, token: impl Into<String>) {
        self.token = token.into();
    }

    pub async fn item(
        &self,
        locator: &ItemLocator,
        query: Option<&ODataQuery>,
    ) -> Result<DriveItem, DriveError> {
        let url = self.endpoint(&locator.segment(), query)?;
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    pub async fn children(
        &self,
        locator: &ItemLocator,
        query: Option<&ODataQuery>,
    ) -> Result<ItemCollection, DriveError> {
        let url = self.endpoint(&locator.with_child("children"), query)?;
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    pub async fn children_all(
        &self,
        locator: &ItemLocator,
        query: Option<&ODataQuery>,
    ) -> Result<Vec<DriveItem>, DriveError> {
        let mut page = self.children(locator, query).await?;
        let mut items = std::mem::take(&mut page.value);
        while let Some(next) = page.next_link.take() {
            page = self.fetch_json(&next).await?;
            items.append(&mut page.value);
        }
        Ok(items)
    }

    /// GETs an absolute URL handed out by the API, such as `@odata.nextLink`.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, DriveError> {
        let response = self.request(Method::GET, url.clone()).send().await?;
        Self::handle_response(response).await
    }

    pub async fn create_folder(
        &self,
        parent: &ItemLocator,
        name: &str,
        conflict: ConflictBehavior,
    ) -> Result<DriveItem, DriveError> {
        let url = self.endpoint(&parent.with_child("children"), None)?;
        let body = json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": conflict.as_str(),
        });
        let response = self.request(Method::POST, url).json(&body).send().await?;
        Self::handle_response(response).await
    }

    pub async fn move_item(
        &self,
        locator: &ItemLocator,
        new_parent_id: &str,
        new_name: Option<&str>,
    ) -> Result<DriveItem, DriveError> {
        let mut body = json!({ "parentReference": { "id": new_parent_id } });
        if let Some(name) = new_name {
            body["name"] = Value::from(name);
        }
        self.patch_item(locator, &body).await
    }

    pub async fn rename(&self, locator: &ItemLocator, name: &str) -> Result<DriveItem, DriveError> {
        self.patch_item(locator, &json!({ "name": name })).await
    }

    /// Starts a server-side copy. Returns the monitor URL for the async job.
    pub async fn copy_item(
        &self,
        locator: &ItemLocator,
        parent_reference: Option<&ItemReference>,
        name: Option<&str>,
    ) -> Result<Option<Url>, DriveError> {
        let url = self.endpoint(&locator.with_child("copy"), None)?;
        let body = CopyRequest {
            parent_reference,
            name,
        };
        let response = self.request(Method::POST, url).json(&body).send().await?;
        let response = Self::check_status(response).await?;
        Ok(location(&response))
    }

    /// Moves the item to the recycle bin.
    pub async fn delete(&self, locator: &ItemLocator) -> Result<(), DriveError> {
        let url = self.endpoint(&locator.segment(), None)?;
        let response = self.request(Method::DELETE, url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Resolves the short-lived pre-authenticated download URL for an item.
    pub async fn download_url(
        &self,
        locator: &ItemLocator,
        range: Option<(u64, u64)>,
        query: Option<&ODataQuery>,
    ) -> Result<Url, DriveError> {
        let url = self.endpoint(&locator.with_child("content"), query)?;
        let mut request = self.request(Method::GET, url);
        if let Some((start, end)) = range {
            request = request.header(RANGE, format!("bytes={start}-{end}"));
        }
        Self::resolve_redirect(request.send().await?).await
    }

    pub async fn preview(
        &self,
        locator: &ItemLocator,
        options: &PreviewOptions,
    ) -> Result<PreviewLinks, DriveError> {
        let url = self.endpoint(&locator.with_child("preview"), None)?;
        let response = self.request(Method::POST, url).json(options).send().await?;
        Self::handle_response(response).await
    }

    pub async fn search(
        &self,
        locator: &ItemLocator,
        text: &str,
    ) -> Result<ItemCollection, DriveError> {
        let escaped = text.replace('\'', "''");
        let url = self.endpoint(&locator.with_child(&format!("search(q='{escaped}')")), None)?;
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    pub async fn delta(
        &self,
        locator: &ItemLocator,
        query: Option<&ODataQuery>,
    ) -> Result<DeltaPage, DriveError> {
        let url = self.endpoint(&locator.with_child("delta"), query)?;
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    /// Follows a `@odata.nextLink` or `@odata.deltaLink` from a previous page.
    pub async fn delta_next(&self, link: &Url) -> Result<DeltaPage, DriveError> {
        self.fetch_json(link).await
    }

    pub async fn thumbnails(
        &self,
        locator: &ItemLocator,
        query: Option<&ODataQuery>,
    ) -> Result<ThumbnailSetCollection, DriveError> {
        let url = self.endpoint(&locator.with_child("thumbnails"), query)?;
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    pub async fn thumbnail(
        &self,
        locator: &ItemLocator,
        set_id: &str,
        size: &str,
    ) -> Result<Thumbnail, DriveError> {
        let url = self.endpoint(&locator.with_child(&format!("thumbnails/{set_id}/{size}")), None)?;
        let response = self.request(Method::GET, url).send().await?;
        Self::handle_response(response).await
    }

    pub async fn thumbnail_content_url(
        &self,
        locator: &ItemLocator,
        set_id: &str,
        size: &str,
    ) -> Result<Url, DriveError> {
        let child = format!("thumbnails/{set_id}/{size}/content");
        let url = self.endpoint(&locator.with_child(&child), None)?;
        Self::resolve_redirect(self.request(Method::GET, url).send().await?).await
    }

    pub async fn checkin(&self, locator: &ItemLocator, comment: &str) -> Result<(), DriveError> {
        let url = self.endpoint(&locator.with_child("checkin"), None)?;
        let body = json!({ "comment": comment });
        let response = self.request(Method::POST, url).json(&body).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    pub async fn checkout(&self, locator: &ItemLocator) -> Result<(), DriveError> {
        let url = self.endpoint(&locator.with_child("checkout"), None)?;
        let response = self.request(Method::POST, url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    /// Single-request upload, for content up to [`SIMPLE_UPLOAD_LIMIT`].
    pub async fn upload_simple(
        &self,
        target: &SimpleUploadTarget,
        body: impl Into<reqwest::Body>,
    ) -> Result<DriveItem, DriveError> {
        let url = self.endpoint(&simple_upload_segment(target)?, None)?;
        let response = self.request(Method::PUT, url).body(body).send().await?;
        Self::handle_response(response).await
    }

    /// Like [`Self::upload_simple`], reading the body from `path`. An empty
    /// `file_name` takes the name of the local file.
    pub async fn upload_simple_from_path(
        &self,
        target: &SimpleUploadTarget,
        path: &Path,
    ) -> Result<DriveItem, DriveError> {
        let target = match target {
            SimpleUploadTarget::New { parent, file_name } if file_name.is_empty() => {
                SimpleUploadTarget::New {
                    parent: parent.clone(),
                    file_name: path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                }
            }
            other => other.clone(),
        };
        let body = tokio::fs::read(path).await?;
        self.upload_simple(&target, body).await
    }

    /// Opens a resumable upload session. The returned URL needs no
    /// authorization header.
    pub async fn create_upload_session(
        &self,
        locator: &ItemLocator,
        conflict: ConflictBehavior,
    ) -> Result<UploadSessionInfo, DriveError> {
        let url = self.endpoint(&locator.with_child("createUploadSession"), None)?;
        let body = json!({
            "item": { "@microsoft.graph.conflictBehavior": conflict.as_str() }
        });
        let response = self.request(Method::POST, url).json(&body).send().await?;
        Self::handle_response(response).await
    }

    /// Uploads the file at `path` to `locator` through a fresh upload session.
    pub async fn upload_large(
        &self,
        locator: &ItemLocator,
        path: &Path,
        conflict: ConflictBehavior,
        config: UploadConfig,
        cancel: &CancellationToken,
    ) -> Result<UploadReport, UploadError> {
        let mut source = FileChunkSource::open(path).await?;
        let info = self.create_upload_session(locator, conflict).await?;
        debug!(
            expires = info.expiration_date_time.as_deref().unwrap_or("unknown"),
            size = source.size(),
            "upload session created"
        );
        let session = UploadSession::new(info.upload_url, source.size());
        let transport =
            ReqwestTransport::with_http(self.http.clone()).request_timeout(self.max_duration);
        UploadDriver::new(transport, config)
            .upload(&session, &mut source, cancel)
            .await
    }

    /// Escape hatch for endpoints without a dedicated method, e.g.
    /// `custom(&id, "versions", None, None, None)`.
    pub async fn custom(
        &self,
        locator: &ItemLocator,
        command: &str,
        query: Option<&ODataQuery>,
        body: Option<&Value>,
        method: Option<Method>,
    ) -> Result<Value, DriveError> {
        let url = self.endpoint(&locator.with_child(command), query)?;
        let method = method.unwrap_or(if body.is_some() {
            Method::POST
        } else {
            Method::GET
        });
        let mut request = self.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = Self::check_status(request.send().await?).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn patch_item<B: Serialize + ?Sized>(
        &self,
        locator: &ItemLocator,
        body: &B,
    ) -> Result<DriveItem, DriveError> {
        let url = self.endpoint(&locator.segment(), None)?;
        let response = self.request(Method::PATCH, url).json(body).send().await?;
        Self::handle_response(response).await
    }

    fn endpoint(&self, segment: &str, query: Option<&ODataQuery>) -> Result<Url, DriveError> {
        let prefix = self.drive.prefix();
        let mut url = Url::parse(&compose_url(self.base_url.as_str(), &[&prefix, segment]))?;
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.query_pairs_mut().extend_pairs(query.pairs());
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "graph request");
        let request = self.http.request(method, url).bearer_auth(&self.token);
        match self.max_duration {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DriveError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(DriveError::Api { status, body })
        }
    }

    async fn resolve_redirect(response: reqwest::Response) -> Result<Url, DriveError> {
        if response.status().is_redirection() {
            return location(&response).ok_or(DriveError::MissingLocation);
        }
        let response = Self::check_status(response).await?;
        Ok(response.url().clone())
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, DriveError> {
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

fn location(response: &reqwest::Response) -> Option<Url> {
    let value = response.headers().get(LOCATION)?.to_str().ok()?;
    response.url().join(value).ok()
}

fn simple_upload_segment(target: &SimpleUploadTarget) -> Result<String, DriveError> {
    match target {
        SimpleUploadTarget::Replace(locator) => Ok(locator.with_child("content")),
        SimpleUploadTarget::New { parent, file_name } => match parent {
            ItemLocator::Raw(raw) => {
                let parent = raw.trim_end_matches('/');
                Ok(format!("{parent}:/{file_name}:/content"))
            }
            ItemLocator::Id(id) => Ok(format!("/items/{id}:/{file_name}:/content")),
            ItemLocator::Path(path) => {
                if !path.is_empty() && !path.ends_with('/') {
                    return Err(DriveError::InvalidParentPath(path.clone()));
                }
                let parent = path.trim_start_matches('/');
                Ok(format!("/root:/{parent}{file_name}:/content"))
            }
        },
    }
}

impl DriveError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            DriveError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.classification(),
            Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
        )
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT | StatusCode::TOO_EARLY
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}
