use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use log::{info, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::auth::require_token;
use crate::config::{EndpointConfig, UploadLimits};
use crate::error::{BirdTagError, Result};
use crate::session::SessionStore;

/// MIME types the backend tagging pipeline understands.
pub const ACCEPTED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "audio/mpeg",
    "audio/wav",
    "video/mp4",
    "video/quicktime",
    "video/x-msvideo",
];

pub type UploadId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Success,
    Error,
}

/// Storage fields echoed back by the upload endpoint, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageInfo {
    #[serde(rename = "s3Url")]
    pub s3_url: String,
    #[serde(rename = "s3Key")]
    pub s3_key: String,
    #[serde(rename = "fileId")]
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadItem {
    pub id: UploadId,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub status: UploadStatus,
    pub error: Option<String>,
    pub storage: Option<StorageInfo>,
}

/// Uploads media files as raw binary bodies and tracks one item per file
/// for the lifetime of the process. Concurrent uploads run as independent
/// flows keyed by a client-generated id.
pub struct UploadClient {
    client: Client,
    endpoints: Arc<EndpointConfig>,
    limits: UploadLimits,
    store: Arc<SessionStore>,
    items: Arc<DashMap<UploadId, UploadItem>>,
}

impl UploadClient {
    pub fn new(endpoints: Arc<EndpointConfig>, limits: UploadLimits, store: Arc<SessionStore>) -> Self {
        Self {
            client: Client::new(),
            endpoints,
            limits,
            store,
            items: Arc::new(DashMap::new()),
        }
    }

    // Time+random composite, unique enough for a page-lifetime tracker.
    fn new_id() -> UploadId {
        format!("{}-{:08x}", Utc::now().timestamp_millis(), rand::random::<u32>())
    }

    /// Type/size gate. Rejected files never reach the network.
    pub fn validate(&self, content_type: &str, size: u64) -> Result<()> {
        if !ACCEPTED_TYPES.contains(&content_type) {
            return Err(BirdTagError::UnsupportedFileType(content_type.to_string()));
        }
        if size > self.limits.max_upload_bytes {
            let max = humanize_bytes::humanize_bytes_binary!(self.limits.max_upload_bytes);
            return Err(BirdTagError::FileTooBig(max.to_string()));
        }
        Ok(())
    }

    fn track(&self, item: UploadItem) -> UploadId {
        let id = item.id.clone();
        self.items.insert(id.clone(), item);
        id
    }

    fn mark_error(items: &DashMap<UploadId, UploadItem>, id: &str, message: String) {
        if let Some(mut item) = items.get_mut(id) {
            item.status = UploadStatus::Error;
            item.error = Some(message);
        }
    }

    fn mark_success(items: &DashMap<UploadId, UploadItem>, id: &str, storage: StorageInfo) {
        if let Some(mut item) = items.get_mut(id) {
            item.status = UploadStatus::Success;
            item.error = None;
            item.storage = Some(storage);
        }
    }

    /// Validate and upload a batch of local files. Every path gets a tracked
    /// item; accepted files upload concurrently, rejected ones are recorded
    /// with the rejection reason and skip the network entirely.
    pub async fn handle_files(&self, paths: &[PathBuf]) -> Vec<UploadId> {
        let mut ids = Vec::with_capacity(paths.len());
        let mut tasks: JoinSet<()> = JoinSet::new();

        for path in paths {
            let filename = path
                .file_name()
                .map(|x| x.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            let guessed: mime::Mime = mime_guess::from_path(path).first_or_octet_stream();
            let content_type = guessed.essence_str().to_string();

            let metadata = match tokio::fs::metadata(path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    let id = self.track(UploadItem {
                        id: Self::new_id(),
                        filename,
                        content_type,
                        size: 0,
                        status: UploadStatus::Error,
                        error: Some(BirdTagError::FileNotFound(e.to_string()).to_string()),
                        storage: None,
                    });
                    ids.push(id);
                    continue;
                }
            };
            let size = metadata.len();

            if let Err(reason) = self.validate(&content_type, size) {
                warn!("rejected {}: {}", filename, reason);
                let id = self.track(UploadItem {
                    id: Self::new_id(),
                    filename,
                    content_type,
                    size,
                    status: UploadStatus::Error,
                    error: Some(reason.to_string()),
                    storage: None,
                });
                ids.push(id);
                continue;
            }

            let id = self.track(UploadItem {
                id: Self::new_id(),
                filename: filename.clone(),
                content_type: content_type.clone(),
                size,
                status: UploadStatus::Uploading,
                error: None,
                storage: None,
            });
            ids.push(id.clone());

            let client = self.client.clone();
            let items = self.items.clone();
            let store = self.store.clone();
            let upload_url = self.endpoints.upload_url.clone();
            let path = path.clone();
            tasks.spawn(async move {
                match upload_to_api(&client, &store, &upload_url, &path, &content_type).await {
                    Ok(storage) => {
                        info!("uploaded {} as {}", filename, storage.file_id);
                        Self::mark_success(&items, &id, storage);
                    }
                    Err(e) => {
                        warn!("upload of {} failed: {}", filename, e);
                        Self::mark_error(&items, &id, e.to_string());
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}
        ids
    }

    pub fn get(&self, id: &str) -> Option<UploadItem> {
        self.items.get(id).map(|x| x.value().clone())
    }

    pub fn items(&self) -> Vec<UploadItem> {
        let mut items = self.items.iter().map(|x| x.value().clone()).collect::<Vec<UploadItem>>();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        items
    }
}

async fn upload_to_api(
    client: &Client,
    store: &SessionStore,
    upload_url: &str,
    path: &Path,
    content_type: &str,
) -> Result<StorageInfo> {
    let token = require_token(store)?;
    let bytes = tokio::fs::read(path).await.map_err(BirdTagError::FileReadError)?;

    let res = client
        .post(upload_url)
        .header(CONTENT_TYPE, content_type)
        .bearer_auth(&token)
        .body(bytes)
        .send()
        .await?;
    if !res.status().is_success() {
        return Err(BirdTagError::from_response(res).await);
    }
    Ok(res.json().await?)
}
