use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use colored::Colorize;
use itertools::Itertools;
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::require_token;
use crate::config::EndpointConfig;
use crate::error::{BirdTagError, Result};
use crate::session::SessionStore;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mpeg", "mpg", "mov", "avi", "webm", "mkv"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "flac"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Other,
}

impl FileKind {
    pub fn from_filename(filename: &str) -> Self {
        let extension = filename.rsplit('.').next().unwrap_or_default().to_lowercase();
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            FileKind::Image
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            FileKind::Video
        } else if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            FileKind::Audio
        } else {
            FileKind::Other
        }
    }

    pub fn glyph(&self) -> &'static str {
        match self {
            FileKind::Image => "[img]",
            FileKind::Video => "[vid]",
            FileKind::Audio => "[aud]",
            FileKind::Other => "[doc]",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Image => "IMAGE",
            FileKind::Video => "VIDEO",
            FileKind::Audio => "AUDIO",
            FileKind::Other => "FILE",
        }
    }

    fn actions(&self) -> &'static str {
        match self {
            FileKind::Image => "view / download",
            FileKind::Video | FileKind::Audio => "play / download",
            FileKind::Other => "download",
        }
    }
}

/// Uniform display model every upstream response shape normalizes into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(default)]
    pub id: String,
    pub filename: String,
    #[serde(rename = "type")]
    pub file_type: FileKind,
    #[serde(default)]
    pub tags: BTreeMap<String, u32>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub full_url: String,
    #[serde(default)]
    pub download_url: String,
}

/// One thumbnail-correlation hit: the queried thumbnail next to the
/// full-size URL the server resolved it to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailMatch {
    pub filename: String,
    pub thumbnail_url: String,
    pub full_url: String,
}

/// Page-local state the renderer works from: the current result list and
/// the multi-select set feeding the bulk action bar.
#[derive(Debug, Default)]
pub struct UiState {
    results: Vec<SearchResult>,
    selection: HashSet<String>,
}

impl UiState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the displayed results wholesale; stale selections go with them.
    pub fn set_results(&mut self, results: Vec<SearchResult>) {
        self.results = results;
        self.selection.clear();
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    /// Toggle one result in or out of the selection. Returns whether the
    /// result is selected afterwards.
    pub fn toggle_selection(&mut self, id: &str) -> bool {
        if self.selection.remove(id) {
            false
        } else {
            self.selection.insert(id.to_string());
            true
        }
    }

    /// Select by 1-based display index, the way the cards are numbered.
    pub fn select_indices(&mut self, indices: &[usize]) -> Result<()> {
        for &index in indices {
            let result = index
                .checked_sub(1)
                .and_then(|i| self.results.get(i))
                .ok_or_else(|| BirdTagError::Validation(format!("No result #{index}")))?;
            self.selection.insert(result.id.clone());
        }
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selected_results(&self) -> Vec<&SearchResult> {
        self.results.iter().filter(|r| self.selection.contains(&r.id)).collect()
    }

    pub fn selected_urls(&self) -> Vec<String> {
        self.selected_results().iter().map(|r| r.full_url.clone()).collect()
    }

    /// The floating action bar label, or `None` when the bar is hidden.
    pub fn selection_bar(&self) -> Option<String> {
        match self.selection.len() {
            0 => None,
            n => Some(format!("{n} files selected")),
        }
    }
}

pub fn tag_summary(tags: &BTreeMap<String, u32>) -> String {
    tags.iter().map(|(species, count)| format!("{species} ×{count}")).join(", ")
}

pub fn no_results_message(species: &[String]) -> String {
    format!("No files found containing: {}", species.iter().join(", "))
}

/// One card per result, numbered, with a selection marker and the actions
/// available for its type.
pub fn render_results(state: &UiState) -> String {
    let mut out = String::new();
    for (index, result) in state.results().iter().enumerate() {
        let marker = if state.selection.contains(&result.id) { "[x]" } else { "[ ]" };
        out.push_str(&format!(
            "{} {} {} {}\n",
            marker,
            format!("#{}", index + 1).bold(),
            result.file_type.glyph(),
            result.filename.bold(),
        ));
        if !result.tags.is_empty() {
            out.push_str(&format!("      tags: {}\n", tag_summary(&result.tags)));
        }
        out.push_str(&format!(
            "      {} | {}\n",
            result.file_type.label().dimmed(),
            result.file_type.actions().dimmed(),
        ));
        if let Some(thumbnail_url) = &result.thumbnail_url {
            out.push_str(&format!("      thumbnail: {thumbnail_url}\n"));
        }
        out.push_str(&format!("      url: {}\n", result.full_url));
    }
    if let Some(bar) = state.selection_bar() {
        out.push_str(&format!("\n{}\n", bar.bold()));
    }
    out
}

/// Thumbnail-correlation hits get their own layout: both URLs side by side,
/// ready to copy.
pub fn render_thumbnail_matches(matches: &[ThumbnailMatch]) -> String {
    let mut out = String::new();
    for thumbnail_match in matches {
        out.push_str(&format!("{}\n", thumbnail_match.filename.bold()));
        out.push_str(&format!("  thumbnail URL: {}\n", thumbnail_match.thumbnail_url));
        out.push_str(&format!("  full-size URL: {}\n", thumbnail_match.full_url));
    }
    out
}

pub fn manual_download_instructions(url: &str, filename: &str) -> String {
    format!(
        "Automatic download failed. To save {filename} manually, open the URL below in a browser and use Save As:\n  {url}"
    )
}

// dup1-, dup2-, ... prefixes until the name is free.
fn unique_dest_path(dir: &Path, filename: &str) -> PathBuf {
    let mut unique_filename = filename.to_string();
    let mut suffix = 0;
    while dir.join(&unique_filename).exists() {
        suffix += 1;
        unique_filename = format!("dup{}-{}", suffix, filename);
    }
    dir.join(unique_filename)
}

/// Fetch a result URL into `dest_dir`, staging through a temp file so a
/// failed transfer never leaves a partial download behind. Optionally
/// reveals the saved file in the platform file manager.
pub async fn download_file(url: &str, filename: &str, dest_dir: &Path, reveal: bool) -> Result<PathBuf> {
    let client = Client::new();
    let res = client.get(url).send().await?;
    if !res.status().is_success() {
        return Err(BirdTagError::from_response(res).await);
    }
    let bytes = res.bytes().await?;

    let staging = tempfile::NamedTempFile::new_in(dest_dir).map_err(BirdTagError::StateIOError)?;
    std::fs::write(staging.path(), &bytes).map_err(BirdTagError::StateIOError)?;
    let dest = unique_dest_path(dest_dir, filename);
    staging
        .persist(&dest)
        .map_err(|e| BirdTagError::StateIOError(e.error))?;
    info!("downloaded {} to {}", filename, dest.display());

    if reveal {
        showfile::show_path_in_file_manager(&dest);
    }
    Ok(dest)
}

#[derive(Debug, Deserialize)]
struct MessageShape {
    #[serde(default)]
    message: Option<String>,
}

pub fn edit_request_body(urls: &[String], add: bool, tags: &[(String, u32)]) -> Value {
    json!({
        "url": urls,
        "operation": if add { 1 } else { 0 },
        "tags": tags.iter().map(|(species, count)| format!("{species},{count}")).collect::<Vec<String>>(),
    })
}

pub fn delete_request_body(urls: &[String]) -> Value {
    json!({ "links": urls })
}

/// Bulk operations over the current selection: tag edits and deletes.
pub struct BulkActions {
    client: Client,
    endpoints: Arc<EndpointConfig>,
    store: Arc<SessionStore>,
}

impl BulkActions {
    pub fn new(endpoints: Arc<EndpointConfig>, store: Arc<SessionStore>) -> Self {
        Self { client: Client::new(), endpoints, store }
    }

    async fn post(&self, url: &str, body: &Value) -> Result<String> {
        let token = require_token(&self.store)?;
        let res = self.client.post(url).bearer_auth(&token).json(body).send().await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        let text = res.text().await?;
        let message = serde_json::from_str::<MessageShape>(&text)
            .ok()
            .and_then(|m| m.message)
            .unwrap_or(text);
        Ok(message)
    }

    pub async fn add_tags(&self, urls: &[String], tags: &[(String, u32)]) -> Result<String> {
        self.edit_tags(urls, true, tags).await
    }

    pub async fn remove_tags(&self, urls: &[String], tags: &[(String, u32)]) -> Result<String> {
        self.edit_tags(urls, false, tags).await
    }

    async fn edit_tags(&self, urls: &[String], add: bool, tags: &[(String, u32)]) -> Result<String> {
        if urls.is_empty() {
            return Err(BirdTagError::Validation("No files selected".to_string()));
        }
        if tags.is_empty() {
            return Err(BirdTagError::Validation("No tags given".to_string()));
        }
        let body = edit_request_body(urls, add, tags);
        let message = self.post(&self.endpoints.edit_url, &body).await?;
        info!("tag edit: {message}");
        Ok(message)
    }

    pub async fn delete_files(&self, urls: &[String]) -> Result<String> {
        if urls.is_empty() {
            return Err(BirdTagError::Validation("No files selected".to_string()));
        }
        let body = delete_request_body(urls);
        let message = self.post(&self.endpoints.delete_url, &body).await?;
        warn!("deleted {} file(s): {}", urls.len(), message);
        Ok(message)
    }
}
