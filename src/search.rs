use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::require_token;
use crate::config::{CachePolicy, EndpointConfig};
use crate::error::{BirdTagError, Result};
use crate::results::{FileKind, SearchResult, ThumbnailMatch};
use crate::session::SessionStore;
use crate::utils::normalize_species;
use crate::utils::str_utils::{filename_from_url, full_url_from_thumb, is_thumbnail_name, THUMB_PREFIX};

/// Shown when the species endpoint is unreachable, so the search forms stay
/// usable offline.
pub const FALLBACK_SPECIES: &[&str] = &[
    "crow", "pigeon", "sparrow", "robin", "eagle", "hawk", "owl", "duck",
];

#[derive(Debug, Clone)]
pub struct SpeciesCache {
    pub list: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl SpeciesCache {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.fetched_at < ttl
    }
}

#[derive(Debug, Deserialize)]
struct SpeciesResponse {
    #[serde(default)]
    species: Vec<String>,
}

// The documented upstream response shapes, attempted in this order until
// one yields a non-empty result set.
#[derive(Debug, Deserialize)]
struct ResultsShape {
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct LinksShape {
    links: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WrappedShape {
    body: String,
}

/// A raw database record; the object URL hides under one of several names
/// depending on which backend revision produced it.
#[derive(Debug, Deserialize)]
struct RecordItem {
    #[serde(default)]
    file_url: Option<String>,
    #[serde(default)]
    thumb_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "s3Url")]
    s3_url: Option<String>,
}

impl RecordItem {
    fn object_url(&self) -> Option<&String> {
        self.file_url
            .as_ref()
            .or(self.thumb_url.as_ref())
            .or(self.url.as_ref())
            .or(self.s3_url.as_ref())
    }
}

/// Decode a search response of any known shape into the uniform display
/// model. Unknown or empty payloads normalize to an empty list rather than
/// an error; the caller reports "no results" with the searched species.
pub fn normalize_response(raw: &str, searched: &[String]) -> Vec<SearchResult> {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return Vec::new();
    };
    normalize_value(&value, searched)
}

fn normalize_value(value: &Value, searched: &[String]) -> Vec<SearchResult> {
    if let Ok(shape) = ResultsShape::deserialize(value) {
        if !shape.results.is_empty() {
            return shape.results;
        }
    }
    if let Ok(shape) = LinksShape::deserialize(value) {
        let results = results_from_links(&shape.links, searched);
        if !results.is_empty() {
            return results;
        }
    }
    if let Ok(shape) = WrappedShape::deserialize(value) {
        if let Ok(inner) = serde_json::from_str::<Value>(&shape.body) {
            let results = normalize_value(&inner, searched);
            if !results.is_empty() {
                return results;
            }
        }
    }
    if let Ok(records) = Vec::<RecordItem>::deserialize(value) {
        let links = records.iter().filter_map(|x| x.object_url().cloned()).collect::<Vec<String>>();
        return results_from_links(&links, searched);
    }
    Vec::new()
}

fn results_from_links(links: &[String], searched: &[String]) -> Vec<SearchResult> {
    links
        .iter()
        .filter(|url| !url.is_empty())
        .enumerate()
        .map(|(index, url)| {
            let filename = filename_from_url(url);
            let tags = searched.iter().map(|s| (s.clone(), 1)).collect::<BTreeMap<String, u32>>();
            // A thumbnail link identifies an image; the full-size URL is the
            // same object with the thumbnail prefix stripped.
            let (file_type, thumbnail_url, full_url) = if is_thumbnail_name(&filename) {
                (FileKind::Image, Some(url.to_string()), full_url_from_thumb(url))
            } else {
                (FileKind::from_filename(&filename), None, url.to_string())
            };
            SearchResult {
                id: format!("search-result-{index}"),
                filename,
                file_type,
                tags,
                thumbnail_url,
                download_url: full_url.clone(),
                full_url,
            }
        })
        .collect()
}

/// Client for the tag/species search and thumbnail correlation endpoints,
/// with a time-bounded memo of the species enumeration.
pub struct SearchClient {
    client: Client,
    endpoints: Arc<EndpointConfig>,
    cache_policy: CachePolicy,
    store: Arc<SessionStore>,
    species_cache: Mutex<Option<SpeciesCache>>,
}

impl SearchClient {
    pub fn new(endpoints: Arc<EndpointConfig>, cache_policy: CachePolicy, store: Arc<SessionStore>) -> Self {
        Self {
            client: Client::new(),
            endpoints,
            cache_policy,
            store,
            species_cache: Mutex::new(None),
        }
    }

    /// The known species list, case-folded and sorted. Served from the memo
    /// within the cache window unless `refresh` forces a new fetch; on fetch
    /// failure a built-in fallback list is returned and the memo is left
    /// untouched.
    pub async fn species(&self, refresh: bool) -> Result<Vec<String>> {
        if !refresh {
            let cache = self.species_cache.lock().unwrap();
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh(Utc::now(), self.cache_policy.species_ttl) {
                    return Ok(cached.list.clone());
                }
            }
        }

        match self.fetch_species().await {
            Ok(list) => {
                info!("loaded {} species", list.len());
                let mut cache = self.species_cache.lock().unwrap();
                *cache = Some(SpeciesCache { list: list.clone(), fetched_at: Utc::now() });
                Ok(list)
            }
            Err(e) => {
                warn!("species fetch failed, using default list: {e}");
                Ok(FALLBACK_SPECIES.iter().map(|x| x.to_string()).collect())
            }
        }
    }

    async fn fetch_species(&self) -> Result<Vec<String>> {
        let token = require_token(&self.store)?;
        let res = self.client.get(&self.endpoints.search_url).bearer_auth(&token).send().await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        let response: SpeciesResponse = res.json().await?;
        let list = response
            .species
            .into_iter()
            .map(|x| x.to_lowercase())
            .sorted()
            .dedup()
            .collect::<Vec<String>>();
        Ok(list)
    }

    /// Search for files containing all of the given species, any count.
    pub async fn search_by_tags(&self, species: &[String]) -> Result<Vec<SearchResult>> {
        let species = normalize_species(species);
        if species.is_empty() {
            return Err(BirdTagError::Validation("Please select at least one bird species".to_string()));
        }
        let token = require_token(&self.store)?;

        let params = species
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("tag{}", i + 1), s.clone()))
            .collect::<Vec<(String, String)>>();
        info!("searching by tags: {}", species.iter().join(", "));

        let res = self
            .client
            .get(&self.endpoints.search_url)
            .query(&params)
            .bearer_auth(&token)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        let body = res.text().await?;
        Ok(normalize_response(&body, &species))
    }

    /// Search for files containing each species at least `count` times.
    pub async fn search_by_tag_counts(&self, pairs: &BTreeMap<String, u32>) -> Result<Vec<SearchResult>> {
        if pairs.is_empty() {
            return Err(BirdTagError::Validation(
                "Please select at least one bird species and count".to_string(),
            ));
        }
        if let Some((species, _)) = pairs.iter().find(|(_, count)| **count == 0) {
            return Err(BirdTagError::Validation(format!("Count for {species} must be at least 1")));
        }
        let token = require_token(&self.store)?;

        let mut params = Vec::with_capacity(pairs.len() * 2);
        for (i, (species, count)) in pairs.iter().enumerate() {
            params.push((format!("tag{}", i + 1), species.to_lowercase()));
            params.push((format!("count{}", i + 1), count.to_string()));
        }
        let species = pairs.keys().map(|x| x.to_lowercase()).collect::<Vec<String>>();
        info!("searching by tag counts: {:?}", pairs);

        let res = self
            .client
            .get(&self.endpoints.search_url)
            .query(&params)
            .bearer_auth(&token)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        let body = res.text().await?;
        Ok(normalize_response(&body, &species))
    }

    /// Look up the full-size file(s) for a known thumbnail URL or filename.
    /// The name must carry the thumbnail prefix; anything else fails here,
    /// before any network I/O.
    pub async fn search_by_thumbnail(&self, input: &str) -> Result<Vec<ThumbnailMatch>> {
        let input = input.trim();
        if input.is_empty() {
            return Err(BirdTagError::Validation("Please enter a thumbnail URL or filename".to_string()));
        }
        let filename = filename_from_url(input);
        if !is_thumbnail_name(&filename) {
            return Err(BirdTagError::Validation(format!(
                "{filename} is not a thumbnail filename (expected a {THUMB_PREFIX} prefix)"
            )));
        }
        let token = require_token(&self.store)?;

        let query = filename.to_lowercase();
        let url = format!("{}?turl1={}", self.endpoints.thumb_search_url, urlencoding::encode(&query));
        let res = self.client.get(&url).bearer_auth(&token).send().await?;
        if !res.status().is_success() {
            return Err(BirdTagError::from_response(res).await);
        }
        let links: LinksShape = res.json().await?;
        let matches = links
            .links
            .into_iter()
            .filter(|link| !link.is_empty())
            .map(|link| ThumbnailMatch {
                filename: filename_from_url(&link),
                thumbnail_url: input.to_string(),
                full_url: link,
            })
            .collect::<Vec<ThumbnailMatch>>();
        Ok(matches)
    }
}
