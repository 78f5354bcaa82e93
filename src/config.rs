use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use log::info;

use crate::error::{BirdTagError, Result};

#[derive(Args, Debug)]
pub struct FlatConfig {
    #[arg(long, env = "BIRDTAG_AUTH_URL", default_value = "https://auth.birdtag.example.com/prod", help = "Base URL of the identity provider gateway")]
    auth_url: String,

    #[arg(long, env = "BIRDTAG_UPLOAD_URL", default_value = "https://api.birdtag.example.com/prod/upload", help = "Upload endpoint")]
    upload_url: String,

    #[arg(long, env = "BIRDTAG_SEARCH_URL", default_value = "https://api.birdtag.example.com/prod/birdtag/search-s", help = "Tag/species search endpoint")]
    search_url: String,

    #[arg(long, env = "BIRDTAG_THUMB_SEARCH_URL", default_value = "https://api.birdtag.example.com/prod/birdtag/search-t", help = "Thumbnail correlation endpoint")]
    thumb_search_url: String,

    #[arg(long, env = "BIRDTAG_EDIT_URL", default_value = "https://api.birdtag.example.com/prod/birdtag/edit", help = "Bulk tag edit endpoint")]
    edit_url: String,

    #[arg(long, env = "BIRDTAG_DELETE_URL", default_value = "https://api.birdtag.example.com/prod/birdtag/delete", help = "Bulk delete endpoint")]
    delete_url: String,

    #[arg(long, env = "BIRDTAG_SETTINGS_URL", default_value = "https://api.birdtag.example.com/prod/settings", help = "Notification settings endpoint")]
    settings_url: String,

    #[arg(long, env = "BIRDTAG_MAX_UPLOAD", default_value_t = 8 * 1024 * 1024, help = "Maximum upload size in bytes")]
    max_upload_bytes: u64,

    #[arg(long, env = "BIRDTAG_SPECIES_CACHE_TTL", default_value = "30m", value_parser = humantime::parse_duration, help = "How long the species list is cached")]
    species_cache_ttl: Duration,

    #[arg(long, env = "BIRDTAG_WORKDIR", help = "State directory (defaults to ~/.birdtag)")]
    workdir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub endpoints: EndpointConfig,
    pub limits: UploadLimits,
    pub cache: CachePolicy,
    pub workdir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub auth_url: String,
    pub upload_url: String,
    pub search_url: String,
    pub thumb_search_url: String,
    pub edit_url: String,
    pub delete_url: String,
    pub settings_url: String,
}

#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub species_ttl: chrono::Duration,
}

impl Config {
    pub fn from_flat(value: FlatConfig) -> Result<Self> {
        let workdir = get_or_create_workdir(value.workdir.as_deref())?;
        let species_ttl = chrono::Duration::from_std(value.species_cache_ttl)
            .map_err(|e| BirdTagError::Validation(format!("invalid cache ttl: {e}")))?;
        Ok(Config {
            endpoints: EndpointConfig {
                auth_url: value.auth_url,
                upload_url: value.upload_url,
                search_url: value.search_url,
                thumb_search_url: value.thumb_search_url,
                edit_url: value.edit_url,
                delete_url: value.delete_url,
                settings_url: value.settings_url,
            },
            limits: UploadLimits { max_upload_bytes: value.max_upload_bytes },
            cache: CachePolicy { species_ttl },
            workdir,
        })
    }
}

fn get_or_create_workdir(workdir: Option<&str>) -> Result<PathBuf> {
    let workdir = match workdir {
        Some(dir) => PathBuf::from(dir),
        None => home::home_dir()
            .ok_or_else(|| BirdTagError::Validation("could not determine home directory, pass --workdir".to_string()))?
            .join(".birdtag"),
    };
    if !workdir.exists() {
        std::fs::create_dir_all(&workdir).map_err(BirdTagError::StateIOError)?;
    }
    if !workdir.is_dir() {
        return Err(BirdTagError::Validation(format!("workdir is not a directory: {}", workdir.display())));
    }
    info!("workdir: {}", workdir.display());
    Ok(workdir)
}

pub fn session_path(workdir: &Path) -> PathBuf {
    workdir.join("session.json")
}

pub fn preferences_path(workdir: &Path) -> PathBuf {
    workdir.join("preferences.json")
}

pub fn profile_path(workdir: &Path) -> PathBuf {
    workdir.join("profile.json")
}
