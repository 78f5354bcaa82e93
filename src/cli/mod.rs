use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use humanize_bytes::humanize_bytes_binary;

use crate::auth::AuthClient;
use crate::config::{self, Config, FlatConfig};
use crate::error::BirdTagError;
use crate::results::{
    download_file, manual_download_instructions, no_results_message, render_results,
    render_thumbnail_matches, BulkActions, UiState,
};
use crate::search::SearchClient;
use crate::session::SessionStore;
use crate::settings::{LocalProfile, NotificationPreferences, SettingsClient};
use crate::upload::{UploadClient, UploadStatus};
use crate::utils::display_species;

#[derive(Parser, Debug)]
#[command(name = "birdtag", about = "Upload, search and manage tagged bird media", version)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[command(flatten)]
    pub config: FlatConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account; a verification code is e-mailed to you
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        given_name: String,
        #[arg(long)]
        family_name: String,
        #[arg(long)]
        password: String,
    },
    /// Confirm the account with the e-mailed verification code
    Confirm {
        #[arg(long, help = "Defaults to the address from the pending sign-up")]
        email: Option<String>,
        code: String,
    },
    /// Re-send the verification code
    ResendCode {
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out and clear the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Upload media files for tagging
    Upload {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// List the known bird species
    Species {
        #[arg(long, help = "Bypass the cached list")]
        refresh: bool,
    },
    /// Search previously uploaded files
    Search {
        #[command(subcommand)]
        mode: SearchMode,
    },
    /// Download a file by URL
    Download {
        url: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
        #[arg(long, help = "Reveal the saved file in the file manager")]
        reveal: bool,
    },
    /// Notification preferences and profile
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SearchMode {
    /// Files containing all of the given species
    Tags {
        #[arg(required = true)]
        species: Vec<String>,
        #[command(flatten)]
        actions: ResultActions,
    },
    /// Files containing each species at least N times (species=count)
    Counts {
        #[arg(required = true)]
        pairs: Vec<String>,
        #[command(flatten)]
        actions: ResultActions,
    },
    /// The full-size file for a known thumbnail URL or filename
    Thumbnail { input: String },
}

#[derive(Args, Debug, Default)]
pub struct ResultActions {
    #[arg(long, value_delimiter = ',', help = "Select results by number, e.g. --select 1,3")]
    pub select: Vec<usize>,
    #[arg(long, value_delimiter = ',', help = "Add tags to the selection, e.g. --add-tags crow=2")]
    pub add_tags: Vec<String>,
    #[arg(long, value_delimiter = ',', help = "Remove tags from the selection")]
    pub remove_tags: Vec<String>,
    #[arg(long, help = "Delete the selected files")]
    pub delete: bool,
    #[arg(long, help = "Download the selected files into this directory")]
    pub download: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Show stored preferences and profile
    Show,
    /// Toggle per-species notifications
    Notify {
        #[arg(long, value_delimiter = ',')]
        enable: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        disable: Vec<String>,
    },
    /// Clear all notification preferences
    Reset,
    /// Update the locally stored profile
    Profile {
        #[arg(long)]
        given_name: String,
        #[arg(long)]
        family_name: String,
        #[arg(long)]
        email: String,
    },
    /// Change the account password
    Password {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
        #[arg(long)]
        confirm: String,
    },
}

/// Everything a command handler needs, built once per invocation.
pub struct App {
    pub config: Config,
    pub store: Arc<SessionStore>,
    pub auth: AuthClient,
    pub uploads: UploadClient,
    pub search: SearchClient,
    pub bulk: BulkActions,
    pub settings: SettingsClient,
}

impl App {
    pub fn new(config: Config) -> Self {
        let endpoints = Arc::new(config.endpoints.clone());
        let store = Arc::new(SessionStore::new(config::session_path(&config.workdir)));
        let auth = AuthClient::new(endpoints.clone(), store.clone());
        let uploads = UploadClient::new(endpoints.clone(), config.limits.clone(), store.clone());
        let search = SearchClient::new(endpoints.clone(), config.cache.clone(), store.clone());
        let bulk = BulkActions::new(endpoints.clone(), store.clone());
        let settings = SettingsClient::new(
            endpoints,
            store.clone(),
            config::preferences_path(&config.workdir),
            config::profile_path(&config.workdir),
        );
        Self { config, store, auth, uploads, search, bulk, settings }
    }

    fn ensure_authenticated(&self) -> Result<(), BirdTagError> {
        if self.auth.is_authenticated() {
            Ok(())
        } else {
            Err(BirdTagError::AuthRequired)
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_flat(cli.config)?;
    let app = App::new(config);

    match cli.command {
        Command::Signup { email, address, given_name, family_name, password } => {
            app.auth.register(&email, &address, &given_name, &family_name, &password).await?;
            println!("{}", "Sign up successful! Check your email for the verification code.".green());
            println!("Run `birdtag confirm <code>` to finish.");
        }
        Command::Confirm { email, code } => {
            let email = email
                .or_else(|| app.store.pending_email())
                .ok_or_else(|| BirdTagError::Validation("No pending sign-up found, pass --email".to_string()))?;
            app.auth.confirm(&email, &code).await?;
            println!("{}", "Email verified successfully! You can now sign in.".green());
        }
        Command::ResendCode { email } => {
            let email = email
                .or_else(|| app.store.pending_email())
                .ok_or_else(|| BirdTagError::Validation("No pending sign-up found, pass --email".to_string()))?;
            app.auth.resend_code(&email).await?;
            println!("Verification code sent to {email}");
        }
        Command::Login { email, password } => {
            let profile = app.auth.login(&email, &password).await?;
            println!("{}", format!("Signed in as {} <{}>", profile.display_name(), profile.email).green());
        }
        Command::Logout => {
            app.auth.logout().await?;
            println!("Signed out.");
        }
        Command::Whoami => match app.store.user() {
            Some(profile) if app.auth.is_authenticated() => {
                println!("{} <{}>", profile.display_name(), profile.email);
            }
            _ => println!("Not signed in."),
        },
        Command::Upload { paths } => {
            app.ensure_authenticated()?;
            app.uploads.handle_files(&paths).await;
            for item in app.uploads.items() {
                let size = humanize_bytes_binary!(item.size);
                match item.status {
                    UploadStatus::Success => {
                        let url = item.storage.map(|s| s.s3_url).unwrap_or_default();
                        println!("{} {} ({size}) -> {url}", "ok".green().bold(), item.filename);
                    }
                    UploadStatus::Error => {
                        let reason = item.error.unwrap_or_default();
                        println!("{} {} ({size}): {reason}", "failed".red().bold(), item.filename);
                    }
                    UploadStatus::Uploading => {
                        println!("{} {} ({size})", "pending".yellow(), item.filename);
                    }
                }
            }
        }
        Command::Species { refresh } => {
            app.ensure_authenticated()?;
            let species = app.search.species(refresh).await?;
            for name in &species {
                println!("{}", display_species(name));
            }
        }
        Command::Search { mode } => {
            app.ensure_authenticated()?;
            match mode {
                SearchMode::Tags { species, actions } => {
                    let results = app.search.search_by_tags(&species).await?;
                    show_and_act(&app, results, &species, actions).await?;
                }
                SearchMode::Counts { pairs, actions } => {
                    let pairs = parse_count_pairs(&pairs)?;
                    let species = pairs.keys().cloned().collect::<Vec<String>>();
                    let results = app.search.search_by_tag_counts(&pairs).await?;
                    show_and_act(&app, results, &species, actions).await?;
                }
                SearchMode::Thumbnail { input } => {
                    let matches = app.search.search_by_thumbnail(&input).await?;
                    if matches.is_empty() {
                        println!("No matching full-size image found.");
                    } else {
                        println!("{}", "Full-size image found".bold());
                        print!("{}", render_thumbnail_matches(&matches));
                    }
                }
            }
        }
        Command::Download { url, out, reveal } => {
            let filename = crate::utils::str_utils::filename_from_url(&url);
            match download_file(&url, &filename, &out, reveal).await {
                Ok(dest) => println!("Downloaded to {}", dest.display()),
                Err(e) => {
                    log::warn!("download failed: {e}");
                    println!("{}", manual_download_instructions(&url, &filename));
                }
            }
        }
        Command::Settings { action } => handle_settings(&app, action).await?,
    }
    Ok(())
}

async fn show_and_act(
    app: &App,
    results: Vec<crate::results::SearchResult>,
    species: &[String],
    actions: ResultActions,
) -> anyhow::Result<()> {
    let mut state = UiState::new();
    state.set_results(results);

    if state.results().is_empty() {
        println!("{}", no_results_message(species));
        return Ok(());
    }
    println!("Found {} files matching your criteria", state.results().len());

    state.select_indices(&actions.select)?;
    print!("{}", render_results(&state));

    let wants_bulk = !actions.add_tags.is_empty()
        || !actions.remove_tags.is_empty()
        || actions.delete
        || actions.download.is_some();
    if !wants_bulk {
        return Ok(());
    }
    let urls = state.selected_urls();
    if urls.is_empty() {
        return Err(BirdTagError::Validation("No files selected, pass --select".to_string()).into());
    }

    if !actions.add_tags.is_empty() {
        let tags = parse_tag_pairs(&actions.add_tags)?;
        let message = app.bulk.add_tags(&urls, &tags).await?;
        println!("{message}");
    }
    if !actions.remove_tags.is_empty() {
        let tags = parse_tag_pairs(&actions.remove_tags)?;
        let message = app.bulk.remove_tags(&urls, &tags).await?;
        println!("{message}");
    }
    if let Some(dir) = &actions.download {
        for result in state.selected_results() {
            match download_file(&result.download_url, &result.filename, dir, false).await {
                Ok(dest) => println!("Downloaded {}", dest.display()),
                Err(e) => {
                    log::warn!("download of {} failed: {e}", result.filename);
                    println!("{}", manual_download_instructions(&result.download_url, &result.filename));
                }
            }
        }
    }
    if actions.delete {
        let message = app.bulk.delete_files(&urls).await?;
        println!("{message}");
        state.clear_selection();
    }
    Ok(())
}

async fn handle_settings(app: &App, action: SettingsAction) -> anyhow::Result<()> {
    match action {
        SettingsAction::Show => {
            let preferences = app.settings.load_preferences();
            if preferences.is_empty() {
                println!("No notification preferences set.");
            } else {
                println!("{}", "Notification preferences".bold());
                for (species, enabled) in &preferences {
                    let mark = if *enabled { "on " } else { "off" };
                    println!("  {mark} {}", display_species(species));
                }
            }
            let profile = app.settings.load_profile();
            if !profile.email.is_empty() {
                println!("{}", "Profile".bold());
                println!("  {} {} <{}>", profile.given_name, profile.family_name, profile.email);
            }
        }
        SettingsAction::Notify { enable, disable } => {
            app.ensure_authenticated()?;
            if enable.is_empty() && disable.is_empty() {
                return Err(BirdTagError::Validation("Pass --enable and/or --disable".to_string()).into());
            }
            let mut preferences: NotificationPreferences = app.settings.load_preferences();
            for species in enable {
                preferences.insert(species.trim().to_lowercase(), true);
            }
            for species in disable {
                preferences.insert(species.trim().to_lowercase(), false);
            }
            app.settings.save_preferences(&preferences).await?;
            println!("{}", "Preferences saved successfully!".green());
        }
        SettingsAction::Reset => {
            app.settings.reset_preferences().await?;
            println!("Preferences reset to default.");
        }
        SettingsAction::Profile { given_name, family_name, email } => {
            let profile = LocalProfile { given_name, family_name, email };
            app.settings.update_profile(&profile)?;
            println!("{}", "Profile updated successfully!".green());
        }
        SettingsAction::Password { current, new, confirm } => {
            let notice = app.settings.change_password(&current, &new, &confirm)?;
            println!("{notice}");
        }
    }
    Ok(())
}

fn parse_tag_pairs(raw: &[String]) -> Result<Vec<(String, u32)>, BirdTagError> {
    raw.iter()
        .map(|entry| {
            let (species, count) = entry
                .split_once('=')
                .ok_or_else(|| BirdTagError::Validation(format!("Invalid tag format: {entry} (expected species=count)")))?;
            let count: u32 = count
                .trim()
                .parse()
                .map_err(|_| BirdTagError::Validation(format!("Invalid count in: {entry}")))?;
            Ok((species.trim().to_lowercase(), count))
        })
        .collect()
}

fn parse_count_pairs(raw: &[String]) -> Result<BTreeMap<String, u32>, BirdTagError> {
    Ok(parse_tag_pairs(raw)?.into_iter().collect())
}
