use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Allowed range for the execution-side concurrency limit.
pub const MIN_CONCURRENT_DOWNLOADS: u8 = 1;
pub const MAX_CONCURRENT_DOWNLOADS: u8 = 10;

/// Settings bundle carried by every download submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSettings {
    /// Destination directory on the service host.
    pub save_path: String,
    /// Quality selector ("best", "1080p", "720p", "480p").
    pub quality: String,
    pub video_format: String,
    pub audio_format: String,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    /// How many URLs the execution service may transfer at once (1-10).
    pub concurrent_downloads: u8,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            save_path: "media_download".to_string(),
            quality: "best".to_string(),
            video_format: "MP4".to_string(),
            audio_format: "MP3".to_string(),
            video_enabled: true,
            audio_enabled: true,
            concurrent_downloads: 5,
        }
    }
}

impl DownloadSettings {
    /// Concurrency clamped into the allowed range; user input outside
    /// [1,10] is never forwarded to the service.
    pub fn clamped_concurrency(&self) -> u8 {
        self.concurrent_downloads
            .clamp(MIN_CONCURRENT_DOWNLOADS, MAX_CONCURRENT_DOWNLOADS)
    }
}

fn default_service_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

/// Global configuration loaded from `~/.config/vget/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VgetConfig {
    /// Base URL of the local downloader service.
    #[serde(default = "default_service_url")]
    pub service_url: String,
    #[serde(default)]
    pub download: DownloadSettings,
}

impl Default for VgetConfig {
    fn default() -> Self {
        Self {
            service_url: default_service_url(),
            download: DownloadSettings::default(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("vget")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<VgetConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = VgetConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: VgetConfig = toml::from_str(&data)?;
    Ok(cfg)
}

/// Persist the configuration (e.g. after a directory-chooser update).
pub fn save(cfg: &VgetConfig) -> Result<()> {
    let path = config_path()?;
    let toml = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, toml)?;
    Ok(())
}
