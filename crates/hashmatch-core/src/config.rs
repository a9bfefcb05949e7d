use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default upload ceiling: 10 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 << 20;

/// Global configuration loaded from `~/.config/hashmatch/config.toml`.
/// Any missing field falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashmatchConfig {
    /// Socket address the HTTP server binds to.
    pub listen_addr: String,
    /// Maximum size in bytes of a verification request body.
    pub max_upload_bytes: u64,
    /// Upper bound on the whole remote fetch (connect + headers + body).
    pub fetch_timeout_secs: u64,
    /// Upper bound on establishing the remote connection.
    pub connect_timeout_secs: u64,
    /// Directory holding `index.html` for the landing page.
    pub static_dir: PathBuf,
}

impl Default for HashmatchConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:5678".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            fetch_timeout_secs: 30,
            connect_timeout_secs: 15,
            static_dir: PathBuf::from("./static"),
        }
    }
}

impl HashmatchConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Ceiling formatted for humans, e.g. "10 MiB" or "1500 bytes".
    pub fn max_upload_display(&self) -> String {
        format_bytes(self.max_upload_bytes)
    }
}

pub(crate) fn format_bytes(n: u64) -> String {
    const MIB: u64 = 1 << 20;
    const KIB: u64 = 1 << 10;
    if n >= MIB && n % MIB == 0 {
        format!("{} MiB", n / MIB)
    } else if n >= KIB && n % KIB == 0 {
        format!("{} KiB", n / KIB)
    } else {
        format!("{} bytes", n)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("hashmatch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<HashmatchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = HashmatchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path. The file must exist.
pub fn load_from(path: &Path) -> Result<HashmatchConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: HashmatchConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    Ok(cfg)
}
