use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

fn default_port() -> u16 {
    groundlift_core::DEFAULT_PORT
}

fn default_downloads_dir() -> String {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .map(|p| p.join("GroundLift").to_string_lossy().to_string())
        .unwrap_or_else(|| "./downloads".to_string())
}

#[derive(Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: String,
    pub hostname: Option<String>,
}

impl Config {
    /// Load `groundlift.toml` from the current directory, writing a default
    /// one on first run rather than failing (unlike the server/client
    /// subcommands, there is nothing the user must fill in by hand here).
    pub fn load() -> Result<Self> {
        let path = PathBuf::from("groundlift.toml");
        if !path.exists() {
            let template = format!(
                "# groundlift configuration\nport = {}\ndownloads_dir = \"{}\"\n# hostname = \"my-computer\"\n",
                default_port(),
                default_downloads_dir(),
            );
            fs::write(&path, template).context("writing default groundlift.toml")?;
        }
        let content = fs::read_to_string(&path).context("reading groundlift.toml")?;
        let cfg: Config = toml::from_str(&content).context("parsing groundlift.toml")?;
        Ok(cfg)
    }

    pub fn resolved_hostname(&self) -> String {
        self.hostname.clone().unwrap_or_else(|| {
            hostname_or_default()
        })
    }
}

fn hostname_or_default() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "groundlift-host".to_string())
}
