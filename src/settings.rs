use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

const DEFAULT_START_URL: &str = "https://aca-prod.accela.com/MISSOULA/Cap/CapHome.aspx?module=Building&TabName=Building&TabList=Home%7c0%7cBuilding%7c1%7cFire%7c2%7cEngineering%7c3%7cLicenses%7c4%7cPlanning%7c5%7cCurrentTabIndex%7c1";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36";

/// Runtime settings: defaults, then `permits.toml`, then `PERMITS_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub start_url: String,
    /// MM/DD/YYYY, as the portal's search form expects.
    pub search_start_date: String,
    /// Defaults to today when unset.
    #[serde(default)]
    pub search_end_date: Option<String>,
    pub page_size: u32,
    pub concurrency: usize,
    pub user_agent: String,
}

impl Settings {
    pub fn load() -> Result<Self> {
        Config::builder()
            .set_default("db_path", "data/permits.sqlite")?
            .set_default("start_url", DEFAULT_START_URL)?
            .set_default("search_start_date", "01/01/1900")?
            .set_default("page_size", 5)?
            .set_default("concurrency", 10)?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .add_source(File::with_name("permits").required(false))
            .add_source(Environment::with_prefix("PERMITS"))
            .build()
            .context("Failed to build settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn end_date(&self) -> String {
        self.search_end_date
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%m/%d/%Y").to_string())
    }
}
