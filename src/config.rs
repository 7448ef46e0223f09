use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::ConfigError;
use crate::model::SourceId;

/// How browser sessions are started and how long they may wait.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub headless: bool,
    pub chrome_binary: Option<String>,
    pub page_load_timeout: Duration,
    /// Bound on waiting for the search input or results selector
    pub results_timeout: Duration,
    pub poll_interval: Duration,
    pub scroll_step_px: u32,
    pub scroll_settle: Duration,
    pub scroll_max_steps: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            chrome_binary: None,
            page_load_timeout: Duration::from_secs(60),
            results_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            scroll_step_px: 800,
            scroll_settle: Duration::from_millis(300),
            scroll_max_steps: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    pub browser: BrowserSettings,
    pub sources: Vec<SourceId>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            browser: BrowserSettings::default(),
            sources: SourceId::ALL.to_vec(),
        }
    }
}

impl ScraperConfig {
    /// Load configuration from environment variables, reading `.env` first
    /// when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ScraperConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = BrowserSettings::default();
        let browser = BrowserSettings {
            webdriver_url: lookup("WEBDRIVER_URL").unwrap_or(defaults.webdriver_url),
            headless: parse_or(&lookup, "SCRAPER_HEADLESS", "true or false", defaults.headless)?,
            chrome_binary: lookup("CHROME_BINARY").filter(|v| !v.trim().is_empty()),
            page_load_timeout: secs_or(
                &lookup,
                "SCRAPER_PAGE_LOAD_TIMEOUT_SECS",
                defaults.page_load_timeout,
            )?,
            results_timeout: secs_or(
                &lookup,
                "SCRAPER_RESULTS_TIMEOUT_SECS",
                defaults.results_timeout,
            )?,
            poll_interval: millis_or(&lookup, "SCRAPER_POLL_INTERVAL_MS", defaults.poll_interval)?,
            scroll_step_px: parse_or(
                &lookup,
                "SCRAPER_SCROLL_STEP_PX",
                "a pixel count",
                defaults.scroll_step_px,
            )?,
            scroll_settle: millis_or(&lookup, "SCRAPER_SCROLL_SETTLE_MS", defaults.scroll_settle)?,
            scroll_max_steps: parse_or(
                &lookup,
                "SCRAPER_SCROLL_MAX_STEPS",
                "a step count",
                defaults.scroll_max_steps,
            )?,
        };

        let sources = match lookup("SCRAPER_SOURCES") {
            Some(list) if !list.trim().is_empty() => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(SourceId::from_str)
                .collect::<Result<Vec<_>, _>>()?,
            _ => SourceId::ALL.to_vec(),
        };

        Ok(Self { browser, sources })
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, expected: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value,
        }),
    }
}

fn secs_or<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, var, "a number of seconds", default.as_secs()).map(Duration::from_secs)
}

fn millis_or<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let default = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(lookup, var, "a number of milliseconds", default).map(Duration::from_millis)
}
