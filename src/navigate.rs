//! Browser-driven navigation to a source's results view.
//!
//! Each call to [`Navigator::navigate`] owns exactly one [`BrowserSession`]
//! and releases it before returning, whatever the outcome.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thirtyfour::error::WebDriverErrorInner;
use thirtyfour::prelude::*;
use thirtyfour::{ChromeCapabilities, ChromiumLikeCapabilities};
use tokio::time::{sleep, timeout};
use url::Url;

use crate::config::BrowserSettings;
use crate::error::{NavigationCause, NavigationError, ProbeError};
use crate::model::SourceId;
use crate::ruleset::{NavigationPlan, QueryStrategy};

/// Snapshot of a rendered results page, ready for extraction.
#[derive(Debug, Clone)]
pub struct ResultDocument {
    pub site: SourceId,
    /// Page URL after navigation; relative links resolve against it
    pub url: Url,
    pub html: String,
}

impl ResultDocument {
    pub fn new(site: SourceId, url: Url, html: impl Into<String>) -> Self {
        Self {
            site,
            url,
            html: html.into(),
        }
    }
}

/// Loads a source's results view for a search term.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(
        &self,
        term: &str,
        plan: &NavigationPlan,
    ) -> Result<ResultDocument, NavigationError>;
}

/// [`Navigator`] backed by Chrome sessions on a WebDriver server.
#[derive(Debug, Clone)]
pub struct WebDriverNavigator {
    settings: BrowserSettings,
}

impl WebDriverNavigator {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    /// Asks the WebDriver server whether it can start new sessions.
    pub async fn check_ready(&self) -> Result<DriverStatus, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        let status_url = format!("{}/status", self.settings.webdriver_url.trim_end_matches('/'));

        let envelope: StatusEnvelope = client
            .get(&status_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if envelope.value.ready {
            tracing::debug!(url = %status_url, message = %envelope.value.message, "WebDriver ready");
            Ok(envelope.value)
        } else {
            Err(ProbeError::NotReady(envelope.value.message))
        }
    }
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    value: DriverStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DriverStatus {
    pub ready: bool,
    #[serde(default)]
    pub message: String,
}

#[async_trait]
impl Navigator for WebDriverNavigator {
    async fn navigate(
        &self,
        term: &str,
        plan: &NavigationPlan,
    ) -> Result<ResultDocument, NavigationError> {
        BrowserSession::open(&self.settings, plan)
            .await?
            .fetch(term, plan, &self.settings)
            .await
    }
}

/// The browser operations a navigation needs.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn open_url(&self, url: &str) -> WebDriverResult<()>;

    /// Number of elements currently matching the CSS `selector`.
    async fn count_matches(&self, selector: &str) -> WebDriverResult<usize>;

    /// Types `text` into the first match of `selector` and presses Enter.
    async fn submit_text(&self, selector: &str, text: &str) -> WebDriverResult<()>;

    /// Scrolls down by `px` and reports `(viewport bottom, document height)`.
    async fn scroll_by(&self, px: u32) -> WebDriverResult<(f64, f64)>;

    async fn page_source(&self) -> WebDriverResult<String>;

    async fn page_url(&self) -> WebDriverResult<Url>;

    async fn end_session(&self) -> WebDriverResult<()>;
}

const SCROLL_STEP_SCRIPT: &str = r#"
window.scrollBy(0, arguments[0]);
const reached = Math.ceil(window.scrollY + window.innerHeight);
const height = Math.max(document.body.scrollHeight, document.documentElement.scrollHeight);
return [reached, height];
"#;

#[async_trait]
impl BrowserDriver for WebDriver {
    async fn open_url(&self, url: &str) -> WebDriverResult<()> {
        self.goto(url).await
    }

    async fn count_matches(&self, selector: &str) -> WebDriverResult<usize> {
        Ok(self.find_all(By::Css(selector)).await?.len())
    }

    async fn submit_text(&self, selector: &str, text: &str) -> WebDriverResult<()> {
        let input = self.find(By::Css(selector)).await?;
        input.send_keys(text).await?;
        input.send_keys(Key::Enter).await
    }

    async fn scroll_by(&self, px: u32) -> WebDriverResult<(f64, f64)> {
        let ret = self
            .execute(SCROLL_STEP_SCRIPT, vec![serde_json::json!(px)])
            .await?;
        ret.convert()
    }

    async fn page_source(&self) -> WebDriverResult<String> {
        self.source().await
    }

    async fn page_url(&self) -> WebDriverResult<Url> {
        self.current_url().await
    }

    async fn end_session(&self) -> WebDriverResult<()> {
        // Quitting is idempotent across clones of the same session.
        self.clone().quit().await
    }
}

/// One isolated browser session, exclusively owned by a single pipeline.
///
/// [`BrowserSession::fetch`] releases it on every exit path. If the session
/// is dropped instead (panic, cancelled task), the driver quits it on drop.
pub struct BrowserSession<D: BrowserDriver = WebDriver> {
    site: SourceId,
    driver: D,
}

impl BrowserSession<WebDriver> {
    pub async fn open(
        settings: &BrowserSettings,
        plan: &NavigationPlan,
    ) -> Result<Self, NavigationError> {
        let site = plan.site;
        let session_err = |e: WebDriverError| {
            NavigationError::new(site, NavigationCause::Session(e.to_string()))
        };

        let caps = capabilities(settings, plan.user_agent).map_err(session_err)?;
        let driver = WebDriver::new(settings.webdriver_url.as_str(), caps)
            .await
            .map_err(session_err)?;
        let session = Self::new(site, driver);
        tracing::debug!(site = %site, "browser session opened");

        if let Err(e) = session
            .driver
            .set_page_load_timeout(settings.page_load_timeout)
            .await
        {
            session.close().await;
            return Err(session_err(e));
        }
        Ok(session)
    }
}

impl<D: BrowserDriver> BrowserSession<D> {
    pub fn new(site: SourceId, driver: D) -> Self {
        Self { site, driver }
    }

    /// Loads the results view for `term`, then releases the session
    /// whatever the outcome.
    pub async fn fetch(
        self,
        term: &str,
        plan: &NavigationPlan,
        settings: &BrowserSettings,
    ) -> Result<ResultDocument, NavigationError> {
        let outcome = self.load_results(term, plan, settings).await;
        self.close().await;
        outcome
    }

    pub async fn close(self) {
        let site = self.site;
        match self.driver.end_session().await {
            Ok(()) => tracing::debug!(site = %site, "browser session released"),
            Err(err) => tracing::warn!(site = %site, error = %err, "failed to release browser session"),
        }
    }

    async fn load_results(
        &self,
        term: &str,
        plan: &NavigationPlan,
        settings: &BrowserSettings,
    ) -> Result<ResultDocument, NavigationError> {
        let fail = |cause: NavigationCause| NavigationError::new(self.site, cause);

        let start_url = plan.strategy.start_url(term);
        tracing::info!(site = %self.site, url = %start_url, "loading");
        self.driver.open_url(&start_url).await.map_err(|e| {
            let cause = if is_timeout(&e) {
                NavigationCause::PageLoadTimeout {
                    url: start_url.clone(),
                    waited: settings.page_load_timeout,
                }
            } else {
                NavigationCause::Unreachable {
                    url: start_url.clone(),
                    message: e.to_string(),
                }
            };
            fail(cause)
        })?;

        if let QueryStrategy::SearchBox { input_selector, .. } = plan.strategy {
            self.submit_search(input_selector, term, settings)
                .await
                .map_err(fail)?;
        }

        self.wait_for(plan.ready_selector, settings)
            .await
            .map_err(fail)?;

        if plan.lazy_scroll {
            self.scroll_to_end(settings).await.map_err(fail)?;
        }

        let script_err = |e: WebDriverError| fail(NavigationCause::Script(e.to_string()));
        let html = self.driver.page_source().await.map_err(script_err)?;
        let url = self.driver.page_url().await.map_err(script_err)?;

        Ok(ResultDocument::new(self.site, url, html))
    }

    async fn submit_search(
        &self,
        input_selector: &str,
        term: &str,
        settings: &BrowserSettings,
    ) -> Result<(), NavigationCause> {
        self.wait_for(input_selector, settings)
            .await
            .map_err(|_| NavigationCause::SearchInputMissing {
                selector: input_selector.to_string(),
            })?;

        self.driver
            .submit_text(input_selector, term)
            .await
            .map_err(|e| NavigationCause::Interaction(e.to_string()))?;
        tracing::debug!(site = %self.site, "search submitted");
        Ok(())
    }

    /// Polls until `selector` matches at least one element, bounded by the
    /// configured results timeout.
    async fn wait_for(
        &self,
        selector: &str,
        settings: &BrowserSettings,
    ) -> Result<(), NavigationCause> {
        let poll = async {
            loop {
                match self.driver.count_matches(selector).await {
                    Ok(found) if found > 0 => return,
                    _ => sleep(settings.poll_interval).await,
                }
            }
        };

        timeout(settings.results_timeout, poll)
            .await
            .map_err(|_| NavigationCause::Timeout {
                selector: selector.to_string(),
                waited: settings.results_timeout,
            })
    }

    /// Scrolls in steps until the viewport bottom reaches the document
    /// height and stays there for one settle period.
    async fn scroll_to_end(&self, settings: &BrowserSettings) -> Result<(), NavigationCause> {
        let mut at_bottom = false;

        for steps in 0..settings.scroll_max_steps {
            let (reached, height) = self
                .driver
                .scroll_by(settings.scroll_step_px)
                .await
                .map_err(|e| NavigationCause::Script(e.to_string()))?;

            if reached >= height {
                if at_bottom {
                    tracing::debug!(site = %self.site, steps, height, "scrolled to end");
                    return Ok(());
                }
                at_bottom = true;
            } else {
                at_bottom = false;
            }
            sleep(settings.scroll_settle).await;
        }

        tracing::debug!(
            site = %self.site,
            max_steps = settings.scroll_max_steps,
            "scroll step cap reached"
        );
        Ok(())
    }
}

/// Page-load limits surface as a WebDriver `timeout` error or a client-side one.
fn is_timeout(err: &WebDriverError) -> bool {
    matches!(
        err.as_inner(),
        WebDriverErrorInner::Timeout(_) | WebDriverErrorInner::WebDriverTimeout(_)
    )
}

fn capabilities(
    settings: &BrowserSettings,
    user_agent: Option<&str>,
) -> WebDriverResult<ChromeCapabilities> {
    let mut caps = DesiredCapabilities::chrome();
    if settings.headless {
        caps.set_headless()?;
    }
    caps.set_no_sandbox()?;
    caps.set_disable_gpu()?;
    caps.set_disable_dev_shm_usage()?;
    caps.add_arg("--disable-software-rasterizer")?;
    if let Some(agent) = user_agent {
        caps.add_arg(&format!("--user-agent={agent}"))?;
    }
    if let Some(binary) = &settings.chrome_binary {
        caps.set_binary(binary)?;
    }
    Ok(caps)
}
