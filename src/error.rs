//! Typed errors for the scraping pipelines.
//!
//! Navigation and extraction errors are scoped to a single source. The
//! orchestrator turns them into [`SourceFailure`] diagnostics instead of
//! letting them reach sibling pipelines.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::model::SourceId;

/// A source's results view could not be reached or never became ready.
#[derive(Debug, Clone, Error)]
#[error("{site}: {cause}")]
pub struct NavigationError {
    pub site: SourceId,
    pub cause: NavigationCause,
}

impl NavigationError {
    pub fn new(site: SourceId, cause: NavigationCause) -> Self {
        Self { site, cause }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.cause,
            NavigationCause::Timeout { .. } | NavigationCause::PageLoadTimeout { .. }
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum NavigationCause {
    /// The WebDriver server refused or failed to start a browser
    #[error("browser session could not be started: {0}")]
    Session(String),

    #[error("page {url} unreachable: {message}")]
    Unreachable { url: String, message: String },

    #[error("page {url} did not load within {waited:?}")]
    PageLoadTimeout { url: String, waited: Duration },

    #[error("search input `{selector}` not found")]
    SearchInputMissing { selector: String },

    #[error("could not submit search: {0}")]
    Interaction(String),

    /// Results selector never appeared within the bound
    #[error("`{selector}` did not appear within {waited:?}")]
    Timeout { selector: String, waited: Duration },

    #[error("in-page script failed: {0}")]
    Script(String),
}

/// The rendered page did not match a source's selectors.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    #[error("{site}: invalid selector `{selector}`: {message}")]
    InvalidSelector {
        site: SourceId,
        selector: String,
        message: String,
    },

    #[error("{site}: no nodes matched `{selector}`")]
    NoNodes { site: SourceId, selector: String },
}

/// A single field could not be turned into a typed value.
///
/// Never leaves the collector: the field falls back to its sentinel or the
/// record is skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("field is missing")]
    Missing,

    #[error("no digits in `{0}`")]
    NoDigits(String),

    #[error("`{0}` is not a number")]
    Unparseable(String),
}

/// Outcome of one Navigator → Collector pipeline.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("navigation failed: {0}")]
    Navigation(#[from] NavigationError),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Navigation(err) if err.is_timeout() => FailureKind::Timeout,
            PipelineError::Navigation(_) => FailureKind::Navigation,
            PipelineError::Extraction(_) => FailureKind::Extraction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Navigation,
    Timeout,
    Extraction,
    /// The pipeline task panicked or was cancelled
    Aborted,
}

/// Per-source diagnostic recorded by the orchestrator.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFailure {
    pub source_name: SourceId,
    pub kind: FailureKind,
    pub detail: String,
}

impl SourceFailure {
    pub fn from_pipeline(site: SourceId, err: &PipelineError) -> Self {
        Self {
            source_name: site,
            kind: err.kind(),
            detail: err.to_string(),
        }
    }

    pub fn aborted(site: SourceId, detail: impl Into<String>) -> Self {
        Self {
            source_name: site,
            kind: FailureKind::Aborted,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("no sources are enabled")]
    NoSources,

    #[error("every enabled source failed: {}", summarize(.failures))]
    AllSourcesFailed { failures: Vec<SourceFailure> },
}

#[derive(Debug, Clone, Error)]
pub enum FilterError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// The WebDriver server is not accepting sessions.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("WebDriver status request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("WebDriver not ready: {0}")]
    NotReady(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got `{value}`")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("unknown source `{0}` in SCRAPER_SOURCES")]
    UnknownSource(String),
}

fn summarize(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({:?}): {}", f.source_name, f.kind, f.detail))
        .collect::<Vec<_>>()
        .join("; ")
}
