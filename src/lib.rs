//! Product search across several e-commerce sites through headless Chrome.
//!
//! [`Scraper::scrape_products`] runs one navigate → collect pipeline per
//! enabled source and aggregates whatever succeeded.
//! [`Scraper::scrape_filters`] reads the facet groups of a single source.

pub mod collect;
pub mod config;
pub mod error;
pub mod model;
pub mod navigate;
pub mod normalize;
pub mod orchestrate;
pub mod ruleset;

pub use config::{BrowserSettings, ScraperConfig};
pub use error::{
    ExtractionError, FailureKind, FilterError, NavigationCause, NavigationError, ScrapeError,
    SourceFailure,
};
pub use model::{FilterFacet, ProductListing, Rated, ScrapeReport, SourceId};
pub use navigate::{BrowserDriver, BrowserSession, Navigator, ResultDocument, WebDriverNavigator};
pub use orchestrate::Scraper;
pub use ruleset::{NavigationPlan, Ruleset};
