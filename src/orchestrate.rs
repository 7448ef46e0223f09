//! Concurrent per-source pipelines with isolated failures.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;

use crate::collect;
use crate::config::ScraperConfig;
use crate::error::{FilterError, PipelineError, ScrapeError, SourceFailure};
use crate::model::{FilterFacet, ProductListing, ScrapeReport, SourceCount, SourceId};
use crate::navigate::{Navigator, WebDriverNavigator};
use crate::ruleset::{self, FilterRuleset, Ruleset};

/// Entry point for product and filter searches.
///
/// Holds the enabled rulesets in priority order and a navigator shared by
/// every pipeline. Each pipeline still opens its own browser session.
pub struct Scraper<N = WebDriverNavigator> {
    navigator: Arc<N>,
    sources: Vec<Ruleset>,
    filters: FilterRuleset,
}

impl Scraper<WebDriverNavigator> {
    pub fn from_config(config: &ScraperConfig) -> Self {
        Scraper::new(
            WebDriverNavigator::new(config.browser.clone()),
            ruleset::enabled(&config.sources),
        )
    }
}

impl<N: Navigator + 'static> Scraper<N> {
    /// `sources` are run and reported in the order given.
    pub fn new(navigator: N, sources: Vec<Ruleset>) -> Self {
        Self {
            navigator: Arc::new(navigator),
            sources,
            filters: ruleset::FILTERS,
        }
    }

    pub fn with_filters(mut self, filters: FilterRuleset) -> Self {
        self.filters = filters;
        self
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn enabled_sources(&self) -> Vec<SourceId> {
        self.sources.iter().map(Ruleset::site).collect()
    }

    /// Runs one pipeline per enabled source and concatenates the listings in
    /// source order. Fails only when every source failed.
    pub async fn scrape_products(
        &self,
        term: &str,
        amount: usize,
    ) -> Result<ScrapeReport, ScrapeError> {
        let term = validate_term(term).map_err(|reason| ScrapeError::InvalidRequest { reason })?;
        if amount == 0 {
            return Err(ScrapeError::InvalidRequest {
                reason: "amount must be positive".to_string(),
            });
        }
        if self.sources.is_empty() {
            return Err(ScrapeError::NoSources);
        }

        tracing::info!(term, amount, sources = self.sources.len(), "scraping products");

        // Dropping the set aborts every pipeline still running.
        let mut tasks = JoinSet::new();
        let mut slots = HashMap::new();
        for (slot, rules) in self.sources.iter().copied().enumerate() {
            let navigator = Arc::clone(&self.navigator);
            let term = term.to_string();
            let handle = tasks.spawn(async move {
                (slot, run_pipeline(navigator.as_ref(), &term, &rules, amount).await)
            });
            slots.insert(handle.id(), slot);
        }

        let mut outcomes: Vec<Option<Result<Vec<ProductListing>, SourceFailure>>> =
            self.sources.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((slot, outcome)) => {
                    let site = self.sources[slot].site();
                    outcomes[slot] = Some(outcome.map_err(|err| {
                        tracing::warn!(site = %site, error = %err, "source failed");
                        SourceFailure::from_pipeline(site, &err)
                    }));
                }
                Err(join_err) => {
                    if let Some(&slot) = slots.get(&join_err.id()) {
                        let site = self.sources[slot].site();
                        tracing::warn!(site = %site, error = %join_err, "source task aborted");
                        let failure = SourceFailure::aborted(site, join_err.to_string());
                        outcomes[slot] = Some(Err(failure));
                    }
                }
            }
        }

        let mut listings = Vec::new();
        let mut per_source = Vec::new();
        let mut failures = Vec::new();

        // Aggregate in source order, whatever order the tasks finished in.
        for (rules, outcome) in self.sources.iter().zip(outcomes) {
            let site = rules.site();
            match outcome {
                Some(Ok(found)) => {
                    per_source.push(SourceCount {
                        source_name: site,
                        listings: found.len(),
                    });
                    listings.extend(found);
                }
                Some(Err(failure)) => failures.push(failure),
                None => failures.push(SourceFailure::aborted(site, "task never reported")),
            }
        }

        if per_source.is_empty() {
            return Err(ScrapeError::AllSourcesFailed { failures });
        }

        tracing::info!(
            listings = listings.len(),
            failed = failures.len(),
            "scrape finished"
        );
        Ok(ScrapeReport {
            search_term: term.to_string(),
            listings,
            per_source,
            failures,
            scraped_at: Utc::now(),
        })
    }

    /// Facet groups for `term` from the filter source.
    pub async fn scrape_filters(&self, term: &str) -> Result<Vec<FilterFacet>, FilterError> {
        let term = validate_term(term).map_err(|reason| FilterError::InvalidRequest { reason })?;
        tracing::info!(term, site = %self.filters.navigation.site, "scraping filters");
        let doc = self.navigator.navigate(term, &self.filters.navigation).await?;
        Ok(collect::facets(&doc, &self.filters)?)
    }
}

async fn run_pipeline<N: Navigator + ?Sized>(
    navigator: &N,
    term: &str,
    rules: &Ruleset,
    amount: usize,
) -> Result<Vec<ProductListing>, PipelineError> {
    tracing::info!(site = %rules.site(), term, amount, "pipeline started");
    let doc = navigator.navigate(term, &rules.navigation).await?;
    Ok(collect::collect(&doc, rules, amount)?)
}

fn validate_term(term: &str) -> Result<&str, String> {
    let trimmed = term.trim();
    if trimmed.is_empty() {
        Err("search term must not be empty".to_string())
    } else {
        Ok(trimmed)
    }
}
