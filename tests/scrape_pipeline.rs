use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tienda_scraper::ruleset::{self, CATALOG, FILTERS, FilterRuleset};
use tienda_scraper::{
    FailureKind, FilterError, NavigationCause, NavigationError, NavigationPlan, Navigator,
    ResultDocument, ScrapeError, Scraper, SourceId,
};
use url::Url;

enum Script {
    Page { url: &'static str, body: String, delay: Duration },
    Fail(NavigationCause),
    Panic,
}

/// Navigator that replays canned pages per source.
#[derive(Default)]
struct ScriptedNavigator {
    scripts: HashMap<SourceId, Script>,
    calls: Mutex<Vec<SourceId>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pages_served: AtomicUsize,
}

impl ScriptedNavigator {
    fn page(mut self, site: SourceId, url: &'static str, body: String) -> Self {
        self.scripts.insert(
            site,
            Script::Page {
                url,
                body,
                delay: Duration::from_millis(20),
            },
        );
        self
    }

    fn slow_page(mut self, site: SourceId, url: &'static str, body: String, delay: Duration) -> Self {
        self.scripts.insert(site, Script::Page { url, body, delay });
        self
    }

    fn failing(mut self, site: SourceId, cause: NavigationCause) -> Self {
        self.scripts.insert(site, Script::Fail(cause));
        self
    }

    fn panicking(mut self, site: SourceId) -> Self {
        self.scripts.insert(site, Script::Panic);
        self
    }

    fn calls(&self) -> Vec<SourceId> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Navigator for ScriptedNavigator {
    async fn navigate(
        &self,
        _term: &str,
        plan: &NavigationPlan,
    ) -> Result<ResultDocument, NavigationError> {
        self.calls.lock().unwrap().push(plan.site);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let outcome = match self.scripts.get(&plan.site) {
            Some(Script::Page { url, body, delay }) => {
                tokio::time::sleep(*delay).await;
                self.pages_served.fetch_add(1, Ordering::SeqCst);
                Ok(ResultDocument::new(
                    plan.site,
                    Url::parse(url).unwrap(),
                    format!("<html><body>{body}</body></html>"),
                ))
            }
            Some(Script::Fail(cause)) => Err(NavigationError::new(plan.site, cause.clone())),
            Some(Script::Panic) => panic!("browser crashed"),
            None => Err(NavigationError::new(
                plan.site,
                NavigationCause::Session("no script".into()),
            )),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn ml_items(count: usize) -> String {
    (0..count)
        .map(|n| {
            format!(
                r#"<li class="ui-search-layout__item">
                     <div class="poly-card__portada"><img src="https://http2.mlstatic.com/{n}.webp"></div>
                     <h3 class="poly-component__title"><a href="/MCO-{n}">Celular {n}</a></h3>
                     <div class="poly-price__current"><span class="andes-money-amount__fraction">1.{n}00.000</span></div>
                   </li>"#
            )
        })
        .collect()
}

fn tauret_items(count: usize) -> String {
    let cards: String = (0..count)
        .map(|n| {
            format!(
                r#"<li><div class="card">
                     <div class="imagen-container"><a href="/product/{n}"><img src="/img/{n}.png"></a></div>
                     <div class="name"><h2>Disco SSD {n}</h2></div>
                     <div class="all_price"><span class="price1">$ 25{n}.000</span></div>
                   </div></li>"#
            )
        })
        .collect();
    format!("<ul>{cards}</ul>")
}

const ML_URL: &str = "https://listado.mercadolibre.com.co/celular";
const TAURET_URL: &str = "https://tauretcomputadores.com/search_product?product_search=ssd";

fn timeout_cause() -> NavigationCause {
    NavigationCause::Timeout {
        selector: "div[data-component-type=\"s-search-result\"]".into(),
        waited: Duration::from_secs(30),
    }
}

fn sources(sites: &[SourceId]) -> Vec<tienda_scraper::Ruleset> {
    ruleset::enabled(sites)
}

#[tokio::test]
async fn healthy_source_survives_a_timed_out_one() {
    let navigator = ScriptedNavigator::default()
        .page(SourceId::MercadoLibre, ML_URL, ml_items(3))
        .failing(SourceId::Amazon, timeout_cause());
    let scraper = Scraper::new(
        navigator,
        sources(&[SourceId::MercadoLibre, SourceId::Amazon]),
    );

    let report = scraper.scrape_products("celular", 5).await.unwrap();

    assert_eq!(report.listings.len(), 3);
    assert!(report.listings.iter().all(|l| l.source_name == SourceId::MercadoLibre));
    assert!(report.is_partial());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source_name, SourceId::Amazon);
    assert_eq!(report.failures[0].kind, FailureKind::Timeout);
}

#[tokio::test]
async fn every_source_failing_is_an_error_with_diagnostics() {
    let navigator = ScriptedNavigator::default()
        .failing(SourceId::Amazon, timeout_cause())
        .failing(
            SourceId::Alkosto,
            NavigationCause::SearchInputMissing {
                selector: "#autocomplete-0-input".into(),
            },
        );
    let scraper = Scraper::new(navigator, sources(&[SourceId::Alkosto, SourceId::Amazon]));

    let err = scraper.scrape_products("nevera", 5).await.unwrap_err();

    let ScrapeError::AllSourcesFailed { failures } = err else {
        panic!("expected every source to fail");
    };
    let kinds: Vec<(SourceId, FailureKind)> =
        failures.iter().map(|f| (f.source_name, f.kind)).collect();
    assert_eq!(
        kinds,
        [
            (SourceId::Alkosto, FailureKind::Navigation),
            (SourceId::Amazon, FailureKind::Timeout),
        ]
    );
}

#[tokio::test]
async fn listings_are_bounded_and_grouped_in_priority_order() {
    // The higher priority source finishes last; order must not depend on it.
    let navigator = ScriptedNavigator::default()
        .slow_page(
            SourceId::MercadoLibre,
            ML_URL,
            ml_items(7),
            Duration::from_millis(80),
        )
        .page(SourceId::TauretComputadores, TAURET_URL, tauret_items(7));
    let scraper = Scraper::new(
        navigator,
        sources(&[SourceId::TauretComputadores, SourceId::MercadoLibre]),
    );

    let amount = 4;
    let report = scraper.scrape_products("ssd", amount).await.unwrap();

    assert!(report.listings.len() <= amount * 2);
    let ids: Vec<&str> = report.listings.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(
        ids,
        [
            "mercadolibre-0",
            "mercadolibre-1",
            "mercadolibre-2",
            "mercadolibre-3",
            "tauret-0",
            "tauret-1",
            "tauret-2",
            "tauret-3",
        ]
    );

    let first_tauret = report
        .listings_from(SourceId::TauretComputadores)
        .next()
        .unwrap();
    assert_eq!(
        first_tauret.purchase_link,
        "https://tauretcomputadores.com/product/0"
    );
    assert_eq!(first_tauret.image_url, "https://tauretcomputadores.com/img/0.png");
    assert_eq!(first_tauret.price, 250_000);
}

#[tokio::test]
async fn every_emitted_listing_has_required_fields() {
    let navigator = ScriptedNavigator::default()
        .page(SourceId::MercadoLibre, ML_URL, ml_items(6))
        .page(SourceId::TauretComputadores, TAURET_URL, tauret_items(6));
    let scraper = Scraper::new(
        navigator,
        sources(&[SourceId::MercadoLibre, SourceId::TauretComputadores]),
    );

    let report = scraper.scrape_products("ssd", 10).await.unwrap();

    assert_eq!(report.listings.len(), 12);
    for listing in &report.listings {
        assert!(listing.purchase_link.starts_with("https://"));
        assert!(!listing.title.is_empty());
        assert!(listing.image_url.starts_with("https://"));
        assert!(listing.price > 0);
    }
}

#[tokio::test]
async fn pipelines_run_concurrently() {
    let navigator = ScriptedNavigator::default()
        .slow_page(SourceId::MercadoLibre, ML_URL, ml_items(2), Duration::from_millis(100))
        .slow_page(
            SourceId::TauretComputadores,
            TAURET_URL,
            tauret_items(2),
            Duration::from_millis(100),
        );
    let scraper = Scraper::new(
        navigator,
        sources(&[SourceId::MercadoLibre, SourceId::TauretComputadores]),
    );

    scraper.scrape_products("ssd", 2).await.unwrap();

    assert_eq!(scraper.navigator().max_in_flight.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dropping_a_search_cancels_its_pipelines() {
    let navigator = ScriptedNavigator::default()
        .slow_page(SourceId::MercadoLibre, ML_URL, ml_items(2), Duration::from_millis(200))
        .slow_page(
            SourceId::TauretComputadores,
            TAURET_URL,
            tauret_items(2),
            Duration::from_millis(200),
        );
    let scraper = Scraper::new(
        navigator,
        sources(&[SourceId::MercadoLibre, SourceId::TauretComputadores]),
    );

    let cut_short =
        tokio::time::timeout(Duration::from_millis(50), scraper.scrape_products("ssd", 2)).await;
    assert!(cut_short.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(scraper.navigator().calls().len(), 2);
    assert_eq!(scraper.navigator().pages_served.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn panicking_pipeline_is_isolated() {
    let navigator = ScriptedNavigator::default()
        .page(SourceId::MercadoLibre, ML_URL, ml_items(2))
        .panicking(SourceId::Alkosto);
    let scraper = Scraper::new(
        navigator,
        sources(&[SourceId::MercadoLibre, SourceId::Alkosto]),
    );

    let report = scraper.scrape_products("celular", 5).await.unwrap();

    assert_eq!(report.listings.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].source_name, SourceId::Alkosto);
    assert_eq!(report.failures[0].kind, FailureKind::Aborted);
}

#[tokio::test]
async fn selector_mismatch_is_an_extraction_failure() {
    let navigator = ScriptedNavigator::default()
        .page(SourceId::MercadoLibre, ML_URL, ml_items(1))
        .page(
            SourceId::TauretComputadores,
            TAURET_URL,
            "<p>Página en mantenimiento</p>".to_string(),
        );
    let scraper = Scraper::new(
        navigator,
        sources(&[SourceId::MercadoLibre, SourceId::TauretComputadores]),
    );

    let report = scraper.scrape_products("ssd", 5).await.unwrap();

    assert_eq!(report.listings.len(), 1);
    assert_eq!(report.failures[0].source_name, SourceId::TauretComputadores);
    assert_eq!(report.failures[0].kind, FailureKind::Extraction);
}

#[tokio::test]
async fn source_with_only_invalid_nodes_succeeds_empty() {
    let priceless = r#"<li class="ui-search-layout__item">
                         <div class="poly-card__portada"><img src="https://http2.mlstatic.com/x.webp"></div>
                         <h3 class="poly-component__title"><a href="/MCO-x">Sin precio</a></h3>
                       </li>"#;
    let navigator = ScriptedNavigator::default()
        .page(SourceId::MercadoLibre, ML_URL, priceless.to_string());
    let scraper = Scraper::new(navigator, sources(&[SourceId::MercadoLibre]));

    let report = scraper.scrape_products("celular", 5).await.unwrap();

    assert!(report.listings.is_empty());
    assert!(report.failures.is_empty());
    assert_eq!(report.per_source[0].listings, 0);
}

#[tokio::test]
async fn invalid_requests_never_start_a_browser() {
    let scraper = Scraper::new(
        ScriptedNavigator::default(),
        sources(&[SourceId::MercadoLibre]),
    );

    assert!(matches!(
        scraper.scrape_products("   ", 5).await,
        Err(ScrapeError::InvalidRequest { .. })
    ));
    assert!(matches!(
        scraper.scrape_products("celular", 0).await,
        Err(ScrapeError::InvalidRequest { .. })
    ));
    assert!(matches!(
        scraper.scrape_filters("").await,
        Err(FilterError::InvalidRequest { .. })
    ));
    assert!(scraper.navigator().calls().is_empty());

    let empty = Scraper::new(ScriptedNavigator::default(), Vec::new());
    assert!(matches!(
        empty.scrape_products("celular", 5).await,
        Err(ScrapeError::NoSources)
    ));
}

#[tokio::test]
async fn catalog_sources_are_all_scheduled() {
    let scraper = Scraper::new(ScriptedNavigator::default(), CATALOG.to_vec());

    let err = scraper.scrape_products("celular", 1).await.unwrap_err();

    assert!(matches!(err, ScrapeError::AllSourcesFailed { ref failures } if failures.len() == 4));
    let mut called = scraper.navigator().calls();
    called.sort();
    assert_eq!(called, SourceId::ALL);
}

fn facet_groups(titles: &[&str]) -> String {
    titles
        .iter()
        .map(|title| {
            format!(
                r#"<div class="ui-search-filter-dl">
                     <h3 class="ui-search-filter-dt-title">{title}</h3>
                     <ul><li><span class="ui-search-filter-name">{title} A</span></li>
                         <li><span class="ui-search-filter-name">{title} B</span></li></ul>
                   </div>"#
            )
        })
        .collect()
}

#[tokio::test]
async fn filters_stop_at_condition_facet() {
    let navigator = ScriptedNavigator::default().page(
        SourceId::MercadoLibre,
        ML_URL,
        facet_groups(&["Brand", "Price", "Condición", "Seller"]),
    );
    let scraper = Scraper::new(navigator, Vec::new());

    let facets = scraper.scrape_filters("celular").await.unwrap();

    let titles: Vec<&str> = facets.iter().map(|f| f.title.as_str()).collect();
    assert_eq!(titles, ["Brand", "Price"]);
    assert_eq!(facets[0].options, ["Brand A", "Brand B"]);
}

#[tokio::test]
async fn filters_honor_a_custom_terminal_facet() {
    let navigator = ScriptedNavigator::default().page(
        SourceId::MercadoLibre,
        ML_URL,
        facet_groups(&["Brand", "Price", "Condición", "Seller"]),
    );
    let scraper = Scraper::new(navigator, Vec::new()).with_filters(FilterRuleset {
        terminal_title: "Price",
        ..FILTERS
    });

    let facets = scraper.scrape_filters("celular").await.unwrap();

    let titles: Vec<&str> = facets.iter().map(|f| f.title.as_str()).collect();
    assert_eq!(titles, ["Brand"]);
}

#[tokio::test]
async fn filter_navigation_errors_propagate() {
    let navigator = ScriptedNavigator::default().failing(
        SourceId::MercadoLibre,
        NavigationCause::Unreachable {
            url: "https://www.mercadolibre.com.co".into(),
            message: "connection reset".into(),
        },
    );
    let scraper = Scraper::new(navigator, Vec::new());

    let err = scraper.scrape_filters("celular").await.unwrap_err();

    assert!(matches!(err, FilterError::Navigation(ref e) if e.site == SourceId::MercadoLibre));
}
