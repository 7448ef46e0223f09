//! Per-source extraction rulesets.
//!
//! A ruleset says how to reach a source's results view for a query and how
//! to read each result node. The table is fixed at compile time and shared
//! read-only by every pipeline.

use crate::model::SourceId;
use crate::normalize::DecimalMark;

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36";

/// How the navigator gets from a search term to a results page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    /// Load `entry_url`, type the term into `input_selector` and submit.
    SearchBox {
        entry_url: &'static str,
        input_selector: &'static str,
    },
    /// Load a URL built from `template`.
    ///
    /// Placeholders: `{query}` is the percent-encoded term, `{plus}` joins the
    /// encoded words with `+`, `{slug}` joins them with `-`.
    QueryUrl { template: &'static str },
}

impl QueryStrategy {
    /// The first URL the navigator loads for `term`.
    pub fn start_url(&self, term: &str) -> String {
        match self {
            QueryStrategy::SearchBox { entry_url, .. } => entry_url.to_string(),
            QueryStrategy::QueryUrl { template } => expand_template(template, term),
        }
    }
}

pub fn expand_template(template: &str, term: &str) -> String {
    let words: Vec<String> = term
        .split_whitespace()
        .map(|w| urlencoding::encode(w).into_owned())
        .collect();

    template
        .replace("{query}", &urlencoding::encode(term.trim()))
        .replace("{plus}", &words.join("+"))
        .replace("{slug}", &words.join("-"))
}

/// Everything the navigator needs to know about a source.
#[derive(Debug, Clone, Copy)]
pub struct NavigationPlan {
    pub site: SourceId,
    pub strategy: QueryStrategy,
    /// Selector whose appearance means the view is ready for extraction
    pub ready_selector: &'static str,
    /// Scroll to the bottom in steps before extraction
    pub lazy_scroll: bool,
    pub user_agent: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read {
    /// Whitespace-collapsed text content
    Text,
    /// First non-empty attribute, in order, resolved against the page URL
    Url(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub selector: &'static str,
    pub read: Read,
}

impl FieldRule {
    pub const fn text(selector: &'static str) -> Self {
        Self {
            selector,
            read: Read::Text,
        }
    }

    pub const fn url(selector: &'static str, attrs: &'static [&'static str]) -> Self {
        Self {
            selector,
            read: Read::Url(attrs),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRules {
    pub link: FieldRule,
    pub title: FieldRule,
    pub image: FieldRule,
    pub price: FieldRule,
    pub rating: FieldRule,
    /// `None` when the source shows no count; listings come out unrated
    pub rating_count: Option<FieldRule>,
}

#[derive(Debug, Clone, Copy)]
pub struct Ruleset {
    pub navigation: NavigationPlan,
    /// One match per product, in document order
    pub item_selector: &'static str,
    pub fields: FieldRules,
    pub decimal_mark: DecimalMark,
}

impl Ruleset {
    pub fn site(&self) -> SourceId {
        self.navigation.site
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FilterRuleset {
    pub navigation: NavigationPlan,
    pub group_selector: &'static str,
    pub title_selector: &'static str,
    pub option_selector: &'static str,
    /// Groups from this title onwards are dropped
    pub terminal_title: &'static str,
    pub untitled_label: &'static str,
}

const HREF: &[&str] = &["href"];
const IMG_SRC: &[&str] = &["data-src", "src"];

/// Product sources in priority order.
pub static CATALOG: [Ruleset; 4] = [
    Ruleset {
        navigation: NavigationPlan {
            site: SourceId::MercadoLibre,
            strategy: QueryStrategy::QueryUrl {
                template: "https://listado.mercadolibre.com.co/{slug}#D[A:{query}]",
            },
            ready_selector: "li.ui-search-layout__item",
            lazy_scroll: false,
            user_agent: None,
        },
        item_selector: "li.ui-search-layout__item",
        fields: FieldRules {
            link: FieldRule::url(".poly-component__title a", HREF),
            title: FieldRule::text(".poly-component__title a"),
            image: FieldRule::url(".poly-card__portada img", IMG_SRC),
            price: FieldRule::text(".poly-price__current .andes-money-amount__fraction"),
            rating: FieldRule::text(".poly-reviews__rating"),
            rating_count: Some(FieldRule::text(".poly-reviews__total")),
        },
        decimal_mark: DecimalMark::Dot,
    },
    Ruleset {
        navigation: NavigationPlan {
            site: SourceId::Alkosto,
            strategy: QueryStrategy::SearchBox {
                entry_url: "https://www.alkosto.com",
                input_selector: "#autocomplete-0-input",
            },
            ready_selector: ".ais-InfiniteHits-item",
            lazy_scroll: true,
            user_agent: None,
        },
        item_selector: ".ais-InfiniteHits-item.product__item.js-product-item",
        fields: FieldRules {
            link: FieldRule::url("a.product__item__top__link", HREF),
            title: FieldRule::text(".product__item__top__title"),
            image: FieldRule::url(".product__item__information__image img", IMG_SRC),
            price: FieldRule::text(".product__price--discounts__price .price"),
            rating: FieldRule::text(".hit-stars .averageNumber"),
            rating_count: Some(FieldRule::text(".hit-stars .review")),
        },
        decimal_mark: DecimalMark::Dot,
    },
    Ruleset {
        navigation: NavigationPlan {
            site: SourceId::Amazon,
            strategy: QueryStrategy::SearchBox {
                entry_url: "https://www.amazon.com/",
                input_selector: "#twotabsearchtextbox",
            },
            ready_selector: "div[data-component-type=\"s-search-result\"]",
            lazy_scroll: false,
            user_agent: Some(DESKTOP_USER_AGENT),
        },
        item_selector: "div[data-component-type=\"s-search-result\"]",
        fields: FieldRules {
            link: FieldRule::url(".s-title-instructions-style a", HREF),
            title: FieldRule::text(".s-title-instructions-style a h2 span"),
            image: FieldRule::url("img.s-image", IMG_SRC),
            price: FieldRule::text(".a-price .a-offscreen"),
            rating: FieldRule::text(".a-icon-alt"),
            rating_count: Some(FieldRule::text(".s-csa-instrumentation-wrapper span")),
        },
        decimal_mark: DecimalMark::Dot,
    },
    Ruleset {
        navigation: NavigationPlan {
            site: SourceId::TauretComputadores,
            strategy: QueryStrategy::QueryUrl {
                template: "https://tauretcomputadores.com/search_product?product_search={plus}",
            },
            ready_selector: "li .card",
            lazy_scroll: false,
            user_agent: Some(DESKTOP_USER_AGENT),
        },
        item_selector: "li .card",
        fields: FieldRules {
            link: FieldRule::url(".imagen-container a", HREF),
            title: FieldRule::text(".name h2"),
            image: FieldRule::url(".imagen-container img", IMG_SRC),
            price: FieldRule::text(".all_price .price1"),
            rating: FieldRule::text(".all_star .skd"),
            rating_count: None,
        },
        decimal_mark: DecimalMark::Comma,
    },
];

/// Facet source for the filters entry point.
pub static FILTERS: FilterRuleset = FilterRuleset {
    navigation: NavigationPlan {
        site: SourceId::MercadoLibre,
        strategy: QueryStrategy::SearchBox {
            entry_url: "https://www.mercadolibre.com.co",
            input_selector: "input.nav-search-input",
        },
        ready_selector: "div.ui-search-filter-dl",
        lazy_scroll: false,
        user_agent: None,
    },
    group_selector: "div.ui-search-filter-dl",
    title_selector: "h3.ui-search-filter-dt-title",
    option_selector: "span.ui-search-filter-name",
    terminal_title: "Condición",
    untitled_label: "Sin título",
};

pub fn ruleset(site: SourceId) -> &'static Ruleset {
    match site {
        SourceId::MercadoLibre => &CATALOG[0],
        SourceId::Alkosto => &CATALOG[1],
        SourceId::Amazon => &CATALOG[2],
        SourceId::TauretComputadores => &CATALOG[3],
    }
}

/// Rulesets for `sites`, deduplicated and in catalog priority order.
pub fn enabled(sites: &[SourceId]) -> Vec<Ruleset> {
    CATALOG
        .iter()
        .filter(|r| sites.contains(&r.site()))
        .copied()
        .collect()
}
