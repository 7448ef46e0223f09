use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::{ConfigError, SourceFailure};

/// The e-commerce sites a pipeline can run against, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    MercadoLibre,
    Alkosto,
    Amazon,
    TauretComputadores,
}

impl SourceId {
    pub const ALL: [SourceId; 4] = [
        SourceId::MercadoLibre,
        SourceId::Alkosto,
        SourceId::Amazon,
        SourceId::TauretComputadores,
    ];

    /// Short lowercase key used in configuration and listing ids.
    pub fn key(self) -> &'static str {
        match self {
            SourceId::MercadoLibre => "mercadolibre",
            SourceId::Alkosto => "alkosto",
            SourceId::Amazon => "amazon",
            SourceId::TauretComputadores => "tauret",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SourceId::MercadoLibre => "Mercado Libre",
            SourceId::Alkosto => "Alkosto",
            SourceId::Amazon => "Amazon",
            SourceId::TauretComputadores => "Tauret Computadores",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for SourceId {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        SourceId::ALL
            .into_iter()
            .find(|id| id.key() == wanted)
            .ok_or_else(|| ConfigError::UnknownSource(s.trim().to_string()))
    }
}

impl Serialize for SourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

/// A numeric field that a source may not show at all.
///
/// Serializes as the bare number, or as the string `"UNRATED"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rated<T> {
    Value(T),
    Unrated,
}

impl<T> Rated<T> {
    pub const SENTINEL: &'static str = "UNRATED";

    pub fn value(self) -> Option<T> {
        match self {
            Rated::Value(v) => Some(v),
            Rated::Unrated => None,
        }
    }

    pub fn is_unrated(&self) -> bool {
        matches!(self, Rated::Unrated)
    }
}

impl<T> From<Option<T>> for Rated<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Rated::Unrated, Rated::Value)
    }
}

impl<T: fmt::Display> fmt::Display for Rated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rated::Value(v) => v.fmt(f),
            Rated::Unrated => f.write_str(Self::SENTINEL),
        }
    }
}

impl<T: Serialize> Serialize for Rated<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Rated::Value(v) => v.serialize(serializer),
            Rated::Unrated => serializer.serialize_str(Self::SENTINEL),
        }
    }
}

/// One product row from a source's results page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListing {
    /// `<source key>-<node index>`, unique within one source's results
    pub id: String,
    pub source_name: SourceId,
    pub purchase_link: String,
    pub title: String,
    pub image_url: String,
    /// Smallest currency unit as rendered by the source
    pub price: u64,
    pub rating: Rated<f64>,
    pub rating_count: Rated<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterFacet {
    pub title: String,
    pub options: Vec<String>,
}

/// Listings aggregated across sources plus what went wrong per source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeReport {
    pub search_term: String,
    pub listings: Vec<ProductListing>,
    pub per_source: Vec<SourceCount>,
    pub failures: Vec<SourceFailure>,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapeReport {
    pub fn listings_from(&self, site: SourceId) -> impl Iterator<Item = &ProductListing> {
        self.listings.iter().filter(move |l| l.source_name == site)
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceCount {
    pub source_name: SourceId,
    pub listings: usize,
}
