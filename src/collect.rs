//! Product collection and facet extraction over a rendered results page.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{ExtractionError, NormalizationError};
use crate::model::{FilterFacet, ProductListing, SourceId};
use crate::navigate::ResultDocument;
use crate::normalize;
use crate::ruleset::{FieldRule, FilterRuleset, Read, Ruleset};

/// Walks result nodes in document order and keeps at most `amount` valid
/// listings. Nodes missing a link, title, image or price are skipped.
pub fn collect(
    doc: &ResultDocument,
    ruleset: &Ruleset,
    amount: usize,
) -> Result<Vec<ProductListing>, ExtractionError> {
    let site = ruleset.site();
    let item = compile(site, ruleset.item_selector)?;
    let fields = CompiledFields::new(ruleset)?;

    let html = Html::parse_document(&doc.html);
    let mut nodes = html.select(&item).enumerate().peekable();
    if nodes.peek().is_none() {
        return Err(ExtractionError::NoNodes {
            site,
            selector: ruleset.item_selector.to_string(),
        });
    }

    let mut listings = Vec::new();
    if amount == 0 {
        return Ok(listings);
    }

    let mut skipped = 0usize;
    for (index, node) in nodes {
        match fields.read(node, index, &doc.url) {
            Ok(listing) => listings.push(listing),
            Err((field, err)) => {
                skipped += 1;
                tracing::debug!(site = %site, index, field, error = %err, "skipping result node");
            }
        }
        if listings.len() == amount {
            break;
        }
    }

    tracing::info!(
        site = %site,
        collected = listings.len(),
        skipped,
        "collected listings"
    );
    Ok(listings)
}

/// Facet groups in document order, cut at the terminal group.
pub fn facets(
    doc: &ResultDocument,
    rules: &FilterRuleset,
) -> Result<Vec<FilterFacet>, ExtractionError> {
    let site = rules.navigation.site;
    let group = compile(site, rules.group_selector)?;
    let title = compile(site, rules.title_selector)?;
    let option = compile(site, rules.option_selector)?;

    let html = Html::parse_document(&doc.html);
    let mut groups = html.select(&group).peekable();
    if groups.peek().is_none() {
        return Err(ExtractionError::NoNodes {
            site,
            selector: rules.group_selector.to_string(),
        });
    }

    let mut result = Vec::new();
    for node in groups {
        let label = node
            .select(&title)
            .next()
            .and_then(text_of)
            .unwrap_or_else(|| rules.untitled_label.to_string());
        if label == rules.terminal_title {
            break;
        }

        let mut seen = HashSet::new();
        let options: Vec<String> = node
            .select(&option)
            .filter_map(text_of)
            .filter(|o| seen.insert(o.clone()))
            .collect();
        if options.is_empty() {
            continue;
        }
        result.push(FilterFacet {
            title: label,
            options,
        });
    }

    tracing::info!(site = %site, facets = result.len(), "collected facets");
    Ok(result)
}

struct CompiledField {
    selector: Selector,
    read: Read,
}

struct CompiledFields {
    site: SourceId,
    decimal_mark: normalize::DecimalMark,
    link: CompiledField,
    title: CompiledField,
    image: CompiledField,
    price: CompiledField,
    rating: CompiledField,
    rating_count: Option<CompiledField>,
}

impl CompiledFields {
    fn new(ruleset: &Ruleset) -> Result<Self, ExtractionError> {
        let site = ruleset.site();
        let field = |rule: &FieldRule| -> Result<CompiledField, ExtractionError> {
            Ok(CompiledField {
                selector: compile(site, rule.selector)?,
                read: rule.read,
            })
        };
        let rules = &ruleset.fields;
        Ok(Self {
            site,
            decimal_mark: ruleset.decimal_mark,
            link: field(&rules.link)?,
            title: field(&rules.title)?,
            image: field(&rules.image)?,
            price: field(&rules.price)?,
            rating: field(&rules.rating)?,
            rating_count: rules.rating_count.as_ref().map(field).transpose()?,
        })
    }

    fn read(
        &self,
        node: ElementRef<'_>,
        index: usize,
        base: &Url,
    ) -> Result<ProductListing, (&'static str, NormalizationError)> {
        let required = |name: &'static str, field: &CompiledField| {
            read_field(node, field, base).ok_or((name, NormalizationError::Missing))
        };

        let purchase_link = required("link", &self.link)?;
        let title = required("title", &self.title)?;
        let image_url = required("image", &self.image)?;
        let price = normalize::price(read_field(node, &self.price, base).as_deref())
            .map_err(|err| ("price", err))?;

        let rating = normalize::rating(
            read_field(node, &self.rating, base).as_deref(),
            self.decimal_mark,
        );
        let rating_count = normalize::rating_count(
            self.rating_count
                .as_ref()
                .and_then(|field| read_field(node, field, base))
                .as_deref(),
        );

        Ok(ProductListing {
            id: format!("{}-{}", self.site.key(), index),
            source_name: self.site,
            purchase_link,
            title,
            image_url,
            price,
            rating,
            rating_count,
        })
    }
}

fn compile(site: SourceId, selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector).map_err(|e| ExtractionError::InvalidSelector {
        site,
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn read_field(node: ElementRef<'_>, field: &CompiledField, base: &Url) -> Option<String> {
    let element = node.select(&field.selector).next()?;
    match field.read {
        Read::Text => text_of(element),
        Read::Url(attrs) => attrs
            .iter()
            .filter_map(|attr| element.value().attr(attr))
            .map(str::trim)
            .find(|v| !v.is_empty() && !v.starts_with("data:"))
            .and_then(|v| base.join(v).ok())
            .map(String::from),
    }
}

fn text_of(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let cleaned = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!cleaned.is_empty()).then_some(cleaned)
}
