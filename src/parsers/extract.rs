use crate::config::{Cardinality, FieldSpec};
use crate::parsers::html::{element_value, parse_selector};
use crate::results::{ExtractedRecord, FieldValue, RenderedPage};
use crate::CrawlError;
use scraper::{Html, Selector};
use std::collections::BTreeMap;

struct CompiledField {
    name: String,
    selector: Selector,
    cardinality: Cardinality,
    attribute: Option<String>,
}

/// Maps declared fields to selector results on a rendered page
pub struct Extractor {
    fields: Vec<CompiledField>,
}

impl Extractor {
    /// Compile every field's selector up front so a bad one fails before the crawl starts
    pub fn new(specs: &BTreeMap<String, FieldSpec>) -> Result<Self, CrawlError> {
        let fields = specs
            .iter()
            .map(|(name, spec)| {
                Ok(CompiledField {
                    name: name.clone(),
                    selector: parse_selector(name, &spec.selector)?,
                    cardinality: spec.cardinality,
                    attribute: spec.attribute.clone(),
                })
            })
            .collect::<Result<Vec<_>, CrawlError>>()?;
        Ok(Self { fields })
    }

    pub fn extract(&self, page: &RenderedPage) -> ExtractedRecord {
        let doc = Html::parse_document(&page.html);
        self.extract_document(&doc, page.final_url.as_str())
    }

    /// Missing matches are expected: `single` falls back to "" and `all` to an empty list
    pub fn extract_document(&self, doc: &Html, url: &str) -> ExtractedRecord {
        let mut values = BTreeMap::new();

        for field in &self.fields {
            let mut matches = doc
                .select(&field.selector)
                .filter_map(|element| element_value(element, field.attribute.as_deref()));

            let value = match field.cardinality {
                Cardinality::Single => FieldValue::Single(matches.next().unwrap_or_default()),
                Cardinality::All => FieldValue::All(matches.collect()),
            };
            values.insert(field.name.clone(), value);
        }

        ::log::trace!("Extracted {} fields from {}", values.len(), url);
        ExtractedRecord::new(url.to_string(), values)
    }
}
