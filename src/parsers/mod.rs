pub mod extract;
pub mod html;
pub mod links;

#[cfg(test)]
mod tests;

pub use extract::Extractor;
pub use links::LinkPolicy;

use crate::results::{ExtractedRecord, RenderedPage};
use scraper::Html;
use url::Url;

/// Extract a record and the next links from one page, parsing the document once.
///
/// The parsed document is not `Send`, so this stays synchronous and nothing from
/// it outlives the call.
pub fn parse_page(
    page: &RenderedPage,
    extractor: &Extractor,
    links: &LinkPolicy,
) -> (ExtractedRecord, Vec<Url>) {
    let doc = Html::parse_document(&page.html);
    let record = extractor.extract_document(&doc, page.final_url.as_str());
    let next = links.next_links_in(&doc, &page.final_url);
    (record, next)
}
