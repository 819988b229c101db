use crate::CrawlError;
use scraper::{ElementRef, Selector};

/// Compile a CSS selector, naming the field it belongs to on failure
pub fn parse_selector(name: &str, selector: &str) -> Result<Selector, CrawlError> {
    Selector::parse(selector).map_err(|_| CrawlError::InvalidSelector {
        name: name.to_string(),
        selector: selector.to_string(),
    })
}

/// Collapse whitespace runs into single spaces and trim the ends
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized text of an element, or of one of its attributes.
///
/// Returns `None` when the attribute is missing or the value is blank.
pub fn element_value(element: ElementRef<'_>, attribute: Option<&str>) -> Option<String> {
    let raw = match attribute {
        Some(name) => normalize_whitespace(element.value().attr(name)?),
        None => normalize_whitespace(&element.text().collect::<String>()),
    };
    if raw.is_empty() { None } else { Some(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  Hello \n\t world  "), "Hello world");
        assert_eq!(normalize_whitespace(" \n "), "");
    }

    #[test]
    fn test_element_value_text_and_attribute() {
        let doc = Html::parse_fragment(
            r#"<a href=" /next " title="">Go <b>on</b>
                now</a>"#,
        );
        let a = doc.select(&Selector::parse("a").unwrap()).next().unwrap();

        assert_eq!(element_value(a, None), Some("Go on now".to_string()));
        assert_eq!(element_value(a, Some("href")), Some("/next".to_string()));
        assert_eq!(element_value(a, Some("title")), None);
        assert_eq!(element_value(a, Some("missing")), None);
    }

    #[test]
    fn test_parse_selector_error_names_field() {
        match parse_selector("title", "p[") {
            Err(CrawlError::InvalidSelector { name, selector }) => {
                assert_eq!(name, "title");
                assert_eq!(selector, "p[");
            }
            other => panic!("expected InvalidSelector, got {:?}", other),
        }
    }
}
