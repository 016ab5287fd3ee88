use async_trait::async_trait;
use scraper::{Html, Selector};
use thiserror::Error;

use crate::portal::PageContent;

mod xpath;

pub use xpath::{CompiledSelector, compile_selector};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("Unsupported XPath '{selector}': {reason}")]
    UnsupportedXPath { selector: String, reason: String },
    #[error("No element matched '{0}'")]
    NoMatch(String),
    #[error("Element matched by '{0}' has no value")]
    EmptyValue(String),
}

/// Pulls the monitored value out of fetched page content.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, content: &PageContent, selector: &str) -> Result<String, ExtractError>;
}

/// Extracts from HTML with CSS selectors or the XPath subset [`compile_selector`] accepts.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

#[async_trait]
impl Extractor for HtmlExtractor {
    async fn extract(&self, content: &PageContent, selector: &str) -> Result<String, ExtractError> {
        extract_value(&content.body, selector)
    }
}

pub fn extract_value(html: &str, selector: &str) -> Result<String, ExtractError> {
    let compiled = compile_selector(selector)?;
    let css = Selector::parse(&compiled.css).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })?;

    let document = Html::parse_document(html);
    let element = document
        .select(&css)
        .next()
        .ok_or_else(|| ExtractError::NoMatch(selector.to_string()))?;

    let raw = match &compiled.attribute {
        Some(name) => element.value().attr(name).unwrap_or_default().to_string(),
        None => element.text().collect::<Vec<_>>().join(" "),
    };
    let value = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        return Err(ExtractError::EmptyValue(selector.to_string()));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRADES_PAGE: &str = r#"
        <html><body>
          <table id="courses">
            <tr><td class="course">CS101</td><td class="grade">B+</td></tr>
            <tr><td class="course">CS102</td><td class="grade">  A-  </td></tr>
          </table>
          <div class="final-score"><span>
              A
          </span></div>
          <div class="final-score pending"><span></span></div>
          <a id="transcript" href="/student/transcript.pdf">Transcript</a>
        </body></html>
    "#;

    #[test]
    fn test_extract_with_xpath() {
        let value = extract_value(GRADES_PAGE, "//div[@class='final-score']/span").unwrap();
        assert_eq!(value, "A");
    }

    #[test]
    fn test_extract_with_css() {
        let value = extract_value(GRADES_PAGE, "#courses tr:nth-child(2) td.grade").unwrap();
        assert_eq!(value, "A-");
    }

    #[test]
    fn test_extract_positional_and_attribute() {
        assert_eq!(
            extract_value(GRADES_PAGE, "//table[@id='courses']//tr[1]/td[2]/text()").unwrap(),
            "B+"
        );
        assert_eq!(
            extract_value(GRADES_PAGE, "//a[@id='transcript']/@href").unwrap(),
            "/student/transcript.pdf"
        );
    }

    #[test]
    fn test_extract_wildcard_position_counts_every_sibling() {
        let html = r#"<div id="r"><span>first</span><b>second</b><span>third</span></div>"#;
        assert_eq!(extract_value(html, "//div[@id='r']/*[2]").unwrap(), "second");
    }

    #[test]
    fn test_extract_rejects_position_after_filter() {
        let html = r#"<table><tr><td>x</td><td class="g">B</td><td class="g">C</td></tr></table>"#;
        assert!(matches!(
            extract_value(html, "//td[@class='g'][2]"),
            Err(ExtractError::UnsupportedXPath { .. })
        ));
    }

    #[test]
    fn test_extract_attribute_value_containing_and() {
        let html = r#"<table><tr><td title="pass">F</td><td title="pass and merit">P</td></tr></table>"#;
        assert_eq!(extract_value(html, "//td[@title='pass and merit']").unwrap(), "P");
    }

    #[test]
    fn test_extract_failures() {
        assert!(matches!(
            extract_value(GRADES_PAGE, "//div[@class='missing']"),
            Err(ExtractError::NoMatch(_))
        ));
        assert!(matches!(
            extract_value(GRADES_PAGE, "//div[contains(@class,'pending')]/span"),
            Err(ExtractError::EmptyValue(_))
        ));
        assert!(matches!(
            extract_value(GRADES_PAGE, "td..grade"),
            Err(ExtractError::InvalidSelector { .. })
        ));
        assert!(matches!(
            extract_value(GRADES_PAGE, "//td[following-sibling::td]"),
            Err(ExtractError::UnsupportedXPath { .. })
        ));
    }

    #[tokio::test]
    async fn test_html_extractor_reads_page_body() {
        let page = PageContent::new("https://university.portal.edu/student/grades", GRADES_PAGE);
        let value = HtmlExtractor
            .extract(&page, "div.final-score > span")
            .await
            .unwrap();
        assert_eq!(value, "A");
    }
}
