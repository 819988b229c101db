
use crate::results::RenderedPage;
use url::Url;

pub(super) fn page(url: &str, html: &str) -> RenderedPage {
    let url = Url::parse(url).unwrap();
    RenderedPage::new(url.clone(), url, html.to_string())
}

pub(super) const DEMO_PAGE: &str = r#"
<html>
  <head><title>Demo</title></head>
  <body>
    <p>Hello</p>
    <p>
      World
    </p>
    <p>   </p>
    <a href="/next">Next</a>
  </body>
</html>
"#;
