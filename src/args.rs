use clap::Parser;
use render_crawl::{CrawlConfig, Engine, FieldSpec, FollowMode};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "render-crawl")]
#[command(about = "Crawls JavaScript-rendered pages and prints one JSON record per page")]
#[command(version)]
pub struct Args {
    /// Seed URLs to start from (added to any seeds in --config)
    pub seeds: Vec<String>,

    /// JSON configuration file; command-line options override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of concurrent browser sessions
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Stop after this many pages
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Do not visit pages more than this many links away from a seed
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Browser engine behind the WebDriver server
    #[arg(short, long, value_enum)]
    pub engine: Option<Engine>,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Wait after load (and after every scroll) before reading the page
    #[arg(long)]
    pub settle_delay_ms: Option<u64>,

    /// Number of scroll-to-bottom passes per page
    #[arg(long)]
    pub scrolls: Option<u32>,

    /// Give up on a single page after this long
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// WebDriver endpoint (defaults to $WEBDRIVER_URL, then http://localhost:4444)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Field to extract, as name=selector or name=selector:all (repeatable)
    #[arg(short, long = "field", value_parser = parse_field)]
    pub fields: Vec<(String, FieldSpec)>,

    /// Follow every in-scope link or only the first one
    #[arg(long, value_enum)]
    pub follow: Option<FollowMode>,

    /// Follow links to other origins too
    #[arg(long)]
    pub allow_external: bool,

    /// Total timeout in seconds (maximum runtime)
    #[arg(long)]
    pub total_timeout: Option<u64>,
}

impl Args {
    /// Build the crawl configuration: file first, then flags, then the environment
    pub fn load_config(&self) -> render_crawl::Result<CrawlConfig> {
        let mut config = match &self.config {
            Some(path) => CrawlConfig::from_file(path)?,
            None => CrawlConfig::default(),
        };

        config.seeds.extend(self.seeds.iter().cloned());
        for (name, spec) in &self.fields {
            config.fields.insert(name.clone(), spec.clone());
        }

        if let Some(concurrency) = self.concurrency {
            config.max_concurrency = concurrency;
        }
        if self.max_pages.is_some() {
            config.max_pages = self.max_pages;
        }
        if self.max_depth.is_some() {
            config.max_depth = self.max_depth;
        }
        if let Some(follow) = self.follow {
            config.follow = follow;
        }
        if self.allow_external {
            config.scope.same_origin_only = false;
        }

        let render = &mut config.render;
        if let Some(engine) = self.engine {
            render.engine = engine;
        }
        if self.headful {
            render.headless = false;
        }
        if let Some(delay) = self.settle_delay_ms {
            render.settle_delay_ms = delay;
        }
        if let Some(scrolls) = self.scrolls {
            render.scrolls = scrolls;
        }
        if let Some(timeout) = self.timeout_ms {
            render.timeout_ms = timeout;
        }
        match &self.webdriver_url {
            Some(url) => render.webdriver_url = url.clone(),
            None => {
                if let Ok(url) = std::env::var("WEBDRIVER_URL") {
                    render.webdriver_url = url;
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse `name=selector` or `name=selector:all`
fn parse_field(value: &str) -> Result<(String, FieldSpec), String> {
    let (name, selector) = value
        .split_once('=')
        .ok_or_else(|| format!("expected name=selector, got {}", value))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in {}", value));
    }

    let spec = match selector.strip_suffix(":all") {
        Some(selector) => FieldSpec::all(selector.trim()),
        None => FieldSpec::single(selector.trim()),
    };
    if spec.selector.is_empty() {
        return Err(format!("missing selector for field {}", name));
    }
    Ok((name.to_string(), spec))
}
