//! Strategy selection
//!
//! Rules are evaluated top to bottom and the first matching predicate picks
//! the strategy. A request matching no rule falls through to
//! [`Strategy::NetworkFirst`].

use axum::http::Method;
use regex::Regex;
use std::sync::OnceLock;

use crate::request::{FetchRequest, RequestMode};

/// How an intercepted request is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Not intercepted at all
    Bypass,
    /// Network only, synthesized JSON error when offline
    NetworkOnly,
    /// Static generation first, network on miss
    CacheFirst,
    /// Network first, cached copy or offline page on failure
    NetworkFirstWithFallback,
    /// Network first, plain cache lookup on failure
    NetworkFirst,
}

type Predicate = Box<dyn Fn(&FetchRequest) -> bool + Send + Sync>;

/// One row of the strategy table
pub struct Rule {
    pub name: &'static str,
    predicate: Predicate,
    pub strategy: Strategy,
}

impl Rule {
    pub fn new(
        name: &'static str,
        strategy: Strategy,
        predicate: impl Fn(&FetchRequest) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            predicate: Box::new(predicate),
            strategy,
        }
    }

    pub fn matches(&self, request: &FetchRequest) -> bool {
        (self.predicate)(request)
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .finish()
    }
}

fn static_asset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\.(png|jpg|jpeg|gif|svg|ico|webp|css|js|woff|woff2|ttf|eot)$")
            .expect("static asset pattern is a valid regex")
    })
}

/// Whether the URL path ends in a static asset extension
pub fn is_static_asset(request: &FetchRequest) -> bool {
    static_asset_pattern().is_match(request.url.path())
}

/// Ordered strategy table
#[derive(Debug)]
pub struct StrategyTable {
    rules: Vec<Rule>,
}

impl StrategyTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// The standard table for the given never-cache markers
    pub fn standard(never_cache_markers: Vec<String>) -> Self {
        Self::new(vec![
            Rule::new("non-get", Strategy::Bypass, |r| r.method != Method::GET),
            Rule::new("non-http", Strategy::Bypass, |r| !r.is_http()),
            Rule::new("never-cache", Strategy::NetworkOnly, move |r| {
                let url = r.url.as_str();
                never_cache_markers.iter().any(|marker| url.contains(marker.as_str()))
            }),
            Rule::new("static-asset", Strategy::CacheFirst, is_static_asset),
            Rule::new("document", Strategy::NetworkFirstWithFallback, |r| {
                r.mode == RequestMode::Navigate || r.accepts_html()
            }),
        ])
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Pick the strategy for a request
    pub fn classify(&self, request: &FetchRequest) -> Strategy {
        self.rules
            .iter()
            .find(|rule| rule.matches(request))
            .map(|rule| rule.strategy)
            .unwrap_or(Strategy::NetworkFirst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NEVER_CACHE_MARKERS;
    use axum::http::{HeaderValue, header::ACCEPT};
    use url::Url;

    fn table() -> StrategyTable {
        StrategyTable::standard(NEVER_CACHE_MARKERS.iter().map(|s| s.to_string()).collect())
    }

    fn get(url: &str) -> FetchRequest {
        FetchRequest::get(url).unwrap()
    }

    #[test]
    fn test_non_get_is_bypassed() {
        let request = FetchRequest::new(
            Method::POST,
            Url::parse("https://app.example.com/api/snags").unwrap(),
        );
        assert_eq!(table().classify(&request), Strategy::Bypass);
    }

    #[test]
    fn test_non_http_is_bypassed() {
        let request = get("chrome-extension://abcdef/content.js");
        assert_eq!(table().classify(&request), Strategy::Bypass);
    }

    #[test]
    fn test_never_cache_markers() {
        for url in [
            "https://app.example.com/api/projects",
            "https://app.example.com/auth/callback?code=1",
            "https://app.example.com/_next/data/build/dashboard.json",
            // Markers win over the static extension
            "https://app.example.com/api/export.js",
        ] {
            assert_eq!(table().classify(&get(url)), Strategy::NetworkOnly, "{}", url);
        }
    }

    #[test]
    fn test_static_assets() {
        for url in [
            "https://app.example.com/icons/icon-192x192.png",
            "https://app.example.com/_next/static/chunks/main.js",
            "https://app.example.com/styles/app.CSS",
            "https://app.example.com/fonts/inter.woff2?v=3",
        ] {
            assert_eq!(table().classify(&get(url)), Strategy::CacheFirst, "{}", url);
        }
        assert!(!is_static_asset(&get("https://app.example.com/report.pdf")));
    }

    #[test]
    fn test_documents() {
        let navigation = FetchRequest::navigate("https://app.example.com/projects").unwrap();
        assert_eq!(
            table().classify(&navigation),
            Strategy::NetworkFirstWithFallback
        );

        let accepts_html = get("https://app.example.com/snags").with_header(
            ACCEPT,
            HeaderValue::from_static("text/html"),
        );
        assert_eq!(
            table().classify(&accepts_html),
            Strategy::NetworkFirstWithFallback
        );
    }

    #[test]
    fn test_everything_else_is_network_first() {
        assert_eq!(
            table().classify(&get("https://app.example.com/manifest.json")),
            Strategy::NetworkFirst
        );
    }

    #[test]
    fn test_rule_order() {
        let names: Vec<_> = table().rules().iter().map(|rule| rule.name).collect();
        assert_eq!(
            names,
            vec!["non-get", "non-http", "never-cache", "static-asset", "document"]
        );
    }
}
