//! Optional grounding from allow-listed public reference sources.
//!
//! The fetcher never fails: every network or decode problem is logged and
//! degrades to fewer (possibly zero) snippets.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use mindmap_core::error::{MindmapError, Result};

pub const MAX_SNIPPETS: usize = 5;
pub const MAX_EXCERPT_CHARS: usize = 500;
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(7);

/// Hosts a snippet URL may point at (exact match or any subdomain).
pub const ALLOWED_HOSTS: &[&str] = &["wikipedia.org", "developer.mozilla.org"];

const BLOCK_SEPARATOR: &str = "\n\n";
const MDN_ORIGIN: &str = "https://developer.mozilla.org";

/// One cited excerpt from a reference source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    pub title: String,
    pub url: String,
    pub excerpt: String,
}

impl Snippet {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        excerpt: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            excerpt: excerpt.into(),
        }
    }
}

/// Selected snippets plus the prompt context block built from them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub snippets: Vec<Snippet>,
    pub context: String,
}

impl Enrichment {
    /// Run candidates through [`select_snippets`] and format the survivors.
    pub fn from_candidates(candidates: Vec<Snippet>, budget: usize) -> Self {
        let snippets = select_snippets(candidates, budget);
        let context = format_context(&snippets);
        Self { snippets, context }
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

/// Source of grounding snippets for a topic.
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Fetch snippets whose context block fits in `budget` characters.
    async fn fetch(&self, topic: &str, budget: usize) -> Enrichment;
}

// ---------------------------------------------------------------------------
// Pure selection helpers
// ---------------------------------------------------------------------------

pub fn is_allowed_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if !matches!(parsed.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    ALLOWED_HOSTS
        .iter()
        .any(|allowed| host == *allowed || host.ends_with(&format!(".{allowed}")))
}

/// Whether the topic looks like web/software material worth an MDN lookup.
pub fn is_technical_topic(topic: &str) -> bool {
    static TECH_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)\b(javascript|typescript|html5?|css3?|dom|http[s2]?|web ?apis?|web ?assembly|wasm|json|svg|canvas|websockets?|react|node\.?js|browser|ecmascript|fetch api|service workers?)\b",
        )
        .expect("valid regex")
    });
    TECH_RE.is_match(topic)
}

/// Deduplicate by URL, drop non-allow-listed hosts, and keep candidates in
/// order while the formatted context still fits in `budget` characters.
pub fn select_snippets(candidates: Vec<Snippet>, budget: usize) -> Vec<Snippet> {
    let mut seen = HashSet::new();
    let mut selected: Vec<Snippet> = Vec::new();
    let mut used = 0usize;

    for mut snippet in candidates {
        if selected.len() == MAX_SNIPPETS {
            break;
        }
        if !is_allowed_url(&snippet.url) {
            tracing::debug!(url = %snippet.url, "dropping snippet from non-allow-listed host");
            continue;
        }
        if !seen.insert(snippet.url.clone()) {
            continue;
        }

        snippet.excerpt = truncate_chars(snippet.excerpt.trim(), MAX_EXCERPT_CHARS);
        let separator = if selected.is_empty() {
            0
        } else {
            BLOCK_SEPARATOR.len()
        };
        let cost = separator + snippet_block(selected.len() + 1, &snippet).chars().count();
        if used + cost > budget {
            break;
        }
        used += cost;
        selected.push(snippet);
    }

    selected
}

/// Render the context block: title line, URL line, quoted excerpt, blank line between.
pub fn format_context(snippets: &[Snippet]) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(i, s)| snippet_block(i + 1, s))
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

fn snippet_block(n: usize, snippet: &Snippet) -> String {
    format!(
        "Source {n}: {}\n{}\n\"{}\"",
        snippet.title, snippet.url, snippet.excerpt
    )
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// HTTP fetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReferenceEndpoints {
    /// Wikipedia REST base, e.g. `https://en.wikipedia.org/api/rest_v1`.
    pub wikipedia: String,
    /// MDN search API.
    pub mdn_search: String,
}

impl Default for ReferenceEndpoints {
    fn default() -> Self {
        Self {
            wikipedia: "https://en.wikipedia.org/api/rest_v1".into(),
            mdn_search: "https://developer.mozilla.org/api/v1/search".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WikiPage {
    #[serde(default)]
    title: String,
    #[serde(default)]
    extract: String,
    #[serde(default)]
    content_urls: Option<WikiContentUrls>,
}

#[derive(Debug, Deserialize)]
struct WikiContentUrls {
    desktop: WikiUrl,
}

#[derive(Debug, Deserialize)]
struct WikiUrl {
    page: String,
}

#[derive(Debug, Deserialize)]
struct WikiRelated {
    #[serde(default)]
    pages: Vec<WikiPage>,
}

#[derive(Debug, Deserialize)]
struct MdnSearch {
    #[serde(default)]
    documents: Vec<MdnDocument>,
}

#[derive(Debug, Deserialize)]
struct MdnDocument {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    mdn_url: String,
}

impl WikiPage {
    fn into_snippet(self) -> Option<Snippet> {
        let url = self.content_urls?.desktop.page;
        if self.title.trim().is_empty() || self.extract.trim().is_empty() {
            return None;
        }
        Some(Snippet::new(self.title, url, self.extract))
    }
}

impl MdnDocument {
    fn into_snippet(self) -> Option<Snippet> {
        if self.title.trim().is_empty() || self.summary.trim().is_empty() {
            return None;
        }
        let url = if self.mdn_url.starts_with('/') {
            format!("{MDN_ORIGIN}{}", self.mdn_url)
        } else {
            self.mdn_url
        };
        Some(Snippet::new(self.title, url, self.summary))
    }
}

/// Fetches snippets from Wikipedia (summary + related pages) and, for
/// technical topics, the MDN search API.
pub struct ReferenceFetcher {
    client: reqwest::Client,
    endpoints: ReferenceEndpoints,
}

impl ReferenceFetcher {
    pub fn new() -> Result<Self> {
        Self::with_config(ReferenceEndpoints::default(), FETCH_TIMEOUT)
    }

    pub fn with_config(endpoints: ReferenceEndpoints, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mindmap-backend/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MindmapError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, endpoints })
    }

    fn wiki_url(&self, kind: &str, topic: &str) -> Option<Url> {
        let mut url = Url::parse(&self.endpoints.wikipedia).ok()?;
        let title = topic.trim().replace(' ', "_");
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .extend(["page", kind, title.as_str()]);
        Some(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, source: &'static str) -> Option<T> {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(source, error = %e, "reference lookup failed");
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(source, %status, "reference lookup returned non-success status");
            return None;
        }
        match response.json::<T>().await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!(source, error = %e, "reference lookup returned undecodable body");
                None
            }
        }
    }

    async fn wikipedia_summary(&self, topic: &str) -> Vec<Snippet> {
        let Some(url) = self.wiki_url("summary", topic) else {
            return Vec::new();
        };
        self.get_json::<WikiPage>(url, "wikipedia-summary")
            .await
            .and_then(WikiPage::into_snippet)
            .into_iter()
            .collect()
    }

    async fn wikipedia_related(&self, topic: &str) -> Vec<Snippet> {
        let Some(url) = self.wiki_url("related", topic) else {
            return Vec::new();
        };
        self.get_json::<WikiRelated>(url, "wikipedia-related")
            .await
            .map(|r| r.pages.into_iter().filter_map(WikiPage::into_snippet).collect())
            .unwrap_or_default()
    }

    async fn mdn_search(&self, topic: &str) -> Vec<Snippet> {
        let Ok(url) = Url::parse_with_params(
            &self.endpoints.mdn_search,
            &[("q", topic.trim()), ("locale", "en-US")],
        ) else {
            return Vec::new();
        };
        self.get_json::<MdnSearch>(url, "mdn-search")
            .await
            .map(|r| {
                r.documents
                    .into_iter()
                    .filter_map(MdnDocument::into_snippet)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Enricher for ReferenceFetcher {
    async fn fetch(&self, topic: &str, budget: usize) -> Enrichment {
        let mut candidates = self.wikipedia_summary(topic).await;
        candidates.extend(self.wikipedia_related(topic).await);
        if is_technical_topic(topic) {
            candidates.extend(self.mdn_search(topic).await);
        }

        let found = candidates.len();
        let enrichment = Enrichment::from_candidates(candidates, budget);
        tracing::info!(
            topic,
            candidates = found,
            kept = enrichment.snippets.len(),
            context_chars = enrichment.context.chars().count(),
            "reference enrichment complete"
        );
        enrichment
    }
}
