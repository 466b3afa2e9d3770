//! Research: plan several queries, merge their hits, judge coverage and, when
//! coverage is weak, replace the best snippets with page summaries.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ResearchSettings;
use crate::error::{PressError, Result};
use crate::retry::{self, RetryPolicy};
use crate::services::{
    CompletionService, PageFetcher, SearchHit, SearchService, complete_with_retry, html_to_text,
    parse_json,
};

const MIN_QUERIES: usize = 2;
/// Rough characters-per-token ratio used to trim fetched pages.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    /// The executed queries, in order, joined with ` | `.
    pub query: String,
    pub results: Vec<SearchHit>,
    pub timestamp: DateTime<Utc>,
}

impl ResearchResult {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Numbered source list for prompts.
    pub fn as_grounding(&self) -> String {
        self.results
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                format!(
                    "[{}] {} ({})\n{}",
                    i + 1,
                    hit.title,
                    hit.url,
                    hit.snippet.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Coverage verdict for a research result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub sufficient: bool,
    /// 0–100.
    pub confidence: u8,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
struct QueryPlan {
    queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawAssessment {
    sufficient: bool,
    confidence: f64,
    #[serde(default)]
    reason: String,
}

pub struct ResearchOrchestrator {
    llm: Arc<dyn CompletionService>,
    search: Arc<dyn SearchService>,
    fetcher: Option<Arc<dyn PageFetcher>>,
    settings: ResearchSettings,
    retry: RetryPolicy,
}

impl ResearchOrchestrator {
    pub fn new(
        llm: Arc<dyn CompletionService>,
        search: Arc<dyn SearchService>,
        settings: ResearchSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            llm,
            search,
            fetcher: None,
            settings,
            retry,
        }
    }

    /// Enables deep enrichment of weak results.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn PageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    pub fn can_enrich(&self) -> bool {
        self.fetcher.is_some()
    }

    /// Plans queries, runs each independently and merges hits by URL.
    ///
    /// A failing query is skipped; only when every query fails is the last
    /// error returned.
    pub async fn research(
        &self,
        title: &str,
        niche: &str,
        keywords: &[String],
    ) -> Result<ResearchResult> {
        let queries = self.plan_queries(title, niche, keywords).await;
        info!(title, queries = queries.len(), "researching");

        let mut results = Vec::new();
        let mut seen = HashSet::new();
        let mut last_error = None;
        let mut succeeded = 0;

        for query in &queries {
            match self.run_query(query).await {
                Ok(hits) => {
                    succeeded += 1;
                    for hit in hits {
                        if seen.insert(normalize_url(&hit.url)) {
                            results.push(hit);
                        }
                    }
                }
                Err(err) => {
                    warn!(query = %query, error = %err, "search query failed, continuing");
                    last_error = Some(err);
                }
            }
        }

        if succeeded == 0
            && let Some(err) = last_error
        {
            return Err(err);
        }

        debug!(title, results = results.len(), "research merged");
        Ok(ResearchResult {
            query: queries.join(" | "),
            results,
            timestamp: Utc::now(),
        })
    }

    async fn run_query(&self, query: &str) -> Result<Vec<SearchHit>> {
        let count = self.settings.results_per_query;
        retry::execute(
            || {
                let search = Arc::clone(&self.search);
                let query = query.to_string();
                async move { search.search(&query, count).await }
            },
            &self.retry,
            "search",
        )
        .await
    }

    /// Asks the model for 2–4 ordered queries, falling back to the title and
    /// keywords when the plan cannot be obtained.
    async fn plan_queries(&self, title: &str, niche: &str, keywords: &[String]) -> Vec<String> {
        let max = self.settings.max_queries.max(MIN_QUERIES);
        let fallback = fallback_query(title, keywords);

        let system = "You plan web research for writers. Respond with ONLY valid JSON.";
        let user = format!(
            "Plan between {MIN_QUERIES} and {max} distinct web search queries for an article.\n\
             Order them from broad to specific (facts first, then examples).\n\
             Format: {{\"queries\": [\"<query>\", ...]}}\n\
             \n\
             Title: {title}\n\
             Niche: {niche}\n\
             Keywords: {}",
            keywords.join(", ")
        );

        let planned = match complete_with_retry(&self.llm, &self.retry, "plan queries", system, &user, 0.3, 300)
            .await
            .and_then(|text| parse_json::<QueryPlan>(&text))
        {
            Ok(plan) => plan.queries,
            Err(err) => {
                warn!(title, error = %err, "query planning failed, using fallback query");
                Vec::new()
            }
        };

        let mut seen = HashSet::new();
        let mut queries: Vec<String> = planned
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty() && seen.insert(q.to_lowercase()))
            .take(max)
            .collect();

        if queries.len() < MIN_QUERIES && seen.insert(fallback.to_lowercase()) {
            queries.push(fallback);
        }
        queries
    }

    /// Judges whether the result is enough to write a grounded article.
    ///
    /// Falls back to [`heuristic_assessment`] when the model's verdict cannot be used.
    pub async fn assess_quality(&self, title: &str, result: &ResearchResult) -> Assessment {
        if result.is_empty() {
            return Assessment {
                sufficient: false,
                confidence: 0,
                reason: "no sources found".to_string(),
            };
        }

        let system = "You audit research coverage. Respond with ONLY valid JSON.";
        let user = format!(
            "Assess whether these sources are enough to write a well-grounded article titled \"{title}\".\n\
             Weigh the criteria as follows:\n\
             - source count (25%): at least 5 independent sources is ideal\n\
             - specificity and recency of snippets (35%): concrete numbers, dates, named examples\n\
             - diversity (20%): different publishers and viewpoints\n\
             - authority (20%): primary sources, recognised outlets\n\
             Format: {{\"sufficient\": true|false, \"confidence\": <0-100>, \"reason\": \"<one sentence>\"}}\n\
             \n\
             Sources:\n{}",
            result.as_grounding()
        );

        match complete_with_retry(&self.llm, &self.retry, "assess research", system, &user, 0.0, 300)
            .await
            .and_then(|text| parse_json::<RawAssessment>(&text))
        {
            Ok(raw) => Assessment {
                sufficient: raw.sufficient,
                confidence: raw.confidence.clamp(0.0, 100.0).round() as u8,
                reason: raw.reason,
            },
            Err(err) => {
                warn!(title, error = %err, "coverage assessment failed, using heuristic");
                heuristic_assessment(result)
            }
        }
    }

    /// Replaces the snippets of the first `n` hits with topic-scoped fact
    /// summaries of the fetched pages. Failures keep the original snippet.
    pub async fn enrich(
        &self,
        result: &ResearchResult,
        n: usize,
        token_budget: usize,
    ) -> Result<ResearchResult> {
        let fetcher = self.fetcher.as_ref().ok_or_else(|| {
            PressError::Config("enrichment requested without a page fetcher".to_string())
        })?;

        let topic = result.query.split(" | ").next().unwrap_or_default().to_string();
        let mut enriched = result.clone();

        for hit in enriched.results.iter_mut().take(n) {
            match self.summarize_page(fetcher, &topic, hit, token_budget).await {
                Ok(summary) if !summary.trim().is_empty() => {
                    hit.snippet = summary;
                    hit.enriched = true;
                }
                Ok(_) => debug!(url = %hit.url, "empty summary, keeping snippet"),
                Err(err) => warn!(url = %hit.url, error = %err, "enrichment failed, keeping snippet"),
            }
        }

        Ok(enriched)
    }

    async fn summarize_page(
        &self,
        fetcher: &Arc<dyn PageFetcher>,
        topic: &str,
        hit: &SearchHit,
        token_budget: usize,
    ) -> Result<String> {
        let raw = retry::execute(
            || {
                let fetcher = Arc::clone(fetcher);
                let url = hit.url.clone();
                async move { fetcher.fetch(&url).await }
            },
            &self.retry,
            "fetch page",
        )
        .await?;

        let text = truncate_chars(&html_to_text(&raw), token_budget * CHARS_PER_TOKEN);
        if text.is_empty() {
            return Ok(String::new());
        }

        let system = "You extract facts for researchers. Output a compact bullet list, nothing else.";
        let user = format!(
            "Extract the facts from this page that are relevant to: {topic}\n\
             Ignore navigation, adverts and anything off-topic. Keep numbers, dates and names.\n\
             At most 8 bullets.\n\
             \n\
             Page ({}):\n{text}",
            hit.url
        );
        let max_tokens = u32::try_from(token_budget / 3).unwrap_or(u32::MAX).max(128);
        complete_with_retry(&self.llm, &self.retry, "summarize page", system, &user, 0.1, max_tokens).await
    }
}

fn fallback_query(title: &str, keywords: &[String]) -> String {
    let mut query = title.trim().to_string();
    for keyword in keywords.iter().take(3) {
        if !query.to_lowercase().contains(&keyword.to_lowercase()) {
            query.push(' ');
            query.push_str(keyword.trim());
        }
    }
    query
}

/// Dedup key: no scheme, `www.` or fragment, no trailing slash, and a
/// lowercase host. The path keeps its case.
fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or(url);
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let url = url.trim_end_matches('/');
    let (host, rest) = url.split_at(url.find(['/', '?']).unwrap_or(url.len()));
    let host = host.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    format!("{host}{rest}")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Coverage estimate from source count and publisher diversity alone.
pub fn heuristic_assessment(result: &ResearchResult) -> Assessment {
    let count = result.results.len();
    let sources: HashSet<&str> = result
        .results
        .iter()
        .map(|hit| host(&hit.url))
        .collect();
    let detailed = result
        .results
        .iter()
        .filter(|hit| hit.snippet.split_whitespace().count() >= 20 || hit.enriched)
        .count();

    let count_score = (count.min(5) * 25 / 5) as u32;
    let diversity_score = (sources.len().min(4) * 20 / 4) as u32;
    let detail_score = if count == 0 {
        0
    } else {
        (detailed * 35 / count) as u32
    };
    // Authority cannot be judged without the model; award half.
    let confidence = (count_score + diversity_score + detail_score + 10).min(100) as u8;

    Assessment {
        sufficient: confidence >= 60,
        confidence,
        reason: format!(
            "{count} results from {} hosts, {detailed} with detailed snippets",
            sources.len()
        ),
    }
}

fn host(url: &str) -> &str {
    let rest = url.split("://").nth(1).unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Replies by matching a marker in the system prompt.
    struct ScriptedLlm {
        replies: Vec<(&'static str, String)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn new(replies: Vec<(&'static str, String)>) -> Arc<Self> {
            Arc::new(Self {
                replies,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedLlm {
        async fn complete(&self, system: &str, user: &str, _t: f32, _m: u32) -> Result<String> {
            self.calls.lock().unwrap().push(user.to_string());
            self.replies
                .iter()
                .find(|(marker, _)| system.contains(marker))
                .map(|(_, reply)| reply.clone())
                .ok_or_else(|| PressError::MalformedResponse("no scripted reply".into()))
        }
    }

    struct MapSearch {
        hits: HashMap<String, Vec<SearchHit>>,
    }

    #[async_trait]
    impl SearchService for MapSearch {
        async fn search(&self, query: &str, _count: usize) -> Result<Vec<SearchHit>> {
            self.hits
                .get(query)
                .cloned()
                .ok_or_else(|| PressError::service("search", ErrorKind::Fatal, "bad query"))
        }
    }

    struct MapFetcher {
        pages: HashMap<String, String>,
    }

    #[async_trait]
    impl PageFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| PressError::Status {
                    service: "page fetch".into(),
                    status: 404,
                    message: url.into(),
                })
        }
    }

    fn hit(url: &str, snippet: &str) -> SearchHit {
        SearchHit {
            title: format!("About {url}"),
            snippet: snippet.into(),
            url: url.into(),
            source: "test".into(),
            enriched: false,
        }
    }

    fn orchestrator(llm: Arc<ScriptedLlm>, search: MapSearch) -> ResearchOrchestrator {
        ResearchOrchestrator::new(
            llm,
            Arc::new(search),
            ResearchSettings::default(),
            RetryPolicy::no_retry(),
        )
    }

    #[tokio::test]
    async fn merges_and_deduplicates_by_url() {
        let llm = ScriptedLlm::new(vec![(
            "plan web research",
            r#"{"queries": ["compost basics", "compost ratios"]}"#.into(),
        )]);
        let search = MapSearch {
            hits: HashMap::from([
                (
                    "compost basics".to_string(),
                    vec![hit("https://a.example/guide", "a"), hit("https://b.example", "b")],
                ),
                (
                    "compost ratios".to_string(),
                    vec![hit("http://www.a.example/guide/", "dup"), hit("https://c.example", "c")],
                ),
            ]),
        };

        let result = orchestrator(llm, search)
            .research("Composting", "gardening", &[])
            .await
            .unwrap();

        let urls: Vec<&str> = result.results.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://a.example/guide", "https://b.example", "https://c.example"]
        );
        assert_eq!(result.query, "compost basics | compost ratios");
    }

    #[tokio::test]
    async fn failed_query_does_not_abort_the_batch() {
        let llm = ScriptedLlm::new(vec![(
            "plan web research",
            r#"{"queries": ["broken", "works"]}"#.into(),
        )]);
        let search = MapSearch {
            hits: HashMap::from([("works".to_string(), vec![hit("https://ok.example", "fine")])]),
        };

        let result = orchestrator(llm, search)
            .research("T", "n", &[])
            .await
            .unwrap();
        assert_eq!(result.results.len(), 1);
    }

    #[tokio::test]
    async fn every_query_failing_is_an_error() {
        let llm = ScriptedLlm::new(vec![(
            "plan web research",
            r#"{"queries": ["x", "y"]}"#.into(),
        )]);
        let search = MapSearch {
            hits: HashMap::new(),
        };
        let err = orchestrator(llm, search)
            .research("T", "n", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[tokio::test]
    async fn unparseable_plan_falls_back_to_title_query() {
        let llm = ScriptedLlm::new(vec![("plan web research", "I'd search for stuff".into())]);
        let search = MapSearch {
            hits: HashMap::from([(
                "Composting worms".to_string(),
                vec![hit("https://w.example", "w")],
            )]),
        };

        let result = orchestrator(llm, search)
            .research("Composting", "gardening", &["worms".to_string()])
            .await
            .unwrap();
        assert_eq!(result.query, "Composting worms");
        assert_eq!(result.results.len(), 1);
    }

    #[tokio::test]
    async fn plan_is_capped_at_max_queries() {
        let llm = ScriptedLlm::new(vec![(
            "plan web research",
            r#"{"queries": ["a", "b", "c", "d", "e", "f"]}"#.into(),
        )]);
        let all = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .map(|q| (q.to_string(), vec![]))
            .collect();
        let result = orchestrator(llm, MapSearch { hits: all })
            .research("T", "n", &[])
            .await
            .unwrap();
        assert_eq!(result.query, "a | b | c | d");
    }

    #[tokio::test]
    async fn assessment_parses_model_verdict() {
        let llm = ScriptedLlm::new(vec![(
            "audit research",
            "```json\n{\"sufficient\": false, \"confidence\": 42.4, \"reason\": \"thin\"}\n```".into(),
        )]);
        let orch = orchestrator(llm, MapSearch { hits: HashMap::new() });
        let result = ResearchResult {
            query: "q".into(),
            results: vec![hit("https://a.example", "a")],
            timestamp: Utc::now(),
        };

        let assessment = orch.assess_quality("T", &result).await;
        assert!(!assessment.sufficient);
        assert_eq!(assessment.confidence, 42);
        assert_eq!(assessment.reason, "thin");
    }

    #[tokio::test]
    async fn assessment_falls_back_to_heuristic() {
        let llm = ScriptedLlm::new(vec![]);
        let orch = orchestrator(llm, MapSearch { hits: HashMap::new() });
        let result = ResearchResult {
            query: "q".into(),
            results: vec![hit("https://a.example", "short")],
            timestamp: Utc::now(),
        };
        let assessment = orch.assess_quality("T", &result).await;
        assert_eq!(assessment, heuristic_assessment(&result));
        assert!(!assessment.sufficient);
    }

    #[tokio::test]
    async fn enrichment_keeps_snippet_when_fetch_fails() {
        let llm = ScriptedLlm::new(vec![("extract facts", "- worms eat scraps".into())]);
        let fetcher = MapFetcher {
            pages: HashMap::from([(
                "https://good.example".to_string(),
                "<html><body><p>Worms eat kitchen scraps.</p></body></html>".to_string(),
            )]),
        };
        let orch = orchestrator(llm.clone(), MapSearch { hits: HashMap::new() })
            .with_fetcher(Arc::new(fetcher));
        let result = ResearchResult {
            query: "composting | worms".into(),
            results: vec![
                hit("https://good.example", "original good"),
                hit("https://missing.example", "original missing"),
                hit("https://untouched.example", "original untouched"),
            ],
            timestamp: Utc::now(),
        };

        let enriched = orch.enrich(&result, 2, 500).await.unwrap();

        assert_eq!(enriched.results[0].snippet, "- worms eat scraps");
        assert!(enriched.results[0].enriched);
        assert_eq!(enriched.results[1].snippet, "original missing");
        assert!(!enriched.results[1].enriched);
        assert_eq!(enriched.results[2].snippet, "original untouched");

        let calls = llm.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("relevant to: composting"));
        assert!(calls[0].contains("Worms eat kitchen scraps."));
    }

    #[tokio::test]
    async fn enrich_without_fetcher_is_a_config_error() {
        let orch = orchestrator(ScriptedLlm::new(vec![]), MapSearch { hits: HashMap::new() });
        let result = ResearchResult {
            query: "q".into(),
            results: vec![],
            timestamp: Utc::now(),
        };
        let err = orch.enrich(&result, 1, 100).await.unwrap_err();
        assert!(matches!(err, PressError::Config(_)));
    }

    #[test]
    fn heuristic_rewards_count_and_diversity() {
        let long = "word ".repeat(25);
        let result = ResearchResult {
            query: "q".into(),
            results: (0..5)
                .map(|i| hit(&format!("https://site{i}.example/a"), &long))
                .collect(),
            timestamp: Utc::now(),
        };
        let assessment = heuristic_assessment(&result);
        assert_eq!(assessment.confidence, 90);
        assert!(assessment.sufficient);
    }

    #[test]
    fn url_normalization() {
        assert_eq!(normalize_url("https://www.Example.com/a/#top"), "example.com/a");
        assert_eq!(normalize_url("http://example.com/a"), "example.com/a");
        assert_eq!(normalize_url("https://WWW.Example.com/Guide"), "example.com/Guide");
        assert_ne!(
            normalize_url("https://example.com/Guide"),
            normalize_url("https://example.com/guide")
        );
    }
}
