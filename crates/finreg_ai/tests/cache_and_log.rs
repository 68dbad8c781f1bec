mod common;

use std::sync::Arc;

use common::{sample_assistant, temp_root, CountingEmbedder, DownLlm, StubLlm};
use finreg_core::cache::QueryCache;
use finreg_core::compliance::{risk_level_of, CATEGORY_COMPLIANCE};
use finreg_core::domain::{Document, Regulator};
use finreg_core::query_log::QueryLog;

const DEMAT_QUERY: &str = "What documents do I need to open a demat account?";
const INSIDER_QUERY: &str = "What are the penalties for insider trading?";

#[test]
fn repeated_query_is_served_from_cache() {
    let root = temp_root("cache-hit");
    let llm = StubLlm::new("PAN, Aadhaar and bank proof are required [[source:1]].");
    let assistant = sample_assistant(CountingEmbedder::new(), llm.clone())
        .with_query_cache(QueryCache::new(root.path().join("query_cache.json")));

    let first = assistant.answer(DEMAT_QUERY, None);
    let second = assistant.answer(DEMAT_QUERY, None);
    assert_eq!(llm.calls(), 1);
    assert_eq!(first.answer, second.answer);
    assert_eq!(first.sources, second.sources);
    assert_eq!(first.warnings, second.warnings);

    // Bypassing the cache calls the generator again.
    assistant.answer_with(DEMAT_QUERY, None, false);
    assert_eq!(llm.calls(), 2);
}

#[test]
fn cached_answers_get_current_warnings() {
    let root = temp_root("cache-warnings");
    let cache = QueryCache::new(root.path().join("query_cache.json"));
    let llm = StubLlm::new("fresh answer");
    let assistant = sample_assistant(CountingEmbedder::new(), llm.clone());

    let mut stale = assistant.answer_with(DEMAT_QUERY, None, false);
    stale.warnings.clear();
    stale.assess_risk();
    cache.put(DEMAT_QUERY, &stale).expect("seed cache");

    let assistant = assistant.with_query_cache(QueryCache::new(root.path().join("query_cache.json")));
    let res = assistant.answer(DEMAT_QUERY, None);
    assert_eq!(llm.calls(), 1);
    assert_eq!(res.answer, stale.answer);
    assert!(res.warnings.iter().any(|w| w.category == CATEGORY_COMPLIANCE));
    assert_eq!(res.risk_level, risk_level_of(&res.warnings));
    assert_eq!(res.disclaimer, res.risk_level.disclaimer());
}

#[test]
fn top_k_override_bypasses_the_cache() {
    let root = temp_root("cache-top-k");
    let llm = StubLlm::new("Penalties include fines and imprisonment [[source:1]].");
    let assistant = sample_assistant(CountingEmbedder::new(), llm.clone())
        .with_query_cache(QueryCache::new(root.path().join("query_cache.json")));

    let default = assistant.answer(INSIDER_QUERY, None);
    assert_eq!(llm.calls(), 1);

    let narrow = assistant.answer(INSIDER_QUERY, Some(1));
    assert_eq!(llm.calls(), 2);
    assert_eq!(narrow.sources.len(), 1);

    let wide = assistant.answer(INSIDER_QUERY, Some(5));
    assert_eq!(llm.calls(), 3);
    assert!(wide.sources.len() >= default.sources.len());

    // Asking for the default explicitly is the same request.
    let explicit = assistant.answer(INSIDER_QUERY, Some(3));
    assert_eq!(llm.calls(), 3);
    assert_eq!(explicit.sources, default.sources);
}

#[test]
fn no_context_replies_are_not_cached() {
    let root = temp_root("cache-no-context");
    let path = root.path().join("query_cache.json");
    let llm = StubLlm::new("unused");
    let assistant = sample_assistant(CountingEmbedder::new(), llm.clone())
        .with_query_cache(QueryCache::new(path.clone()));

    let res = assistant.answer("what is the weather today", None);
    assert!(res.sources.is_empty());
    assert!(QueryCache::new(path).get("what is the weather today").expect("read").is_none());
    assert_eq!(llm.calls(), 0);
}

#[test]
fn refresh_that_changes_the_index_clears_the_cache() {
    let root = temp_root("cache-refresh");
    let path = root.path().join("query_cache.json");
    let llm = StubLlm::new("PAN, Aadhaar and bank proof are required [[source:1]].");
    let assistant = sample_assistant(CountingEmbedder::new(), llm.clone())
        .with_query_cache(QueryCache::new(path.clone()));

    assistant.answer(DEMAT_QUERY, None);
    assert!(QueryCache::new(path.clone()).get(DEMAT_QUERY).expect("read").is_some());

    // Same chunks: the cache stays.
    assistant.refresh_index().expect("refresh");
    assistant.answer(DEMAT_QUERY, None);
    assert_eq!(llm.calls(), 1);

    let circular = Document::new(
        "demat_nomination_circular.txt",
        Regulator::Sebi,
        "Circular",
        "Every demat account holder must submit a nomination or opt out. Documents needed: PAN and address proof.",
    )
    .expect("doc");
    assistant.add_documents(vec![circular]).expect("add");
    assistant.refresh_index().expect("refresh");
    assert!(QueryCache::new(path).get(DEMAT_QUERY).expect("read").is_none());

    assistant.answer(DEMAT_QUERY, None);
    assert_eq!(llm.calls(), 2);
}

#[test]
fn cache_hits_are_logged_as_cached() {
    let root = temp_root("cache-log");
    let llm = StubLlm::new("PAN, Aadhaar and bank proof are required [[source:1]].");
    let assistant = sample_assistant(CountingEmbedder::new(), llm.clone())
        .with_query_cache(QueryCache::new(root.path().join("query_cache.json")))
        .with_query_log(QueryLog::open_in_memory().expect("log"));

    assistant.answer(DEMAT_QUERY, None);
    assistant.answer(DEMAT_QUERY, None);
    assert_eq!(llm.calls(), 1);

    let stats = assistant.statistics().expect("stats");
    assert_eq!(stats.total_queries, 2);
    assert_eq!(stats.cached_queries, 1);
}

#[test]
fn degraded_results_are_not_cached() {
    let root = temp_root("cache-degraded");
    let path = root.path().join("query_cache.json");
    let assistant = sample_assistant(CountingEmbedder::new(), Arc::new(DownLlm))
        .with_query_cache(QueryCache::new(path.clone()));

    let res = assistant.answer(DEMAT_QUERY, None);
    assert!(res.is_degraded());
    assert!(QueryCache::new(path).get(DEMAT_QUERY).expect("read").is_none());
}

#[test]
fn every_answer_is_logged() {
    let llm = StubLlm::new("Answer [[source:1]].");
    let assistant = sample_assistant(CountingEmbedder::new(), llm)
        .with_query_log(QueryLog::open_in_memory().expect("log"));

    assistant.answer(DEMAT_QUERY, None);
    assistant.answer("what is the weather today", None);
    assistant.answer(DEMAT_QUERY, None);

    let stats = assistant.statistics().expect("stats");
    assert_eq!(stats.total_queries, 3);
    assert_eq!(stats.unique_queries, 2);
    assert_eq!(stats.degraded_queries, 0);
    assert_eq!(stats.cached_queries, 0);
    assert!(stats.warnings_triggered >= 2);
    assert_eq!(stats.models_used.get("gpt-3.5-turbo"), Some(&3));

    let similar = assistant
        .similar_queries("Which documents do I need for a demat account?", 5)
        .expect("similar");
    assert_eq!(similar, vec![DEMAT_QUERY.to_string()]);
}
