mod common;

use std::collections::BTreeSet;

use common::{sample_assistant, CountingEmbedder, StubLlm};
use finreg_ai::retrieve::MAX_TOP_K;

#[test]
fn retrieval_results_are_bounded_sorted_and_unique() {
    let assistant = sample_assistant(CountingEmbedder::new(), StubLlm::new("ok"));
    for query in [
        "What are the penalties for insider trading?",
        "demat account nomination and KYC",
        "UPI transaction limits and RBI payment rules",
        "investor grievance redressal",
    ] {
        for top_k in [1u32, 2, 3, 8] {
            let hits = assistant.retriever().retrieve(query, Some(top_k)).expect("retrieve");
            assert!(hits.len() <= top_k as usize, "{query} top_k={top_k}");
            assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
            let ids: BTreeSet<_> = hits.iter().map(|h| h.chunk.chunk_id.as_str()).collect();
            assert_eq!(ids.len(), hits.len());
        }
    }
}

#[test]
fn top_k_is_clamped() {
    let assistant = sample_assistant(CountingEmbedder::new(), StubLlm::new("ok"));
    let q = "What are the penalties for insider trading?";

    assert_eq!(assistant.retriever().retrieve(q, Some(0)).expect("retrieve").len(), 1);
    let all = assistant.retriever().retrieve(q, Some(MAX_TOP_K + 100)).expect("retrieve");
    let chunk_count = assistant.store_summary().expect("summary").chunk_count as usize;
    assert!(all.len() <= chunk_count.min(MAX_TOP_K as usize));
    assert!(!all.is_empty());
}

#[test]
fn empty_query_returns_nothing() {
    let assistant = sample_assistant(CountingEmbedder::new(), StubLlm::new("ok"));
    assert!(assistant.retriever().retrieve("   ", None).expect("retrieve").is_empty());
}

#[test]
fn falls_back_to_lexical_when_query_embedding_fails() {
    let embedder = CountingEmbedder::new();
    let assistant = sample_assistant(embedder.clone(), StubLlm::new("ok"));
    embedder.set_failing(true);

    let hits = assistant
        .retriever()
        .retrieve("What documents do I need to open a demat account?", None)
        .expect("retrieve");
    let first = hits.first().expect("lexical hit");
    assert_eq!(first.chunk.document_id, "demat_account_guide.txt");
    assert!(hits.iter().all(|h| h.dense == 0.0));
}

#[test]
fn regulator_specific_question_prefers_that_regulator() {
    let assistant = sample_assistant(CountingEmbedder::new(), StubLlm::new("ok"));
    let hits = assistant
        .retriever()
        .retrieve("What are the UPI payment guidelines?", None)
        .expect("retrieve");
    assert_eq!(hits.first().map(|h| h.chunk.document_id.as_str()), Some("payment_guidelines.txt"));
}

#[test]
fn off_topic_query_sharing_one_common_word_returns_nothing() {
    let assistant = sample_assistant(CountingEmbedder::new(), StubLlm::new("ok"));
    for query in [
        "best pizza recipe for a market day",
        "what is the capital price of gold in the world",
    ] {
        let hits = assistant.retriever().retrieve(query, None).expect("retrieve");
        assert!(
            hits.is_empty(),
            "{query}: {:?}",
            hits.iter().map(|h| (&h.chunk.document_id, h.score)).collect::<Vec<_>>()
        );
    }
}
