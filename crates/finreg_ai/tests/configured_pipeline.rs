mod common;

use finreg_ai::answer::prompts::FALLBACK_ANSWER;
use finreg_ai::Assistant;
use finreg_core::config::Config;
use finreg_core::demo::write_sample_corpus;
use finreg_core::error::codes;

#[test]
fn configured_pipeline_ingests_indexes_and_degrades_without_credentials() {
    common::init_tracing();
    let root = common::temp_root("configured");
    let raw = root.path().join("raw");
    write_sample_corpus(&raw).expect("write corpus");

    let mut config = Config::default();
    config.paths.data_dir = root.path().join("data");
    config.generation.api_key_env = "FINREG_TEST_KEY_THAT_IS_NEVER_SET".to_string();

    let assistant = Assistant::from_config(config.clone()).expect("assistant");
    let ingest = assistant.ingest_dir(&raw).expect("ingest");
    assert_eq!(ingest.added.added.len(), 5);
    assert!(ingest.skipped_files.is_empty());

    let summary = assistant.refresh_index().expect("refresh");
    assert_eq!(summary.model, "hashing-v1");
    assert!(config.paths.index_dir().join("index_status.json").exists());

    let res = assistant.answer("What documents do I need to open a demat account?", None);
    assert_eq!(res.answer, FALLBACK_ANSWER);
    assert!(res.sources.is_empty());
    assert!(res.error.as_deref().unwrap_or_default().contains(codes::GENERATION_FAILED));

    let stats = assistant.statistics().expect("stats");
    assert_eq!(stats.total_queries, 1);
    assert_eq!(stats.degraded_queries, 1);

    // A second process picks the persisted index up without re-ingesting.
    let reopened = Assistant::from_config(config).expect("assistant");
    assert!(reopened.load_index().expect("load"));
    let hits = reopened
        .retriever()
        .retrieve("What documents do I need to open a demat account?", None)
        .expect("retrieve");
    assert_eq!(hits[0].chunk.document_id, "demat_account_guide.txt");
}
