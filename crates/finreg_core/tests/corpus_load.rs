use std::fs;

use finreg_core::demo::{sample_documents, write_sample_corpus};
use finreg_core::domain::Regulator;
use finreg_core::ingest::load_corpus_dir;
use pretty_assertions::assert_eq;

#[test]
fn written_sample_corpus_loads_back_identically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let written = write_sample_corpus(dir.path()).expect("write corpus");
    assert_eq!(written.len(), 5);

    let load = load_corpus_dir(dir.path()).expect("load");
    assert!(load.skipped.is_empty(), "{:?}", load.skipped);

    let mut loaded = load.documents;
    loaded.sort_by(|a, b| a.id.cmp(&b.id));
    let mut bundled = sample_documents().expect("sample docs");
    bundled.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(loaded, bundled);

    let payment = loaded.iter().find(|d| d.id == "payment_guidelines.txt").expect("rbi doc");
    assert_eq!(payment.regulator, Regulator::Rbi);
}

#[test]
fn unsupported_and_empty_files_are_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sebi = dir.path().join("sebi");
    fs::create_dir_all(&sebi).unwrap();
    fs::write(sebi.join("circular.txt"), "SEBI circular on KYC norms.\r\n\r\nApplies to all brokers.").unwrap();
    fs::write(sebi.join("blank.txt"), "  \n\n ").unwrap();
    fs::write(sebi.join("scan.pdf"), b"%PDF-1.4").unwrap();

    let load = load_corpus_dir(dir.path()).expect("load");
    assert_eq!(load.documents.len(), 1);
    assert_eq!(load.documents[0].id, "circular.txt");
    assert_eq!(load.documents[0].regulator, Regulator::Sebi);
    assert!(!load.documents[0].text.contains('\r'));
    assert_eq!(load.skipped.len(), 2);
}

#[test]
fn repeated_file_names_keep_distinct_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    for reg in ["sebi", "rbi"] {
        let d = dir.path().join(reg);
        fs::create_dir_all(&d).unwrap();
        fs::write(d.join("faq.txt"), format!("{} frequently asked questions", reg.to_uppercase())).unwrap();
    }

    let load = load_corpus_dir(dir.path()).expect("load");
    let mut ids: Vec<String> = load.documents.iter().map(|d| d.id.clone()).collect();
    ids.sort();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"faq.txt".to_string()));
    assert!(ids.iter().any(|id| id != "faq.txt" && id.ends_with("faq.txt")));
}

#[test]
fn missing_root_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_corpus_dir(&dir.path().join("nope")).unwrap_err();
    assert_eq!(err.code, "INGEST_FAILED");
}
