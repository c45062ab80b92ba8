use super::*;
use crate::registry::NamespaceStatus;
use crate::test_support::{
    HashEmbedder, InstrumentedIndex, StaticExtractor, paragraph, temp_registry,
};
use std::sync::atomic::Ordering;
use tokio::sync::Barrier;

struct Harness {
    _temp_dir: tempfile::TempDir,
    registry: Registry,
    embedder: Arc<HashEmbedder>,
    index: Arc<InstrumentedIndex>,
    ingestor: Ingestor,
}

async fn harness(
    extractor: StaticExtractor,
    embedder: HashEmbedder,
    index: InstrumentedIndex,
    write_batch_size: usize,
) -> Harness {
    harness_with_timeout(
        extractor,
        embedder,
        index,
        write_batch_size,
        Duration::from_secs(5),
    )
    .await
}

async fn harness_with_timeout(
    extractor: StaticExtractor,
    embedder: HashEmbedder,
    index: InstrumentedIndex,
    write_batch_size: usize,
    request_timeout: Duration,
) -> Harness {
    let (temp_dir, registry) = temp_registry().await;
    let embedder = Arc::new(embedder);
    let index = Arc::new(index);
    let ingestor = Ingestor::new(
        Arc::new(extractor),
        Arc::clone(&embedder) as Arc<dyn Embedder>,
        Arc::clone(&index) as Arc<dyn VectorIndex>,
        registry.clone(),
        IngestOptions {
            write_batch_size,
            request_timeout,
        },
    );
    Harness {
        _temp_dir: temp_dir,
        registry,
        embedder,
        index,
        ingestor,
    }
}

/// One page per entry, each yielding exactly one chunk
fn single_chunk_pages(words: &[&str]) -> Vec<String> {
    words.iter().map(|word| paragraph(word, 150)).collect()
}

fn extractor_with(path: &str, pages: &[String]) -> StaticExtractor {
    let pages: Vec<&str> = pages.iter().map(String::as_str).collect();
    StaticExtractor::default().with(path, &pages)
}

#[test]
fn namespace_ids_are_fresh_hex() {
    let first = generate_namespace_id();
    let second = generate_namespace_id();

    assert_eq!(first.len(), 32);
    assert!(first.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
    assert_ne!(first, second);
}

#[tokio::test]
async fn successful_ingestion_is_registered() {
    let pages = vec![format!(
        "{}\n\n{}\n\n{}",
        paragraph("lease", 500),
        paragraph("rent", 500),
        paragraph("deposit", 500)
    )];
    let h = harness(
        extractor_with("/docs/lease.pdf", &pages),
        HashEmbedder::default(),
        InstrumentedIndex::new(),
        64,
    )
    .await;

    let outcome = h
        .ingestor
        .ingest(&[PathBuf::from("/docs/lease.pdf")], "alice")
        .await
        .expect("ingestion should succeed");

    assert_eq!(outcome.chunk_count, 1);
    let record = h
        .registry
        .get(&outcome.namespace)
        .await
        .expect("get should succeed")
        .expect("namespace should be registered");
    assert_eq!(record.owner, "alice");
    assert_eq!(record.source_file_paths, vec!["/docs/lease.pdf"]);
    assert_eq!(record.chunk_count, 1);
    assert_eq!(record.status, NamespaceStatus::Ready);
    assert_eq!(
        h.index.count(&outcome.namespace).await.expect("count"),
        1
    );
}

#[tokio::test]
async fn chunks_are_written_in_fixed_size_batches() {
    let pages = single_chunk_pages(&["alpha", "bravo", "charlie", "delta", "echo"]);
    let h = harness(
        extractor_with("/docs/memo.txt", &pages),
        HashEmbedder::default(),
        InstrumentedIndex::new(),
        2,
    )
    .await;

    let outcome = h
        .ingestor
        .ingest(&[PathBuf::from("/docs/memo.txt")], "alice")
        .await
        .expect("ingestion should succeed");

    assert_eq!(outcome.chunk_count, 5);
    assert_eq!(h.index.upserts.load(Ordering::SeqCst), 3);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.index.count(&outcome.namespace).await.expect("count"), 5);

    let hits = h
        .index
        .search(
            &outcome.namespace,
            &crate::test_support::hash_embedding(&pages[3]),
            1,
        )
        .await
        .expect("search should succeed");
    assert_eq!(hits[0].position, 3);
}

#[tokio::test]
async fn failed_batch_rolls_back_and_registers_nothing() {
    let pages = single_chunk_pages(&["alpha", "bravo", "POISON", "delta", "echo"]);
    let h = harness(
        extractor_with("/docs/memo.txt", &pages),
        HashEmbedder {
            fail_marker: Some("POISON".to_string()),
            ..HashEmbedder::default()
        },
        InstrumentedIndex::new(),
        2,
    )
    .await;

    let err = h
        .ingestor
        .ingest(&[PathBuf::from("/docs/memo.txt")], "alice")
        .await
        .expect_err("poisoned batch should fail the ingestion");

    assert!(
        matches!(err, DocsError::IngestionFailed { batch_index: 1, .. }),
        "unexpected error: {err}"
    );
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.index.deletes.load(Ordering::SeqCst), 1);
    assert!(h.index.namespaces().await.expect("namespaces").is_empty());
    assert!(h.registry.list_by_owner("alice").await.expect("list").is_empty());
}

#[tokio::test]
async fn batches_are_in_flight_together() {
    // Each embed call blocks until all four batches have started
    let pages = single_chunk_pages(&["alpha", "bravo", "charlie", "delta"]);
    let h = harness_with_timeout(
        extractor_with("/docs/memo.txt", &pages),
        HashEmbedder {
            barrier: Some(Barrier::new(4)),
            ..HashEmbedder::default()
        },
        InstrumentedIndex::new(),
        1,
        Duration::from_secs(2),
    )
    .await;

    let outcome = h
        .ingestor
        .ingest(&[PathBuf::from("/docs/memo.txt")], "alice")
        .await
        .expect("all batches should meet at the barrier");

    assert_eq!(outcome.chunk_count, 4);
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.index.upserts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn rollback_waits_for_sibling_batches() {
    // Batch 0 fails at once; the other three only finish together
    let pages = single_chunk_pages(&["POISON", "bravo", "charlie", "delta"]);
    let h = harness_with_timeout(
        extractor_with("/docs/memo.txt", &pages),
        HashEmbedder {
            fail_marker: Some("POISON".to_string()),
            barrier: Some(Barrier::new(3)),
            ..HashEmbedder::default()
        },
        InstrumentedIndex::new(),
        1,
        Duration::from_secs(2),
    )
    .await;

    let err = h
        .ingestor
        .ingest(&[PathBuf::from("/docs/memo.txt")], "alice")
        .await
        .expect_err("poisoned batch should fail the ingestion");

    assert!(
        matches!(err, DocsError::IngestionFailed { batch_index: 0, .. }),
        "unexpected error: {err}"
    );
    assert_eq!(h.index.upserts.load(Ordering::SeqCst), 3);
    assert_eq!(
        *h.index
            .upserts_before_delete
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner),
        Some(3)
    );
    assert!(h.index.namespaces().await.expect("namespaces").is_empty());
    assert!(h.registry.list_ids().await.expect("ids").is_empty());
}

#[tokio::test]
async fn index_write_failure_is_an_ingestion_failure() {
    let pages = single_chunk_pages(&["alpha"]);
    let h = harness(
        extractor_with("/docs/memo.txt", &pages),
        HashEmbedder::default(),
        InstrumentedIndex {
            fail_writes: true,
            ..InstrumentedIndex::new()
        },
        64,
    )
    .await;

    let err = h
        .ingestor
        .ingest(&[PathBuf::from("/docs/memo.txt")], "alice")
        .await
        .expect_err("write failure should fail the ingestion");

    assert!(matches!(err, DocsError::IngestionFailed { batch_index: 0, .. }));
    assert!(h.registry.list_ids().await.expect("ids").is_empty());
}

#[tokio::test]
async fn unavailable_embedder_fails_before_any_work() {
    let pages = single_chunk_pages(&["alpha"]);
    let h = harness(
        extractor_with("/docs/memo.txt", &pages),
        HashEmbedder {
            unavailable: true,
            ..HashEmbedder::default()
        },
        InstrumentedIndex::new(),
        64,
    )
    .await;

    let err = h
        .ingestor
        .ingest(&[PathBuf::from("/docs/memo.txt")], "alice")
        .await
        .expect_err("offline embedder should fail");

    assert!(matches!(err, DocsError::BackendUnavailable(_)));
    assert_eq!(h.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.index.upserts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_input_registers_an_empty_namespace() {
    let h = harness(
        StaticExtractor::default().with("/docs/blank.txt", &["   \n\n  "]),
        HashEmbedder::default(),
        InstrumentedIndex::new(),
        64,
    )
    .await;

    let empty = h
        .ingestor
        .ingest(&[], "alice")
        .await
        .expect("empty file list should succeed");
    assert_eq!(empty.chunk_count, 0);

    let blank = h
        .ingestor
        .ingest(&[PathBuf::from("/docs/blank.txt")], "alice")
        .await
        .expect("blank file should succeed");
    assert_eq!(blank.chunk_count, 0);

    assert_ne!(empty.namespace, blank.namespace);
    assert_eq!(h.index.upserts.load(Ordering::SeqCst), 0);
    assert_eq!(h.registry.list_by_owner("alice").await.expect("list").len(), 2);
}

#[tokio::test]
async fn unsupported_file_aborts_the_ingestion() {
    let pages = single_chunk_pages(&["alpha"]);
    let h = harness(
        extractor_with("/docs/memo.txt", &pages),
        HashEmbedder::default(),
        InstrumentedIndex::new(),
        64,
    )
    .await;

    let err = h
        .ingestor
        .ingest(
            &[
                PathBuf::from("/docs/memo.txt"),
                PathBuf::from("/docs/contract.doc"),
            ],
            "alice",
        )
        .await
        .expect_err("doc files are unsupported");

    assert!(matches!(err, DocsError::UnsupportedFormat { .. }));
    assert_eq!(h.index.upserts.load(Ordering::SeqCst), 0);
    assert!(h.registry.list_ids().await.expect("ids").is_empty());
}

#[tokio::test]
async fn chunk_positions_follow_file_order() {
    let first = single_chunk_pages(&["alpha", "bravo"]);
    let second = single_chunk_pages(&["charlie"]);
    let first_refs: Vec<&str> = first.iter().map(String::as_str).collect();
    let second_refs: Vec<&str> = second.iter().map(String::as_str).collect();
    let h = harness(
        StaticExtractor::default()
            .with("/docs/b.md", &second_refs)
            .with("/docs/a.md", &first_refs),
        HashEmbedder::default(),
        InstrumentedIndex::new(),
        64,
    )
    .await;

    let outcome = h
        .ingestor
        .ingest(
            &[PathBuf::from("/docs/a.md"), PathBuf::from("/docs/b.md")],
            "alice",
        )
        .await
        .expect("ingestion should succeed");

    let hits = h
        .index
        .search(
            &outcome.namespace,
            &crate::test_support::hash_embedding(&second[0]),
            1,
        )
        .await
        .expect("search should succeed");
    assert_eq!(hits[0].position, 2);
    assert_eq!(
        hits[0].metadata.get("source").map(String::as_str),
        Some("/docs/b.md")
    );
}

#[test]
fn options_follow_ingestion_settings() {
    let config = IngestionConfig {
        write_batch_size: 0,
        request_timeout_secs: 7,
    };
    let options = IngestOptions::from(&config);

    assert_eq!(options.write_batch_size, 1);
    assert_eq!(options.request_timeout, Duration::from_secs(7));
}
