//! File-backed index store: bootstrap, reload, atomic generations, and
//! rejection of damaged indexes.

use std::io;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tempfile::TempDir;

use vector_ingest::errors::IngestError;
use vector_ingest::file_store::FileIndexStore;
use vector_ingest_core::embedding::Embedder;
use vector_ingest_core::identity::item_fingerprint;
use vector_ingest_core::models::{IndexRecord, Item};
use vector_ingest_core::store::IndexStore;

struct ConstEmbedder {
    dims: usize,
}

#[async_trait]
impl Embedder for ConstEmbedder {
    fn model_name(&self) -> &str {
        "const"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0; self.dims];
                v[t.len() % self.dims] = 1.0;
                v
            })
            .collect())
    }
}

struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn model_name(&self) -> &str {
        "broken"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding service unavailable")
    }
}

fn embedder() -> Arc<dyn Embedder> {
    Arc::new(ConstEmbedder { dims: 3 })
}

fn record(url: &str, body: &str) -> IndexRecord {
    let item = Item::document(url, "title", body);
    let fp = item_fingerprint(&item);
    IndexRecord::from_item(item, fp)
}

fn corrupt_kind(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<IngestError>(),
        Some(IngestError::CorruptIndex { .. })
    )
}

async fn populated(path: &std::path::Path) -> FileIndexStore {
    let mut store = FileIndexStore::load_or_bootstrap(path, embedder()).await.unwrap();
    store
        .insert(vec![record("https://a/1", "one"), record("https://a/2", "two!")])
        .await
        .unwrap();
    store.persist().await.unwrap();
    store
}

#[tokio::test]
async fn bootstrap_persists_an_empty_index() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");

    let store = FileIndexStore::load_or_bootstrap(&path, embedder()).await.unwrap();
    assert!(store.is_empty());
    assert_eq!(store.state().dims(), 3);
    assert_eq!(store.generation(), 1);

    let current = std::fs::read_to_string(path.join("CURRENT")).unwrap();
    assert_eq!(current, "gen-000001");
    assert!(path.join("gen-000001/index.vec").exists());
    assert!(path.join("gen-000001/records.json").exists());
}

#[tokio::test]
async fn probe_failure_is_a_bootstrap_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");

    let err = FileIndexStore::load_or_bootstrap(&path, Arc::new(BrokenEmbedder))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IngestError>(),
        Some(IngestError::Bootstrap { .. })
    ));
    assert!(!path.join("CURRENT").exists());
}

#[tokio::test]
async fn reload_restores_records_vectors_and_fingerprints() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let before = populated(&path).await;

    let after = FileIndexStore::load(&path, embedder()).unwrap().unwrap();
    assert_eq!(after.generation(), 2);
    assert_eq!(after.state().records(), before.state().records());
    assert_eq!(after.state().vectors(), before.state().vectors());
    assert_eq!(after.existing_fingerprints(), before.existing_fingerprints());
}

#[tokio::test]
async fn absent_index_loads_as_none() {
    let tmp = TempDir::new().unwrap();
    assert!(FileIndexStore::load(&tmp.path().join("index"), embedder())
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn persist_is_idempotent_and_empty_insert_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let mut store = populated(&path).await;
    assert_eq!(store.generation(), 2);

    store.persist().await.unwrap();
    assert_eq!(store.generation(), 2);

    assert_eq!(store.insert(Vec::new()).await.unwrap(), 0);
    store.persist().await.unwrap();
    assert_eq!(store.generation(), 2);

    // Records already held are skipped and leave nothing to persist.
    assert_eq!(store.insert(vec![record("https://a/1", "one")]).await.unwrap(), 0);
    store.persist().await.unwrap();
    assert_eq!(store.generation(), 2);
}

#[tokio::test]
async fn previous_generation_is_removed_after_swap() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let _store = populated(&path).await;

    assert!(!path.join("gen-000001").exists());
    assert!(path.join("gen-000002").exists());
    assert!(!path.join("CURRENT.tmp").exists());
}

#[tokio::test]
async fn leftover_generation_from_interrupted_persist_is_replaced() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let mut store = FileIndexStore::load_or_bootstrap(&path, embedder()).await.unwrap();

    std::fs::create_dir_all(path.join("gen-000002")).unwrap();
    std::fs::write(path.join("gen-000002/index.vec"), b"partial").unwrap();

    store.insert(vec![record("https://a/1", "one")]).await.unwrap();
    store.persist().await.unwrap();

    let reloaded = FileIndexStore::load(&path, embedder()).unwrap().unwrap();
    assert_eq!(reloaded.len(), 1);
}

#[tokio::test]
async fn garbage_records_file_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let _ = populated(&path).await;

    std::fs::write(path.join("gen-000002/records.json"), b"{not json").unwrap();
    let err = FileIndexStore::load(&path, embedder()).unwrap_err();
    assert!(corrupt_kind(&err));

    // Loading must not fall back to bootstrapping over the damaged index.
    let err = FileIndexStore::load_or_bootstrap(&path, embedder())
        .await
        .unwrap_err();
    assert!(corrupt_kind(&err));
}

#[tokio::test]
async fn missing_vector_artifact_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let _ = populated(&path).await;

    std::fs::remove_file(path.join("gen-000002/index.vec")).unwrap();
    assert!(corrupt_kind(&FileIndexStore::load(&path, embedder()).unwrap_err()));
}

#[tokio::test]
async fn artifacts_from_different_generations_are_corrupt() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let _ = populated(&path).await;

    // Swap in a vector file whose checksum the records file does not carry.
    let other = tmp.path().join("other");
    let _ = FileIndexStore::load_or_bootstrap(&other, embedder()).await.unwrap();
    std::fs::copy(
        other.join("gen-000001/index.vec"),
        path.join("gen-000002/index.vec"),
    )
    .unwrap();

    assert!(corrupt_kind(&FileIndexStore::load(&path, embedder()).unwrap_err()));
}

#[tokio::test]
async fn dangling_current_pointer_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let _ = populated(&path).await;

    std::fs::write(path.join("CURRENT"), "gen-000009").unwrap();
    assert!(corrupt_kind(&FileIndexStore::load(&path, embedder()).unwrap_err()));
}

#[tokio::test]
async fn missing_current_with_committed_generation_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let _ = populated(&path).await;

    std::fs::remove_file(path.join("CURRENT")).unwrap();
    assert!(corrupt_kind(&FileIndexStore::load(&path, embedder()).unwrap_err()));

    let err = FileIndexStore::load_or_bootstrap(&path, embedder())
        .await
        .unwrap_err();
    assert!(corrupt_kind(&err));
    assert!(path.join("gen-000002/records.json").exists());
    assert!(!path.join("gen-000001").exists());
}

#[tokio::test]
async fn missing_current_with_populated_first_generation_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let _ = populated(&path).await;

    std::fs::remove_file(path.join("CURRENT")).unwrap();
    std::fs::rename(path.join("gen-000002"), path.join("gen-000001")).unwrap();

    let err = FileIndexStore::load_or_bootstrap(&path, embedder())
        .await
        .unwrap_err();
    assert!(corrupt_kind(&err));
    assert!(path.join("gen-000001/records.json").exists());
}

#[tokio::test]
async fn interrupted_first_bootstrap_is_redone() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let _ = FileIndexStore::load_or_bootstrap(&path, embedder()).await.unwrap();
    std::fs::remove_file(path.join("CURRENT")).unwrap();

    let store = FileIndexStore::load_or_bootstrap(&path, embedder()).await.unwrap();
    assert!(store.is_empty());
    assert_eq!(store.generation(), 1);

    // A half-written first generation is replaced too.
    std::fs::remove_file(path.join("CURRENT")).unwrap();
    std::fs::write(path.join("gen-000001/records.json"), b"{\"form").unwrap();
    let store = FileIndexStore::load_or_bootstrap(&path, embedder()).await.unwrap();
    assert_eq!(store.generation(), 1);
    assert!(FileIndexStore::load(&path, embedder()).unwrap().is_some());
}

#[tokio::test]
async fn stale_generations_are_swept_after_swap() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index");
    let mut store = populated(&path).await;

    // Left behind by a crash between the CURRENT swap and cleanup.
    std::fs::create_dir_all(path.join("gen-000001")).unwrap();
    std::fs::write(path.join("gen-000001/records.json"), b"{}").unwrap();

    store.insert(vec![record("https://a/3", "three")]).await.unwrap();
    store.persist().await.unwrap();

    let mut gens: Vec<String> = std::fs::read_dir(&path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| n.starts_with("gen-"))
        .collect();
    gens.sort();
    assert_eq!(gens, vec!["gen-000003"]);
    assert_eq!(FileIndexStore::load(&path, embedder()).unwrap().unwrap().len(), 3);
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn persist_logs_reach_the_run_subscriber() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let tmp = TempDir::new().unwrap();
    let _ = populated(&tmp.path().join("index")).await;

    // Logged from the blocking thread that swaps generations.
    assert!(logs.text().contains("removed old generation"));
}
