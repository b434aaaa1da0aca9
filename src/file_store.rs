//! File-backed [`IndexStore`].
//!
//! # On-disk layout
//!
//! ```text
//! <index.path>/
//!   CURRENT                  name of the live generation, e.g. "gen-000007"
//!   gen-000007/
//!     index.vec              embedding index: header + little-endian f32 vectors
//!     records.json           records + metadata, generation, count, index checksum
//! ```
//!
//! Every [`persist`](IndexStore::persist) writes both artifacts into a new
//! generation directory, fsyncs them, and only then swaps `CURRENT` with an
//! atomic rename. A crash at any point leaves `CURRENT` naming a complete,
//! self-consistent generation (or no `CURRENT` at all before the first
//! bootstrap). Every other generation directory is removed after the swap.
//!
//! Without `CURRENT` the directory may only hold what an interrupted first
//! bootstrap leaves behind (an empty `gen-000001`). Any other generation
//! means committed data lost its pointer, and loading fails rather than
//! bootstrapping over it.
//!
//! On load both artifacts must be present and agree: same generation,
//! record count equal to vector count, matching dimensionality, and the
//! SHA-256 of `index.vec` equal to the checksum in `records.json`.
//! Anything else is [`IngestError::CorruptIndex`].

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use vector_ingest_core::embedding::{probe_dims, read_vec_le, write_vec_le, Embedder};
use vector_ingest_core::models::{Fingerprint, IndexRecord};
use vector_ingest_core::store::{IndexState, IndexStore};

use crate::errors::IngestError;

const CURRENT_FILE: &str = "CURRENT";
const INDEX_FILE: &str = "index.vec";
const RECORDS_FILE: &str = "records.json";
const INDEX_MAGIC: &[u8; 4] = b"VIDX";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Serialize, Deserialize)]
struct RecordsFile {
    format: u32,
    generation: u64,
    model: String,
    dims: usize,
    count: usize,
    index_sha256: String,
    records: Vec<IndexRecord>,
}

/// Leading fields of a `records.json`, read without the records.
#[derive(Deserialize)]
struct RecordsHeader {
    count: usize,
}

pub struct FileIndexStore {
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
    state: IndexState,
    generation: u64,
    dirty: bool,
}

impl std::fmt::Debug for FileIndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileIndexStore")
            .field("path", &self.path)
            .field("generation", &self.generation)
            .field("records", &self.state.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl FileIndexStore {
    /// Load the index at `path`, or create and persist an empty one.
    ///
    /// A present but unreadable index is fatal ([`IngestError::CorruptIndex`]);
    /// a failed probe embedding or first write is
    /// [`IngestError::Bootstrap`].
    pub async fn load_or_bootstrap(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if let Some(store) = Self::load(path, Arc::clone(&embedder))? {
            return Ok(store);
        }

        tracing::warn!(path = %path.display(), "index not found, bootstrapping a new one");
        let bootstrap_err = |reason: String| IngestError::Bootstrap {
            path: path.to_path_buf(),
            reason,
        };

        let dims = probe_dims(embedder.as_ref())
            .await
            .map_err(|e| bootstrap_err(format!("probe embedding failed: {:#}", e)))?;
        let mut store = Self {
            path: path.to_path_buf(),
            state: IndexState::new(dims, embedder.model_name()),
            embedder,
            generation: 0,
            dirty: true,
        };
        store
            .persist()
            .await
            .map_err(|e| bootstrap_err(format!("{:#}", e)))?;
        tracing::info!(path = %path.display(), dims, "bootstrapped empty index");
        Ok(store)
    }

    /// Load the index at `path`. `Ok(None)` if no index has been persisted
    /// there yet.
    pub fn load(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Option<Self>> {
        let corrupt = |e: anyhow::Error| IngestError::CorruptIndex {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        };

        let current = path.join(CURRENT_FILE);
        if !current.exists() {
            check_orphaned_generations(path).map_err(corrupt)?;
            return Ok(None);
        }

        let (generation, state) = read_generation(path).map_err(corrupt)?;

        if state.model() != embedder.model_name() && embedder.model_name() != "disabled" {
            tracing::warn!(
                index_model = state.model(),
                embedder_model = embedder.model_name(),
                "index was built with a different embedding model"
            );
        }
        tracing::info!(
            path = %path.display(),
            generation,
            records = state.len(),
            dims = state.dims(),
            "loaded index"
        );

        Ok(Some(Self {
            path: path.to_path_buf(),
            embedder,
            state,
            generation,
            dirty: false,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Bytes used by the live generation.
    pub fn disk_size(&self) -> u64 {
        let dir = self.path.join(generation_name(self.generation));
        [INDEX_FILE, RECORDS_FILE]
            .iter()
            .filter_map(|f| fs::metadata(dir.join(f)).ok())
            .map(|m| m.len())
            .sum()
    }
}

#[async_trait]
impl IndexStore for FileIndexStore {
    fn existing_fingerprints(&self) -> HashSet<Fingerprint> {
        self.state.fingerprints().clone()
    }

    async fn insert(&mut self, records: Vec<IndexRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let appended = self
            .state
            .embed_and_append(self.embedder.as_ref(), records)
            .await?;
        if appended > 0 {
            self.dirty = true;
        }
        Ok(appended)
    }

    async fn persist(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        let next = self.generation + 1;
        let (index_bytes, records_bytes) = encode_generation(&self.state, next)?;
        let root = self.path.clone();

        // The run's subscriber is thread-local; carry it onto the blocking thread.
        let dispatch = tracing::dispatcher::get_default(|d| d.clone());
        tokio::task::spawn_blocking(move || {
            tracing::dispatcher::with_default(&dispatch, || {
                write_generation(&root, next, &index_bytes, &records_bytes)?;
                sweep_generations(&root, next);
                Ok::<_, anyhow::Error>(())
            })
        })
        .await??;

        self.generation = next;
        self.dirty = false;
        tracing::debug!(
            path = %self.path.display(),
            generation = next,
            records = self.state.len(),
            "index persisted"
        );
        Ok(())
    }

    fn state(&self) -> &IndexState {
        &self.state
    }
}

fn generation_name(generation: u64) -> String {
    format!("gen-{:06}", generation)
}

fn generation_number(name: &str) -> Option<u64> {
    name.strip_prefix("gen-").and_then(|n| n.parse().ok())
}

fn parse_generation_name(name: &str) -> Result<u64> {
    generation_number(name)
        .ok_or_else(|| anyhow::anyhow!("CURRENT names an invalid generation: '{}'", name))
}

/// Generation directories under `root`, unordered.
fn generation_dirs(root: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list {}", root.display()));
        }
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(generation) = entry.file_name().to_str().and_then(generation_number) {
            dirs.push((generation, entry.path()));
        }
    }
    Ok(dirs)
}

/// Fail if `root` has no `CURRENT` but holds a generation that is not a
/// leftover empty bootstrap.
fn check_orphaned_generations(root: &Path) -> Result<()> {
    for (generation, dir) in generation_dirs(root)? {
        if generation > 1 {
            bail!(
                "{} is missing but {} exists",
                CURRENT_FILE,
                generation_name(generation)
            );
        }
        let count = fs::read(dir.join(RECORDS_FILE))
            .ok()
            .and_then(|raw| serde_json::from_slice::<RecordsHeader>(&raw).ok())
            .map_or(0, |h| h.count);
        if count > 0 {
            bail!(
                "{} is missing but {} holds {} records",
                CURRENT_FILE,
                generation_name(generation),
                count
            );
        }
    }
    Ok(())
}

/// Remove every generation directory except `live`. Failures only warn.
fn sweep_generations(root: &Path, live: u64) {
    let dirs = match generation_dirs(root) {
        Ok(dirs) => dirs,
        Err(e) => {
            let reason = format!("{:#}", e);
            tracing::warn!(path = %root.display(), error = %reason, "failed to list old generations");
            return;
        }
    };
    for (generation, dir) in dirs.into_iter().filter(|(g, _)| *g != live) {
        match fs::remove_dir_all(&dir) {
            Ok(()) => tracing::debug!(generation, "removed old generation"),
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "failed to remove old generation")
            }
        }
    }
}

fn encode_generation(state: &IndexState, generation: u64) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut index = Vec::with_capacity(HEADER_LEN + state.len() * state.dims() * 4);
    index.extend_from_slice(INDEX_MAGIC);
    index.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    index.extend_from_slice(&(state.dims() as u32).to_le_bytes());
    index.extend_from_slice(&(state.len() as u64).to_le_bytes());
    for v in state.vectors() {
        write_vec_le(&mut index, v);
    }

    let records = RecordsFile {
        format: FORMAT_VERSION,
        generation,
        model: state.model().to_string(),
        dims: state.dims(),
        count: state.len(),
        index_sha256: format!("{:x}", Sha256::digest(&index)),
        records: state.records().to_vec(),
    };
    let records = serde_json::to_vec(&records)?;
    Ok((index, records))
}

fn write_generation(root: &Path, generation: u64, index: &[u8], records: &[u8]) -> Result<()> {
    fs::create_dir_all(root)
        .with_context(|| format!("Failed to create index directory: {}", root.display()))?;

    let dir = root.join(generation_name(generation));
    if let Err(e) = stage_generation(&dir, index, records) {
        let _ = fs::remove_dir_all(&dir);
        return Err(e);
    }

    let tmp = root.join(format!("{}.tmp", CURRENT_FILE));
    let swapped = write_synced(&tmp, generation_name(generation).as_bytes()).and_then(|_| {
        fs::rename(&tmp, root.join(CURRENT_FILE))
            .with_context(|| format!("Failed to swap {} in {}", CURRENT_FILE, root.display()))
    });
    if let Err(e) = swapped {
        let _ = fs::remove_file(&tmp);
        let _ = fs::remove_dir_all(&dir);
        return Err(e);
    }

    // CURRENT already names the new generation; a failed directory sync
    // only weakens durability of the rename.
    if let Err(e) = sync_dir(root) {
        tracing::warn!(path = %root.display(), error = %e, "failed to sync index directory");
    }
    Ok(())
}

/// Write both artifacts into a fresh generation directory. The target is
/// never the live generation, so a directory left behind by an interrupted
/// persist is replaced.
fn stage_generation(dir: &Path, index: &[u8], records: &[u8]) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    write_synced(&dir.join(INDEX_FILE), index)?;
    write_synced(&dir.join(RECORDS_FILE), records)?;
    sync_dir(dir)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

fn read_generation(root: &Path) -> Result<(u64, IndexState)> {
    let name = fs::read_to_string(root.join(CURRENT_FILE))
        .with_context(|| format!("Failed to read {}", CURRENT_FILE))?;
    let name = name.trim();
    let generation = parse_generation_name(name)?;
    let dir = root.join(name);

    let index = fs::read(dir.join(INDEX_FILE))
        .with_context(|| format!("Failed to read {}/{}", name, INDEX_FILE))?;
    let records_raw = fs::read(dir.join(RECORDS_FILE))
        .with_context(|| format!("Failed to read {}/{}", name, RECORDS_FILE))?;
    let records: RecordsFile = serde_json::from_slice(&records_raw)
        .with_context(|| format!("Failed to parse {}/{}", name, RECORDS_FILE))?;

    if records.format != FORMAT_VERSION {
        bail!("unsupported records format {}", records.format);
    }
    if records.generation != generation {
        bail!(
            "records belong to generation {} but CURRENT names {}",
            records.generation,
            generation
        );
    }
    let checksum = format!("{:x}", Sha256::digest(&index));
    if checksum != records.index_sha256 {
        bail!("{} checksum does not match {}", INDEX_FILE, RECORDS_FILE);
    }

    let (dims, vectors) = decode_index(&index)?;
    if dims != records.dims {
        bail!("{} has {} dims, {} says {}", INDEX_FILE, dims, RECORDS_FILE, records.dims);
    }
    if records.count != records.records.len() {
        bail!(
            "{} declares {} records but holds {}",
            RECORDS_FILE,
            records.count,
            records.records.len()
        );
    }

    let state = IndexState::from_parts(dims, records.model, records.records, vectors)?;
    Ok((generation, state))
}

fn decode_index(bytes: &[u8]) -> Result<(usize, Vec<Vec<f32>>)> {
    if bytes.len() < HEADER_LEN || &bytes[..4] != INDEX_MAGIC {
        bail!("{} has a missing or invalid header", INDEX_FILE);
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != FORMAT_VERSION {
        bail!("unsupported index version {}", version);
    }
    let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let expected = count
        .checked_mul(dims)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| anyhow::anyhow!("{} header is out of range: {} x {}", INDEX_FILE, count, dims))?;
    let body = &bytes[HEADER_LEN..];
    if body.len() != expected {
        bail!(
            "{} body is {} bytes, expected {} for {} x {}",
            INDEX_FILE,
            body.len(),
            expected,
            count,
            dims
        );
    }
    let vectors = if dims == 0 {
        vec![Vec::new(); count]
    } else {
        body.chunks_exact(dims * 4).map(read_vec_le).collect()
    };
    Ok((dims, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_names() {
        assert_eq!(generation_name(7), "gen-000007");
        assert_eq!(parse_generation_name("gen-000007").unwrap(), 7);
        assert!(parse_generation_name("../etc").is_err());
    }

    #[test]
    fn index_header_is_validated() {
        assert!(decode_index(b"nope").is_err());
        let state = IndexState::new(3, "m");
        let (index, _) = encode_generation(&state, 1).unwrap();
        assert_eq!(decode_index(&index).unwrap(), (3, Vec::new()));

        let mut truncated = index.clone();
        truncated.extend_from_slice(&[0, 0]);
        assert!(decode_index(&truncated).is_err());
    }

    #[test]
    fn oversized_header_counts_are_rejected() {
        let mut index = Vec::new();
        index.extend_from_slice(INDEX_MAGIC);
        index.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        index.extend_from_slice(&u32::MAX.to_le_bytes());
        index.extend_from_slice(&u64::MAX.to_le_bytes());
        let err = decode_index(&index).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
