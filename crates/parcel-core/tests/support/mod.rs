#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use parcel_core::access::AccessPolicy;
use parcel_core::config::EngineConfig;
use parcel_core::context::EngineContext;
use parcel_core::deploy::PackageManager;
use parcel_core::model::Package;
use parcel_core::source::{ArtifactClient, DownloadedArtifact, MavenCoordinate, SnapshotMetadata};
use parcel_core::store::memory::MemoryBlobStore;
use parcel_core::store::{Blob, BlobStore, NewBlob, Stores};
use parcel_core::types::{BlobId, BlobType, PackageId};

/// Route engine logs to the test output; filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Zip archive with `descriptor` as `package.json` plus extra entries.
pub fn package_zip(descriptor: Value, files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("package.json", options).unwrap();
    writer
        .write_all(serde_json::to_vec(&descriptor).unwrap().as_slice())
        .unwrap();
    for (name, bytes) in files {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Package `name` with keyword K1 (file k1.js), plan Pl1 calling it, and a
/// nightly schedule on Pl1.
pub fn sample_package(name: &str, keyword_body: &[u8]) -> Vec<u8> {
    package_zip(
        json!({
            "name": name,
            "version": "1.0",
            "keywords": [{ "name": "K1", "file": "k1.js" }],
            "plans": [{
                "name": "Pl1",
                "root": {
                    "type": "sequence",
                    "children": [{ "type": "callKeyword", "keyword": "K1" }]
                }
            }],
            "schedules": [{ "name": "nightly", "cron": "0 0 * * *", "plan_name": "Pl1" }]
        }),
        &[("k1.js", keyword_body)],
    )
}

/// Package `name` with a single plan and nothing else.
pub fn plan_only_package(name: &str, plan: &str) -> Vec<u8> {
    package_zip(
        json!({
            "name": name,
            "plans": [{ "name": plan, "root": { "type": "echo", "text": "hello" } }]
        }),
        &[],
    )
}

pub struct Harness {
    pub manager: PackageManager,
    pub blobs: Arc<MemoryBlobStore>,
    pub repository: Arc<FakeRepository>,
    pub staging: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    pub fn with_config(configure: impl FnOnce(EngineConfig) -> EngineConfig) -> Self {
        let blobs = Arc::new(MemoryBlobStore::default());
        Self::build(blobs.clone(), blobs, configure)
    }

    /// Harness whose live blob store is `store`; `blobs` is its backing store.
    pub fn with_blob_store(store: Arc<dyn BlobStore>, blobs: Arc<MemoryBlobStore>) -> Self {
        Self::build(store, blobs, |config| config)
    }

    fn build(
        store: Arc<dyn BlobStore>,
        blobs: Arc<MemoryBlobStore>,
        configure: impl FnOnce(EngineConfig) -> EngineConfig,
    ) -> Self {
        init_tracing();
        let staging = TempDir::new().unwrap();
        let repository = Arc::new(FakeRepository::default());
        let config = configure(EngineConfig::default().with_staging_root(staging.path()));
        let manager = EngineContext::new(config)
            .with_stores(Stores::in_memory().with_blobs(store))
            .with_client(repository.clone())
            .build()
            .unwrap();
        Self {
            manager,
            blobs,
            repository,
            staging,
        }
    }

    pub fn package(&self, id: &PackageId) -> Package {
        self.manager.get_package(id).unwrap()
    }

    pub fn blob(&self, id: &BlobId) -> Blob {
        self.blobs.get(id).unwrap().unwrap()
    }

    /// Staging directories left behind.
    pub fn staging_entries(&self) -> usize {
        std::fs::read_dir(self.staging.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// In-process artifact repository. Snapshot timestamps are set by the test.
#[derive(Default)]
pub struct FakeRepository {
    artifacts: Mutex<HashMap<String, (i64, Vec<u8>)>>,
    downloads: AtomicUsize,
}

impl FakeRepository {
    pub fn publish(&self, coordinate: &MavenCoordinate, timestamp: i64, bytes: Vec<u8>) {
        self.artifacts
            .lock()
            .insert(coordinate.to_string(), (timestamp, bytes));
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    fn lookup(&self, coordinate: &MavenCoordinate) -> anyhow::Result<(i64, Vec<u8>)> {
        self.artifacts
            .lock()
            .get(&coordinate.to_string())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Artifact {} not found", coordinate))
    }
}

impl ArtifactClient for FakeRepository {
    fn fetch_metadata(
        &self,
        coordinate: &MavenCoordinate,
        known_timestamp: Option<i64>,
    ) -> anyhow::Result<Option<SnapshotMetadata>> {
        if !coordinate.is_snapshot() {
            return Ok(None);
        }
        let (timestamp, _) = self.lookup(coordinate)?;
        Ok(Some(SnapshotMetadata {
            is_newer: known_timestamp.is_none_or(|known| timestamp > known),
            timestamp,
        }))
    }

    fn download(
        &self,
        coordinate: &MavenCoordinate,
        _known_timestamp: Option<i64>,
    ) -> anyhow::Result<DownloadedArtifact> {
        let (timestamp, bytes) = self.lookup(coordinate)?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(DownloadedArtifact {
            file_name: coordinate.file_name(),
            bytes,
            metadata: coordinate.is_snapshot().then_some(SnapshotMetadata {
                is_newer: true,
                timestamp,
            }),
        })
    }
}

/// Reads everything, writes nothing.
pub struct ReadOnly;

impl AccessPolicy for ReadOnly {
    fn check_package_write(&self, package: &Package) -> anyhow::Result<()> {
        anyhow::bail!("package {} is read-only", package.name)
    }

    fn check_blob_write(&self, blob: &Blob) -> anyhow::Result<()> {
        anyhow::bail!("blob {} is read-only", blob.id)
    }
}

/// Blob store whose imports fail on demand.
pub struct FlakyBlobStore {
    inner: Arc<MemoryBlobStore>,
    fail_imports: AtomicBool,
}

impl FlakyBlobStore {
    pub fn new(inner: Arc<MemoryBlobStore>) -> Self {
        Self {
            inner,
            fail_imports: AtomicBool::new(false),
        }
    }

    pub fn fail_imports(&self, fail: bool) {
        self.fail_imports.store(fail, Ordering::SeqCst);
    }
}

impl BlobStore for FlakyBlobStore {
    fn get(&self, id: &BlobId) -> anyhow::Result<Option<Blob>> {
        self.inner.get(id)
    }

    fn content(&self, id: &BlobId) -> anyhow::Result<Option<Vec<u8>>> {
        self.inner.content(id)
    }

    fn find_by_origin(&self, origin: &str, blob_type: BlobType) -> anyhow::Result<Option<Blob>> {
        self.inner.find_by_origin(origin, blob_type)
    }

    fn find_by_owner(&self, owner: &PackageId) -> anyhow::Result<Vec<Blob>> {
        self.inner.find_by_owner(owner)
    }

    fn list(&self) -> anyhow::Result<Vec<Blob>> {
        self.inner.list()
    }

    fn create(&self, blob: NewBlob) -> anyhow::Result<Blob> {
        self.inner.create(blob)
    }

    fn import(&self, blob: &Blob, content: Vec<u8>) -> anyhow::Result<()> {
        if self.fail_imports.load(Ordering::SeqCst) {
            anyhow::bail!("import of blob {} failed", blob.id);
        }
        self.inner.import(blob, content)
    }

    fn overwrite_content(
        &self,
        id: &BlobId,
        content: Vec<u8>,
        origin_timestamp: Option<i64>,
    ) -> anyhow::Result<Blob> {
        self.inner.overwrite_content(id, content, origin_timestamp)
    }

    fn delete(&self, id: &BlobId) -> anyhow::Result<bool> {
        self.inner.delete(id)
    }
}
