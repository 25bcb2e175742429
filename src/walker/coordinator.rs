//! Archive coordinator - drives the walk and the archive pipeline
//!
//! Levels are pulled from the `PathWalker` one at a time and streamed
//! through tar encoding and compression into a temporary output file.
//! Encoding runs on the blocking pool so fetch tasks keep the runtime
//! threads. Only a fully written archive is renamed into place.

use crate::archive::{ArchiveWriter, Encoder, FetchedObject, OutputFile};
use crate::config::ArchiveConfig;
use crate::error::{BucketTarError, Result};
use crate::store::{open_store, ObjectStore};
use crate::walker::path_walker::{PathWalker, WalkOptions};
use humansize::{format_size, BINARY};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type Pipeline = ArchiveWriter<Encoder<OutputFile>>;

/// Progress snapshot after each level
#[derive(Debug, Clone, Default)]
pub struct ArchiveProgress {
    pub levels: u64,
    pub objects: u64,
    pub bytes: u64,
    /// Prefixes still queued
    pub pending: usize,
    pub elapsed: Duration,
}

impl ArchiveProgress {
    /// Objects archived per second
    pub fn objects_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.objects as f64 / secs
        } else {
            0.0
        }
    }
}

/// Result of a completed archive run
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub levels: u64,
    pub objects: u64,
    /// Raw object bytes
    pub payload_bytes: u64,
    /// Uncompressed tar bytes, excluding the terminator
    pub archive_bytes: u64,
    /// Bytes of the saved file
    pub output_bytes: u64,
    pub duration: Duration,
    pub output: PathBuf,
}

/// Walks a bucket prefix and saves it as one compressed tar archive
pub struct ArchiveCoordinator {
    config: Arc<ArchiveConfig>,
    store: Arc<dyn ObjectStore>,
    shutdown: Arc<AtomicBool>,
}

impl ArchiveCoordinator {
    /// Open the store named by the config's bucket URL
    pub fn new(config: ArchiveConfig) -> Result<Self> {
        let store = open_store(&config.bucket_url, &config.store)?;
        Ok(Self::with_store(config, store))
    }

    /// Use an already opened store
    pub fn with_store(config: ArchiveConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get shutdown flag for signal handlers
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the walk and write the archive
    pub async fn run(self) -> Result<ArchiveSummary> {
        self.run_with_progress(|_| {}).await
    }

    /// Run, reporting progress after every level
    pub async fn run_with_progress<F>(self, mut on_progress: F) -> Result<ArchiveSummary>
    where
        F: FnMut(&ArchiveProgress),
    {
        let start = Instant::now();
        let config = Arc::clone(&self.config);
        let root = config.bucket_url.walk_root();

        info!(
            url = %config.bucket_url.to_display_string(),
            bucket = self.store.bucket(),
            workers = config.worker_count,
            compression = config.compression.name(),
            output = %config.output_path.display(),
            "Starting archive"
        );

        let output = OutputFile::create(&config.output_path)?;
        let encoder = config.compression.encoder(output, config.level)?;
        let mut archive: Pipeline = ArchiveWriter::new(encoder);

        let mut walker = PathWalker::new(
            Arc::clone(&self.store),
            root,
            config.worker_count,
            WalkOptions::from_config(&config),
        );
        let mut progress = ArchiveProgress::default();

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                warn!("Shutdown requested, discarding partial archive");
                return Err(BucketTarError::Interrupted);
            }

            let Some(level) = walker.next_level().await? else {
                break;
            };

            progress.levels += 1;
            progress.objects += level.objects.len() as u64;
            progress.bytes += level.bytes();

            debug!(
                prefix = %level.prefix,
                objects = level.objects.len(),
                bytes = %format_size(level.bytes(), BINARY),
                "Appending level"
            );
            archive = append_level(archive, level.objects).await?;

            progress.pending = walker.pending();
            progress.elapsed = start.elapsed();
            on_progress(&progress);
        }

        let objects = archive.entries();
        let payload_bytes = archive.payload_bytes();
        let archive_bytes = archive.archive_bytes();

        let output_bytes = tokio::task::spawn_blocking(move || -> Result<u64> {
            let encoder = archive.finish()?;
            let output = encoder.finish()?;
            Ok(output.persist()?)
        })
        .await
        .map_err(|e| BucketTarError::Task(e.to_string()))??;

        let duration = start.elapsed();
        info!(
            objects,
            levels = progress.levels,
            payload = %format_size(payload_bytes, BINARY),
            written = %format_size(output_bytes, BINARY),
            elapsed = ?duration,
            "Archive saved"
        );

        Ok(ArchiveSummary {
            levels: progress.levels,
            objects,
            payload_bytes,
            archive_bytes,
            output_bytes,
            duration,
            output: config.output_path.clone(),
        })
    }
}

/// Encode one level on the blocking pool, handing the pipeline back
async fn append_level(mut archive: Pipeline, objects: Vec<FetchedObject>) -> Result<Pipeline> {
    let (archive, result) = tokio::task::spawn_blocking(move || {
        let result = archive.append_all(&objects);
        (archive, result)
    })
    .await
    .map_err(|e| BucketTarError::Task(e.to_string()))?;

    result?;
    Ok(archive)
}
