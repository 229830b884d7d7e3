//! Image loaders
//!
//! A loader turns a resolved path into decoded pixels off the render thread and
//! hands results back when polled. The engine never blocks on a loader.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::assets::{AssetResult, ImageData};

/// Outcome of one load
#[derive(Debug)]
pub struct LoadedImage {
    /// Cache key the load was started for
    pub key: String,
    /// Decoded pixels or the failure
    pub result: AssetResult<ImageData>,
}

/// Source of decoded images
pub trait ImageLoader {
    /// Start loading `path` for cache entry `key`
    fn begin(&mut self, key: &str, path: &Path);

    /// Collect every load that finished since the last poll
    fn poll(&mut self) -> Vec<LoadedImage>;
}

/// Work handed to a loader thread
#[derive(Debug)]
struct LoadJob {
    key: String,
    path: PathBuf,
}

impl LoadJob {
    fn run(self) -> LoadedImage {
        let result = ImageData::from_file(&self.path);
        LoadedImage { key: self.key, result }
    }
}

/// Decodes files on a fixed pool of worker threads
///
/// Jobs queue on a shared channel, so a large batch of requests never runs
/// more decodes at once than there are workers.
#[derive(Debug)]
pub struct ThreadedImageLoader {
    jobs: Option<Sender<LoadJob>>,
    results: Receiver<LoadedImage>,
    workers: Vec<JoinHandle<()>>,
    in_flight: usize,
}

impl ThreadedImageLoader {
    /// Workers used by [`Self::new`]
    pub const DEFAULT_WORKERS: usize = 4;

    /// Create a loader with the default number of workers
    pub fn new() -> Self {
        Self::with_workers(Self::DEFAULT_WORKERS)
    }

    /// Create a loader backed by `count` worker threads (at least one)
    pub fn with_workers(count: usize) -> Self {
        let (job_sender, job_receiver) = mpsc::channel::<LoadJob>();
        let (result_sender, results) = mpsc::channel();
        let job_receiver = Arc::new(Mutex::new(job_receiver));

        let mut workers = Vec::with_capacity(count.max(1));
        for index in 0..count.max(1) {
            let jobs = Arc::clone(&job_receiver);
            let sender = result_sender.clone();
            let spawned = thread::Builder::new()
                .name(format!("image-load-{index}"))
                .spawn(move || loop {
                    let job = match jobs.lock() {
                        Ok(receiver) => receiver.recv(),
                        Err(_) => break,
                    };
                    let Ok(job) = job else { break };
                    // The engine may have been dropped; nothing to report to then
                    if sender.send(job.run()).is_err() {
                        break;
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => log::error!("Failed to spawn image loader thread: {}", e),
            }
        }
        log::debug!("Image loader started with {} workers", workers.len());

        Self {
            jobs: (!workers.is_empty()).then_some(job_sender),
            results,
            workers,
            in_flight: 0,
        }
    }

    /// Loads started but not yet polled
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Worker threads actually running
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Default for ThreadedImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadedImageLoader {
    fn drop(&mut self) {
        // Closing the job channel lets every worker fall out of its loop
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("Image loader thread panicked");
            }
        }
    }
}

impl ImageLoader for ThreadedImageLoader {
    fn begin(&mut self, key: &str, path: &Path) {
        let job = LoadJob {
            key: key.to_owned(),
            path: path.to_path_buf(),
        };
        self.in_flight += 1;

        let Some(jobs) = &self.jobs else {
            log::error!("No image loader threads; cannot load '{}'", key);
            self.in_flight -= 1;
            return;
        };
        if let Err(mpsc::SendError(job)) = jobs.send(job) {
            log::error!("Image loader threads are gone; dropping '{}'", job.key);
            self.in_flight -= 1;
        }
    }

    fn poll(&mut self) -> Vec<LoadedImage> {
        let done: Vec<LoadedImage> = self.results.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(done.len());
        done
    }
}

/// Loader that never reads anything itself
///
/// Pixels arrive through `SpriteEngine::provide_image`; useful for embedded
/// assets and for driving the engine deterministically in tests.
#[derive(Debug, Default)]
pub struct DeferredImageLoader {
    requested: Vec<(String, PathBuf)>,
}

impl DeferredImageLoader {
    /// Create an empty loader
    pub const fn new() -> Self {
        Self {
            requested: Vec::new(),
        }
    }

    /// Requests received so far, oldest first
    pub fn requested(&self) -> &[(String, PathBuf)] {
        &self.requested
    }
}

impl ImageLoader for DeferredImageLoader {
    fn begin(&mut self, key: &str, path: &Path) {
        log::debug!("Deferred image request for '{}' ({:?})", key, path);
        self.requested.push((key.to_owned(), path.to_path_buf()));
    }

    fn poll(&mut self) -> Vec<LoadedImage> {
        Vec::new()
    }
}
