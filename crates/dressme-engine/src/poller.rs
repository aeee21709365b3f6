use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use dressme_contracts::jobs::{GenerationJob, JobHandle, OperationSnapshot};
use tracing::{debug, info};

use crate::backend::{extract_operation_error, extract_video_locator, GenerationBackend};
use crate::config::PollConfig;
use crate::error::{StudioError, StudioResult};

/// Clock seam for the poll loop.
pub trait Pacer {
    fn pause(&mut self, delay: Duration);
    fn elapsed(&self) -> Duration;
}

/// Blocks the calling thread between polls.
#[derive(Debug)]
pub struct ThreadPacer {
    started: Instant,
}

impl Default for ThreadPacer {
    fn default() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Pacer for ThreadPacer {
    fn pause(&mut self, delay: Duration) {
        thread::sleep(delay);
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OperationPoller {
    config: PollConfig,
}

impl OperationPoller {
    pub fn new(config: PollConfig) -> Self {
        Self { config }
    }

    /// Polls until the operation reports done, waiting `interval` before
    /// every query and always querying with the handle from the most recent
    /// snapshot. With a timeout, no query is issued past the deadline.
    pub fn wait<R, P>(
        &self,
        initial: OperationSnapshot,
        mut refresh: R,
        pacer: &mut P,
    ) -> StudioResult<GenerationJob>
    where
        R: FnMut(&JobHandle) -> StudioResult<OperationSnapshot>,
        P: Pacer,
    {
        let mut snapshot = initial;
        let mut attempt: u32 = 0;
        while !snapshot.done {
            if let Some(limit) = self.config.timeout {
                if pacer.elapsed() + self.config.interval > limit {
                    return Err(StudioError::PollTimedOut(limit));
                }
            }
            pacer.pause(self.config.interval);
            attempt += 1;
            debug!(attempt, handle = %snapshot.handle, "refreshing operation status");
            snapshot = refresh(&snapshot.handle)?;
        }

        let Some(locator) = extract_video_locator(&snapshot.payload) else {
            let detail = extract_operation_error(&snapshot.payload)
                .unwrap_or_else(|| "operation finished without a video".to_string());
            return Err(StudioError::NoResultProduced(detail));
        };
        info!(attempts = attempt, handle = %snapshot.handle, "operation finished");
        Ok(GenerationJob::completed(snapshot.handle, locator))
    }

    /// Waits on `initial` through `backend` with the given credential.
    pub fn wait_on<P: Pacer>(
        &self,
        backend: &dyn GenerationBackend,
        api_key: &str,
        initial: OperationSnapshot,
        pacer: &mut P,
    ) -> StudioResult<GenerationJob> {
        self.wait(
            initial,
            |handle| backend.refresh_operation(api_key, handle),
            pacer,
        )
    }
}

/// Downloads the finished job's asset into `out_dir` and returns the local
/// path. The remote locator stays inside this function.
pub fn fetch_asset(
    backend: &dyn GenerationBackend,
    api_key: &str,
    job: &GenerationJob,
    out_dir: &Path,
    file_stem: &str,
) -> StudioResult<PathBuf> {
    let locator = job
        .result()
        .ok_or_else(|| StudioError::NoResultProduced("job has not finished".to_string()))?;
    let bytes = backend.download(api_key, locator)?;
    if bytes.is_empty() {
        return Err(StudioError::NoResultProduced("downloaded video is empty".to_string()));
    }
    fs::create_dir_all(out_dir)?;
    let path = out_dir.join(format!("{file_stem}.mp4"));
    fs::write(&path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "video saved");
    Ok(path)
}
