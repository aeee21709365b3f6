use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{StudioError, StudioResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Look,
    Background,
    Video,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Look => "look",
            JobKind::Background => "background edit",
            JobKind::Video => "video",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-slot registry of the in-flight generation job. At most one job
/// may be claimed at a time; the slot frees itself when the guard drops.
#[derive(Debug, Default)]
pub struct JobRegistry {
    active: Mutex<Option<JobKind>>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn claim(self: &Arc<Self>, kind: JobKind) -> StudioResult<JobGuard> {
        let mut active = self.lock()?;
        if let Some(running) = *active {
            return Err(StudioError::JobAlreadyRunning(running.as_str()));
        }
        *active = Some(kind);
        Ok(JobGuard {
            registry: Arc::clone(self),
            kind,
        })
    }

    pub fn active(&self) -> Option<JobKind> {
        self.lock().ok().and_then(|active| *active)
    }

    fn lock(&self) -> StudioResult<MutexGuard<'_, Option<JobKind>>> {
        self.active
            .lock()
            .map_err(|_| StudioError::Other(anyhow::anyhow!("job registry lock poisoned")))
    }
}

#[derive(Debug)]
pub struct JobGuard {
    registry: Arc<JobRegistry>,
    kind: JobKind,
}

impl JobGuard {
    pub fn kind(&self) -> JobKind {
        self.kind
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.registry.active.lock() {
            *active = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_release() -> anyhow::Result<()> {
        let registry = JobRegistry::new();
        let guard = registry.claim(JobKind::Video)?;
        assert_eq!(guard.kind(), JobKind::Video);
        assert_eq!(registry.active(), Some(JobKind::Video));

        match registry.claim(JobKind::Look) {
            Err(StudioError::JobAlreadyRunning(kind)) => assert_eq!(kind, "video"),
            other => panic!("unexpected claim result: {other:?}"),
        }

        drop(guard);
        assert_eq!(registry.active(), None);
        let _again = registry.claim(JobKind::Look)?;
        Ok(())
    }

    #[test]
    fn claim_is_shared_across_clones() -> anyhow::Result<()> {
        let registry = JobRegistry::new();
        let other = Arc::clone(&registry);
        let _guard = registry.claim(JobKind::Background)?;
        assert!(other.claim(JobKind::Video).is_err());
        Ok(())
    }
}
