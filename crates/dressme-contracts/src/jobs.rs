use std::fmt;

use serde_json::Value;

/// Opaque provider token for an in-flight operation. The provider may hand
/// back a different token on every status query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One status reading of a provider operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSnapshot {
    pub handle: JobHandle,
    pub done: bool,
    pub payload: Value,
}

impl OperationSnapshot {
    pub fn pending(handle: JobHandle) -> Self {
        Self {
            handle,
            done: false,
            payload: Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Done,
}

/// Client-side view of a generation job. `result` is set iff `status` is
/// `Done`; the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationJob {
    handle: JobHandle,
    status: JobStatus,
    result: Option<String>,
}

impl GenerationJob {
    pub fn pending(handle: JobHandle) -> Self {
        Self {
            handle,
            status: JobStatus::Pending,
            result: None,
        }
    }

    pub fn completed(handle: JobHandle, result: impl Into<String>) -> Self {
        Self {
            handle,
            status: JobStatus::Done,
            result: Some(result.into()),
        }
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_tracks_status() {
        let pending = GenerationJob::pending(JobHandle::new("ops/1"));
        assert_eq!(pending.status(), JobStatus::Pending);
        assert_eq!(pending.result(), None);

        let done = GenerationJob::completed(JobHandle::new("ops/2"), "https://files/v.mp4");
        assert_eq!(done.status(), JobStatus::Done);
        assert_eq!(done.result(), Some("https://files/v.mp4"));
        assert_eq!(done.handle().as_str(), "ops/2");
    }
}
