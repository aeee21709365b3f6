//! Generation engine for DressMe: upload normalization, provider backends,
//! the long-running-operation poller, and the studio session that ties
//! them together.

pub mod backend;
pub mod config;
pub mod error;
#[cfg(feature = "heif")]
mod heif;
pub mod jobs;
pub mod normalize;
pub mod poller;
pub mod studio;

pub use backend::{default_backend_registry, BackendRegistry, GenerationBackend};
pub use config::StudioConfig;
pub use error::{StudioError, StudioResult};
pub use jobs::{JobKind, JobRegistry};
pub use normalize::ImageNormalizer;
pub use poller::{OperationPoller, Pacer, ThreadPacer};
pub use studio::{Studio, StudioStatus};
