//! Job queue: descriptors in, status records out.

pub mod descriptor;
pub mod status;
pub mod store;

pub use descriptor::{JobDescriptor, JobId, JobRequest};
pub use status::{JobState, Progress, StatusRecord, Summary, download_url};
pub use store::{Artifact, Boundary, CancelOutcome, Claim, DirQueue, JobQueue, JobView, Recovery};
