//! Background job subsystem: entity, store, cancellation, orchestration
//! and the polling query surface.

pub mod cancel;
pub mod model;
pub mod orchestrator;
pub mod service;
pub mod store;

pub use cancel::CancelRegistry;
pub use model::{CANCEL_MESSAGE, Job, JobStatus};
pub use orchestrator::Orchestrator;
pub use service::JobService;
pub use store::JobStore;
