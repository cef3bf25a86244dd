//! The orchestrator tying store, metrics and engine together.

pub mod quality;
pub mod session;

pub use quality::QualityAssessmentService;
pub use session::Session;
