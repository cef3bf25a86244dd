pub mod engine;

pub use engine::{contribution, AssessmentEngine, NEUTRAL_SCORE};
