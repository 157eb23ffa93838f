// Radar analysis: prompt construction, response sanitization and the
// background worker that drives queued jobs to a terminal state.
// All model calls go through llm_client.

pub mod prompts;
pub mod sanitize;
pub mod worker;

pub use worker::{AnalysisWorker, WorkerOptions};
