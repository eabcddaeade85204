pub mod import;
pub mod extraction;
pub mod structuring;
pub mod retry;
pub mod workflow;
pub mod processor; // Document processing orchestrator
