pub mod gemini;
pub mod orchestrator;
pub mod prompts;
pub mod session;

pub use orchestrator::Assistant;
