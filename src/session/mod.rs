pub mod orchestrator;
pub mod provider;

pub use orchestrator::{SessionOrchestrator, SessionState, Transition};
pub use provider::{HandoffProvider, ProviderSession, ProviderState};
