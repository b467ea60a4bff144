pub mod config;
pub mod history;
pub mod llm_client;
pub mod orchestrator;
pub mod runtime;

pub use config::AssistantConfig;
pub use history::{ConversationRegistry, Message, Role};
pub use llm_client::{GenerationClient, PromptMessage};
pub use orchestrator::{TurnCompletion, TurnOrchestrator, NO_REPLY_NOTICE, TURN_FAILED_NOTICE};
pub use runtime::AssistantRuntime;
