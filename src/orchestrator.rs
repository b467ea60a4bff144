use std::sync::Arc;

use flume::Sender;
use futures_util::FutureExt;
use uuid::Uuid;

use crate::history::{ConversationRegistry, Role};
use crate::llm_client::{GenerationClient, PromptMessage};

/// Returned when generation produced nothing usable.
pub const NO_REPLY_NOTICE: &str = "No response (check server logs or API key/endpoint).";
/// Returned when a turn died somewhere it never should have.
pub const TURN_FAILED_NOTICE: &str = "An error occurred while processing your request.";

/// One finished turn, pushed onto the delivery channel exactly once.
#[derive(Debug, Clone)]
pub struct TurnCompletion {
    pub identity: Uuid,
    pub text: String,
}

/// Composes the conversation registry and the generation client into whole
/// turns: fetch context, persist the user message, call the endpoint, persist
/// the reply.
pub struct TurnOrchestrator {
    history: Arc<ConversationRegistry>,
    client: Arc<GenerationClient>,
    context_messages: usize,
}

impl TurnOrchestrator {
    pub fn new(
        history: Arc<ConversationRegistry>,
        client: Arc<GenerationClient>,
        context_messages: usize,
    ) -> Self {
        Self {
            history,
            client,
            context_messages,
        }
    }

    /// One conversational turn. The user message is persisted before the
    /// network call so it survives a failed generation; the assistant message
    /// is only written when a non-empty reply came back.
    pub async fn run_turn(&self, identity: Uuid, user_text: &str) -> String {
        let context = self.history.conversation(identity, self.context_messages);
        self.history.append(identity, Role::User, user_text);

        let mut outbound: Vec<PromptMessage> = context
            .iter()
            .map(|m| PromptMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();
        outbound.push(PromptMessage {
            role: Role::User.as_str().to_string(),
            content: user_text.to_string(),
        });

        match self.client.generate(&outbound).await {
            Some(reply) if !reply.trim().is_empty() => {
                self.history.append(identity, Role::Assistant, &reply);
                reply
            }
            _ => NO_REPLY_NOTICE.to_string(),
        }
    }

    /// Worker phase: run the turn off the caller's path and deliver exactly
    /// one completion, even if the turn panics.
    pub fn spawn_turn(
        self: &Arc<Self>,
        identity: Uuid,
        user_text: String,
        completion_tx: Sender<TurnCompletion>,
    ) {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            let text = match std::panic::AssertUnwindSafe(
                orchestrator.run_turn(identity, &user_text),
            )
            .catch_unwind()
            .await
            {
                Ok(text) => text,
                Err(_) => {
                    tracing::error!("Turn for {} panicked", identity);
                    TURN_FAILED_NOTICE.to_string()
                }
            };

            if completion_tx
                .send(TurnCompletion { identity, text })
                .is_err()
            {
                tracing::debug!("Completion receiver dropped; discarding reply for {}", identity);
            }
        });
    }
}
