use std::sync::Arc;

use anyhow::Result;
use flume::Sender;
use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::history::ConversationRegistry;
use crate::llm_client::GenerationClient;
use crate::orchestrator::{TurnCompletion, TurnOrchestrator};

/// Wires the registry, client and orchestrator together. Completions for
/// every submitted turn arrive on the channel given at bootstrap; a single
/// consumer on that channel is the designated delivery point.
pub struct AssistantRuntime {
    pub config: AssistantConfig,
    pub history: Arc<ConversationRegistry>,
    orchestrator: Arc<TurnOrchestrator>,
    completion_tx: Sender<TurnCompletion>,
}

impl AssistantRuntime {
    pub fn bootstrap(
        config: AssistantConfig,
        completion_tx: Sender<TurnCompletion>,
    ) -> Result<Self> {
        let history = Arc::new(ConversationRegistry::new(&config.data_dir)?);
        let client = Arc::new(GenerationClient::new(&config));
        let orchestrator = Arc::new(TurnOrchestrator::new(
            history.clone(),
            client,
            config.context_messages,
        ));

        tracing::info!(
            "Assistant runtime ready (model={}, data_dir={})",
            config.model,
            config.data_dir
        );

        Ok(Self {
            config,
            history,
            orchestrator,
            completion_tx,
        })
    }

    /// Queue one turn for `identity`; the reply is delivered on the
    /// completion channel, never inline.
    pub fn submit(&self, identity: Uuid, user_text: String) {
        self.orchestrator
            .spawn_turn(identity, user_text, self.completion_tx.clone());
    }

    /// Rebuild the generation side from a fresh config (endpoint, credential
    /// or model changes). Open conversation handles are untouched.
    pub fn reload(&mut self, config: AssistantConfig) {
        let client = Arc::new(GenerationClient::new(&config));
        self.orchestrator = Arc::new(TurnOrchestrator::new(
            self.history.clone(),
            client,
            config.context_messages,
        ));
        tracing::info!("Generation client reloaded (model={})", config.model);
        self.config = config;
    }

    /// Release every cached conversation handle. Called once at shutdown.
    pub fn shutdown(&self) {
        self.history.close_all();
    }
}
