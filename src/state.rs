use std::sync::Arc;

use crate::auth::{AuthProxy, JwtVerifier, SessionTokens};
use crate::chat::ChatService;
use crate::chatbot::ChatbotStore;
use crate::config::BotdeskConfig;
use crate::db::pool::DbPool;
use crate::providers::{create_provider, Provider};
use crate::rag::VectorClient;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: BotdeskConfig,
    pub store: ChatbotStore,
    pub vectors: VectorClient,
    pub chat: ChatService,
    pub jwt: JwtVerifier,
    pub sessions: SessionTokens,
    pub auth_proxy: AuthProxy,
}

impl AppState {
    /// Assemble state around an already-migrated pool and an explicit chat
    /// provider.
    pub fn new(
        config: BotdeskConfig,
        db: Arc<DbPool>,
        provider: Arc<dyn Provider>,
        jwt: JwtVerifier,
    ) -> SharedState {
        let vectors = VectorClient::new(&config.rag);
        let chat = ChatService::new(provider, vectors.clone());
        let sessions = SessionTokens::from_secret(
            config.auth.session_secret.as_deref(),
            config.auth.session_ttl_secs,
        );
        let auth_proxy = AuthProxy::new(&config.auth.service_url);
        Arc::new(Self {
            store: ChatbotStore::new(db),
            vectors,
            chat,
            jwt,
            sessions,
            auth_proxy,
            config,
        })
    }

    /// Build everything the config describes: provider and token verifier.
    pub fn from_config(config: BotdeskConfig, db: Arc<DbPool>) -> anyhow::Result<SharedState> {
        let provider = create_provider(&config.llm)?;
        let jwt = JwtVerifier::from_config(&config.auth)?;
        Ok(Self::new(config, db, provider, jwt))
    }
}
