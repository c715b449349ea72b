//! Shared application state handed to every handler and connection task

use std::sync::Arc;

use parley_shared::{ChatResult, ConversationSession};

use crate::auth::JwtManager;
use crate::chat::{
    AutoReplyScheduler, AutomatedResponseEngine, ConversationController, DashboardPresence,
};
use crate::config::Config;
use crate::store::{RuleStore, SessionStore};
use crate::websocket::WebSocketState;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jwt: JwtManager,
    pub ws_state: WebSocketState,
    pub controller: Arc<ConversationController>,
    pub scheduler: Arc<AutoReplyScheduler>,
    pub rules: Arc<dyn RuleStore>,
}

impl AppState {
    /// Wire the chat core on top of the given stores
    pub fn new(config: Config, sessions: Arc<dyn SessionStore>, rules: Arc<dyn RuleStore>) -> Self {
        let ws_state = WebSocketState::new(config.ws_outbound_buffer);

        let controller = Arc::new(ConversationController::new(
            sessions,
            Arc::clone(&ws_state.rooms),
            config.media_url.clone(),
        ));

        let engine = Arc::new(AutomatedResponseEngine::new(
            Arc::clone(&controller),
            Arc::clone(&rules),
            Arc::new(DashboardPresence::new(Arc::clone(&ws_state.rooms))),
            config.business_hours,
        ));

        let scheduler = Arc::new(AutoReplyScheduler::new(engine));

        Self {
            jwt: JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours),
            config: Arc::new(config),
            ws_state,
            controller,
            scheduler,
            rules,
        }
    }

    /// Close a conversation and drop any automated replies still queued
    /// for it
    pub async fn close_conversation(&self, customer_id: &str, closed_by: &str) -> ChatResult<ConversationSession> {
        let session = self.controller.close_conversation(customer_id, closed_by).await?;
        self.scheduler.cancel(customer_id);
        Ok(session)
    }
}
