use std::sync::Arc;

use application::{AuthService, ConversationService, MessageService, PresenceService};

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub conversation_service: Arc<ConversationService>,
    pub message_service: Arc<MessageService>,
    pub presence_service: Arc<PresenceService>,
}

impl AppState {
    pub fn new(
        auth_service: Arc<AuthService>,
        conversation_service: Arc<ConversationService>,
        message_service: Arc<MessageService>,
        presence_service: Arc<PresenceService>,
    ) -> Self {
        Self {
            auth_service,
            conversation_service,
            message_service,
            presence_service,
        }
    }
}
