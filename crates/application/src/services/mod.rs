mod auth_service;
mod conversation_service;
mod message_service;
mod presence_service;

#[cfg(test)]
mod auth_service_tests;
#[cfg(test)]
mod presence_service_tests;

pub use auth_service::{AuthService, AuthServiceDependencies};
pub use conversation_service::{
    ConversationService, ConversationServiceDependencies, ListConversationsRequest,
    DEFAULT_LIST_SIZE, MAX_LIST_SIZE,
};
pub use message_service::{
    FetchMessagesRequest, MessageService, MessageServiceDependencies, SendMessageRequest,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use presence_service::{PresenceService, PresenceServiceDependencies};
