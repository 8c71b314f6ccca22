//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、限流、
//! 已读水位推进，以及对外部适配器（仓储、发信）的抽象。

pub mod clock;
pub mod codes;
pub mod dto;
pub mod error;
pub mod mailer;
pub mod rate_limiter;
pub mod read_receipts;
pub mod repository;
pub mod services;
pub mod testing;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dto::{
    AuthUserDto, AuthenticatedUserDto, ConversationDto, ConversationPage, MessageDto, MessagePage,
    ParticipantDto, ProfileDto, TypingStatusDto, UserSummaryDto,
};
pub use error::ApplicationError;
pub use mailer::{LoginCodeMailer, MailerError};
pub use rate_limiter::{RateLimitPolicy, SlidingWindowLimiter};
pub use repository::{
    AuthTokenRepository, ConversationRepository, LoginCodeRepository, MembershipRepository,
    MessageRepository, ProfileRepository, TypingRepository, UserRepository,
};
pub use services::{
    AuthService, AuthServiceDependencies, ConversationService, ConversationServiceDependencies,
    MessageService, MessageServiceDependencies, PresenceService, PresenceServiceDependencies,
};
