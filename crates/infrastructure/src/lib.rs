//! 基础设施层：PostgreSQL 仓储实现与发信通道。

pub mod db;
pub mod mailer;
pub mod repository;

pub use db::{create_pool, DbPool};
pub use mailer::LogMailer;
pub use repository::PgStore;
