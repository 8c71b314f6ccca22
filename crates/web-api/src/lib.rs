//! Web API 层。
//!
//! 提供 Axum 路由，把 HTTP 请求委托给应用层的用例服务。
//! 错误统一渲染成 `{"detail": ...}`，路径带尾斜杠。

mod auth;
mod error;
mod routes;
mod state;

pub use auth::CurrentUser;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
