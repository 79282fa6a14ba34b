//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP 请求委托给应用层的用例服务，
//! 并承载实时网关的 WebSocket 通道。

mod auth;
mod error;
mod gateway;
mod routes;
mod state;

pub use auth::{AuthUser, Claims, JwtService};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
