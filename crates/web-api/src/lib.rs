//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP / WebSocket 请求委托给应用层的用例服务。

mod admin_routes;
mod auth;
mod category_routes;
mod error;
mod listing_routes;
mod message_routes;
mod review_routes;
mod routes;
mod state;
mod user_routes;
mod validation;
mod ws_connection;

pub use auth::{AuthUser, Claims, JwtService, ACCESS_COOKIE, REFRESH_COOKIE};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
pub use user_routes::LoginResponse;
