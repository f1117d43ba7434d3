use std::sync::Arc;

use application::{
    CategoryService, ConnectionRegistry, DashboardService, ListingService, MessagingService,
    ReviewService, UserService,
};

use crate::JwtService;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub listing_service: Arc<ListingService>,
    pub category_service: Arc<CategoryService>,
    pub review_service: Arc<ReviewService>,
    pub messaging_service: Arc<MessagingService>,
    pub dashboard_service: Arc<DashboardService>,
    pub connections: Arc<dyn ConnectionRegistry>,
    pub jwt_service: Arc<JwtService>,
    /// 会话 cookie 是否带 `Secure; SameSite=None`
    pub cookie_secure: bool,
}
