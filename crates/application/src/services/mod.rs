mod category_service;
mod dashboard_service;
mod listing_service;
mod messaging_service;
mod review_service;
mod user_service;

use domain::Actor;

use crate::error::ApplicationError;

pub use category_service::{CategoryService, CategoryServiceDependencies};
pub use dashboard_service::{DashboardService, DashboardServiceDependencies, DashboardStats};
pub use listing_service::{ListingService, ListingServiceDependencies};
pub use messaging_service::{MessagingService, MessagingServiceDependencies, SendMessageRequest};
pub use review_service::{ReviewService, ReviewServiceDependencies};
pub use user_service::{
    AdminCreateUserRequest, AuthenticateUserRequest, RegisterUserRequest, UserService,
    UserServiceDependencies,
};

/// 管理操作要求特权角色。
fn ensure_privileged(actor: &Actor) -> Result<(), ApplicationError> {
    if actor.is_privileged() {
        Ok(())
    } else {
        Err(ApplicationError::Authorization)
    }
}
