//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务，处理输入校验、权限判断，
//! 以及对外部适配器（例如存储、密码哈希、实时推送）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod conversation;
pub mod error;
pub mod memory;
pub mod password;
pub mod registry;
pub mod repository;
pub mod services;

pub use broadcaster::{
    BroadcastError, ConnectionId, ConnectionRegistry, MessageBroadcaster, RealtimeEvent,
    Subscription,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use conversation::ConversationResolver;
pub use error::ApplicationError;
pub use memory::MemoryStore;
pub use password::{PasswordHasher, PasswordHasherError, PlaintextPasswordHasher};
pub use registry::LocalConnectionRegistry;
pub use repository::{
    CategoryRepository, ConversationRepository, DailyActivity, DashboardRepository,
    ListingRepository, MessageRepository, MonthlyCount, ReviewRepository, UserRepository,
};
pub use services::{
    AdminCreateUserRequest, AuthenticateUserRequest, CategoryService,
    CategoryServiceDependencies, DashboardService, DashboardServiceDependencies, DashboardStats,
    ListingService, ListingServiceDependencies, MessagingService, MessagingServiceDependencies,
    RegisterUserRequest, ReviewService, ReviewServiceDependencies, SendMessageRequest,
    UserService, UserServiceDependencies,
};
