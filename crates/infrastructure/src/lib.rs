//! 基础设施层实现。
//!
//! 提供 Postgres 仓储、bcrypt 密码哈希与存储后端装配，实现应用层定义的端口。

pub mod builder;
pub mod migrations;
pub mod password;
pub mod repository;

pub use builder::{Infrastructure, InfrastructureError, Storage};
pub use migrations::MIGRATOR;
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgCategoryRepository, PgConversationRepository, PgDashboardRepository,
    PgListingRepository, PgMessageRepository, PgReviewRepository, PgStorage, PgUserRepository,
};
