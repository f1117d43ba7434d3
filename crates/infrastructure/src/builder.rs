use std::sync::Arc;

use application::{
    CategoryRepository, ConversationRepository, DashboardRepository, ListingRepository,
    MemoryStore, MessageRepository, PasswordHasher, ReviewRepository, UserRepository,
};
use config::{AppConfig, StorageBackend};
use thiserror::Error;
use tracing::info;

use crate::{
    migrations::MIGRATOR,
    password::BcryptPasswordHasher,
    repository::{create_pg_pool, PgStorage},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 各仓储端口的具体实现，服务层只看到 trait 对象。
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub listings: Arc<dyn ListingRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub reviews: Arc<dyn ReviewRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub dashboard: Arc<dyn DashboardRepository>,
}

impl Storage {
    pub fn memory() -> Self {
        Self::from_memory(Arc::new(MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            listings: store.clone(),
            categories: store.clone(),
            reviews: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
            dashboard: store,
        }
    }

    pub fn postgres(storage: PgStorage) -> Self {
        Self {
            users: storage.user_repository,
            listings: storage.listing_repository,
            categories: storage.category_repository,
            reviews: storage.review_repository,
            conversations: storage.conversation_repository,
            messages: storage.message_repository,
            dashboard: storage.dashboard_repository,
        }
    }
}

#[derive(Clone)]
pub struct Infrastructure {
    pub storage: Storage,
    pub password_hasher: Arc<dyn PasswordHasher>,
}

impl Infrastructure {
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let storage = match config.storage.backend {
            StorageBackend::Postgres => {
                let pool =
                    create_pg_pool(&config.database.url, config.database.max_connections).await?;
                if config.storage.run_migrations {
                    MIGRATOR.run(&pool).await?;
                    info!("数据库迁移完成");
                }
                Storage::postgres(PgStorage::new(pool))
            }
            StorageBackend::Memory => {
                info!("使用内存存储，进程退出后数据丢失");
                Storage::memory()
            }
        };

        Ok(Self {
            storage,
            password_hasher: Arc::new(BcryptPasswordHasher::new(config.server.bcrypt_cost)),
        })
    }
}
