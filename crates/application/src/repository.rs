//! 持久化端口。
//!
//! 所有读取默认排除已软删除的记录，`ReadScope::IncludeDestroyed` 供管理视图使用。
//! 更新结构体本身不携带不可变字段（标识、卖家、作者、创建时间）。

use async_trait::async_trait;
use chrono::NaiveDate;
use domain::{
    Category, CategoryId, CategoryQuery, Conversation, ConversationId, Listing, ListingId,
    ListingQuery, ListingStatus, ListingWithSeller, Message, PairKey, ReadScope, RepositoryError,
    Review, ReviewId, Timestamp, User, UserEmail, UserId, UserQuery,
};
use serde::Serialize;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 邮箱重复时返回 `RepositoryError::Conflict`。
    async fn create(&self, user: User) -> Result<User, RepositoryError>;
    async fn update(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_id(&self, id: UserId, scope: ReadScope)
        -> Result<Option<User>, RepositoryError>;
    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError>;
    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError>;
    async fn find(&self, query: &UserQuery) -> Result<Vec<User>, RepositoryError>;
    async fn count(&self, query: &UserQuery) -> Result<u64, RepositoryError>;
    async fn soft_delete(&self, id: UserId) -> Result<bool, RepositoryError>;
    /// 集合语义：重复添加不产生重复项。
    async fn add_favorite(
        &self,
        id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<User>, RepositoryError>;
    async fn remove_favorite(
        &self,
        id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<User>, RepositoryError>;
}

#[async_trait]
pub trait ListingRepository: Send + Sync {
    async fn create(&self, listing: Listing) -> Result<Listing, RepositoryError>;
    async fn update(&self, listing: Listing) -> Result<Listing, RepositoryError>;
    async fn find_by_id(
        &self,
        id: ListingId,
        scope: ReadScope,
    ) -> Result<Option<Listing>, RepositoryError>;
    async fn find_by_ids(&self, ids: &[ListingId]) -> Result<Vec<Listing>, RepositoryError>;
    /// 过滤、排序、分页，并连接卖家公开信息。
    async fn search(&self, query: &ListingQuery) -> Result<Vec<ListingWithSeller>, RepositoryError>;
    async fn count(&self, query: &ListingQuery) -> Result<u64, RepositoryError>;
    /// 单次条件写入：浏览者不是卖家且未计数时，计数加一并记录浏览者。
    /// 条件不满足时返回 `None`，这不是错误。
    async fn record_view(
        &self,
        id: ListingId,
        viewer: UserId,
    ) -> Result<Option<Listing>, RepositoryError>;
    async fn soft_delete(&self, id: ListingId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// `code` 与未删除分类重复时返回 `RepositoryError::Conflict`。
    async fn create(&self, category: Category) -> Result<Category, RepositoryError>;
    async fn update(&self, category: Category) -> Result<Category, RepositoryError>;
    async fn find_by_id(
        &self,
        id: CategoryId,
        scope: ReadScope,
    ) -> Result<Option<Category>, RepositoryError>;
    async fn find_by_code(&self, code: &str) -> Result<Option<Category>, RepositoryError>;
    async fn find(&self, query: &CategoryQuery) -> Result<Vec<Category>, RepositoryError>;
    async fn count(&self, query: &CategoryQuery) -> Result<u64, RepositoryError>;
    async fn soft_delete(&self, id: CategoryId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ReviewRepository: Send + Sync {
    async fn create(&self, review: Review) -> Result<Review, RepositoryError>;
    async fn update(&self, review: Review) -> Result<Review, RepositoryError>;
    async fn find_by_id(
        &self,
        id: ReviewId,
        scope: ReadScope,
    ) -> Result<Option<Review>, RepositoryError>;
    /// 最新优先。
    async fn list_by_listing(&self, listing_id: ListingId) -> Result<Vec<Review>, RepositoryError>;
    async fn soft_delete(&self, id: ReviewId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: ConversationId,
        scope: ReadScope,
    ) -> Result<Option<Conversation>, RepositoryError>;
    async fn find_by_pair(&self, key: &PairKey) -> Result<Option<Conversation>, RepositoryError>;
    /// 规范键上存在未删除的会话时不写入并返回 `None`。
    async fn insert_if_absent(
        &self,
        conversation: Conversation,
    ) -> Result<Option<Conversation>, RepositoryError>;
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError>;
    /// 软删除会话及其全部消息。
    async fn soft_delete(&self, id: ConversationId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn append(&self, message: Message) -> Result<Message, RepositoryError>;
    /// 按创建时间升序，不分页。
    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError>;
    /// 每个会话的最后一条消息。
    async fn latest_for_conversations(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<Vec<Message>, RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCount {
    pub year: i32,
    pub month: u32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub active: u64,
    pub inactive: u64,
}

#[async_trait]
pub trait DashboardRepository: Send + Sync {
    async fn count_users(&self, since: Option<Timestamp>) -> Result<u64, RepositoryError>;
    async fn count_listings_with_status(&self, status: ListingStatus)
        -> Result<u64, RepositoryError>;
    /// 自 `since` 起按月统计注册人数，只返回有数据的月份。
    async fn monthly_user_signups(
        &self,
        since: Timestamp,
    ) -> Result<Vec<MonthlyCount>, RepositoryError>;
    /// 自 `since` 起按天统计新建商品，已发布计为 active。
    async fn daily_listing_activity(
        &self,
        since: Timestamp,
    ) -> Result<Vec<DailyActivity>, RepositoryError>;
    async fn recent_users(&self, limit: u32) -> Result<Vec<User>, RepositoryError>;
    async fn recent_listings(&self, limit: u32) -> Result<Vec<Listing>, RepositoryError>;
}
