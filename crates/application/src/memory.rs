//! 内存存储后端。
//!
//! 所有表放在同一把读写锁下，每个写操作在一次加锁内完成检查与修改，
//! 因此条件写入（浏览计数、会话规范键）与数据库实现具有相同的原子性。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Datelike;
use domain::{
    Category, CategoryId, CategoryQuery, Conversation, ConversationId, Listing, ListingId,
    ListingQuery, ListingStatus, ListingWithSeller, Message, PageRequest, PairKey, ReadScope,
    RepositoryError, Review, ReviewId, Timestamp, User, UserEmail, UserId, UserQuery,
};
use tokio::sync::RwLock;

use crate::repository::{
    CategoryRepository, ConversationRepository, DailyActivity, DashboardRepository,
    ListingRepository, MessageRepository, MonthlyCount, ReviewRepository, UserRepository,
};

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    listings: HashMap<ListingId, Listing>,
    categories: HashMap<CategoryId, Category>,
    reviews: HashMap<ReviewId, Review>,
    conversations: HashMap<ConversationId, Conversation>,
    messages: Vec<Message>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未删除的会话数量。
    pub async fn conversation_count(&self) -> usize {
        self.tables
            .read()
            .await
            .conversations
            .values()
            .filter(|c| !c.destroyed)
            .count()
    }
}

fn paginate<T>(items: Vec<T>, page: PageRequest) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect()
}

fn email_taken(tables: &Tables, email: &UserEmail, except: UserId) -> bool {
    tables
        .users
        .values()
        .any(|u| !u.destroyed && u.id != except && &u.email == email)
}

fn code_taken(tables: &Tables, code: Option<&str>, except: CategoryId) -> bool {
    match code {
        Some(code) => tables
            .categories
            .values()
            .any(|c| !c.destroyed && c.id != except && c.code.as_deref() == Some(code)),
        None => false,
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (Timestamp, String)) {
    items.sort_by_key(|item| std::cmp::Reverse(key(item)));
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.id) || email_taken(&tables, &user.email, user.id) {
            return Err(RepositoryError::conflict("users_email_key"));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user.id) {
            return Err(RepositoryError::NotFound);
        }
        if email_taken(&tables, &user.email, user.id) {
            return Err(RepositoryError::conflict("users_email_key"));
        }
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(
        &self,
        id: UserId,
        scope: ReadScope,
    ) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .get(&id)
            .filter(|u| scope.admits(u.destroyed))
            .cloned())
    }

    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.users.get(id))
            .filter(|u| !u.destroyed)
            .cloned()
            .collect())
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| !u.destroyed && &u.email == email)
            .cloned())
    }

    async fn find(&self, query: &UserQuery) -> Result<Vec<User>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .filter(|u| query.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| query.compare(a, b));
        Ok(paginate(users, query.page))
    }

    async fn count(&self, query: &UserQuery) -> Result<u64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().filter(|u| query.matches(u)).count() as u64)
    }

    async fn soft_delete(&self, id: UserId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.users.get_mut(&id) {
            Some(user) if !user.destroyed => {
                user.destroyed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn add_favorite(
        &self,
        id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).filter(|u| !u.destroyed).map(|user| {
            if !user.favorites.contains(&listing_id) {
                user.favorites.push(listing_id);
            }
            user.clone()
        }))
    }

    async fn remove_favorite(
        &self,
        id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).filter(|u| !u.destroyed).map(|user| {
            user.favorites.retain(|f| *f != listing_id);
            user.clone()
        }))
    }
}

#[async_trait]
impl ListingRepository for MemoryStore {
    async fn create(&self, listing: Listing) -> Result<Listing, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.listings.contains_key(&listing.id) {
            return Err(RepositoryError::conflict("listings_pkey"));
        }
        tables.listings.insert(listing.id, listing.clone());
        Ok(listing)
    }

    async fn update(&self, listing: Listing) -> Result<Listing, RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.listings.get_mut(&listing.id) {
            Some(stored) => {
                // 浏览计数只由 record_view 修改
                let views = stored.views;
                let viewed_by = std::mem::take(&mut stored.viewed_by);
                *stored = Listing {
                    views,
                    viewed_by,
                    ..listing
                };
                Ok(stored.clone())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_by_id(
        &self,
        id: ListingId,
        scope: ReadScope,
    ) -> Result<Option<Listing>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .listings
            .get(&id)
            .filter(|l| scope.admits(l.destroyed))
            .cloned())
    }

    async fn find_by_ids(&self, ids: &[ListingId]) -> Result<Vec<Listing>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.listings.get(id))
            .filter(|l| !l.destroyed)
            .cloned()
            .collect())
    }

    async fn search(&self, query: &ListingQuery) -> Result<Vec<ListingWithSeller>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut listings: Vec<&Listing> = tables
            .listings
            .values()
            .filter(|l| query.matches(l))
            .collect();
        listings.sort_by(|a, b| query.compare(a, b));
        let page = paginate(listings, query.page);
        Ok(page
            .into_iter()
            .map(|listing| ListingWithSeller {
                seller: tables
                    .users
                    .get(&listing.seller_id)
                    .filter(|u| !u.destroyed)
                    .map(User::snapshot),
                listing: listing.clone(),
            })
            .collect())
    }

    async fn count(&self, query: &ListingQuery) -> Result<u64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.listings.values().filter(|l| query.matches(l)).count() as u64)
    }

    async fn record_view(
        &self,
        id: ListingId,
        viewer: UserId,
    ) -> Result<Option<Listing>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .listings
            .get_mut(&id)
            .filter(|l| !l.destroyed)
            .and_then(|listing| listing.register_view(viewer).then(|| listing.clone())))
    }

    async fn soft_delete(&self, id: ListingId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.listings.get_mut(&id) {
            Some(listing) if !listing.destroyed => {
                listing.destroyed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn create(&self, category: Category) -> Result<Category, RepositoryError> {
        let mut tables = self.tables.write().await;
        if code_taken(&tables, category.code.as_deref(), category.id) {
            return Err(RepositoryError::conflict("categories_code_key"));
        }
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update(&self, category: Category) -> Result<Category, RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.categories.contains_key(&category.id) {
            return Err(RepositoryError::NotFound);
        }
        if code_taken(&tables, category.code.as_deref(), category.id) {
            return Err(RepositoryError::conflict("categories_code_key"));
        }
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn find_by_id(
        &self,
        id: CategoryId,
        scope: ReadScope,
    ) -> Result<Option<Category>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .categories
            .get(&id)
            .filter(|c| scope.admits(c.destroyed))
            .cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Category>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .categories
            .values()
            .find(|c| !c.destroyed && c.code.as_deref() == Some(code))
            .cloned())
    }

    async fn find(&self, query: &CategoryQuery) -> Result<Vec<Category>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut categories: Vec<Category> = tables
            .categories
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        newest_first(&mut categories, |c| (c.created_at, c.id.to_string()));
        Ok(paginate(categories, query.page))
    }

    async fn count(&self, query: &CategoryQuery) -> Result<u64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.categories.values().filter(|c| query.matches(c)).count() as u64)
    }

    async fn soft_delete(&self, id: CategoryId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.categories.get_mut(&id) {
            Some(category) if !category.destroyed => {
                category.destroyed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ReviewRepository for MemoryStore {
    async fn create(&self, review: Review) -> Result<Review, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn update(&self, review: Review) -> Result<Review, RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.reviews.get_mut(&review.id) {
            Some(stored) => {
                *stored = review.clone();
                Ok(review)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn find_by_id(
        &self,
        id: ReviewId,
        scope: ReadScope,
    ) -> Result<Option<Review>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .reviews
            .get(&id)
            .filter(|r| scope.admits(r.destroyed))
            .cloned())
    }

    async fn list_by_listing(&self, listing_id: ListingId) -> Result<Vec<Review>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut reviews: Vec<Review> = tables
            .reviews
            .values()
            .filter(|r| !r.destroyed && r.listing_id == listing_id)
            .cloned()
            .collect();
        newest_first(&mut reviews, |r| (r.created_at, r.id.to_string()));
        Ok(reviews)
    }

    async fn soft_delete(&self, id: ReviewId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.reviews.get_mut(&id) {
            Some(review) if !review.destroyed => {
                review.destroyed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn find_by_id(
        &self,
        id: ConversationId,
        scope: ReadScope,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .get(&id)
            .filter(|c| scope.admits(c.destroyed))
            .cloned())
    }

    async fn find_by_pair(&self, key: &PairKey) -> Result<Option<Conversation>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .values()
            .find(|c| !c.destroyed && &c.pair_key == key)
            .cloned())
    }

    async fn insert_if_absent(
        &self,
        conversation: Conversation,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let mut tables = self.tables.write().await;
        let exists = tables
            .conversations
            .values()
            .any(|c| !c.destroyed && c.pair_key == conversation.pair_key);
        if exists {
            return Ok(None);
        }
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(Some(conversation))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .values()
            .filter(|c| !c.destroyed && c.has_participant(user_id))
            .cloned()
            .collect())
    }

    async fn soft_delete(&self, id: ConversationId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        let deleted = match tables.conversations.get_mut(&id) {
            Some(conversation) if !conversation.destroyed => {
                conversation.destroyed = true;
                true
            }
            _ => false,
        };
        if deleted {
            tables
                .messages
                .iter_mut()
                .filter(|m| m.conversation_id == id)
                .for_each(|m| m.destroyed = true);
        }
        Ok(deleted)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn append(&self, message: Message) -> Result<Message, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| !m.destroyed && m.conversation_id == conversation_id)
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn latest_for_conversations(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<Vec<Message>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut latest: HashMap<ConversationId, &Message> = HashMap::new();
        for message in tables
            .messages
            .iter()
            .filter(|m| !m.destroyed && conversation_ids.contains(&m.conversation_id))
        {
            let newer = latest
                .get(&message.conversation_id)
                .is_none_or(|current| (message.created_at, message.id) > (current.created_at, current.id));
            if newer {
                latest.insert(message.conversation_id, message);
            }
        }
        Ok(latest.into_values().cloned().collect())
    }
}

#[async_trait]
impl DashboardRepository for MemoryStore {
    async fn count_users(&self, since: Option<Timestamp>) -> Result<u64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| !u.destroyed && since.is_none_or(|since| u.created_at >= since))
            .count() as u64)
    }

    async fn count_listings_with_status(
        &self,
        status: ListingStatus,
    ) -> Result<u64, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .listings
            .values()
            .filter(|l| !l.destroyed && l.status == status)
            .count() as u64)
    }

    async fn monthly_user_signups(
        &self,
        since: Timestamp,
    ) -> Result<Vec<MonthlyCount>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut buckets: BTreeMap<(i32, u32), u64> = BTreeMap::new();
        for user in tables
            .users
            .values()
            .filter(|u| !u.destroyed && u.created_at >= since)
        {
            *buckets
                .entry((user.created_at.year(), user.created_at.month()))
                .or_default() += 1;
        }
        Ok(buckets
            .into_iter()
            .map(|((year, month), count)| MonthlyCount { year, month, count })
            .collect())
    }

    async fn daily_listing_activity(
        &self,
        since: Timestamp,
    ) -> Result<Vec<DailyActivity>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut buckets: BTreeMap<chrono::NaiveDate, (u64, u64)> = BTreeMap::new();
        for listing in tables
            .listings
            .values()
            .filter(|l| !l.destroyed && l.created_at >= since)
        {
            let entry = buckets.entry(listing.created_at.date_naive()).or_default();
            if listing.status == ListingStatus::Published {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
        Ok(buckets
            .into_iter()
            .map(|(date, (active, inactive))| DailyActivity {
                date,
                active,
                inactive,
            })
            .collect())
    }

    async fn recent_users(&self, limit: u32) -> Result<Vec<User>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().filter(|u| !u.destroyed).cloned().collect();
        newest_first(&mut users, |u| (u.created_at, u.id.to_string()));
        users.truncate(limit as usize);
        Ok(users)
    }

    async fn recent_listings(&self, limit: u32) -> Result<Vec<Listing>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut listings: Vec<Listing> = tables
            .listings
            .values()
            .filter(|l| !l.destroyed)
            .cloned()
            .collect();
        newest_first(&mut listings, |l| (l.created_at, l.id.to_string()));
        listings.truncate(limit as usize);
        Ok(listings)
    }
}
