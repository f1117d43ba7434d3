use std::sync::Arc;

use application::{
    CategoryRepository, ConversationRepository, DailyActivity, DashboardRepository,
    ListingRepository, MessageRepository, MonthlyCount, ReviewRepository, UserRepository,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use domain::{
    Category, CategoryId, CategoryQuery, Conversation, ConversationId, GeoPoint, Listing,
    ListingId, ListingQuery, ListingStatus, ListingWithSeller, Message, MessageContent, MessageId,
    PairKey, PasswordHash, ReadScope, RepositoryError, Review, ReviewId, Timestamp, User,
    UserEmail, UserId, UserQuery, UserSnapshot, Username,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, QueryBuilder};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::conflict(db.constraint().unwrap_or("unique"))
        }
        sqlx::Error::RowNotFound => RepositoryError::NotFound,
        _ => RepositoryError::storage(err.to_string()),
    }
}

fn invalid_data(err: impl ToString) -> RepositoryError {
    RepositoryError::storage(format!("invalid row: {}", err.to_string()))
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// 转义 LIKE 通配符，搜索词按字面匹配。
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn id_strings<T: ToString>(ids: &[T]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

fn scope_clause(scope: ReadScope) -> &'static str {
    match scope {
        ReadScope::Live => " AND NOT destroyed",
        ReadScope::IncludeDestroyed => "",
    }
}

const USER_COLUMNS: &str = "id, username, email, display_name, password_hash, role, avatar, \
    phone_number, address, is_active, verify_token, refresh_token, favorites, created_at, \
    updated_at, destroyed";

#[derive(Debug, FromRow)]
struct UserRecord {
    id: String,
    username: String,
    email: String,
    display_name: String,
    password_hash: String,
    role: String,
    avatar: Option<String>,
    phone_number: Option<String>,
    address: Option<String>,
    is_active: bool,
    verify_token: Option<String>,
    refresh_token: Option<String>,
    favorites: Vec<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
    destroyed: bool,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let favorites = value
            .favorites
            .iter()
            .map(|id| ListingId::parse(id))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid_data)?;

        Ok(User {
            id: UserId::parse(&value.id).map_err(invalid_data)?,
            username: Username::parse(value.username).map_err(invalid_data)?,
            email: UserEmail::parse(value.email).map_err(invalid_data)?,
            display_name: value.display_name,
            password: PasswordHash::new(value.password_hash).map_err(invalid_data)?,
            role: value.role.parse().map_err(invalid_data)?,
            avatar: value.avatar,
            phone_number: value.phone_number,
            address: value.address,
            is_active: value.is_active,
            verify_token: value.verify_token,
            refresh_token: value.refresh_token,
            favorites,
            created_at: value.created_at,
            updated_at: value.updated_at,
            destroyed: value.destroyed,
        })
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_optional(
        &self,
        sql: &str,
        id: UserId,
        extra: Option<String>,
    ) -> Result<Option<User>, RepositoryError> {
        let mut query = sqlx::query_as::<_, UserRecord>(sql).bind(id.to_string());
        if let Some(extra) = extra {
            query = query.bind(extra);
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(User::try_from)
            .transpose()
    }
}

fn push_user_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &UserQuery) {
    builder.push(" WHERE NOT destroyed");
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        builder
            .push(" AND (display_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR username ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let sql = format!(
            r#"
            INSERT INTO users (id, username, email, display_name, password_hash, role, avatar,
                phone_number, address, is_active, verify_token, refresh_token, favorites,
                created_at, updated_at, destroyed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {USER_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user.id.to_string())
            .bind(user.username.as_str())
            .bind(user.email.as_str())
            .bind(&user.display_name)
            .bind(user.password.as_str())
            .bind(user.role.as_str())
            .bind(&user.avatar)
            .bind(&user.phone_number)
            .bind(&user.address)
            .bind(user.is_active)
            .bind(&user.verify_token)
            .bind(&user.refresh_token)
            .bind(id_strings(&user.favorites))
            .bind(user.created_at)
            .bind(user.updated_at)
            .bind(user.destroyed)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn update(&self, user: User) -> Result<User, RepositoryError> {
        let sql = format!(
            r#"
            UPDATE users
            SET username = $2, email = $3, display_name = $4, password_hash = $5, role = $6,
                avatar = $7, phone_number = $8, address = $9, is_active = $10,
                verify_token = $11, refresh_token = $12, favorites = $13, updated_at = $14
            WHERE id = $1 AND NOT destroyed
            RETURNING {USER_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(user.id.to_string())
            .bind(user.username.as_str())
            .bind(user.email.as_str())
            .bind(&user.display_name)
            .bind(user.password.as_str())
            .bind(user.role.as_str())
            .bind(&user.avatar)
            .bind(&user.phone_number)
            .bind(&user.address)
            .bind(user.is_active)
            .bind(&user.verify_token)
            .bind(&user.refresh_token)
            .bind(id_strings(&user.favorites))
            .bind(user.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::NotFound)?;

        User::try_from(record)
    }

    async fn find_by_id(
        &self,
        id: UserId,
        scope: ReadScope,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1{}",
            scope_clause(scope)
        );
        self.fetch_optional(&sql, id, None).await
    }

    async fn find_by_ids(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1) AND NOT destroyed");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id_strings(ids))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND NOT destroyed");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(User::try_from)
            .transpose()
    }

    async fn find(&self, query: &UserQuery) -> Result<Vec<User>, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users"));
        push_user_filters(&mut builder, query);
        let order = query.order.as_sql();
        builder
            .push(format!(
                " ORDER BY {} {order}, id {order} LIMIT ",
                query.sort.column()
            ))
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.page.offset()).unwrap_or(i64::MAX));

        builder
            .build_query_as::<UserRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn count(&self, query: &UserQuery) -> Result<u64, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_user_filters(&mut builder, query);
        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(to_count(total))
    }

    async fn soft_delete(&self, id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE users SET destroyed = TRUE, updated_at = NOW() WHERE id = $1 AND NOT destroyed",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_favorite(
        &self,
        id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            r#"
            UPDATE users
            SET favorites = CASE WHEN $2::text = ANY(favorites) THEN favorites
                                 ELSE array_append(favorites, $2::text) END
            WHERE id = $1 AND NOT destroyed
            RETURNING {USER_COLUMNS}
            "#
        );
        self.fetch_optional(&sql, id, Some(listing_id.to_string()))
            .await
    }

    async fn remove_favorite(
        &self,
        id: UserId,
        listing_id: ListingId,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            r#"
            UPDATE users SET favorites = array_remove(favorites, $2::text)
            WHERE id = $1 AND NOT destroyed
            RETURNING {USER_COLUMNS}
            "#
        );
        self.fetch_optional(&sql, id, Some(listing_id.to_string()))
            .await
    }
}

// 商品查询统一使用别名 `l`，便于连接卖家。
const LISTING_COLUMNS: &str = "l.id, l.seller_id, l.category_id, l.title, l.description, \
    l.price, l.condition, l.images, l.location, l.status, l.rejection_reason, l.views, \
    l.viewed_by, l.is_featured, l.expires_at, l.created_at, l.updated_at, l.destroyed";

#[derive(Debug, FromRow)]
struct ListingRecord {
    id: String,
    seller_id: String,
    category_id: String,
    title: String,
    description: String,
    price: f64,
    condition: String,
    images: Vec<String>,
    location: Option<String>,
    status: String,
    rejection_reason: Option<String>,
    views: i64,
    viewed_by: Vec<String>,
    is_featured: bool,
    expires_at: Option<Timestamp>,
    created_at: Timestamp,
    updated_at: Timestamp,
    destroyed: bool,
}

impl TryFrom<ListingRecord> for Listing {
    type Error = RepositoryError;

    fn try_from(value: ListingRecord) -> Result<Self, Self::Error> {
        let viewed_by = value
            .viewed_by
            .iter()
            .map(|id| UserId::parse(id))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid_data)?;

        Ok(Listing {
            id: ListingId::parse(&value.id).map_err(invalid_data)?,
            seller_id: UserId::parse(&value.seller_id).map_err(invalid_data)?,
            category_id: CategoryId::parse(&value.category_id).map_err(invalid_data)?,
            title: value.title,
            description: value.description,
            price: value.price,
            condition: value.condition.parse().map_err(invalid_data)?,
            images: value.images,
            location: value.location,
            status: value.status.parse().map_err(invalid_data)?,
            rejection_reason: value.rejection_reason,
            views: value.views,
            viewed_by,
            is_featured: value.is_featured,
            expires_at: value.expires_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
            destroyed: value.destroyed,
        })
    }
}

#[derive(Debug, FromRow)]
struct ListingWithSellerRecord {
    #[sqlx(flatten)]
    listing: ListingRecord,
    seller_username: Option<String>,
    seller_display_name: Option<String>,
    seller_email: Option<String>,
    seller_avatar: Option<String>,
    seller_role: Option<String>,
}

impl TryFrom<ListingWithSellerRecord> for ListingWithSeller {
    type Error = RepositoryError;

    fn try_from(value: ListingWithSellerRecord) -> Result<Self, Self::Error> {
        let listing = Listing::try_from(value.listing)?;
        let seller = match (
            value.seller_username,
            value.seller_display_name,
            value.seller_email,
            value.seller_role,
        ) {
            (Some(username), Some(display_name), Some(email), Some(role)) => Some(UserSnapshot {
                id: listing.seller_id,
                username,
                display_name,
                email,
                avatar: value.seller_avatar,
                role: role.parse().map_err(invalid_data)?,
            }),
            _ => None,
        };
        Ok(ListingWithSeller { listing, seller })
    }
}

fn push_listing_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ListingQuery) {
    builder.push(" WHERE NOT l.destroyed");
    if let Some(statuses) = &query.statuses {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_owned()).collect();
        builder.push(" AND l.status = ANY(").push_bind(statuses).push(")");
    }
    if let Some(category_id) = query.category_id {
        builder
            .push(" AND l.category_id = ")
            .push_bind(category_id.to_string());
    }
    if let Some(seller_id) = query.seller_id {
        builder
            .push(" AND l.seller_id = ")
            .push_bind(seller_id.to_string());
    }
    if let Some(min) = query.min_price {
        builder.push(" AND l.price >= ").push_bind(min);
    }
    if let Some(max) = query.max_price {
        builder.push(" AND l.price <= ").push_bind(max);
    }
    if let Some(location) = &query.location {
        builder
            .push(" AND l.location ILIKE ")
            .push_bind(like_pattern(location));
    }
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        builder
            .push(" AND (l.title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR l.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[derive(Clone)]
pub struct PgListingRepository {
    pool: PgPool,
}

impl PgListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingRepository for PgListingRepository {
    async fn create(&self, listing: Listing) -> Result<Listing, RepositoryError> {
        let sql = format!(
            r#"
            INSERT INTO listings AS l (id, seller_id, category_id, title, description, price,
                condition, images, location, status, rejection_reason, views, viewed_by,
                is_featured, expires_at, created_at, updated_at, destroyed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING {LISTING_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, ListingRecord>(&sql)
            .bind(listing.id.to_string())
            .bind(listing.seller_id.to_string())
            .bind(listing.category_id.to_string())
            .bind(&listing.title)
            .bind(&listing.description)
            .bind(listing.price)
            .bind(listing.condition.as_str())
            .bind(&listing.images)
            .bind(&listing.location)
            .bind(listing.status.as_str())
            .bind(&listing.rejection_reason)
            .bind(listing.views)
            .bind(id_strings(&listing.viewed_by))
            .bind(listing.is_featured)
            .bind(listing.expires_at)
            .bind(listing.created_at)
            .bind(listing.updated_at)
            .bind(listing.destroyed)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Listing::try_from(record)
    }

    /// 浏览计数与浏览者集合只由 `record_view` 维护，这里不覆盖。
    async fn update(&self, listing: Listing) -> Result<Listing, RepositoryError> {
        let sql = format!(
            r#"
            UPDATE listings AS l
            SET category_id = $2, title = $3, description = $4, price = $5, condition = $6,
                images = $7, location = $8, status = $9, rejection_reason = $10,
                is_featured = $11, expires_at = $12, updated_at = $13
            WHERE l.id = $1 AND NOT l.destroyed
            RETURNING {LISTING_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, ListingRecord>(&sql)
            .bind(listing.id.to_string())
            .bind(listing.category_id.to_string())
            .bind(&listing.title)
            .bind(&listing.description)
            .bind(listing.price)
            .bind(listing.condition.as_str())
            .bind(&listing.images)
            .bind(&listing.location)
            .bind(listing.status.as_str())
            .bind(&listing.rejection_reason)
            .bind(listing.is_featured)
            .bind(listing.expires_at)
            .bind(listing.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::NotFound)?;

        Listing::try_from(record)
    }

    async fn find_by_id(
        &self,
        id: ListingId,
        scope: ReadScope,
    ) -> Result<Option<Listing>, RepositoryError> {
        let filter = match scope {
            ReadScope::Live => " AND NOT l.destroyed",
            ReadScope::IncludeDestroyed => "",
        };
        let sql = format!("SELECT {LISTING_COLUMNS} FROM listings l WHERE l.id = $1{filter}");
        sqlx::query_as::<_, ListingRecord>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(Listing::try_from)
            .transpose()
    }

    async fn find_by_ids(&self, ids: &[ListingId]) -> Result<Vec<Listing>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings l WHERE l.id = ANY($1) AND NOT l.destroyed"
        );
        sqlx::query_as::<_, ListingRecord>(&sql)
            .bind(id_strings(ids))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Listing::try_from)
            .collect()
    }

    async fn search(&self, query: &ListingQuery) -> Result<Vec<ListingWithSeller>, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {LISTING_COLUMNS}, u.username AS seller_username, \
             u.display_name AS seller_display_name, u.email AS seller_email, \
             u.avatar AS seller_avatar, u.role AS seller_role \
             FROM listings l LEFT JOIN users u ON u.id = l.seller_id AND NOT u.destroyed"
        ));
        push_listing_filters(&mut builder, query);
        let order = query.order.as_sql();
        builder
            .push(format!(
                " ORDER BY l.{} {order}, l.id {order} LIMIT ",
                query.sort.column()
            ))
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.page.offset()).unwrap_or(i64::MAX));

        builder
            .build_query_as::<ListingWithSellerRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(ListingWithSeller::try_from)
            .collect()
    }

    async fn count(&self, query: &ListingQuery) -> Result<u64, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM listings l");
        push_listing_filters(&mut builder, query);
        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(to_count(total))
    }

    async fn record_view(
        &self,
        id: ListingId,
        viewer: UserId,
    ) -> Result<Option<Listing>, RepositoryError> {
        // 条件写在 WHERE 中：并发请求里只有一个能命中
        let sql = format!(
            r#"
            UPDATE listings AS l
            SET views = l.views + 1, viewed_by = array_append(l.viewed_by, $2::text)
            WHERE l.id = $1
              AND NOT l.destroyed
              AND l.seller_id <> $2::text
              AND NOT ($2::text = ANY(l.viewed_by))
            RETURNING {LISTING_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ListingRecord>(&sql)
            .bind(id.to_string())
            .bind(viewer.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(Listing::try_from)
            .transpose()
    }

    async fn soft_delete(&self, id: ListingId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE listings SET destroyed = TRUE, updated_at = NOW() WHERE id = $1 AND NOT destroyed",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }
}

const CATEGORY_COLUMNS: &str =
    "id, name, slug, code, parent_id, image_url, created_at, updated_at, destroyed";

#[derive(Debug, FromRow)]
struct CategoryRecord {
    id: String,
    name: String,
    slug: String,
    code: Option<String>,
    parent_id: Option<String>,
    image_url: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
    destroyed: bool,
}

impl TryFrom<CategoryRecord> for Category {
    type Error = RepositoryError;

    fn try_from(value: CategoryRecord) -> Result<Self, Self::Error> {
        Ok(Category {
            id: CategoryId::parse(&value.id).map_err(invalid_data)?,
            name: value.name,
            slug: value.slug,
            code: value.code,
            parent_id: value
                .parent_id
                .as_deref()
                .map(CategoryId::parse)
                .transpose()
                .map_err(invalid_data)?,
            image_url: value.image_url,
            created_at: value.created_at,
            updated_at: value.updated_at,
            destroyed: value.destroyed,
        })
    }
}

fn push_category_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &CategoryQuery) {
    builder.push(" WHERE NOT destroyed");
    if let Some(search) = &query.search {
        builder
            .push(" AND name ILIKE ")
            .push_bind(like_pattern(search));
    }
}

#[derive(Clone)]
pub struct PgCategoryRepository {
    pool: PgPool,
}

impl PgCategoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn create(&self, category: Category) -> Result<Category, RepositoryError> {
        let sql = format!(
            r#"
            INSERT INTO categories (id, name, slug, code, parent_id, image_url, created_at,
                updated_at, destroyed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {CATEGORY_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, CategoryRecord>(&sql)
            .bind(category.id.to_string())
            .bind(&category.name)
            .bind(&category.slug)
            .bind(&category.code)
            .bind(category.parent_id.map(|id| id.to_string()))
            .bind(&category.image_url)
            .bind(category.created_at)
            .bind(category.updated_at)
            .bind(category.destroyed)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Category::try_from(record)
    }

    async fn update(&self, category: Category) -> Result<Category, RepositoryError> {
        let sql = format!(
            r#"
            UPDATE categories
            SET name = $2, slug = $3, code = $4, parent_id = $5, image_url = $6, updated_at = $7
            WHERE id = $1 AND NOT destroyed
            RETURNING {CATEGORY_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, CategoryRecord>(&sql)
            .bind(category.id.to_string())
            .bind(&category.name)
            .bind(&category.slug)
            .bind(&category.code)
            .bind(category.parent_id.map(|id| id.to_string()))
            .bind(&category.image_url)
            .bind(category.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::NotFound)?;

        Category::try_from(record)
    }

    async fn find_by_id(
        &self,
        id: CategoryId,
        scope: ReadScope,
    ) -> Result<Option<Category>, RepositoryError> {
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1{}",
            scope_clause(scope)
        );
        sqlx::query_as::<_, CategoryRecord>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(Category::try_from)
            .transpose()
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Category>, RepositoryError> {
        let sql =
            format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE code = $1 AND NOT destroyed");
        sqlx::query_as::<_, CategoryRecord>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(Category::try_from)
            .transpose()
    }

    async fn find(&self, query: &CategoryQuery) -> Result<Vec<Category>, RepositoryError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {CATEGORY_COLUMNS} FROM categories"));
        push_category_filters(&mut builder, query);
        builder
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.page.offset()).unwrap_or(i64::MAX));

        builder
            .build_query_as::<CategoryRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Category::try_from)
            .collect()
    }

    async fn count(&self, query: &CategoryQuery) -> Result<u64, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM categories");
        push_category_filters(&mut builder, query);
        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(to_count(total))
    }

    async fn soft_delete(&self, id: CategoryId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE categories SET destroyed = TRUE, updated_at = NOW() WHERE id = $1 AND NOT destroyed",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }
}

const REVIEW_COLUMNS: &str =
    "id, listing_id, author_id, rating, comment, created_at, updated_at, destroyed";

#[derive(Debug, FromRow)]
struct ReviewRecord {
    id: String,
    listing_id: String,
    author_id: String,
    rating: i16,
    comment: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
    destroyed: bool,
}

impl TryFrom<ReviewRecord> for Review {
    type Error = RepositoryError;

    fn try_from(value: ReviewRecord) -> Result<Self, Self::Error> {
        Ok(Review {
            id: ReviewId::parse(&value.id).map_err(invalid_data)?,
            listing_id: ListingId::parse(&value.listing_id).map_err(invalid_data)?,
            author_id: UserId::parse(&value.author_id).map_err(invalid_data)?,
            rating: u8::try_from(value.rating).map_err(invalid_data)?,
            comment: value.comment,
            created_at: value.created_at,
            updated_at: value.updated_at,
            destroyed: value.destroyed,
        })
    }
}

#[derive(Clone)]
pub struct PgReviewRepository {
    pool: PgPool,
}

impl PgReviewRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewRepository for PgReviewRepository {
    async fn create(&self, review: Review) -> Result<Review, RepositoryError> {
        let sql = format!(
            r#"
            INSERT INTO reviews (id, listing_id, author_id, rating, comment, created_at,
                updated_at, destroyed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {REVIEW_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, ReviewRecord>(&sql)
            .bind(review.id.to_string())
            .bind(review.listing_id.to_string())
            .bind(review.author_id.to_string())
            .bind(i16::from(review.rating))
            .bind(&review.comment)
            .bind(review.created_at)
            .bind(review.updated_at)
            .bind(review.destroyed)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Review::try_from(record)
    }

    async fn update(&self, review: Review) -> Result<Review, RepositoryError> {
        let sql = format!(
            r#"
            UPDATE reviews SET rating = $2, comment = $3, updated_at = $4
            WHERE id = $1 AND NOT destroyed
            RETURNING {REVIEW_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, ReviewRecord>(&sql)
            .bind(review.id.to_string())
            .bind(i16::from(review.rating))
            .bind(&review.comment)
            .bind(review.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::NotFound)?;

        Review::try_from(record)
    }

    async fn find_by_id(
        &self,
        id: ReviewId,
        scope: ReadScope,
    ) -> Result<Option<Review>, RepositoryError> {
        let sql = format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1{}",
            scope_clause(scope)
        );
        sqlx::query_as::<_, ReviewRecord>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(Review::try_from)
            .transpose()
    }

    async fn list_by_listing(&self, listing_id: ListingId) -> Result<Vec<Review>, RepositoryError> {
        let sql = format!(
            r#"
            SELECT {REVIEW_COLUMNS} FROM reviews
            WHERE listing_id = $1 AND NOT destroyed
            ORDER BY created_at DESC, id DESC
            "#
        );
        sqlx::query_as::<_, ReviewRecord>(&sql)
            .bind(listing_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Review::try_from)
            .collect()
    }

    async fn soft_delete(&self, id: ReviewId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE reviews SET destroyed = TRUE, updated_at = NOW() WHERE id = $1 AND NOT destroyed",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(result.rows_affected() > 0)
    }
}

const CONVERSATION_COLUMNS: &str = "id, participants, pair_key, created_at, updated_at, destroyed";

#[derive(Debug, FromRow)]
struct ConversationRecord {
    id: String,
    participants: Vec<String>,
    pair_key: String,
    created_at: Timestamp,
    updated_at: Timestamp,
    destroyed: bool,
}

impl TryFrom<ConversationRecord> for Conversation {
    type Error = RepositoryError;

    fn try_from(value: ConversationRecord) -> Result<Self, Self::Error> {
        let [first, second] = value.participants.as_slice() else {
            return Err(invalid_data(format!(
                "conversation {} must have exactly two participants",
                value.id
            )));
        };
        let participants = [
            UserId::parse(first).map_err(invalid_data)?,
            UserId::parse(second).map_err(invalid_data)?,
        ];
        let pair_key = PairKey::new(participants[0], participants[1]).map_err(invalid_data)?;
        if pair_key.as_str() != value.pair_key {
            return Err(invalid_data(format!(
                "conversation {} has a stale pair key",
                value.id
            )));
        }

        Ok(Conversation {
            id: ConversationId::parse(&value.id).map_err(invalid_data)?,
            participants,
            pair_key,
            created_at: value.created_at,
            updated_at: value.updated_at,
            destroyed: value.destroyed,
        })
    }
}

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn find_by_id(
        &self,
        id: ConversationId,
        scope: ReadScope,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1{}",
            scope_clause(scope)
        );
        sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(Conversation::try_from)
            .transpose()
    }

    async fn find_by_pair(&self, key: &PairKey) -> Result<Option<Conversation>, RepositoryError> {
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE pair_key = $1 AND NOT destroyed"
        );
        sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(Conversation::try_from)
            .transpose()
    }

    async fn insert_if_absent(
        &self,
        conversation: Conversation,
    ) -> Result<Option<Conversation>, RepositoryError> {
        // 部分唯一索引 conversations_pair_key_live 保证同一对参与者只有一个未删除会话
        let sql = format!(
            r#"
            INSERT INTO conversations (id, participants, pair_key, created_at, updated_at, destroyed)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            ON CONFLICT (pair_key) WHERE NOT destroyed DO NOTHING
            RETURNING {CONVERSATION_COLUMNS}
            "#
        );
        sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(conversation.id.to_string())
            .bind(id_strings(&conversation.participants))
            .bind(conversation.pair_key.as_str())
            .bind(conversation.created_at)
            .bind(conversation.updated_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .map(Conversation::try_from)
            .transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>, RepositoryError> {
        let sql = format!(
            r#"
            SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE $1::text = ANY(participants) AND NOT destroyed
            ORDER BY updated_at DESC, id DESC
            "#
        );
        sqlx::query_as::<_, ConversationRecord>(&sql)
            .bind(user_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Conversation::try_from)
            .collect()
    }

    async fn soft_delete(&self, id: ConversationId) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;
        let result = sqlx::query(
            "UPDATE conversations SET destroyed = TRUE, updated_at = NOW() WHERE id = $1 AND NOT destroyed",
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            tx.rollback().await.map_err(map_sqlx_err)?;
            return Ok(false);
        }

        sqlx::query("UPDATE messages SET destroyed = TRUE WHERE conversation_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(true)
    }
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, receiver_id, body, image_url, \
    latitude, longitude, is_read, created_at, destroyed";

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: String,
    conversation_id: String,
    sender_id: String,
    receiver_id: String,
    body: Option<String>,
    image_url: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    is_read: bool,
    created_at: Timestamp,
    destroyed: bool,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let location = match (value.latitude, value.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        };

        Ok(Message {
            id: MessageId::parse(&value.id).map_err(invalid_data)?,
            conversation_id: ConversationId::parse(&value.conversation_id)
                .map_err(invalid_data)?,
            sender_id: UserId::parse(&value.sender_id).map_err(invalid_data)?,
            receiver_id: UserId::parse(&value.receiver_id).map_err(invalid_data)?,
            content: MessageContent {
                message: value.body,
                image_url: value.image_url,
                location,
            },
            is_read: value.is_read,
            created_at: value.created_at,
            destroyed: value.destroyed,
        })
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: Message) -> Result<Message, RepositoryError> {
        let sql = format!(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, receiver_id, body, image_url,
                latitude, longitude, is_read, created_at, destroyed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {MESSAGE_COLUMNS}
            "#
        );
        let location = message.content.location;
        let record = sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(message.id.to_string())
            .bind(message.conversation_id.to_string())
            .bind(message.sender_id.to_string())
            .bind(message.receiver_id.to_string())
            .bind(&message.content.message)
            .bind(&message.content.image_url)
            .bind(location.map(|point| point.latitude))
            .bind(location.map(|point| point.longitude))
            .bind(message.is_read)
            .bind(message.created_at)
            .bind(message.destroyed)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Message::try_from(record)
    }

    async fn list_by_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<Message>, RepositoryError> {
        let sql = format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = $1 AND NOT destroyed
            ORDER BY created_at ASC, id ASC
            "#
        );
        sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(conversation_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }

    async fn latest_for_conversations(
        &self,
        conversation_ids: &[ConversationId],
    ) -> Result<Vec<Message>, RepositoryError> {
        if conversation_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            SELECT DISTINCT ON (conversation_id) {MESSAGE_COLUMNS} FROM messages
            WHERE conversation_id = ANY($1) AND NOT destroyed
            ORDER BY conversation_id, created_at DESC, id DESC
            "#
        );
        sqlx::query_as::<_, MessageRecord>(&sql)
            .bind(id_strings(conversation_ids))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }
}

#[derive(Debug, FromRow)]
struct MonthlyCountRecord {
    year: i32,
    month: i32,
    count: i64,
}

#[derive(Debug, FromRow)]
struct DailyActivityRecord {
    day: NaiveDate,
    active: i64,
    inactive: i64,
}

#[derive(Clone)]
pub struct PgDashboardRepository {
    pool: PgPool,
}

impl PgDashboardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DashboardRepository for PgDashboardRepository {
    async fn count_users(&self, since: Option<Timestamp>) -> Result<u64, RepositoryError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE NOT destroyed AND ($1::timestamptz IS NULL OR created_at >= $1)",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(to_count(total))
    }

    async fn count_listings_with_status(
        &self,
        status: ListingStatus,
    ) -> Result<u64, RepositoryError> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM listings WHERE NOT destroyed AND status = $1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_err)?;
        Ok(to_count(total))
    }

    async fn monthly_user_signups(
        &self,
        since: Timestamp,
    ) -> Result<Vec<MonthlyCount>, RepositoryError> {
        let rows = sqlx::query_as::<_, MonthlyCountRecord>(
            r#"
            SELECT EXTRACT(YEAR FROM created_at AT TIME ZONE 'UTC')::INT AS year,
                   EXTRACT(MONTH FROM created_at AT TIME ZONE 'UTC')::INT AS month,
                   COUNT(*) AS count
            FROM users
            WHERE NOT destroyed AND created_at >= $1
            GROUP BY 1, 2
            ORDER BY 1, 2
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        rows.into_iter()
            .map(|row| {
                Ok::<_, RepositoryError>(MonthlyCount {
                    year: row.year,
                    month: u32::try_from(row.month).map_err(invalid_data)?,
                    count: to_count(row.count),
                })
            })
            .collect()
    }

    async fn daily_listing_activity(
        &self,
        since: Timestamp,
    ) -> Result<Vec<DailyActivity>, RepositoryError> {
        let rows = sqlx::query_as::<_, DailyActivityRecord>(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day,
                   COUNT(*) FILTER (WHERE status = 'PUBLISHED') AS active,
                   COUNT(*) FILTER (WHERE status <> 'PUBLISHED') AS inactive
            FROM listings
            WHERE NOT destroyed AND created_at >= $1
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(rows
            .into_iter()
            .map(|row| DailyActivity {
                date: row.day,
                active: to_count(row.active),
                inactive: to_count(row.inactive),
            })
            .collect())
    }

    async fn recent_users(&self, limit: u32) -> Result<Vec<User>, RepositoryError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE NOT destroyed ORDER BY created_at DESC, id DESC LIMIT $1"
        );
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    async fn recent_listings(&self, limit: u32) -> Result<Vec<Listing>, RepositoryError> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM listings l WHERE NOT l.destroyed \
             ORDER BY l.created_at DESC, l.id DESC LIMIT $1"
        );
        sqlx::query_as::<_, ListingRecord>(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .into_iter()
            .map(Listing::try_from)
            .collect()
    }
}

/// 一个连接池上的全部 Postgres 仓储。
#[derive(Clone)]
pub struct PgStorage {
    pub pool: PgPool,
    pub user_repository: Arc<PgUserRepository>,
    pub listing_repository: Arc<PgListingRepository>,
    pub category_repository: Arc<PgCategoryRepository>,
    pub review_repository: Arc<PgReviewRepository>,
    pub conversation_repository: Arc<PgConversationRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub dashboard_repository: Arc<PgDashboardRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            listing_repository: Arc::new(PgListingRepository::new(pool.clone())),
            category_repository: Arc::new(PgCategoryRepository::new(pool.clone())),
            review_repository: Arc::new(PgReviewRepository::new(pool.clone())),
            conversation_repository: Arc::new(PgConversationRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            dashboard_repository: Arc::new(PgDashboardRepository::new(pool.clone())),
            pool,
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("bike"), "%bike%");
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
    }

    #[test]
    fn conversation_row_requires_two_participants() {
        let now = chrono::Utc::now();
        let record = ConversationRecord {
            id: ConversationId::generate().to_string(),
            participants: vec![UserId::generate().to_string()],
            pair_key: String::new(),
            created_at: now,
            updated_at: now,
            destroyed: false,
        };
        assert!(matches!(
            Conversation::try_from(record),
            Err(RepositoryError::Storage { .. })
        ));
    }

    #[test]
    fn message_row_without_both_coordinates_has_no_location() {
        let now = chrono::Utc::now();
        let record = MessageRecord {
            id: MessageId::generate().to_string(),
            conversation_id: ConversationId::generate().to_string(),
            sender_id: UserId::generate().to_string(),
            receiver_id: UserId::generate().to_string(),
            body: Some("hello".into()),
            image_url: None,
            latitude: Some(10.0),
            longitude: None,
            is_read: false,
            created_at: now,
            destroyed: false,
        };
        let message = Message::try_from(record).unwrap();
        assert!(message.content.location.is_none());
        assert_eq!(message.content.message.as_deref(), Some("hello"));
    }
}
