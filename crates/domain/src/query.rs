//! 查询条件构造：分页、排序与按角色区分的商品可见性。

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::errors::{DomainError, Violations};
use crate::listing::{Listing, ListingStatus};
use crate::user::User;
use crate::value_objects::{CategoryId, UserId};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 读取时是否包含已软删除的记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadScope {
    #[default]
    Live,
    IncludeDestroyed,
}

impl ReadScope {
    pub fn admits(&self, destroyed: bool) -> bool {
        matches!(self, ReadScope::IncludeDestroyed) || !destroyed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

impl FromStr for SortOrder {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "1" => Ok(SortOrder::Asc),
            "desc" | "-1" => Ok(SortOrder::Desc),
            _ => Err(DomainError::validation("sortOrder", "must be asc or desc")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// 页码从 1 开始；每页数量限制在 1..=100。
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_items: u64,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total_items: u64, request: PageRequest) -> Self {
        let limit = u64::from(request.limit);
        Self {
            data,
            pagination: Pagination {
                current_page: request.page,
                total_pages: total_items.div_ceil(limit),
                total_items,
                limit: request.limit,
            },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingSortField {
    #[default]
    CreatedAt,
    Price,
    Views,
    Title,
}

impl ListingSortField {
    pub fn column(&self) -> &'static str {
        match self {
            ListingSortField::CreatedAt => "created_at",
            ListingSortField::Price => "price",
            ListingSortField::Views => "views",
            ListingSortField::Title => "title",
        }
    }
}

impl FromStr for ListingSortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" => Ok(ListingSortField::CreatedAt),
            "price" => Ok(ListingSortField::Price),
            "views" => Ok(ListingSortField::Views),
            "title" => Ok(ListingSortField::Title),
            _ => Err(DomainError::validation(
                "sortBy",
                "must be one of createdAt, price, views, title",
            )),
        }
    }
}

/// 调用方提交的原始搜索参数。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingSearchParams {
    pub search: Option<String>,
    pub category_id: Option<CategoryId>,
    pub seller_id: Option<UserId>,
    pub statuses: Vec<ListingStatus>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub location: Option<String>,
    pub sort_by: Option<ListingSortField>,
    pub sort_order: Option<SortOrder>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// 经过可见性规则处理后的商品查询。
#[derive(Debug, Clone, PartialEq)]
pub struct ListingQuery {
    pub search: Option<String>,
    pub category_id: Option<CategoryId>,
    pub seller_id: Option<UserId>,
    /// `None` 表示不限状态。
    pub statuses: Option<Vec<ListingStatus>>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub location: Option<String>,
    pub sort: ListingSortField,
    pub order: SortOrder,
    pub page: PageRequest,
}

impl ListingQuery {
    /// 非特权调用方只能看到已发布商品，忽略其提交的状态参数。
    pub fn for_viewer(params: ListingSearchParams, privileged: bool) -> Result<Self, DomainError> {
        let mut violations = Violations::new();
        for (field, bound) in [("minPrice", params.min_price), ("maxPrice", params.max_price)] {
            if let Some(value) = bound {
                violations.check(value.is_finite() && value >= 0.0, field, "must be a non-negative number");
            }
        }
        if let (Some(min), Some(max)) = (params.min_price, params.max_price) {
            violations.check(min <= max, "minPrice", "must not exceed maxPrice");
        }
        violations.into_result()?;

        let statuses = if privileged {
            let mut statuses = Vec::with_capacity(params.statuses.len());
            for status in params.statuses {
                if !statuses.contains(&status) {
                    statuses.push(status);
                }
            }
            (!statuses.is_empty()).then_some(statuses)
        } else {
            Some(vec![ListingStatus::Published])
        };

        Ok(Self {
            search: normalize_text(params.search),
            category_id: params.category_id,
            seller_id: params.seller_id,
            statuses,
            min_price: params.min_price,
            max_price: params.max_price,
            location: normalize_text(params.location),
            sort: params.sort_by.unwrap_or_default(),
            order: params.sort_order.unwrap_or_default(),
            page: PageRequest::new(params.page, params.limit),
        })
    }

    /// 已发布商品的简单列表，最新优先。
    pub fn published(page: PageRequest) -> Self {
        Self {
            search: None,
            category_id: None,
            seller_id: None,
            statuses: Some(vec![ListingStatus::Published]),
            min_price: None,
            max_price: None,
            location: None,
            sort: ListingSortField::CreatedAt,
            order: SortOrder::Desc,
            page,
        }
    }

    /// 卖家自己的全部商品（任意状态）。
    pub fn owned_by(seller_id: UserId, page: PageRequest) -> Self {
        Self {
            seller_id: Some(seller_id),
            statuses: None,
            ..Self::published(page)
        }
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        if listing.destroyed {
            return false;
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&listing.status) {
                return false;
            }
        }
        if self.category_id.is_some_and(|c| c != listing.category_id) {
            return false;
        }
        if self.seller_id.is_some_and(|s| s != listing.seller_id) {
            return false;
        }
        if self.min_price.is_some_and(|min| listing.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| listing.price > max) {
            return false;
        }
        if let Some(location) = &self.location {
            match &listing.location {
                Some(value) if contains_ci(value, location) => {}
                _ => return false,
            }
        }
        if let Some(search) = &self.search {
            if !contains_ci(&listing.title, search) && !contains_ci(&listing.description, search) {
                return false;
            }
        }
        true
    }

    pub fn compare(&self, a: &Listing, b: &Listing) -> Ordering {
        let ordering = match self.sort {
            ListingSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            ListingSortField::Price => a.price.total_cmp(&b.price),
            ListingSortField::Views => a.views.cmp(&b.views),
            ListingSortField::Title => a.title.cmp(&b.title),
        };
        self.order.apply(ordering.then_with(|| a.id.cmp(&b.id)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserSortField {
    #[default]
    CreatedAt,
    Username,
    Email,
    DisplayName,
}

impl UserSortField {
    pub fn column(&self) -> &'static str {
        match self {
            UserSortField::CreatedAt => "created_at",
            UserSortField::Username => "username",
            UserSortField::Email => "email",
            UserSortField::DisplayName => "display_name",
        }
    }
}

impl FromStr for UserSortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createdAt" => Ok(UserSortField::CreatedAt),
            "username" => Ok(UserSortField::Username),
            "email" => Ok(UserSortField::Email),
            "displayName" => Ok(UserSortField::DisplayName),
            _ => Err(DomainError::validation(
                "sortBy",
                "must be one of createdAt, username, email, displayName",
            )),
        }
    }
}

/// 管理端用户列表查询。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserQuery {
    pub search: Option<String>,
    pub sort: UserSortField,
    pub order: SortOrder,
    pub page: PageRequest,
}

impl UserQuery {
    pub fn new(
        search: Option<String>,
        sort: Option<UserSortField>,
        order: Option<SortOrder>,
        page: PageRequest,
    ) -> Self {
        Self {
            search: normalize_text(search),
            sort: sort.unwrap_or_default(),
            order: order.unwrap_or_default(),
            page,
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        if user.destroyed {
            return false;
        }
        match &self.search {
            Some(search) => {
                contains_ci(&user.display_name, search)
                    || contains_ci(user.email.as_str(), search)
                    || contains_ci(user.username.as_str(), search)
            }
            None => true,
        }
    }

    pub fn compare(&self, a: &User, b: &User) -> Ordering {
        let ordering = match self.sort {
            UserSortField::CreatedAt => a.created_at.cmp(&b.created_at),
            UserSortField::Username => a.username.as_str().cmp(b.username.as_str()),
            UserSortField::Email => a.email.as_str().cmp(b.email.as_str()),
            UserSortField::DisplayName => a.display_name.cmp(&b.display_name),
        };
        self.order.apply(ordering.then_with(|| a.id.cmp(&b.id)))
    }
}

/// 分类列表查询：按名称搜索，最新优先。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CategoryQuery {
    pub search: Option<String>,
    pub page: PageRequest,
}

impl CategoryQuery {
    pub fn new(search: Option<String>, page: PageRequest) -> Self {
        Self {
            search: normalize_text(search),
            page,
        }
    }

    pub fn matches(&self, category: &Category) -> bool {
        !category.destroyed
            && self
                .search
                .as_deref()
                .is_none_or(|search| contains_ci(&category.name, search))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::{ListingCondition, ListingDraft};
    use crate::value_objects::ListingId;
    use chrono::Utc;

    fn listing(status: ListingStatus, price: f64, title: &str) -> Listing {
        let mut listing = Listing::create(
            ListingId::generate(),
            UserId::generate(),
            ListingDraft {
                title: title.into(),
                description: "Plenty of description".into(),
                price,
                category_id: CategoryId::generate(),
                condition: ListingCondition::New,
                images: vec![],
                location: Some("Da Nang".into()),
                status: None,
                expires_at: None,
            },
            Utc::now(),
        )
        .unwrap();
        listing.status = status;
        listing
    }

    #[test]
    fn ordinary_viewers_only_see_published() {
        let params = ListingSearchParams {
            statuses: vec![ListingStatus::Pending],
            ..Default::default()
        };
        let query = ListingQuery::for_viewer(params, false).unwrap();
        assert_eq!(query.statuses, Some(vec![ListingStatus::Published]));
        assert!(!query.matches(&listing(ListingStatus::Pending, 1.0, "Pending item")));
        assert!(query.matches(&listing(ListingStatus::Published, 1.0, "Public item")));
    }

    #[test]
    fn privileged_viewers_filter_by_status_set() {
        let params = ListingSearchParams {
            statuses: vec![ListingStatus::Pending, ListingStatus::Rejected],
            ..Default::default()
        };
        let query = ListingQuery::for_viewer(params, true).unwrap();
        assert!(query.matches(&listing(ListingStatus::Pending, 1.0, "Pending item")));
        assert!(query.matches(&listing(ListingStatus::Rejected, 1.0, "Rejected item")));
        assert!(!query.matches(&listing(ListingStatus::Published, 1.0, "Public item")));

        let any = ListingQuery::for_viewer(ListingSearchParams::default(), true).unwrap();
        assert_eq!(any.statuses, None);
    }

    #[test]
    fn repeated_statuses_collapse_keeping_first_order() {
        let params = ListingSearchParams {
            statuses: vec![
                ListingStatus::Pending,
                ListingStatus::Rejected,
                ListingStatus::Pending,
                ListingStatus::Rejected,
            ],
            ..Default::default()
        };
        let query = ListingQuery::for_viewer(params, true).unwrap();
        assert_eq!(
            query.statuses,
            Some(vec![ListingStatus::Pending, ListingStatus::Rejected])
        );
    }

    #[test]
    fn price_bounds_are_independent() {
        let cheap = listing(ListingStatus::Published, 5.0, "Cheap thing");
        let pricey = listing(ListingStatus::Published, 500.0, "Pricey thing");

        let min_only = ListingQuery::for_viewer(
            ListingSearchParams {
                min_price: Some(10.0),
                ..Default::default()
            },
            false,
        )
        .unwrap();
        assert!(!min_only.matches(&cheap));
        assert!(min_only.matches(&pricey));

        let max_only = ListingQuery::for_viewer(
            ListingSearchParams {
                max_price: Some(10.0),
                ..Default::default()
            },
            false,
        )
        .unwrap();
        assert!(max_only.matches(&cheap));
        assert!(!max_only.matches(&pricey));

        let inverted = ListingSearchParams {
            min_price: Some(10.0),
            max_price: Some(1.0),
            ..Default::default()
        };
        assert!(ListingQuery::for_viewer(inverted, false).is_err());
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_description() {
        let item = listing(ListingStatus::Published, 1.0, "Mountain Bike");
        let query = ListingQuery::for_viewer(
            ListingSearchParams {
                search: Some("mountain".into()),
                location: Some("nang".into()),
                ..Default::default()
            },
            false,
        )
        .unwrap();
        assert!(query.matches(&item));
    }

    #[test]
    fn page_request_clamps() {
        let page = PageRequest::new(Some(0), Some(1000));
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, MAX_PAGE_SIZE);
        assert_eq!(PageRequest::new(Some(3), Some(20)).offset(), 40);
    }

    #[test]
    fn page_counts_round_up() {
        let page = Page::new(vec![1, 2], 21, PageRequest::new(Some(1), Some(10)));
        assert_eq!(page.pagination.total_pages, 3);
        let empty: Page<i32> = Page::new(vec![], 0, PageRequest::default());
        assert_eq!(empty.pagination.total_pages, 0);
    }
}
