use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, Violations};
use crate::value_objects::{is_http_url, CategoryId, ListingId, Timestamp, UserId};
use crate::user::UserSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    #[default]
    Pending,
    Published,
    Expired,
    Deleted,
    Rejected,
}

impl ListingStatus {
    pub const ALL: [ListingStatus; 5] = [
        ListingStatus::Pending,
        ListingStatus::Published,
        ListingStatus::Expired,
        ListingStatus::Deleted,
        ListingStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Pending => "PENDING",
            ListingStatus::Published => "PUBLISHED",
            ListingStatus::Expired => "EXPIRED",
            ListingStatus::Deleted => "DELETED",
            ListingStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        ListingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == upper)
            .ok_or_else(|| DomainError::validation("status", format!("unknown status '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingCondition {
    New,
    LikeNew,
    Used,
}

impl ListingCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingCondition::New => "new",
            ListingCondition::LikeNew => "like_new",
            ListingCondition::Used => "used",
        }
    }
}

impl FromStr for ListingCondition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ListingCondition::New),
            "like_new" => Ok(ListingCondition::LikeNew),
            "used" => Ok(ListingCondition::Used),
            other => Err(DomainError::validation(
                "condition",
                format!("unknown condition '{other}'"),
            )),
        }
    }
}

/// 商品。`views` 与 `viewed_by` 始终保持一致：计数等于浏览者集合大小。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: ListingId,
    pub seller_id: UserId,
    pub category_id: CategoryId,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub condition: ListingCondition,
    pub images: Vec<String>,
    pub location: Option<String>,
    pub status: ListingStatus,
    pub rejection_reason: Option<String>,
    pub views: i64,
    #[serde(skip_serializing)]
    pub viewed_by: Vec<UserId>,
    pub is_featured: bool,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing)]
    pub destroyed: bool,
}

/// 创建商品时提交的内容。
#[derive(Debug, Clone, PartialEq)]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub category_id: CategoryId,
    pub condition: ListingCondition,
    pub images: Vec<String>,
    pub location: Option<String>,
    pub status: Option<ListingStatus>,
    pub expires_at: Option<Timestamp>,
}

/// 卖家可修改的内容字段，卖家与创建时间等不可变字段不在其中。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub category_id: Option<CategoryId>,
    pub condition: Option<ListingCondition>,
    pub images: Option<Vec<String>>,
    pub location: Option<String>,
}

fn check_title(violations: &mut Violations, title: &str) {
    let len = title.trim().chars().count();
    violations.check((5..=100).contains(&len), "title", "must be 5-100 characters");
}

fn check_description(violations: &mut Violations, description: &str) {
    let len = description.trim().chars().count();
    violations.check(
        (10..=5000).contains(&len),
        "description",
        "must be 10-5000 characters",
    );
}

fn check_price(violations: &mut Violations, price: f64) {
    violations.check(
        price.is_finite() && price >= 0.0,
        "price",
        "must be a non-negative number",
    );
}

fn check_images(violations: &mut Violations, images: &[String]) {
    violations.check(
        images.iter().all(|url| is_http_url(url)),
        "images",
        "every image must be an http(s) url",
    );
}

impl Listing {
    pub fn create(
        id: ListingId,
        seller_id: UserId,
        draft: ListingDraft,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        let mut violations = Violations::new();
        check_title(&mut violations, &draft.title);
        check_description(&mut violations, &draft.description);
        check_price(&mut violations, draft.price);
        check_images(&mut violations, &draft.images);
        violations.check(
            draft.status != Some(ListingStatus::Rejected),
            "status",
            "a listing cannot be created as rejected",
        );
        violations.into_result()?;

        Ok(Self {
            id,
            seller_id,
            category_id: draft.category_id,
            title: draft.title.trim().to_owned(),
            description: draft.description.trim().to_owned(),
            price: draft.price,
            condition: draft.condition,
            images: draft.images,
            location: draft.location,
            status: draft.status.unwrap_or_default(),
            rejection_reason: None,
            views: 0,
            viewed_by: Vec::new(),
            is_featured: false,
            expires_at: draft.expires_at,
            created_at: now,
            updated_at: now,
            destroyed: false,
        })
    }

    pub fn apply(&mut self, patch: ListingPatch, now: Timestamp) -> Result<(), DomainError> {
        let mut violations = Violations::new();
        if let Some(title) = &patch.title {
            check_title(&mut violations, title);
        }
        if let Some(description) = &patch.description {
            check_description(&mut violations, description);
        }
        if let Some(price) = patch.price {
            check_price(&mut violations, price);
        }
        if let Some(images) = &patch.images {
            check_images(&mut violations, images);
        }
        violations.into_result()?;

        if let Some(title) = patch.title {
            self.title = title.trim().to_owned();
        }
        if let Some(description) = patch.description {
            self.description = description.trim().to_owned();
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(category_id) = patch.category_id {
            self.category_id = category_id;
        }
        if let Some(condition) = patch.condition {
            self.condition = condition;
        }
        if let Some(images) = patch.images {
            self.images = images;
        }
        if let Some(location) = patch.location {
            self.location = Some(location);
        }
        self.updated_at = now;
        Ok(())
    }

    /// 审核状态变更；拒绝时必须给出原因，其余状态清除原因。
    pub fn moderate(
        &mut self,
        status: ListingStatus,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let reason = reason
            .map(|r| r.trim().to_owned())
            .filter(|r| !r.is_empty());
        if status == ListingStatus::Rejected {
            match reason {
                Some(reason) => self.rejection_reason = Some(reason),
                None => {
                    return Err(DomainError::validation(
                        "rejectionReason",
                        "required when rejecting a listing",
                    ))
                }
            }
        } else {
            self.rejection_reason = None;
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }

    /// 记录一次浏览；卖家本人或已计数的浏览者不会改变计数。
    pub fn register_view(&mut self, viewer: UserId) -> bool {
        if self.seller_id == viewer || self.viewed_by.contains(&viewer) {
            return false;
        }
        self.viewed_by.push(viewer);
        self.views += 1;
        true
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.seller_id == user_id
    }
}

/// 附带卖家公开信息的商品。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingWithSeller {
    #[serde(flatten)]
    pub listing: Listing,
    pub seller: Option<UserSnapshot>,
}
