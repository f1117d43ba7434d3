use serde::Serialize;

use crate::errors::{DomainError, Violations};
use crate::value_objects::{ListingId, ReviewId, Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub listing_id: ListingId,
    pub author_id: UserId,
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing)]
    pub destroyed: bool,
}

fn check(violations: &mut Violations, rating: Option<u8>, comment: Option<&str>) {
    if let Some(rating) = rating {
        violations.check((1..=5).contains(&rating), "rating", "must be between 1 and 5");
    }
    if let Some(comment) = comment {
        violations.check(
            comment.chars().count() <= 1000,
            "comment",
            "must be at most 1000 characters",
        );
    }
}

impl Review {
    pub fn create(
        id: ReviewId,
        listing_id: ListingId,
        author_id: UserId,
        rating: u8,
        comment: Option<String>,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        let mut violations = Violations::new();
        check(&mut violations, Some(rating), comment.as_deref());
        violations.into_result()?;
        Ok(Self {
            id,
            listing_id,
            author_id,
            rating,
            comment,
            created_at: now,
            updated_at: now,
            destroyed: false,
        })
    }

    pub fn revise(
        &mut self,
        rating: Option<u8>,
        comment: Option<String>,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        let mut violations = Violations::new();
        check(&mut violations, rating, comment.as_deref());
        violations.into_result()?;
        if let Some(rating) = rating {
            self.rating = rating;
        }
        if comment.is_some() {
            self.comment = comment;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn is_authored_by(&self, user_id: UserId) -> bool {
        self.author_id == user_id
    }
}
