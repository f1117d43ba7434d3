use std::sync::Arc;

use domain::{Actor, ListingId, ReadScope, Review, ReviewId};
use tracing::info;

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{ListingRepository, ReviewRepository},
};

pub struct ReviewServiceDependencies {
    pub review_repository: Arc<dyn ReviewRepository>,
    pub listing_repository: Arc<dyn ListingRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct ReviewService {
    deps: ReviewServiceDependencies,
}

impl ReviewService {
    pub fn new(deps: ReviewServiceDependencies) -> Self {
        Self { deps }
    }

    async fn ensure_listing(&self, listing_id: ListingId) -> Result<(), ApplicationError> {
        self.deps
            .listing_repository
            .find_by_id(listing_id, ReadScope::Live)
            .await?
            .map(|_| ())
            .ok_or_else(|| ApplicationError::not_found("listing", listing_id))
    }

    /// 只有作者本人可以修改或删除评价。
    async fn load_authored(&self, actor: &Actor, id: ReviewId) -> Result<Review, ApplicationError> {
        let review = self
            .deps
            .review_repository
            .find_by_id(id, ReadScope::Live)
            .await?
            .ok_or_else(|| ApplicationError::not_found("review", id))?;
        if !review.is_authored_by(actor.user_id) {
            return Err(ApplicationError::forbidden("only the author can change this review"));
        }
        Ok(review)
    }

    pub async fn create(
        &self,
        actor: &Actor,
        listing_id: ListingId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Review, ApplicationError> {
        self.ensure_listing(listing_id).await?;
        let review = Review::create(
            ReviewId::generate(),
            listing_id,
            actor.user_id,
            rating,
            comment,
            self.deps.clock.now(),
        )?;
        let stored = self.deps.review_repository.create(review).await?;
        info!(review_id = %stored.id, listing_id = %listing_id, "新增评价");
        Ok(stored)
    }

    pub async fn list_for_listing(
        &self,
        listing_id: ListingId,
    ) -> Result<Vec<Review>, ApplicationError> {
        self.ensure_listing(listing_id).await?;
        Ok(self.deps.review_repository.list_by_listing(listing_id).await?)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: ReviewId,
        rating: Option<u8>,
        comment: Option<String>,
    ) -> Result<Review, ApplicationError> {
        let mut review = self.load_authored(actor, id).await?;
        review.revise(rating, comment, self.deps.clock.now())?;
        Ok(self.deps.review_repository.update(review).await?)
    }

    pub async fn delete(&self, actor: &Actor, id: ReviewId) -> Result<(), ApplicationError> {
        self.load_authored(actor, id).await?;
        self.deps.review_repository.soft_delete(id).await?;
        Ok(())
    }
}
