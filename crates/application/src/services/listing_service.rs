use std::sync::Arc;

use domain::{
    Actor, Listing, ListingDraft, ListingId, ListingPatch, ListingQuery, ListingSearchParams,
    ListingStatus, ListingWithSeller, Page, PageRequest, ReadScope, UserId,
};
use tracing::{debug, info};

use crate::{
    clock::Clock,
    error::ApplicationError,
    repository::{CategoryRepository, ListingRepository, UserRepository},
};

use super::ensure_privileged;

pub struct ListingServiceDependencies {
    pub listing_repository: Arc<dyn ListingRepository>,
    pub category_repository: Arc<dyn CategoryRepository>,
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct ListingService {
    deps: ListingServiceDependencies,
}

impl ListingService {
    pub fn new(deps: ListingServiceDependencies) -> Self {
        Self { deps }
    }

    async fn load(&self, id: ListingId) -> Result<Listing, ApplicationError> {
        self.deps
            .listing_repository
            .find_by_id(id, ReadScope::Live)
            .await?
            .ok_or_else(|| ApplicationError::not_found("listing", id))
    }

    async fn ensure_category(&self, id: domain::CategoryId) -> Result<(), ApplicationError> {
        self.deps
            .category_repository
            .find_by_id(id, ReadScope::Live)
            .await?
            .map(|_| ())
            .ok_or_else(|| ApplicationError::not_found("category", id))
    }

    async fn page(&self, query: ListingQuery) -> Result<Page<ListingWithSeller>, ApplicationError> {
        let items = self.deps.listing_repository.search(&query).await?;
        let total = self.deps.listing_repository.count(&query).await?;
        Ok(Page::new(items, total, query.page))
    }

    pub async fn create(
        &self,
        actor: &Actor,
        draft: ListingDraft,
    ) -> Result<Listing, ApplicationError> {
        // 普通用户只能以待审核状态发布
        if draft.status.is_some_and(|status| status != ListingStatus::Pending) {
            ensure_privileged(actor)?;
        }
        self.ensure_category(draft.category_id).await?;
        let listing = Listing::create(
            ListingId::generate(),
            actor.user_id,
            draft,
            self.deps.clock.now(),
        )?;
        let stored = self.deps.listing_repository.create(listing).await?;
        info!(listing_id = %stored.id, seller_id = %stored.seller_id, "发布新商品");
        Ok(stored)
    }

    /// 商品详情。已登录的浏览者先尝试计数，未计数（本人或重复浏览）不是错误。
    pub async fn get_details(
        &self,
        id: ListingId,
        viewer: Option<UserId>,
    ) -> Result<ListingWithSeller, ApplicationError> {
        let counted = match viewer {
            Some(viewer) => {
                let counted = self.deps.listing_repository.record_view(id, viewer).await?;
                if counted.is_none() {
                    debug!(listing_id = %id, viewer_id = %viewer, "浏览未计数");
                }
                counted
            }
            None => None,
        };
        let listing = match counted {
            Some(listing) => listing,
            None => self.load(id).await?,
        };
        let seller = self
            .deps
            .user_repository
            .find_by_id(listing.seller_id, ReadScope::Live)
            .await?
            .map(|user| user.snapshot());
        Ok(ListingWithSeller { listing, seller })
    }

    pub async fn search(
        &self,
        viewer: Option<&Actor>,
        params: ListingSearchParams,
    ) -> Result<Page<ListingWithSeller>, ApplicationError> {
        let privileged = viewer.is_some_and(Actor::is_privileged);
        let query = ListingQuery::for_viewer(params, privileged)?;
        self.page(query).await
    }

    pub async fn list_published(
        &self,
        page: PageRequest,
    ) -> Result<Page<ListingWithSeller>, ApplicationError> {
        self.page(ListingQuery::published(page)).await
    }

    pub async fn list_mine(
        &self,
        actor: &Actor,
        page: PageRequest,
    ) -> Result<Page<ListingWithSeller>, ApplicationError> {
        self.page(ListingQuery::owned_by(actor.user_id, page)).await
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: ListingId,
        patch: ListingPatch,
    ) -> Result<Listing, ApplicationError> {
        let mut listing = self.load(id).await?;
        if !listing.is_owned_by(actor.user_id) {
            return Err(ApplicationError::forbidden("only the seller can edit this listing"));
        }
        if let Some(category_id) = patch.category_id {
            self.ensure_category(category_id).await?;
        }
        listing.apply(patch, self.deps.clock.now())?;
        Ok(self.deps.listing_repository.update(listing).await?)
    }

    pub async fn moderate(
        &self,
        actor: &Actor,
        id: ListingId,
        status: ListingStatus,
        reason: Option<String>,
    ) -> Result<Listing, ApplicationError> {
        ensure_privileged(actor)?;
        let mut listing = self.load(id).await?;
        listing.moderate(status, reason, self.deps.clock.now())?;
        let stored = self.deps.listing_repository.update(listing).await?;
        info!(listing_id = %id, status = %stored.status, admin_id = %actor.user_id, "商品审核");
        Ok(stored)
    }

    pub async fn delete(&self, actor: &Actor, id: ListingId) -> Result<(), ApplicationError> {
        let listing = self.load(id).await?;
        if !listing.is_owned_by(actor.user_id) && !actor.is_privileged() {
            return Err(ApplicationError::forbidden("only the seller can delete this listing"));
        }
        self.deps.listing_repository.soft_delete(id).await?;
        info!(listing_id = %id, "商品已删除");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::memory::MemoryStore;
    use crate::repository::CategoryRepository;
    use chrono::Utc;
    use domain::{
        Category, CategoryDraft, CategoryId, DomainError, ListingCondition, UserRole,
    };

    struct Fixture {
        service: ListingService,
        category_id: CategoryId,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let category = Category::create(
            CategoryId::generate(),
            CategoryDraft {
                name: "Furniture".into(),
                code: None,
                parent_id: None,
                image_url: None,
            },
            Utc::now(),
        )
        .unwrap();
        let category_id = category.id;
        CategoryRepository::create(store.as_ref(), category).await.unwrap();
        let service = ListingService::new(ListingServiceDependencies {
            listing_repository: store.clone(),
            category_repository: store.clone(),
            user_repository: store,
            clock: Arc::new(SystemClock),
        });
        Fixture {
            service,
            category_id,
        }
    }

    fn draft(category_id: CategoryId, status: Option<ListingStatus>) -> ListingDraft {
        ListingDraft {
            title: "Oak dining table".into(),
            description: "Seats six, minor scratches".into(),
            price: 250.0,
            category_id,
            condition: ListingCondition::Used,
            images: vec![],
            location: Some("Hue".into()),
            status,
            expires_at: None,
        }
    }

    fn client() -> Actor {
        Actor::new(UserId::generate(), UserRole::Client)
    }

    fn admin() -> Actor {
        Actor::new(UserId::generate(), UserRole::Admin)
    }

    #[tokio::test]
    async fn create_then_fetch_round_trips() {
        let fx = fixture().await;
        let seller = client();
        let created = fx
            .service
            .create(&seller, draft(fx.category_id, None))
            .await
            .unwrap();

        let fetched = fx.service.get_details(created.id, None).await.unwrap();
        assert_eq!(fetched.listing.seller_id, seller.user_id);
        assert_eq!(fetched.listing.price, 250.0);
        assert_eq!(fetched.listing.status, ListingStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_category_is_not_found() {
        let fx = fixture().await;
        let err = fx
            .service
            .create(&client(), draft(CategoryId::generate(), None))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Domain(DomainError::NotFound { resource: "category", .. })
        ));
    }

    #[tokio::test]
    async fn details_count_distinct_non_owner_viewers() {
        let fx = fixture().await;
        let seller = admin();
        let created = fx
            .service
            .create(&seller, draft(fx.category_id, Some(ListingStatus::Published)))
            .await
            .unwrap();
        let viewer = UserId::generate();

        fx.service.get_details(created.id, Some(viewer)).await.unwrap();
        fx.service.get_details(created.id, Some(viewer)).await.unwrap();
        let seen = fx
            .service
            .get_details(created.id, Some(seller.user_id))
            .await
            .unwrap();
        assert_eq!(seen.listing.views, 1);
    }

    #[tokio::test]
    async fn ordinary_search_ignores_status_filter() {
        let fx = fixture().await;
        let seller = admin();
        let viewer = client();
        for status in [
            ListingStatus::Pending,
            ListingStatus::Expired,
            ListingStatus::Published,
        ] {
            fx.service
                .create(&seller, draft(fx.category_id, Some(status)))
                .await
                .unwrap();
        }

        let params = ListingSearchParams {
            statuses: vec![ListingStatus::Pending],
            ..Default::default()
        };
        let page = fx.service.search(Some(&viewer), params).await.unwrap();
        assert_eq!(page.pagination.total_items, 1);
        assert!(page
            .data
            .iter()
            .all(|item| item.listing.status == ListingStatus::Published));

        let params = ListingSearchParams {
            statuses: vec![ListingStatus::Pending, ListingStatus::Expired],
            ..Default::default()
        };
        let page = fx.service.search(Some(&admin()), params).await.unwrap();
        assert_eq!(page.pagination.total_items, 2);
    }

    #[tokio::test]
    async fn clients_cannot_skip_moderation_on_create() {
        let fx = fixture().await;
        let seller = client();

        assert!(matches!(
            fx.service
                .create(&seller, draft(fx.category_id, Some(ListingStatus::Published)))
                .await,
            Err(ApplicationError::Authorization)
        ));
        let page = fx
            .service
            .search(None, ListingSearchParams::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total_items, 0);

        let pending = fx
            .service
            .create(&seller, draft(fx.category_id, Some(ListingStatus::Pending)))
            .await
            .unwrap();
        assert_eq!(pending.status, ListingStatus::Pending);
    }

    #[tokio::test]
    async fn only_seller_updates_and_admin_moderates() {
        let fx = fixture().await;
        let seller = client();
        let created = fx
            .service
            .create(&seller, draft(fx.category_id, None))
            .await
            .unwrap();

        let patch = ListingPatch {
            price: Some(99.0),
            ..Default::default()
        };
        assert!(matches!(
            fx.service.update(&client(), created.id, patch.clone()).await,
            Err(ApplicationError::Domain(DomainError::Forbidden { .. }))
        ));
        let updated = fx.service.update(&seller, created.id, patch).await.unwrap();
        assert_eq!(updated.price, 99.0);

        assert!(matches!(
            fx.service
                .moderate(&seller, created.id, ListingStatus::Published, None)
                .await,
            Err(ApplicationError::Authorization)
        ));
        let rejected = fx
            .service
            .moderate(
                &admin(),
                created.id,
                ListingStatus::Rejected,
                Some("missing photos".into()),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, ListingStatus::Rejected);
    }

    #[tokio::test]
    async fn deleted_listing_is_not_found() {
        let fx = fixture().await;
        let seller = client();
        let created = fx
            .service
            .create(&seller, draft(fx.category_id, None))
            .await
            .unwrap();
        assert!(fx.service.delete(&client(), created.id).await.is_err());
        fx.service.delete(&seller, created.id).await.unwrap();
        assert!(matches!(
            fx.service.get_details(created.id, Some(UserId::generate())).await,
            Err(ApplicationError::Domain(DomainError::NotFound { .. }))
        ));
    }
}
