use std::collections::HashSet;
use std::sync::Arc;

use domain::{
    Actor, Category, CategoryDraft, CategoryId, CategoryPatch, CategoryQuery, DomainError, Page,
    ReadScope, RepositoryError,
};
use tracing::info;

use crate::{clock::Clock, error::ApplicationError, repository::CategoryRepository};

use super::ensure_privileged;

pub struct CategoryServiceDependencies {
    pub category_repository: Arc<dyn CategoryRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct CategoryService {
    deps: CategoryServiceDependencies,
}

fn code_conflict(err: RepositoryError, code: Option<&str>) -> ApplicationError {
    match err {
        RepositoryError::Conflict { .. } => {
            DomainError::conflict("category", "code", code.unwrap_or_default()).into()
        }
        other => other.into(),
    }
}

impl CategoryService {
    pub fn new(deps: CategoryServiceDependencies) -> Self {
        Self { deps }
    }

    async fn load(&self, id: CategoryId) -> Result<Category, ApplicationError> {
        self.deps
            .category_repository
            .find_by_id(id, ReadScope::Live)
            .await?
            .ok_or_else(|| ApplicationError::not_found("category", id))
    }

    /// `code` 只能属于一个未删除分类；`own_id` 是正在修改的分类本身。
    async fn ensure_code_available(
        &self,
        code: Option<&str>,
        own_id: Option<CategoryId>,
    ) -> Result<(), ApplicationError> {
        let Some(code) = code else {
            return Ok(());
        };
        match self.deps.category_repository.find_by_code(code).await? {
            Some(existing) if Some(existing.id) != own_id => {
                Err(DomainError::conflict("category", "code", code).into())
            }
            _ => Ok(()),
        }
    }

    /// 父级必须存在，且不能是自身或自身的后代。
    async fn ensure_valid_parent(
        &self,
        parent_id: CategoryId,
        own_id: Option<CategoryId>,
    ) -> Result<(), ApplicationError> {
        let parent = self.load(parent_id).await?;
        let Some(own_id) = own_id else {
            return Ok(());
        };

        let mut visited = HashSet::new();
        let mut cursor = Some(parent);
        while let Some(category) = cursor {
            if category.id == own_id {
                return Err(DomainError::CategoryCycle.into());
            }
            if !visited.insert(category.id) {
                break;
            }
            cursor = match category.parent_id {
                Some(next) => {
                    self.deps
                        .category_repository
                        .find_by_id(next, ReadScope::Live)
                        .await?
                }
                None => None,
            };
        }
        Ok(())
    }

    pub async fn create(
        &self,
        actor: &Actor,
        draft: CategoryDraft,
    ) -> Result<Category, ApplicationError> {
        ensure_privileged(actor)?;
        let category = Category::create(CategoryId::generate(), draft, self.deps.clock.now())?;
        self.ensure_code_available(category.code.as_deref(), None)
            .await?;
        if let Some(parent_id) = category.parent_id {
            self.ensure_valid_parent(parent_id, None).await?;
        }
        let code = category.code.clone();
        let stored = self
            .deps
            .category_repository
            .create(category)
            .await
            .map_err(|err| code_conflict(err, code.as_deref()))?;
        info!(category_id = %stored.id, slug = %stored.slug, "创建分类");
        Ok(stored)
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: CategoryId,
        patch: CategoryPatch,
    ) -> Result<Category, ApplicationError> {
        ensure_privileged(actor)?;
        let mut category = self.load(id).await?;
        if let Some(parent_id) = patch.parent_id {
            if parent_id == id {
                return Err(DomainError::CategoryCycle.into());
            }
            self.ensure_valid_parent(parent_id, Some(id)).await?;
        }
        category.apply(patch, self.deps.clock.now())?;
        self.ensure_code_available(category.code.as_deref(), Some(id))
            .await?;
        let code = category.code.clone();
        self.deps
            .category_repository
            .update(category)
            .await
            .map_err(|err| code_conflict(err, code.as_deref()))
    }

    pub async fn delete(&self, actor: &Actor, id: CategoryId) -> Result<(), ApplicationError> {
        ensure_privileged(actor)?;
        if !self.deps.category_repository.soft_delete(id).await? {
            return Err(ApplicationError::not_found("category", id));
        }
        info!(category_id = %id, "删除分类");
        Ok(())
    }

    pub async fn list(&self, query: CategoryQuery) -> Result<Page<Category>, ApplicationError> {
        let items = self.deps.category_repository.find(&query).await?;
        let total = self.deps.category_repository.count(&query).await?;
        Ok(Page::new(items, total, query.page))
    }

    pub async fn get(&self, id: CategoryId) -> Result<Category, ApplicationError> {
        self.load(id).await
    }
}
