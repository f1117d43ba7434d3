use std::sync::Arc;

use data_encoding::HEXLOWER;
use domain::{
    validate_password_rule, Actor, AdminUserPatch, DomainError, Listing, ListingId, Page,
    ProfilePatch, ReadScope, RepositoryError, User, UserEmail, UserId, UserQuery, UserRole,
    Username,
};
use tracing::info;

use crate::{
    clock::Clock,
    error::ApplicationError,
    password::PasswordHasher,
    repository::{ListingRepository, UserRepository},
};

use super::ensure_privileged;

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AuthenticateUserRequest {
    pub email: String,
    pub password: String,
}

/// 管理员直接创建用户。
#[derive(Debug, Clone)]
pub struct AdminCreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
    pub display_name: Option<String>,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub listing_repository: Arc<dyn ListingRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub clock: Arc<dyn Clock>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

fn generate_verify_token() -> String {
    HEXLOWER.encode(&rand::random::<[u8; 32]>())
}

fn email_conflict(err: RepositoryError, email: &UserEmail) -> ApplicationError {
    match err {
        RepositoryError::Conflict { .. } => {
            DomainError::conflict("user", "email", email.as_str()).into()
        }
        other => other.into(),
    }
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    async fn load(&self, id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(id, ReadScope::Live)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", id))
    }

    async fn create_user(
        &self,
        username: String,
        email: String,
        password: String,
    ) -> Result<User, ApplicationError> {
        let username = Username::parse(username)?;
        let email = UserEmail::parse(email)?;
        validate_password_rule(&password)?;

        if self
            .deps
            .user_repository
            .find_by_email(&email)
            .await?
            .is_some()
        {
            return Err(DomainError::conflict("user", "email", email.as_str()).into());
        }

        let password_hash = self.deps.password_hasher.hash(&password).await?;
        let user = User::register(
            UserId::generate(),
            username,
            email.clone(),
            password_hash,
            generate_verify_token(),
            self.deps.clock.now(),
        );
        self.deps
            .user_repository
            .create(user)
            .await
            .map_err(|err| email_conflict(err, &email))
    }

    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        let user = self
            .create_user(request.username, request.email, request.password)
            .await?;
        info!(user_id = %user.id, "新用户注册");
        Ok(user)
    }

    /// 邮箱验证：令牌匹配则激活账户。
    pub async fn verify_account(&self, email: &str, token: &str) -> Result<User, ApplicationError> {
        let email = UserEmail::parse(email)?;
        let mut user = self
            .deps
            .user_repository
            .find_by_email(&email)
            .await?
            .ok_or(ApplicationError::Authentication)?;
        if !user.verify(token, self.deps.clock.now()) {
            return Err(ApplicationError::Authentication);
        }
        Ok(self.deps.user_repository.update(user).await?)
    }

    pub async fn authenticate(
        &self,
        request: AuthenticateUserRequest,
    ) -> Result<User, ApplicationError> {
        let email = UserEmail::parse(request.email).map_err(|_| ApplicationError::Authentication)?;
        let user = self
            .deps
            .user_repository
            .find_by_email(&email)
            .await?
            .ok_or(ApplicationError::Authentication)?;

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !password_ok {
            return Err(ApplicationError::Authentication);
        }

        if !user.is_active {
            return Err(ApplicationError::AccountInactive);
        }

        Ok(user)
    }

    /// 登录时保存刷新令牌，登出时传入 `None` 清除。
    pub async fn store_refresh_token(
        &self,
        user_id: UserId,
        token: Option<String>,
    ) -> Result<(), ApplicationError> {
        let mut user = self.load(user_id).await?;
        user.refresh_token = token;
        user.updated_at = self.deps.clock.now();
        self.deps.user_repository.update(user).await?;
        Ok(())
    }

    /// 刷新令牌必须与账户上保存的一致。
    pub async fn check_refresh_token(
        &self,
        user_id: UserId,
        token: &str,
    ) -> Result<User, ApplicationError> {
        let user = self
            .deps
            .user_repository
            .find_by_id(user_id, ReadScope::Live)
            .await?
            .ok_or(ApplicationError::Authentication)?;
        match user.refresh_token.as_deref() {
            Some(stored) if stored == token => Ok(user),
            _ => Err(ApplicationError::Authentication),
        }
    }

    pub async fn me(&self, user_id: UserId) -> Result<User, ApplicationError> {
        self.load(user_id).await
    }

    pub async fn update_profile(
        &self,
        user_id: UserId,
        patch: ProfilePatch,
    ) -> Result<User, ApplicationError> {
        let mut user = self.load(user_id).await?;
        user.apply_profile(patch, self.deps.clock.now())?;
        Ok(self.deps.user_repository.update(user).await?)
    }

    pub async fn add_favorite(
        &self,
        user_id: UserId,
        listing_id: ListingId,
    ) -> Result<User, ApplicationError> {
        self.deps
            .listing_repository
            .find_by_id(listing_id, ReadScope::Live)
            .await?
            .ok_or_else(|| ApplicationError::not_found("listing", listing_id))?;
        self.deps
            .user_repository
            .add_favorite(user_id, listing_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", user_id))
    }

    pub async fn remove_favorite(
        &self,
        user_id: UserId,
        listing_id: ListingId,
    ) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .remove_favorite(user_id, listing_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("user", user_id))
    }

    /// 收藏的商品，已删除的跳过。
    pub async fn list_favorites(&self, user_id: UserId) -> Result<Vec<Listing>, ApplicationError> {
        let user = self.load(user_id).await?;
        let mut listings = self
            .deps
            .listing_repository
            .find_by_ids(&user.favorites)
            .await?;
        listings.sort_by_key(|l| user.favorites.iter().position(|f| *f == l.id));
        Ok(listings)
    }

    pub async fn list_users(
        &self,
        actor: &Actor,
        query: UserQuery,
    ) -> Result<Page<User>, ApplicationError> {
        ensure_privileged(actor)?;
        let users = self.deps.user_repository.find(&query).await?;
        let total = self.deps.user_repository.count(&query).await?;
        Ok(Page::new(users, total, query.page))
    }

    pub async fn get_user(&self, actor: &Actor, id: UserId) -> Result<User, ApplicationError> {
        ensure_privileged(actor)?;
        self.load(id).await
    }

    pub async fn create_user_as_admin(
        &self,
        actor: &Actor,
        request: AdminCreateUserRequest,
    ) -> Result<User, ApplicationError> {
        ensure_privileged(actor)?;
        let mut user = self
            .create_user(request.username, request.email, request.password)
            .await?;
        user.role = request.role;
        user.verify_token = None;
        if let Some(display_name) = request.display_name {
            user.apply_profile(
                ProfilePatch {
                    display_name: Some(display_name),
                    ..Default::default()
                },
                self.deps.clock.now(),
            )?;
        }
        let user = self.deps.user_repository.update(user).await?;
        info!(admin_id = %actor.user_id, user_id = %user.id, "管理员创建用户");
        Ok(user)
    }

    pub async fn update_user(
        &self,
        actor: &Actor,
        id: UserId,
        patch: AdminUserPatch,
    ) -> Result<User, ApplicationError> {
        ensure_privileged(actor)?;
        let mut user = self.load(id).await?;
        let email = patch.email.clone();
        user.apply_admin(patch, self.deps.clock.now())?;
        let email = email.unwrap_or_else(|| user.email.clone());
        self.deps
            .user_repository
            .update(user)
            .await
            .map_err(|err| email_conflict(err, &email))
    }

    pub async fn delete_user(&self, actor: &Actor, id: UserId) -> Result<(), ApplicationError> {
        ensure_privileged(actor)?;
        if !self.deps.user_repository.soft_delete(id).await? {
            return Err(ApplicationError::not_found("user", id));
        }
        info!(admin_id = %actor.user_id, user_id = %id, "管理员删除用户");
        Ok(())
    }
}
