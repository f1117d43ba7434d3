use serde::Serialize;

use crate::errors::{DomainError, Violations};
use crate::value_objects::{
    is_http_url, ListingId, PasswordHash, Timestamp, UserEmail, UserId, UserRole, Username,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: Username,
    pub email: UserEmail,
    pub display_name: String,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    #[serde(skip_serializing)]
    pub verify_token: Option<String>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub favorites: Vec<ListingId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing)]
    pub destroyed: bool,
}

impl User {
    pub fn register(
        id: UserId,
        username: Username,
        email: UserEmail,
        password: PasswordHash,
        verify_token: String,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            display_name: username.as_str().to_owned(),
            username,
            email,
            password,
            role: UserRole::Client,
            avatar: None,
            phone_number: None,
            address: None,
            is_active: true,
            verify_token: Some(verify_token),
            refresh_token: None,
            favorites: Vec::new(),
            created_at: now,
            updated_at: now,
            destroyed: false,
        }
    }

    /// 校验邮箱验证令牌，成功后激活账户并清除令牌。
    pub fn verify(&mut self, token: &str, now: Timestamp) -> bool {
        match self.verify_token.as_deref() {
            Some(expected) if expected == token => {
                self.is_active = true;
                self.verify_token = None;
                self.updated_at = now;
                true
            }
            _ => false,
        }
    }

    pub fn apply_profile(&mut self, patch: ProfilePatch, now: Timestamp) -> Result<(), DomainError> {
        patch.validate()?;
        if let Some(display_name) = patch.display_name {
            self.display_name = display_name.trim().to_owned();
        }
        if let Some(username) = patch.username {
            self.username = username;
        }
        if let Some(avatar) = patch.avatar {
            self.avatar = Some(avatar);
        }
        if let Some(phone) = patch.phone_number {
            self.phone_number = Some(phone);
        }
        if let Some(address) = patch.address {
            self.address = Some(address);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn apply_admin(&mut self, patch: AdminUserPatch, now: Timestamp) -> Result<(), DomainError> {
        self.apply_profile(patch.profile, now)?;
        if let Some(email) = patch.email {
            self.email = email;
        }
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(active) = patch.is_active {
            self.is_active = active;
        }
        Ok(())
    }

    pub fn set_password(&mut self, password: PasswordHash, now: Timestamp) {
        self.password = password;
        self.updated_at = now;
    }

    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id,
            username: self.username.as_str().to_owned(),
            display_name: self.display_name.clone(),
            email: self.email.as_str().to_owned(),
            avatar: self.avatar.clone(),
            role: self.role,
        }
    }
}

/// 对外展示的用户公开字段。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: UserId,
    pub username: String,
    pub display_name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub role: UserRole,
}

/// 用户可自行修改的资料字段。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub username: Option<Username>,
    pub avatar: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

impl ProfilePatch {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut violations = Violations::new();
        if let Some(name) = &self.display_name {
            let len = name.trim().chars().count();
            violations.check((1..=100).contains(&len), "displayName", "must be 1-100 characters");
        }
        if let Some(avatar) = &self.avatar {
            violations.check(is_http_url(avatar), "avatar", "must be an http(s) url");
        }
        if let Some(phone) = &self.phone_number {
            let ok = !phone.is_empty()
                && phone.len() <= 20
                && phone
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' '));
            violations.check(ok, "phoneNumber", "must be a phone number");
        }
        if let Some(address) = &self.address {
            violations.check(address.chars().count() <= 255, "address", "too long");
        }
        violations.into_result()
    }
}

/// 管理员可修改的字段。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminUserPatch {
    pub profile: ProfilePatch,
    pub email: Option<UserEmail>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample() -> User {
        User::register(
            UserId::generate(),
            Username::parse("alice").unwrap(),
            UserEmail::parse("alice@example.com").unwrap(),
            PasswordHash::new("hash").unwrap(),
            "token".into(),
            Utc::now(),
        )
    }

    #[test]
    fn register_defaults_display_name_and_role() {
        let user = sample();
        assert_eq!(user.display_name, "alice");
        assert_eq!(user.role, UserRole::Client);
        assert!(user.favorites.is_empty());
        assert!(!user.destroyed);
    }

    #[test]
    fn secrets_are_not_serialized() {
        let mut user = sample();
        user.refresh_token = Some("refresh".into());
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("verifyToken").is_none());
        assert!(json.get("refreshToken").is_none());
        assert_eq!(json["displayName"], "alice");
    }

    #[test]
    fn verify_requires_matching_token() {
        let mut user = sample();
        assert!(!user.verify("wrong", Utc::now()));
        assert!(user.verify("token", Utc::now()));
        assert!(user.verify_token.is_none());
    }

    #[test]
    fn profile_patch_reports_every_violation() {
        let patch = ProfilePatch {
            display_name: Some("  ".into()),
            avatar: Some("file:///etc/passwd".into()),
            phone_number: Some("call me".into()),
            ..Default::default()
        };
        match patch.validate() {
            Err(DomainError::Validation { violations }) => assert_eq!(violations.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }
}
