//! JWT 认证
//!
//! 访问令牌与刷新令牌使用不同密钥签发；HTTP 与 WebSocket 共用同一套校验。

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
};
use config::JwtConfig;
use domain::{Actor, User, UserId, UserRole};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, state::AppState};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";
/// Cookie 有效期 14 天
const COOKIE_MAX_AGE_SECS: i64 = 14 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    pub exp: i64,
}

impl Claims {
    pub fn actor(&self) -> Result<Actor, ApiError> {
        let user_id =
            UserId::parse(&self.sub).map_err(|_| ApiError::unauthorized("invalid token subject"))?;
        Ok(Actor::new(user_id, self.role))
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl KeyPair {
    fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }
}

#[derive(Clone)]
pub struct JwtService {
    access: Arc<KeyPair>,
    refresh: Arc<KeyPair>,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access: Arc::new(KeyPair::new(
                &config.access_secret,
                config.access_ttl_hours,
            )),
            refresh: Arc::new(KeyPair::new(
                &config.refresh_secret,
                config.refresh_ttl_hours,
            )),
        }
    }

    fn sign(keys: &KeyPair, user: &User) -> Result<String, ApiError> {
        let exp = chrono::Utc::now() + chrono::Duration::hours(keys.ttl_hours);
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.as_str().to_owned(),
            role: user.role,
            exp: exp.timestamp(),
        };
        encode(&Header::default(), &claims, &keys.encoding).map_err(|err| {
            tracing::error!(error = %err, "签发令牌失败");
            ApiError::internal_server_error("token generation failed")
        })
    }

    fn check(keys: &KeyPair, token: &str) -> Result<Claims, ApiError> {
        decode::<Claims>(token, &keys.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|_| ApiError::unauthorized("invalid or expired token"))
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String, ApiError> {
        Self::sign(&self.access, user)
    }

    pub fn issue_refresh_token(&self, user: &User) -> Result<String, ApiError> {
        Self::sign(&self.refresh, user)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<Claims, ApiError> {
        Self::check(&self.access, token)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, ApiError> {
        Self::check(&self.refresh, token)
    }
}

/// 读取 `Cookie` 请求头中的指定项，值可以带双引号。
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| {
            let value = value.trim();
            value
                .strip_prefix('"')
                .and_then(|inner| inner.strip_suffix('"'))
                .unwrap_or(value)
                .to_owned()
        })
        .filter(|value| !value.is_empty())
}

/// 先看 `Authorization: Bearer`，再看访问令牌 cookie。
pub fn access_token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
        .or_else(|| cookie_value(headers, ACCESS_COOKIE))
}

pub fn session_cookie(name: &str, value: &str, secure: bool) -> HeaderValue {
    let secure = if secure { "; Secure; SameSite=None" } else { "; SameSite=Lax" };
    let cookie = format!("{name}={value}; Path=/; HttpOnly; Max-Age={COOKIE_MAX_AGE_SECS}{secure}");
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

pub fn expired_cookie(name: &str, secure: bool) -> HeaderValue {
    let secure = if secure { "; Secure; SameSite=None" } else { "; SameSite=Lax" };
    let cookie = format!("{name}=; Path=/; HttpOnly; Max-Age=0{secure}");
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// 已认证的调用方。
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub actor: Actor,
    pub email: String,
}

impl AuthUser {
    pub fn user_id(&self) -> UserId {
        self.actor.user_id
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = access_token_from_headers(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("missing access token"))?;
        let claims = state.jwt_service.verify_access_token(&token)?;
        Ok(AuthUser {
            actor: claims.actor()?,
            email: claims.email,
        })
    }
}

/// 可选认证：没有令牌或令牌无效时视为匿名访问。
#[derive(Debug, Clone)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuthUser(
            AuthUser::from_request_parts(parts, state).await.ok(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{PasswordHash, UserEmail, Username};

    fn config() -> JwtConfig {
        JwtConfig {
            access_secret: "a".repeat(32),
            refresh_secret: "r".repeat(32),
            access_ttl_hours: 1,
            refresh_ttl_hours: 2,
        }
    }

    fn user() -> User {
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
    fn access_and_refresh_tokens_are_not_interchangeable() {
        let jwt = JwtService::new(&config());
        let user = user();
        let access = jwt.issue_access_token(&user).unwrap();
        let refresh = jwt.issue_refresh_token(&user).unwrap();

        let claims = jwt.verify_access_token(&access).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, UserRole::Client);
        assert!(jwt.verify_access_token(&refresh).is_err());
        assert!(jwt.verify_refresh_token(&access).is_err());
        assert!(jwt.verify_refresh_token(&refresh).is_ok());
    }

    #[test]
    fn token_read_from_bearer_then_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; accessToken=from-cookie"),
        );
        assert_eq!(
            access_token_from_headers(&headers).as_deref(),
            Some("from-cookie")
        );

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        assert_eq!(
            access_token_from_headers(&headers).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn cookie_values_may_be_quoted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark;accessToken=\"quoted-token\"; refreshToken=\"\""),
        );
        assert_eq!(
            cookie_value(&headers, ACCESS_COOKIE).as_deref(),
            Some("quoted-token")
        );
        assert_eq!(cookie_value(&headers, REFRESH_COOKIE), None);
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie(ACCESS_COOKIE, "abc", true);
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with("accessToken=abc"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=None"));
        assert!(cookie.contains("Max-Age=1209600"));
    }
}
