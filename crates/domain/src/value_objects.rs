use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = DateTime<Utc>;

const ENTITY_ID_LEN: usize = 12;

static ID_COUNTER: AtomicU32 = AtomicU32::new(0);
static PROCESS_NONCE: OnceLock<[u8; 5]> = OnceLock::new();

/// 不透明的实体标识：12 字节，对外表现为 24 位小写十六进制字符串。
///
/// 布局为 4 字节秒级时间戳、5 字节进程随机数、3 字节自增计数，
/// 因此同一进程内生成的标识按创建顺序递增。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId([u8; ENTITY_ID_LEN]);

impl EntityId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; ENTITY_ID_LEN];
        let secs = Utc::now().timestamp() as u32;
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        let nonce = PROCESS_NONCE.get_or_init(rand::random::<[u8; 5]>);
        bytes[4..9].copy_from_slice(nonce);
        let count = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// 解析 24 位十六进制字符串，`field` 用于错误上下文。
    pub fn parse_field(field: &str, value: &str) -> Result<Self, DomainError> {
        let trimmed = value.trim();
        if trimmed.len() != ENTITY_ID_LEN * 2 {
            return Err(DomainError::invalid_identifier(field, value));
        }
        let decoded = HEXLOWER_PERMISSIVE
            .decode(trimmed.as_bytes())
            .map_err(|_| DomainError::invalid_identifier(field, value))?;
        let bytes: [u8; ENTITY_ID_LEN] = decoded
            .try_into()
            .map_err(|_| DomainError::invalid_identifier(field, value))?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        HEXLOWER.encode(&self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.to_hex())
    }
}

impl FromStr for EntityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_field("id", s)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(EntityId);

        impl $name {
            pub fn generate() -> Self {
                Self(EntityId::generate())
            }

            pub fn parse(value: &str) -> Result<Self, DomainError> {
                EntityId::parse_field($field, value).map(Self)
            }

            pub fn entity_id(&self) -> EntityId {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<EntityId> for $name {
            fn from(value: EntityId) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// 用户唯一标识。
    UserId,
    "userId"
);
entity_id!(
    /// 商品唯一标识。
    ListingId,
    "listingId"
);
entity_id!(
    /// 分类唯一标识。
    CategoryId,
    "categoryId"
);
entity_id!(
    /// 会话唯一标识。
    ConversationId,
    "conversationId"
);
entity_id!(
    /// 消息唯一标识。
    MessageId,
    "messageId"
);
entity_id!(
    /// 评价唯一标识。
    ReviewId,
    "reviewId"
);

/// 用户角色：普通用户或管理员。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Client,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Client => "client",
            UserRole::Admin => "admin",
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl FromStr for UserRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(UserRole::Client),
            "admin" => Ok(UserRole::Admin),
            other => Err(DomainError::validation(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

/// 发起操作的已认证身份。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub role: UserRole,
}

impl Actor {
    pub fn new(user_id: UserId, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_privileged(&self) -> bool {
        self.role.is_privileged()
    }
}

/// 经过验证的用户名。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::validation("username", "cannot be empty"));
        }
        if value.chars().count() > 50 {
            return Err(DomainError::validation("username", "too long"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 经过验证的邮箱（统一转为小写）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserEmail(String);

impl UserEmail {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_lowercase();
        if value.is_empty() {
            return Err(DomainError::validation("email", "cannot be empty"));
        }
        let valid = match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
            }
            None => false,
        };
        if !valid {
            return Err(DomainError::validation("email", "must be a valid email address"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserEmail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 经过外部服务生成的密码哈希。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let hash = value.into();
        if hash.trim().is_empty() {
            return Err(DomainError::validation("password_hash", "cannot be empty"));
        }
        Ok(Self(hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 明文密码规则：至少 8 位，且同时包含字母和数字。
pub fn validate_password_rule(plaintext: &str) -> Result<(), DomainError> {
    let long_enough = plaintext.chars().count() >= 8 && plaintext.chars().count() <= 256;
    let has_letter = plaintext.chars().any(|c| c.is_alphabetic());
    let has_digit = plaintext.chars().any(|c| c.is_ascii_digit());
    if long_enough && has_letter && has_digit {
        Ok(())
    } else {
        Err(DomainError::validation(
            "password",
            "must be at least 8 characters and contain at least one letter and one number",
        ))
    }
}

/// 仅接受 http/https 绝对地址。
pub fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}
