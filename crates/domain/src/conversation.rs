use std::fmt;

use serde::Serialize;

use crate::errors::DomainError;
use crate::message::Message;
use crate::user::UserSnapshot;
use crate::value_objects::{ConversationId, Timestamp, UserId};

/// 参与者无序对的规范键：两个标识排序后以 `:` 连接。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PairKey(String);

impl PairKey {
    pub fn new(a: UserId, b: UserId) -> Result<Self, DomainError> {
        if a == b {
            return Err(DomainError::validation(
                "receiverId",
                "a conversation needs two different participants",
            ));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self(format!("{low}:{high}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: [UserId; 2],
    #[serde(skip_serializing)]
    pub pair_key: PairKey,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing)]
    pub destroyed: bool,
}

impl Conversation {
    /// 参与者按调用顺序保存，匹配只依赖 `pair_key`。
    pub fn open(
        id: ConversationId,
        first: UserId,
        second: UserId,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        let pair_key = PairKey::new(first, second)?;
        Ok(Self {
            id,
            participants: [first, second],
            pair_key,
            created_at: now,
            updated_at: now,
            destroyed: false,
        })
    }

    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn other_participant(&self, user_id: UserId) -> Option<UserId> {
        match self.participants {
            [a, b] if a == user_id => Some(b),
            [a, b] if b == user_id => Some(a),
            _ => None,
        }
    }
}

/// 会话列表项：对方公开信息与最后一条消息。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub participants: [UserId; 2],
    pub other_participant: Option<UserSnapshot>,
    pub last_message: Option<Message>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ConversationSummary {
    pub fn last_activity(&self) -> Timestamp {
        self.last_message
            .as_ref()
            .map(|m| m.created_at)
            .unwrap_or(self.updated_at)
    }
}
