use serde::{Deserialize, Serialize};

use crate::conversation::Conversation;
use crate::errors::{DomainError, Violations};
use crate::value_objects::{is_http_url, ConversationId, MessageId, Timestamp, UserId};

pub const MAX_TEXT_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// 消息内容：文本、图片地址、地理位置至少提供一项。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContent {
    pub message: Option<String>,
    pub image_url: Option<String>,
    pub location: Option<GeoPoint>,
}

impl MessageContent {
    pub fn new(
        message: Option<String>,
        image_url: Option<String>,
        location: Option<GeoPoint>,
    ) -> Result<Self, DomainError> {
        let mut violations = Violations::new();
        if let Some(text) = &message {
            violations.check(
                text.chars().count() <= MAX_TEXT_LEN,
                "message",
                "must be at most 2000 characters",
            );
        }
        if let Some(url) = &image_url {
            violations.check(is_http_url(url), "imageUrl", "must be an http(s) url");
        }
        if let Some(point) = &location {
            violations.check(
                (-90.0..=90.0).contains(&point.latitude),
                "location.latitude",
                "must be between -90 and 90",
            );
            violations.check(
                (-180.0..=180.0).contains(&point.longitude),
                "location.longitude",
                "must be between -180 and 180",
            );
        }
        let has_text = message.as_deref().is_some_and(|t| !t.trim().is_empty());
        violations.check(
            has_text || image_url.is_some() || location.is_some(),
            "message",
            "one of message, imageUrl or location is required",
        );
        violations.into_result()?;

        Ok(Self {
            message: message.filter(|t| !t.trim().is_empty()),
            image_url,
            location,
        })
    }
}

/// 不可变的会话消息。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    #[serde(flatten)]
    pub content: MessageContent,
    pub is_read: bool,
    pub created_at: Timestamp,
    #[serde(skip_serializing)]
    pub destroyed: bool,
}

impl Message {
    /// 发送方与接收方都必须是会话参与者，且不能相同。
    pub fn compose(
        id: MessageId,
        conversation: &Conversation,
        sender_id: UserId,
        receiver_id: UserId,
        content: MessageContent,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        if sender_id == receiver_id
            || !conversation.has_participant(sender_id)
            || !conversation.has_participant(receiver_id)
        {
            return Err(DomainError::forbidden(
                "sender and receiver must be the two participants of the conversation",
            ));
        }
        Ok(Self {
            id,
            conversation_id: conversation.id,
            sender_id,
            receiver_id,
            content,
            is_read: false,
            created_at: now,
            destroyed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn empty_content_is_rejected() {
        assert!(matches!(
            MessageContent::new(None, None, None),
            Err(DomainError::Validation { .. })
        ));
        assert!(MessageContent::new(Some("   ".into()), None, None).is_err());
    }

    #[test]
    fn any_single_content_field_is_enough() {
        assert!(MessageContent::new(Some("hi".into()), None, None).is_ok());
        assert!(MessageContent::new(None, Some("https://x.io/a.jpg".into()), None).is_ok());
        let point = GeoPoint {
            latitude: 21.0,
            longitude: 105.8,
        };
        assert!(MessageContent::new(None, None, Some(point)).is_ok());
    }

    #[test]
    fn text_over_limit_and_bad_coordinates_fail() {
        let long = "x".repeat(MAX_TEXT_LEN + 1);
        let point = GeoPoint {
            latitude: 91.0,
            longitude: 0.0,
        };
        match MessageContent::new(Some(long), None, Some(point)) {
            Err(DomainError::Validation { violations }) => assert_eq!(violations.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn compose_requires_participants() {
        let a = UserId::generate();
        let b = UserId::generate();
        let outsider = UserId::generate();
        let conversation =
            Conversation::open(ConversationId::generate(), a, b, Utc::now()).unwrap();
        let content = MessageContent::new(Some("hello".into()), None, None).unwrap();

        let message = Message::compose(
            MessageId::generate(),
            &conversation,
            b,
            a,
            content.clone(),
            Utc::now(),
        )
        .unwrap();
        assert!(!message.is_read);
        assert_eq!(message.conversation_id, conversation.id);

        assert!(Message::compose(
            MessageId::generate(),
            &conversation,
            outsider,
            a,
            content,
            Utc::now()
        )
        .is_err());
    }

    #[test]
    fn serializes_flat_content() {
        let a = UserId::generate();
        let b = UserId::generate();
        let conversation =
            Conversation::open(ConversationId::generate(), a, b, Utc::now()).unwrap();
        let content = MessageContent::new(Some("hello".into()), None, None).unwrap();
        let message =
            Message::compose(MessageId::generate(), &conversation, a, b, content, Utc::now())
                .unwrap();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["message"], "hello");
        assert_eq!(json["isRead"], false);
        assert_eq!(json["receiverId"], b.to_string());
    }
}
