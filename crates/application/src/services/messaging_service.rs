use std::collections::HashMap;
use std::sync::Arc;

use domain::{
    Conversation, ConversationId, ConversationSummary, GeoPoint, Message, MessageContent,
    MessageId, PairKey, ReadScope, UserId,
};
use tracing::{debug, info, warn};

use crate::{
    broadcaster::{MessageBroadcaster, RealtimeEvent},
    clock::Clock,
    conversation::ConversationResolver,
    error::ApplicationError,
    repository::{ConversationRepository, MessageRepository, UserRepository},
};

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub receiver_id: UserId,
    pub message: Option<String>,
    pub image_url: Option<String>,
    pub location: Option<GeoPoint>,
}

pub struct MessagingServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub conversation_repository: Arc<dyn ConversationRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    pub clock: Arc<dyn Clock>,
    /// 发送者自己的连接是否也收到推送
    pub echo_to_sender: bool,
}

pub struct MessagingService {
    deps: MessagingServiceDependencies,
    resolver: ConversationResolver,
}

impl MessagingService {
    pub fn new(deps: MessagingServiceDependencies) -> Self {
        let resolver =
            ConversationResolver::new(deps.conversation_repository.clone(), deps.clock.clone());
        Self { deps, resolver }
    }

    async fn ensure_user(&self, id: UserId) -> Result<(), ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(id, ReadScope::Live)
            .await?
            .map(|_| ())
            .ok_or_else(|| ApplicationError::not_found("user", id))
    }

    /// 推送失败只记录日志，不影响已写入的消息。
    async fn fan_out(&self, message: &Message) {
        let mut targets = vec![message.receiver_id];
        if self.deps.echo_to_sender {
            targets.push(message.sender_id);
        }
        for user_id in targets {
            let event = RealtimeEvent::NewMessage(message.clone());
            match self.deps.broadcaster.emit(user_id, event).await {
                Ok(0) => debug!(user_id = %user_id, message_id = %message.id, "用户不在线，跳过推送"),
                Ok(delivered) => {
                    debug!(user_id = %user_id, message_id = %message.id, delivered, "消息已推送")
                }
                Err(err) => {
                    warn!(user_id = %user_id, message_id = %message.id, error = %err, "消息推送失败")
                }
            }
        }
    }

    pub async fn send_message(
        &self,
        sender_id: UserId,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        PairKey::new(sender_id, request.receiver_id)?;
        let content = MessageContent::new(request.message, request.image_url, request.location)?;
        self.ensure_user(sender_id).await?;
        self.ensure_user(request.receiver_id).await?;

        let conversation = self
            .resolver
            .find_or_create(sender_id, request.receiver_id)
            .await?;
        let message = Message::compose(
            MessageId::generate(),
            &conversation,
            sender_id,
            request.receiver_id,
            content,
            self.deps.clock.now(),
        )?;
        let stored = self.deps.message_repository.append(message).await?;
        info!(
            conversation_id = %stored.conversation_id,
            message_id = %stored.id,
            sender_id = %sender_id,
            "消息已保存"
        );

        self.fan_out(&stored).await;
        Ok(stored)
    }

    /// 与另一用户的全部历史消息，没有会话时为空。
    pub async fn get_messages(
        &self,
        user_id: UserId,
        other_id: UserId,
    ) -> Result<Vec<Message>, ApplicationError> {
        self.ensure_user(other_id).await?;
        let key = PairKey::new(user_id, other_id)?;
        match self.deps.conversation_repository.find_by_pair(&key).await? {
            Some(conversation) => Ok(self
                .deps
                .message_repository
                .list_by_conversation(conversation.id)
                .await?),
            None => Ok(Vec::new()),
        }
    }

    /// 用户的会话列表，按最后活动时间倒序。
    pub async fn list_conversations(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ConversationSummary>, ApplicationError> {
        let conversations = self
            .deps
            .conversation_repository
            .list_for_user(user_id)
            .await?;
        if conversations.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ConversationId> = conversations.iter().map(|c| c.id).collect();
        let mut latest: HashMap<ConversationId, Message> = self
            .deps
            .message_repository
            .latest_for_conversations(&ids)
            .await?
            .into_iter()
            .map(|m| (m.conversation_id, m))
            .collect();

        let others: Vec<UserId> = conversations
            .iter()
            .filter_map(|c| c.other_participant(user_id))
            .collect();
        let snapshots: HashMap<UserId, _> = self
            .deps
            .user_repository
            .find_by_ids(&others)
            .await?
            .into_iter()
            .map(|u| (u.id, u.snapshot()))
            .collect();

        let mut summaries: Vec<ConversationSummary> = conversations
            .into_iter()
            .map(|conversation| ConversationSummary {
                other_participant: conversation
                    .other_participant(user_id)
                    .and_then(|id| snapshots.get(&id).cloned()),
                last_message: latest.remove(&conversation.id),
                id: conversation.id,
                participants: conversation.participants,
                created_at: conversation.created_at,
                updated_at: conversation.updated_at,
            })
            .collect();
        summaries.sort_by_key(|s| std::cmp::Reverse(s.last_activity()));
        Ok(summaries)
    }

    pub async fn find_or_create_conversation(
        &self,
        user_id: UserId,
        receiver_id: UserId,
    ) -> Result<Conversation, ApplicationError> {
        PairKey::new(user_id, receiver_id)?;
        self.ensure_user(user_id).await?;
        self.ensure_user(receiver_id).await?;
        self.resolver.find_or_create(user_id, receiver_id).await
    }

    /// 软删除会话并级联到其消息；只有参与者可以删除。
    pub async fn delete_conversation(
        &self,
        user_id: UserId,
        conversation_id: ConversationId,
    ) -> Result<(), ApplicationError> {
        let conversation = self
            .deps
            .conversation_repository
            .find_by_id(conversation_id, ReadScope::Live)
            .await?
            .ok_or_else(|| ApplicationError::not_found("conversation", conversation_id))?;
        if !conversation.has_participant(user_id) {
            return Err(ApplicationError::forbidden(
                "only participants can delete a conversation",
            ));
        }
        self.deps
            .conversation_repository
            .soft_delete(conversation_id)
            .await?;
        info!(conversation_id = %conversation_id, user_id = %user_id, "会话已删除");
        Ok(())
    }
}
