use std::sync::Arc;

use domain::{Conversation, ConversationId, PairKey, UserId};
use tracing::{debug, info};

use crate::{clock::Clock, error::ApplicationError, repository::ConversationRepository};

const MAX_ATTEMPTS: usize = 3;

/// 为一对参与者查找或创建唯一会话。
///
/// 唯一性由存储层的规范键约束保证：插入冲突说明另一个请求已创建会话，
/// 此时重新读取即可，不会产生第二条记录。
pub struct ConversationResolver {
    conversations: Arc<dyn ConversationRepository>,
    clock: Arc<dyn Clock>,
}

impl ConversationResolver {
    pub fn new(conversations: Arc<dyn ConversationRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            conversations,
            clock,
        }
    }

    pub async fn find_or_create(
        &self,
        first: UserId,
        second: UserId,
    ) -> Result<Conversation, ApplicationError> {
        let key = PairKey::new(first, second)?;

        for attempt in 1..=MAX_ATTEMPTS {
            if let Some(existing) = self.conversations.find_by_pair(&key).await? {
                return Ok(existing);
            }

            let candidate =
                Conversation::open(ConversationId::generate(), first, second, self.clock.now())?;
            if let Some(created) = self.conversations.insert_if_absent(candidate).await? {
                info!(conversation_id = %created.id, pair_key = %key, "创建新会话");
                return Ok(created);
            }
            debug!(pair_key = %key, attempt, "会话创建冲突，重新读取");
        }

        Err(ApplicationError::infrastructure(format!(
            "conversation for {key} could not be resolved"
        )))
    }
}
