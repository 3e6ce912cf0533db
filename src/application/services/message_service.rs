//! Message Service
//!
//! Sending, listing, editing and deleting messages, plus read receipts.
//! Every operation requires membership in the conversation and, for direct
//! conversations, that the two users are still friends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::application::dto::request::MessageBody;
use crate::application::dto::response::{MessageDto, ReadReceiptDto};
use crate::application::events::{
    destinations, emit_read_receipt, emit_topic, RealtimeBroker, RealtimeEvent,
};
use crate::application::services::membership::{require_messaging_access, MembershipError};
use crate::domain::{
    AccessPolicy, Conversation, ConversationMember, ConversationRepository, FriendshipRepository,
    Message, MessageAttachment, MessageRead, MessageRepository, MessageType, MAX_MESSAGE_LENGTH,
};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest, SortDirection};
use crate::shared::validation::normalize_query;

/// Default page size for message history
pub const DEFAULT_MESSAGE_PAGE_SIZE: i64 = 50;

#[async_trait]
pub trait MessageService: Send + Sync {
    async fn send(
        &self,
        sender_id: Uuid,
        conversation_id: Uuid,
        body: MessageBody,
    ) -> Result<MessageDto, MessageError>;

    async fn list(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        page: PageRequest,
        direction: SortDirection,
    ) -> Result<Page<MessageDto>, MessageError>;

    /// Messages created after `after`, oldest first
    async fn list_after(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<Vec<MessageDto>, MessageError>;

    async fn get(&self, user_id: Uuid, message_id: Uuid) -> Result<MessageDto, MessageError>;

    async fn edit(&self, user_id: Uuid, message_id: Uuid, content: String) -> Result<MessageDto, MessageError>;

    async fn delete(&self, user_id: Uuid, message_id: Uuid) -> Result<MessageDto, MessageError>;

    /// Idempotent; the receipt is broadcast only the first time
    async fn mark_read(&self, user_id: Uuid, message_id: Uuid) -> Result<ReadReceiptDto, MessageError>;

    /// Mark the latest message of the conversation as read
    async fn mark_conversation_read(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<ReadReceiptDto>, MessageError>;

    async fn unread_count(&self, user_id: Uuid, conversation_id: Uuid) -> Result<i64, MessageError>;

    async fn reads(&self, user_id: Uuid, message_id: Uuid) -> Result<Vec<ReadReceiptDto>, MessageError>;

    async fn search(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        query: Option<String>,
    ) -> Result<Vec<MessageDto>, MessageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Message not found")]
    NotFound,

    #[error("Message type {0} cannot be sent by users")]
    InvalidType(MessageType),

    #[error("Message content cannot be empty")]
    EmptyContent,

    #[error("Message content exceeds 4000 characters")]
    ContentTooLong,

    #[error("Media messages need at least one attachment")]
    AttachmentsRequired,

    #[error("Reply target must be a message of the same conversation")]
    InvalidReply,

    #[error("Only the sender can edit this message")]
    NotSender,

    #[error("You cannot delete this message")]
    DeleteForbidden,

    #[error("Message has been deleted")]
    Deleted,

    #[error("A search query is required")]
    QueryRequired,

    #[error(transparent)]
    Access(#[from] MembershipError),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<MessageError> for AppError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::NotFound => AppError::NotFound(err.to_string()),
            MessageError::InvalidType(_)
            | MessageError::EmptyContent
            | MessageError::ContentTooLong
            | MessageError::AttachmentsRequired
            | MessageError::InvalidReply
            | MessageError::QueryRequired => AppError::BadRequest(err.to_string()),
            MessageError::NotSender | MessageError::DeleteForbidden => {
                AppError::Forbidden(err.to_string())
            }
            MessageError::Deleted => AppError::Conflict(err.to_string()),
            MessageError::Access(e) => e.into(),
            MessageError::Store(e) => e,
        }
    }
}

/// Trim and bound-check text content
fn checked_content(content: Option<String>) -> Result<Option<String>, MessageError> {
    let Some(content) = content else {
        return Ok(None);
    };
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(MessageError::ContentTooLong);
    }
    Ok(Some(trimmed.to_string()))
}

pub struct MessageServiceImpl<M, C, F>
where
    M: MessageRepository,
    C: ConversationRepository,
    F: FriendshipRepository,
{
    message_repo: Arc<M>,
    conversation_repo: Arc<C>,
    friendship_repo: Arc<F>,
    broker: Arc<dyn RealtimeBroker>,
}

impl<M, C, F> MessageServiceImpl<M, C, F>
where
    M: MessageRepository,
    C: ConversationRepository,
    F: FriendshipRepository,
{
    pub fn new(
        message_repo: Arc<M>,
        conversation_repo: Arc<C>,
        friendship_repo: Arc<F>,
        broker: Arc<dyn RealtimeBroker>,
    ) -> Self {
        Self {
            message_repo,
            conversation_repo,
            friendship_repo,
            broker,
        }
    }

    async fn access(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<(Conversation, ConversationMember), MessageError> {
        Ok(require_messaging_access(
            self.conversation_repo.as_ref(),
            self.friendship_repo.as_ref(),
            conversation_id,
            user_id,
        )
        .await?)
    }

    /// Load a message and check the caller may see its conversation
    async fn load(
        &self,
        user_id: Uuid,
        message_id: Uuid,
    ) -> Result<(Message, ConversationMember), MessageError> {
        let message = self
            .message_repo
            .find_by_id(message_id)
            .await?
            .ok_or(MessageError::NotFound)?;
        let (_, member) = self.access(message.conversation_id, user_id).await?;
        Ok((message, member))
    }

    /// Attach stored attachments to each message
    async fn to_dtos(&self, messages: Vec<Message>) -> Result<Vec<MessageDto>, MessageError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let mut by_message: HashMap<Uuid, Vec<MessageAttachment>> = HashMap::new();
        for attachment in self.message_repo.attachments_for(&ids).await? {
            by_message
                .entry(attachment.message_id)
                .or_default()
                .push(attachment);
        }
        Ok(messages
            .into_iter()
            .map(|m| {
                let attachments = by_message.remove(&m.id).unwrap_or_default();
                MessageDto::new(m, attachments)
            })
            .collect())
    }

    async fn to_dto(&self, message: Message) -> Result<MessageDto, MessageError> {
        let attachments = self.message_repo.attachments_for(&[message.id]).await?;
        Ok(MessageDto::new(message, attachments))
    }

    async fn record_read(&self, user_id: Uuid, message: &Message) -> Result<ReadReceiptDto, MessageError> {
        let now = Utc::now();
        let first_time = self.message_repo.mark_read(message, user_id, now).await?;

        let read = if first_time {
            MessageRead {
                message_id: message.id,
                user_id,
                read_at: now,
            }
        } else {
            self.message_repo
                .reads(message.id)
                .await?
                .into_iter()
                .find(|r| r.user_id == user_id)
                .unwrap_or(MessageRead {
                    message_id: message.id,
                    user_id,
                    read_at: now,
                })
        };

        let receipt = ReadReceiptDto::new(message.conversation_id, read);
        if first_time {
            emit_read_receipt(self.broker.as_ref(), &receipt);
        }
        Ok(receipt)
    }
}

#[async_trait]
impl<M, C, F> MessageService for MessageServiceImpl<M, C, F>
where
    M: MessageRepository + 'static,
    C: ConversationRepository + 'static,
    F: FriendshipRepository + 'static,
{
    async fn send(
        &self,
        sender_id: Uuid,
        conversation_id: Uuid,
        body: MessageBody,
    ) -> Result<MessageDto, MessageError> {
        self.access(conversation_id, sender_id).await?;

        if !body.message_type.is_user_sendable() {
            return Err(MessageError::InvalidType(body.message_type));
        }
        let content = checked_content(body.content)?;
        match body.message_type {
            MessageType::Text if content.is_none() => return Err(MessageError::EmptyContent),
            MessageType::Image | MessageType::File if body.attachments.is_empty() => {
                return Err(MessageError::AttachmentsRequired)
            }
            _ => {}
        }

        if let Some(reply_to_id) = body.reply_to_id {
            let target = self.message_repo.find_by_id(reply_to_id).await?;
            if !target.is_some_and(|t| t.conversation_id == conversation_id) {
                return Err(MessageError::InvalidReply);
            }
        }

        let mut message = Message::new(conversation_id, sender_id, body.message_type);
        message.content = content;
        message.metadata = body.metadata;
        message.reply_to_id = body.reply_to_id;

        let attachments: Vec<MessageAttachment> = body
            .attachments
            .into_iter()
            .map(|a| MessageAttachment {
                id: Uuid::now_v7(),
                message_id: message.id,
                url: a.url,
                mime_type: a.mime_type,
                bytes: a.bytes,
                width: a.width,
                height: a.height,
                duration_ms: a.duration_ms,
                sha256: a.sha256.map(|h| h.to_lowercase()),
            })
            .collect();

        let created = self.message_repo.create(&message, &attachments).await?;
        let dto = MessageDto::new(created, attachments);

        emit_topic(
            self.broker.as_ref(),
            &destinations::conversation(conversation_id),
            &RealtimeEvent::MessageCreated(dto.clone()),
        );
        tracing::debug!(message_id = %dto.id, conversation_id = %conversation_id, "Message sent");
        Ok(dto)
    }

    async fn list(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        page: PageRequest,
        direction: SortDirection,
    ) -> Result<Page<MessageDto>, MessageError> {
        self.access(conversation_id, user_id).await?;
        let (messages, total) = self
            .message_repo
            .list_by_conversation(conversation_id, page, direction)
            .await?;
        let content = self.to_dtos(messages).await?;
        Ok(Page::new(content, page, total))
    }

    async fn list_after(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<Vec<MessageDto>, MessageError> {
        self.access(conversation_id, user_id).await?;
        let messages = self.message_repo.list_after(conversation_id, after).await?;
        self.to_dtos(messages).await
    }

    async fn get(&self, user_id: Uuid, message_id: Uuid) -> Result<MessageDto, MessageError> {
        let (message, _) = self.load(user_id, message_id).await?;
        self.to_dto(message).await
    }

    async fn edit(&self, user_id: Uuid, message_id: Uuid, content: String) -> Result<MessageDto, MessageError> {
        let (message, _) = self.load(user_id, message_id).await?;
        if message.sender_id != user_id {
            return Err(MessageError::NotSender);
        }
        if message.is_deleted() {
            return Err(MessageError::Deleted);
        }
        let content = checked_content(Some(content))?.ok_or(MessageError::EmptyContent)?;

        let updated = self
            .message_repo
            .update_content(message_id, &content, Utc::now())
            .await?;
        let dto = self.to_dto(updated).await?;

        emit_topic(
            self.broker.as_ref(),
            &destinations::conversation(dto.conversation_id),
            &RealtimeEvent::MessageUpdated(dto.clone()),
        );
        Ok(dto)
    }

    async fn delete(&self, user_id: Uuid, message_id: Uuid) -> Result<MessageDto, MessageError> {
        let (message, member) = self.load(user_id, message_id).await?;
        if !AccessPolicy::can_delete_message(user_id, message.sender_id, Some(member.role)) {
            return Err(MessageError::DeleteForbidden);
        }
        if message.is_deleted() {
            return Ok(MessageDto::from(message));
        }

        let deleted = self.message_repo.soft_delete(message_id, Utc::now()).await?;
        let dto = MessageDto::from(deleted);

        emit_topic(
            self.broker.as_ref(),
            &destinations::conversation(dto.conversation_id),
            &RealtimeEvent::MessageDeleted(dto.clone()),
        );
        tracing::debug!(message_id = %message_id, deleted_by = %user_id, "Message deleted");
        Ok(dto)
    }

    async fn mark_read(&self, user_id: Uuid, message_id: Uuid) -> Result<ReadReceiptDto, MessageError> {
        let (message, _) = self.load(user_id, message_id).await?;
        self.record_read(user_id, &message).await
    }

    async fn mark_conversation_read(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<ReadReceiptDto>, MessageError> {
        self.access(conversation_id, user_id).await?;
        match self.message_repo.latest_in_conversation(conversation_id).await? {
            Some(latest) => Ok(Some(self.record_read(user_id, &latest).await?)),
            None => Ok(None),
        }
    }

    async fn unread_count(&self, user_id: Uuid, conversation_id: Uuid) -> Result<i64, MessageError> {
        self.access(conversation_id, user_id).await?;
        Ok(self.message_repo.unread_count(conversation_id, user_id).await?)
    }

    async fn reads(&self, user_id: Uuid, message_id: Uuid) -> Result<Vec<ReadReceiptDto>, MessageError> {
        let (message, _) = self.load(user_id, message_id).await?;
        Ok(self
            .message_repo
            .reads(message_id)
            .await?
            .into_iter()
            .map(|r| ReadReceiptDto::new(message.conversation_id, r))
            .collect())
    }

    async fn search(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        query: Option<String>,
    ) -> Result<Vec<MessageDto>, MessageError> {
        let query = normalize_query(query.as_deref()).ok_or(MessageError::QueryRequired)?;
        self.access(conversation_id, user_id).await?;
        let messages = self.message_repo.search(conversation_id, query).await?;
        self.to_dtos(messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dto::request::AttachmentRequest;
    use crate::application::events::MockRealtimeBroker;
    use crate::domain::{
        ConversationType, MemberRole, MockConversationRepository, MockFriendshipRepository,
        MockMessageRepository,
    };
    use pretty_assertions::assert_eq;

    type Service = MessageServiceImpl<MockMessageRepository, MockConversationRepository, MockFriendshipRepository>;

    fn group_member(role: MemberRole) -> (MockConversationRepository, Uuid) {
        let conversation = Conversation::new(ConversationType::Group, Uuid::now_v7(), Some("g".into()), None);
        let conversation_id = conversation.id;
        let mut repo = MockConversationRepository::new();
        repo.expect_find_by_id()
            .returning(move |_| Ok(Some(conversation.clone())));
        repo.expect_find_member()
            .returning(move |conv, user| Ok(Some(ConversationMember::new(conv, user, role))));
        (repo, conversation_id)
    }

    fn service(messages: MockMessageRepository, conversations: MockConversationRepository, broker: MockRealtimeBroker) -> Service {
        MessageServiceImpl::new(
            Arc::new(messages),
            Arc::new(conversations),
            Arc::new(MockFriendshipRepository::new()),
            Arc::new(broker),
        )
    }

    fn text(content: &str) -> MessageBody {
        MessageBody {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    // ==========================================================================
    // Send Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_send_broadcasts_on_conversation_topic() {
        let (conversations, conversation_id) = group_member(MemberRole::Member);
        let mut messages = MockMessageRepository::new();
        messages
            .expect_create()
            .withf(|m, attachments| m.content.as_deref() == Some("hello") && attachments.is_empty())
            .returning(|m, _| Ok(m.clone()));

        let mut broker = MockRealtimeBroker::new();
        let topic = destinations::conversation(conversation_id);
        broker
            .expect_publish_to_topic()
            .withf(move |dest, payload| dest == topic && payload["event"] == "message_created")
            .times(1)
            .return_const(());

        let svc = service(messages, conversations, broker);
        let dto = svc.send(Uuid::now_v7(), conversation_id, text("  hello ")).await.unwrap();
        assert_eq!(dto.content.as_deref(), Some("hello"));
        assert_eq!(dto.message_type, MessageType::Text);
    }

    #[tokio::test]
    async fn test_send_rejects_empty_text_and_system_type() {
        let (conversations, conversation_id) = group_member(MemberRole::Member);
        let svc = service(MockMessageRepository::new(), conversations, MockRealtimeBroker::new());
        let sender = Uuid::now_v7();

        let empty = svc.send(sender, conversation_id, text("   ")).await;
        assert!(matches!(empty, Err(MessageError::EmptyContent)));

        let system = MessageBody {
            message_type: MessageType::System,
            ..text("hi")
        };
        let result = svc.send(sender, conversation_id, system).await;
        assert!(matches!(result, Err(MessageError::InvalidType(MessageType::System))));
    }

    #[tokio::test]
    async fn test_send_image_requires_attachment() {
        let (conversations, conversation_id) = group_member(MemberRole::Member);
        let svc = service(MockMessageRepository::new(), conversations, MockRealtimeBroker::new());
        let body = MessageBody {
            message_type: MessageType::Image,
            ..Default::default()
        };
        let result = svc.send(Uuid::now_v7(), conversation_id, body).await;
        assert!(matches!(result, Err(MessageError::AttachmentsRequired)));
    }

    #[tokio::test]
    async fn test_send_stores_attachments_with_message() {
        let (conversations, conversation_id) = group_member(MemberRole::Member);
        let mut messages = MockMessageRepository::new();
        messages
            .expect_create()
            .withf(|m, attachments| attachments.len() == 1 && attachments[0].message_id == m.id)
            .returning(|m, _| Ok(m.clone()));
        let mut broker = MockRealtimeBroker::new();
        broker.expect_publish_to_topic().return_const(());

        let body = MessageBody {
            message_type: MessageType::Image,
            attachments: vec![AttachmentRequest {
                url: "https://cdn.example.com/cat.png".into(),
                mime_type: Some("image/png".into()),
                bytes: Some(2048),
                width: Some(64),
                height: Some(64),
                duration_ms: None,
                sha256: None,
            }],
            ..Default::default()
        };
        let dto = service(messages, conversations, broker)
            .send(Uuid::now_v7(), conversation_id, body)
            .await
            .unwrap();
        assert_eq!(dto.attachments.len(), 1);
    }

    #[tokio::test]
    async fn test_reply_must_target_same_conversation() {
        let (conversations, conversation_id) = group_member(MemberRole::Member);
        let mut messages = MockMessageRepository::new();
        messages.expect_find_by_id().returning(|id| {
            let mut other = Message::new(Uuid::now_v7(), Uuid::now_v7(), MessageType::Text);
            other.id = id;
            Ok(Some(other))
        });

        let svc = service(messages, conversations, MockRealtimeBroker::new());
        let body = MessageBody {
            reply_to_id: Some(Uuid::now_v7()),
            ..text("re")
        };
        let result = svc.send(Uuid::now_v7(), conversation_id, body).await;
        assert!(matches!(result, Err(MessageError::InvalidReply)));
    }

    // ==========================================================================
    // Edit / Delete Tests
    // ==========================================================================

    fn stored_message(conversation_id: Uuid, sender_id: Uuid) -> Message {
        let mut message = Message::new(conversation_id, sender_id, MessageType::Text);
        message.content = Some("original".into());
        message
    }

    #[tokio::test]
    async fn test_only_sender_edits() {
        let (conversations, conversation_id) = group_member(MemberRole::Admin);
        let message = stored_message(conversation_id, Uuid::now_v7());
        let message_id = message.id;
        let mut messages = MockMessageRepository::new();
        messages
            .expect_find_by_id()
            .returning(move |_| Ok(Some(message.clone())));

        let svc = service(messages, conversations, MockRealtimeBroker::new());
        let result = svc.edit(Uuid::now_v7(), message_id, "changed".into()).await;
        assert!(matches!(result, Err(MessageError::NotSender)));
    }

    #[tokio::test]
    async fn test_plain_member_cannot_delete_others_message() {
        let (conversations, conversation_id) = group_member(MemberRole::Member);
        let message = stored_message(conversation_id, Uuid::now_v7());
        let message_id = message.id;
        let mut messages = MockMessageRepository::new();
        messages
            .expect_find_by_id()
            .returning(move |_| Ok(Some(message.clone())));
        messages.expect_soft_delete().never();

        let svc = service(messages, conversations, MockRealtimeBroker::new());
        let result = svc.delete(Uuid::now_v7(), message_id).await;
        assert!(matches!(result, Err(MessageError::DeleteForbidden)));
    }

    #[tokio::test]
    async fn test_admin_deletes_any_message() {
        let (conversations, conversation_id) = group_member(MemberRole::Admin);
        let message = stored_message(conversation_id, Uuid::now_v7());
        let message_id = message.id;
        let mut messages = MockMessageRepository::new();
        let found = message.clone();
        messages
            .expect_find_by_id()
            .returning(move |_| Ok(Some(found.clone())));
        messages.expect_soft_delete().times(1).returning(move |_, at| {
            let mut deleted = message.clone();
            deleted.deleted_at = Some(at);
            Ok(deleted)
        });
        let mut broker = MockRealtimeBroker::new();
        broker.expect_publish_to_topic().times(1).return_const(());

        let dto = service(messages, conversations, broker)
            .delete(Uuid::now_v7(), message_id)
            .await
            .unwrap();
        assert!(dto.deleted);
        assert_eq!(dto.content, None);
    }

    // ==========================================================================
    // Read Receipt Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_mark_read_is_idempotent() {
        let (conversations, conversation_id) = group_member(MemberRole::Member);
        let reader = Uuid::now_v7();
        let message = stored_message(conversation_id, Uuid::now_v7());
        let message_id = message.id;

        let mut messages = MockMessageRepository::new();
        messages
            .expect_find_by_id()
            .returning(move |_| Ok(Some(message.clone())));
        let mut seen = false;
        messages.expect_mark_read().times(2).returning(move |_, _, _| {
            let first = !seen;
            seen = true;
            Ok(first)
        });
        let first_read = Utc::now();
        messages.expect_reads().returning(move |id| {
            Ok(vec![MessageRead {
                message_id: id,
                user_id: reader,
                read_at: first_read,
            }])
        });

        let mut broker = MockRealtimeBroker::new();
        broker
            .expect_publish_to_topic()
            .withf(|dest, _| dest.ends_with("/read"))
            .times(1)
            .return_const(());

        let svc = service(messages, conversations, broker);
        let first = svc.mark_read(reader, message_id).await.unwrap();
        let second = svc.mark_read(reader, message_id).await.unwrap();
        assert_eq!(first.message_id, second.message_id);
        assert_eq!(second.read_at, first_read);
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let svc = service(
            MockMessageRepository::new(),
            MockConversationRepository::new(),
            MockRealtimeBroker::new(),
        );
        let result = svc.search(Uuid::now_v7(), Uuid::now_v7(), Some(" ".into())).await;
        assert!(matches!(result, Err(MessageError::QueryRequired)));
    }
}
