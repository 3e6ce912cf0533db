//! Conversation membership checks shared by the conversation, message and
//! call services.

use uuid::Uuid;

use crate::domain::{
    Conversation, ConversationMember, ConversationRepository, FriendshipRepository,
};
use crate::shared::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Conversation not found")]
    ConversationNotFound,

    #[error("You are not a member of this conversation")]
    NotMember,

    #[error("Direct messages are only allowed between friends")]
    NotFriends,

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<MembershipError> for AppError {
    fn from(err: MembershipError) -> Self {
        match err {
            MembershipError::ConversationNotFound => AppError::NotFound(err.to_string()),
            MembershipError::NotMember | MembershipError::NotFriends => {
                AppError::Forbidden(err.to_string())
            }
            MembershipError::Store(e) => e,
        }
    }
}

/// Load a conversation and the caller's membership row.
pub async fn require_member<C>(
    conversations: &C,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<(Conversation, ConversationMember), MembershipError>
where
    C: ConversationRepository + ?Sized,
{
    let conversation = conversations
        .find_by_id(conversation_id)
        .await?
        .ok_or(MembershipError::ConversationNotFound)?;
    let member = conversations
        .find_member(conversation_id, user_id)
        .await?
        .ok_or(MembershipError::NotMember)?;
    Ok((conversation, member))
}

/// Membership plus, for direct conversations, a live friendship between
/// the two participants.
pub async fn require_messaging_access<C, F>(
    conversations: &C,
    friendships: &F,
    conversation_id: Uuid,
    user_id: Uuid,
) -> Result<(Conversation, ConversationMember), MembershipError>
where
    C: ConversationRepository + ?Sized,
    F: FriendshipRepository + ?Sized,
{
    let (conversation, member) = require_member(conversations, conversation_id, user_id).await?;
    if conversation.is_direct() {
        let pair = conversations
            .find_direct_pair(conversation_id)
            .await?
            .ok_or(MembershipError::ConversationNotFound)?;
        let other = pair.other(user_id).ok_or(MembershipError::NotMember)?;
        if !friendships.are_friends(user_id, other).await? {
            return Err(MembershipError::NotFriends);
        }
    }
    Ok((conversation, member))
}
