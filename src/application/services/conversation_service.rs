//! Conversation Service
//!
//! Direct and group conversations, their members and roles.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::application::dto::request::{CreateConversationRequest, UpdateConversationRequest};
use crate::application::dto::response::{ConversationDto, MemberDto, MessageDto};
use crate::application::events::{destinations, emit_topic, emit_user, RealtimeBroker, RealtimeEvent};
use crate::application::services::membership::{require_member, MembershipError};
use crate::domain::{
    AccessPolicy, Conversation, ConversationMember, ConversationRepository, ConversationType,
    FriendshipRepository, MemberRole, MessageRepository, PolicyViolation, UserRepository,
};
use crate::shared::error::AppError;
use crate::shared::validation::normalize_query;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn create(
        &self,
        creator_id: Uuid,
        request: CreateConversationRequest,
    ) -> Result<ConversationDto, ConversationError>;

    /// Existing direct conversation with `other_id`, or a new one
    async fn get_or_create_direct(&self, user_id: Uuid, other_id: Uuid) -> Result<ConversationDto, ConversationError>;

    /// Conversations of the user, most recently updated first
    async fn list(&self, user_id: Uuid) -> Result<Vec<ConversationDto>, ConversationError>;

    async fn get(&self, user_id: Uuid, conversation_id: Uuid) -> Result<ConversationDto, ConversationError>;

    async fn update(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        request: UpdateConversationRequest,
    ) -> Result<ConversationDto, ConversationError>;

    async fn add_member(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<ConversationDto, ConversationError>;

    async fn remove_member(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        member_id: Uuid,
    ) -> Result<(), ConversationError>;

    async fn update_member_role(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        member_id: Uuid,
        role: MemberRole,
    ) -> Result<ConversationDto, ConversationError>;

    /// Leave; ownership passes on, the last member deletes the conversation
    async fn leave(&self, user_id: Uuid, conversation_id: Uuid) -> Result<(), ConversationError>;

    async fn delete(&self, user_id: Uuid, conversation_id: Uuid) -> Result<(), ConversationError>;

    async fn search(&self, user_id: Uuid, query: Option<String>) -> Result<Vec<ConversationDto>, ConversationError>;

    async fn is_member(&self, user_id: Uuid, conversation_id: Uuid) -> Result<bool, ConversationError>;

    async fn is_admin(&self, user_id: Uuid, conversation_id: Uuid) -> Result<bool, ConversationError>;

    /// Ids of every conversation the user belongs to
    async fn conversation_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, ConversationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("User not found")]
    UserNotFound,

    #[error("Member not found")]
    MemberNotFound,

    #[error("A direct conversation needs exactly one other participant")]
    InvalidDirectMembers,

    #[error("Group conversations need a title")]
    TitleRequired,

    #[error("This operation is only available for group conversations")]
    NotGroup,

    #[error("User is already a member")]
    AlreadyMember,

    #[error("Use leave to remove yourself")]
    SelfRemoval,

    #[error(transparent)]
    Access(#[from] MembershipError),

    #[error(transparent)]
    Policy(#[from] PolicyViolation),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<ConversationError> for AppError {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::UserNotFound | ConversationError::MemberNotFound => {
                AppError::NotFound(err.to_string())
            }
            ConversationError::InvalidDirectMembers
            | ConversationError::TitleRequired
            | ConversationError::NotGroup
            | ConversationError::SelfRemoval => AppError::BadRequest(err.to_string()),
            ConversationError::AlreadyMember => AppError::Conflict(err.to_string()),
            ConversationError::Policy(_) => AppError::Forbidden(err.to_string()),
            ConversationError::Access(e) => e.into(),
            ConversationError::Store(e) => e,
        }
    }
}

pub struct ConversationServiceImpl<C, F, U, M>
where
    C: ConversationRepository,
    F: FriendshipRepository,
    U: UserRepository,
    M: MessageRepository,
{
    conversation_repo: Arc<C>,
    friendship_repo: Arc<F>,
    user_repo: Arc<U>,
    message_repo: Arc<M>,
    broker: Arc<dyn RealtimeBroker>,
}

impl<C, F, U, M> ConversationServiceImpl<C, F, U, M>
where
    C: ConversationRepository,
    F: FriendshipRepository,
    U: UserRepository,
    M: MessageRepository,
{
    pub fn new(
        conversation_repo: Arc<C>,
        friendship_repo: Arc<F>,
        user_repo: Arc<U>,
        message_repo: Arc<M>,
        broker: Arc<dyn RealtimeBroker>,
    ) -> Self {
        Self {
            conversation_repo,
            friendship_repo,
            user_repo,
            message_repo,
            broker,
        }
    }

    /// Members, last message and unread count as seen by `viewer_id`
    async fn assemble(
        &self,
        conversation: Conversation,
        viewer_id: Uuid,
    ) -> Result<ConversationDto, ConversationError> {
        let members = self
            .conversation_repo
            .list_members(conversation.id)
            .await?
            .into_iter()
            .map(|p| {
                let online = self.broker.is_online(p.user_id);
                MemberDto::from_profile(p, online)
            })
            .collect();

        let last_message = self
            .message_repo
            .latest_in_conversation(conversation.id)
            .await?;
        let last_message = match last_message {
            Some(message) => {
                let attachments = self.message_repo.attachments_for(&[message.id]).await?;
                Some(MessageDto::new(message, attachments))
            }
            None => None,
        };
        let unread_count = self
            .message_repo
            .unread_count(conversation.id, viewer_id)
            .await?;

        Ok(ConversationDto {
            last_message,
            unread_count,
            ..ConversationDto::new(conversation, members)
        })
    }

    /// Direct conversations stay hidden once the two users stop being friends
    async fn visible_to(&self, conversation: &Conversation, user_id: Uuid) -> Result<bool, ConversationError> {
        if !conversation.is_direct() {
            return Ok(true);
        }
        let Some(pair) = self.conversation_repo.find_direct_pair(conversation.id).await? else {
            return Ok(false);
        };
        match pair.other(user_id) {
            Some(other) => Ok(self.friendship_repo.are_friends(user_id, other).await?),
            None => Ok(false),
        }
    }

    async fn assemble_visible(
        &self,
        conversations: Vec<Conversation>,
        user_id: Uuid,
    ) -> Result<Vec<ConversationDto>, ConversationError> {
        let mut dtos = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            if self.visible_to(&conversation, user_id).await? {
                dtos.push(self.assemble(conversation, user_id).await?);
            }
        }
        Ok(dtos)
    }

    async fn create_direct(&self, user_id: Uuid, other_id: Uuid) -> Result<ConversationDto, ConversationError> {
        if user_id == other_id {
            return Err(ConversationError::InvalidDirectMembers);
        }
        self.user_repo
            .find_by_id(other_id)
            .await?
            .ok_or(ConversationError::UserNotFound)?;
        if !self.friendship_repo.are_friends(user_id, other_id).await? {
            return Err(MembershipError::NotFriends.into());
        }

        if let Some(existing) = self
            .conversation_repo
            .find_direct_between(user_id, other_id)
            .await?
        {
            return self.assemble(existing, user_id).await;
        }

        let conversation = Conversation::new(ConversationType::Direct, user_id, None, None);
        let members = [
            ConversationMember::new(conversation.id, user_id, MemberRole::Owner),
            ConversationMember::new(conversation.id, other_id, MemberRole::Member),
        ];

        let created = match self.conversation_repo.create(&conversation, &members).await {
            Ok(created) => created,
            // Lost a race against the other participant
            Err(AppError::Conflict(_)) => {
                let existing = self
                    .conversation_repo
                    .find_direct_between(user_id, other_id)
                    .await?
                    .ok_or_else(|| AppError::Internal("direct conversation vanished".into()))?;
                return self.assemble(existing, user_id).await;
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(conversation_id = %created.id, "Direct conversation created");
        self.announce_created(created, &[user_id, other_id], user_id).await
    }

    /// Send the new conversation to each member's queue
    async fn announce_created(
        &self,
        conversation: Conversation,
        member_ids: &[Uuid],
        creator_id: Uuid,
    ) -> Result<ConversationDto, ConversationError> {
        let dto = self.assemble(conversation, creator_id).await?;
        for member_id in member_ids {
            emit_user(
                self.broker.as_ref(),
                *member_id,
                destinations::QUEUE_CONVERSATIONS,
                &RealtimeEvent::ConversationCreated(dto.clone()),
            );
        }
        Ok(dto)
    }

    async fn require_role(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<(Conversation, ConversationMember), ConversationError> {
        Ok(require_member(self.conversation_repo.as_ref(), conversation_id, user_id).await?)
    }
}

#[async_trait]
impl<C, F, U, M> ConversationService for ConversationServiceImpl<C, F, U, M>
where
    C: ConversationRepository + 'static,
    F: FriendshipRepository + 'static,
    U: UserRepository + 'static,
    M: MessageRepository + 'static,
{
    async fn create(
        &self,
        creator_id: Uuid,
        request: CreateConversationRequest,
    ) -> Result<ConversationDto, ConversationError> {
        let mut others: Vec<Uuid> = request
            .member_ids
            .into_iter()
            .filter(|id| *id != creator_id)
            .collect();
        others.sort_unstable();
        others.dedup();

        match request.conversation_type {
            ConversationType::Direct => {
                let &[other] = others.as_slice() else {
                    return Err(ConversationError::InvalidDirectMembers);
                };
                self.create_direct(creator_id, other).await
            }
            ConversationType::Group => {
                let title = request
                    .title
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .ok_or(ConversationError::TitleRequired)?;

                let found = self.user_repo.find_by_ids(&others).await?;
                if found.len() != others.len() {
                    return Err(ConversationError::UserNotFound);
                }

                let conversation =
                    Conversation::new(ConversationType::Group, creator_id, Some(title), request.avatar_url);
                let mut members = vec![ConversationMember::new(conversation.id, creator_id, MemberRole::Owner)];
                members.extend(
                    others
                        .iter()
                        .map(|id| ConversationMember::new(conversation.id, *id, MemberRole::Member)),
                );

                let created = self.conversation_repo.create(&conversation, &members).await?;
                tracing::info!(conversation_id = %created.id, members = members.len(), "Group conversation created");

                let everyone: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
                self.announce_created(created, &everyone, creator_id).await
            }
        }
    }

    async fn get_or_create_direct(&self, user_id: Uuid, other_id: Uuid) -> Result<ConversationDto, ConversationError> {
        self.create_direct(user_id, other_id).await
    }

    async fn list(&self, user_id: Uuid) -> Result<Vec<ConversationDto>, ConversationError> {
        let conversations = self.conversation_repo.find_for_user(user_id).await?;
        self.assemble_visible(conversations, user_id).await
    }

    async fn get(&self, user_id: Uuid, conversation_id: Uuid) -> Result<ConversationDto, ConversationError> {
        let (conversation, _) = self.require_role(conversation_id, user_id).await?;
        self.assemble(conversation, user_id).await
    }

    async fn update(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        request: UpdateConversationRequest,
    ) -> Result<ConversationDto, ConversationError> {
        let (mut conversation, member) = self.require_role(conversation_id, user_id).await?;
        AccessPolicy::ensure_admin(member.role)?;

        if let Some(title) = request.title {
            let title = title.trim().to_string();
            if title.is_empty() && !conversation.is_direct() {
                return Err(ConversationError::TitleRequired);
            }
            conversation.title = (!title.is_empty()).then_some(title);
        }
        if let Some(avatar_url) = request.avatar_url {
            conversation.avatar_url = (!avatar_url.trim().is_empty()).then_some(avatar_url);
        }
        conversation.updated_at = Utc::now();

        let updated = self.conversation_repo.update(&conversation).await?;
        let dto = self.assemble(updated, user_id).await?;
        emit_topic(
            self.broker.as_ref(),
            &destinations::conversation(conversation_id),
            &RealtimeEvent::ConversationUpdated(dto.clone()),
        );
        Ok(dto)
    }

    async fn add_member(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<ConversationDto, ConversationError> {
        let (conversation, actor) = self.require_role(conversation_id, actor_id).await?;
        AccessPolicy::ensure_admin(actor.role)?;
        if conversation.is_direct() {
            return Err(ConversationError::NotGroup);
        }
        self.user_repo
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(ConversationError::UserNotFound)?;
        if self
            .conversation_repo
            .find_member(conversation_id, user_id)
            .await?
            .is_some()
        {
            return Err(ConversationError::AlreadyMember);
        }

        self.conversation_repo
            .add_member(&ConversationMember::new(conversation_id, user_id, MemberRole::Member))
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => ConversationError::AlreadyMember,
                other => ConversationError::Store(other),
            })?;

        emit_topic(
            self.broker.as_ref(),
            &destinations::conversation(conversation_id),
            &RealtimeEvent::MemberAdded { conversation_id, user_id },
        );

        let for_new_member = self.assemble(conversation.clone(), user_id).await?;
        emit_user(
            self.broker.as_ref(),
            user_id,
            destinations::QUEUE_CONVERSATIONS,
            &RealtimeEvent::ConversationCreated(for_new_member),
        );

        self.assemble(conversation, actor_id).await
    }

    async fn remove_member(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        member_id: Uuid,
    ) -> Result<(), ConversationError> {
        if actor_id == member_id {
            return Err(ConversationError::SelfRemoval);
        }
        let (conversation, actor) = self.require_role(conversation_id, actor_id).await?;
        if conversation.is_direct() {
            return Err(ConversationError::NotGroup);
        }
        let target = self
            .conversation_repo
            .find_member(conversation_id, member_id)
            .await?
            .ok_or(ConversationError::MemberNotFound)?;
        AccessPolicy::ensure_can_remove(actor.role, target.role)?;

        if !self
            .conversation_repo
            .remove_member(conversation_id, member_id)
            .await?
        {
            return Err(ConversationError::MemberNotFound);
        }

        let event = RealtimeEvent::MemberRemoved {
            conversation_id,
            user_id: member_id,
        };
        emit_topic(self.broker.as_ref(), &destinations::conversation(conversation_id), &event);
        self.broker.revoke_conversation(member_id, conversation_id);
        emit_user(self.broker.as_ref(), member_id, destinations::QUEUE_CONVERSATIONS, &event);
        Ok(())
    }

    async fn update_member_role(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        member_id: Uuid,
        role: MemberRole,
    ) -> Result<ConversationDto, ConversationError> {
        let (conversation, actor) = self.require_role(conversation_id, actor_id).await?;
        if conversation.is_direct() {
            return Err(ConversationError::NotGroup);
        }
        let target = self
            .conversation_repo
            .find_member(conversation_id, member_id)
            .await?
            .ok_or(ConversationError::MemberNotFound)?;
        AccessPolicy::ensure_can_assign(actor.role, target.role, role)?;

        self.conversation_repo
            .update_member_role(conversation_id, member_id, role)
            .await?;

        emit_topic(
            self.broker.as_ref(),
            &destinations::conversation(conversation_id),
            &RealtimeEvent::MemberRoleChanged {
                conversation_id,
                user_id: member_id,
                role: role.to_string(),
            },
        );
        self.assemble(conversation, actor_id).await
    }

    async fn leave(&self, user_id: Uuid, conversation_id: Uuid) -> Result<(), ConversationError> {
        let (conversation, member) = self.require_role(conversation_id, user_id).await?;
        if conversation.is_direct() {
            return Err(ConversationError::NotGroup);
        }

        let members = self.conversation_repo.list_members(conversation_id).await?;
        if members.iter().all(|m| m.user_id == user_id) {
            self.conversation_repo.delete(conversation_id).await?;
            tracing::info!(conversation_id = %conversation_id, "Last member left, conversation deleted");
            self.broker.revoke_conversation(user_id, conversation_id);
            emit_user(
                self.broker.as_ref(),
                user_id,
                destinations::QUEUE_CONVERSATIONS,
                &RealtimeEvent::ConversationDeleted { conversation_id },
            );
            return Ok(());
        }

        let successor = (member.role == MemberRole::Owner)
            .then(|| AccessPolicy::choose_successor(&members, user_id))
            .flatten();
        self.conversation_repo
            .leave(conversation_id, user_id, successor)
            .await?;
        self.broker.revoke_conversation(user_id, conversation_id);

        emit_topic(
            self.broker.as_ref(),
            &destinations::conversation(conversation_id),
            &RealtimeEvent::MemberLeft {
                conversation_id,
                user_id,
                new_owner_id: successor,
            },
        );
        Ok(())
    }

    async fn delete(&self, user_id: Uuid, conversation_id: Uuid) -> Result<(), ConversationError> {
        let (_, member) = self.require_role(conversation_id, user_id).await?;
        AccessPolicy::ensure_owner(member.role)?;

        let members = self.conversation_repo.list_members(conversation_id).await?;
        self.conversation_repo.delete(conversation_id).await?;
        tracing::info!(conversation_id = %conversation_id, "Conversation deleted");

        let event = RealtimeEvent::ConversationDeleted { conversation_id };
        emit_topic(self.broker.as_ref(), &destinations::conversation(conversation_id), &event);
        for m in members {
            self.broker.revoke_conversation(m.user_id, conversation_id);
            emit_user(self.broker.as_ref(), m.user_id, destinations::QUEUE_CONVERSATIONS, &event);
        }
        Ok(())
    }

    async fn search(&self, user_id: Uuid, query: Option<String>) -> Result<Vec<ConversationDto>, ConversationError> {
        let conversations = match normalize_query(query.as_deref()) {
            Some(q) => self.conversation_repo.search_for_user(user_id, q).await?,
            None => self.conversation_repo.find_for_user(user_id).await?,
        };
        self.assemble_visible(conversations, user_id).await
    }

    async fn is_member(&self, user_id: Uuid, conversation_id: Uuid) -> Result<bool, ConversationError> {
        Ok(self
            .conversation_repo
            .find_member(conversation_id, user_id)
            .await?
            .is_some())
    }

    async fn is_admin(&self, user_id: Uuid, conversation_id: Uuid) -> Result<bool, ConversationError> {
        Ok(self
            .conversation_repo
            .find_member(conversation_id, user_id)
            .await?
            .is_some_and(|m| m.role.is_admin()))
    }

    async fn conversation_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>, ConversationError> {
        Ok(self.conversation_repo.conversation_ids_for_user(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::MockRealtimeBroker;
    use crate::domain::{
        MemberProfile, MockConversationRepository, MockFriendshipRepository, MockMessageRepository,
        MockUserRepository, User,
    };
    use mockall::predicate::*;
    use pretty_assertions::assert_eq;

    type Service = ConversationServiceImpl<
        MockConversationRepository,
        MockFriendshipRepository,
        MockUserRepository,
        MockMessageRepository,
    >;

    struct Mocks {
        conversations: MockConversationRepository,
        friendships: MockFriendshipRepository,
        users: MockUserRepository,
        messages: MockMessageRepository,
        broker: MockRealtimeBroker,
    }

    impl Mocks {
        fn new() -> Self {
            let mut messages = MockMessageRepository::new();
            messages.expect_latest_in_conversation().returning(|_| Ok(None));
            messages.expect_unread_count().returning(|_, _| Ok(0));
            let mut broker = MockRealtimeBroker::new();
            broker.expect_is_online().return_const(false);
            Self {
                conversations: MockConversationRepository::new(),
                friendships: MockFriendshipRepository::new(),
                users: MockUserRepository::new(),
                messages,
                broker,
            }
        }

        fn build(self) -> Service {
            ConversationServiceImpl::new(
                Arc::new(self.conversations),
                Arc::new(self.friendships),
                Arc::new(self.users),
                Arc::new(self.messages),
                Arc::new(self.broker),
            )
        }
    }

    fn profile(user_id: Uuid, role: MemberRole) -> MemberProfile {
        MemberProfile {
            user_id,
            username: "member".into(),
            display_name: None,
            avatar_url: None,
            last_seen_at: None,
            role,
            joined_at: Utc::now(),
            muted_until: None,
            last_read_message_id: None,
        }
    }

    fn group_with_role(mocks: &mut Mocks, role: MemberRole) -> Conversation {
        let conversation = Conversation::new(ConversationType::Group, Uuid::now_v7(), Some("Team".into()), None);
        let found = conversation.clone();
        mocks
            .conversations
            .expect_find_by_id()
            .returning(move |_| Ok(Some(found.clone())));
        mocks
            .conversations
            .expect_find_member()
            .returning(move |conv, user| Ok(Some(ConversationMember::new(conv, user, role))));
        conversation
    }

    // ==========================================================================
    // Direct Conversation Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_direct_between_non_friends_fails() {
        let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());
        let mut mocks = Mocks::new();
        mocks
            .users
            .expect_find_by_id()
            .returning(|id| Ok(Some(User { id, ..User::default() })));
        mocks.friendships.expect_are_friends().returning(|_, _| Ok(false));
        mocks.conversations.expect_create().never();

        let svc = mocks.build();
        let err = svc.get_or_create_direct(alice, bob).await.unwrap_err();
        assert!(matches!(err, ConversationError::Access(MembershipError::NotFriends)));
    }

    #[tokio::test]
    async fn test_direct_for_existing_pair_returns_existing() {
        let (alice, bob) = (Uuid::now_v7(), Uuid::now_v7());
        let existing = Conversation::new(ConversationType::Direct, bob, None, None);
        let existing_id = existing.id;

        let mut mocks = Mocks::new();
        mocks
            .users
            .expect_find_by_id()
            .returning(|id| Ok(Some(User { id, ..User::default() })));
        mocks.friendships.expect_are_friends().returning(|_, _| Ok(true));
        mocks
            .conversations
            .expect_find_direct_between()
            .returning(move |_, _| Ok(Some(existing.clone())));
        mocks.conversations.expect_create().never();
        mocks
            .conversations
            .expect_list_members()
            .returning(move |_| Ok(vec![profile(alice, MemberRole::Member), profile(bob, MemberRole::Owner)]));

        let request = CreateConversationRequest {
            conversation_type: ConversationType::Direct,
            title: None,
            avatar_url: None,
            member_ids: vec![bob, alice, bob],
        };
        let dto = mocks.build().create(alice, request).await.unwrap();
        assert_eq!(dto.id, existing_id);
        assert_eq!(dto.members.len(), 2);
    }

    #[tokio::test]
    async fn test_direct_needs_exactly_one_other() {
        let alice = Uuid::now_v7();
        let request = CreateConversationRequest {
            conversation_type: ConversationType::Direct,
            title: None,
            avatar_url: None,
            member_ids: vec![Uuid::now_v7(), Uuid::now_v7()],
        };
        let err = Mocks::new().build().create(alice, request).await.unwrap_err();
        assert!(matches!(err, ConversationError::InvalidDirectMembers));
    }

    // ==========================================================================
    // Group Conversation Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_group_requires_title() {
        let request = CreateConversationRequest {
            conversation_type: ConversationType::Group,
            title: Some("   ".into()),
            avatar_url: None,
            member_ids: vec![],
        };
        let err = Mocks::new().build().create(Uuid::now_v7(), request).await.unwrap_err();
        assert!(matches!(err, ConversationError::TitleRequired));
    }

    #[tokio::test]
    async fn test_group_creator_is_owner_and_members_notified() {
        let (alice, bob, carol) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let mut mocks = Mocks::new();
        mocks
            .users
            .expect_find_by_ids()
            .returning(|ids| Ok(ids.iter().map(|id| User { id: *id, ..User::default() }).collect()));
        mocks
            .conversations
            .expect_create()
            .withf(move |_, members| {
                members.len() == 3
                    && members[0].user_id == alice
                    && members[0].role == MemberRole::Owner
                    && members[1..].iter().all(|m| m.role == MemberRole::Member)
            })
            .returning(|conversation, _| Ok(conversation.clone()));
        mocks.conversations.expect_list_members().returning(|_| Ok(vec![]));
        mocks
            .broker
            .expect_publish_to_user()
            .withf(|_, queue, payload| {
                queue == destinations::QUEUE_CONVERSATIONS && payload["event"] == "conversation_created"
            })
            .times(3)
            .return_const(());

        let request = CreateConversationRequest {
            conversation_type: ConversationType::Group,
            title: Some("Project".into()),
            avatar_url: None,
            member_ids: vec![bob, carol],
        };
        let dto = mocks.build().create(alice, request).await.unwrap();
        assert_eq!(dto.title.as_deref(), Some("Project"));
        assert_eq!(dto.conversation_type, ConversationType::Group);
    }

    #[tokio::test]
    async fn test_group_with_unknown_member_fails() {
        let mut mocks = Mocks::new();
        mocks.users.expect_find_by_ids().returning(|_| Ok(vec![]));
        let request = CreateConversationRequest {
            conversation_type: ConversationType::Group,
            title: Some("Project".into()),
            avatar_url: None,
            member_ids: vec![Uuid::now_v7()],
        };
        let err = mocks.build().create(Uuid::now_v7(), request).await.unwrap_err();
        assert!(matches!(err, ConversationError::UserNotFound));
    }

    // ==========================================================================
    // Membership Tests
    // ==========================================================================

    #[tokio::test]
    async fn test_plain_member_cannot_add_members() {
        let mut mocks = Mocks::new();
        let conversation = group_with_role(&mut mocks, MemberRole::Member);

        let err = mocks
            .build()
            .add_member(Uuid::now_v7(), conversation.id, Uuid::now_v7())
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::Policy(PolicyViolation::NotAdmin)));
    }

    #[tokio::test]
    async fn test_owner_cannot_be_removed() {
        let mut mocks = Mocks::new();
        let conversation = group_with_role(&mut mocks, MemberRole::Owner);
        mocks.conversations.expect_remove_member().never();

        let err = mocks
            .build()
            .remove_member(Uuid::now_v7(), conversation.id, Uuid::now_v7())
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::Policy(PolicyViolation::OwnerProtected)));
    }

    #[tokio::test]
    async fn test_removed_member_loses_conversation_topics() {
        let target = Uuid::now_v7();
        let mut mocks = Mocks::new();
        let conversation = Conversation::new(ConversationType::Group, Uuid::now_v7(), Some("Team".into()), None);
        let conversation_id = conversation.id;
        mocks
            .conversations
            .expect_find_by_id()
            .returning(move |_| Ok(Some(conversation.clone())));
        mocks.conversations.expect_find_member().returning(move |conv, user| {
            let role = if user == target { MemberRole::Member } else { MemberRole::Admin };
            Ok(Some(ConversationMember::new(conv, user, role)))
        });
        mocks
            .conversations
            .expect_remove_member()
            .with(eq(conversation_id), eq(target))
            .times(1)
            .returning(|_, _| Ok(true));
        mocks.broker.expect_publish_to_topic().return_const(());
        mocks.broker.expect_publish_to_user().return_const(());
        mocks
            .broker
            .expect_revoke_conversation()
            .with(eq(target), eq(conversation_id))
            .times(1)
            .return_const(());

        mocks
            .build()
            .remove_member(Uuid::now_v7(), conversation_id, target)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_role_endpoint_cannot_assign_owner() {
        let mut mocks = Mocks::new();
        let conversation = group_with_role(&mut mocks, MemberRole::Admin);
        let err = mocks
            .build()
            .update_member_role(Uuid::now_v7(), conversation.id, Uuid::now_v7(), MemberRole::Owner)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConversationError::Policy(PolicyViolation::OwnerRoleNotAssignable)
        ));
    }

    #[tokio::test]
    async fn test_owner_leaving_hands_over_to_admin() {
        let owner = Uuid::now_v7();
        let admin = Uuid::now_v7();
        let member = Uuid::now_v7();
        let mut mocks = Mocks::new();
        let conversation = group_with_role(&mut mocks, MemberRole::Owner);
        let conversation_id = conversation.id;
        mocks.conversations.expect_list_members().returning(move |_| {
            Ok(vec![
                profile(owner, MemberRole::Owner),
                profile(member, MemberRole::Member),
                profile(admin, MemberRole::Admin),
            ])
        });
        mocks
            .conversations
            .expect_leave()
            .with(eq(conversation_id), eq(owner), eq(Some(admin)))
            .times(1)
            .returning(|_, _, _| Ok(()));
        mocks.broker.expect_publish_to_topic().return_const(());
        mocks
            .broker
            .expect_revoke_conversation()
            .with(eq(owner), eq(conversation_id))
            .times(1)
            .return_const(());

        mocks.build().leave(owner, conversation_id).await.unwrap();
    }

    #[tokio::test]
    async fn test_last_member_leaving_deletes_conversation() {
        let owner = Uuid::now_v7();
        let mut mocks = Mocks::new();
        let conversation = group_with_role(&mut mocks, MemberRole::Owner);
        mocks
            .conversations
            .expect_list_members()
            .returning(move |_| Ok(vec![profile(owner, MemberRole::Owner)]));
        mocks.conversations.expect_delete().times(1).returning(|_| Ok(()));
        mocks.conversations.expect_leave().never();
        mocks.broker.expect_publish_to_user().return_const(());
        mocks.broker.expect_revoke_conversation().times(1).return_const(());

        mocks.build().leave(owner, conversation.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_only_owner_deletes() {
        let mut mocks = Mocks::new();
        let conversation = group_with_role(&mut mocks, MemberRole::Admin);
        mocks.conversations.expect_delete().never();

        let err = mocks
            .build()
            .delete(Uuid::now_v7(), conversation.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::Policy(PolicyViolation::NotOwner)));
    }
}
