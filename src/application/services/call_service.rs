//! Call Service
//!
//! Call records, their status machine and participants. At most one
//! ringing/ongoing call exists per conversation; a periodic sweep closes
//! calls that were left ringing or ongoing for too long.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::application::dto::response::{CallDto, CallParticipantDto, CleanupReport};
use crate::application::events::{destinations, emit_user, RealtimeBroker, RealtimeEvent};
use crate::application::services::membership::{require_member, MembershipError};
use crate::config::CallSettings;
use crate::domain::{Call, CallRepository, CallStatus, CallType, ConversationRepository};
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};

/// Default page size for call history
pub const DEFAULT_CALL_PAGE_SIZE: i64 = 20;

#[async_trait]
pub trait CallService: Send + Sync {
    /// Start a call; stale active calls of the conversation are closed first
    async fn create(
        &self,
        initiator_id: Uuid,
        conversation_id: Uuid,
        call_type: CallType,
    ) -> Result<CallDto, CallError>;

    async fn update_status(&self, user_id: Uuid, call_id: Uuid, status: CallStatus) -> Result<CallDto, CallError>;

    async fn end(&self, user_id: Uuid, call_id: Uuid) -> Result<CallDto, CallError>;

    async fn get(&self, user_id: Uuid, call_id: Uuid) -> Result<CallDto, CallError>;

    async fn list_by_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Vec<CallDto>, CallError>;

    async fn list_active_by_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Vec<CallDto>, CallError>;

    /// Calls initiated by the user
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<CallDto>, CallError>;

    async fn list_active_by_user(&self, user_id: Uuid) -> Result<Vec<CallDto>, CallError>;

    /// Calls the user initiated or took part in
    async fn history(&self, user_id: Uuid, page: PageRequest) -> Result<Page<CallDto>, CallError>;

    async fn join(
        &self,
        user_id: Uuid,
        call_id: Uuid,
        rtc_session_id: Option<String>,
    ) -> Result<CallParticipantDto, CallError>;

    async fn leave(&self, user_id: Uuid, call_id: Uuid) -> Result<(), CallError>;

    async fn participants(&self, user_id: Uuid, call_id: Uuid) -> Result<Vec<CallParticipantDto>, CallError>;

    /// Ringing calls past the ringing timeout become missed, ongoing calls
    /// past the ongoing timeout become ended
    async fn cleanup_expired(&self) -> Result<CleanupReport, CallError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("Call not found")]
    NotFound,

    #[error("Conversation already has an active call")]
    ActiveCallExists,

    #[error("Cannot change call status from {from} to {to}")]
    InvalidTransition { from: CallStatus, to: CallStatus },

    #[error("Call is no longer active")]
    NotActive,

    #[error(transparent)]
    Access(#[from] MembershipError),

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<CallError> for AppError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::NotFound => AppError::NotFound(err.to_string()),
            CallError::ActiveCallExists | CallError::NotActive => AppError::Conflict(err.to_string()),
            CallError::InvalidTransition { .. } => AppError::BadRequest(err.to_string()),
            CallError::Access(e) => e.into(),
            CallError::Store(e) => e,
        }
    }
}

pub struct CallServiceImpl<R, C>
where
    R: CallRepository,
    C: ConversationRepository,
{
    call_repo: Arc<R>,
    conversation_repo: Arc<C>,
    broker: Arc<dyn RealtimeBroker>,
    settings: CallSettings,
}

impl<R, C> CallServiceImpl<R, C>
where
    R: CallRepository,
    C: ConversationRepository,
{
    pub fn new(
        call_repo: Arc<R>,
        conversation_repo: Arc<C>,
        broker: Arc<dyn RealtimeBroker>,
        settings: CallSettings,
    ) -> Self {
        Self {
            call_repo,
            conversation_repo,
            broker,
            settings,
        }
    }

    async fn load(&self, call_id: Uuid) -> Result<Call, CallError> {
        self.call_repo
            .find_by_id(call_id)
            .await?
            .ok_or(CallError::NotFound)
    }

    async fn title_of(&self, conversation_id: Uuid) -> Result<Option<String>, CallError> {
        Ok(self
            .conversation_repo
            .find_by_id(conversation_id)
            .await?
            .and_then(|c| c.title))
    }

    async fn to_dto(&self, call: Call) -> Result<CallDto, CallError> {
        let title = self.title_of(call.conversation_id).await?;
        Ok(CallDto::new(call, title, Utc::now()))
    }

    /// Titles are fetched once per conversation
    async fn to_dtos(&self, calls: Vec<Call>) -> Result<Vec<CallDto>, CallError> {
        let now = Utc::now();
        let mut titles: HashMap<Uuid, Option<String>> = HashMap::new();
        let mut dtos = Vec::with_capacity(calls.len());
        for call in calls {
            let title = match titles.get(&call.conversation_id) {
                Some(title) => title.clone(),
                None => {
                    let title = self.title_of(call.conversation_id).await?;
                    titles.insert(call.conversation_id, title.clone());
                    title
                }
            };
            dtos.push(CallDto::new(call, title, now));
        }
        Ok(dtos)
    }

    /// Push a call event to every member of the call's conversation
    async fn notify_members(&self, event: RealtimeEvent, conversation_id: Uuid) -> Result<(), CallError> {
        for member in self.conversation_repo.list_members(conversation_id).await? {
            emit_user(
                self.broker.as_ref(),
                member.user_id,
                destinations::QUEUE_CALL_EVENTS,
                &event,
            );
        }
        Ok(())
    }

    /// Apply a transition and persist it against the status we read
    async fn transition(&self, mut call: Call, next: CallStatus) -> Result<Call, CallError> {
        let from = call.status;
        if !call.transition(next, Utc::now()) {
            return Err(CallError::InvalidTransition { from, to: next });
        }
        let saved = self.call_repo.save_status(&call, from).await?;
        if saved.status.is_terminal() {
            self.close_participants(&saved).await?;
        }
        Ok(saved)
    }

    async fn close_participants(&self, call: &Call) -> Result<(), CallError> {
        let at = call.ended_at.unwrap_or_else(Utc::now);
        for participant in self.call_repo.participants(call.id).await? {
            if participant.left_at.is_none() {
                self.call_repo
                    .leave_participant(call.id, participant.user_id, at)
                    .await?;
            }
        }
        Ok(())
    }

    async fn publish_update(&self, call: Call) -> Result<CallDto, CallError> {
        let dto = self.to_dto(call).await?;
        self.notify_members(RealtimeEvent::CallUpdated(dto.clone()), dto.conversation_id)
            .await?;
        Ok(dto)
    }
}

#[async_trait]
impl<R, C> CallService for CallServiceImpl<R, C>
where
    R: CallRepository + 'static,
    C: ConversationRepository + 'static,
{
    async fn create(
        &self,
        initiator_id: Uuid,
        conversation_id: Uuid,
        call_type: CallType,
    ) -> Result<CallDto, CallError> {
        let (conversation, _) =
            require_member(self.conversation_repo.as_ref(), conversation_id, initiator_id).await?;

        let now = Utc::now();
        let takeover = Duration::seconds(self.settings.stale_ongoing_takeover_secs);
        let active = self
            .call_repo
            .find_active_by_conversation(conversation_id)
            .await?;

        let is_fresh_ongoing = |call: &Call| {
            call.status == CallStatus::Ongoing
                && now - call.started_at.unwrap_or(call.created_at) <= takeover
        };
        if active.iter().any(is_fresh_ongoing) {
            return Err(CallError::ActiveCallExists);
        }

        for stale in active {
            let next = match stale.status {
                CallStatus::Ringing => CallStatus::Canceled,
                _ => CallStatus::Ended,
            };
            let stale_id = stale.id;
            let closed = self.transition(stale, next).await?;
            tracing::info!(call_id = %stale_id, status = %closed.status, "Closed previous call before starting a new one");
            self.publish_update(closed).await?;
        }

        let call = Call::new(conversation_id, initiator_id, call_type);
        let created = self.call_repo.create(&call).await.map_err(|e| match e {
            AppError::Conflict(_) => CallError::ActiveCallExists,
            other => CallError::Store(other),
        })?;

        let dto = CallDto::new(created, conversation.title, now);
        self.notify_members(RealtimeEvent::CallCreated(dto.clone()), conversation_id)
            .await?;
        tracing::info!(call_id = %dto.id, conversation_id = %conversation_id, call_type = %call_type, "Call started");
        Ok(dto)
    }

    async fn update_status(&self, user_id: Uuid, call_id: Uuid, status: CallStatus) -> Result<CallDto, CallError> {
        let call = self.load(call_id).await?;
        require_member(self.conversation_repo.as_ref(), call.conversation_id, user_id).await?;

        let updated = self.transition(call, status).await?;
        self.publish_update(updated).await
    }

    async fn end(&self, user_id: Uuid, call_id: Uuid) -> Result<CallDto, CallError> {
        let call = self.load(call_id).await?;
        if call.initiator_id != user_id {
            require_member(self.conversation_repo.as_ref(), call.conversation_id, user_id).await?;
        }
        if call.status.is_terminal() {
            return self.to_dto(call).await;
        }

        let ended = self.transition(call, CallStatus::Ended).await?;
        self.publish_update(ended).await
    }

    async fn get(&self, user_id: Uuid, call_id: Uuid) -> Result<CallDto, CallError> {
        let call = self.load(call_id).await?;
        let (conversation, _) =
            require_member(self.conversation_repo.as_ref(), call.conversation_id, user_id).await?;
        Ok(CallDto::new(call, conversation.title, Utc::now()))
    }

    async fn list_by_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Vec<CallDto>, CallError> {
        require_member(self.conversation_repo.as_ref(), conversation_id, user_id).await?;
        let calls = self.call_repo.find_by_conversation(conversation_id).await?;
        self.to_dtos(calls).await
    }

    async fn list_active_by_conversation(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Vec<CallDto>, CallError> {
        require_member(self.conversation_repo.as_ref(), conversation_id, user_id).await?;
        let calls = self
            .call_repo
            .find_active_by_conversation(conversation_id)
            .await?;
        self.to_dtos(calls).await
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<CallDto>, CallError> {
        let calls = self.call_repo.find_by_initiator(user_id).await?;
        self.to_dtos(calls).await
    }

    async fn list_active_by_user(&self, user_id: Uuid) -> Result<Vec<CallDto>, CallError> {
        let calls = self.call_repo.find_active_by_initiator(user_id).await?;
        self.to_dtos(calls).await
    }

    async fn history(&self, user_id: Uuid, page: PageRequest) -> Result<Page<CallDto>, CallError> {
        let (calls, total) = self.call_repo.history(user_id, page).await?;
        let content = self.to_dtos(calls).await?;
        Ok(Page::new(content, page, total))
    }

    async fn join(
        &self,
        user_id: Uuid,
        call_id: Uuid,
        rtc_session_id: Option<String>,
    ) -> Result<CallParticipantDto, CallError> {
        let call = self.load(call_id).await?;
        require_member(self.conversation_repo.as_ref(), call.conversation_id, user_id).await?;
        if !call.status.is_active() {
            return Err(CallError::NotActive);
        }

        let participant = self
            .call_repo
            .add_participant(call_id, user_id, rtc_session_id)
            .await?;

        // Someone other than the initiator picked up
        if call.status == CallStatus::Ringing && user_id != call.initiator_id {
            let answered = self.transition(call, CallStatus::Ongoing).await?;
            self.publish_update(answered).await?;
        }

        Ok(CallParticipantDto::from(participant))
    }

    async fn leave(&self, user_id: Uuid, call_id: Uuid) -> Result<(), CallError> {
        let call = self.load(call_id).await?;
        require_member(self.conversation_repo.as_ref(), call.conversation_id, user_id).await?;
        self.call_repo
            .leave_participant(call_id, user_id, Utc::now())
            .await?;
        Ok(())
    }

    async fn participants(&self, user_id: Uuid, call_id: Uuid) -> Result<Vec<CallParticipantDto>, CallError> {
        let call = self.load(call_id).await?;
        require_member(self.conversation_repo.as_ref(), call.conversation_id, user_id).await?;
        Ok(self
            .call_repo
            .participants(call_id)
            .await?
            .into_iter()
            .map(CallParticipantDto::from)
            .collect())
    }

    async fn cleanup_expired(&self) -> Result<CleanupReport, CallError> {
        let now = Utc::now();
        let missed = self
            .call_repo
            .expire_ringing(now - Duration::seconds(self.settings.ringing_timeout_secs), now)
            .await?;
        let ended = self
            .call_repo
            .expire_ongoing(now - Duration::seconds(self.settings.ongoing_timeout_secs), now)
            .await?;

        let report = CleanupReport {
            missed: missed.len(),
            ended: ended.len(),
        };

        for call in missed.into_iter().chain(ended) {
            self.close_participants(&call).await?;
            self.publish_update(call).await?;
        }

        if report.missed + report.ended > 0 {
            tracing::info!(missed = report.missed, ended = report.ended, "Expired calls closed");
        }
        Ok(report)
    }
}
