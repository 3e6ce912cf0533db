//! Call entity, participants and repository trait.
//!
//! Maps to the `calls` and `call_participants` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Audio,
    Video,
}

impl CallType {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

impl std::fmt::Display for CallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle of a call.
///
/// ```text
/// ringing ──> ongoing ──> ended | failed
///    └──────> ended | missed | canceled | failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Ringing,
    Ongoing,
    Ended,
    Missed,
    Canceled,
    Failed,
}

impl CallStatus {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ringing" => Some(Self::Ringing),
            "ongoing" => Some(Self::Ongoing),
            "ended" => Some(Self::Ended),
            "missed" => Some(Self::Missed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ringing => "ringing",
            Self::Ongoing => "ongoing",
            Self::Ended => "ended",
            Self::Missed => "missed",
            Self::Canceled => "canceled",
            Self::Failed => "failed",
        }
    }

    /// Ringing or ongoing.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Ringing | Self::Ongoing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        match (self, next) {
            (Self::Ringing, Self::Ongoing)
            | (Self::Ringing, Self::Ended)
            | (Self::Ringing, Self::Missed)
            | (Self::Ringing, Self::Canceled)
            | (Self::Ringing, Self::Failed)
            | (Self::Ongoing, Self::Ended)
            | (Self::Ongoing, Self::Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a call placed in a conversation.
///
/// Maps to the `calls` table:
/// - id: UUID PRIMARY KEY
/// - conversation_id: UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE
/// - initiator_id: UUID NOT NULL REFERENCES users(id)
/// - type: VARCHAR(10) NOT NULL
/// - status: VARCHAR(20) NOT NULL
/// - started_at / ended_at: TIMESTAMPTZ NULL
/// - created_at: TIMESTAMPTZ NOT NULL
///
/// A partial unique index keeps at most one ringing/ongoing call per
/// conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Call {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub initiator_id: Uuid,
    pub call_type: CallType,
    pub status: CallStatus,

    /// Set when the call is answered
    pub started_at: Option<DateTime<Utc>>,

    /// Set when the call reaches a terminal status
    pub ended_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Call {
    pub fn new(conversation_id: Uuid, initiator_id: Uuid, call_type: CallType) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            initiator_id,
            call_type,
            status: CallStatus::Ringing,
            started_at: None,
            ended_at: None,
            created_at: Utc::now(),
        }
    }

    /// Move to `next`, stamping `started_at`/`ended_at`. Returns `false` and
    /// leaves the call untouched when the transition is not allowed.
    pub fn transition(&mut self, next: CallStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next == CallStatus::Ongoing {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.ended_at = Some(now);
        }
        true
    }

    /// Talk time in whole seconds: `ended - started`, or `now - started`
    /// while the call is still ongoing.
    pub fn duration_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        let started = self.started_at?;
        let until = match (self.status, self.ended_at) {
            (CallStatus::Ongoing, _) => now,
            (_, Some(ended)) => ended,
            _ => return None,
        };
        Some((until - started).num_seconds().max(0))
    }
}

/// Maps to the `call_participants` table (PK call_id, user_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallParticipant {
    pub call_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,

    /// Client-side WebRTC session identifier
    pub rtc_session_id: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Insert a call and register the initiator as first participant.
    /// `Conflict` if the conversation already has an active call.
    async fn create(&self, call: &Call) -> Result<Call, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Call>, AppError>;

    /// Calls of a conversation, newest first.
    async fn find_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Call>, AppError>;

    async fn find_active_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Call>, AppError>;

    /// Calls initiated by the user, newest first.
    async fn find_by_initiator(&self, user_id: Uuid) -> Result<Vec<Call>, AppError>;

    async fn find_active_by_initiator(&self, user_id: Uuid) -> Result<Vec<Call>, AppError>;

    /// Calls the user initiated or joined, newest first, with total count.
    async fn history(&self, user_id: Uuid, page: PageRequest) -> Result<(Vec<Call>, i64), AppError>;

    /// Persist status and timestamps if the stored status still equals
    /// `expected`; `Conflict` otherwise.
    async fn save_status(&self, call: &Call, expected: CallStatus) -> Result<Call, AppError>;

    /// Ringing calls created before `cutoff` become missed.
    async fn expire_ringing(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Call>, AppError>;

    /// Ongoing calls started before `cutoff` become ended.
    async fn expire_ongoing(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Call>, AppError>;

    /// Join (or re-join) a call.
    async fn add_participant(
        &self,
        call_id: Uuid,
        user_id: Uuid,
        rtc_session_id: Option<String>,
    ) -> Result<CallParticipant, AppError>;

    /// Returns whether an active participation was closed.
    async fn leave_participant(
        &self,
        call_id: Uuid,
        user_id: Uuid,
        left_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn participants(&self, call_id: Uuid) -> Result<Vec<CallParticipant>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use test_case::test_case;

    // ==========================================================================
    // CallStatus Tests
    // ==========================================================================

    #[test_case(CallStatus::Ringing, CallStatus::Ongoing, true ; "answer")]
    #[test_case(CallStatus::Ringing, CallStatus::Missed, true ; "miss")]
    #[test_case(CallStatus::Ringing, CallStatus::Canceled, true ; "cancel")]
    #[test_case(CallStatus::Ongoing, CallStatus::Ended, true ; "hang up")]
    #[test_case(CallStatus::Ongoing, CallStatus::Failed, true ; "drop")]
    #[test_case(CallStatus::Ongoing, CallStatus::Ringing, false ; "no ring back")]
    #[test_case(CallStatus::Ongoing, CallStatus::Missed, false ; "answered cannot be missed")]
    #[test_case(CallStatus::Ended, CallStatus::Ongoing, false ; "ended is final")]
    #[test_case(CallStatus::Missed, CallStatus::Ended, false ; "missed is final")]
    #[test_case(CallStatus::Ringing, CallStatus::Ringing, false ; "same status")]
    fn test_transitions(from: CallStatus, to: CallStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(CallStatus::from_str("ONGOING"), Some(CallStatus::Ongoing));
        assert_eq!(CallStatus::from_str("cancelled"), Some(CallStatus::Canceled));
        assert_eq!(CallStatus::from_str("busy"), None);
    }

    #[test]
    fn test_active_statuses() {
        assert!(CallStatus::Ringing.is_active());
        assert!(CallStatus::Ongoing.is_active());
        assert!(CallStatus::Ended.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
    }

    // ==========================================================================
    // Call Tests
    // ==========================================================================

    #[test]
    fn test_new_call_is_ringing() {
        let call = Call::new(Uuid::now_v7(), Uuid::now_v7(), CallType::Video);
        assert_eq!(call.status, CallStatus::Ringing);
        assert!(call.started_at.is_none());
        assert!(call.ended_at.is_none());
    }

    #[test]
    fn test_transition_stamps_times() {
        let mut call = Call::new(Uuid::now_v7(), Uuid::now_v7(), CallType::Audio);
        let t0 = Utc::now();
        assert!(call.transition(CallStatus::Ongoing, t0));
        assert_eq!(call.started_at, Some(t0));
        assert!(call.ended_at.is_none());

        let t1 = t0 + Duration::seconds(90);
        assert!(call.transition(CallStatus::Ended, t1));
        assert_eq!(call.ended_at, Some(t1));
        assert_eq!(call.duration_secs(t1 + Duration::hours(1)), Some(90));
    }

    #[test]
    fn test_rejected_transition_leaves_call_untouched() {
        let mut call = Call::new(Uuid::now_v7(), Uuid::now_v7(), CallType::Audio);
        let now = Utc::now();
        assert!(call.transition(CallStatus::Canceled, now));
        let before = call.clone();
        assert!(!call.transition(CallStatus::Ongoing, now));
        assert_eq!(call, before);
    }

    #[test]
    fn test_duration_while_ongoing_uses_now() {
        let mut call = Call::new(Uuid::now_v7(), Uuid::now_v7(), CallType::Audio);
        let t0 = Utc::now();
        call.transition(CallStatus::Ongoing, t0);
        assert_eq!(call.duration_secs(t0 + Duration::seconds(42)), Some(42));
    }

    #[test]
    fn test_duration_none_when_never_answered() {
        let mut call = Call::new(Uuid::now_v7(), Uuid::now_v7(), CallType::Audio);
        call.transition(CallStatus::Missed, Utc::now());
        assert_eq!(call.duration_secs(Utc::now()), None);
    }
}
