//! Conversation access rules.

use uuid::Uuid;

use crate::domain::entities::{MemberProfile, MemberRole};

/// Reason an action was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyViolation {
    #[error("Only the owner or an admin can do this")]
    NotAdmin,

    #[error("Only the owner can do this")]
    NotOwner,

    #[error("The owner cannot be removed or demoted")]
    OwnerProtected,

    #[error("Ownership can only change when the owner leaves")]
    OwnerRoleNotAssignable,
}

/// Domain service for membership and moderation rules.
pub struct AccessPolicy;

impl AccessPolicy {
    /// Title, avatar and membership changes need an owner or admin.
    pub fn ensure_admin(role: MemberRole) -> Result<(), PolicyViolation> {
        if role.is_admin() {
            Ok(())
        } else {
            Err(PolicyViolation::NotAdmin)
        }
    }

    pub fn ensure_owner(role: MemberRole) -> Result<(), PolicyViolation> {
        if role == MemberRole::Owner {
            Ok(())
        } else {
            Err(PolicyViolation::NotOwner)
        }
    }

    pub fn ensure_can_remove(actor: MemberRole, target: MemberRole) -> Result<(), PolicyViolation> {
        Self::ensure_admin(actor)?;
        if target == MemberRole::Owner {
            return Err(PolicyViolation::OwnerProtected);
        }
        Ok(())
    }

    pub fn ensure_can_assign(
        actor: MemberRole,
        target: MemberRole,
        new_role: MemberRole,
    ) -> Result<(), PolicyViolation> {
        Self::ensure_admin(actor)?;
        if new_role == MemberRole::Owner {
            return Err(PolicyViolation::OwnerRoleNotAssignable);
        }
        if target == MemberRole::Owner {
            return Err(PolicyViolation::OwnerProtected);
        }
        Ok(())
    }

    /// Senders delete their own messages; owners and admins delete any.
    pub fn can_delete_message(actor_id: Uuid, sender_id: Uuid, actor_role: Option<MemberRole>) -> bool {
        actor_id == sender_id || actor_role.map(|r| r.is_admin()).unwrap_or(false)
    }

    /// Who becomes owner when the owner leaves: the earliest-joined admin,
    /// else the earliest-joined member.
    pub fn choose_successor(members: &[MemberProfile], leaving: Uuid) -> Option<Uuid> {
        let remaining = || members.iter().filter(|m| m.user_id != leaving);

        remaining()
            .filter(|m| m.role == MemberRole::Admin)
            .min_by_key(|m| m.joined_at)
            .or_else(|| remaining().min_by_key(|m| m.joined_at))
            .map(|m| m.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn profile(role: MemberRole, joined_offset_secs: i64) -> MemberProfile {
        MemberProfile {
            user_id: Uuid::now_v7(),
            username: "u".into(),
            display_name: None,
            avatar_url: None,
            last_seen_at: None,
            role,
            joined_at: Utc::now() + Duration::seconds(joined_offset_secs),
            muted_until: None,
            last_read_message_id: None,
        }
    }

    #[test]
    fn test_ensure_admin() {
        assert!(AccessPolicy::ensure_admin(MemberRole::Owner).is_ok());
        assert!(AccessPolicy::ensure_admin(MemberRole::Admin).is_ok());
        assert_eq!(
            AccessPolicy::ensure_admin(MemberRole::Member),
            Err(PolicyViolation::NotAdmin)
        );
    }

    #[test]
    fn test_owner_cannot_be_removed() {
        assert_eq!(
            AccessPolicy::ensure_can_remove(MemberRole::Admin, MemberRole::Owner),
            Err(PolicyViolation::OwnerProtected)
        );
        assert!(AccessPolicy::ensure_can_remove(MemberRole::Admin, MemberRole::Member).is_ok());
        assert!(AccessPolicy::ensure_can_remove(MemberRole::Member, MemberRole::Member).is_err());
    }

    #[test]
    fn test_owner_role_not_assignable() {
        assert_eq!(
            AccessPolicy::ensure_can_assign(MemberRole::Owner, MemberRole::Member, MemberRole::Owner),
            Err(PolicyViolation::OwnerRoleNotAssignable)
        );
        assert_eq!(
            AccessPolicy::ensure_can_assign(MemberRole::Admin, MemberRole::Owner, MemberRole::Member),
            Err(PolicyViolation::OwnerProtected)
        );
        assert!(AccessPolicy::ensure_can_assign(MemberRole::Admin, MemberRole::Member, MemberRole::Admin).is_ok());
    }

    #[test]
    fn test_can_delete_message() {
        let sender = Uuid::now_v7();
        let other = Uuid::now_v7();
        assert!(AccessPolicy::can_delete_message(sender, sender, Some(MemberRole::Member)));
        assert!(AccessPolicy::can_delete_message(other, sender, Some(MemberRole::Admin)));
        assert!(!AccessPolicy::can_delete_message(other, sender, Some(MemberRole::Member)));
        assert!(!AccessPolicy::can_delete_message(other, sender, None));
    }

    #[test]
    fn test_successor_prefers_earliest_admin() {
        let owner = profile(MemberRole::Owner, 0);
        let early_member = profile(MemberRole::Member, 1);
        let late_admin = profile(MemberRole::Admin, 10);
        let later_admin = profile(MemberRole::Admin, 20);
        let members = vec![owner.clone(), later_admin, early_member, late_admin.clone()];
        assert_eq!(
            AccessPolicy::choose_successor(&members, owner.user_id),
            Some(late_admin.user_id)
        );
    }

    #[test]
    fn test_successor_falls_back_to_earliest_member() {
        let owner = profile(MemberRole::Owner, 0);
        let first = profile(MemberRole::Member, 5);
        let second = profile(MemberRole::Member, 9);
        let members = vec![owner.clone(), second, first.clone()];
        assert_eq!(AccessPolicy::choose_successor(&members, owner.user_id), Some(first.user_id));
    }

    #[test]
    fn test_no_successor_for_last_member() {
        let owner = profile(MemberRole::Owner, 0);
        assert_eq!(AccessPolicy::choose_successor(&[owner.clone()], owner.user_id), None);
    }
}
