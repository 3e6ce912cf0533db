//! WebRTC signaling relay rules.
//!
//! Signaling frames are opaque to the server apart from their routing
//! fields. The server decides which of the two parties receives a frame.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    CallOutgoing,
    CallIncoming,
    CallAccepted,
    CallRejected,
    CallEnded,
    CallFailed,
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::CallOutgoing => "call_outgoing",
            SignalKind::CallIncoming => "call_incoming",
            SignalKind::CallAccepted => "call_accepted",
            SignalKind::CallRejected => "call_rejected",
            SignalKind::CallEnded => "call_ended",
            SignalKind::CallFailed => "call_failed",
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice_candidate",
        }
    }
}

/// A signaling frame as exchanged between clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub kind: SignalKind,

    #[serde(default, alias = "callId", skip_serializing_if = "Option::is_none")]
    pub call_id: Option<Uuid>,

    #[serde(alias = "callerId")]
    pub caller_id: Uuid,

    #[serde(alias = "calleeId")]
    pub callee_id: Uuid,

    #[serde(default, alias = "senderId", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<Uuid>,

    /// SDP, ICE candidate and anything else the clients exchange
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    #[error("Sender is not a party of this call")]
    NotParticipant,

    #[error("Caller and callee must differ")]
    SelfCall,

    #[error("Signal {0:?} cannot be sent by this party")]
    WrongDirection(SignalKind),

    #[error("Signal {0:?} is emitted by the server only")]
    ServerOnly(SignalKind),
}

/// A frame ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedSignal {
    pub target: Uuid,
    pub envelope: SignalEnvelope,
}

/// Decide who receives `envelope` sent by `sender`.
///
/// | kind | from | to |
/// |---|---|---|
/// | call_outgoing | caller | callee, as call_incoming |
/// | offer | caller | callee |
/// | call_accepted, call_rejected, answer | callee | caller |
/// | call_ended, call_failed, ice_candidate | either | the other party |
///
/// `sender_id` is always replaced by the authenticated sender.
pub fn route_signal(mut envelope: SignalEnvelope, sender: Uuid) -> Result<RoutedSignal, SignalError> {
    if envelope.caller_id == envelope.callee_id {
        return Err(SignalError::SelfCall);
    }
    let other = if sender == envelope.caller_id {
        envelope.callee_id
    } else if sender == envelope.callee_id {
        envelope.caller_id
    } else {
        return Err(SignalError::NotParticipant);
    };
    let from_caller = sender == envelope.caller_id;

    let target = match envelope.kind {
        SignalKind::CallOutgoing | SignalKind::Offer if from_caller => envelope.callee_id,
        SignalKind::CallAccepted | SignalKind::CallRejected | SignalKind::Answer if !from_caller => {
            envelope.caller_id
        }
        SignalKind::CallEnded | SignalKind::CallFailed | SignalKind::IceCandidate => other,
        SignalKind::CallIncoming => return Err(SignalError::ServerOnly(envelope.kind)),
        kind => return Err(SignalError::WrongDirection(kind)),
    };

    if envelope.kind == SignalKind::CallOutgoing {
        envelope.kind = SignalKind::CallIncoming;
    }
    envelope.sender_id = Some(sender);

    Ok(RoutedSignal { target, envelope })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    fn envelope(kind: SignalKind, caller: Uuid, callee: Uuid) -> SignalEnvelope {
        SignalEnvelope {
            kind,
            call_id: Some(Uuid::now_v7()),
            caller_id: caller,
            callee_id: callee,
            sender_id: None,
            payload: Map::new(),
        }
    }

    #[test]
    fn test_outgoing_becomes_incoming_for_callee() {
        let (caller, callee) = (Uuid::now_v7(), Uuid::now_v7());
        let routed = route_signal(envelope(SignalKind::CallOutgoing, caller, callee), caller).unwrap();
        assert_eq!(routed.target, callee);
        assert_eq!(routed.envelope.kind, SignalKind::CallIncoming);
        assert_eq!(routed.envelope.sender_id, Some(caller));
    }

    #[test_case(SignalKind::Offer, true ; "offer from caller")]
    #[test_case(SignalKind::Answer, false ; "answer from callee")]
    #[test_case(SignalKind::CallAccepted, false ; "accept from callee")]
    #[test_case(SignalKind::CallRejected, false ; "reject from callee")]
    fn test_directional_kinds_reach_other_party(kind: SignalKind, from_caller: bool) {
        let (caller, callee) = (Uuid::now_v7(), Uuid::now_v7());
        let sender = if from_caller { caller } else { callee };
        let expected = if from_caller { callee } else { caller };
        let routed = route_signal(envelope(kind, caller, callee), sender).unwrap();
        assert_eq!(routed.target, expected);
        assert_eq!(routed.envelope.kind, kind);
    }

    #[test_case(SignalKind::Answer ; "caller cannot answer")]
    #[test_case(SignalKind::CallAccepted ; "caller cannot accept")]
    fn test_wrong_direction_from_caller(kind: SignalKind) {
        let (caller, callee) = (Uuid::now_v7(), Uuid::now_v7());
        assert_eq!(
            route_signal(envelope(kind, caller, callee), caller),
            Err(SignalError::WrongDirection(kind))
        );
    }

    #[test]
    fn test_offer_from_callee_rejected() {
        let (caller, callee) = (Uuid::now_v7(), Uuid::now_v7());
        assert_eq!(
            route_signal(envelope(SignalKind::Offer, caller, callee), callee),
            Err(SignalError::WrongDirection(SignalKind::Offer))
        );
    }

    #[test_case(SignalKind::IceCandidate ; "ice")]
    #[test_case(SignalKind::CallEnded ; "ended")]
    #[test_case(SignalKind::CallFailed ; "failed")]
    fn test_symmetric_kinds(kind: SignalKind) {
        let (caller, callee) = (Uuid::now_v7(), Uuid::now_v7());
        assert_eq!(route_signal(envelope(kind, caller, callee), caller).unwrap().target, callee);
        assert_eq!(route_signal(envelope(kind, caller, callee), callee).unwrap().target, caller);
    }

    #[test]
    fn test_outsider_rejected() {
        let (caller, callee) = (Uuid::now_v7(), Uuid::now_v7());
        assert_eq!(
            route_signal(envelope(SignalKind::Offer, caller, callee), Uuid::now_v7()),
            Err(SignalError::NotParticipant)
        );
    }

    #[test]
    fn test_self_call_rejected() {
        let user = Uuid::now_v7();
        assert_eq!(
            route_signal(envelope(SignalKind::Offer, user, user), user),
            Err(SignalError::SelfCall)
        );
    }

    #[test]
    fn test_spoofed_sender_overwritten() {
        let (caller, callee) = (Uuid::now_v7(), Uuid::now_v7());
        let mut env = envelope(SignalKind::IceCandidate, caller, callee);
        env.sender_id = Some(Uuid::now_v7());
        let routed = route_signal(env, callee).unwrap();
        assert_eq!(routed.envelope.sender_id, Some(callee));
    }

    #[test]
    fn test_camel_case_payload_parsed_and_extra_fields_kept() {
        let caller = Uuid::now_v7();
        let callee = Uuid::now_v7();
        let raw = json!({
            "type": "offer",
            "callerId": caller,
            "calleeId": callee,
            "sdp": "v=0..."
        });
        let env: SignalEnvelope = serde_json::from_value(raw).unwrap();
        assert_eq!(env.kind, SignalKind::Offer);
        assert_eq!(env.payload.get("sdp"), Some(&json!("v=0...")));

        let routed = route_signal(env, caller).unwrap();
        let out = serde_json::to_value(&routed.envelope).unwrap();
        assert_eq!(out["type"], json!("offer"));
        assert_eq!(out["sdp"], json!("v=0..."));
        assert_eq!(out["sender_id"], json!(caller));
    }
}
