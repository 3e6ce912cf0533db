//! # Domain Services
//!
//! Business rules that don't belong to a single entity.
//!
//! ## Services
//!
//! - **AccessPolicy**: Conversation roles, moderation and owner succession
//! - **call_signaling**: Routing of WebRTC signaling frames between call parties

mod access_policy;
pub mod call_signaling;

pub use access_policy::*;
pub use call_signaling::{route_signal, RoutedSignal, SignalEnvelope, SignalError, SignalKind};
