//! STOMP Frame Dispatch
//!
//! Routes frames of an authenticated session: subscriptions go to the
//! gateway registry, `SEND` frames to `/app/...` destinations reach the
//! application services.

use serde::Serialize;
use uuid::Uuid;

use super::frame::{Command, Frame};
use super::gateway::Outbound;
use super::session::SessionState;
use crate::application::dto::request::MessageBody;
use crate::application::events::{destinations, emit_topic, emit_user, PresenceEvent, TypingEvent};
use crate::application::services::{ConversationService, MessageService};
use crate::domain::services::{route_signal, SignalEnvelope};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;
use crate::shared::validation::validate_body;
use crate::startup::AppState;

/// A subscribable destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionTarget {
    /// `/topic/conversation/{id}` and its typing, read and presence sub-topics
    Conversation(Uuid),
    /// `/user/queue/{name}`
    UserQueue(String),
}

/// A server-handled `/app/...` destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppDestination {
    Send(Uuid),
    Typing(Uuid),
    Read(Uuid),
    Join(Uuid),
    Leave(Uuid),
    Call,
}

pub fn parse_subscription(destination: &str) -> Option<SubscriptionTarget> {
    if let Some(queue) = destination.strip_prefix("/user/queue/") {
        if queue.is_empty() || queue.contains('/') {
            return None;
        }
        return Some(SubscriptionTarget::UserQueue(queue.to_string()));
    }

    let rest = destination.strip_prefix("/topic/conversation/")?;
    let mut parts = rest.split('/');
    let id = Uuid::parse_str(parts.next()?).ok()?;
    match (parts.next(), parts.next()) {
        (None, _) => Some(SubscriptionTarget::Conversation(id)),
        (Some("typing" | "read" | "presence"), None) => Some(SubscriptionTarget::Conversation(id)),
        _ => None,
    }
}

pub fn parse_app_destination(destination: &str) -> Option<AppDestination> {
    let rest = destination.strip_prefix(destinations::APP_PREFIX)?;
    if rest == "/call" {
        return Some(AppDestination::Call);
    }

    let rest = rest.strip_prefix("/conversation/")?;
    let (id, action) = rest.split_once('/')?;
    let id = Uuid::parse_str(id).ok()?;
    match action {
        "send" => Some(AppDestination::Send(id)),
        "typing" => Some(AppDestination::Typing(id)),
        "read" => Some(AppDestination::Read(id)),
        "join" => Some(AppDestination::Join(id)),
        "leave" => Some(AppDestination::Leave(id)),
        _ => None,
    }
}

/// Parse a typing body: `true`/`false`, optionally quoted
pub fn parse_typing(body: &str) -> Option<bool> {
    match body.trim().trim_matches('"') {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse a read body: the message id, optionally quoted
pub fn parse_message_id(body: &str) -> Option<Uuid> {
    Uuid::parse_str(body.trim().trim_matches('"')).ok()
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Protocol violation: answered with ERROR, then the connection closes
    #[error("{0}")]
    Protocol(String),

    /// Failure of an application destination, reported on the errors queue
    #[error(transparent)]
    App(#[from] AppError),
}

impl DispatchError {
    fn missing_header(name: &str) -> Self {
        DispatchError::Protocol(format!("Missing {} header", name))
    }
}

/// What the connection loop should do after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Debug, Serialize)]
struct ErrorPayload<'a> {
    destination: &'a str,
    message: String,
}

#[derive(Debug, Serialize)]
struct JoinedPayload {
    conversation_id: Uuid,
}

/// Handle one inbound frame of an authenticated session
pub async fn dispatch(state: &AppState, session: &SessionState, frame: Frame) -> Flow {
    metrics::record_stomp_frame(frame.command.as_str());

    let result = match frame.command {
        Command::Subscribe => subscribe(state, session, &frame).await,
        Command::Unsubscribe => unsubscribe(state, session, &frame),
        Command::Send => send(state, session, &frame).await,
        Command::Disconnect => {
            send_receipt(state, session, &frame);
            return Flow::Close;
        }
        Command::Connect | Command::Stomp => Err(DispatchError::Protocol("Already connected".into())),
        other => Err(DispatchError::Protocol(format!("{} is a server frame", other))),
    };

    match result {
        Ok(()) => {
            send_receipt(state, session, &frame);
            Flow::Continue
        }
        Err(DispatchError::Protocol(message)) => {
            tracing::debug!(
                session_id = %session.session_id,
                command = %frame.command,
                %message,
                "STOMP protocol error"
            );
            let details = frame.get("destination").unwrap_or_default().to_string();
            state.gateway.send_to_session(
                &session.session_id,
                Outbound::Frame(Frame::error(&message, &details)),
            );
            state.gateway.send_to_session(&session.session_id, Outbound::Close);
            Flow::Close
        }
        Err(DispatchError::App(e)) => {
            let destination = frame.get("destination").unwrap_or_default();
            tracing::debug!(
                session_id = %session.session_id,
                destination,
                error = %e,
                "Application destination failed"
            );
            emit_user(
                &*state.gateway,
                session.user_id,
                destinations::QUEUE_ERRORS,
                &ErrorPayload {
                    destination,
                    message: e.public_message(),
                },
            );
            Flow::Continue
        }
    }
}

fn send_receipt(state: &AppState, session: &SessionState, frame: &Frame) {
    if let Some(receipt) = frame.get("receipt") {
        state
            .gateway
            .send_to_session(&session.session_id, Outbound::Frame(Frame::receipt(receipt)));
    }
}

async fn subscribe(state: &AppState, session: &SessionState, frame: &Frame) -> Result<(), DispatchError> {
    let destination = frame
        .get("destination")
        .ok_or_else(|| DispatchError::missing_header("destination"))?;
    let id = frame.get("id").ok_or_else(|| DispatchError::missing_header("id"))?;

    let target = parse_subscription(destination)
        .ok_or_else(|| DispatchError::Protocol(format!("Unknown destination {}", destination)))?;
    authorize_subscription(&state.conversation_service(), session.user_id, &target).await?;

    if !state.gateway.subscribe(&session.session_id, id, destination) {
        return Err(DispatchError::Protocol("Session is not registered".into()));
    }
    tracing::debug!(session_id = %session.session_id, destination, "Subscribed");
    Ok(())
}

/// Conversation topics are open to members only
async fn authorize_subscription<C: ConversationService + ?Sized>(
    conversations: &C,
    user_id: Uuid,
    target: &SubscriptionTarget,
) -> Result<(), DispatchError> {
    let &SubscriptionTarget::Conversation(conversation_id) = target else {
        return Ok(());
    };
    let member = conversations
        .is_member(user_id, conversation_id)
        .await
        .map_err(AppError::from)?;
    if member {
        Ok(())
    } else {
        Err(DispatchError::Protocol(format!(
            "Not a member of conversation {}",
            conversation_id
        )))
    }
}

fn unsubscribe(state: &AppState, session: &SessionState, frame: &Frame) -> Result<(), DispatchError> {
    let id = frame.get("id").ok_or_else(|| DispatchError::missing_header("id"))?;
    state.gateway.unsubscribe(&session.session_id, id);
    Ok(())
}

async fn send(state: &AppState, session: &SessionState, frame: &Frame) -> Result<(), DispatchError> {
    let destination = frame
        .get("destination")
        .ok_or_else(|| DispatchError::missing_header("destination"))?;
    let target = parse_app_destination(destination)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown destination {}", destination)))?;
    let user_id = session.user_id;

    match target {
        AppDestination::Send(conversation_id) => {
            let body: MessageBody = serde_json::from_str(&frame.body)
                .map_err(|e| AppError::BadRequest(format!("Invalid message body: {}", e)))?;
            validate_body(&body)?;
            state
                .message_service()
                .send(user_id, conversation_id, body)
                .await
                .map_err(AppError::from)?;
        }
        AppDestination::Typing(conversation_id) => {
            let is_typing = parse_typing(&frame.body)
                .ok_or_else(|| AppError::BadRequest("Typing body must be true or false".into()))?;
            require_member(state, user_id, conversation_id).await?;
            update_typing_cache(state, conversation_id, user_id, is_typing).await;
            emit_topic(
                &*state.gateway,
                &destinations::conversation_typing(conversation_id),
                &TypingEvent {
                    conversation_id,
                    user_id,
                    is_typing,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                },
            );
        }
        AppDestination::Read(_) => {
            let message_id = parse_message_id(&frame.body)
                .ok_or_else(|| AppError::BadRequest("Read body must be a message id".into()))?;
            state
                .message_service()
                .mark_read(user_id, message_id)
                .await
                .map_err(AppError::from)?;
        }
        AppDestination::Join(conversation_id) => {
            require_member(state, user_id, conversation_id).await?;
            state.gateway.join_conversation(&session.session_id, conversation_id);
            announce_presence(state, conversation_id, user_id, true);
            emit_user(
                &*state.gateway,
                user_id,
                destinations::QUEUE_JOINED,
                &JoinedPayload { conversation_id },
            );
        }
        AppDestination::Leave(conversation_id) => {
            if state.gateway.leave_conversation(&session.session_id, conversation_id) {
                announce_presence(state, conversation_id, user_id, false);
            }
        }
        AppDestination::Call => relay_signal(state, user_id, &frame.body)?,
    }
    Ok(())
}

async fn require_member(state: &AppState, user_id: Uuid, conversation_id: Uuid) -> Result<(), AppError> {
    let member = state
        .conversation_service()
        .is_member(user_id, conversation_id)
        .await?;
    if member {
        Ok(())
    } else {
        Err(AppError::Forbidden("You are not a member of this conversation".into()))
    }
}

async fn update_typing_cache(state: &AppState, conversation_id: Uuid, user_id: Uuid, is_typing: bool) {
    let Ok(cache) = state.typing_cache() else {
        return;
    };
    let result = if is_typing {
        cache.set_typing(conversation_id, user_id).await
    } else {
        cache.clear_typing(conversation_id, user_id).await
    };
    if let Err(e) = result {
        tracing::warn!(%conversation_id, %user_id, error = %e, "Failed to update typing cache");
    }
}

/// Publish a presence change on a conversation's presence topic
pub fn announce_presence(state: &AppState, conversation_id: Uuid, user_id: Uuid, online: bool) {
    emit_topic(
        &*state.gateway,
        &destinations::conversation_presence(conversation_id),
        &PresenceEvent {
            conversation_id,
            user_id,
            online,
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    );
}

fn relay_signal(state: &AppState, sender: Uuid, body: &str) -> Result<(), AppError> {
    let envelope: SignalEnvelope = serde_json::from_str(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid signaling frame: {}", e)))?;
    let kind = envelope.kind;

    match route_signal(envelope, sender) {
        Ok(routed) => {
            emit_user(
                &*state.gateway,
                routed.target,
                destinations::QUEUE_CALL_EVENTS,
                &routed.envelope,
            );
            metrics::record_signal(kind.as_str(), "relayed");
            tracing::debug!(%sender, target = %routed.target, kind = kind.as_str(), "Signal relayed");
            Ok(())
        }
        Err(e) => {
            metrics::record_signal(kind.as_str(), "rejected");
            Err(AppError::BadRequest(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::conversation_service::MockConversationService;
    use crate::config::test_settings;
    use crate::infrastructure::database::create_lazy_pool;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use test_case::test_case;
    use tokio::sync::mpsc;

    const ID: &str = "0190f5f4-9a39-7c3e-8000-0123456789ab";

    fn id() -> Uuid {
        Uuid::parse_str(ID).unwrap()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    #[test_case("" ; "conversation topic")]
    #[test_case("/typing" ; "typing topic")]
    #[test_case("/read" ; "read topic")]
    #[test_case("/presence" ; "presence topic")]
    fn test_conversation_topics(suffix: &str) {
        let destination = format!("/topic/conversation/{}{}", ID, suffix);
        assert_eq!(
            parse_subscription(&destination),
            Some(SubscriptionTarget::Conversation(id()))
        );
    }

    #[test]
    fn test_user_queue() {
        assert_eq!(
            parse_subscription("/user/queue/call-events"),
            Some(SubscriptionTarget::UserQueue("call-events".into()))
        );
    }

    #[test_case("/topic/conversation/not-a-uuid" ; "bad id")]
    #[test_case("/topic/conversation/0190f5f4-9a39-7c3e-8000-0123456789ab/other" ; "unknown sub topic")]
    #[test_case("/topic/conversation/0190f5f4-9a39-7c3e-8000-0123456789ab/typing/x" ; "too deep")]
    #[test_case("/topic/lobby/1" ; "unknown topic")]
    #[test_case("/user/queue/" ; "empty queue")]
    #[test_case("/user/other/queue/errors" ; "foreign queue")]
    fn test_rejected_subscriptions(destination: &str) {
        assert_eq!(parse_subscription(destination), None);
    }

    // ========================================================================
    // Application destinations
    // ========================================================================

    #[test_case("send", AppDestination::Send(id()) ; "send")]
    #[test_case("typing", AppDestination::Typing(id()) ; "typing")]
    #[test_case("read", AppDestination::Read(id()) ; "read")]
    #[test_case("join", AppDestination::Join(id()) ; "join")]
    #[test_case("leave", AppDestination::Leave(id()) ; "leave")]
    fn test_conversation_actions(action: &str, expected: AppDestination) {
        let destination = format!("/app/conversation/{}/{}", ID, action);
        assert_eq!(parse_app_destination(&destination), Some(expected));
    }

    #[test]
    fn test_call_destination() {
        assert_eq!(parse_app_destination("/app/call"), Some(AppDestination::Call));
    }

    #[test_case("/app/conversation/0190f5f4-9a39-7c3e-8000-0123456789ab/delete" ; "unknown action")]
    #[test_case("/app/conversation/0190f5f4-9a39-7c3e-8000-0123456789ab" ; "no action")]
    #[test_case("/topic/conversation/0190f5f4-9a39-7c3e-8000-0123456789ab/send" ; "not app")]
    #[test_case("/app/calls" ; "near miss")]
    fn test_rejected_app_destinations(destination: &str) {
        assert_eq!(parse_app_destination(destination), None);
    }

    // ========================================================================
    // Bodies
    // ========================================================================

    #[test_case("true", Some(true) ; "plain true")]
    #[test_case("false\n", Some(false) ; "trailing newline")]
    #[test_case("\"true\"", Some(true) ; "quoted")]
    #[test_case("yes", None ; "invalid")]
    fn test_parse_typing(body: &str, expected: Option<bool>) {
        assert_eq!(parse_typing(body), expected);
    }

    #[test]
    fn test_parse_message_id_accepts_quoted() {
        assert_eq!(parse_message_id(&format!("\"{}\"", ID)), Some(id()));
        assert_eq!(parse_message_id(ID), Some(id()));
        assert_eq!(parse_message_id("42"), None);
    }

    // ========================================================================
    // Frame dispatch
    // ========================================================================

    fn app_state() -> AppState {
        let settings = test_settings();
        let db = create_lazy_pool(&settings.database).unwrap();
        AppState::new(db, None, settings)
    }

    fn connect(state: &AppState, session_id: &str, user_id: Uuid) -> (SessionState, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        state.gateway.register_session(session_id.to_string(), user_id, tx);
        (SessionState::new(session_id.to_string(), user_id), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    fn subscribe_frame(id: &str, destination: &str) -> Frame {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
    }

    fn call_frame(body: Value) -> Frame {
        Frame::new(Command::Send)
            .header("destination", "/app/call")
            .body(body.to_string())
    }

    fn single_message(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Frame {
        let mut items = drain(rx);
        assert_eq!(items.len(), 1, "expected exactly one frame, got {:?}", items);
        match items.remove(0) {
            Outbound::Frame(frame) => {
                assert_eq!(frame.command, Command::Message);
                frame
            }
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_subscription_answers_error_and_closes() {
        let state = app_state();
        let (session, mut rx) = connect(&state, "s1", Uuid::now_v7());

        let flow = dispatch(&state, &session, subscribe_frame("sub-0", "/topic/lobby")).await;
        assert_eq!(flow, Flow::Close);

        let items = drain(&mut rx);
        assert_eq!(items.len(), 2);
        match &items[0] {
            Outbound::Frame(frame) => {
                assert_eq!(frame.command, Command::Error);
                assert_eq!(frame.get("message"), Some("Unknown destination /topic/lobby"));
            }
            other => panic!("expected ERROR, got {:?}", other),
        }
        assert!(matches!(items[1], Outbound::Close));
    }

    #[tokio::test]
    async fn test_disconnect_answers_receipt() {
        let state = app_state();
        let (session, mut rx) = connect(&state, "s1", Uuid::now_v7());

        let frame = Frame::new(Command::Disconnect).header("receipt", "77");
        assert_eq!(dispatch(&state, &session, frame).await, Flow::Close);

        let items = drain(&mut rx);
        assert_eq!(items.len(), 1);
        match &items[0] {
            Outbound::Frame(frame) => {
                assert_eq!(frame.command, Command::Receipt);
                assert_eq!(frame.get("receipt-id"), Some("77"));
            }
            other => panic!("expected RECEIPT, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_signal_reaches_only_the_routed_peer() {
        let state = app_state();
        let (caller, callee, bystander) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());
        let (caller_session, mut caller_rx) = connect(&state, "caller", caller);
        let (callee_session, mut callee_rx) = connect(&state, "callee", callee);
        let (bystander_session, mut bystander_rx) = connect(&state, "bystander", bystander);
        for session in [&caller_session, &callee_session, &bystander_session] {
            let frame = subscribe_frame("calls", "/user/queue/call-events");
            assert_eq!(dispatch(&state, session, frame).await, Flow::Continue);
        }

        let offer = json!({
            "type": "offer",
            "call_id": Uuid::now_v7(),
            "caller_id": caller,
            "callee_id": callee,
            "sdp": "v=0"
        });
        assert_eq!(dispatch(&state, &caller_session, call_frame(offer)).await, Flow::Continue);

        let frame = single_message(&mut callee_rx);
        assert_eq!(frame.get("destination"), Some("/user/queue/call-events"));
        let body: Value = serde_json::from_str(&frame.body).unwrap();
        assert_eq!(body["type"], "offer");
        assert_eq!(body["sdp"], "v=0");
        assert_eq!(body["sender_id"], json!(caller));

        assert!(drain(&mut caller_rx).is_empty());
        assert!(drain(&mut bystander_rx).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_signal_is_reported_to_sender() {
        let state = app_state();
        let (caller, callee) = (Uuid::now_v7(), Uuid::now_v7());
        let (caller_session, mut caller_rx) = connect(&state, "caller", caller);
        let (callee_session, mut callee_rx) = connect(&state, "callee", callee);
        dispatch(&state, &caller_session, subscribe_frame("errors", "/user/queue/errors")).await;
        dispatch(&state, &callee_session, subscribe_frame("calls", "/user/queue/call-events")).await;

        // An answer has to come from the callee
        let answer = json!({
            "type": "answer",
            "caller_id": caller,
            "callee_id": callee,
            "sdp": "v=0"
        });
        assert_eq!(dispatch(&state, &caller_session, call_frame(answer)).await, Flow::Continue);

        let frame = single_message(&mut caller_rx);
        assert_eq!(frame.get("destination"), Some("/user/queue/errors"));
        let body: Value = serde_json::from_str(&frame.body).unwrap();
        assert_eq!(body["destination"], "/app/call");
        assert!(body["message"].as_str().unwrap().contains("cannot be sent by this party"));

        assert!(drain(&mut callee_rx).is_empty());
    }

    #[tokio::test]
    async fn test_malformed_signal_keeps_connection_open() {
        let state = app_state();
        let user = Uuid::now_v7();
        let (session, mut rx) = connect(&state, "s1", user);
        dispatch(&state, &session, subscribe_frame("errors", "/user/queue/errors")).await;

        let frame = Frame::new(Command::Send)
            .header("destination", "/app/call")
            .header("receipt", "r-1")
            .body("not json");
        assert_eq!(dispatch(&state, &session, frame).await, Flow::Continue);

        let frame = single_message(&mut rx);
        assert_eq!(frame.get("destination"), Some("/user/queue/errors"));
    }

    // ========================================================================
    // Subscription authorization
    // ========================================================================

    #[tokio::test]
    async fn test_non_member_cannot_subscribe_to_conversation() {
        let user = Uuid::now_v7();
        let mut conversations = MockConversationService::new();
        conversations
            .expect_is_member()
            .withf(move |u, c| *u == user && *c == id())
            .times(1)
            .returning(|_, _| Ok(false));

        let err = authorize_subscription(&conversations, user, &SubscriptionTarget::Conversation(id()))
            .await
            .unwrap_err();
        match err {
            DispatchError::Protocol(message) => assert!(message.starts_with("Not a member")),
            other => panic!("expected a protocol error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_member_may_subscribe_to_conversation() {
        let mut conversations = MockConversationService::new();
        conversations.expect_is_member().times(1).returning(|_, _| Ok(true));

        assert!(
            authorize_subscription(&conversations, Uuid::now_v7(), &SubscriptionTarget::Conversation(id()))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_user_queue_needs_no_membership() {
        let mut conversations = MockConversationService::new();
        conversations.expect_is_member().never();

        let target = SubscriptionTarget::UserQueue("call-events".into());
        assert!(authorize_subscription(&conversations, Uuid::now_v7(), &target).await.is_ok());
    }
}
