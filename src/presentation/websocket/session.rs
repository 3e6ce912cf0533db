//! WebSocket Session State

use std::time::{Duration, Instant};

use uuid::Uuid;

/// Grace period on top of twice the heartbeat interval
pub const HEARTBEAT_GRACE: Duration = Duration::from_secs(10);

/// Per-connection state owned by the connection task
#[derive(Debug)]
pub struct SessionState {
    pub session_id: String,
    pub user_id: Uuid,
    pub last_frame: Instant,
}

impl SessionState {
    pub fn new(session_id: String, user_id: Uuid) -> Self {
        Self {
            session_id,
            user_id,
            last_frame: Instant::now(),
        }
    }

    /// Any inbound data, heartbeats included, keeps the session alive
    pub fn touch(&mut self) {
        self.last_frame = Instant::now();
    }

    pub fn is_alive(&self, heartbeat_interval: Duration) -> bool {
        self.last_frame.elapsed() < heartbeat_interval * 2 + HEARTBEAT_GRACE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_session_is_alive() {
        let session = SessionState::new("s1".into(), Uuid::now_v7());
        assert!(session.is_alive(Duration::from_millis(10)));
    }

    #[test]
    fn test_silent_session_expires() {
        let mut session = SessionState::new("s1".into(), Uuid::now_v7());
        session.last_frame = Instant::now() - Duration::from_secs(60);
        assert!(!session.is_alive(Duration::from_secs(10)));

        session.touch();
        assert!(session.is_alive(Duration::from_secs(10)));
    }
}
