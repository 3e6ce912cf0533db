//! STOMP WebSocket Gateway
//!
//! STOMP 1.2 over a WebSocket at `/ws`: frame codec, session registry,
//! destination dispatch and the per-connection task.

pub mod dispatch;
pub mod frame;
pub mod gateway;
pub mod handler;
pub mod session;

pub use frame::Frame;
pub use gateway::{Gateway, Outbound};
pub use handler::ws_handler;
pub use session::SessionState;
