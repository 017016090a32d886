//! Chat module
//!
//! Ephemeral chat rooms over WebSocket: the `{event, type, data}` framing,
//! connection status, the local message log and the session that owns the
//! socket, its heartbeat and bounded reconnection.

pub mod frame;
mod message;
mod session;
mod status;

pub use frame::{ClientFrame, ServerFrame};
pub use message::{ChatMessage, FileRef, MessageKind};
pub use session::{ChatSession, SessionEvent};
pub use status::{status_text, ConnectionStatus};
