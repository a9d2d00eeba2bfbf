//! WebSocket Conversation Sessions
//!
//! Each browser connection owns one conversation session. The module is
//! structured into submodules:
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle and dispatches client commands.
//! - `playback`: Streams synthesized audio to the browser and waits for it to be played.

mod playback;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
