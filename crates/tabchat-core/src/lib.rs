pub mod ai;
pub mod config;
pub mod render;
pub mod session;
pub mod state;
pub mod storage;

// Re-export main types for convenience
pub use ai::{parse_reply, ChatError, OllamaClient};
pub use config::Config;
pub use render::{Card, ConversationView, TextDirection};
pub use session::{OutgoingRequest, RequestId, Session, SessionError, DEFAULT_TAB_NAME};
pub use state::{ChatMessage, ChatRole, ChatTarget, Transcript};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore, TabStore};
