pub mod ollama;

pub use ollama::{parse_reply, ChatError, OllamaClient};
