mod chat;

pub use chat::ChatMessage;
pub use chat::ChatRequest;
pub use chat::ChatRequestBuilder;
