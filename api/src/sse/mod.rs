mod chat;

pub use chat::process_chat_sse;
pub(crate) use chat::spawn_chat_stream;
