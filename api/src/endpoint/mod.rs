mod chat;

pub use chat::ChatClient;
pub use chat::StreamHandle;
