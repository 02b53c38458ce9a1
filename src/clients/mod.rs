pub mod llm_client;

pub use llm_client::{ChatCompletion, ChatRequest, ChatTransport, OpenAiTransport};
