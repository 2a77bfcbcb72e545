//! Provider protocol implementations.

pub mod gemini;
pub mod openai_compat;
pub mod pacer;
pub mod retry;

pub use gemini::GeminiClient;
pub use openai_compat::OpenAiCompatClient;
pub use pacer::RequestPacer;
pub use retry::RetryPolicy;
