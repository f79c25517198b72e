pub mod http_provider;
pub mod provider;
pub mod router;

pub use http_provider::HttpChatProvider;
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role, ToolCall, ToolDefinition};
pub use router::{ProviderRouter, ProviderSlot};
