use std::sync::Arc;

use crate::chat::ChatService;
use crate::feedback::DurableStore;
use crate::interaction::InteractionStore;
use crate::llm::LlmClient;
use crate::toolserver::ToolServerClient;
use crate::transcribe::Transcriber;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub interactions: InteractionStore,
    pub durable: DurableStore,
    pub transcriber: Transcriber,
    pub tool_server: ToolServerClient,
    pub llm: LlmClient,
}
