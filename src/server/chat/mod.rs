#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::llm::{ChatMessage, ChatModel};
use crate::store::ContextSource;

/// Fixed storefront persona. This is a prompt-level guardrail only; nothing
/// verifies that the model actually declines off-topic queries.
pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are a helpful assistant who is an incredible \
     sales representative for an online appliance parts storefront. You will be speaking to a \
     customer who will be seeking guidance on products and installations. If a query does not \
     pertain to appliance parts, or does not adhere to the context of the conversation, do not \
     answer it. Say \"I can't answer that question, but I'd be happy to help you with any \
     appliance-related concerns.\"";

/// How much prior context each request carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    /// Every request independently retrieves fresh context; nothing persists
    Stateless,
    /// One transcript persists for the process lifetime; context is
    /// retrieved once, on the first query after a clear
    Memory,
}

/// Answers user queries by combining retrieved product context with a chat
/// completion.
///
/// In memory mode there is exactly one transcript shared by every client of
/// the process; the lock serializes appends but does not isolate users, so
/// concurrent conversations interleave.
pub struct ChatEngine {
    mode: ChatMode,
    source: Arc<dyn ContextSource>,
    chat_model: Arc<dyn ChatModel>,
    transcript: Mutex<Vec<ChatMessage>>,
}

impl ChatEngine {
    /// Create an engine with a fresh transcript
    #[inline]
    pub fn new(
        mode: ChatMode,
        source: Arc<dyn ContextSource>,
        chat_model: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            mode,
            source,
            chat_model,
            transcript: Mutex::new(vec![ChatMessage::system(ASSISTANT_SYSTEM_PROMPT)]),
        }
    }

    #[inline]
    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    /// Answer one user query and return the assistant message
    #[inline]
    pub async fn answer(&self, query: &str) -> Result<ChatMessage> {
        match self.mode {
            ChatMode::Stateless => self.answer_stateless(query).await,
            ChatMode::Memory => self.answer_with_memory(query).await,
        }
    }

    async fn answer_stateless(&self, query: &str) -> Result<ChatMessage> {
        let documents = self
            .source
            .retrieve(query, 1)
            .await
            .context("Context retrieval failed")?;
        let context = documents.join(" ");
        debug!("Retrieved {} chars of context", context.len());

        let messages = [
            ChatMessage::system(ASSISTANT_SYSTEM_PROMPT),
            ChatMessage::user(format!("{}\n\n{}", context, query)),
        ];

        let reply = self
            .chat_model
            .complete(&messages)
            .context("Chat completion failed")?;

        Ok(ChatMessage::assistant(reply))
    }

    async fn answer_with_memory(&self, query: &str) -> Result<ChatMessage> {
        let mut transcript = self.transcript.lock().await;

        // A transcript shorter than two messages means no context has been
        // retrieved since the last clear
        if transcript.len() < 2 {
            let documents = self
                .source
                .retrieve(query, 1)
                .await
                .context("Context retrieval failed")?;
            let context = documents.join(" ");
            debug!("Seeding transcript with {} chars of context", context.len());
            transcript.push(ChatMessage::system(context));
        }

        transcript.push(ChatMessage::user(query));

        let reply = self
            .chat_model
            .complete(&transcript)
            .context("Chat completion failed")?;
        transcript.push(ChatMessage::assistant(reply.clone()));

        debug!("Transcript now holds {} messages", transcript.len());
        Ok(ChatMessage::assistant(reply))
    }

    /// Reset the transcript to the system prompt alone
    #[inline]
    pub async fn clear_memory(&self) {
        let mut transcript = self.transcript.lock().await;
        *transcript = vec![ChatMessage::system(ASSISTANT_SYSTEM_PROMPT)];
        info!("Conversation memory cleared");
    }

    /// Current transcript length, including the system prompt
    #[inline]
    pub async fn transcript_len(&self) -> usize {
        self.transcript.lock().await.len()
    }
}
