use super::*;
use crate::llm::Role;
use async_trait::async_trait;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fake retrieval source that counts how often it is queried
struct CountingSource {
    documents: Vec<String>,
    calls: AtomicUsize,
}

impl CountingSource {
    fn new(documents: &[&str]) -> Self {
        Self {
            documents: documents.iter().map(|d| d.to_string()).collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextSource for CountingSource {
    async fn retrieve(&self, _query: &str, top_n: usize) -> anyhow::Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.documents.iter().take(top_n).cloned().collect())
    }
}

/// Fake chat model that records the last message list it was handed
struct RecordingChat {
    reply: String,
    last_messages: StdMutex<Vec<ChatMessage>>,
}

impl RecordingChat {
    fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            last_messages: StdMutex::new(Vec::new()),
        }
    }

    fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages
            .lock()
            .expect("lock should not be poisoned")
            .clone()
    }
}

impl ChatModel for RecordingChat {
    fn complete(&self, messages: &[ChatMessage]) -> anyhow::Result<String> {
        *self
            .last_messages
            .lock()
            .expect("lock should not be poisoned") = messages.to_vec();
        Ok(self.reply.clone())
    }
}

fn stateless_engine(
    source: Arc<CountingSource>,
    chat: Arc<RecordingChat>,
) -> ChatEngine {
    ChatEngine::new(ChatMode::Stateless, source, chat)
}

fn memory_engine(source: Arc<CountingSource>, chat: Arc<RecordingChat>) -> ChatEngine {
    ChatEngine::new(ChatMode::Memory, source, chat)
}

#[tokio::test]
async fn stateless_retrieves_once_per_request() {
    let source = Arc::new(CountingSource::new(&["Water filter for fridges."]));
    let chat = Arc::new(RecordingChat::new("Happy to help."));
    let engine = stateless_engine(Arc::clone(&source), Arc::clone(&chat));

    for _ in 0..3 {
        let reply = engine.answer("which filter?").await.expect("answer should succeed");
        assert_eq!(reply, ChatMessage::assistant("Happy to help."));
    }

    assert_eq!(source.calls(), 3);
    // Nothing persists between stateless requests
    assert_eq!(engine.transcript_len().await, 1);
}

#[tokio::test]
async fn stateless_sends_context_and_query_as_one_exchange() {
    let source = Arc::new(CountingSource::new(&["Ice maker kit, fits 8 models."]));
    let chat = Arc::new(RecordingChat::new("It fits."));
    let engine = stateless_engine(Arc::clone(&source), Arc::clone(&chat));

    engine.answer("does it fit mine?").await.expect("answer should succeed");

    let messages = chat.last_messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(
        messages[1].content,
        "Ice maker kit, fits 8 models.\n\ndoes it fit mine?"
    );
}

#[tokio::test]
async fn memory_transcript_grows_by_the_book() {
    let source = Arc::new(CountingSource::new(&["Door gasket, universal."]));
    let chat = Arc::new(RecordingChat::new("Sure thing."));
    let engine = memory_engine(Arc::clone(&source), Arc::clone(&chat));

    // FRESH: only the system prompt
    assert_eq!(engine.transcript_len().await, 1);

    // First query seeds context: system, context, user, assistant
    engine.answer("what gasket?").await.expect("answer should succeed");
    assert_eq!(engine.transcript_len().await, 4);

    // Every further query adds exactly a user and an assistant message
    engine.answer("is it in stock?").await.expect("answer should succeed");
    assert_eq!(engine.transcript_len().await, 6);
    engine.answer("how much?").await.expect("answer should succeed");
    assert_eq!(engine.transcript_len().await, 8);

    // Context was retrieved once, on the first query only
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn memory_sends_the_whole_transcript() {
    let source = Arc::new(CountingSource::new(&["Heating element."]));
    let chat = Arc::new(RecordingChat::new("Noted."));
    let engine = memory_engine(Arc::clone(&source), Arc::clone(&chat));

    engine.answer("first").await.expect("answer should succeed");
    engine.answer("second").await.expect("answer should succeed");

    let messages = chat.last_messages();
    // system, context, first user, first assistant, second user
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0], ChatMessage::system(ASSISTANT_SYSTEM_PROMPT));
    assert_eq!(messages[1], ChatMessage::system("Heating element."));
    assert_eq!(messages[2], ChatMessage::user("first"));
    assert_eq!(messages[3], ChatMessage::assistant("Noted."));
    assert_eq!(messages[4], ChatMessage::user("second"));
}

#[tokio::test]
async fn clear_resets_to_system_prompt_and_reseeds() {
    let source = Arc::new(CountingSource::new(&["Spark module."]));
    let chat = Arc::new(RecordingChat::new("Ok."));
    let engine = memory_engine(Arc::clone(&source), Arc::clone(&chat));

    engine.answer("hello").await.expect("answer should succeed");
    assert_eq!(engine.transcript_len().await, 4);

    engine.clear_memory().await;
    assert_eq!(engine.transcript_len().await, 1);

    // The next query after a clear retrieves context again
    engine.answer("hello again").await.expect("answer should succeed");
    assert_eq!(engine.transcript_len().await, 4);
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn empty_retrieval_still_answers() {
    let source = Arc::new(CountingSource::new(&[]));
    let chat = Arc::new(RecordingChat::new("No context needed."));
    let engine = stateless_engine(Arc::clone(&source), Arc::clone(&chat));

    let reply = engine.answer("anything?").await.expect("answer should succeed");
    assert_eq!(reply.content, "No context needed.");

    let messages = chat.last_messages();
    assert_eq!(messages[1].content, "\n\nanything?");
}
