//! Interactive chat sessions.
//!
//! The whole conversation is replayed to `/api/chat` on every turn. History
//! lives in memory only and is gone when the session ends.

use std::future::Future;
use std::io::Write;

use tokio::io::{AsyncBufRead, Lines};
use tracing::{debug, info};

use crate::client::OllamaClient;
use crate::error::Result;
use crate::input;
use crate::protocol::{ChatMessage, ChatRequest, Endpoint, Options, Role};
use crate::render::{Answer, Renderer};

/// Role-tagged conversation entries.
///
/// Holds exactly one system entry, first, followed by user and assistant
/// entries alternating from a user entry.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new(system: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::new(Role::System, system)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Completed user/assistant exchanges.
    pub fn exchanges(&self) -> usize {
        (self.messages.len() - 1) / 2
    }

    fn awaiting_reply(&self) -> bool {
        self.messages.last().map(|m| m.role) == Some(Role::User)
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        debug_assert!(!self.awaiting_reply(), "two user entries in a row");
        self.messages.push(ChatMessage::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        debug_assert!(self.awaiting_reply(), "assistant entry without a user entry");
        self.messages.push(ChatMessage::new(Role::Assistant, content));
    }

    /// Drop a user entry that never got an answer.
    fn discard_unanswered(&mut self) {
        if self.awaiting_reply() {
            self.messages.pop();
        }
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Ctrl-C while waiting for input.
    Interrupted,
    /// Standard input was closed.
    EndOfInput,
}

/// A chat with one model.
pub struct ChatSession<'a, W: Write> {
    client: &'a OllamaClient,
    model: String,
    options: Options,
    history: ConversationHistory,
    renderer: Renderer<W>,
}

impl<'a, W: Write> ChatSession<'a, W> {
    pub fn new(
        client: &'a OllamaClient,
        model: String,
        options: Options,
        system: String,
        renderer: Renderer<W>,
    ) -> Self {
        Self {
            client,
            model,
            options,
            history: ConversationHistory::new(system),
            renderer,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Send one user turn and render the reply.
    ///
    /// On failure the user turn is taken back out of the history.
    pub async fn send(&mut self, prompt: String) -> Result<Answer> {
        self.history.push_user(prompt);
        match self.exchange().await {
            Ok(answer) => {
                self.history.push_assistant(answer.text.clone());
                debug!("Conversation now has {} exchanges", self.history.exchanges());
                Ok(answer)
            }
            Err(e) => {
                self.history.discard_unanswered();
                Err(e)
            }
        }
    }

    async fn exchange(&mut self) -> Result<Answer> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: self.history.messages(),
            stream: true,
            options: self.options,
        };
        let records = self.client.chat(&request).await?;
        self.renderer.render(records, Endpoint::Chat).await
    }

    /// Run the read/send loop until `interrupt` fires or input ends.
    ///
    /// `first` is sent right away when given. The interrupt is only watched
    /// while waiting for input; a request in flight runs to completion.
    pub async fn run<R, I>(
        &mut self,
        first: Option<String>,
        input: &mut Lines<R>,
        interrupt: I,
    ) -> Result<SessionEnd>
    where
        R: AsyncBufRead + Unpin,
        I: Future<Output = ()>,
    {
        self.greet()?;
        let mut interrupt = std::pin::pin!(interrupt);
        let mut pending = first;

        loop {
            let prompt = match pending.take() {
                Some(prompt) => prompt,
                None => {
                    self.renderer.input_marker()?;
                    tokio::select! {
                        biased;
                        _ = &mut interrupt => {
                            info!("Interrupted, ending chat session");
                            writeln!(self.renderer.out())?;
                            return Ok(SessionEnd::Interrupted);
                        }
                        turn = input::read_turn(input) => match turn? {
                            Some(turn) => turn,
                            None => return Ok(SessionEnd::EndOfInput),
                        },
                    }
                }
            };

            if prompt.trim().is_empty() {
                continue;
            }
            self.send(prompt).await?;
        }
    }

    fn greet(&mut self) -> Result<()> {
        let notice = format!(
            "Chatting with {}. End a message with a line holding only '{}'; Ctrl-C quits.",
            self.model,
            input::SENTINEL
        );
        self.renderer.notice(&notice)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientConfig, RenderMode};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const REPLY: &str = concat!(
        "{\"message\":{\"role\":\"assistant\",\"content\":\"ok\"},\"done\":false}\n",
        "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"eval_count\":4,\"eval_duration\":1000000000}\n",
    );

    fn session<'a>(client: &'a OllamaClient) -> ChatSession<'a, Vec<u8>> {
        let renderer = Renderer::new(Vec::new(), RenderMode::Raw, false, Duration::ZERO);
        ChatSession::new(
            client,
            "llama3.2".to_string(),
            Options::default(),
            "be terse".to_string(),
            renderer,
        )
    }

    #[test]
    fn test_history_starts_with_system() {
        let mut history = ConversationHistory::new("sys");
        assert_eq!(history.messages().len(), 1);
        assert_eq!(history.exchanges(), 0);

        history.push_user("hi");
        history.discard_unanswered();
        assert_eq!(history.messages(), &[ChatMessage::new(Role::System, "sys")]);

        history.push_user("hi");
        history.push_assistant("hello");
        history.discard_unanswered();
        assert_eq!(history.exchanges(), 1);
    }

    #[tokio::test]
    async fn test_history_after_several_turns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REPLY))
            .expect(3)
            .mount(&server)
            .await;

        let client = OllamaClient::new(&ClientConfig { host: server.uri() }).unwrap();
        let mut chat = session(&client);
        let mut lines = BufReader::new("second\nline\n.\n.\nthird\n".as_bytes()).lines();

        let end = chat
            .run(Some("first".to_string()), &mut lines, std::future::pending())
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::EndOfInput);

        let messages = chat.history().messages();
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant,
            ]
        );
        assert_eq!(messages[0].content, "be terse");
        assert_eq!(messages[1].content, "first");
        assert_eq!(messages[3].content, "second\nline");
        assert_eq!(messages[5].content, "third");
        assert!(messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .all(|m| m.content == "ok"));

        // Each request replays the whole history so far.
        let requests = server.received_requests().await.unwrap();
        let sent: Vec<usize> = requests
            .iter()
            .map(|r| {
                let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
                assert_eq!(body["messages"][0]["role"], "system");
                body["messages"].as_array().unwrap().len()
            })
            .collect();
        assert_eq!(sent, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_failed_turn_is_rolled_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("out of memory"))
            .mount(&server)
            .await;

        let client = OllamaClient::new(&ClientConfig { host: server.uri() }).unwrap();
        let mut chat = session(&client);

        let err = chat.send("hello".to_string()).await.unwrap_err();
        assert!(err.is_connectivity());
        assert_eq!(chat.history().messages().len(), 1);
        assert_eq!(chat.history().messages()[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_interrupt_while_waiting_ends_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REPLY))
            .expect(0)
            .mount(&server)
            .await;

        let client = OllamaClient::new(&ClientConfig { host: server.uri() }).unwrap();
        let mut chat = session(&client);
        // Input stays open and silent, as a terminal would.
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();

        let end = chat
            .run(None, &mut lines, std::future::ready(()))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Interrupted);
        assert_eq!(chat.history().messages().len(), 1);
    }

    #[tokio::test]
    async fn test_interrupt_after_first_turn_keeps_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string(REPLY))
            .expect(1)
            .mount(&server)
            .await;

        let client = OllamaClient::new(&ClientConfig { host: server.uri() }).unwrap();
        let mut chat = session(&client);
        let (_writer, reader) = tokio::io::duplex(64);
        let mut lines = BufReader::new(reader).lines();

        let end = chat
            .run(Some("first".to_string()), &mut lines, std::future::ready(()))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Interrupted);
        assert_eq!(chat.history().exchanges(), 1);
        assert_eq!(chat.history().messages()[1].content, "first");
    }
}
