//! Message-exchange controller.
//!
//! Owns the conversation log and the single outstanding request. A new send
//! supersedes whatever is in flight: the previous request's token is cancelled
//! and its completion, if it still arrives, is dropped on the floor because its
//! generation no longer matches the pending one.

use crate::error::{ChatError, ErrorReporter, ValidationError, GENERIC_FAILURE_MESSAGE};
use crate::message_log::MessageLog;
use crate::transport::ChatTransport;
use parley_client::TransportError;
use parley_common::ParleyConfig;
use parley_protocol::{ChatResponse, IdGenerator, Message, UuidGenerator};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversationLimits {
    /// Longest accepted input, counted in characters after trimming
    pub max_message_chars: usize,
    pub history_capacity: usize,
}

impl Default for ConversationLimits {
    fn default() -> Self {
        Self {
            max_message_chars: parley_common::DEFAULT_MAX_MESSAGE_CHARS,
            history_capacity: parley_common::DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl From<&ParleyConfig> for ConversationLimits {
    fn from(config: &ParleyConfig) -> Self {
        Self {
            max_message_chars: config.max_message_chars,
            history_capacity: config.history_capacity,
        }
    }
}

/// Read-only view handed to the presentation layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSnapshot {
    pub messages: Vec<Message>,
    pub is_loading: bool,
}

struct PendingRequest {
    generation: u64,
    cancel: CancellationToken,
}

struct ConversationState {
    log: MessageLog,
    pending: Option<PendingRequest>,
    generation: u64,
    closed: bool,
}

impl ConversationState {
    fn is_current(&self, generation: u64) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| pending.generation == generation)
    }

    fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            messages: self.log.snapshot(),
            is_loading: self.pending.is_some(),
        }
    }
}

struct Inner {
    transport: Arc<dyn ChatTransport>,
    ids: Arc<dyn IdGenerator>,
    limits: ConversationLimits,
    state: Mutex<ConversationState>,
    updates: watch::Sender<ConversationSnapshot>,
}

/// Trim `text` and check it against `max_chars`.
pub fn validate_input(text: &str, max_chars: usize) -> Result<&str, ValidationError> {
    let content = text.trim();
    if content.is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = content.chars().count();
    if len > max_chars {
        return Err(ValidationError::TooLong { len, max: max_chars });
    }
    Ok(content)
}

pub struct ConversationController {
    inner: Arc<Inner>,
}

impl ConversationController {
    pub fn new(transport: Arc<dyn ChatTransport>, limits: ConversationLimits) -> Self {
        Self::with_id_generator(transport, Arc::new(UuidGenerator), limits)
    }

    pub fn with_id_generator(
        transport: Arc<dyn ChatTransport>,
        ids: Arc<dyn IdGenerator>,
        limits: ConversationLimits,
    ) -> Self {
        let state = ConversationState {
            log: MessageLog::new(limits.history_capacity),
            pending: None,
            generation: 0,
            closed: false,
        };
        let (updates, _) = watch::channel(state.snapshot());
        Self {
            inner: Arc::new(Inner {
                transport,
                ids,
                limits,
                state: Mutex::new(state),
                updates,
            }),
        }
    }

    /// Run one exchange to completion. Failures end up in the log, never in the return value.
    pub async fn send_message(&self, text: &str) {
        self.inner.send(text).await;
    }

    /// Fire-and-forget form of [`send_message`](Self::send_message).
    pub fn dispatch(&self, text: impl Into<String>) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let text = text.into();
        tokio::spawn(async move { inner.send(&text).await })
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.lock().log.snapshot()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().pending.is_some()
    }

    pub fn snapshot(&self) -> ConversationSnapshot {
        self.inner.lock().snapshot()
    }

    /// Receives a fresh snapshot after every state change
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn limits(&self) -> ConversationLimits {
        self.inner.limits
    }

    /// Cancel the outstanding request, if any, and stop accepting input.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if let Some(pending) = state.pending.take() {
            info!(generation = pending.generation, "cancelling outstanding request on shutdown");
            pending.cancel.cancel();
        }
        self.inner.publish(&state);
    }
}

impl Drop for ConversationController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Clears the pending request if its `send` future is dropped mid-flight
struct InFlight<'a> {
    inner: &'a Inner,
    generation: u64,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.abandon(self.generation);
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ConversationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ConversationState) {
        self.updates.send_replace(state.snapshot());
    }

    fn push_assistant(&self, state: &mut ConversationState, content: impl Into<String>) {
        state
            .log
            .push(Message::assistant(self.ids.generate_id(), content));
    }

    async fn send(&self, text: &str) {
        if self.lock().closed {
            debug!("controller closed, ignoring message");
            return;
        }

        let content = match validate_input(text, self.limits.max_message_chars) {
            Ok(content) => content,
            Err(ValidationError::Empty) => return,
            Err(err) => {
                debug!(%err, "rejecting message");
                let notice = ErrorReporter::format_user_error(&ChatError::from(err));
                if let Some(notice) = notice {
                    let mut state = self.lock();
                    self.push_assistant(&mut state, notice);
                    self.publish(&state);
                }
                return;
            }
        };

        let Some((generation, cancel)) = self.begin_request(content) else {
            return;
        };
        let mut in_flight = InFlight {
            inner: self,
            generation,
            armed: true,
        };
        let outcome = self.transport.send_message(content, cancel).await;
        in_flight.armed = false;
        self.complete(generation, outcome);
    }

    /// The future driving `generation` went away before it completed.
    fn abandon(&self, generation: u64) {
        let mut state = self.lock();
        if !state.is_current(generation) {
            return;
        }
        if let Some(pending) = state.pending.take() {
            debug!(generation, "request future dropped, cancelling");
            pending.cancel.cancel();
        }
        self.publish(&state);
    }

    fn begin_request(&self, content: &str) -> Option<(u64, CancellationToken)> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }
        if let Some(previous) = state.pending.take() {
            debug!(generation = previous.generation, "superseding outstanding request");
            previous.cancel.cancel();
        }

        state.generation += 1;
        let generation = state.generation;
        let cancel = CancellationToken::new();
        state
            .log
            .push(Message::user(self.ids.generate_id(), content));
        state.pending = Some(PendingRequest {
            generation,
            cancel: cancel.clone(),
        });
        self.publish(&state);
        Some((generation, cancel))
    }

    fn complete(&self, generation: u64, outcome: Result<ChatResponse, TransportError>) {
        let mut state = self.lock();
        if !state.is_current(generation) {
            debug!(generation, "discarding completion of superseded request");
            return;
        }
        state.pending = None;

        match outcome {
            Ok(reply) if !reply.response.trim().is_empty() => {
                self.push_assistant(&mut state, reply.response);
            }
            Ok(_) => {
                warn!(generation, "chat api returned an empty reply");
                self.push_assistant(&mut state, GENERIC_FAILURE_MESSAGE);
            }
            Err(err) => {
                let error = ChatError::from(err);
                match ErrorReporter::format_user_error(&error) {
                    Some(text) => {
                        warn!(generation, %error, "chat request failed");
                        self.push_assistant(&mut state, text);
                    }
                    None => debug!(generation, "request cancelled"),
                }
            }
        }
        self.publish(&state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PAYLOAD_TOO_LARGE_MESSAGE, RATE_LIMITED_MESSAGE};
    use crate::transport::EchoTransport;
    use async_trait::async_trait;
    use parley_protocol::Role;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::Duration;

    type Outcome = Result<ChatResponse, TransportError>;

    fn reply(text: &str) -> Outcome {
        Ok(ChatResponse {
            response: text.to_string(),
        })
    }

    fn status(code: u16) -> Outcome {
        Err(TransportError::Status {
            status: code,
            body: String::new(),
        })
    }

    /// Resolves immediately with pre-loaded outcomes, counting calls.
    struct CannedTransport {
        outcomes: Mutex<VecDeque<Outcome>>,
        calls: AtomicUsize,
    }

    impl CannedTransport {
        fn new(outcomes: Vec<Outcome>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatTransport for CannedTransport {
        async fn send_message(&self, _content: &str, _cancel: CancellationToken) -> Outcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| status(500))
        }
    }

    /// Hands every call to the test, which decides when and how it resolves.
    /// It deliberately ignores cancellation so stale completions still arrive.
    struct Call {
        content: String,
        cancel: CancellationToken,
        reply: oneshot::Sender<Outcome>,
    }

    struct ScriptedTransport {
        calls: mpsc::UnboundedSender<Call>,
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn send_message(&self, content: &str, cancel: CancellationToken) -> Outcome {
            let (tx, rx) = oneshot::channel();
            self.calls
                .send(Call {
                    content: content.to_string(),
                    cancel,
                    reply: tx,
                })
                .unwrap();
            rx.await.unwrap_or(Err(TransportError::Cancelled))
        }
    }

    fn scripted() -> (ConversationController, mpsc::UnboundedReceiver<Call>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = ConversationController::new(
            Arc::new(ScriptedTransport { calls: tx }),
            ConversationLimits::default(),
        );
        (controller, rx)
    }

    fn canned(outcomes: Vec<Outcome>) -> (ConversationController, Arc<CannedTransport>) {
        let transport = CannedTransport::new(outcomes);
        let controller = ConversationController::new(transport.clone(), ConversationLimits::default());
        (controller, transport)
    }

    fn contents(controller: &ConversationController) -> Vec<(Role, String)> {
        controller
            .messages()
            .iter()
            .map(|m| (m.role(), m.content().to_string()))
            .collect()
    }

    #[test]
    fn test_validate_input() {
        assert_eq!(validate_input("  hi  ", 10), Ok("hi"));
        assert_eq!(validate_input(" \n\t ", 10), Err(ValidationError::Empty));
        assert_eq!(
            validate_input("abcdefghijk", 10),
            Err(ValidationError::TooLong { len: 11, max: 10 })
        );
        // Multi-byte characters count once each.
        assert_eq!(validate_input("ééééé", 5), Ok("ééééé"));
    }

    #[tokio::test]
    async fn test_starts_empty() {
        let (controller, _) = canned(vec![]);
        assert!(controller.messages().is_empty());
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_blank_input_is_ignored() {
        let (controller, transport) = canned(vec![]);
        for text in ["", "   ", "\n\t  \r\n"] {
            controller.send_message(text).await;
        }
        assert!(controller.messages().is_empty());
        assert!(!controller.is_loading());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_over_length_input_gets_notice() {
        let (controller, transport) = canned(vec![]);
        controller.send_message(&"a".repeat(1001)).await;

        let messages = controller.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role(), Role::Assistant);
        assert!(messages[0].content().contains("too long"));
        assert_eq!(transport.calls(), 0);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_length_is_measured_after_trimming() {
        let (controller, transport) = canned(vec![reply("ok")]);
        let padded = format!("   {}   ", "a".repeat(1000));
        controller.send_message(&padded).await;

        assert_eq!(transport.calls(), 1);
        let messages = controller.messages();
        assert_eq!(messages[0].content(), "a".repeat(1000));
    }

    #[tokio::test]
    async fn test_successful_exchange() {
        let (controller, transport) = canned(vec![reply("Hello from chatbot!")]);
        controller.send_message("Hello!").await;

        assert_eq!(
            contents(&controller),
            vec![
                (Role::User, "Hello!".to_string()),
                (Role::Assistant, "Hello from chatbot!".to_string()),
            ]
        );
        assert_eq!(transport.calls(), 1);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_user_message_is_trimmed() {
        let (controller, _) = canned(vec![reply("pong")]);
        controller.send_message("  ping \n").await;
        assert_eq!(controller.messages()[0].content(), "ping");
    }

    #[tokio::test]
    async fn test_generic_failure_appends_apology() {
        let (controller, _) = canned(vec![Err(TransportError::Timeout { timeout_ms: 30_000 })]);
        controller.send_message("Hello!").await;

        let messages = controller.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role(), Role::Assistant);
        assert_eq!(messages[1].content(), GENERIC_FAILURE_MESSAGE);
        assert!(messages[1].content().contains("error"));
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_classified_failures() {
        let (controller, _) = canned(vec![status(429), status(413), status(502)]);
        controller.send_message("one").await;
        controller.send_message("two").await;
        controller.send_message("three").await;

        let replies: Vec<String> = controller
            .messages()
            .iter()
            .filter(|m| m.role() == Role::Assistant)
            .map(|m| m.content().to_string())
            .collect();
        assert_eq!(
            replies,
            vec![
                RATE_LIMITED_MESSAGE.to_string(),
                PAYLOAD_TOO_LARGE_MESSAGE.to_string(),
                GENERIC_FAILURE_MESSAGE.to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_reply_counts_as_failure() {
        let (controller, _) = canned(vec![reply("  ")]);
        controller.send_message("Hello!").await;
        assert_eq!(controller.messages()[1].content(), GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_loading_spans_the_request() {
        let (controller, mut calls) = scripted();
        assert!(!controller.is_loading());

        let handle = controller.dispatch("Hello!");
        let call = calls.recv().await.unwrap();
        assert_eq!(call.content, "Hello!");
        assert!(controller.is_loading());
        assert_eq!(controller.messages().len(), 1);

        call.reply.send(reply("Hi")).unwrap();
        handle.await.unwrap();
        assert!(!controller.is_loading());
        assert_eq!(controller.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_new_send_supersedes_outstanding_request() {
        let (controller, mut calls) = scripted();

        let first = controller.dispatch("first");
        let first_call = calls.recv().await.unwrap();
        let second = controller.dispatch("second");
        let second_call = calls.recv().await.unwrap();

        assert!(first_call.cancel.is_cancelled());
        assert!(!second_call.cancel.is_cancelled());

        // The stale reply arrives anyway and must not touch the log.
        first_call.reply.send(reply("stale")).unwrap();
        first.await.unwrap();
        assert_eq!(
            contents(&controller),
            vec![
                (Role::User, "first".to_string()),
                (Role::User, "second".to_string()),
            ]
        );
        assert!(controller.is_loading());

        second_call.reply.send(reply("fresh")).unwrap();
        second.await.unwrap();
        assert_eq!(
            contents(&controller),
            vec![
                (Role::User, "first".to_string()),
                (Role::User, "second".to_string()),
                (Role::Assistant, "fresh".to_string()),
            ]
        );
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_stale_failure_arriving_late_is_ignored() {
        let (controller, mut calls) = scripted();

        let first = controller.dispatch("first");
        let first_call = calls.recv().await.unwrap();
        let second = controller.dispatch("second");
        let second_call = calls.recv().await.unwrap();

        second_call.reply.send(reply("fresh")).unwrap();
        second.await.unwrap();
        first_call.reply.send(status(500)).unwrap();
        first.await.unwrap();

        let messages = controller.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content(), "fresh");
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_over_length_input_does_not_cancel_outstanding_request() {
        let (controller, mut calls) = scripted();
        let handle = controller.dispatch("Hello!");
        let call = calls.recv().await.unwrap();

        controller.send_message(&"b".repeat(1001)).await;
        assert!(!call.cancel.is_cancelled());
        assert!(controller.is_loading());

        call.reply.send(reply("Hi")).unwrap();
        handle.await.unwrap();
        assert_eq!(controller.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_outcome_is_silent() {
        let (controller, mut calls) = scripted();
        let handle = controller.dispatch("Hello!");
        let call = calls.recv().await.unwrap();

        call.reply.send(Err(TransportError::Cancelled)).unwrap();
        handle.await.unwrap();
        assert_eq!(controller.messages().len(), 1);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_closes() {
        let (controller, mut calls) = scripted();
        let handle = controller.dispatch("Hello!");
        let call = calls.recv().await.unwrap();

        controller.shutdown();
        assert!(call.cancel.is_cancelled());
        assert!(!controller.is_loading());

        call.reply.send(reply("too late")).unwrap();
        handle.await.unwrap();
        assert_eq!(controller.messages().len(), 1);

        controller.send_message("anyone there?").await;
        assert_eq!(controller.messages().len(), 1);
        assert!(calls.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_drop_cancels_outstanding_request() {
        let (controller, mut calls) = scripted();
        let handle = controller.dispatch("Hello!");
        let call = calls.recv().await.unwrap();

        drop(controller);
        assert!(call.cancel.is_cancelled());
        let _ = call.reply.send(reply("ignored"));
        handle.await.unwrap();
    }

    /// Never answers; only returns once its token is cancelled.
    #[derive(Default)]
    struct StalledTransport {
        token: Mutex<Option<CancellationToken>>,
    }

    #[async_trait]
    impl ChatTransport for StalledTransport {
        async fn send_message(&self, _content: &str, cancel: CancellationToken) -> Outcome {
            *self.token.lock().unwrap() = Some(cancel.clone());
            cancel.cancelled().await;
            Err(TransportError::Cancelled)
        }
    }

    #[tokio::test]
    async fn test_dropped_send_future_clears_loading() {
        let transport = Arc::new(StalledTransport::default());
        let controller =
            ConversationController::new(transport.clone(), ConversationLimits::default());

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), controller.send_message("hi")).await;
        assert!(timed_out.is_err());

        assert!(!controller.is_loading());
        assert!(!controller.snapshot().is_loading);
        let token = transport.token.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
        assert_eq!(controller.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_aborted_dispatch_clears_loading() {
        let transport = Arc::new(StalledTransport::default());
        let controller =
            ConversationController::new(transport.clone(), ConversationLimits::default());
        let mut updates = controller.subscribe();

        let handle = controller.dispatch("hi");
        updates.wait_for(|s| s.is_loading).await.unwrap();
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert!(!controller.is_loading());
        let token = transport.token.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_stale_future_leaves_newer_request_alone() {
        let (controller, mut calls) = scripted();
        let first = controller.dispatch("first");
        let first_call = calls.recv().await.unwrap();
        let second = controller.dispatch("second");
        let second_call = calls.recv().await.unwrap();

        first.abort();
        let _ = first.await;
        assert!(first_call.cancel.is_cancelled());
        assert!(!second_call.cancel.is_cancelled());
        assert!(controller.is_loading());

        second_call.reply.send(reply("done")).unwrap();
        second.await.unwrap();
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_history_is_capped_fifo() {
        let controller =
            ConversationController::new(Arc::new(EchoTransport), ConversationLimits::default());
        for i in 0..51 {
            controller.send_message(&format!("message {i}")).await;
        }

        let messages = controller.messages();
        assert_eq!(messages.len(), 100);
        assert!(messages.iter().all(|m| m.content() != "message 0"));
        assert_eq!(messages[0].content(), "Echo: message 0");
        assert_eq!(messages[99].content(), "Echo: message 50");
    }

    #[tokio::test]
    async fn test_subscribers_see_every_change() {
        let (controller, mut calls) = scripted();
        let mut updates = controller.subscribe();
        assert!(!updates.borrow_and_update().is_loading);

        let handle = controller.dispatch("Hello!");
        let call = calls.recv().await.unwrap();
        updates.changed().await.unwrap();
        {
            let snapshot = updates.borrow_and_update();
            assert!(snapshot.is_loading);
            assert_eq!(snapshot.messages.len(), 1);
        }

        call.reply.send(reply("Hi")).unwrap();
        handle.await.unwrap();
        updates.changed().await.unwrap();
        let snapshot = updates.borrow_and_update();
        assert!(!snapshot.is_loading);
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(*snapshot, controller.snapshot());
    }

    #[tokio::test]
    async fn test_limits_come_from_config() {
        let mut config = ParleyConfig::default();
        config.max_message_chars = 5;
        config.history_capacity = 3;
        let controller = ConversationController::new(Arc::new(EchoTransport), (&config).into());

        controller.send_message("abcdef").await;
        assert!(controller.messages()[0].content().contains("under 5 characters"));

        controller.send_message("abc").await;
        controller.send_message("xyz").await;
        assert_eq!(controller.messages().len(), 3);
    }
}
