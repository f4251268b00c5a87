//! The typed message stream handed back by a query.
//!
//! [`MessageStream`] implements [`futures::Stream`] over a bounded channel fed
//! by the query's worker task. Closure of the stream is the one completion
//! signal; [`MessageStream::state`] says how the query ended.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout as tokio_timeout;
use tokio_util::sync::CancellationToken;

use crate::config::SessionId;
use crate::protocol::{Message, Role};
use crate::{Error, Result};

/// Capacity of the channel between a query's worker and its consumer.
///
/// One slot is held back for the query's final diagnostic.
pub const CHANNEL_CAPACITY: usize = 100;

/// Lifecycle of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryState {
    /// Waiting for the session and spawning the process.
    Starting,
    /// Reading and translating output.
    Streaming,
    /// Output ended; flushing and stopping the process.
    Draining,
    /// The stream completed (including a reached turn limit).
    Completed,
    /// Spawn failure, error marker, broken pipe or non-zero exit.
    Failed,
    /// The caller cancelled, the deadline passed or the session closed.
    Cancelled,
}

impl QueryState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueryState::Completed | QueryState::Failed | QueryState::Cancelled
        )
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryState::Starting => "starting",
            QueryState::Streaming => "streaming",
            QueryState::Draining => "draining",
            QueryState::Completed => "completed",
            QueryState::Failed => "failed",
            QueryState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// A stream of [`Message`]s from one query.
///
/// # Cancellation
///
/// Dropping a `MessageStream` cancels its query: the worker stops reading and
/// kills the process.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
///
/// let mut stream = session.query(&cancel, "Hello", &config)?;
/// while let Some(msg) = stream.next().await {
///     let msg = msg?;
///     println!("{}: {}", msg.role, msg.text());
/// }
/// println!("query {}", stream.state());
/// ```
pub struct MessageStream {
    session_id: SessionId,
    rx: mpsc::Receiver<Result<Message>>,
    state: watch::Receiver<QueryState>,
    cancel: CancellationToken,
}

impl MessageStream {
    pub(crate) fn new(
        session_id: SessionId,
        rx: mpsc::Receiver<Result<Message>>,
        state: watch::Receiver<QueryState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            rx,
            state,
            cancel,
        }
    }

    /// The session this query runs in.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Current state of the query.
    pub fn state(&self) -> QueryState {
        *self.state.borrow()
    }

    /// Ask the worker to stop. The stream still closes normally afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the query to reach a terminal state.
    ///
    /// Messages still buffered stay readable. A consumer that never reads may
    /// stall the worker on a full channel, so drain first when in doubt.
    pub async fn finished(&mut self) -> QueryState {
        let waited = self.state.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        match waited {
            Ok(state) => state,
            // The worker is gone without reporting; treat it as a failure.
            Err(_) => {
                let last = *self.state.borrow();
                if last.is_terminal() {
                    last
                } else {
                    QueryState::Failed
                }
            }
        }
    }

    /// Collect every message, then the final state.
    ///
    /// A terminal `Err` item (cancellation before any output) is returned as
    /// the error.
    pub async fn collect_all(mut self) -> Result<CollectedResponse> {
        use futures::StreamExt;

        let mut messages = Vec::new();
        while let Some(item) = self.next().await {
            messages.push(item?);
        }
        let state = self.finished().await;

        Ok(CollectedResponse {
            session_id: self.session_id.clone(),
            messages,
            state,
        })
    }

    /// Collect assistant text, joined by newlines.
    ///
    /// Fails with the diagnostic text when the query did not complete.
    pub async fn collect_text(self) -> Result<String> {
        let response = self.collect_all().await?;
        match response.state {
            QueryState::Completed => Ok(response.assistant_text()),
            QueryState::Cancelled => Err(Error::Cancelled),
            _ => Err(Error::stream(
                response
                    .diagnostic()
                    .unwrap_or_else(|| format!("query ended in state {}", response.state)),
            )),
        }
    }
}

impl fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageStream")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Stream for MessageStream {
    type Item = Result<Message>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// All messages of a finished query.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedResponse {
    pub session_id: SessionId,
    pub messages: Vec<Message>,
    pub state: QueryState,
}

impl CollectedResponse {
    /// True when the query reached completion (an empty message list included).
    pub fn is_success(&self) -> bool {
        self.state == QueryState::Completed
    }

    /// Text of the assistant messages, joined by newlines.
    pub fn assistant_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant && !m.content.is_empty())
            .map(Message::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The last system-role message, which carries the diagnostic on failure.
    pub fn diagnostic(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::System)
            .map(Message::text)
    }

    /// Tool results that matched no invocation.
    pub fn unresolved(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.unresolved)
    }
}

/// Run a future with a timeout.
///
/// Returns [`Error::Timeout`] if the future doesn't complete within `duration`.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio_timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_with(
        capacity: usize,
    ) -> (
        mpsc::Sender<Result<Message>>,
        watch::Sender<QueryState>,
        CancellationToken,
        MessageStream,
    ) {
        let (tx, rx) = mpsc::channel(capacity);
        let (state_tx, state_rx) = watch::channel(QueryState::Starting);
        let token = CancellationToken::new();
        let stream = MessageStream::new(SessionId::new("s1"), rx, state_rx, token.clone());
        (tx, state_tx, token, stream)
    }

    #[test]
    fn message_stream_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<MessageStream>();
    }

    #[test]
    fn collected_response_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CollectedResponse>();
        assert_send_sync::<QueryState>();
    }

    #[test]
    fn terminal_states() {
        assert!(QueryState::Completed.is_terminal());
        assert!(QueryState::Failed.is_terminal());
        assert!(QueryState::Cancelled.is_terminal());
        assert!(!QueryState::Starting.is_terminal());
        assert!(!QueryState::Draining.is_terminal());
        assert_eq!(QueryState::Streaming.to_string(), "streaming");
    }

    #[tokio::test]
    async fn collect_all_reports_final_state() {
        let (tx, state_tx, _token, stream) = stream_with(4);
        tx.send(Ok(Message::assistant("Hello"))).await.unwrap();
        state_tx.send(QueryState::Completed).unwrap();
        drop(tx);
        drop(state_tx);

        let response = stream.collect_all().await.unwrap();
        assert_eq!(response.session_id.as_str(), "s1");
        assert_eq!(response.messages, vec![Message::assistant("Hello")]);
        assert!(response.is_success());
        assert_eq!(response.assistant_text(), "Hello");
    }

    #[tokio::test]
    async fn collect_all_returns_terminal_error() {
        let (tx, state_tx, _token, stream) = stream_with(4);
        tx.send(Err(Error::Cancelled)).await.unwrap();
        state_tx.send(QueryState::Cancelled).unwrap();
        drop(tx);

        assert!(matches!(stream.collect_all().await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn collect_text_fails_with_diagnostic() {
        let (tx, state_tx, _token, stream) = stream_with(4);
        tx.send(Ok(Message::system("claude CLI not found"))).await.unwrap();
        state_tx.send(QueryState::Failed).unwrap();
        drop(tx);

        let err = stream.collect_text().await.unwrap_err();
        assert!(err.to_string().contains("claude CLI not found"));
    }

    #[tokio::test]
    async fn finished_without_reporter_is_failed() {
        let (tx, state_tx, _token, mut stream) = stream_with(1);
        drop(tx);
        drop(state_tx);
        assert_eq!(stream.finished().await, QueryState::Failed);
    }

    #[tokio::test]
    async fn dropping_stream_cancels_query() {
        let (_tx, _state_tx, token, stream) = stream_with(1);
        assert!(!token.is_cancelled());
        drop(stream);
        assert!(token.is_cancelled());
    }

    #[test]
    fn collected_response_helpers() {
        let mut unresolved = Message::tool_result(Some("tool_1".into()), "file not found");
        unresolved.unresolved = true;
        let response = CollectedResponse {
            session_id: SessionId::new("s"),
            messages: vec![
                Message::assistant("one"),
                unresolved,
                Message::assistant("two"),
                Message::system("Reached maximum number of turns (2)"),
            ],
            state: QueryState::Completed,
        };
        assert_eq!(response.assistant_text(), "one\ntwo");
        assert_eq!(response.unresolved().count(), 1);
        assert_eq!(
            response.diagnostic().as_deref(),
            Some("Reached maximum number of turns (2)")
        );
    }

    #[tokio::test]
    async fn with_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn with_timeout_expires() {
        let result = with_timeout(Duration::from_millis(1), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, Error>(42)
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn with_timeout_inner_error() {
        let result = with_timeout(Duration::from_secs(1), async {
            Err::<i32, _>(Error::Cancelled)
        })
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
