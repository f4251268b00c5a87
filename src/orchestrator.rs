//! Query orchestration: from a prompt to a stream of typed messages.
//!
//! Each query runs on its own tokio task:
//!
//! ```text
//! Starting ──▶ Streaming ──▶ Draining ──▶ Completed
//!     │            │             │
//!     └────────────┴─────────────┴──────▶ Failed | Cancelled
//! ```
//!
//! - `Starting`: wait for the session's slot, build the command, launch.
//! - `Streaming`: read lines, parse, correlate, translate, send.
//! - `Draining`: stop the process if it's still running and check its exit.
//!
//! The channel closes once the terminal state is published. On every failure
//! path the last message is a system-role diagnostic. One channel slot is
//! reserved for that final item when the query starts, so a consumer that
//! stopped reading still finds it.

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, Model, SessionId};
use crate::process::{CommandSpec, Launcher, ProcessExit, ProcessHandle};
use crate::protocol::{Content, Message};
use crate::registry::SessionRegistry;
use crate::session::{Session, SessionSlot};
use crate::stream::{
    classify, CollectedResponse, Correlated, LineKind, MessageStream, QueryState, StreamEvent,
    StreamParser, CHANNEL_CAPACITY,
};
use crate::{Error, Result};

/// How long a process that closed its output may take to exit.
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Entry point for callers that think in prompts rather than sessions.
///
/// The orchestrator resolves the session named by the config's session id
/// (creating it on first use, or generating an id when none is set) and runs
/// the query there.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use claude_conduit::{ClientConfig, QueryOrchestrator, SessionRegistry};
/// use tokio_util::sync::CancellationToken;
///
/// let orchestrator = QueryOrchestrator::new(Arc::new(SessionRegistry::with_default_launcher()));
/// let config = ClientConfig::builder().session_id("docs").build()?;
/// let response = orchestrator
///     .query_collect(&CancellationToken::new(), "Explain lib.rs", &config)
///     .await?;
/// println!("{}", response.assistant_text());
/// ```
#[derive(Debug, Clone)]
pub struct QueryOrchestrator {
    registry: Arc<SessionRegistry>,
}

impl QueryOrchestrator {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The session `config` names, created with `config`'s defaults if absent.
    pub fn session_for(&self, config: &ClientConfig) -> Result<Arc<Session>> {
        let id = config
            .session_id()
            .cloned()
            .unwrap_or_else(SessionId::generate);
        self.registry.get_or_create_with(id, config)
    }

    /// Start a query. See [`Session::query`] for the failure contract.
    pub fn query(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        config: &ClientConfig,
    ) -> Result<MessageStream> {
        self.session_for(config)?.query(cancel, prompt, config)
    }

    /// Run a query to completion and collect its messages.
    pub async fn query_collect(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
        config: &ClientConfig,
    ) -> Result<CollectedResponse> {
        self.query(cancel, prompt, config)?.collect_all().await
    }
}

/// Everything a query worker needs, detached from the `Session` borrow.
pub(crate) struct QueryJob {
    pub(crate) session_id: SessionId,
    pub(crate) working_dir: PathBuf,
    pub(crate) model: Option<Model>,
    pub(crate) config: ClientConfig,
    pub(crate) prompt: String,
    pub(crate) launcher: Arc<dyn Launcher>,
    pub(crate) slot: Arc<Mutex<SessionSlot>>,
    pub(crate) active_pid: Arc<StdMutex<Option<u32>>>,
    pub(crate) caller: CancellationToken,
    pub(crate) session_closed: CancellationToken,
}

/// Spawn the worker for `job` and hand back the consumer's end.
pub(crate) fn start_query(job: QueryJob) -> MessageStream {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let terminal = tx.clone().try_reserve_owned().ok();
    let (state_tx, state_rx) = watch::channel(QueryState::Starting);
    let dropped = CancellationToken::new();
    let stream = MessageStream::new(job.session_id.clone(), rx, state_rx, dropped.clone());

    let deadline = job.config.timeout().map(|t| (Instant::now() + t, t));
    let worker = Worker {
        stops: Stops {
            caller: job.caller.clone(),
            session_closed: job.session_closed.clone(),
            dropped,
            deadline,
        },
        job,
        tx,
        terminal,
        state: state_tx,
        delivered: false,
    };
    tokio::spawn(worker.run());
    stream
}

/// Why a query stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Caller,
    SessionClosed,
    StreamDropped,
    Deadline(Duration),
}

impl Stop {
    fn error(self) -> Error {
        match self {
            Stop::Deadline(d) => Error::Timeout(d),
            _ => Error::Cancelled,
        }
    }

    fn describe(self) -> String {
        match self {
            Stop::Caller | Stop::StreamDropped => "Query cancelled".to_string(),
            Stop::SessionClosed => "Query cancelled: session closed".to_string(),
            Stop::Deadline(d) => format!("Query timed out after {d:?}"),
        }
    }
}

/// The signals that end a query early.
struct Stops {
    caller: CancellationToken,
    session_closed: CancellationToken,
    dropped: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl Stops {
    async fn wait(&self) -> Stop {
        let deadline = async {
            match self.deadline {
                Some((at, after)) => {
                    tokio::time::sleep_until(at).await;
                    after
                }
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = self.caller.cancelled() => Stop::Caller,
            _ = self.session_closed.cancelled() => Stop::SessionClosed,
            _ = self.dropped.cancelled() => Stop::StreamDropped,
            after = deadline => Stop::Deadline(after),
        }
    }
}

/// How the streaming phase ended.
enum Ending {
    /// `[DONE]` or end of output.
    Complete { eof: bool },
    /// `enforced` when the worker's own count ended the stream rather than
    /// the CLI's marker.
    TurnLimit { enforced: bool },
    CliError(String),
    Broken(Error),
    Stopped(Stop),
}

struct Worker {
    job: QueryJob,
    stops: Stops,
    tx: mpsc::Sender<Result<Message>>,
    /// Capacity held back for the last item of the query.
    terminal: Option<mpsc::OwnedPermit<Result<Message>>>,
    state: watch::Sender<QueryState>,
    delivered: bool,
}

impl Worker {
    async fn run(mut self) {
        // Starting: one query per session at a time.
        let slot = Arc::clone(&self.job.slot);
        let mut slot = tokio::select! {
            biased;
            stop = self.stops.wait() => {
                self.finish_stopped(stop);
                return;
            }
            guard = slot.lock_owned() => guard,
        };

        slot.correlator.reset();
        slot.correlator.set_observer(self.job.config.tool_observer().cloned());

        let resume = slot.launches > 0;
        let config = self.job.config.for_session(
            &self.job.session_id,
            resume,
            self.job.model.as_ref(),
            &self.job.working_dir,
        );
        let spec = match CommandSpec::for_prompt(&config, &self.job.prompt) {
            Ok(spec) => spec,
            Err(e) => {
                self.finish_failed(format!("Invalid configuration: {e}"));
                return;
            }
        };

        let launched = tokio::select! {
            biased;
            stop = self.stops.wait() => {
                self.finish_stopped(stop);
                return;
            }
            launched = self.job.launcher.launch(&spec) => launched,
        };
        let mut process = match launched {
            Ok(process) => process,
            Err(e) => {
                tracing::debug!(session_id = %self.job.session_id, error = %e, "launch failed");
                self.finish_failed(spawn_diagnostic(&e));
                return;
            }
        };
        slot.launches += 1;
        self.set_active_pid(process.pid());
        self.transition(QueryState::Streaming);

        let ending = self.stream(process.as_mut(), &mut slot).await;

        self.transition(QueryState::Draining);
        let exit = self.drain(process.as_mut(), &ending).await;
        self.set_active_pid(None);
        drop(slot);

        match ending {
            Ending::Complete { .. } => match exit {
                Some(exit) if !exit.success => {
                    let tail = process.stderr_tail();
                    self.finish_failed(exit_diagnostic(exit, &tail));
                }
                _ => self.finish(QueryState::Completed),
            },
            Ending::TurnLimit { enforced } => {
                let text = if enforced {
                    format!("Reached maximum number of turns ({})", config.max_turns())
                } else {
                    "The Claude CLI reported its turn limit".to_string()
                };
                self.report(Ok(Message::system(text)));
                self.finish(QueryState::Completed);
            }
            Ending::CliError(message) => {
                self.finish_failed(format!("Claude CLI reported an error: {message}"));
            }
            Ending::Broken(e) => {
                self.finish_failed(format!("Lost the Claude CLI output stream: {e}"));
            }
            Ending::Stopped(stop) => self.finish_stopped(stop),
        }
    }

    /// Read, parse, correlate and deliver until the stream ends.
    async fn stream(&mut self, process: &mut dyn ProcessHandle, slot: &mut SessionSlot) -> Ending {
        let mut parser = StreamParser::new();
        let max_turns = self.job.config.max_turns();
        let mut user_turns = 0u32;
        let mut enforced = false;

        loop {
            let line = tokio::select! {
                biased;
                stop = self.stops.wait() => return Ending::Stopped(stop),
                line = process.next_line() => line,
            };

            let (events, eof) = match line {
                Ok(Some(line)) => {
                    tracing::trace!(session_id = %self.job.session_id, %line, "cli output");
                    let is_user = classify(&line).map(|m| m.kind()) == Some(LineKind::User);
                    if is_user {
                        user_turns += 1;
                    }
                    if max_turns > 0 && user_turns > max_turns {
                        enforced = true;
                        tracing::debug!(
                            session_id = %self.job.session_id,
                            max_turns,
                            "turn limit reached, stopping stream"
                        );
                        (parser.force_turn_limit(), false)
                    } else {
                        (parser.feed(&line), false)
                    }
                }
                Ok(None) => (parser.finish(), true),
                Err(e) => {
                    // Keep what was already parsed, but not the completion.
                    let events = parser.finish();
                    let kept = events.into_iter().filter(|e| !e.is_terminal()).collect();
                    if let Err(stop) = self.deliver(kept, slot).await {
                        return Ending::Stopped(stop);
                    }
                    return Ending::Broken(e);
                }
            };

            match self.deliver(events, slot).await {
                Err(stop) => return Ending::Stopped(stop),
                Ok(Some(StreamEvent::TurnLimitReached)) => {
                    return Ending::TurnLimit { enforced }
                }
                Ok(Some(StreamEvent::StreamError { message })) => {
                    return Ending::CliError(message)
                }
                Ok(Some(_)) => return Ending::Complete { eof },
                Ok(None) => {}
            }
        }
    }

    /// Send non-terminal events in order; return the terminal one, if any.
    async fn deliver(
        &mut self,
        events: Vec<StreamEvent>,
        slot: &mut SessionSlot,
    ) -> std::result::Result<Option<StreamEvent>, Stop> {
        for event in events {
            if event.is_terminal() {
                return Ok(Some(event));
            }
            if let Some(message) = translate(slot.correlator.correlate(event)) {
                self.send(message).await?;
            }
        }
        Ok(None)
    }

    /// Stop the process. After end of output, give it a moment to exit so
    /// the status can be checked.
    async fn drain(&mut self, process: &mut dyn ProcessHandle, ending: &Ending) -> Option<ProcessExit> {
        let pid = process.pid();
        if let Ending::Complete { eof: true } = ending {
            match tokio::time::timeout(EXIT_GRACE, process.wait()).await {
                Ok(Ok(exit)) => return Some(exit),
                Ok(Err(e)) => {
                    tracing::debug!(pid = ?pid, error = %e, "waiting for cli failed");
                    return None;
                }
                Err(_) => tracing::debug!(pid = ?pid, "cli still running after end of output"),
            }
        }

        let running = matches!(ending, Ending::Stopped(_)) || process.is_running();
        if running {
            if let Err(e) = process.kill().await {
                tracing::warn!(pid = ?pid, error = %e, "failed to kill cli");
            }
        }
        None
    }

    async fn send(&mut self, message: Message) -> std::result::Result<(), Stop> {
        tokio::select! {
            biased;
            stop = self.stops.wait() => Err(stop),
            sent = self.tx.send(Ok(message)) => match sent {
                Ok(()) => {
                    self.delivered = true;
                    Ok(())
                }
                Err(_) => Err(Stop::StreamDropped),
            },
        }
    }

    fn transition(&self, state: QueryState) {
        tracing::debug!(session_id = %self.job.session_id, %state, "query state");
        self.state.send_replace(state);
    }

    fn finish(&self, state: QueryState) {
        self.transition(state);
    }

    fn finish_failed(&mut self, diagnostic: String) {
        tracing::debug!(session_id = %self.job.session_id, %diagnostic, "query failed");
        self.report(Ok(Message::system(diagnostic)));
        self.finish(QueryState::Failed);
    }

    fn finish_stopped(&mut self, stop: Stop) {
        tracing::debug!(session_id = %self.job.session_id, ?stop, "query stopped");
        let item = if self.delivered {
            Ok(Message::system(stop.describe()))
        } else {
            Err(stop.error())
        };
        self.report(item);
        self.finish(QueryState::Cancelled);
    }

    /// Queue the query's last item in the reserved slot. Never blocks: the
    /// consumer may be gone or not reading.
    fn report(&mut self, item: Result<Message>) {
        match self.terminal.take() {
            Some(permit) => {
                permit.send(item);
            }
            None => {
                let _ = self.tx.try_send(item);
            }
        }
    }

    fn set_active_pid(&self, pid: Option<u32>) {
        *self
            .job
            .active_pid
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = pid;
    }
}

/// A correlated event as a caller-facing message.
fn translate(correlated: Correlated) -> Option<Message> {
    match correlated {
        Correlated::Event(StreamEvent::TextDelta { role, text }) => Some(Message {
            role,
            content: Content::Text(text),
            ..Message::assistant("")
        }),
        Correlated::ToolCall(call) => Some(Message::tool_call(call)),
        Correlated::ToolResult {
            tool_call_id,
            content,
            is_error,
            resolved,
        } => {
            let mut message = Message::tool_result(Some(tool_call_id), content);
            message.is_error = is_error;
            message.unresolved = !resolved;
            Some(message)
        }
        Correlated::Event(_) => None,
    }
}

fn spawn_diagnostic(error: &Error) -> String {
    match error {
        Error::CliNotFound { searched } => format!(
            "Claude CLI not found (tried `{searched}`). Install it or set CLAUDE_CLI_PATH."
        ),
        other => format!("Failed to start the Claude CLI: {other}"),
    }
}

fn exit_diagnostic(exit: ProcessExit, stderr_tail: &str) -> String {
    let status = match exit.code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    };
    if stderr_tail.is_empty() {
        format!("Claude CLI terminated with {status}")
    } else {
        format!("Claude CLI terminated with {status}: {stderr_tail}")
    }
}
