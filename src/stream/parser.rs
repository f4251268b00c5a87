//! Line-oriented parser for the CLI's text output.
//!
//! The grammar is a table of [`Rule`]s, each a matcher paired with a handler.
//! [`classify`] evaluates the table top to bottom and keeps the longest
//! matching marker (ties go to the earlier rule). Lines that match no rule are
//! continuation lines and are appended to the open block.
//!
//! ```text
//!            text marker            tool marker
//!   Idle ────────────────▶ InText ────────────────▶ InTool
//!    ▲  ◀── result line ──   │                        │
//!    └───────────────────────┴─ next marker flushes ──┘
//!
//!   turn-limit / error / [DONE] / end of input ──▶ flush ──▶ Done
//! ```
//!
//! Text is buffered until the next boundary so one logical message is never
//! split into fragments. A tool block closes as soon as its payload is
//! complete: a JSON object once its closing brace arrives, plain text at the
//! end of its line. Whatever follows is assistant text.

use std::fmt;
use std::mem;

use serde_json::{Map, Value};

use super::events::StreamEvent;
use crate::protocol::{Content, Role};

/// What a marker line introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    Assistant,
    User,
    System,
    Tool,
    Result,
    TurnLimit,
    Error,
    Complete,
}

/// How a rule recognises its lines.
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// The line starts with this text.
    Prefix(&'static str),
    /// The whole line, ignoring surrounding whitespace, is this text.
    Exact(&'static str),
}

impl Matcher {
    /// Length of the matched marker, if the line matches.
    fn matches(&self, line: &str) -> Option<usize> {
        match self {
            Matcher::Prefix(p) => line.starts_with(p).then_some(p.len()),
            Matcher::Exact(e) => (line.trim() == *e).then_some(e.len()),
        }
    }
}

type Handler = fn(&mut StreamParser, &str, &mut Vec<StreamEvent>);

/// One grammar rule: a matcher and the handler run for matching lines.
pub struct Rule {
    pub name: &'static str,
    pub kind: LineKind,
    pub matcher: Matcher,
    handler: Handler,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

/// The grammar, in evaluation order.
#[rustfmt::skip]
pub const RULES: &[Rule] = &[
    Rule { name: "assistant", kind: LineKind::Assistant, matcher: Matcher::Prefix("Claude:"), handler: StreamParser::open_assistant },
    Rule { name: "assistant", kind: LineKind::Assistant, matcher: Matcher::Prefix("Assistant:"), handler: StreamParser::open_assistant },
    Rule { name: "user", kind: LineKind::User, matcher: Matcher::Prefix("Human:"), handler: StreamParser::open_user },
    Rule { name: "user", kind: LineKind::User, matcher: Matcher::Prefix("User:"), handler: StreamParser::open_user },
    Rule { name: "system", kind: LineKind::System, matcher: Matcher::Prefix("System:"), handler: StreamParser::open_system },
    Rule { name: "tool", kind: LineKind::Tool, matcher: Matcher::Prefix("Tool:"), handler: StreamParser::open_tool },
    Rule { name: "tool", kind: LineKind::Tool, matcher: Matcher::Prefix("Tool use:"), handler: StreamParser::open_tool },
    Rule { name: "result", kind: LineKind::Result, matcher: Matcher::Prefix("Result:"), handler: StreamParser::emit_result },
    Rule { name: "result", kind: LineKind::Result, matcher: Matcher::Prefix("Tool result:"), handler: StreamParser::emit_result },
    Rule { name: "turn limit", kind: LineKind::TurnLimit, matcher: Matcher::Prefix("Max turns reached"), handler: StreamParser::end_turn_limit },
    Rule { name: "turn limit", kind: LineKind::TurnLimit, matcher: Matcher::Prefix("Turn limit reached"), handler: StreamParser::end_turn_limit },
    Rule { name: "turn limit", kind: LineKind::TurnLimit, matcher: Matcher::Prefix("Reached max turns"), handler: StreamParser::end_turn_limit },
    Rule { name: "error", kind: LineKind::Error, matcher: Matcher::Prefix("API Error:"), handler: StreamParser::end_error },
    Rule { name: "error", kind: LineKind::Error, matcher: Matcher::Prefix("Fatal error:"), handler: StreamParser::end_error },
    Rule { name: "complete", kind: LineKind::Complete, matcher: Matcher::Exact("[DONE]"), handler: StreamParser::end_complete },
];

/// A marker line recognised by [`classify`].
#[derive(Debug, Clone, Copy)]
pub struct LineMatch<'a> {
    pub rule: &'static Rule,
    /// The line after the marker, leading whitespace removed.
    pub rest: &'a str,
}

impl LineMatch<'_> {
    pub fn kind(&self) -> LineKind {
        self.rule.kind
    }
}

/// Find the rule for a line, or `None` for a continuation line.
pub fn classify(line: &str) -> Option<LineMatch<'_>> {
    let mut best: Option<(&'static Rule, usize)> = None;
    for rule in RULES {
        if let Some(len) = rule.matcher.matches(line) {
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((rule, len));
            }
        }
    }

    best.map(|(rule, len)| {
        let rest = match rule.matcher {
            Matcher::Prefix(_) => line[len..].trim_start(),
            Matcher::Exact(_) => "",
        };
        LineMatch { rule, rest }
    })
}

/// Where the parser is in the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserState {
    Idle,
    InAssistantBlock,
    InUserBlock,
    InSystemBlock,
    /// A JSON tool payload spanning several lines.
    InToolBlock,
    Done,
}

/// Turns raw output lines into [`StreamEvent`]s.
///
/// The parser knows nothing about processes or time. Feed it lines with
/// [`feed`](Self::feed) and end it with [`finish`](Self::finish) (end of
/// input) or [`force_turn_limit`](Self::force_turn_limit).
#[derive(Debug)]
pub struct StreamParser {
    state: ParserState,
    buffer: String,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
            buffer: String::new(),
        }
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ParserState::Done
    }

    /// Parse a complete sequence of lines, ending with end of input.
    pub fn parse_all<I, S>(lines: I) -> Vec<StreamEvent>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parser = Self::new();
        let mut events = Vec::new();
        for line in lines {
            events.extend(parser.feed(line.as_ref()));
        }
        events.extend(parser.finish());
        events
    }

    /// Consume one line of output.
    pub fn feed(&mut self, line: &str) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if self.is_done() {
            tracing::trace!(line, "ignoring line after end of stream");
            return out;
        }

        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            return out;
        }

        match classify(line) {
            Some(m) => {
                tracing::trace!(rule = m.rule.name, "marker line");
                (m.rule.handler)(self, m.rest, &mut out);
            }
            None => self.append(line),
        }
        if self.state == ParserState::InToolBlock {
            self.settle_tool(&mut out);
        }
        out
    }

    /// End of input: flush the open block and complete.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        self.terminate(StreamEvent::StreamComplete)
    }

    /// End the stream because the turn limit was reached.
    pub fn force_turn_limit(&mut self) -> Vec<StreamEvent> {
        self.terminate(StreamEvent::TurnLimitReached)
    }

    fn terminate(&mut self, event: StreamEvent) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if !self.is_done() {
            self.end_with(event, &mut out);
        }
        out
    }

    fn append(&mut self, line: &str) {
        if self.state == ParserState::Idle {
            // Unmarked text outside any block is assistant output.
            self.state = ParserState::InAssistantBlock;
        }
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line);
    }

    fn flush(&mut self, out: &mut Vec<StreamEvent>) {
        let text = mem::take(&mut self.buffer);
        match mem::replace(&mut self.state, ParserState::Idle) {
            ParserState::InAssistantBlock => push_text(out, Role::Assistant, text),
            ParserState::InUserBlock => push_text(out, Role::User, text),
            ParserState::InSystemBlock => push_text(out, Role::System, text),
            ParserState::InToolBlock => {
                let (id, name, raw_arguments) = parse_tool_payload(&text);
                out.push(StreamEvent::ToolInvocation {
                    id,
                    name,
                    raw_arguments,
                });
            }
            ParserState::Idle | ParserState::Done => {}
        }
    }

    /// Emit the tool block as soon as its payload is complete. Text after a
    /// JSON payload stays in the stream as assistant output.
    fn settle_tool(&mut self, out: &mut Vec<StreamEvent>) {
        let end = match payload_end(&self.buffer) {
            PayloadEnd::Pending => return,
            PayloadEnd::Json(end) => end,
            PayloadEnd::Line => self.buffer.len(),
        };
        let trailing = self.buffer.split_off(end);
        self.flush(out);

        let trailing = trailing.trim();
        if !trailing.is_empty() {
            self.state = ParserState::InAssistantBlock;
            self.buffer.push_str(trailing);
        }
    }

    fn open_block(&mut self, state: ParserState, rest: &str, out: &mut Vec<StreamEvent>) {
        self.flush(out);
        self.state = state;
        self.buffer.push_str(rest);
    }

    fn end_with(&mut self, event: StreamEvent, out: &mut Vec<StreamEvent>) {
        self.flush(out);
        out.push(event);
        self.state = ParserState::Done;
    }

    // -------------------------------------------------------------------------
    // Rule handlers
    // -------------------------------------------------------------------------

    fn open_assistant(&mut self, rest: &str, out: &mut Vec<StreamEvent>) {
        self.open_block(ParserState::InAssistantBlock, rest, out);
    }

    fn open_user(&mut self, rest: &str, out: &mut Vec<StreamEvent>) {
        self.open_block(ParserState::InUserBlock, rest, out);
    }

    fn open_system(&mut self, rest: &str, out: &mut Vec<StreamEvent>) {
        self.open_block(ParserState::InSystemBlock, rest, out);
    }

    fn open_tool(&mut self, rest: &str, out: &mut Vec<StreamEvent>) {
        self.open_block(ParserState::InToolBlock, rest, out);
    }

    fn emit_result(&mut self, rest: &str, out: &mut Vec<StreamEvent>) {
        self.flush(out);
        let (tool_id, content, is_error) = parse_result_payload(rest);
        out.push(StreamEvent::ToolResult {
            tool_id,
            content,
            is_error,
        });
    }

    fn end_turn_limit(&mut self, _rest: &str, out: &mut Vec<StreamEvent>) {
        self.end_with(StreamEvent::TurnLimitReached, out);
    }

    fn end_error(&mut self, rest: &str, out: &mut Vec<StreamEvent>) {
        let message = if rest.is_empty() {
            "the CLI reported an error".to_string()
        } else {
            rest.to_string()
        };
        self.end_with(StreamEvent::StreamError { message }, out);
    }

    fn end_complete(&mut self, _rest: &str, out: &mut Vec<StreamEvent>) {
        self.end_with(StreamEvent::StreamComplete, out);
    }
}

fn push_text(out: &mut Vec<StreamEvent>, role: Role, text: String) {
    if !text.is_empty() {
        out.push(StreamEvent::TextDelta { role, text });
    }
}

/// How much of a tool block is its payload.
enum PayloadEnd {
    /// Nothing yet, or a JSON object still missing its end.
    Pending,
    /// A JSON payload ending at this byte offset.
    Json(usize),
    /// Plain text: the whole line is the payload.
    Line,
}

fn payload_end(text: &str) -> PayloadEnd {
    if text.trim().is_empty() {
        return PayloadEnd::Pending;
    }
    let Some(start) = text.find('{') else {
        return PayloadEnd::Line;
    };
    let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
    match values.next() {
        Some(Ok(_)) => PayloadEnd::Json(start + values.byte_offset()),
        Some(Err(e)) if e.is_eof() => PayloadEnd::Pending,
        _ => PayloadEnd::Line,
    }
}

/// Extract `(id, name, raw_arguments)` from a tool block.
///
/// A JSON object starting at the first `{` is preferred. Anything else falls
/// back to a whitespace split; this never fails.
pub fn parse_tool_payload(text: &str) -> (Option<String>, String, String) {
    if let Some(start) = text.find('{') {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(Value::Object(map))) => return tool_from_object(&text[..start], map),
            _ => tracing::debug!("tool payload is not a JSON object, using heuristic split"),
        }
    }

    let (name, args) = split_heuristic(text);
    (None, name, args)
}

fn tool_from_object(leading: &str, map: Map<String, Value>) -> (Option<String>, String, String) {
    let id = string_field(&map, &["id", "tool_use_id"]);
    let json_name = string_field(&map, &["name", "tool"]);
    let input = ["input", "arguments", "args"]
        .iter()
        .find_map(|key| map.get(*key));

    let raw_arguments = match input {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        // `Read {"path": "a"}`: the whole object is the arguments.
        None if json_name.is_none() => Value::Object(map.clone()).to_string(),
        None => String::new(),
    };

    let name = json_name.unwrap_or_else(|| split_heuristic(leading).0);
    (id, name, raw_arguments)
}

fn string_field(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `name rest...` or `name(args)`.
fn split_heuristic(text: &str) -> (String, String) {
    let text = text.trim();
    let end = text
        .find(|c: char| c.is_whitespace() || c == '(')
        .unwrap_or(text.len());
    let name = &text[..end];
    let mut args = text[end..].trim();
    if let Some(inner) = args.strip_prefix('(').and_then(|a| a.strip_suffix(')')) {
        args = inner.trim();
    }

    let name = if name.is_empty() { "unknown" } else { name };
    (name.to_string(), args.to_string())
}

/// Extract `(tool_id, content, is_error)` from a result line.
///
/// Only objects that look like a tool result (`tool_use_id` or `content`)
/// are unpacked; other text, JSON included, is the content verbatim.
pub fn parse_result_payload(rest: &str) -> (Option<String>, Content, bool) {
    if rest.starts_with('{') {
        if let Ok(Value::Object(mut map)) = serde_json::from_str::<Value>(rest) {
            if map.contains_key("tool_use_id") || map.contains_key("content") {
                let tool_id = string_field(&map, &["tool_use_id", "id"]);
                let is_error = map.get("is_error").and_then(Value::as_bool).unwrap_or(false);
                let content = Content::from_value(map.remove("content").unwrap_or(Value::Null));
                return (tool_id, content, is_error);
            }
        }
    }
    (None, Content::Text(rest.to_string()), false)
}
