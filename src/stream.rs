use crate::models::ChatDelta;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

pub const DATA_PREFIX: &str = "data: ";
pub const DONE_SENTINEL: &str = "[DONE]";
pub const TRANSPORT_FALLBACK: &str = "AI service is temporarily unavailable, please try again later";
pub const GENERIC_DENIAL: &str = "AI access denied";

/// Longest unterminated line the decoder holds before discarding it.
pub const MAX_LINE_BYTES: usize = 1 << 20;

const CURSOR: &str = "<span class=\"ai-cursor\"></span>";
const WARNING: &str = "⚠️";

lazy_static! {
    static ref FENCED_CODE: Regex = Regex::new(r"```(\w*)\n([\s\S]*?)```").unwrap();
    static ref INLINE_CODE: Regex = Regex::new(r"`([^`]+)`").unwrap();
}

/// One decoded line of the chat stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(ChatDelta),
    Done,
    /// Blank lines, non-`data:` lines and malformed JSON.
    Ignored,
}

/// Splits a chunked byte stream into complete lines and decodes them.
///
/// Bytes after the last `\n` are held until the next chunk, so a frame
/// (or a UTF-8 sequence) split across chunks is decoded once, whole.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    line_buffer: Vec<u8>,
    /// Prefix of `line_buffer` already known to hold no `\n`.
    scanned: usize,
    /// Set while dropping the rest of an oversized line.
    discarding: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.line_buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(offset) = self.line_buffer[self.scanned..].iter().position(|byte| *byte == b'\n') {
            let newline_index = self.scanned + offset;
            let mut line = self.line_buffer.drain(..=newline_index).collect::<Vec<_>>();
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            line.pop();
            if matches!(line.last(), Some(b'\r')) {
                line.pop();
            }
            frames.push(parse_frame_line(&line));
        }
        self.scanned = self.line_buffer.len();
        if self.line_buffer.len() > MAX_LINE_BYTES {
            warn!("Discarding chat frame longer than {} bytes", MAX_LINE_BYTES);
            self.line_buffer.clear();
            self.scanned = 0;
            self.discarding = true;
        }
        frames
    }

    /// Decodes whatever unterminated line is left once the transport ends.
    pub fn finish(&mut self) -> Option<Frame> {
        self.scanned = 0;
        if std::mem::take(&mut self.discarding) {
            self.line_buffer.clear();
            return None;
        }
        if self.line_buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.line_buffer);
        Some(parse_frame_line(&line))
    }
}

pub fn parse_frame_line(line: &[u8]) -> Frame {
    let line = String::from_utf8_lossy(line);
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Frame::Ignored;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Frame::Done;
    }
    match serde_json::from_str::<ChatDelta>(payload) {
        Ok(delta) => Frame::Data(delta),
        Err(e) => {
            debug!("Skipping malformed chat frame '{}': {}", payload, e);
            Frame::Ignored
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Opening,
    Streaming,
    Finalized,
    Errored,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Finalized | Phase::Errored)
    }
}

/// What the caller should do after feeding the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Unchanged,
    NeedsRender,
    /// `[DONE]` was seen; stop reading.
    Finished,
}

/// Member tier used to word the quota hint on a 429.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberLevel {
    Guest,
    Basic,
    Other(String),
}

impl MemberLevel {
    pub fn parse(level: Option<&str>) -> Self {
        match level.map(str::trim) {
            None | Some("") => MemberLevel::Guest,
            Some(l) if l.eq_ignore_ascii_case("basic") => MemberLevel::Basic,
            Some(l) => MemberLevel::Other(l.to_string()),
        }
    }

    pub fn quota_hint(&self) -> &'static str {
        match self {
            MemberLevel::Guest => "Become a VIP member to use the AI assistant!",
            MemberLevel::Basic => "Upgrade to VIP to use the AI assistant!",
            MemberLevel::Other(_) => "Today's quota is used up, come back tomorrow~",
        }
    }
}

/// One assistant reply being streamed.
///
/// `buffer` accumulates every content delta and never shrinks. `visible` is
/// what the renderer shows; an error frame or a denial replaces it without
/// touching `buffer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    id: String,
    phase: Phase,
    buffer: String,
    visible: String,
    error_content: bool,
    terminal_renders: usize,
}

impl StreamMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phase: Phase::Opening,
            buffer: String::new(),
            visible: String::new(),
            error_content: false,
            terminal_renders: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn visible(&self) -> &str {
        &self.visible
    }

    pub fn has_error_content(&self) -> bool {
        self.error_content
    }

    /// Number of terminal transitions recorded. Always 0 or 1.
    pub fn terminal_transitions(&self) -> usize {
        self.terminal_renders
    }

    pub fn apply(&mut self, frame: Frame) -> Step {
        if self.phase.is_terminal() {
            return Step::Unchanged;
        }
        match frame {
            Frame::Ignored => Step::Unchanged,
            Frame::Done => {
                self.finalize_phase(Phase::Finalized);
                Step::Finished
            }
            Frame::Data(delta) => {
                let mut step = Step::Unchanged;
                if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                    self.buffer.push_str(&content);
                    if !self.error_content {
                        self.visible = self.buffer.clone();
                    }
                    self.phase = Phase::Streaming;
                    step = Step::NeedsRender;
                }
                if let Some(error) = delta.error {
                    self.visible = format!("{} {}", WARNING, error);
                    self.error_content = true;
                    step = Step::NeedsRender;
                }
                step
            }
        }
    }

    /// Non-success status before any frame was read. The frame parser is
    /// never opened.
    pub fn reject(&mut self, status: u16, detail: Option<&str>, member: &MemberLevel) {
        if self.phase.is_terminal() {
            return;
        }
        let detail = detail.filter(|d| !d.trim().is_empty());
        self.visible = if status == 429 {
            format!("{} {}\n\n{}", WARNING, detail.unwrap_or(GENERIC_DENIAL), member.quota_hint())
        } else {
            format!("{} {}", WARNING, detail.unwrap_or(crate::error::GENERIC_FAILURE))
        };
        self.error_content = true;
        self.finalize_phase(Phase::Errored);
    }

    /// Network failure at any phase. Text streamed so far is kept and the
    /// notice is appended after it.
    pub fn fail_transport(&mut self, reason: Option<&str>) {
        if self.phase.is_terminal() {
            return;
        }
        let notice = format!("{} {}", WARNING, reason.unwrap_or(TRANSPORT_FALLBACK));
        if self.visible.is_empty() {
            self.visible = notice;
        } else {
            self.visible.push_str("\n\n");
            self.visible.push_str(&notice);
        }
        self.error_content = true;
        self.finalize_phase(Phase::Errored);
    }

    /// Transport ended without `[DONE]`.
    pub fn end_of_stream(&mut self) {
        if !self.phase.is_terminal() {
            self.finalize_phase(Phase::Finalized);
        }
    }

    fn finalize_phase(&mut self, phase: Phase) {
        // Errored content stays errored even if the stream completes cleanly.
        self.phase = if self.error_content { Phase::Errored } else { phase };
        self.terminal_renders += 1;
    }

    /// Streaming render: escaped text, line breaks and the live cursor.
    pub fn render_streaming(&self) -> String {
        let mut html = escape_html(&self.visible).replace('\n', "<br>");
        html.push_str(CURSOR);
        html
    }

    /// Terminal render over the complete text. Pure, so calling it again
    /// yields identical output.
    pub fn render_final(&self) -> String {
        render_rich(&self.visible)
    }

    /// The render matching the current phase.
    pub fn render(&self) -> String {
        if self.phase.is_terminal() {
            self.render_final()
        } else {
            self.render_streaming()
        }
    }
}

/// Code fences, then inline code, then line breaks, over escaped text.
pub fn render_rich(text: &str) -> String {
    let html = escape_html(text);
    let html = FENCED_CODE.replace_all(&html, "<pre><code>$2</code></pre>");
    let html = INLINE_CODE.replace_all(&html, "<code>$1</code>");
    html.replace('\n', "<br>")
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            c => out.push(c),
        }
    }
    out
}
