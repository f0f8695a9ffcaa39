use crate::api::{read_error_detail, ApiClient};
use crate::error::{ClientError, Result};
use crate::models::ChatRequest;
use crate::stream::{FrameDecoder, MemberLevel, Phase, StreamMessage, Step};
use chrono::Utc;
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::watch;

/// What a rendering layer observes about one streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSnapshot {
    pub id: String,
    pub phase: Phase,
    pub buffer: String,
    pub visible: String,
    pub html: String,
}

impl From<&StreamMessage> for MessageSnapshot {
    fn from(message: &StreamMessage) -> Self {
        Self {
            id: message.id().to_string(),
            phase: message.phase(),
            buffer: message.buffer().to_string(),
            visible: message.visible().to_string(),
            html: message.render(),
        }
    }
}

/// Handle to a reply streaming in the background.
///
/// Dropping the handle does not stop the stream; it keeps being consumed
/// until the server ends it.
#[derive(Debug)]
pub struct MessageHandle {
    id: String,
    rx: watch::Receiver<MessageSnapshot>,
}

impl MessageHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> MessageSnapshot {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MessageSnapshot> {
        self.rx.clone()
    }

    /// Waits for the reply to reach a terminal phase.
    pub async fn wait_terminal(mut self) -> MessageSnapshot {
        loop {
            {
                let current = self.rx.borrow_and_update();
                if current.phase.is_terminal() {
                    return current.clone();
                }
            }
            if self.rx.changed().await.is_err() {
                return self.rx.borrow().clone();
            }
        }
    }
}

/// Chat against the currently opened document.
#[derive(Debug)]
pub struct ChatSession {
    api: ApiClient,
    member: MemberLevel,
    context: String,
    doc_name: String,
    next_seq: AtomicU64,
}

impl ChatSession {
    pub fn new(api: ApiClient, member: MemberLevel) -> Self {
        Self {
            api,
            member,
            context: String::new(),
            doc_name: String::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn set_document(&mut self, doc_name: impl Into<String>, context: impl Into<String>) {
        self.doc_name = doc_name.into();
        self.context = context.into();
    }

    pub fn set_member(&mut self, member: MemberLevel) {
        self.member = member;
    }

    fn next_id(&self) -> String {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        format!("stream-{}-{}", Utc::now().timestamp_millis(), seq)
    }

    /// Sends a prompt and starts streaming the reply on a background task.
    pub fn submit_message(&self, text: &str) -> Result<MessageHandle> {
        let message = text.trim();
        if message.is_empty() {
            return Err(ClientError::EmptyPrompt);
        }

        let id = self.next_id();
        let request = ChatRequest {
            message: message.to_string(),
            context: self.context.clone(),
            doc_name: self.doc_name.clone(),
        };
        let initial = StreamMessage::new(id.clone());
        let (tx, rx) = watch::channel(MessageSnapshot::from(&initial));
        tokio::spawn(run_message(self.api.clone(), request, self.member.clone(), initial, tx));
        info!("Submitted chat message {}", id);
        Ok(MessageHandle { id, rx })
    }
}

async fn run_message(
    api: ApiClient,
    request: ChatRequest,
    member: MemberLevel,
    mut message: StreamMessage,
    tx: watch::Sender<MessageSnapshot>,
) {
    let start_time = Instant::now();
    let publish = |m: &StreamMessage| {
        tx.send_replace(MessageSnapshot::from(m));
    };

    let response = match api.open_chat(&request).await {
        Ok(response) => response,
        Err(e) => {
            warn!("Chat request for {} failed: {}", message.id(), e);
            message.fail_transport(None);
            publish(&message);
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let detail = read_error_detail(response).await;
        warn!("Chat {} rejected with status {}", message.id(), status);
        message.reject(status.as_u16(), detail.as_deref(), &member);
        publish(&message);
        return;
    }

    consume_stream(response.bytes_stream(), &mut message, publish).await;
    info!(
        "Chat message {} ended as {:?} after {:.2?} ({} bytes).",
        message.id(),
        message.phase(),
        start_time.elapsed(),
        message.buffer().len()
    );
}

/// Feeds a chunked byte stream through the frame decoder into `message`.
///
/// `publish` runs after every change that needs a re-render, and exactly
/// once for the terminal transition.
pub async fn consume_stream<S, B, E, F>(stream: S, message: &mut StreamMessage, mut publish: F)
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    F: FnMut(&StreamMessage),
{
    futures::pin_mut!(stream);
    let mut decoder = FrameDecoder::new();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("Chat stream {} read failed: {}", message.id(), e);
                message.fail_transport(None);
                publish(message);
                return;
            }
        };
        for frame in decoder.push(chunk.as_ref()) {
            match message.apply(frame) {
                Step::Unchanged => {}
                Step::NeedsRender => publish(message),
                Step::Finished => {
                    debug!("Chat stream {} reached [DONE]", message.id());
                    publish(message);
                    return;
                }
            }
        }
    }

    if let Some(frame) = decoder.finish() {
        if message.apply(frame) != Step::Unchanged {
            publish(message);
            if message.phase().is_terminal() {
                return;
            }
        }
    }
    message.end_of_stream();
    publish(message);
}
