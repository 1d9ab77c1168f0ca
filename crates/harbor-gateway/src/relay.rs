use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{debug, error, warn};

use harbor_db::Database;
use harbor_db::models::NewMessage;
use harbor_types::events::{ChatMessage, MessageKind, ServerEvent};

use crate::content::ContentStore;
use crate::registry::Registry;

/// Per-connection chat event handler: persists every inbound message,
/// stores file bodies to content storage, and fans the event out to every
/// connected client. Clients filter on their side; the relay never narrows
/// delivery by receiver.
pub struct Relay {
    db: Arc<Database>,
    content: ContentStore,
    registry: Registry,
    /// Disambiguates generated filenames within one millisecond.
    file_seq: AtomicU64,
}

impl Relay {
    pub fn new(db: Arc<Database>, content: ContentStore, registry: Registry) -> Self {
        Self {
            db,
            content,
            registry,
            file_seq: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Handle one inbound chat event. Called once per event, in arrival
    /// order on its connection.
    pub async fn handle_inbound(&self, msg: ChatMessage) {
        match msg.kind {
            MessageKind::Text => self.handle_text(msg).await,
            MessageKind::File => self.handle_file(msg).await,
        }
    }

    async fn handle_text(&self, msg: ChatMessage) {
        if !self.persist(&msg, msg.message.clone()).await {
            return;
        }

        if !msg.message.is_empty() && msg.receiver_id.is_some() {
            let delivered = self
                .registry
                .broadcast(ServerEvent::MessageResponse(msg))
                .await;
            debug!("relayed text message to {delivered} connections");
        }
    }

    /// The persisted record and the broadcast both carry the generated
    /// filename; the client-supplied name and the raw body go no further
    /// than this function.
    async fn handle_file(&self, mut msg: ChatMessage) {
        let filename = self.generated_filename(&msg.message);

        if !self.persist(&msg, filename.clone()).await {
            return;
        }

        match msg.body.take() {
            Some(encoded) => match B64.decode(encoded.as_bytes()) {
                Ok(bytes) => {
                    let content = self.content.clone();
                    let name = filename.clone();
                    // The write is fire-and-forget: broadcast proceeds
                    // regardless, and a failed write leaves a message
                    // pointing at a file that never landed. No retries.
                    tokio::spawn(async move {
                        if let Err(e) = content.save(&name, &bytes).await {
                            error!("failed to store attachment {name}: {e}");
                        }
                    });
                }
                Err(e) => warn!("attachment body for {filename} is not valid base64: {e}"),
            },
            None => warn!("file message {filename} arrived without a body"),
        }

        msg.message = filename;
        let delivered = self
            .registry
            .broadcast(ServerEvent::MessageResponse(msg))
            .await;
        debug!("relayed file message to {delivered} connections");
    }

    async fn persist(&self, msg: &ChatMessage, stored_message: String) -> bool {
        let new = NewMessage {
            sender_id: Some(msg.sender_id.to_string()),
            sender_username: msg.sender_username.clone(),
            receiver_id: msg.receiver_id.map(|id| id.to_string()),
            receiver_username: msg.receiver_username.clone(),
            kind: msg.kind.as_str().to_string(),
            message: stored_message,
            mime_type: msg.mime_type.clone(),
        };

        let db = self.db.clone();
        match tokio::task::spawn_blocking(move || db.append_message(new)).await {
            Ok(Ok(row)) => {
                debug!("message {} persisted", row.id);
                true
            }
            Ok(Err(e)) => {
                error!("failed to persist message: {e}");
                false
            }
            Err(e) => {
                error!("spawn_blocking join error: {e}");
                false
            }
        }
    }

    /// Storage-safe filename: current time in millis plus a process-wide
    /// counter, keeping the original name's extension.
    fn generated_filename(&self, original: &str) -> String {
        let ext = original
            .rsplit('.')
            .next()
            .filter(|e| !e.is_empty())
            .unwrap_or("bin");
        let millis = chrono::Utc::now().timestamp_millis();
        let seq = self.file_seq.fetch_add(1, Ordering::Relaxed);
        format!("{millis}-{seq}.{ext}")
    }
}
