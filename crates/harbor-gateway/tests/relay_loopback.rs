/// Integration test: drive the presence registry and relay engine the way
/// the connection gateway does, without a real WebSocket, and verify what
/// each connected wire observes.
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tokio::sync::mpsc;
use uuid::Uuid;

use harbor_db::Database;
use harbor_gateway::content::ContentStore;
use harbor_gateway::registry::{Registry, Session};
use harbor_gateway::relay::Relay;
use harbor_types::events::{ChatMessage, MessageKind, ServerEvent};

struct Peer {
    conn_id: Uuid,
    user_id: Uuid,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Attach a wire and register a presence entry, like the gateway does for
/// an authenticated connection.
async fn connect(registry: &Registry, username: &str) -> Peer {
    let conn_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    registry.attach(conn_id, tx).await;
    registry
        .register(Session::new(conn_id, user_id, username.to_string()))
        .await
        .unwrap();
    registry
        .broadcast(ServerEvent::Open {
            user_id,
            name: username.to_string(),
        })
        .await;
    Peer {
        conn_id,
        user_id,
        rx,
    }
}

async fn relay_fixture() -> (Arc<Relay>, Registry, Arc<Database>, ContentStore) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let dir = std::env::temp_dir().join(format!("harbor_loopback_test_{}", Uuid::new_v4()));
    let content = ContentStore::new(dir).await.unwrap();
    let registry = Registry::new();
    let relay = Arc::new(Relay::new(db.clone(), content.clone(), registry.clone()));
    (relay, registry, db, content)
}

fn text_from(sender: &str, sender_id: Uuid, receiver: &str, body: &str) -> ChatMessage {
    ChatMessage {
        sender_id,
        sender_username: sender.to_string(),
        receiver_id: Some(Uuid::new_v4()),
        receiver_username: Some(receiver.to_string()),
        kind: MessageKind::Text,
        message: body.to_string(),
        body: None,
        mime_type: None,
    }
}

#[tokio::test]
async fn presence_and_relay_full_fan_out() {
    let (relay, registry, db, _content) = relay_fixture().await;

    let mut alice = connect(&registry, "alice").await;
    // alice sees her own arrival
    assert!(matches!(
        alice.rx.recv().await,
        Some(ServerEvent::Open { .. })
    ));

    let mut bob = connect(&registry, "bob").await;

    // An anonymous wire: attached, never registered, still gets broadcasts.
    let (anon_tx, mut anon_rx) = mpsc::unbounded_channel();
    let anon_conn = Uuid::new_v4();
    registry.attach(anon_conn, anon_tx).await;

    assert_eq!(registry.snapshot().await.len(), 2);
    assert!(registry.find_by_connection(anon_conn).await.is_none());

    // bob's open reached alice; drain bob's view of both arrivals
    assert!(matches!(
        alice.rx.recv().await,
        Some(ServerEvent::Open { .. })
    ));
    assert!(matches!(bob.rx.recv().await, Some(ServerEvent::Open { .. })));

    // Relay a text message: everyone receives it, the anonymous wire too.
    relay
        .handle_inbound(text_from("alice", alice.user_id, "bob", "hi bob"))
        .await;

    for rx in [&mut alice.rx, &mut bob.rx, &mut anon_rx] {
        let Some(ServerEvent::MessageResponse(msg)) = rx.recv().await else {
            panic!("expected the relayed message");
        };
        assert_eq!(msg.message, "hi bob");
    }

    let rows = db.conversation("alice", "bob").unwrap();
    assert_eq!(rows.len(), 1);

    // Disconnect alice the way the gateway tears down.
    let removed = registry.deregister(alice.conn_id).await.unwrap();
    registry.detach(alice.conn_id).await;
    registry
        .broadcast(ServerEvent::Closed {
            id: alice.conn_id,
            username: removed.username,
            user_id: removed.user_id,
        })
        .await;

    let Some(ServerEvent::Closed { id, username, .. }) = bob.rx.recv().await else {
        panic!("expected a closed event");
    };
    assert_eq!(id, alice.conn_id);
    assert_eq!(username, "alice");
    assert_eq!(registry.snapshot().await.len(), 1);
}

#[tokio::test]
async fn file_relay_rewrites_and_stores() {
    let (relay, registry, db, content) = relay_fixture().await;

    let mut alice = connect(&registry, "alice").await;
    alice.rx.recv().await; // own open

    let mut msg = text_from("alice", alice.user_id, "bob", "report.pdf");
    msg.kind = MessageKind::File;
    msg.body = Some(B64.encode(b"%PDF-1.4 ..."));
    msg.mime_type = Some("application/pdf".to_string());
    relay.handle_inbound(msg).await;

    let Some(ServerEvent::MessageResponse(relayed)) = alice.rx.recv().await else {
        panic!("expected the relayed file event");
    };
    assert_ne!(relayed.message, "report.pdf");
    assert!(relayed.message.ends_with(".pdf"));
    assert!(relayed.body.is_none());

    let rows = db.conversation("alice", "bob").unwrap();
    assert_eq!(rows[0].message, relayed.message);

    let path = content.path_for(&relayed.message);
    for _ in 0..100 {
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.4 ...");
}

#[tokio::test]
async fn broadcast_survives_an_unresponsive_peer() {
    let (relay, registry, _db, _content) = relay_fixture().await;

    let mut alice = connect(&registry, "alice").await;
    alice.rx.recv().await;
    let mut bob = connect(&registry, "bob").await;
    alice.rx.recv().await;
    bob.rx.recv().await;

    // carol's receive side is gone; her wire stays attached.
    let carol = connect(&registry, "carol").await;
    drop(carol.rx);
    alice.rx.recv().await;
    bob.rx.recv().await;

    relay
        .handle_inbound(text_from("alice", alice.user_id, "bob", "still works"))
        .await;

    for rx in [&mut alice.rx, &mut bob.rx] {
        let Some(ServerEvent::MessageResponse(msg)) = rx.recv().await else {
            panic!("expected delivery to the live peers");
        };
        assert_eq!(msg.message, "still works");
    }
}
