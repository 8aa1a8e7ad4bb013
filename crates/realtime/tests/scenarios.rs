//! End-to-end flows through the hub with in-memory stores.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use taskhub_auth::{AuthError, JwtManager};
use taskhub_realtime::{
    ClientEvent, HubSettings, Identity, MemoryStore, MessageStore, RealtimeHub, Recipient, Role,
    SendMessage, ServerEvent, Session, TaskEvent, TaskRef, TypingNotice, TypingSignal, UserId,
    UserProfile,
};
use tokio::sync::mpsc::Receiver;

struct TestContext {
    hub: RealtimeHub,
    jwt: JwtManager,
    store: MemoryStore,
}

impl TestContext {
    async fn new() -> Self {
        let store = MemoryStore::new();
        store
            .add_user(UserProfile::new("alice", "Alice", Role::Admin))
            .await;
        store.add_user(UserProfile::new("bob", "Bob", Role::User)).await;
        store
            .add_user(UserProfile::new("carol", "Carol", Role::User))
            .await;

        let jwt = JwtManager::new("scenario-secret-scenario-secret");
        let hub = RealtimeHub::new(
            Arc::new(jwt.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            HubSettings::default(),
        );
        Self { hub, jwt, store }
    }

    fn token(&self, user: &str, role: Role) -> String {
        self.jwt
            .issue(&Identity::new(user, role))
            .expect("token should be issued")
    }

    async fn connect(&self, user: &str, role: Role) -> (Session, Receiver<ServerEvent>) {
        let header = format!("Bearer {}", self.token(user, role));
        self.hub
            .connect(Some(&header))
            .await
            .expect("valid credential should be admitted")
    }
}

fn drain(rx: &mut Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn online_sender_reaches_online_receiver() {
    let ctx = TestContext::new().await;
    let (alice, mut alice_rx) = ctx.connect("alice", Role::Admin).await;
    let (_bob, mut bob_rx) = ctx.connect("bob", Role::User).await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    ctx.hub
        .handle(&alice, ClientEvent::SendMessage(SendMessage::text("bob", "hi")))
        .await;

    let delivered = drain(&mut bob_rx);
    let confirmed = drain(&mut alice_rx);
    let (received, echoed) = match (&delivered[..], &confirmed[..]) {
        ([ServerEvent::NewMessage(r)], [ServerEvent::MessageConfirmed(e)]) => (r, e),
        other => panic!("unexpected delivery {other:?}"),
    };
    assert_eq!(received.content, "hi");
    assert_eq!(received.id, echoed.id);
    assert!(!echoed.id.is_empty());
    assert_eq!(received.sender.username, "Alice");
}

#[tokio::test]
async fn offline_receiver_finds_message_in_history() {
    let ctx = TestContext::new().await;
    let (alice, mut alice_rx) = ctx.connect("alice", Role::Admin).await;

    ctx.hub
        .handle(&alice, ClientEvent::SendMessage(SendMessage::text("bob", "hi")))
        .await;
    assert!(matches!(
        drain(&mut alice_rx).as_slice(),
        [ServerEvent::MessageConfirmed(_)]
    ));

    let (_bob, mut bob_rx) = ctx.connect("bob", Role::User).await;
    assert!(drain(&mut bob_rx)
        .iter()
        .all(|event| !matches!(event, ServerEvent::NewMessage(_))));

    let bob_id = UserId::from("bob");
    let alice_id = UserId::from("alice");
    let first = ctx.store.find_conversation(&bob_id, &alice_id).await.unwrap();
    let second = ctx.store.find_conversation(&bob_id, &alice_id).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].content, "hi");
    assert_eq!(first, second);
}

#[tokio::test]
async fn typing_notice_reaches_receiver() {
    let ctx = TestContext::new().await;
    let (alice, mut alice_rx) = ctx.connect("alice", Role::Admin).await;
    let (_bob, mut bob_rx) = ctx.connect("bob", Role::User).await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    ctx.hub
        .handle(
            &alice,
            ClientEvent::Typing(TypingSignal {
                receiver_id: Some(UserId::from("bob")),
                is_typing: true,
            }),
        )
        .await;

    assert_eq!(
        drain(&mut bob_rx),
        vec![ServerEvent::UserTyping(TypingNotice {
            user_id: UserId::from("alice"),
            is_typing: true,
        })]
    );
    assert!(drain(&mut alice_rx).is_empty());
}

#[tokio::test]
async fn abrupt_disconnect_is_swept_offline_once() {
    let ctx = TestContext::new().await;
    let (_alice, _alice_rx) = ctx.connect("alice", Role::Admin).await;
    let (bob, mut bob_rx) = ctx.connect("bob", Role::User).await;
    drain(&mut bob_rx);

    // Alice's transport dies without a close; only the sweep notices.
    let later = Utc::now() + chrono::Duration::minutes(6);
    ctx.hub.presence().touch_at(bob.user_id(), later).await;
    let swept = ctx.hub.presence().sweep_stale_users_at(later).await;
    assert_eq!(swept, vec![UserId::from("alice")]);

    let swept_again = ctx
        .hub
        .presence()
        .sweep_stale_users_at(later + chrono::Duration::seconds(60))
        .await;
    assert!(swept_again.is_empty());

    let offline: Vec<_> = drain(&mut bob_rx)
        .into_iter()
        .filter(|event| matches!(event, ServerEvent::UserOffline(_)))
        .collect();
    assert_eq!(offline, vec![ServerEvent::UserOffline(UserId::from("alice"))]);
}

#[tokio::test]
async fn assignment_reaches_every_open_tab() {
    let ctx = TestContext::new().await;
    let (_tab1, mut rx1) = ctx.connect("bob", Role::User).await;
    let (_tab2, mut rx2) = ctx.connect("bob", Role::User).await;

    let outcomes = ctx
        .hub
        .publish_task_event(&TaskEvent::Assigned {
            task: TaskRef {
                task_id: "t-1".to_string(),
                task_title: "Stocktake".to_string(),
            },
            assignee: UserId::from("bob"),
            assigned_by: UserId::from("alice"),
        })
        .await;

    let to_bob = outcomes
        .iter()
        .find(|(note, _)| note.assigned_to == Recipient::User(UserId::from("bob")))
        .expect("assignee notification");
    assert_eq!(to_bob.1, 2);

    let first = drain(&mut rx1);
    let second = drain(&mut rx2);
    assert_eq!(first, second);
    assert!(matches!(first.as_slice(), [ServerEvent::TaskNotification(_)]));
}

#[tokio::test]
async fn bad_credentials_never_create_sessions() {
    let ctx = TestContext::new().await;

    assert_eq!(
        ctx.hub.connect(None).await.unwrap_err(),
        AuthError::MissingCredential
    );
    assert!(matches!(
        ctx.hub.connect(Some("Bearer not-a-token")).await.unwrap_err(),
        AuthError::Invalid(_)
    ));
    assert_eq!(ctx.hub.registry().totals().await, (0, 0));
    assert!(ctx.hub.presence().online_users().await.is_empty());
}

#[tokio::test]
async fn online_status_follows_live_sessions() {
    let ctx = TestContext::new().await;
    let (carol_a, _) = ctx.connect("carol", Role::User).await;
    let (carol_b, _) = ctx.connect("carol", Role::User).await;
    let carol = UserId::from("carol");

    assert!(ctx.hub.presence().is_online(&carol).await);
    ctx.hub.disconnect(&carol_a).await;
    assert!(ctx.hub.presence().is_online(&carol).await);
    ctx.hub.disconnect(&carol_b).await;
    assert!(!ctx.hub.presence().is_online(&carol).await);

    let profile = ctx.store.user(&carol).await.unwrap();
    assert!(!profile.is_online);
    assert!(profile.last_active.is_some());
}

#[tokio::test]
async fn sweeper_task_runs_on_interval() {
    let store = MemoryStore::new();
    store
        .add_user(UserProfile::new("dave", "Dave", Role::User))
        .await;
    let jwt = JwtManager::new("sweeper-secret-sweeper-secret");
    let hub = RealtimeHub::new(
        Arc::new(jwt.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        HubSettings {
            stale_after: Duration::from_millis(0),
            sweep_interval: Duration::from_millis(20),
            session_buffer: 8,
        },
    );

    let (_dave, _rx) = hub
        .connect_identity(Identity::new("dave", Role::User))
        .await;
    let handle = hub.spawn_presence_sweeper();

    tokio::time::sleep(Duration::from_millis(120)).await;
    handle.abort();

    assert!(!hub.presence().is_online(&UserId::from("dave")).await);
}
