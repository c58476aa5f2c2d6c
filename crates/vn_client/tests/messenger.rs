use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::task::JoinSet;

use vn_client::{ClientError, ClientSettings, Messenger, SendPolicySetting, ViewOutcome};
use vn_crypto::{Blob, KeyManager, KeyPair};
use vn_proto::{
    AutoDeleteMode, CodecError, EnvelopeFormat, Envelope, IdentityContext, LifecycleState, MediaType, MessageBody,
    MessageRecord, Opened, ViewUpdate, UNAVAILABLE_PLACEHOLDER,
};
use vn_store::{
    BlobStore, FsBlobStore, KeyDirectory, MemoryBlobStore, MemoryKeyDirectory, MemoryMessageStore, MessageStore,
    SqliteStore, StoreError,
};

fn pair(i: usize) -> &'static KeyPair {
    static PAIRS: OnceLock<Vec<KeyPair>> = OnceLock::new();
    &PAIRS.get_or_init(|| {
        let manager = KeyManager::new(2048).unwrap();
        (0..3).map(|_| manager.generate_key_pair().unwrap()).collect()
    })[i]
}

struct World {
    messages: MemoryMessageStore,
    keys: MemoryKeyDirectory,
    blobs: MemoryBlobStore,
}

impl World {
    fn new() -> Self {
        Self { messages: MemoryMessageStore::new(), keys: MemoryKeyDirectory::new(), blobs: MemoryBlobStore::new() }
    }

    fn messenger(&self, id: &str, key: usize, settings: ClientSettings) -> Messenger {
        Messenger::new(
            IdentityContext::new(id, pair(key).private_key.clone()),
            Arc::new(self.messages.clone()),
            Arc::new(self.keys.clone()),
            Arc::new(self.blobs.clone()),
            settings,
        )
    }

    async fn pair_up(&self) -> (Messenger, Messenger) {
        let alice = self.messenger("alice", 0, ClientSettings::default());
        let bob = self.messenger("bob", 1, ClientSettings::default());
        alice.publish_key().await.unwrap();
        bob.publish_key().await.unwrap();
        (alice, bob)
    }
}

fn displayed_text(outcome: &ViewOutcome) -> &str {
    match outcome {
        ViewOutcome::Displayed { text, .. } => text.display_text(),
        ViewOutcome::Blocked { .. } => panic!("expected the message to display"),
    }
}

#[tokio::test]
async fn both_participants_read_the_conversation() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;

    alice.send_text("bob", "hi bob", None).await.unwrap();
    bob.send_text("alice", "hi alice", None).await.unwrap();

    for messenger in [&alice, &bob] {
        let peer = if messenger.identity_id() == "alice" { "bob" } else { "alice" };
        let texts: Vec<_> = messenger
            .load_conversation(peer)
            .await
            .unwrap()
            .iter()
            .map(|e| e.display_text().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["hi bob", "hi alice"]);
    }
}

#[tokio::test]
async fn unpublished_receiver_is_keys_not_ready() {
    let world = World::new();
    let alice = world.messenger("alice", 0, ClientSettings::default());
    alice.publish_key().await.unwrap();
    let err = alice.send_text("bob", "hello?", None).await.unwrap_err();
    assert!(matches!(err, ClientError::KeysNotReady(ref id) if id == "bob"));
}

#[tokio::test]
async fn one_bad_record_does_not_hide_the_rest() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    alice.send_text("bob", "first", None).await.unwrap();

    let mut broken = alice.send_text("bob", "second", None).await.unwrap();
    broken.id = "broken".into();
    broken.encrypted_content = "%%% not an envelope %%%".into();
    broken.created_at = Utc::now() + Duration::seconds(1);
    world.messages.insert(&broken).await.unwrap();

    let entries = bob.load_conversation("alice").await.unwrap();
    let texts: Vec<_> = entries.iter().map(|e| e.display_text().unwrap()).collect();
    assert_eq!(texts, vec!["first", "second", UNAVAILABLE_PLACEHOLDER]);
    assert!(matches!(
        entries[2].text,
        Some(Opened::Unavailable(CodecError::Format(_)))
    ));
}

#[tokio::test]
async fn envelope_without_our_key_is_a_placeholder() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    let carol = world.messenger("carol", 2, ClientSettings::default());
    carol.publish_key().await.unwrap();

    // Sealed for alice and carol, then filed as addressed to bob.
    let mut record = alice.send_text("carol", "not for bob", None).await.unwrap();
    world.messages.delete(&[record.id.clone()]).await.unwrap();
    record.receiver_id = "bob".into();
    world.messages.insert(&record).await.unwrap();

    let entries = bob.load_conversation("alice").await.unwrap();
    assert!(matches!(
        entries[0].text,
        Some(Opened::Unavailable(CodecError::KeyMismatch { .. }))
    ));
}

#[tokio::test]
async fn outsiders_cannot_open_messages() {
    let world = World::new();
    let (alice, _bob) = world.pair_up().await;
    let carol = world.messenger("carol", 2, ClientSettings::default());
    let record = alice.send_text("bob", "private", None).await.unwrap();
    assert!(matches!(carol.open_message(&record.id).await, Err(ClientError::NotFound(_))));
}

#[tokio::test]
async fn view_once_text_shows_once_then_blocks_and_is_swept() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    let record = alice.send_text("bob", "burn after reading", Some(AutoDeleteMode::View)).await.unwrap();

    // Sealed in the list until opened.
    let entries = bob.load_conversation("alice").await.unwrap();
    assert!(entries[0].text.is_none());

    let first = bob.open_message(&record.id).await.unwrap();
    assert_eq!(displayed_text(&first), "burn after reading");
    assert_eq!(world.messages.get(&record.id).await.unwrap().unwrap().lifecycle.view_count, 1);

    for _ in 0..3 {
        assert!(matches!(bob.open_message(&record.id).await.unwrap(), ViewOutcome::Blocked { .. }));
    }
    let stored = world.messages.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.lifecycle.view_count, 2);
    assert_eq!(stored.lifecycle.state(), LifecycleState::ViewOnceBlocked);

    assert_eq!(bob.sweep().await.unwrap().deleted, 1);
    assert!(world.messages.get(&record.id).await.unwrap().is_none());
}

#[tokio::test]
async fn sender_reads_never_consume_views() {
    let world = World::new();
    let (alice, _bob) = world.pair_up().await;
    let record = alice.send_text("bob", "mine", Some(AutoDeleteMode::View)).await.unwrap();

    for _ in 0..3 {
        assert_eq!(displayed_text(&alice.open_message(&record.id).await.unwrap()), "mine");
    }
    let stored = world.messages.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.lifecycle.view_count, 0);
    assert!(!stored.lifecycle.is_viewed);
}

#[tokio::test]
async fn timed_after_view_mode_schedules_expiry_on_first_view() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    let record = alice.send_text("bob", "an hour", Some(AutoDeleteMode::OneHourAfterView)).await.unwrap();
    assert!(record.lifecycle.expires_at.is_none());

    let before = Utc::now();
    bob.open_message(&record.id).await.unwrap();
    let stored = world.messages.get(&record.id).await.unwrap().unwrap();
    let expires_at = stored.lifecycle.expires_at.unwrap();
    let viewed_at = stored.lifecycle.viewed_at.unwrap();
    assert!(viewed_at >= before);
    assert_eq!(expires_at - viewed_at, Duration::minutes(60));

    // Listing shows it now that the timer runs.
    let entries = bob.load_conversation("alice").await.unwrap();
    assert_eq!(entries[0].display_text(), Some("an hour"));

    // A second view neither moves the expiry nor blocks.
    let again = bob.open_message(&record.id).await.unwrap();
    assert_eq!(displayed_text(&again), "an hour");
    let stored = world.messages.get(&record.id).await.unwrap().unwrap();
    assert_eq!(stored.lifecycle.expires_at, Some(expires_at));
}

#[tokio::test]
async fn timed_after_view_text_stays_sealed_until_opened() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    let record = alice.send_text("bob", "later", Some(AutoDeleteMode::OneHourAfterView)).await.unwrap();

    let entries = bob.load_conversation("alice").await.unwrap();
    assert!(entries[0].text.is_none());
    assert!(bob.ingest(record.clone()).await.unwrap().text.is_none());
    let stored = world.messages.get(&record.id).await.unwrap().unwrap();
    assert!(!stored.lifecycle.is_viewed);
    assert!(stored.lifecycle.expires_at.is_none());

    // The sender's own listing is not a view.
    let mine = alice.load_conversation("bob").await.unwrap();
    assert_eq!(mine[0].display_text(), Some("later"));

    let clip = Blob::new(vec![9; 16], "video/mp4");
    let video = alice
        .send_media("bob", "", &clip, MediaType::Video, Some(AutoDeleteMode::OneMinuteAfterView))
        .await
        .unwrap();
    assert!(matches!(bob.fetch_media(&video.id).await, Err(ClientError::OpenRequired(_))));
    bob.open_message(&video.id).await.unwrap();
    assert!(matches!(bob.fetch_media(&video.id).await.unwrap(), Opened::Plain(_)));
}

#[tokio::test]
async fn snapshot_media_round_trips_once() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    let photo = Blob::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3], "application/octet-stream");
    let record = alice
        .send_media("bob", "look", &photo, MediaType::Snapshot, None)
        .await
        .unwrap();
    assert!(matches!(record.body, MessageBody::Snapshot { .. }));

    // No peeking before the view is registered.
    assert!(matches!(bob.fetch_media(&record.id).await, Err(ClientError::OpenRequired(_))));

    match bob.open_message(&record.id).await.unwrap() {
        ViewOutcome::Displayed { text, media: Some(Opened::Plain(blob)), .. } => {
            assert_eq!(text.display_text(), "look");
            assert_eq!(blob.bytes, photo.bytes);
            assert_eq!(blob.mime_type, "image/jpeg");
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    // Nor between the first and the refused second view.
    for _ in 0..3 {
        assert!(matches!(bob.fetch_media(&record.id).await, Err(ClientError::OpenRequired(_))));
    }
    assert_eq!(world.messages.get(&record.id).await.unwrap().unwrap().lifecycle.view_count, 1);

    assert!(matches!(bob.open_message(&record.id).await.unwrap(), ViewOutcome::Blocked { .. }));
    assert!(matches!(bob.fetch_media(&record.id).await, Err(ClientError::ViewBlocked(_))));
    // The sender still has their copy.
    assert!(matches!(alice.fetch_media(&record.id).await.unwrap(), Opened::Plain(_)));
}

#[tokio::test]
async fn missing_blob_is_a_placeholder_not_an_error() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    let clip = Blob::new(b"not really mp4".to_vec(), "video/mp4");
    let record = alice.send_media("bob", "", &clip, MediaType::Video, None).await.unwrap();
    assert!(world.blobs.delete(record.body.media_url().unwrap()).await.unwrap());

    match bob.open_message(&record.id).await.unwrap() {
        ViewOutcome::Displayed { text, media: Some(Opened::Unavailable(CodecError::MediaMissing(_))), .. } => {
            assert_eq!(text.display_text(), " ");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn sweep_removes_blobs_of_purged_media() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    let photo = Blob::new(vec![1, 2, 3], "image/jpeg");
    let seen = alice.send_media("bob", "", &photo, MediaType::Image, None).await.unwrap();
    let unseen = alice.send_media("bob", "", &photo, MediaType::Image, None).await.unwrap();
    bob.open_message(&seen.id).await.unwrap();

    let report = alice.sweep().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.media_urls, vec![seen.body.media_url().unwrap().to_string()]);
    assert!(world.blobs.get(seen.body.media_url().unwrap()).await.unwrap().is_none());
    assert!(world.blobs.get(unseen.body.media_url().unwrap()).await.unwrap().is_some());
    assert_eq!(world.blobs.len().await, 1);
}

/// Accepts everything but new messages.
struct RejectingStore(MemoryMessageStore);

#[async_trait]
impl MessageStore for RejectingStore {
    async fn insert(&self, record: &MessageRecord) -> Result<(), StoreError> {
        Err(StoreError::Duplicate(record.id.clone()))
    }

    async fn get(&self, id: &str) -> Result<Option<MessageRecord>, StoreError> {
        self.0.get(id).await
    }

    async fn between(&self, a: &str, b: &str) -> Result<Vec<MessageRecord>, StoreError> {
        self.0.between(a, b).await
    }

    async fn apply_view(&self, id: &str, expected_view_count: u32, update: &ViewUpdate) -> Result<bool, StoreError> {
        self.0.apply_view(id, expected_view_count, update).await
    }

    async fn set_saved(&self, id: &str, saved: bool) -> Result<bool, StoreError> {
        self.0.set_saved(id, saved).await
    }

    async fn delete(&self, ids: &[String]) -> Result<u64, StoreError> {
        self.0.delete(ids).await
    }

    async fn snapshot(&self) -> Result<Vec<MessageRecord>, StoreError> {
        self.0.snapshot().await
    }
}

#[tokio::test]
async fn failed_insert_leaves_no_blob_behind() {
    let world = World::new();
    let (_alice, _bob) = world.pair_up().await;
    let alice = Messenger::new(
        IdentityContext::new("alice", pair(0).private_key.clone()),
        Arc::new(RejectingStore(world.messages.clone())),
        Arc::new(world.keys.clone()),
        Arc::new(world.blobs.clone()),
        ClientSettings::default(),
    );

    let photo = Blob::new(vec![1, 2, 3], "image/jpeg");
    let err = alice.send_media("bob", "", &photo, MediaType::Image, None).await.unwrap_err();
    assert!(matches!(err, ClientError::Store(StoreError::Duplicate(_))));
    assert!(world.blobs.is_empty().await);
}

#[tokio::test]
async fn text_is_not_media() {
    let world = World::new();
    let (alice, _bob) = world.pair_up().await;
    let blob = Blob::new(vec![1], "text/plain");
    let err = alice.send_media("bob", "", &blob, MediaType::Text, None).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidRequest(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_views_never_overshoot() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    let record = alice.send_text("bob", "race", Some(AutoDeleteMode::View)).await.unwrap();

    let bob = Arc::new(bob);
    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let bob = Arc::clone(&bob);
        let id = record.id.clone();
        tasks.spawn(async move { bob.open_message(&id).await });
    }

    let mut displayed = 0;
    while let Some(joined) = tasks.join_next().await {
        if let ViewOutcome::Displayed { .. } = joined.unwrap().unwrap() {
            displayed += 1;
        }
    }
    assert_eq!(displayed, 1);
    assert_eq!(world.messages.get(&record.id).await.unwrap().unwrap().lifecycle.view_count, 2);
}

#[tokio::test]
async fn ingest_reports_delivery() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    let record = alice.send_text("bob", "ping", None).await.unwrap();

    let delivery = bob.ingest(record.clone()).await.unwrap();
    assert_eq!(delivery.state, LifecycleState::Delivered);
    assert_eq!(delivery.text.unwrap().display_text(), "ping");

    assert!(matches!(alice.ingest(record).await, Err(ClientError::InvalidRequest(_))));

    let once = alice.send_text("bob", "secret", Some(AutoDeleteMode::View)).await.unwrap();
    assert!(bob.ingest(once).await.unwrap().text.is_none());
}

#[tokio::test]
async fn broken_own_key_strict_vs_legacy_fallback() {
    let world = World::new();
    let (_alice, bob) = world.pair_up().await;
    world.keys.publish("alice", "bm90IGEga2V5").await.unwrap();

    let strict = world.messenger("alice", 0, ClientSettings::default());
    let err = strict.send_text("bob", "hello", None).await.unwrap_err();
    assert!(matches!(err, ClientError::EncryptionImpossible { ref recipient_id, .. } if recipient_id == "alice"));

    let settings = ClientSettings { send_policy: SendPolicySetting::LegacyFallback, ..Default::default() };
    let fallback = world.messenger("alice", 0, settings);
    let record = fallback.send_text("bob", "hello", None).await.unwrap();
    assert_eq!(Envelope::parse(&record.encrypted_content).unwrap().format(), EnvelopeFormat::Legacy);

    assert_eq!(displayed_text(&bob.open_message(&record.id).await.unwrap()), "hello");
    // Narrowed delivery: the sender lost their own copy.
    let mine = fallback.load_conversation("bob").await.unwrap();
    assert!(mine[0].text.as_ref().unwrap().is_unavailable());
}

#[tokio::test]
async fn saved_messages_survive_the_sweep() {
    let world = World::new();
    let (alice, bob) = world.pair_up().await;
    let keep = alice.send_text("bob", "keep", Some(AutoDeleteMode::View)).await.unwrap();
    let drop_me = alice.send_text("bob", "drop", Some(AutoDeleteMode::View)).await.unwrap();
    bob.open_message(&keep.id).await.unwrap();
    bob.open_message(&drop_me.id).await.unwrap();
    bob.set_saved(&keep.id, true).await.unwrap();

    let report = alice.sweep().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(world.messages.get(&keep.id).await.unwrap().is_some());
    assert!(matches!(bob.set_saved("nope", true).await, Err(ClientError::NotFound(_))));
}

#[tokio::test]
async fn end_to_end_over_sqlite_and_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(&dir.path().join("vanish.db")).await.unwrap());
    let blobs = Arc::new(FsBlobStore::new(dir.path().join("blobs")));

    let messenger = |id: &str, key: usize| {
        Messenger::new(
            IdentityContext::new(id, pair(key).private_key.clone()),
            store.clone(),
            store.clone(),
            blobs.clone(),
            ClientSettings::default(),
        )
    };
    let alice = messenger("alice", 0);
    let bob = messenger("bob", 1);
    alice.publish_key().await.unwrap();
    bob.publish_key().await.unwrap();

    let text = alice.send_text("bob", "over sqlite", Some(AutoDeleteMode::View)).await.unwrap();
    let clip = Blob::new(vec![7; 4096], "video/mp4");
    let video = alice.send_media("bob", "clip", &clip, MediaType::Video, None).await.unwrap();

    assert_eq!(displayed_text(&bob.open_message(&text.id).await.unwrap()), "over sqlite");
    match bob.open_message(&video.id).await.unwrap() {
        ViewOutcome::Displayed { media: Some(Opened::Plain(blob)), .. } => assert_eq!(blob.bytes, clip.bytes),
        other => panic!("unexpected outcome {other:?}"),
    }

    // Both were viewed and neither has a timer, so both go, blob included.
    let video_path = video.body.media_url().unwrap().to_string();
    assert!(blobs.get(&video_path).await.unwrap().is_some());
    let report = bob.sweep().await.unwrap();
    assert_eq!(report.deleted, 2);
    assert!(store.between("alice", "bob").await.unwrap().is_empty());
    assert!(blobs.get(&video_path).await.unwrap().is_none());
    assert!(!dir.path().join("blobs").join(&video_path).exists());
}
