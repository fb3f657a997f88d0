//! End-to-end tests of the threaded runtime: actor, store worker, and change
//! feed forwarder running against a `MemoryStore`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use threadview::config::TimelineConfig;
use threadview::model::{
    AuthorId, InvariantViolation, Item, ItemId, ItemKind, ReceivedAt, StageKey, ThreadId,
    TimelineError,
};
use threadview::store::MemoryStore;
use threadview::timeline::{Alignment, Directive, RenderOffset, ScrollTarget, VisibleRange};
use threadview::TimelineHandle;

const PATIENCE: Duration = Duration::from_secs(5);

fn thread() -> ThreadId {
    ThreadId::new(1)
}

fn item(id: u64) -> Item {
    Item::new(
        ItemId::new(id),
        AuthorId::new("alice").unwrap(),
        ReceivedAt::from_millis(id as i64 * 1_000),
        ItemKind::Text {
            body: format!("message {id}"),
        },
    )
}

fn store_with(n: u64) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new().with_thread(thread(), (1..=n).map(item).collect()))
}

fn config() -> TimelineConfig {
    TimelineConfig {
        quiescence: Duration::from_millis(50),
        ..TimelineConfig::default()
    }
}

fn viewport(start: usize, end: usize) -> VisibleRange {
    VisibleRange::new(RenderOffset::new(start), RenderOffset::new(end))
}

/// Wait for a directive matching `wanted`, failing after `PATIENCE`.
fn wait_for(directives: &Receiver<Directive>, wanted: impl Fn(&Directive) -> bool) -> Directive {
    let deadline = Instant::now() + PATIENCE;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match directives.recv_timeout(left) {
            Ok(directive) if wanted(&directive) => return directive,
            Ok(_) => continue,
            Err(error) => panic!("no matching directive: {error}"),
        }
    }
}

#[test]
fn jump_lands_through_actor_and_worker() {
    let store = store_with(100);
    let (handle, directives) = TimelineHandle::spawn(Arc::clone(&store), config()).unwrap();

    handle.bind(thread(), None).unwrap();
    handle.viewport_settled(viewport(0, 20)).unwrap();
    handle
        .jump_to(ScrollTarget::position(37), || panic!("position 37 exists"))
        .unwrap();

    let pulse = wait_for(&directives, |d| matches!(d, Directive::Pulse { .. }));
    assert_eq!(
        pulse,
        Directive::Pulse {
            offset: RenderOffset::new(37)
        }
    );

    handle.shutdown().unwrap();
}

#[test]
fn missing_item_reports_not_found() {
    let store = store_with(10);
    let (handle, directives) = TimelineHandle::spawn(Arc::clone(&store), config()).unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&calls);

    handle.bind(thread(), None).unwrap();
    handle
        .jump_to(ScrollTarget::item(ItemId::new(999)), move || {
            sink.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    wait_for(&directives, |d| *d == Directive::NotFound);
    handle.shutdown().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn settled_viewport_commits_read_state() {
    let store = store_with(100);
    let (handle, _directives) = TimelineHandle::spawn(Arc::clone(&store), config()).unwrap();
    handle.bind(thread(), None).unwrap();

    // A single settle: the first batch resamples the viewport when it lands.
    handle.viewport_settled(viewport(0, 20)).unwrap();
    let deadline = Instant::now() + PATIENCE;
    while store.read_watermark(thread()).unwrap().is_none() {
        assert!(Instant::now() < deadline, "watermark never written");
        thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(
        store.read_watermark(thread()).unwrap(),
        Some(ReceivedAt::from_millis(100_000))
    );
    handle.shutdown().unwrap();
}

#[test]
fn next_unread_mention_lands_through_actor_and_worker() {
    let items = (1..=100)
        .map(|id| match id {
            45 => item(id).mentioning_self(),
            _ => item(id),
        })
        .collect();
    let store = Arc::new(MemoryStore::new().with_thread(thread(), items));
    let (handle, directives) = TimelineHandle::spawn(Arc::clone(&store), config()).unwrap();

    handle.bind(thread(), None).unwrap();
    handle.viewport_settled(viewport(0, 20)).unwrap();
    handle
        .jump_to(ScrollTarget::NextUnreadMention, || panic!("item 45 mentions us"))
        .unwrap();

    let pulse = wait_for(&directives, |d| matches!(d, Directive::Pulse { .. }));
    assert_eq!(
        pulse,
        Directive::Pulse {
            offset: RenderOffset::new(55)
        }
    );
    handle.shutdown().unwrap();
}

#[test]
fn staging_requires_a_binding() {
    let store = store_with(10);
    let (handle, _directives) = TimelineHandle::spawn(store, config()).unwrap();

    let result = handle.stage_outgoing(StageKey::new(1), item(11));

    assert!(matches!(result, Err(TimelineError::NotBound)));
    handle.shutdown().unwrap();
}

#[test]
fn arrival_at_bottom_pins_viewport() {
    let store = store_with(10);
    let (handle, directives) = TimelineHandle::spawn(Arc::clone(&store), config()).unwrap();
    handle.attach_change_feed(store.subscribe()).unwrap();
    handle.bind(thread(), None).unwrap();
    handle.viewport_settled(viewport(0, 5)).unwrap();

    store.receive(thread(), item(11)).unwrap();

    let pinned = wait_for(&directives, |d| matches!(d, Directive::MoveViewport { .. }));
    assert!(matches!(
        pinned,
        Directive::MoveViewport {
            offset,
            alignment: Alignment::Start,
            ..
        } if offset == RenderOffset::new(0)
    ));
    handle.shutdown().unwrap();
}

#[test]
fn duplicate_stage_key_stops_the_actor() {
    let store = store_with(10);
    let (handle, _directives) = TimelineHandle::spawn(store, config()).unwrap();
    handle.bind(thread(), None).unwrap();

    let first = handle.stage_outgoing(StageKey::new(1), item(11)).unwrap();
    assert!(first.is_some());
    let second = handle.stage_outgoing(StageKey::new(1), item(12));

    assert!(matches!(
        second,
        Err(TimelineError::Invariant(InvariantViolation::DuplicateStageKey(_)))
    ));
    assert!(matches!(
        handle.shutdown(),
        Err(TimelineError::Invariant(InvariantViolation::DuplicateStageKey(_)))
    ));
}
