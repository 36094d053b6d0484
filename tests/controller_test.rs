//! Integration tests for the mini-app task controllers.

use lumend::apps::music::{AudioSink, MusicController, Song};
use lumend::apps::timer::{AlarmChime, TimerController};
use lumend::handler::{TaskHandler, UiTaskHandler};
use lumend::tasks::{TaskSide, TaskSnapshot, TaskSpec, TaskStore};
use lumend::widgets::WidgetRegistry;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeSink {
    opens: AtomicUsize,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
    closes: AtomicUsize,
}

impl AudioSink for FakeSink {
    fn open(&self, _song: &Song) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }
    fn resume(&self) {
        self.resumes.fetch_add(1, Ordering::SeqCst);
    }
    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
    fn position(&self) -> f64 {
        12.5
    }
    fn duration(&self) -> f64 {
        180.0
    }
}

#[derive(Default)]
struct FakeChime {
    rings: AtomicUsize,
    silences: AtomicUsize,
}

impl AlarmChime for FakeChime {
    fn ring(&self) {
        self.rings.fetch_add(1, Ordering::SeqCst);
    }
    fn silence(&self) {
        self.silences.fetch_add(1, Ordering::SeqCst);
    }
}

/// A handler whose channel is gone: every operation soft-fails.
struct DeadHandler;

#[async_trait]
impl TaskHandler for DeadHandler {
    async fn create(&self, _spec: TaskSpec) -> Result<TaskSnapshot> {
        anyhow::bail!("channel unavailable")
    }
    async fn list(&self) -> Vec<TaskSnapshot> {
        Vec::new()
    }
    async fn pause(&self, _id: u64) -> bool {
        false
    }
    async fn resume(&self, _id: u64) -> bool {
        false
    }
    async fn remove(&self, _id: u64) -> bool {
        false
    }
    async fn call_method(&self, _id: u64, _method: &str, _args: Vec<Value>) -> Value {
        json!({ "error": "channel unavailable" })
    }
}

fn song(id: u64, title: &str) -> Song {
    Song {
        id,
        title: title.to_string(),
        artist: "The Registry".to_string(),
        url: format!("https://music.example/{id}.mp3"),
    }
}

fn music_rig() -> (MusicController, Arc<FakeSink>, Arc<TaskStore>) {
    let widgets = Arc::new(WidgetRegistry::new());
    let store = Arc::new(TaskStore::new(TaskSide::Ui, widgets.clone()));
    let handler = Arc::new(UiTaskHandler::new("com.lumen.music", store.clone(), None));
    let sink = Arc::new(FakeSink::default());
    let controller = MusicController::new(handler, sink.clone(), widgets);
    (controller, sink, store)
}

fn timer_rig() -> (TimerController, Arc<FakeChime>, Arc<TaskStore>) {
    let widgets = Arc::new(WidgetRegistry::new());
    let store = Arc::new(TaskStore::new(TaskSide::Ui, widgets.clone()));
    let handler = Arc::new(UiTaskHandler::new("com.lumen.timer", store.clone(), None));
    let chime = Arc::new(FakeChime::default());
    let controller = TimerController::new(handler, chime.clone(), widgets);
    (controller, chime, store)
}

// ── Music ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn starting_same_song_twice_toggles_instead_of_duplicating() {
    let (music, sink, store) = music_rig();
    let a = song(1, "One");

    music.start(a.clone()).await;
    assert_eq!(store.len(), 1);
    assert!(store.list(None)[0].active);
    assert_eq!(sink.opens.load(Ordering::SeqCst), 1);

    music.start(a.clone()).await;
    assert_eq!(store.len(), 1, "same song must not create a second task");
    assert!(!store.list(None)[0].active);
    assert_eq!(sink.pauses.load(Ordering::SeqCst), 1);

    music.start(a).await;
    assert!(store.list(None)[0].active);
    assert_eq!(sink.resumes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn switching_songs_replaces_the_task() {
    let (music, sink, store) = music_rig();
    music.start(song(1, "One")).await;
    music.start(song(2, "Two")).await;
    music.start(song(3, "Three")).await;

    let tasks = store.list(None);
    assert_eq!(tasks.len(), 1, "at most one music task may exist");
    assert_eq!(tasks[0].payload["id"], 3);
    assert_eq!(sink.opens.load(Ordering::SeqCst), 3);
    // Removing the active predecessor ran its pause hook first.
    assert_eq!(sink.pauses.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stop_removes_the_task_and_releases_audio() {
    let (music, sink, store) = music_rig();
    music.start(song(1, "One")).await;
    music.stop().await;

    assert!(store.is_empty());
    assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn toggle_from_absent_restarts_last_song() {
    let (music, sink, store) = music_rig();
    music.start(song(1, "One")).await;
    music.stop().await;
    assert!(store.is_empty());

    music.toggle().await;
    assert_eq!(store.len(), 1, "toggle must restart the last known song");
    assert_eq!(sink.opens.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn current_state_merges_live_playback_fields() {
    let (music, _sink, _store) = music_rig();
    let a = song(4, "Four");
    music.start(a.clone()).await;

    let state = music.current_state().await.expect("state must exist");
    assert_eq!(state.song, a);
    assert!(state.playing);
    assert_eq!(state.time, 12.5);
    assert_eq!(state.duration, 180.0);
    assert!(music.is_playing().await);

    music.toggle().await;
    assert!(!music.is_playing().await);
}

#[tokio::test]
async fn music_controller_survives_a_dead_channel() {
    let widgets = Arc::new(WidgetRegistry::new());
    let sink = Arc::new(FakeSink::default());
    let music = MusicController::new(Arc::new(DeadHandler), sink.clone(), widgets);

    music.start(song(1, "One")).await;
    music.toggle().await;
    music.stop().await;
    assert!(music.current_state().await.is_none());
    assert!(!music.is_playing().await);
}

// ── Timer ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn timer_start_always_replaces() {
    let (timer, _chime, store) = timer_rig();
    timer.start(0, 0, 30).await;
    timer.start(0, 1, 0).await;

    let tasks = store.list(None);
    assert_eq!(tasks.len(), 1, "at most one timer task may exist");
    assert_eq!(tasks[0].id, 2);
    assert_eq!(tasks[0].payload["initialSecs"], 60);
}

#[tokio::test]
async fn zero_duration_timer_is_rejected() {
    let (timer, _chime, store) = timer_rig();
    timer.start(0, 0, 0).await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn timer_toggle_pauses_and_resumes() {
    let (timer, _chime, store) = timer_rig();
    timer.start(0, 5, 0).await;

    timer.toggle().await;
    assert!(!store.list(None)[0].active);
    assert!(!timer.is_running().await);

    timer.toggle().await;
    assert!(store.list(None)[0].active);
    assert!(timer.is_running().await);
}

#[tokio::test]
async fn pause_stretches_the_deadline() {
    let (timer, _chime, _store) = timer_rig();
    timer.start(0, 5, 0).await;
    let before = timer.current_state().await.unwrap().end_time_ms;

    timer.toggle().await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    timer.toggle().await;

    let after = timer.current_state().await.unwrap().end_time_ms;
    assert!(
        after > before,
        "the deadline must move by the time spent paused"
    );
}

#[tokio::test]
async fn toggle_mute_goes_through_the_custom_method() {
    let (timer, _chime, store) = timer_rig();
    timer.start(0, 5, 0).await;
    assert_eq!(store.list(None)[0].method_names, vec!["toggleMute"]);

    assert_eq!(timer.toggle_mute().await, Some(true));
    assert_eq!(timer.current_state().await.unwrap().muted, true);
    assert_eq!(timer.toggle_mute().await, Some(false));
}

#[tokio::test]
async fn toggle_mute_without_a_timer_is_none() {
    let (timer, _chime, _store) = timer_rig();
    assert_eq!(timer.toggle_mute().await, None);
}

#[tokio::test]
async fn alarm_rings_at_zero_and_stop_silences_it() {
    let (timer, chime, store) = timer_rig();
    timer.start(0, 0, 1).await;
    assert!(timer.is_running().await);

    tokio::time::sleep(Duration::from_millis(1600)).await;

    let state = timer.current_state().await.expect("timer still listed");
    assert_eq!(state.remaining_secs, 0);
    assert!(state.alarm_ringing, "alarm must start when the countdown hits zero");
    assert!(chime.rings.load(Ordering::SeqCst) >= 1);

    timer.stop().await;
    assert!(store.is_empty());
    assert!(chime.silences.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn muted_timer_completes_silently() {
    let (timer, chime, _store) = timer_rig();
    timer.start(0, 0, 1).await;
    timer.toggle_mute().await;

    tokio::time::sleep(Duration::from_millis(1600)).await;

    let state = timer.current_state().await.unwrap();
    assert!(state.alarm_ringing);
    assert_eq!(
        chime.rings.load(Ordering::SeqCst),
        0,
        "a muted alarm must not ring"
    );
}

#[tokio::test]
async fn timer_controller_survives_a_dead_channel() {
    let widgets = Arc::new(WidgetRegistry::new());
    let chime = Arc::new(FakeChime::default());
    let timer = TimerController::new(Arc::new(DeadHandler), chime, widgets);

    timer.start(0, 0, 5).await;
    timer.toggle().await;
    timer.stop().await;
    assert!(timer.current_state().await.is_none());
    assert_eq!(timer.toggle_mute().await, None);
}
