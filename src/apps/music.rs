//! Music mini-app: plays one song at a time as a background task.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::handler::TaskHandler;
use crate::tasks::{TaskSpec, WidgetRef};
use crate::widgets::{WidgetHandle, WidgetRegistry};

const TASK_NAME: &str = "Music";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Song {
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub url: String,
}

/// Domain view of the running task: the stored song merged with the live
/// playback fields only the owning process can see.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MusicState {
    #[serde(flatten)]
    pub song: Song,
    pub playing: bool,
    pub time: f64,
    pub duration: f64,
}

/// External playback collaborator. The controller guarantees `open` runs
/// exactly once per created task and that pause/resume are called at the
/// matching task transitions; everything else is the sink's business.
pub trait AudioSink: Send + Sync {
    fn open(&self, song: &Song) -> Result<()>;
    fn pause(&self);
    fn resume(&self);
    fn close(&self);
    /// Current playback position in seconds.
    fn position(&self) -> f64;
    /// Duration of the open stream in seconds (0 when nothing is open).
    fn duration(&self) -> f64;
}

/// Drives the single "Music" task: at most one exists at a time, and
/// starting the song that is already loaded toggles play state instead of
/// duplicating it. Every operation degrades to a logged no-op when the
/// registry or channel fails, keeping the shell responsive.
pub struct MusicController {
    handler: Arc<dyn TaskHandler>,
    sink: Arc<dyn AudioSink>,
    widgets: Arc<WidgetRegistry>,
    last_song: Mutex<Option<Song>>,
}

impl MusicController {
    pub fn new(
        handler: Arc<dyn TaskHandler>,
        sink: Arc<dyn AudioSink>,
        widgets: Arc<WidgetRegistry>,
    ) -> Self {
        Self {
            handler,
            sink,
            widgets,
            last_song: Mutex::new(None),
        }
    }

    pub async fn start(&self, song: Song) {
        let tasks = self.handler.list().await;
        if let Some(existing) = tasks.iter().find(|t| t.name == TASK_NAME) {
            let current: Option<Song> = serde_json::from_value(existing.payload.clone()).ok();
            if current.as_ref().map(|c| c.id) == Some(song.id) {
                // Same song — toggle play state instead of duplicating.
                if existing.active {
                    self.handler.pause(existing.id).await;
                } else {
                    self.handler.resume(existing.id).await;
                }
                return;
            }
            // Different song — stop the current one first.
            self.handler.remove(existing.id).await;
        }

        let payload = match serde_json::to_value(&song) {
            Ok(v) => v,
            Err(e) => {
                warn!(err = %e, title = %song.title, "song not serializable");
                return;
            }
        };

        let widget_name = self.widgets.register(
            &format!("music-live-activity-{}", Utc::now().timestamp_millis()),
            WidgetHandle::new("music/live-activity"),
        );

        let spec = TaskSpec::new(TASK_NAME, payload)
            .widget(WidgetRef::Named(widget_name))
            .on_start({
                let sink = self.sink.clone();
                let song = song.clone();
                move |_| sink.open(&song)
            })
            .on_pause({
                let sink = self.sink.clone();
                move || sink.pause()
            })
            .on_resume({
                let sink = self.sink.clone();
                move || sink.resume()
            });

        match self.handler.create(spec).await {
            Ok(snapshot) => {
                debug!(id = snapshot.id, title = %song.title, "music task created");
                *self.lock_last_song() = Some(song);
            }
            Err(e) => warn!(err = %e, title = %song.title, "failed to start music"),
        }
    }

    /// Pause or resume the current song; with no task, restart the last
    /// known song.
    pub async fn toggle(&self) {
        let tasks = self.handler.list().await;
        match tasks.iter().find(|t| t.name == TASK_NAME) {
            Some(task) if task.active => {
                self.handler.pause(task.id).await;
            }
            Some(task) => {
                self.handler.resume(task.id).await;
            }
            None => {
                let last = self.lock_last_song().clone();
                if let Some(song) = last {
                    self.start(song).await;
                }
            }
        }
    }

    /// Remove the task and release the audio stream.
    pub async fn stop(&self) {
        for task in self.handler.list().await {
            if task.name == TASK_NAME {
                self.handler.remove(task.id).await;
            }
        }
        self.sink.close();
    }

    pub async fn current_state(&self) -> Option<MusicState> {
        let tasks = self.handler.list().await;
        let task = tasks.iter().find(|t| t.name == TASK_NAME)?;
        let song: Song = match serde_json::from_value(task.payload.clone()) {
            Ok(song) => song,
            Err(e) => {
                warn!(id = task.id, err = %e, "music payload malformed");
                return None;
            }
        };
        Some(MusicState {
            song,
            playing: task.active,
            time: self.sink.position(),
            duration: self.sink.duration(),
        })
    }

    pub async fn is_playing(&self) -> bool {
        self.current_state().await.is_some_and(|s| s.playing)
    }

    fn lock_last_song(&self) -> std::sync::MutexGuard<'_, Option<Song>> {
        self.last_song.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
