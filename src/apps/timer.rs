//! Timer mini-app: a countdown task with a looped alarm at zero.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::handler::TaskHandler;
use crate::tasks::{TaskSpec, WidgetRef};
use crate::widgets::{WidgetHandle, WidgetRegistry};

const TASK_NAME: &str = "Timer";

/// Countdown state: the task payload and the domain view returned by
/// [`TimerController::current_state`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub initial_secs: u64,
    pub remaining_secs: u64,
    pub running: bool,
    pub end_time_ms: i64,
    pub alarm_ringing: bool,
    pub muted: bool,
}

/// External alarm collaborator: rings looped until silenced.
pub trait AlarmChime: Send + Sync {
    fn ring(&self);
    fn silence(&self);
}

#[derive(Default)]
struct TimerShared {
    state: TimerState,
    pause_time_ms: Option<i64>,
    /// Bumped on every start/stop; a live ticker exits when it no longer
    /// matches.
    generation: u64,
}

/// Drives the single "Timer" task. A restart always replaces the previous
/// countdown — an identical duration is a new timer, not a toggle. Every
/// operation degrades to a logged no-op on registry or channel failure.
pub struct TimerController {
    handler: Arc<dyn TaskHandler>,
    chime: Arc<dyn AlarmChime>,
    widgets: Arc<WidgetRegistry>,
    shared: Arc<Mutex<TimerShared>>,
}

impl TimerController {
    pub fn new(
        handler: Arc<dyn TaskHandler>,
        chime: Arc<dyn AlarmChime>,
        widgets: Arc<WidgetRegistry>,
    ) -> Self {
        Self {
            handler,
            chime,
            widgets,
            shared: Arc::new(Mutex::new(TimerShared::default())),
        }
    }

    pub async fn start(&self, hours: u64, minutes: u64, seconds: u64) {
        let total = total_seconds(hours, minutes, seconds);
        if total == 0 {
            warn!("cannot start a timer with zero duration");
            return;
        }

        // A restart always replaces: remove any existing countdown first.
        for task in self.handler.list().await {
            if task.name == TASK_NAME {
                self.handler.remove(task.id).await;
            }
        }
        self.chime.silence();

        let now_ms = Utc::now().timestamp_millis();
        let state = TimerState {
            initial_secs: total,
            remaining_secs: total,
            running: true,
            end_time_ms: now_ms + (total as i64) * 1000,
            alarm_ringing: false,
            muted: false,
        };
        let generation = {
            let mut shared = lock(&self.shared);
            shared.state = state.clone();
            shared.pause_time_ms = None;
            shared.generation += 1;
            shared.generation
        };

        let payload = match serde_json::to_value(&state) {
            Ok(v) => v,
            Err(e) => {
                warn!(err = %e, "timer state not serializable");
                return;
            }
        };

        let widget_name = self.widgets.register(
            &format!("timer-live-activity-{}", Utc::now().timestamp_millis()),
            WidgetHandle::new("timer/live-activity"),
        );

        let spec = TaskSpec::new(TASK_NAME, payload)
            .widget(WidgetRef::Named(widget_name))
            .on_start({
                let shared = self.shared.clone();
                let chime = self.chime.clone();
                move |_| {
                    spawn_ticker(shared, chime, generation);
                    debug!(total, "countdown started");
                    Ok(())
                }
            })
            .on_pause({
                let shared = self.shared.clone();
                move || {
                    let mut shared = lock(&shared);
                    if shared.state.running {
                        shared.state.running = false;
                        shared.pause_time_ms = Some(Utc::now().timestamp_millis());
                    }
                    debug!("timer paused");
                }
            })
            .on_resume({
                let shared = self.shared.clone();
                move || {
                    let mut shared = lock(&shared);
                    if !shared.state.running {
                        // Stretch the deadline by however long we sat paused.
                        if let Some(paused_at) = shared.pause_time_ms.take() {
                            shared.state.end_time_ms += Utc::now().timestamp_millis() - paused_at;
                        }
                        shared.state.running = true;
                    }
                    debug!("timer resumed");
                }
            })
            .method("toggleMute", {
                let shared = self.shared.clone();
                let chime = self.chime.clone();
                move |_args: &[Value]| {
                    let mut shared = lock(&shared);
                    shared.state.muted = !shared.state.muted;
                    if shared.state.muted {
                        chime.silence();
                    } else if shared.state.alarm_ringing {
                        chime.ring();
                    }
                    debug!(muted = shared.state.muted, "timer mute toggled");
                    Ok(json!(shared.state.muted))
                }
            });

        match self.handler.create(spec).await {
            Ok(snapshot) => debug!(id = snapshot.id, total, "timer task created"),
            Err(e) => warn!(err = %e, "failed to start timer"),
        }
    }

    /// Pause or resume the countdown; with no task, restart the previous
    /// duration as a fresh countdown.
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
                let initial = lock(&self.shared).state.initial_secs;
                if initial > 0 {
                    self.start(0, 0, initial).await;
                }
            }
        }
    }

    /// Remove the task, silence the alarm, and stop the ticker.
    pub async fn stop(&self) {
        for task in self.handler.list().await {
            if task.name == TASK_NAME {
                self.handler.remove(task.id).await;
            }
        }
        self.chime.silence();
        let mut shared = lock(&self.shared);
        shared.generation += 1;
        shared.state.running = false;
        shared.state.alarm_ringing = false;
        shared.pause_time_ms = None;
    }

    /// Toggle the alarm mute through the task's remote-invokable method.
    /// Returns the new muted state, or `None` when no timer exists.
    pub async fn toggle_mute(&self) -> Option<bool> {
        let tasks = self.handler.list().await;
        let task = tasks.iter().find(|t| t.name == TASK_NAME)?;
        let result = self
            .handler
            .call_method(task.id, "toggleMute", Vec::new())
            .await;
        match result.get("error") {
            Some(err) => {
                warn!(id = task.id, %err, "toggleMute failed");
                None
            }
            None => result.as_bool(),
        }
    }

    pub async fn current_state(&self) -> Option<TimerState> {
        let tasks = self.handler.list().await;
        let task = tasks.iter().find(|t| t.name == TASK_NAME)?;
        let mut state: TimerState = match serde_json::from_value(task.payload.clone()) {
            Ok(state) => state,
            Err(e) => {
                warn!(id = task.id, err = %e, "timer payload malformed");
                return None;
            }
        };
        // Merge live countdown fields the payload snapshot cannot carry.
        {
            let shared = lock(&self.shared);
            state.remaining_secs = shared.state.remaining_secs;
            state.end_time_ms = shared.state.end_time_ms;
            state.alarm_ringing = shared.state.alarm_ringing;
            state.muted = shared.state.muted;
        }
        state.running = task.active;
        Some(state)
    }

    pub async fn is_running(&self) -> bool {
        self.current_state().await.is_some_and(|s| s.running)
    }
}

fn lock(shared: &Mutex<TimerShared>) -> MutexGuard<'_, TimerShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Countdown loop: recomputes the remaining time from the wall-clock
/// deadline, ticking faster than the 1-second display granularity so the
/// alarm fires promptly. Exits when superseded by a newer generation or
/// once the alarm has started.
fn spawn_ticker(shared: Arc<Mutex<TimerShared>>, chime: Arc<dyn AlarmChime>, generation: u64) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_millis(250));
        loop {
            tick.tick().await;
            let completed_muted = {
                let mut shared = lock(&shared);
                if shared.generation != generation {
                    break;
                }
                if !shared.state.running || shared.state.alarm_ringing {
                    continue;
                }
                let now_ms = Utc::now().timestamp_millis();
                let remaining = ((shared.state.end_time_ms - now_ms).max(0) + 999) / 1000;
                shared.state.remaining_secs = remaining as u64;
                if remaining > 0 {
                    continue;
                }
                shared.state.alarm_ringing = true;
                shared.state.muted
            };
            if !completed_muted {
                chime.ring();
            }
            info!("timer completed");
            break;
        }
    });
}

/// Total seconds for an hours/minutes/seconds selection.
pub fn total_seconds(hours: u64, minutes: u64, seconds: u64) -> u64 {
    hours * 3600 + minutes * 60 + seconds
}

/// `HH:MM:SS` rendering of a second count.
pub fn format_time_string(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_seconds_adds_up() {
        assert_eq!(total_seconds(0, 0, 0), 0);
        assert_eq!(total_seconds(1, 1, 1), 3661);
        assert_eq!(total_seconds(0, 90, 0), 5400);
    }

    #[test]
    fn format_time_string_pads_fields() {
        assert_eq!(format_time_string(0), "00:00:00");
        assert_eq!(format_time_string(3661), "01:01:01");
        assert_eq!(format_time_string(86399), "23:59:59");
    }
}
