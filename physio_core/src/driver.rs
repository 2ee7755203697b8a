//! Async driver for a running exercise session.
//!
//! A single tokio task owns the [`SessionMachine`]. Commands arrive on an
//! unbounded channel, the active ticker is a tokio [`Interval`], and every
//! change is published as a [`SessionSnapshot`] on a watch channel. Only the
//! driver task mutates the machine.
//!
//! The ticker is recreated whenever the machine reports a new timer
//! generation and dropped when no ticker should run, so a paused or
//! completed session never receives stray ticks. Dropping the
//! [`SessionHandle`] cancels the task.
//!
//! Every snapshot carries the number of commands processed so far, so a
//! caller can wait for the state that follows its own command rather than
//! whatever a tick published in between. Store writes run on the blocking
//! pool.

use crate::catalog::Catalog;
use crate::config::SessionConfig;
use crate::machine::{ActiveTimer, SessionMachine, SessionSnapshot};
use crate::persistence::SessionPersistence;
use crate::{Error, Exercise, ExerciseSession, Result, SessionFeedback};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Commands a UI can issue to a running session
#[derive(Clone, Debug, PartialEq)]
pub enum SessionCommand {
    StartSet,
    CompleteSet,
    UpdateReps(i32),
    Pause,
    Resume,
    CompleteSession(SessionFeedback),
}

/// Timer periods used by the driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTiming {
    pub tick: Duration,
    pub unwind_delay: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        SessionTiming::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionTiming {
    fn from(config: &SessionConfig) -> Self {
        Self {
            tick: config.tick(),
            unwind_delay: config.unwind_delay(),
        }
    }
}

/// UI-side handle on a running session
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<ExerciseSession>,
    sent: AtomicU64,
}

impl SessionHandle {
    /// Queue a command. Returns `false` once the session task has ended.
    pub fn send(&self, command: SessionCommand) -> bool {
        if self.commands.send(command).is_err() {
            return false;
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        true
    }

    /// Send a command and wait for the snapshot published after it was
    /// processed.
    ///
    /// Returns `None` if the session task ended before processing it.
    pub async fn apply(&mut self, command: SessionCommand) -> Option<SessionSnapshot> {
        if !self.send(command) {
            return None;
        }
        let target = self.sent.load(Ordering::SeqCst);
        let snapshot = self.wait_for(|s| s.commands_applied >= target).await;
        (snapshot.commands_applied >= target).then_some(snapshot)
    }

    pub fn start_set(&self) -> bool {
        self.send(SessionCommand::StartSet)
    }

    pub fn complete_set(&self) -> bool {
        self.send(SessionCommand::CompleteSet)
    }

    pub fn update_reps(&self, reps: i32) -> bool {
        self.send(SessionCommand::UpdateReps(reps))
    }

    pub fn pause(&self) -> bool {
        self.send(SessionCommand::Pause)
    }

    pub fn resume(&self) -> bool {
        self.send(SessionCommand::Resume)
    }

    pub fn complete_session(&self, feedback: SessionFeedback) -> bool {
        self.send(SessionCommand::CompleteSession(feedback))
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        (*self.snapshots.borrow()).clone()
    }

    /// Independent receiver for observers (e.g. a renderer)
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    ///
    /// If the session ends first, the final snapshot is returned as is.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        if let Ok(snapshot) = self.snapshots.wait_for(predicate).await {
            return (*snapshot).clone();
        }
        self.snapshot()
    }

    /// Wait for the session task to end and return the final record.
    ///
    /// The task ends after completion plus the unwind delay.
    pub async fn finish(self) -> Result<ExerciseSession> {
        let SessionHandle { commands, task, .. } = self;
        let result = task.await;
        drop(commands);
        result.map_err(|e| Error::Other(format!("session task failed: {e}")))
    }

    /// Stop the session without completing it
    pub async fn cancel(self) -> Result<ExerciseSession> {
        let SessionHandle { commands, task, .. } = self;
        drop(commands);
        task.await
            .map_err(|e| Error::Other(format!("session task failed: {e}")))
    }
}

/// Look up `exercise_id` and start a session for it.
///
/// A missing exercise is terminal: no session is created or persisted.
/// Must be called from within a tokio runtime.
pub fn start_session(
    catalog: &Catalog,
    exercise_id: &str,
    user_id: &str,
    persistence: SessionPersistence,
    timing: SessionTiming,
) -> Result<SessionHandle> {
    let exercise = catalog.require(exercise_id)?.clone();
    Ok(spawn_session(exercise, user_id, persistence, timing))
}

/// Start a session for an already resolved exercise
pub fn spawn_session(
    exercise: Exercise,
    user_id: &str,
    persistence: SessionPersistence,
    timing: SessionTiming,
) -> SessionHandle {
    let machine = SessionMachine::start(exercise, user_id, Utc::now());
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (snapshots_tx, snapshots_rx) = watch::channel(machine.snapshot());

    let task = tokio::spawn(run_session(
        machine,
        persistence,
        timing,
        commands_rx,
        snapshots_tx,
    ));

    SessionHandle {
        commands: commands_tx,
        snapshots: snapshots_rx,
        task,
        sent: AtomicU64::new(0),
    }
}

/// The one ticker allowed to run, matched to the machine's timer generation
struct Ticker {
    period: Duration,
    generation: u64,
    interval: Option<Interval>,
}

impl Ticker {
    fn new(period: Duration) -> Self {
        Self {
            period,
            generation: 0,
            interval: None,
        }
    }

    fn sync(&mut self, machine: &SessionMachine) {
        if machine.timer_generation() == self.generation {
            return;
        }
        self.generation = machine.timer_generation();
        self.interval = match machine.active_timer() {
            ActiveTimer::Idle => None,
            ActiveTimer::Exercise | ActiveTimer::Rest => {
                let mut interval = time::interval_at(Instant::now() + self.period, self.period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(interval)
            }
        };
    }

    async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

/// Apply one command. Returns the finished record when it completed the
/// session and must be persisted.
fn apply(machine: &mut SessionMachine, command: SessionCommand) -> Option<ExerciseSession> {
    match command {
        SessionCommand::StartSet => {
            machine.start_set();
        }
        SessionCommand::CompleteSet => {
            machine.complete_set();
        }
        SessionCommand::UpdateReps(reps) => {
            machine.update_current_reps(reps);
        }
        SessionCommand::Pause => {
            machine.pause();
        }
        SessionCommand::Resume => {
            machine.resume();
        }
        SessionCommand::CompleteSession(feedback) => {
            return machine.complete_session(Utc::now(), feedback);
        }
    }
    None
}

/// Write `record` on the blocking pool; file locks and fsync stay off the
/// async workers.
async fn persist(
    persistence: &Arc<Mutex<SessionPersistence>>,
    record: ExerciseSession,
) -> Option<String> {
    let persistence = Arc::clone(persistence);
    let id = record.id;
    let joined = tokio::task::spawn_blocking(move || match persistence.lock() {
        Ok(mut persistence) => persistence.save(&record),
        Err(_) => Some("session storage is unavailable".to_string()),
    })
    .await;

    joined.unwrap_or_else(|e| {
        tracing::error!("Saving session {} failed: {}", id, e);
        Some(format!("failed to save session: {e}"))
    })
}

async fn run_session(
    mut machine: SessionMachine,
    persistence: SessionPersistence,
    timing: SessionTiming,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    snapshots: watch::Sender<SessionSnapshot>,
) -> ExerciseSession {
    let persistence = Arc::new(Mutex::new(persistence));
    let mut applied: u64 = 0;
    let publish = |machine: &SessionMachine, applied: u64| {
        let mut snapshot = machine.snapshot();
        snapshot.commands_applied = applied;
        snapshots.send_replace(snapshot);
    };

    let error = persist(&persistence, machine.record().clone()).await;
    machine.set_error(error);
    publish(&machine, applied);

    let mut ticker = Ticker::new(timing.tick);
    ticker.sync(&machine);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => {
                    tracing::trace!("Session {} <- {:?}", machine.record().id, command);
                    if let Some(record) = apply(&mut machine, command) {
                        let error = persist(&persistence, record).await;
                        machine.set_error(error);
                    }
                    applied += 1;
                }
                None => {
                    tracing::info!("Session {} cancelled before completion", machine.record().id);
                    break;
                }
            },
            _ = ticker.tick() => {
                machine.tick();
            }
        }

        ticker.sync(&machine);
        publish(&machine, applied);

        if machine.is_completed() {
            time::sleep(timing.unwind_delay).await;
            machine.mark_unwind();
            publish(&machine, applied);
            break;
        }
    }

    machine.into_record()
}
