use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use rocket::tokio::sync::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Identity, ResultRecord};

pub const DEFAULT_EXAM_DURATION_SECS: u32 = 3600;

/// Exam lifecycle. Once Active, the only exits are timeout or submission;
/// there is no pause and no path back to Idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Active,
    Submitting,
    Terminal,
}

/// Client-reported lockdown and proctoring signals. Best-effort deterrents
/// only; none of them can fail the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProctorEvent {
    TabHidden,
    BlockedShortcut,
    FullscreenDenied,
    FullscreenExited,
}

impl ProctorEvent {
    pub fn advisory(&self) -> &'static str {
        match self {
            ProctorEvent::TabHidden => "Tab switching detected. This action has been logged.",
            ProctorEvent::BlockedShortcut => "Developer tools are disabled during the exam.",
            ProctorEvent::FullscreenDenied => {
                "Full-screen could not be enabled. The exam continues without lockdown."
            }
            ProctorEvent::FullscreenExited => "Exam mode requires full-screen. Please return.",
        }
    }

    /// Lockdown failures are logged but not counted against the student.
    fn counts_as_warning(&self) -> bool {
        !matches!(self, ProctorEvent::FullscreenDenied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running { seconds_remaining: u32 },
    Expired,
    Ignored,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub attempt_id: String,
    pub roll: String,
    pub phase: Phase,
    pub seconds_remaining: u32,
    pub warnings: u32,
    pub locked_down: bool,
    pub started_at: DateTime<Utc>,
}

/// One timed exam attempt, from identity check to submission.
#[derive(Debug)]
pub struct ExamSession {
    attempt_id: String,
    identity: Identity,
    phase: Phase,
    seconds_remaining: u32,
    warnings: u32,
    locked_down: bool,
    started_at: DateTime<Utc>,
}

impl ExamSession {
    pub fn start(identity: Identity, duration_secs: u32) -> Self {
        Self {
            attempt_id: Uuid::new_v4().to_string(),
            identity,
            phase: Phase::Active,
            seconds_remaining: duration_secs,
            warnings: 0,
            locked_down: true,
            started_at: Utc::now(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    pub fn warnings(&self) -> u32 {
        self.warnings
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            attempt_id: self.attempt_id.clone(),
            roll: self.identity.roll.clone(),
            phase: self.phase,
            seconds_remaining: self.seconds_remaining,
            warnings: self.warnings,
            locked_down: self.locked_down,
            started_at: self.started_at,
        }
    }

    /// Advances the countdown by one second. Remaining time decreases by
    /// exactly one per call and never goes negative; the tick that reaches
    /// zero moves the session to Submitting. Ticks after that are ignored,
    /// so a late tick can never trigger a second submission.
    pub fn tick(&mut self) -> Tick {
        if self.phase != Phase::Active {
            return Tick::Ignored;
        }

        self.seconds_remaining -= 1;
        if self.seconds_remaining == 0 {
            self.phase = Phase::Submitting;
            return Tick::Expired;
        }

        Tick::Running {
            seconds_remaining: self.seconds_remaining,
        }
    }

    pub fn record_event(&mut self, event: ProctorEvent) -> &'static str {
        if event.counts_as_warning() {
            self.warnings += 1;
            warn!(
                roll = %self.identity.roll,
                event = ?event,
                warnings = self.warnings,
                "Proctor event recorded"
            );
        } else {
            self.locked_down = false;
            warn!(roll = %self.identity.roll, "Lockdown request failed, continuing without it");
        }

        event.advisory()
    }

    /// Moves the session to Terminal and synthesizes the result record.
    /// Idempotent: once Terminal, returns None and no further record is
    /// ever produced.
    pub fn submit<R: Rng>(&mut self, rng: &mut R) -> Option<ResultRecord> {
        match self.phase {
            Phase::Active | Phase::Submitting => {
                self.phase = Phase::Terminal;
                Some(synthesize_result(&self.identity, rng))
            }
            Phase::Idle | Phase::Terminal => None,
        }
    }
}

/// Score components are uniform pseudo-random, not derived from the
/// submitted code. This is a demo product; the grades are theatre.
pub fn synthesize_result<R: Rng>(identity: &Identity, rng: &mut R) -> ResultRecord {
    ResultRecord {
        display_name: identity.display_name.clone(),
        roll: identity.roll.clone(),
        score: rng.random_range(55u8..100),
        speed: rng.random_range(50u8..100),
        efficiency: rng.random_range(60u8..100),
        completed_at: Utc::now(),
    }
}

/// Live exam sessions, keyed by roll number. The countdown task is the
/// only caller of `tick_all`, so ticks are strictly sequential.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, ExamSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a fresh attempt for this roll, replacing any previous one.
    #[instrument(skip(self, identity), fields(roll = %identity.roll))]
    pub async fn start_session(
        &self,
        identity: Identity,
        duration_secs: u32,
    ) -> Result<SessionSnapshot, AppError> {
        if duration_secs == 0 {
            return Err(AppError::Validation(
                "Exam duration must be at least one second".to_string(),
            ));
        }

        info!(duration_secs, "Starting exam session");
        let session = ExamSession::start(identity.clone(), duration_secs);
        let snapshot = session.snapshot();

        let mut sessions = self.sessions.write().await;
        sessions.insert(identity.roll, session);

        Ok(snapshot)
    }

    pub async fn snapshot(&self, roll: &str) -> Option<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        sessions.get(roll).map(ExamSession::snapshot)
    }

    pub async fn record_event(
        &self,
        roll: &str,
        event: ProctorEvent,
    ) -> Result<(&'static str, u32), AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(roll)
            .ok_or_else(|| AppError::NotFound(format!("No active session for roll {roll}")))?;

        let advisory = session.record_event(event);
        Ok((advisory, session.warnings()))
    }

    /// Manual submission. Returns None when the session already reached
    /// Terminal (for example through a timeout that raced the request).
    #[instrument(skip(self))]
    pub async fn submit(&self, roll: &str) -> Result<Option<ResultRecord>, AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(roll)
            .ok_or_else(|| AppError::NotFound(format!("No active session for roll {roll}")))?;

        let mut rng = rand::rng();
        Ok(session.submit(&mut rng))
    }

    /// Advances every Active session by one second and finalizes the ones
    /// whose countdown reached zero, returning their result records.
    pub async fn tick_all(&self) -> Vec<ResultRecord> {
        let mut sessions = self.sessions.write().await;
        let mut finished = Vec::new();
        let mut rng = rand::rng();

        for session in sessions.values_mut() {
            if session.tick() == Tick::Expired {
                if let Some(record) = session.submit(&mut rng) {
                    info!(roll = %record.roll, "Exam timed out, auto-submitting");
                    finished.push(record);
                }
            }
        }

        finished
    }

    /// Drops Terminal sessions so a finished attempt does not linger in
    /// memory. Returns the number removed.
    pub async fn reap_terminal(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.phase() != Phase::Terminal);
        before - sessions.len()
    }

    pub async fn active_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .filter(|s| s.phase() == Phase::Active)
            .count()
    }
}
