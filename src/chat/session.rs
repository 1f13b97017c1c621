//! Per-conversation session state
//!
//! A session owns its transcript and the `generating` flag that keeps a second
//! submission out while a reply is being produced.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};
use uuid::Uuid;

use super::transcript::Transcript;

/// Snapshot emitted to the front end after every change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnUpdate {
    pub transcript: Transcript,
    pub is_generating: bool,
    /// What the input box should hold: empty once a message is accepted, the
    /// rejected text otherwise
    pub input: String,
}

/// Phase of the turn a session is working on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingUser,
    Streaming,
    Finalizing,
    Idle,
}

impl TurnPhase {
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::AwaitingUser | Self::Idle)
    }

    pub fn status_message(&self) -> &'static str {
        match self {
            Self::AwaitingUser => "Ready",
            Self::Streaming => "Receiving reply...",
            Self::Finalizing => "Processing reply...",
            Self::Idle => "Done",
        }
    }
}

#[derive(Debug)]
pub struct ChatSession {
    id: Uuid,
    transcript: Mutex<Transcript>,
    generating: AtomicBool,
    phase: Mutex<TurnPhase>,
    // Bumped for every accepted submission and reset; a turn only publishes
    // while its epoch is current
    epoch: AtomicU64,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_transcript(Transcript::new())
    }

    pub fn with_transcript(transcript: Transcript) -> Self {
        Self {
            id: Uuid::new_v4(),
            transcript: Mutex::new(transcript),
            generating: AtomicBool::new(false),
            phase: Mutex::new(TurnPhase::AwaitingUser),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn lock_transcript(&self) -> MutexGuard<'_, Transcript> {
        self.transcript.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn transcript(&self) -> Transcript {
        self.lock_transcript().clone()
    }

    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> TurnPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claim the session for a new turn
    ///
    /// Returns the turn's epoch and the history it starts from, or `None`
    /// while another turn is generating. A user turn left unanswered by a
    /// stopped turn is not part of that history.
    pub(crate) fn try_begin(&self) -> Option<(u64, Transcript)> {
        self.generating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        let (epoch, mut history) = {
            let current = self.lock_transcript();
            (self.epoch.fetch_add(1, Ordering::SeqCst) + 1, current.clone())
        };
        if let Some(dropped) = history.drop_unanswered() {
            debug!(session_id = %self.id, chars = dropped.content.chars().count(), "Dropped unanswered user turn");
        }
        debug!(session_id = %self.id, epoch, "Turn started");
        Some((epoch, history))
    }

    /// Store `transcript` if `epoch` is still the current turn
    pub(crate) fn publish(&self, epoch: u64, transcript: &Transcript) -> bool {
        let mut current = self.lock_transcript();
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        *current = transcript.clone();
        true
    }

    pub(crate) fn set_phase(&self, epoch: u64, phase: TurnPhase) {
        if self.epoch.load(Ordering::SeqCst) == epoch {
            *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
        }
    }

    /// Release the session at the end of a turn
    pub(crate) fn finish(&self, epoch: u64) {
        if self.epoch.load(Ordering::SeqCst) == epoch {
            self.generating.store(false, Ordering::SeqCst);
            self.set_phase(epoch, TurnPhase::Idle);
        }
        debug!(session_id = %self.id, epoch, "Turn finished");
    }

    /// Accept new submissions again; work already running is not interrupted
    pub fn stop(&self) {
        if self.generating.swap(false, Ordering::SeqCst) {
            info!(session_id = %self.id, "Generation stopped by user");
        }
    }

    /// Start over with an empty transcript
    pub fn reset(&self) {
        let mut transcript = self.lock_transcript();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        transcript.clear();
        self.generating.store(false, Ordering::SeqCst);
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = TurnPhase::AwaitingUser;
        info!(session_id = %self.id, "Session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_is_rejected_until_finish() {
        let session = ChatSession::new();
        let (epoch, _) = session.try_begin().unwrap();
        assert!(session.is_generating());
        assert!(session.try_begin().is_none());

        session.finish(epoch);
        assert!(!session.is_generating());
        assert_eq!(session.phase(), TurnPhase::Idle);
        assert!(session.try_begin().is_some());
    }

    #[test]
    fn test_stop_frees_session_and_stale_turn_stops_publishing() {
        let session = ChatSession::new();
        let (stale, _) = session.try_begin().unwrap();
        session.stop();
        assert!(!session.is_generating());

        let (fresh, _) = session.try_begin().unwrap();
        let mut t = Transcript::new();
        t.push_user("old");
        assert!(!session.publish(stale, &t));

        t.push_assistant("reply");
        assert!(session.publish(fresh, &t));
        assert_eq!(session.transcript().len(), 2);

        // A stale finish leaves the fresh turn's flag alone
        session.finish(stale);
        assert!(session.is_generating());
    }

    #[test]
    fn test_reset_clears_transcript() {
        let mut t = Transcript::new();
        t.push_user("hi");
        t.push_assistant("hello");
        let session = ChatSession::with_transcript(t);
        session.reset();
        assert!(session.transcript().is_empty());
        assert_eq!(session.phase(), TurnPhase::AwaitingUser);
    }

    #[test]
    fn test_history_skips_unanswered_user_turn() {
        let mut t = Transcript::new();
        t.push_user("q1");
        t.push_assistant("a1");
        t.push_user("q2");
        let session = ChatSession::with_transcript(t);

        let (_, history) = session.try_begin().unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.is_balanced());
    }

    #[test]
    fn test_phase_accepts_input() {
        assert!(TurnPhase::AwaitingUser.accepts_input());
        assert!(TurnPhase::Idle.accepts_input());
        assert!(!TurnPhase::Streaming.accepts_input());
        assert!(!TurnPhase::Finalizing.accepts_input());
    }
}
