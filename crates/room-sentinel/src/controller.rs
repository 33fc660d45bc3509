//! Session lifecycle controller.
//!
//! The state machine at the centre of the bot. One run moves through
//!
//! ```text
//! Idle → Waiting → Joining → Active → Leaving → Done
//! ```
//!
//! monotonically, never revisiting a phase. The pre-join half is a blocking
//! presence poll (no call resources held, coarse granularity is fine); the
//! post-join half is event-driven off the transport's notification stream
//! (the engine already pushes departures, polling would be redundant and less
//! timely). Every event is guarded by a phase check; anything arriving
//! outside its phase is logged and dropped. There is no retry or recovery in
//! any state: a failed run terminates the process and is restarted
//! externally.

use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::SentinelError;
use crate::presence::{poll_until, PollPolicy, PresenceClient};
use crate::resolver::Room;
use crate::transport::{CallTransport, TransportEvent};

/// Lifecycle phase. Monotonically non-decreasing over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    Waiting,
    Joining,
    Active,
    Leaving,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Waiting => "waiting",
            Phase::Joining => "joining",
            Phase::Active => "active",
            Phase::Leaving => "leaving",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Drives one session from admission wait to departure.
///
/// Single-writer: only the controller's own transition handlers mutate the
/// phase. External observers watch the [`CancellationToken`] returned by
/// [`SessionController::done_token`], which fires exactly once on the
/// `Leaving → Done` transition.
pub struct SessionController<T: CallTransport> {
    room: Room,
    presence: PresenceClient,
    policy: PollPolicy,
    transport: T,
    events: mpsc::Receiver<TransportEvent>,
    phase: Phase,
    done: CancellationToken,
}

impl<T: CallTransport> SessionController<T> {
    /// Create a controller for `room`, taking ownership of the transport and
    /// its event stream.
    #[must_use]
    pub fn new(
        room: Room,
        presence: PresenceClient,
        policy: PollPolicy,
        transport: T,
        events: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self {
            room,
            presence,
            policy,
            transport,
            events,
            phase: Phase::Idle,
            done: CancellationToken::new(),
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the session reached its terminal phase.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Token cancelled exactly once when the session completes.
    ///
    /// Safe to observe from other tasks; this is the visibility-safe "done"
    /// signal for whatever loop supervises the process.
    #[must_use]
    pub fn done_token(&self) -> CancellationToken {
        self.done.clone()
    }

    /// Run the full lifecycle: wait for a participant, join, monitor
    /// departures, leave once alone.
    ///
    /// # Errors
    ///
    /// Any [`SentinelError`] from the wait, join or leave paths. All errors
    /// are fatal for the run.
    pub async fn run(&mut self) -> Result<(), SentinelError> {
        let count = self.wait().await?;
        info!(count, room = %self.room.name, "participant present, joining room");

        self.begin_join()?;

        while let Some(event) = self.events.recv().await {
            if self.handle_event(event)? {
                return Ok(());
            }
        }

        Err(SentinelError::Transport(
            "transport event stream closed before the session completed".into(),
        ))
    }

    /// Idle → Waiting: block on the presence poll until a participant shows
    /// up.
    async fn wait(&mut self) -> Result<u64, SentinelError> {
        self.advance(Phase::Waiting);
        info!(
            room = %self.room.name,
            interval = ?self.policy.interval,
            timeout = ?self.policy.timeout,
            "waiting for a participant to arrive"
        );

        let presence = &self.presence;
        poll_until(|| presence.total_count(), |count| count > 0, self.policy).await
    }

    /// Waiting → Joining: issue the asynchronous join.
    ///
    /// The phase moves to Joining before the join command is issued, so no
    /// departure event can ever be observed while the controller still
    /// considers itself pre-join.
    fn begin_join(&mut self) -> Result<(), SentinelError> {
        self.advance(Phase::Joining);
        self.transport
            .join(&self.room.room_url, &self.room.meeting_token)
    }

    /// Apply one transport event. Returns `true` once the session is done.
    ///
    /// Events outside their phase are dropped; completions and departures
    /// are assumed to arrive in the order the engine raised them.
    fn handle_event(&mut self, event: TransportEvent) -> Result<bool, SentinelError> {
        match (self.phase, event) {
            (Phase::Joining, TransportEvent::JoinCompleted { error: None }) => {
                let counts = self.transport.participant_counts();
                info!(present = counts.present, "joined room");

                // The poll phase guaranteed someone was present before the
                // join, so a zero count here is a protocol inconsistency.
                // Deliberately the weak form of the check (>= 1, counting
                // the bot itself).
                if counts.present == 0 {
                    return Err(SentinelError::JoinInvariant {
                        present: counts.present,
                    });
                }
                self.advance(Phase::Active);
                Ok(false)
            }
            (Phase::Joining, TransportEvent::JoinCompleted { error: Some(detail) }) => {
                Err(SentinelError::Join(detail))
            }
            (Phase::Active, TransportEvent::ParticipantLeft {
                participant,
                reason,
            }) => {
                let counts = self.transport.participant_counts();
                debug!(
                    participant = %participant,
                    reason = %reason,
                    present = counts.present,
                    "participant left"
                );

                if counts.present == 1 {
                    info!("bot is the last participant in the room, leaving");
                    self.advance(Phase::Leaving);
                    self.transport.leave()?;
                }
                Ok(false)
            }
            (Phase::Leaving, TransportEvent::LeaveCompleted { error: None }) => {
                self.advance(Phase::Done);
                self.done.cancel();
                info!(room = %self.room.name, "left room, session complete");
                Ok(true)
            }
            (Phase::Leaving, TransportEvent::LeaveCompleted { error: Some(detail) }) => {
                Err(SentinelError::Leave(detail))
            }
            (phase, event) => {
                warn!(%phase, ?event, "ignoring transport event outside its phase");
                Ok(false)
            }
        }
    }

    fn advance(&mut self, next: Phase) {
        debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::transport::ParticipantCounts;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Transport double: records issued commands, serves a settable count.
    #[derive(Clone, Default)]
    struct FakeTransport {
        present: Arc<AtomicU64>,
        join_calls: Arc<AtomicUsize>,
        leave_calls: Arc<AtomicUsize>,
    }

    impl FakeTransport {
        fn set_present(&self, present: u64) {
            self.present.store(present, Ordering::SeqCst);
        }
    }

    impl CallTransport for FakeTransport {
        fn join(
            &mut self,
            _room_url: &str,
            _meeting_token: &SecretString,
        ) -> Result<(), SentinelError> {
            self.join_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn leave(&mut self) -> Result<(), SentinelError> {
            self.leave_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn participant_counts(&self) -> ParticipantCounts {
            ParticipantCounts {
                present: self.present.load(Ordering::SeqCst),
            }
        }
    }

    fn test_room() -> Room {
        Room {
            name: "room123".to_string(),
            room_url: "https://mycompany.daily.co/room123".to_string(),
            api_base_url: "https://api.daily.co/v1/".to_string(),
            meeting_token: SecretString::from("token"),
        }
    }

    fn test_controller() -> (SessionController<FakeTransport>, FakeTransport) {
        let room = test_room();
        let presence = PresenceClient::new(
            reqwest::Client::new(),
            &room,
            SecretString::from("test-api-key"),
        );
        let transport = FakeTransport::default();
        let (_event_tx, event_rx) = mpsc::channel(8);
        let controller = SessionController::new(
            room,
            presence,
            PollPolicy::default(),
            transport.clone(),
            event_rx,
        );
        (controller, transport)
    }

    fn departure() -> TransportEvent {
        TransportEvent::ParticipantLeft {
            participant: "p-1".to_string(),
            reason: "leftCall".to_string(),
        }
    }

    #[test]
    fn test_begin_join_sets_phase_before_issuing_join() {
        let (mut controller, transport) = test_controller();

        controller.begin_join().expect("join should issue");

        assert_eq!(controller.phase(), Phase::Joining);
        assert_eq!(transport.join_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_join_completion_with_participants_goes_active() {
        let (mut controller, transport) = test_controller();
        controller.begin_join().expect("join should issue");
        transport.set_present(2);

        let done = controller
            .handle_event(TransportEvent::JoinCompleted { error: None })
            .expect("event should apply");

        assert!(!done);
        assert_eq!(controller.phase(), Phase::Active);
    }

    #[test]
    fn test_join_completion_with_zero_present_violates_invariant() {
        let (mut controller, transport) = test_controller();
        controller.begin_join().expect("join should issue");
        transport.set_present(0);

        let result = controller.handle_event(TransportEvent::JoinCompleted { error: None });

        assert!(matches!(
            result,
            Err(SentinelError::JoinInvariant { present: 0 })
        ));
        // Never transitions to Active.
        assert_eq!(controller.phase(), Phase::Joining);
    }

    #[test]
    fn test_join_completion_error_is_fatal() {
        let (mut controller, _transport) = test_controller();
        controller.begin_join().expect("join should issue");

        let result = controller.handle_event(TransportEvent::JoinCompleted {
            error: Some("no access".to_string()),
        });

        match result {
            Err(SentinelError::Join(detail)) => assert_eq!(detail, "no access"),
            other => panic!("expected Join error, got {other:?}"),
        }
    }

    #[test]
    fn test_departure_with_others_present_stays_active() {
        let (mut controller, transport) = test_controller();
        controller.begin_join().expect("join should issue");
        transport.set_present(4);
        controller
            .handle_event(TransportEvent::JoinCompleted { error: None })
            .expect("event should apply");

        transport.set_present(3);
        let done = controller.handle_event(departure()).expect("event should apply");

        assert!(!done);
        assert_eq!(controller.phase(), Phase::Active);
        assert_eq!(transport.leave_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_departure_leaving_bot_alone_triggers_exactly_one_leave() {
        let (mut controller, transport) = test_controller();
        controller.begin_join().expect("join should issue");
        transport.set_present(2);
        controller
            .handle_event(TransportEvent::JoinCompleted { error: None })
            .expect("event should apply");

        transport.set_present(1);
        controller.handle_event(departure()).expect("event should apply");
        assert_eq!(controller.phase(), Phase::Leaving);

        // A straggler departure event after the leave was issued is ignored.
        controller.handle_event(departure()).expect("event should apply");
        assert_eq!(transport.leave_calls.load(Ordering::SeqCst), 1);
        assert_eq!(controller.phase(), Phase::Leaving);
    }

    #[test]
    fn test_leave_completion_finishes_the_session_once() {
        let (mut controller, transport) = test_controller();
        let done_token = controller.done_token();
        controller.begin_join().expect("join should issue");
        transport.set_present(2);
        controller
            .handle_event(TransportEvent::JoinCompleted { error: None })
            .expect("event should apply");
        transport.set_present(1);
        controller.handle_event(departure()).expect("event should apply");

        assert!(!done_token.is_cancelled());
        let done = controller
            .handle_event(TransportEvent::LeaveCompleted { error: None })
            .expect("event should apply");

        assert!(done);
        assert!(controller.is_done());
        assert!(done_token.is_cancelled());

        // Nothing re-enters Joining or Leaving after Done.
        controller.handle_event(departure()).expect("event should apply");
        controller
            .handle_event(TransportEvent::JoinCompleted { error: None })
            .expect("event should apply");
        assert_eq!(controller.phase(), Phase::Done);
        assert_eq!(transport.leave_calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.join_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_leave_completion_error_is_fatal() {
        let (mut controller, transport) = test_controller();
        controller.begin_join().expect("join should issue");
        transport.set_present(2);
        controller
            .handle_event(TransportEvent::JoinCompleted { error: None })
            .expect("event should apply");
        transport.set_present(1);
        controller.handle_event(departure()).expect("event should apply");

        let result = controller.handle_event(TransportEvent::LeaveCompleted {
            error: Some("engine hiccup".to_string()),
        });

        match result {
            Err(SentinelError::Leave(detail)) => assert_eq!(detail, "engine hiccup"),
            other => panic!("expected Leave error, got {other:?}"),
        }
    }

    #[test]
    fn test_departure_before_active_is_ignored() {
        let (mut controller, transport) = test_controller();
        controller.begin_join().expect("join should issue");
        transport.set_present(1);

        // Departure arriving while still Joining must not trigger a leave.
        let done = controller.handle_event(departure()).expect("event should apply");

        assert!(!done);
        assert_eq!(controller.phase(), Phase::Joining);
        assert_eq!(transport.leave_calls.load(Ordering::SeqCst), 0);
    }
}
