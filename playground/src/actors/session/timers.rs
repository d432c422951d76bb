//! Cancellable one-shot timers that cast back into the session.
//!
//! Each arming bumps a generation counter. A firing that carries an older
//! generation is ignored, so an abort that races with delivery is harmless.

use std::time::Duration;

use ractor::ActorRef;
use tokio::task::JoinHandle;

use super::SessionMsg;

#[derive(Default)]
pub struct TimerSlot {
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    pub fn schedule(&mut self, session: &ActorRef<SessionMsg>, delay: Duration, message: SessionMsg) {
        self.cancel();
        let session = session.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = session.cast(message);
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Stall and escalation timers for one initialization attempt.
#[derive(Default)]
pub struct InitWatchdog {
    generation: u64,
    stall: TimerSlot,
    escalation: TimerSlot,
}

impl InitWatchdog {
    pub fn arm(&mut self, session: &ActorRef<SessionMsg>, stall: Duration, escalation: Duration) {
        self.generation += 1;
        let generation = self.generation;
        self.stall
            .schedule(session, stall, SessionMsg::StallTimerFired { generation });
        self.escalation.schedule(
            session,
            escalation,
            SessionMsg::EscalationTimerFired { generation },
        );
    }

    pub fn disarm(&mut self) {
        self.generation += 1;
        self.stall.cancel();
        self.escalation.cancel();
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }
}

/// Delayed trigger for post-run context replacement.
#[derive(Default)]
pub struct ReplacementTimer {
    generation: u64,
    slot: TimerSlot,
}

impl ReplacementTimer {
    pub fn schedule(&mut self, session: &ActorRef<SessionMsg>, grace: Duration) {
        self.generation += 1;
        let generation = self.generation;
        self.slot
            .schedule(session, grace, SessionMsg::ReplacementDue { generation });
    }

    pub fn cancel(&mut self) {
        self.generation += 1;
        self.slot.cancel();
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }
}
