//! Single-slot write scheduler
//!
//! Each persist item owns one scheduler. The first update after a flush moves
//! it from `Idle` to `Pending` and arms the debounce timer; later updates merge
//! into the same buffer without re-arming. The flush takes the buffer and
//! returns the scheduler to `Idle`.

use crate::SliceMap;
use crate::error::{PersistError, Result};
use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

/// Completion signal for one `update()` call
///
/// Resolves once the flush carrying the update has settled. Dropping the
/// ticket is fine: the write still happens.
#[derive(Debug)]
pub struct WriteTicket {
    inner: TicketInner,
}

#[derive(Debug)]
enum TicketInner {
    Waiting(oneshot::Receiver<Result<()>>),
    Ready(Result<()>),
}

impl WriteTicket {
    pub(crate) fn ready(result: Result<()>) -> Self {
        Self {
            inner: TicketInner::Ready(result),
        }
    }

    /// Wait for the flush that includes this update
    pub async fn wait(self) -> Result<()> {
        match self.inner {
            TicketInner::Ready(result) => result,
            // Sender dropped without an answer: the item went away
            TicketInner::Waiting(rx) => rx.await.unwrap_or(Err(PersistError::Closed)),
        }
    }
}

/// Buffered slices waiting for the next flush
#[derive(Debug, Default)]
pub(crate) struct PendingWrite {
    pub buffer: SliceMap,
    pub tickets: Vec<oneshot::Sender<Result<()>>>,
}

impl PendingWrite {
    /// Deliver a flush result; returns how many tickets were still observed
    pub fn resolve(self, result: &Result<()>) -> usize {
        self.tickets
            .into_iter()
            .filter(|tx| !tx.is_closed())
            .map(|tx| tx.send(result.clone()).is_ok())
            .filter(|delivered| *delivered)
            .count()
    }
}

#[derive(Debug)]
enum SchedulerState {
    Idle,
    Pending(PendingWrite),
}

/// Outcome of [`WriteScheduler::schedule`]
pub(crate) struct Scheduled {
    pub ticket: WriteTicket,
    /// True when this call moved the scheduler to `Pending`; the caller must
    /// arm the timer
    pub armed: bool,
}

struct Slot {
    state: SchedulerState,
    closed: bool,
}

pub(crate) struct WriteScheduler {
    slot: Mutex<Slot>,
    closed_tx: watch::Sender<bool>,
}

impl WriteScheduler {
    pub fn new() -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            slot: Mutex::new(Slot {
                state: SchedulerState::Idle,
                closed: false,
            }),
            closed_tx,
        }
    }

    /// Merge slices into the pending buffer
    pub fn schedule(&self, slices: SliceMap) -> Scheduled {
        let mut slot = self.slot.lock();

        if slot.closed {
            return Scheduled {
                ticket: WriteTicket::ready(Err(PersistError::Closed)),
                armed: false,
            };
        }

        let (tx, rx) = oneshot::channel();
        let armed = matches!(slot.state, SchedulerState::Idle);
        if armed {
            slot.state = SchedulerState::Pending(PendingWrite::default());
        }

        if let SchedulerState::Pending(pending) = &mut slot.state {
            pending.buffer.extend(slices);
            pending.tickets.push(tx);
        }

        Scheduled {
            ticket: WriteTicket {
                inner: TicketInner::Waiting(rx),
            },
            armed,
        }
    }

    /// Take the pending buffer, returning to `Idle`
    pub fn take(&self) -> Option<PendingWrite> {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut slot.state, SchedulerState::Idle) {
            SchedulerState::Pending(pending) => Some(pending),
            SchedulerState::Idle => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.slot.lock().state, SchedulerState::Pending(_))
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    /// Refuse further updates and hand back whatever was still buffered
    pub fn close(&self) -> Option<PendingWrite> {
        let pending = {
            let mut slot = self.slot.lock();
            slot.closed = true;
            match std::mem::replace(&mut slot.state, SchedulerState::Idle) {
                SchedulerState::Pending(pending) => Some(pending),
                SchedulerState::Idle => None,
            }
        };
        self.closed_tx.send_replace(true);
        pending
    }

    /// Resolves once [`close`](Self::close) has been called
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }
}
