//! Shared per-axis state written by the receive path and read by the controller.
//!
//! The store is the only place decoded responses land. Every inbound event
//! bumps a generation counter and wakes waiters, so the controller waits on
//! the arrival of a response rather than assuming a fixed delay was enough.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::axis::AxisId;
use super::messages::{HardwareInfo, Message};
use super::status::StatusBits;

/// Number of recent events retained for waiters.
const EVENT_HISTORY: usize = 64;

/// Last known state of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisState {
    /// Position in physical units (degrees or µm)
    pub position: f64,
    /// Moving flag (status bit 4 or 5)
    pub moving: bool,
    /// Raw status word from the last status update
    pub status: StatusBits,
}

/// Something the receive path observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Encoder counter applied to an axis
    Position(AxisId),
    /// Status update applied to an axis
    Status(AxisId),
    /// Hardware information received
    HardwareInfo,
    /// A frame arrived shorter than its header declared
    Truncated,
}

#[derive(Debug, Default)]
struct StoreInner {
    axes: [AxisState; 4],
    hardware_info: Option<HardwareInfo>,
    last_queried: Option<AxisId>,
    generation: u64,
    events: VecDeque<(u64, LinkEvent)>,
}

impl StoreInner {
    fn push_event(&mut self, event: LinkEvent) -> u64 {
        self.generation += 1;
        if self.events.len() == EVENT_HISTORY {
            self.events.pop_front();
        }
        self.events.push_back((self.generation, event));
        self.generation
    }
}

/// Per-axis position and motion status, shared between threads.
#[derive(Debug, Default)]
pub struct AxisStatusStore {
    inner: Mutex<StoreInner>,
    signal: Condvar,
}

impl AxisStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a decoded response and wake waiters.
    ///
    /// Returns the recorded event, or `None` for messages that carry no
    /// state (unknown ids).
    pub fn apply(&self, message: Message) -> Option<LinkEvent> {
        let mut inner = self.lock();
        let event = match message {
            Message::MotorStatusUpdate {
                axis,
                raw_position,
                status,
            } => {
                inner.axes[axis.index()] = AxisState {
                    position: axis.raw_to_physical(raw_position),
                    moving: status.is_moving(),
                    status,
                };
                LinkEvent::Status(axis)
            }
            Message::EncoderCounter { axis, raw_position } => {
                inner.axes[axis.index()].position = axis.raw_to_physical(raw_position);
                LinkEvent::Position(axis)
            }
            Message::HardwareInfo(info) => {
                inner.hardware_info = Some(info);
                LinkEvent::HardwareInfo
            }
            Message::Unknown { .. } => return None,
        };
        inner.push_event(event);
        drop(inner);
        self.signal.notify_all();
        Some(event)
    }

    /// Record that a truncated frame was received.
    pub fn report_truncated(&self) {
        self.lock().push_event(LinkEvent::Truncated);
        self.signal.notify_all();
    }

    /// Remember which axis the next encoder counter response belongs to.
    pub fn note_query(&self, axis: AxisId) {
        self.lock().last_queried = Some(axis);
    }

    pub fn last_queried(&self) -> Option<AxisId> {
        self.lock().last_queried
    }

    pub fn axis_state(&self, axis: AxisId) -> AxisState {
        self.lock().axes[axis.index()]
    }

    /// Copy of all four axis states, in axis order.
    pub fn snapshot(&self) -> [AxisState; 4] {
        self.lock().axes
    }

    pub fn hardware_info(&self) -> Option<HardwareInfo> {
        self.lock().hardware_info.clone()
    }

    /// True when every axis last reported its moving flag clear.
    pub fn all_settled(&self) -> bool {
        self.lock().axes.iter().all(|state| !state.moving)
    }

    /// Generation of the most recent event.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Block until an event newer than `since` is recorded or `timeout` elapses.
    ///
    /// Returns the oldest such event with its generation.
    pub fn wait_for_event(&self, since: u64, timeout: Duration) -> Option<(u64, LinkEvent)> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if let Some(&found) = inner.events.iter().find(|(generation, _)| *generation > since) {
                return Some(found);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .signal
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_status_update_sets_position_and_moving() {
        let store = AxisStatusStore::new();
        let event = store.apply(Message::MotorStatusUpdate {
            axis: AxisId::Z,
            raw_position: 125,
            status: StatusBits::MOVING_CW,
        });
        assert_eq!(event, Some(LinkEvent::Status(AxisId::Z)));

        let state = store.axis_state(AxisId::Z);
        assert_abs_diff_eq!(state.position, 12.5, epsilon = 1e-12);
        assert!(state.moving);
        assert!(!store.all_settled());
    }

    #[test]
    fn test_encoder_counter_keeps_moving_flag() {
        let store = AxisStatusStore::new();
        store.apply(Message::MotorStatusUpdate {
            axis: AxisId::X,
            raw_position: 0,
            status: StatusBits::MOVING_CCW,
        });
        store.apply(Message::EncoderCounter {
            axis: AxisId::X,
            raw_position: -20,
        });

        let state = store.axis_state(AxisId::X);
        assert_abs_diff_eq!(state.position, -10.0);
        assert!(state.moving);
    }

    #[test]
    fn test_unknown_message_records_nothing() {
        let store = AxisStatusStore::new();
        let event = store.apply(Message::Unknown {
            message_id: 0x0464,
            payload: vec![],
        });
        assert_eq!(event, None);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_wait_returns_oldest_newer_event() {
        let store = AxisStatusStore::new();
        store.report_truncated();
        let since = store.generation();
        store.report_truncated();
        store.apply(Message::EncoderCounter {
            axis: AxisId::Y,
            raw_position: 4,
        });

        let (generation, event) = store.wait_for_event(since, Duration::ZERO).unwrap();
        assert_eq!(generation, since + 1);
        assert_eq!(event, LinkEvent::Truncated);

        let (_, event) = store.wait_for_event(generation, Duration::ZERO).unwrap();
        assert_eq!(event, LinkEvent::Position(AxisId::Y));
    }

    #[test]
    fn test_wait_times_out_without_events() {
        let store = AxisStatusStore::new();
        assert_eq!(store.wait_for_event(0, Duration::from_millis(10)), None);
    }

    #[test]
    fn test_wait_wakes_on_arrival_from_other_thread() {
        let store = Arc::new(AxisStatusStore::new());
        let writer = Arc::clone(&store);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            writer.apply(Message::MotorStatusUpdate {
                axis: AxisId::Rotary,
                raw_position: 1000,
                status: StatusBits::empty(),
            });
        });

        let event = store.wait_for_event(0, Duration::from_secs(5));
        handle.join().unwrap();
        assert_eq!(event, Some((1, LinkEvent::Status(AxisId::Rotary))));
        assert_abs_diff_eq!(store.axis_state(AxisId::Rotary).position, 0.12, epsilon = 1e-12);
    }

    #[test]
    fn test_last_queried() {
        let store = AxisStatusStore::new();
        assert_eq!(store.last_queried(), None);
        store.note_query(AxisId::Z);
        assert_eq!(store.last_queried(), Some(AxisId::Z));
    }
}
