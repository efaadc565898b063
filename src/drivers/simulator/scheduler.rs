use crate::gear::handler::GearEvent;
use crate::gear::hal::{Scheduler, TimerId};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct ManualCtxt {
    now: Duration,
    generation: u32,
    deadlines: HashMap<TimerId, (Duration, u32)>,
    // Expired but not yet claimed by the engine
    expired: HashMap<TimerId, u32>,
}

/// Timers on a simulated clock that only moves when told to. Clones share
/// the clock.
#[derive(Clone)]
pub struct ManualScheduler {
    ctxt: Arc<Mutex<ManualCtxt>>,
}

impl ManualScheduler {
    pub fn new() -> ManualScheduler {
        ManualScheduler {
            ctxt: Arc::new(Mutex::new(ManualCtxt {
                now: Duration::ZERO,
                generation: 0,
                deadlines: HashMap::new(),
                expired: HashMap::new(),
            })),
        }
    }

    pub fn now(&self) -> Duration {
        self.ctxt.lock().map(|c| c.now).unwrap_or_default()
    }

    /// Move the clock forward and return the timeout events of the timers
    /// that expired, earliest first.
    pub fn advance(&self, time: Duration) -> Vec<GearEvent> {
        let mut ctxt = match self.ctxt.lock() {
            Ok(ctxt) => ctxt,
            Err(_) => return Vec::new(),
        };
        ctxt.now += time;
        let now = ctxt.now;
        let mut expired: Vec<(Duration, TimerId, u32)> = ctxt
            .deadlines
            .iter()
            .filter(|(_, &(deadline, _))| deadline <= now)
            .map(|(&id, &(deadline, generation))| (deadline, id, generation))
            .collect();
        expired.sort_by_key(|(deadline, _, _)| *deadline);
        for (_, id, generation) in &expired {
            ctxt.deadlines.remove(id);
            ctxt.expired.insert(*id, *generation);
        }
        expired
            .into_iter()
            .map(|(_, id, generation)| GearEvent::Timeout(id, generation))
            .collect()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        ManualScheduler::new()
    }
}

impl Scheduler for ManualScheduler {
    fn start_timer(&mut self, id: TimerId, duration: Duration) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.generation = ctxt.generation.wrapping_add(1);
            let entry = (ctxt.now + duration, ctxt.generation);
            ctxt.expired.remove(&id);
            ctxt.deadlines.insert(id, entry);
        }
    }

    fn stop_timer(&mut self, id: TimerId) {
        if let Ok(mut ctxt) = self.ctxt.lock() {
            ctxt.deadlines.remove(&id);
            ctxt.expired.remove(&id);
        }
    }

    fn is_running(&self, id: TimerId) -> bool {
        self.ctxt
            .lock()
            .map(|c| c.deadlines.contains_key(&id))
            .unwrap_or(false)
    }

    fn claim_expiry(&mut self, id: TimerId, generation: u32) -> bool {
        match self.ctxt.lock() {
            Ok(mut ctxt) if ctxt.expired.get(&id) == Some(&generation) => {
                ctxt.expired.remove(&id);
                true
            }
            _ => false,
        }
    }
}

struct TokioTimer {
    generation: u32,
    handle: JoinHandle<()>,
}

/// Timers as tokio tasks posting `GearEvent::Timeout` to the engine queue.
/// Must be used from within a tokio runtime.
pub struct TokioScheduler {
    events: mpsc::Sender<GearEvent>,
    generation: u32,
    timers: HashMap<TimerId, TokioTimer>,
}

impl TokioScheduler {
    pub fn new(events: mpsc::Sender<GearEvent>) -> TokioScheduler {
        TokioScheduler {
            events,
            generation: 0,
            timers: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn start_timer(&mut self, id: TimerId, duration: Duration) {
        self.stop_timer(id);
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if events.send(GearEvent::Timeout(id, generation)).await.is_err() {
                debug!("Engine gone, dropped {:?} timeout", id);
            }
        });
        self.timers.insert(id, TokioTimer { generation, handle });
    }

    fn stop_timer(&mut self, id: TimerId) {
        if let Some(timer) = self.timers.remove(&id) {
            timer.handle.abort();
        }
    }

    fn is_running(&self, id: TimerId) -> bool {
        self.timers
            .get(&id)
            .map(|t| !t.handle.is_finished())
            .unwrap_or(false)
    }

    // The task may not be marked finished yet when its event is received,
    // so only the generation decides.
    fn claim_expiry(&mut self, id: TimerId, generation: u32) -> bool {
        match self.timers.get(&id) {
            Some(timer) if timer.generation == generation => {
                self.timers.remove(&id);
                true
            }
            _ => false,
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
    }
}

#[cfg(test)]
fn timeout_ids(events: Vec<GearEvent>) -> Vec<TimerId> {
    events
        .into_iter()
        .filter_map(|ev| match ev {
            GearEvent::Timeout(id, _) => Some(id),
            _ => None,
        })
        .collect()
}

#[test]
fn manual_timers_restart() {
    let mut sched = ManualScheduler::new();
    let clock = sched.clone();
    sched.start_timer(TimerId::RepeatWindow, Duration::from_millis(100));
    sched.start_timer(TimerId::DapcSequence, Duration::from_millis(200));
    assert!(clock.advance(Duration::from_millis(60)).is_empty());
    // Restarting replaces the old deadline
    sched.start_timer(TimerId::RepeatWindow, Duration::from_millis(100));
    assert!(clock.advance(Duration::from_millis(60)).is_empty());
    assert_eq!(
        timeout_ids(clock.advance(Duration::from_millis(80))),
        vec![TimerId::RepeatWindow, TimerId::DapcSequence]
    );
    assert!(!sched.is_running(TimerId::RepeatWindow));
    sched.start_timer(TimerId::Commissioning, Duration::from_secs(1));
    sched.stop_timer(TimerId::Commissioning);
    assert!(clock.advance(Duration::from_secs(2)).is_empty());
}

#[test]
fn manual_expiry_claimed_once() {
    let mut sched = ManualScheduler::new();
    let clock = sched.clone();
    sched.start_timer(TimerId::ResponseDelay, Duration::from_millis(2));
    let events = clock.advance(Duration::from_millis(5));
    let generation = match events.as_slice() {
        [GearEvent::Timeout(TimerId::ResponseDelay, g)] => *g,
        e => panic!("Expected one timeout, got {:?}", e),
    };
    assert!(sched.claim_expiry(TimerId::ResponseDelay, generation));
    assert!(!sched.claim_expiry(TimerId::ResponseDelay, generation));

    // Restarted after expiring
    sched.start_timer(TimerId::RepeatWindow, Duration::from_millis(2));
    let events = clock.advance(Duration::from_millis(5));
    sched.start_timer(TimerId::RepeatWindow, Duration::from_millis(100));
    for ev in events {
        if let GearEvent::Timeout(id, generation) = ev {
            assert!(!sched.claim_expiry(id, generation));
        }
    }
    assert!(sched.is_running(TimerId::RepeatWindow));
}

#[tokio::test]
async fn tokio_expiry_claimed_by_generation() {
    tokio::time::pause();
    let (tx, mut rx) = mpsc::channel(8);
    let mut sched = TokioScheduler::new(tx);
    sched.start_timer(TimerId::ResponseDelay, Duration::ZERO);
    let generation = match rx.recv().await {
        Some(GearEvent::Timeout(TimerId::ResponseDelay, g)) => g,
        e => panic!("Expected a timeout, got {:?}", e),
    };
    // Claimed whether or not the task has been reaped yet
    assert!(sched.claim_expiry(TimerId::ResponseDelay, generation));
    assert!(!sched.claim_expiry(TimerId::ResponseDelay, generation));

    sched.start_timer(TimerId::DapcSequence, Duration::from_millis(10));
    sched.start_timer(TimerId::DapcSequence, Duration::from_millis(10));
    let generation = match rx.recv().await {
        Some(GearEvent::Timeout(TimerId::DapcSequence, g)) => g,
        e => panic!("Expected a timeout, got {:?}", e),
    };
    assert!(sched.claim_expiry(TimerId::DapcSequence, generation));
    sched.start_timer(TimerId::Commissioning, Duration::from_millis(10));
    sched.stop_timer(TimerId::Commissioning);
    assert!(!sched.claim_expiry(TimerId::Commissioning, generation + 1));
}
