//! Time-discrete event scheduler.
//!
//! Each `tick` performs exactly one simulation step:
//! 1) Advance the clock by `time_step`.
//! 2) Route every pending message. Found routes start transmitting and get a
//!    hop-complete event at `now + transmission_delay`; the rest fail.
//! 3) Pop every event with `fire_at <= now` in (fire time, insertion) order
//!    and advance its message by one hop, scheduling the next hop if needed.
//! 4) Report every status change that happened during the step.
//!
//! Events sit in a min-heap keyed by `(fire_at, seq)`. An event is popped
//! before its message is touched, so it can never be applied twice.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, VecDeque};

use super::lifecycle::HopOutcome;
use super::router::find_path;
use super::topology::Topology;
use super::types::{FailureReason, Message, MessageId, MessageStatus, NodeId, Notification, SimTime};
use crate::error::MeshError;

/// What happens when an event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventKind {
    /// `message` finished crossing a link and arrives at `node`.
    HopComplete { message: MessageId, node: NodeId },
}

/// A scheduled future action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScheduledEvent {
    pub fire_at: SimTime,
    /// Insertion counter, breaks ties between equal fire times (FIFO).
    pub seq: u64,
    pub kind: EventKind,
}

/// Clock, pending queue and event list of one simulation run.
#[derive(Debug, Clone)]
pub struct Scheduler {
    now: SimTime,
    time_step: SimTime,
    transmission_delay: SimTime,
    pending: VecDeque<MessageId>,
    events: BinaryHeap<Reverse<ScheduledEvent>>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new(time_step: SimTime, transmission_delay: SimTime) -> Self {
        Self {
            now: SimTime::ZERO,
            time_step,
            transmission_delay,
            pending: VecDeque::new(),
            events: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn time_step(&self) -> SimTime {
        self.time_step
    }

    pub fn transmission_delay(&self) -> SimTime {
        self.transmission_delay
    }

    pub fn set_time_step(&mut self, step: SimTime) {
        self.time_step = step;
    }

    pub fn set_transmission_delay(&mut self, delay: SimTime) {
        self.transmission_delay = delay;
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_ids(&self) -> impl Iterator<Item = &MessageId> {
        self.pending.iter()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Scheduled events in the order they will fire.
    pub fn upcoming_events(&self) -> Vec<ScheduledEvent> {
        let mut events: Vec<ScheduledEvent> = self.events.iter().map(|Reverse(e)| *e).collect();
        events.sort();
        events
    }

    /// Queue a message for routing on the next tick.
    pub fn enqueue(&mut self, id: MessageId) {
        self.pending.push_back(id);
    }

    /// Drop the clock back to zero and forget all queued work.
    pub fn reset(&mut self) {
        self.now = SimTime::ZERO;
        self.pending.clear();
        self.events.clear();
        self.next_seq = 0;
    }

    fn schedule(&mut self, fire_at: SimTime, kind: EventKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(Reverse(ScheduledEvent { fire_at, seq, kind }));
    }

    fn pop_due(&mut self) -> Option<ScheduledEvent> {
        match self.events.peek() {
            Some(Reverse(e)) if e.fire_at <= self.now => self.events.pop().map(|Reverse(e)| e),
            _ => None,
        }
    }

    /// Perform one simulation step. See the module docs for the ordering.
    pub fn tick(&mut self, topology: &Topology, messages: &mut BTreeMap<MessageId, Message>) -> Vec<Notification> {
        self.now = self.now.plus(self.time_step);
        let mut notifications = Vec::new();

        self.route_pending(topology, messages, &mut notifications);
        self.fire_due_events(topology, messages, &mut notifications);

        notifications
    }

    fn route_pending(&mut self, topology: &Topology, messages: &mut BTreeMap<MessageId, Message>, notifications: &mut Vec<Notification>) {
        let now = self.now;
        let queued: Vec<MessageId> = self.pending.drain(..).collect();

        for id in queued {
            let Some(message) = messages.get_mut(&id) else {
                log::warn!("Pending message {} no longer exists", id);
                continue;
            };
            if message.status != MessageStatus::Pending {
                continue;
            }

            let route = find_path(topology, message.source, message.destination, message.hop_budget).filter(|p| p.len() > 1);
            let result = match route {
                Some(route) => {
                    log::debug!("Message {} routed via {:?}", id, route);
                    message.begin_transmission(route, now).map(Some)
                }
                None => {
                    log::info!("Message {} failed: no route from {} to {} within {} hops", id, message.source, message.destination, message.hop_budget);
                    message.fail(FailureReason::NoRoute, now).map(|_| None)
                }
            };

            match result {
                Ok(Some(first_hop)) => {
                    notifications.push(changed(id, MessageStatus::Pending, MessageStatus::Transmitting, now));
                    self.schedule(now.plus(self.transmission_delay), EventKind::HopComplete { message: id, node: first_hop });
                }
                Ok(None) => notifications.push(changed(id, MessageStatus::Pending, MessageStatus::Failed, now)),
                Err(err) => lifecycle_bug(err),
            }
        }
    }

    fn fire_due_events(&mut self, topology: &Topology, messages: &mut BTreeMap<MessageId, Message>, notifications: &mut Vec<Notification>) {
        let now = self.now;

        while let Some(event) = self.pop_due() {
            let EventKind::HopComplete { message: id, node } = event.kind;
            let Some(message) = messages.get_mut(&id) else {
                log::warn!("Event for unknown message {} dropped", id);
                continue;
            };

            let from = message.current_node();
            if !topology.can_communicate(from, node) {
                log::info!("Message {} failed: link {} -> {} lost mid-transit", id, from, node);
                match message.fail(FailureReason::LinkLost { from, to: node }, now) {
                    Ok(()) => notifications.push(changed(id, MessageStatus::Transmitting, MessageStatus::Failed, now)),
                    Err(err) => lifecycle_bug(err),
                }
                continue;
            }

            match message.complete_hop(node, now) {
                Ok(HopOutcome::Relayed { next }) => {
                    log::debug!("Message {} relayed by {} towards {}", id, node, next);
                    self.schedule(now.plus(self.transmission_delay), EventKind::HopComplete { message: id, node: next });
                }
                Ok(HopOutcome::Delivered) => {
                    log::info!(
                        "Message {} delivered to {} after {} hops ({} since submission)",
                        id,
                        node,
                        message.hops_taken(),
                        now.since(message.submitted_at)
                    );
                    notifications.push(changed(id, MessageStatus::Transmitting, MessageStatus::Delivered, now));
                }
                Err(err) => lifecycle_bug(err),
            }
        }
    }
}

fn changed(message_id: MessageId, previous: MessageStatus, current: MessageStatus, at: SimTime) -> Notification {
    Notification { message_id, previous, current, at }
}

/// An illegal transition means the scheduler itself is broken.
fn lifecycle_bug(err: MeshError) {
    log::error!("Lifecycle violation: {}", err);
    debug_assert!(false, "lifecycle violation: {}", err);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: u32) -> Topology {
        let mut t = Topology::new(60.0).unwrap();
        for i in 0..n {
            t.add_node(i, i as f64 * 50.0, 0.0, None).unwrap();
        }
        t
    }

    fn submit(sched: &mut Scheduler, messages: &mut BTreeMap<MessageId, Message>, id: MessageId, src: NodeId, dst: NodeId, budget: u32) {
        messages.insert(id, Message::new(id, src, dst, format!("msg-{}", id), budget, sched.now()));
        sched.enqueue(id);
    }

    #[test]
    fn equal_fire_times_pop_in_insertion_order() {
        let mut sched = Scheduler::new(SimTime::from_millis(100), SimTime::from_millis(100));
        sched.schedule(SimTime::from_millis(50), EventKind::HopComplete { message: 2, node: 0 });
        sched.schedule(SimTime::from_millis(50), EventKind::HopComplete { message: 1, node: 0 });
        sched.schedule(SimTime::from_millis(10), EventKind::HopComplete { message: 3, node: 0 });
        sched.now = SimTime::from_millis(100);

        let order: Vec<MessageId> = std::iter::from_fn(|| sched.pop_due())
            .map(|e| match e.kind {
                EventKind::HopComplete { message, .. } => message,
            })
            .collect();
        assert_eq!(order, vec![3, 2, 1]);
        assert!(sched.pop_due().is_none());
    }

    #[test]
    fn future_events_stay_queued() {
        let mut sched = Scheduler::new(SimTime::from_millis(100), SimTime::from_millis(100));
        sched.schedule(SimTime::from_millis(300), EventKind::HopComplete { message: 0, node: 1 });
        sched.now = SimTime::from_millis(200);
        assert!(sched.pop_due().is_none());
        assert_eq!(sched.event_count(), 1);
    }

    #[test]
    fn relay_takes_one_event_per_hop() {
        let topo = chain(3);
        let mut messages = BTreeMap::new();
        let mut sched = Scheduler::new(SimTime::from_millis(100), SimTime::from_millis(100));
        submit(&mut sched, &mut messages, 0, 0, 2, 2);

        let n = sched.tick(&topo, &mut messages);
        assert_eq!(n, vec![changed(0, MessageStatus::Pending, MessageStatus::Transmitting, SimTime::from_millis(100))]);
        assert_eq!(
            sched.upcoming_events(),
            vec![ScheduledEvent {
                fire_at: SimTime::from_millis(100).plus(sched.transmission_delay()),
                seq: 0,
                kind: EventKind::HopComplete { message: 0, node: 1 },
            }]
        );
        assert_eq!(sched.pending_len(), 0);

        assert!(sched.tick(&topo, &mut messages).is_empty());
        assert_eq!(messages[&0].path, vec![0, 1]);

        let n = sched.tick(&topo, &mut messages);
        assert_eq!(n, vec![changed(0, MessageStatus::Transmitting, MessageStatus::Delivered, SimTime::from_millis(300))]);
        assert_eq!(messages[&0].path, vec![0, 1, 2]);
        assert_eq!(sched.event_count(), 0);
    }

    #[test]
    fn coarse_step_fires_each_event_once() {
        let topo = chain(4);
        let mut messages = BTreeMap::new();
        let mut sched = Scheduler::new(SimTime::from_millis(100), SimTime::from_millis(100));
        submit(&mut sched, &mut messages, 0, 0, 3, 3);
        sched.tick(&topo, &mut messages);

        // Follow-up hops are scheduled from the current clock, so a coarse
        // step completes one hop per tick and never replays an event.
        sched.set_time_step(SimTime::from_millis(1_000));
        sched.tick(&topo, &mut messages);
        assert_eq!(messages[&0].path, vec![0, 1]);
        sched.tick(&topo, &mut messages);
        sched.tick(&topo, &mut messages);
        assert_eq!(messages[&0].path, vec![0, 1, 2, 3]);
        assert_eq!(messages[&0].status, MessageStatus::Delivered);
        assert!(sched.tick(&topo, &mut messages).is_empty());
    }

    #[test]
    fn zero_delay_completes_route_within_one_tick() {
        let topo = chain(3);
        let mut messages = BTreeMap::new();
        let mut sched = Scheduler::new(SimTime::from_millis(100), SimTime::ZERO);
        submit(&mut sched, &mut messages, 0, 0, 2, 2);
        let n = sched.tick(&topo, &mut messages);
        assert_eq!(n.len(), 2);
        assert_eq!(n[1].current, MessageStatus::Delivered);
        assert_eq!(messages[&0].path, vec![0, 1, 2]);
    }

    #[test]
    fn lost_link_fails_transmitting_message() {
        let mut topo = chain(3);
        let mut messages = BTreeMap::new();
        let mut sched = Scheduler::new(SimTime::from_millis(100), SimTime::from_millis(100));
        submit(&mut sched, &mut messages, 0, 0, 2, 2);
        sched.tick(&topo, &mut messages);
        topo.set_online(1, false).unwrap();

        let n = sched.tick(&topo, &mut messages);
        assert_eq!(n, vec![changed(0, MessageStatus::Transmitting, MessageStatus::Failed, SimTime::from_millis(200))]);
        assert_eq!(messages[&0].failure, Some(FailureReason::LinkLost { from: 0, to: 1 }));
        assert_eq!(messages[&0].path, vec![0]);
        assert_eq!(sched.event_count(), 0);
    }

    #[test]
    fn reset_clears_clock_and_queues() {
        let topo = chain(3);
        let mut messages = BTreeMap::new();
        let mut sched = Scheduler::new(SimTime::from_millis(100), SimTime::from_millis(100));
        submit(&mut sched, &mut messages, 0, 0, 2, 2);
        submit(&mut sched, &mut messages, 1, 0, 1, 2);
        sched.tick(&topo, &mut messages);
        submit(&mut sched, &mut messages, 2, 2, 0, 2);
        assert_eq!(sched.pending_ids().copied().collect::<Vec<_>>(), vec![2]);
        let upcoming = sched.upcoming_events();
        assert_eq!(upcoming.len(), 2);
        assert!(upcoming[0].seq < upcoming[1].seq);
        sched.reset();
        assert_eq!(sched.now(), SimTime::ZERO);
        assert_eq!(sched.pending_len(), 0);
        assert_eq!(sched.event_count(), 0);
        assert!(sched.upcoming_events().is_empty());
        assert_eq!(sched.pending_ids().count(), 0);
    }
}
