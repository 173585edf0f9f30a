//! Message state machine.
//!
//! ```text
//! pending ──route found──▶ transmitting ──arrived at destination──▶ delivered
//!    │                         │   ▲
//!    │ no route                │   └── hop completed, more to go
//!    ▼                         ▼ link lost
//!  failed ◀────────────────────┘
//! ```
//!
//! `delivered` and `failed` are terminal. Every transition goes through
//! `Message::transition`, which rejects anything outside the graph above.

use super::types::{FailureReason, Message, MessageStatus, NodeId, SimTime};
use crate::error::{MeshError, MeshResult};

/// Result of completing one hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopOutcome {
    /// The message moved to an intermediate relay and must continue to `next`.
    Relayed { next: NodeId },
    /// The message reached its destination.
    Delivered,
}

/// Whether `from -> to` is an edge of the lifecycle graph.
///
/// `Transmitting -> Transmitting` is the internal hop advance.
pub fn is_allowed(from: MessageStatus, to: MessageStatus) -> bool {
    use MessageStatus::*;
    match (from, to) {
        (Pending, Transmitting) | (Pending, Failed) => true,
        (Transmitting, Transmitting) | (Transmitting, Delivered) | (Transmitting, Failed) => true,
        (Delivered, _) | (Failed, _) => false,
        (Pending, Pending) | (Pending, Delivered) | (Transmitting, Pending) => false,
    }
}

impl Message {
    fn transition(&mut self, to: MessageStatus) -> MeshResult<()> {
        if !is_allowed(self.status, to) {
            return Err(MeshError::InvalidTransition {
                message: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Record a discovered route and start the first hop.
    ///
    /// The route must start at the source, end at the destination, contain
    /// at least one hop and fit the hop budget.
    pub fn begin_transmission(&mut self, route: Vec<NodeId>, now: SimTime) -> MeshResult<NodeId> {
        if route.len() < 2 || route.first() != Some(&self.source) || route.last() != Some(&self.destination) {
            return Err(MeshError::InvalidParameter(format!("route {:?} does not join {} to {}", route, self.source, self.destination)));
        }
        if route.len() - 1 > self.hop_budget as usize {
            return Err(MeshError::InvalidParameter(format!(
                "route of {} hops exceeds budget of {}",
                route.len() - 1,
                self.hop_budget
            )));
        }
        self.transition(MessageStatus::Transmitting)?;
        let first_hop = route[1];
        self.planned_route = route;
        self.current_hop_start = now;
        Ok(first_hop)
    }

    /// Complete the hop in flight, arriving at `arriving`.
    ///
    /// Only a transmitting message whose next planned hop is `arriving` is
    /// accepted; anything else is rejected before the message is touched.
    pub fn complete_hop(&mut self, arriving: NodeId, now: SimTime) -> MeshResult<HopOutcome> {
        let delivering = arriving == self.destination;
        if self.status != MessageStatus::Transmitting {
            return Err(MeshError::InvalidTransition {
                message: self.id,
                from: self.status,
                to: if delivering { MessageStatus::Delivered } else { MessageStatus::Transmitting },
            });
        }
        let expected = self.next_hop();
        if expected != Some(arriving) {
            return Err(MeshError::InvalidParameter(format!(
                "message {} expected to reach {:?}, not {}",
                self.id, expected, arriving
            )));
        }

        if delivering {
            self.transition(MessageStatus::Delivered)?;
            self.path.push(arriving);
            self.completed_at = Some(now);
            return Ok(HopOutcome::Delivered);
        }

        let next = self
            .planned_route
            .get(self.path.len() + 1)
            .copied()
            .ok_or_else(|| MeshError::InvalidParameter(format!("message {} has no route past {}", self.id, arriving)))?;
        self.transition(MessageStatus::Transmitting)?;
        self.path.push(arriving);
        self.current_hop_start = now;
        Ok(HopOutcome::Relayed { next })
    }

    /// Mark the message as failed. Allowed from `pending` and `transmitting`.
    pub fn fail(&mut self, reason: FailureReason, now: SimTime) -> MeshResult<()> {
        self.transition(MessageStatus::Failed)?;
        self.failure = Some(reason);
        self.completed_at = Some(now);
        Ok(())
    }
}
