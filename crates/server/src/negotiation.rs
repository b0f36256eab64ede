//! Draw, takeback and rematch negotiation.
//!
//! Each kind is its own small state machine driven by `(state, now)`.
//! Deadlines (cancel grace, bot auto-accept) are stored on the pending record
//! and checked when queried; nothing here schedules anything.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wallwars_core::PlayerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferKind {
    Draw,
    Takeback,
    Rematch,
}

impl OfferKind {
    pub const ALL: [OfferKind; 3] = [OfferKind::Draw, OfferKind::Takeback, OfferKind::Rematch];
}

impl fmt::Display for OfferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OfferKind::Draw => "draw",
            OfferKind::Takeback => "takeback",
            OfferKind::Rematch => "rematch",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Declined,
    /// Rematch accepted by both sides, new match being set up.
    Starting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferRecord {
    pub kind: OfferKind,
    pub actor: PlayerId,
    pub opponent: PlayerId,
    /// Monotonic per match and kind.
    pub request_id: u64,
    pub status: OfferStatus,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub cancellable_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_accept_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error("A {0} offer is already pending")]
    AlreadyPending(OfferKind),

    #[error("No {0} offer is pending")]
    NothingPending(OfferKind),

    #[error("Only the other player can answer this {0} offer")]
    NotResponder(OfferKind),

    #[error("The {kind} offer can be withdrawn in {remaining_ms} ms")]
    TooSoonToCancel { kind: OfferKind, remaining_ms: i64 },
}

#[derive(Debug, Clone)]
pub struct Negotiator {
    kind: OfferKind,
    grace_ms: i64,
    pending: Option<OfferRecord>,
    last_request_id: u64,
}

impl Negotiator {
    pub fn new(kind: OfferKind, grace: Duration) -> Self {
        Self {
            kind,
            grace_ms: grace.as_millis() as i64,
            pending: None,
            last_request_id: 0,
        }
    }

    pub fn kind(&self) -> OfferKind {
        self.kind
    }

    pub fn pending(&self) -> Option<&OfferRecord> {
        self.pending.as_ref()
    }

    /// Opens an offer from `actor`. With `auto_accept_after` set the
    /// opponent is a bot and the offer resolves itself once that elapses.
    pub fn offer(
        &mut self,
        actor: PlayerId,
        now: i64,
        auto_accept_after: Option<Duration>,
    ) -> Result<OfferRecord, NegotiationError> {
        if self.pending.is_some() {
            return Err(NegotiationError::AlreadyPending(self.kind));
        }
        self.last_request_id += 1;
        let record = OfferRecord {
            kind: self.kind,
            actor,
            opponent: actor.other(),
            request_id: self.last_request_id,
            status: OfferStatus::Pending,
            created_at: now,
            cancellable_at: now + self.grace_ms,
            auto_accept_at: auto_accept_after.map(|d| now + d.as_millis() as i64),
        };
        self.pending = Some(record.clone());
        Ok(record)
    }

    /// Checks that `responder` may answer the pending offer.
    pub fn check_responder(&self, responder: PlayerId) -> Result<&OfferRecord, NegotiationError> {
        let record = self
            .pending
            .as_ref()
            .ok_or(NegotiationError::NothingPending(self.kind))?;
        if record.opponent != responder {
            return Err(NegotiationError::NotResponder(self.kind));
        }
        Ok(record)
    }

    /// Resolves the pending offer as accepted and retires it. A rematch comes
    /// back as `Starting`.
    pub fn accept(&mut self, responder: PlayerId) -> Result<OfferRecord, NegotiationError> {
        self.check_responder(responder)?;
        let mut record = self
            .pending
            .take()
            .ok_or(NegotiationError::NothingPending(self.kind))?;
        record.status = match self.kind {
            OfferKind::Rematch => OfferStatus::Starting,
            _ => OfferStatus::Accepted,
        };
        Ok(record)
    }

    /// The opponent declines, or the actor withdraws once the grace period
    /// has passed.
    pub fn reject(&mut self, by: PlayerId, now: i64) -> Result<OfferRecord, NegotiationError> {
        let record = self
            .pending
            .as_ref()
            .ok_or(NegotiationError::NothingPending(self.kind))?;
        if record.actor == by && now < record.cancellable_at {
            return Err(NegotiationError::TooSoonToCancel {
                kind: self.kind,
                remaining_ms: record.cancellable_at - now,
            });
        }
        let mut record = self
            .pending
            .take()
            .ok_or(NegotiationError::NothingPending(self.kind))?;
        record.status = OfferStatus::Declined;
        Ok(record)
    }

    /// The seat due to auto-accept at `now`, if any.
    pub fn due(&self, now: i64) -> Option<PlayerId> {
        self.pending
            .as_ref()
            .filter(|r| r.auto_accept_at.is_some_and(|at| at <= now))
            .map(|r| r.opponent)
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.pending.as_ref().and_then(|r| r.auto_accept_at)
    }

    /// Drops the pending offer without resolving it.
    pub fn clear(&mut self) -> Option<OfferRecord> {
        self.pending.take().map(|mut r| {
            r.status = OfferStatus::Declined;
            r
        })
    }
}

/// One negotiator per kind for a match.
#[derive(Debug, Clone)]
pub struct Negotiators {
    draw: Negotiator,
    takeback: Negotiator,
    rematch: Negotiator,
}

impl Negotiators {
    pub fn new(grace: Duration) -> Self {
        Self {
            draw: Negotiator::new(OfferKind::Draw, grace),
            takeback: Negotiator::new(OfferKind::Takeback, grace),
            rematch: Negotiator::new(OfferKind::Rematch, grace),
        }
    }

    pub fn get(&self, kind: OfferKind) -> &Negotiator {
        match kind {
            OfferKind::Draw => &self.draw,
            OfferKind::Takeback => &self.takeback,
            OfferKind::Rematch => &self.rematch,
        }
    }

    pub fn get_mut(&mut self, kind: OfferKind) -> &mut Negotiator {
        match kind {
            OfferKind::Draw => &mut self.draw,
            OfferKind::Takeback => &mut self.takeback,
            OfferKind::Rematch => &mut self.rematch,
        }
    }

    pub fn pending(&self) -> Vec<OfferRecord> {
        OfferKind::ALL
            .iter()
            .filter_map(|k| self.get(*k).pending().cloned())
            .collect()
    }

    pub fn due(&self, now: i64) -> Vec<(OfferKind, PlayerId)> {
        OfferKind::ALL
            .iter()
            .filter_map(|k| self.get(*k).due(now).map(|seat| (*k, seat)))
            .collect()
    }

    pub fn next_deadline(&self) -> Option<i64> {
        OfferKind::ALL
            .iter()
            .filter_map(|k| self.get(*k).next_deadline())
            .min()
    }
}
