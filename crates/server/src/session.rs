//! Match coordinator.
//!
//! [`MatchSession`] is the only owner of a match's canonical [`GameState`]
//! and negotiation records. Its methods never perform I/O: they queue
//! [`Outbound`] messages and [`Effect`]s that the match task in
//! [`crate::registry`] delivers after each call.

use std::time::Duration;

use tracing::{debug, info, warn};
use wallwars_core::{
    ConfigError, GameAction, GameConfig, GameState, GameStatus, IllegalAction, Move, PerPlayer, PlayerId,
    ReplayError,
};

use crate::config::{Config, FaultPolicy};
use crate::controller::{Capabilities, ControllerKind};
use crate::negotiation::{NegotiationError, Negotiators, OfferKind};
use crate::protocol::{
    ChatChannel, ChatErrorCode, ClientMessage, MatchPhase, MatchSnapshot, OfferVerb, SeatInfo, ServerMessage,
};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Illegal(#[from] IllegalAction),

    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error("Match has no open seat")]
    MatchFull,

    #[error("Unknown seat token")]
    UnknownToken,

    #[error("Spectators cannot act in a match")]
    Spectator,

    #[error("{0}")]
    NotAllowed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub negotiation_grace: Duration,
    pub bot_auto_accept: Duration,
    pub fault_policy: FaultPolicy,
    pub chat_max_len: usize,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            negotiation_grace: config.negotiation_grace,
            bot_auto_accept: config.bot_auto_accept,
            fault_policy: config.fault_policy,
            chat_max_len: config.chat_max_len,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Socket(u64),
}

#[derive(Debug, Clone)]
pub struct Outbound {
    pub audience: Audience,
    pub message: ServerMessage,
}

impl Outbound {
    pub fn is_for(&self, socket_id: u64) -> bool {
        match self.audience {
            Audience::All => true,
            Audience::Socket(id) => id == socket_id,
        }
    }
}

/// A connected socket and the seat it controls, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participant {
    pub socket_id: u64,
    pub seat: Option<PlayerId>,
}

/// How a seat is filled when a match is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatSpec {
    pub controller: ControllerKind,
    pub name: Option<String>,
    /// Human seats authenticate with this.
    pub token: Option<String>,
}

/// Everything needed to set up the follow-up match. Seats are swapped.
#[derive(Debug, Clone)]
pub struct RematchPlan {
    pub config: GameConfig,
    pub seats: PerPlayer<Option<SeatSpec>>,
    pub creator: PlayerId,
}

/// Work for the match task after a call returns.
#[derive(Debug, Clone)]
pub enum Effect {
    /// A server-driven seat is on move. `version` identifies the position.
    RequestMove {
        seat: PlayerId,
        version: u64,
        state: GameState,
    },
    StateChanged(GameState),
    /// History was truncated to `ply` plies.
    Rewound { ply: usize },
    Completed,
    StartRematch(RematchPlan),
}

#[derive(Debug, Clone, Default)]
struct Seat {
    spec: Option<SeatSpec>,
    connections: usize,
}

pub struct MatchSession {
    id: String,
    settings: SessionSettings,
    seats: PerPlayer<Seat>,
    creator: PlayerId,
    state: GameState,
    phase: MatchPhase,
    negotiators: Negotiators,
    spectators: usize,
    /// Bumped whenever the canonical state changes.
    version: u64,
    takebacks: u32,
    rematch_of: Option<String>,
    next_match_id: Option<String>,
    completed_at: Option<i64>,
    outbox: Vec<Outbound>,
    effects: Vec<Effect>,
}

impl MatchSession {
    pub fn new(
        id: String,
        config: GameConfig,
        seats: PerPlayer<Option<SeatSpec>>,
        creator: PlayerId,
        settings: SessionSettings,
        now: i64,
    ) -> Result<Self, ConfigError> {
        let state = GameState::new(config, now)?;
        let mut session = Self {
            id,
            settings,
            seats: seats.map(|spec| Seat { spec, connections: 0 }),
            creator,
            state,
            phase: MatchPhase::Waiting,
            negotiators: Negotiators::new(settings.negotiation_grace),
            spectators: 0,
            version: 0,
            takebacks: 0,
            rematch_of: None,
            next_match_id: None,
            completed_at: None,
            outbox: Vec::new(),
            effects: Vec::new(),
        };
        info!(match_id = %session.id, variant = %session.state.config().variant, "Match created");
        if session.all_seated() {
            session.ready(now);
        }
        Ok(session)
    }

    pub fn with_rematch_of(mut self, previous: impl Into<String>) -> Self {
        self.rematch_of = Some(previous.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn creator(&self) -> PlayerId {
        self.creator
    }

    pub fn controller(&self, seat: PlayerId) -> Option<ControllerKind> {
        self.seats[seat].spec.as_ref().map(|s| s.controller)
    }

    pub fn seat_for_token(&self, token: &str) -> Option<PlayerId> {
        PlayerId::ALL.into_iter().find(|seat| {
            self.seats[*seat]
                .spec
                .as_ref()
                .and_then(|s| s.token.as_deref())
                .is_some_and(|t| t == token)
        })
    }

    pub fn connections(&self) -> usize {
        self.spectators + PlayerId::ALL.iter().map(|s| self.seats[*s].connections).sum::<usize>()
    }

    pub fn completed_at(&self) -> Option<i64> {
        self.completed_at
    }

    pub fn is_live(&self) -> bool {
        matches!(self.phase, MatchPhase::Ready | MatchPhase::InProgress) && self.state.is_playing()
    }

    pub fn snapshot(&self) -> MatchSnapshot {
        let seat_info = |seat: PlayerId| {
            let s = &self.seats[seat];
            SeatInfo {
                controller: s.spec.as_ref().map(|spec| spec.controller),
                name: s.spec.as_ref().and_then(|spec| spec.name.clone()),
                connected: s.connections > 0 || self.controller(seat).is_some_and(ControllerKind::is_bot),
            }
        };
        MatchSnapshot {
            match_id: self.id.clone(),
            phase: self.phase,
            config: self.state.config().clone(),
            seats: PerPlayer::new(seat_info(PlayerId::One), seat_info(PlayerId::Two)),
            status: self.state.status(),
            result: self.state.result(),
            turn: self.state.turn(),
            ply: self.state.ply(),
            spectators: self.spectators,
            pending_offers: self.negotiators.pending(),
            takebacks: self.takebacks,
            rematch_of: self.rematch_of.clone(),
            next_match_id: self.next_match_id.clone(),
        }
    }

    pub fn take_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // ---- Seats and connections ----

    /// Fills the open seat with a human holding `token`.
    pub fn join(&mut self, name: Option<String>, token: String, now: i64) -> Result<PlayerId, SessionError> {
        if self.phase != MatchPhase::Waiting {
            return Err(SessionError::MatchFull);
        }
        let seat = PlayerId::ALL
            .into_iter()
            .find(|s| self.seats[*s].spec.is_none())
            .ok_or(SessionError::MatchFull)?;
        self.seats[seat].spec = Some(SeatSpec {
            controller: ControllerKind::Human,
            name,
            token: Some(token),
        });
        info!(match_id = %self.id, seat = seat.number(), "Seat joined");
        if self.all_seated() {
            self.ready(now);
        } else {
            self.broadcast_status();
        }
        Ok(seat)
    }

    /// Creator-only, and only before the first move.
    pub fn abort(&mut self, token: &str, now: i64) -> Result<(), SessionError> {
        if self.seat_for_token(token) != Some(self.creator) {
            return Err(SessionError::NotAllowed("Only the creator can abort a match".into()));
        }
        if !matches!(self.phase, MatchPhase::Waiting | MatchPhase::Ready) {
            return Err(SessionError::NotAllowed("Match can no longer be aborted".into()));
        }
        let next = self.state.abort()?;
        self.commit(next, now);
        Ok(())
    }

    /// Attaches a socket: with a seat token as that seat's controller,
    /// otherwise as a receive-only spectator.
    pub fn connect(&mut self, socket_id: u64, token: Option<&str>) -> Result<Participant, SessionError> {
        let seat = match token {
            Some(token) => Some(self.seat_for_token(token).ok_or(SessionError::UnknownToken)?),
            None => None,
        };
        match seat {
            Some(s) => self.seats[s].connections += 1,
            None => self.spectators += 1,
        }
        debug!(match_id = %self.id, socket_id, seat = ?seat.map(PlayerId::number), "Socket attached");

        self.send_to(socket_id, ServerMessage::Welcome { socket_id, seat });
        self.send_to(
            socket_id,
            ServerMessage::State {
                state: self.state.clone(),
            },
        );
        self.broadcast_status();
        Ok(Participant { socket_id, seat })
    }

    pub fn disconnect(&mut self, participant: Participant) {
        match participant.seat {
            Some(s) => self.seats[s].connections = self.seats[s].connections.saturating_sub(1),
            None => self.spectators = self.spectators.saturating_sub(1),
        }
        debug!(match_id = %self.id, socket_id = participant.socket_id, "Socket detached");
        self.broadcast_status();
    }

    // ---- Inbound messages ----

    /// Entry point for everything a socket sends. Failures are reported to
    /// that socket only.
    pub fn handle(&mut self, from: Participant, message: ClientMessage, now: i64) {
        if let Err(e) = self.dispatch(from, message, now) {
            debug!(match_id = %self.id, socket_id = from.socket_id, error = %e, "Rejected client message");
            self.send_to(from.socket_id, ServerMessage::error(e.to_string()));
        }
    }

    fn dispatch(&mut self, from: Participant, message: ClientMessage, now: i64) -> Result<(), SessionError> {
        if let ClientMessage::ChatMessage { channel, text } = message {
            self.chat(from, channel, &text, now);
            return Ok(());
        }

        let seat = from.seat.ok_or(SessionError::Spectator)?;
        if let Some((kind, verb)) = message.negotiation() {
            return match verb {
                OfferVerb::Offer => self.offer(kind, seat, now),
                OfferVerb::Accept => self.accept(kind, seat, now),
                OfferVerb::Reject => self.reject(kind, seat, now),
            };
        }

        let caps = self.capabilities(seat);
        match message {
            ClientMessage::SubmitMove { mv } => {
                require(caps.can_move && !caps.server_driven, "This seat does not take moves from a socket")?;
                self.require_live()?;
                self.apply(
                    GameAction::Move {
                        player_id: seat,
                        mv,
                        timestamp: now,
                    },
                    now,
                )
            }
            ClientMessage::Resign => {
                require(caps.can_resign, "This seat cannot resign")?;
                self.require_live()?;
                self.apply(
                    GameAction::Resign {
                        player_id: seat,
                        timestamp: now,
                    },
                    now,
                )
            }
            ClientMessage::GiveTime { seconds } => {
                require(caps.can_give_time, "This seat cannot give time")?;
                self.require_live()?;
                self.apply(
                    GameAction::GiveTime {
                        player_id: seat,
                        seconds,
                        timestamp: now,
                    },
                    now,
                )
            }
            // Handled above.
            _ => Ok(()),
        }
    }

    fn chat(&mut self, from: Participant, channel: ChatChannel, text: &str, now: i64) {
        let text = text.trim();
        let code = if from.seat.is_none() && channel == ChatChannel::Game {
            Some(ChatErrorCode::Spectator)
        } else if from.seat.is_some_and(|s| !self.capabilities(s).can_chat) {
            Some(ChatErrorCode::Spectator)
        } else if text.is_empty() {
            Some(ChatErrorCode::Empty)
        } else if text.chars().count() > self.settings.chat_max_len {
            Some(ChatErrorCode::TooLong)
        } else {
            None
        };

        match code {
            Some(code) => self.send_to(from.socket_id, ServerMessage::ChatError { code }),
            None => self.broadcast(ServerMessage::ChatMessage {
                channel,
                sender: from.seat,
                text: text.to_string(),
                timestamp: now,
            }),
        }
    }

    // ---- Negotiation ----

    fn offer(&mut self, kind: OfferKind, seat: PlayerId, now: i64) -> Result<(), SessionError> {
        let caps = self.capabilities(seat);
        match kind {
            OfferKind::Draw => {
                require(caps.can_offer_draw, "This seat cannot offer a draw")?;
                self.require_live()?;
            }
            OfferKind::Takeback => {
                require(caps.can_offer_takeback, "This seat cannot request a takeback")?;
                self.require_live()?;
                self.state.takeback_depth(seat)?;
            }
            OfferKind::Rematch => {
                require(caps.can_offer_rematch, "This seat cannot offer a rematch")?;
                require(
                    self.phase == MatchPhase::Completed,
                    "A rematch can only be offered once the game is over",
                )?;
                require(self.next_match_id.is_none(), "The rematch has already started")?;
            }
        }

        let auto_accept = self
            .capabilities(seat.other())
            .auto_accepts
            .then_some(self.settings.bot_auto_accept);
        let record = self.negotiators.get_mut(kind).offer(seat, now, auto_accept)?;
        info!(match_id = %self.id, kind = %kind, seat = seat.number(), request_id = record.request_id, "Offer made");
        self.broadcast(ServerMessage::offer(record));
        self.broadcast_status();
        Ok(())
    }

    fn accept(&mut self, kind: OfferKind, seat: PlayerId, now: i64) -> Result<(), SessionError> {
        let pending = self.negotiators.get(kind).check_responder(seat)?.clone();
        info!(match_id = %self.id, kind = %kind, request_id = pending.request_id, "Offer accepted");

        match kind {
            OfferKind::Draw => {
                let next = self.state.apply_game_action(GameAction::AgreeDraw {
                    player_id: seat,
                    timestamp: now,
                })?;
                self.negotiators.get_mut(kind).accept(seat)?;
                self.commit(next, now);
            }
            OfferKind::Takeback => {
                let rebuilt = self.state.take_back(pending.actor, now)?;
                self.negotiators.get_mut(kind).accept(seat)?;
                self.takebacks += 1;
                self.effects.push(Effect::Rewound { ply: rebuilt.ply() });
                self.commit(rebuilt, now);
            }
            OfferKind::Rematch => {
                self.negotiators.get_mut(kind).accept(seat)?;
                let plan = self.rematch_plan();
                self.effects.push(Effect::StartRematch(plan));
                self.broadcast_status();
            }
        }
        Ok(())
    }

    fn reject(&mut self, kind: OfferKind, seat: PlayerId, now: i64) -> Result<(), SessionError> {
        let record = self.negotiators.get_mut(kind).reject(seat, now)?;
        info!(match_id = %self.id, kind = %kind, seat = seat.number(), request_id = record.request_id, "Offer rejected");
        self.broadcast(ServerMessage::rejected(record));
        self.broadcast_status();
        Ok(())
    }

    fn rematch_plan(&self) -> RematchPlan {
        let spec = |seat: PlayerId| self.seats[seat].spec.clone();
        RematchPlan {
            config: self.state.config().clone(),
            seats: PerPlayer::new(spec(PlayerId::Two), spec(PlayerId::One)),
            creator: self.creator.other(),
        }
    }

    /// The follow-up match exists; everyone is pointed at it.
    pub fn rematch_started(&mut self, new_game_id: String) {
        info!(match_id = %self.id, new_game_id = %new_game_id, "Rematch started");
        self.next_match_id = Some(new_game_id.clone());
        self.broadcast(ServerMessage::RematchStarted { new_game_id });
        self.broadcast_status();
    }

    pub fn rematch_failed(&mut self, reason: &str) {
        warn!(match_id = %self.id, reason, "Rematch could not start");
        self.broadcast(ServerMessage::error(format!("Rematch could not start: {reason}")));
    }

    // ---- Server-driven seats and timers ----

    /// A bot's answer for the position identified by `version`. Answers for
    /// positions that have since changed are dropped.
    pub fn controller_move(&mut self, seat: PlayerId, version: u64, result: Result<Move, String>, now: i64) {
        if version != self.version || !self.is_live() || self.state.turn() != seat {
            debug!(match_id = %self.id, seat = seat.number(), version, "Dropping stale controller move");
            return;
        }
        let outcome = result.and_then(|mv| {
            self.state
                .apply_game_action(GameAction::Move {
                    player_id: seat,
                    mv,
                    timestamp: now,
                })
                .map_err(|e| format!("illegal move: {e}"))
        });
        match outcome {
            Ok(next) => self.commit(next, now),
            Err(reason) => self.controller_fault(seat, &reason, now),
        }
    }

    fn controller_fault(&mut self, seat: PlayerId, reason: &str, now: i64) {
        warn!(match_id = %self.id, seat = seat.number(), reason, policy = ?self.settings.fault_policy, "Controller fault");
        self.broadcast(ServerMessage::error(format!(
            "Player {} controller fault: {reason}",
            seat.number()
        )));
        if self.settings.fault_policy == FaultPolicy::Forfeit {
            match self.state.apply_game_action(GameAction::Resign {
                player_id: seat,
                timestamp: now,
            }) {
                Ok(next) => self.commit(next, now),
                Err(e) => debug!(match_id = %self.id, error = %e, "Forfeit not applied"),
            }
        }
    }

    /// Earliest moment [`MatchSession::on_deadline`] has work to do.
    pub fn next_deadline(&self) -> Option<i64> {
        let turn = self.state.turn();
        let flag = self
            .is_live()
            .then(|| self.state.last_move_time() + self.state.clocks_ms()[turn]);
        [flag, self.negotiators.next_deadline()].into_iter().flatten().min()
    }

    /// Resolves due bot auto-accepts and flags an expired clock.
    pub fn on_deadline(&mut self, now: i64) {
        for (kind, seat) in self.negotiators.due(now) {
            if let Err(e) = self.accept(kind, seat, now) {
                warn!(match_id = %self.id, kind = %kind, error = %e, "Auto-accept failed, dropping offer");
                if let Some(record) = self.negotiators.get_mut(kind).clear() {
                    self.broadcast(ServerMessage::rejected(record));
                    self.broadcast_status();
                }
            }
        }

        if self.is_live() {
            let turn = self.state.turn();
            if self.state.remaining_ms(turn, now) <= 0 {
                match self.state.apply_game_action(GameAction::TimeoutCheck {
                    player_id: turn,
                    timestamp: now,
                }) {
                    Ok(next) => self.commit(next, now),
                    Err(e) => debug!(match_id = %self.id, error = %e, "Timeout check declined"),
                }
            }
        }
    }

    // ---- Internals ----

    fn capabilities(&self, seat: PlayerId) -> Capabilities {
        self.controller(seat)
            .unwrap_or(ControllerKind::Human)
            .capabilities()
    }

    fn all_seated(&self) -> bool {
        PlayerId::ALL.iter().all(|s| self.seats[*s].spec.is_some())
    }

    fn require_live(&self) -> Result<(), SessionError> {
        match self.phase {
            MatchPhase::Waiting => Err(SessionError::NotAllowed("Waiting for an opponent".into())),
            _ if !self.is_live() => Err(SessionError::Illegal(IllegalAction::GameNotPlaying)),
            _ => Ok(()),
        }
    }

    fn ready(&mut self, now: i64) {
        self.phase = MatchPhase::Ready;
        self.state.restart_clock(now);
        self.version += 1;
        info!(match_id = %self.id, "Match ready");
        self.broadcast_state();
        self.request_bot_move();
    }

    fn apply(&mut self, action: GameAction, now: i64) -> Result<(), SessionError> {
        let next = self.state.apply_game_action(action)?;
        self.commit(next, now);
        Ok(())
    }

    /// Installs `next` as the canonical state and tells everyone.
    fn commit(&mut self, next: GameState, now: i64) {
        let moved = next.ply() != self.state.ply();
        self.state = next;
        self.version += 1;
        if moved && self.phase == MatchPhase::Ready {
            self.phase = MatchPhase::InProgress;
        }
        if !self.state.is_playing() && self.completed_at.is_none() {
            self.complete(now);
        }
        self.broadcast_state();
        self.effects.push(Effect::StateChanged(self.state.clone()));
        self.request_bot_move();
    }

    fn complete(&mut self, now: i64) {
        self.phase = match self.state.status() {
            GameStatus::Aborted => MatchPhase::Aborted,
            _ => MatchPhase::Completed,
        };
        self.completed_at = Some(now);
        for kind in [OfferKind::Draw, OfferKind::Takeback] {
            if let Some(record) = self.negotiators.get_mut(kind).clear() {
                self.broadcast(ServerMessage::rejected(record));
            }
        }
        info!(
            match_id = %self.id,
            phase = ?self.phase,
            result = ?self.state.result(),
            plies = self.state.ply(),
            "Match completed"
        );
        self.effects.push(Effect::Completed);
    }

    fn request_bot_move(&mut self) {
        if !self.is_live() {
            return;
        }
        let seat = self.state.turn();
        if self.controller(seat).is_some_and(ControllerKind::is_bot) {
            self.effects.push(Effect::RequestMove {
                seat,
                version: self.version,
                state: self.state.clone(),
            });
        }
    }

    fn broadcast_state(&mut self) {
        self.broadcast(ServerMessage::State {
            state: self.state.clone(),
        });
        self.broadcast_status();
    }

    fn broadcast_status(&mut self) {
        let snapshot = self.snapshot();
        self.broadcast(ServerMessage::MatchStatus { snapshot });
    }

    fn broadcast(&mut self, message: ServerMessage) {
        self.outbox.push(Outbound {
            audience: Audience::All,
            message,
        });
    }

    fn send_to(&mut self, socket_id: u64, message: ServerMessage) {
        self.outbox.push(Outbound {
            audience: Audience::Socket(socket_id),
            message,
        });
    }
}

fn require(allowed: bool, reason: &str) -> Result<(), SessionError> {
    if allowed {
        Ok(())
    } else {
        Err(SessionError::NotAllowed(reason.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::OfferStatus;
    use wallwars_core::{Action, Cell, ResultReason, Variant};

    const T0: i64 = 1_700_000_000_000;

    fn settings() -> SessionSettings {
        SessionSettings {
            negotiation_grace: Duration::from_millis(2000),
            bot_auto_accept: Duration::from_millis(500),
            fault_policy: FaultPolicy::Forfeit,
            chat_max_len: 20,
        }
    }

    fn human(token: &str) -> Option<SeatSpec> {
        Some(SeatSpec {
            controller: ControllerKind::Human,
            name: None,
            token: Some(token.into()),
        })
    }

    fn bot(kind: ControllerKind) -> Option<SeatSpec> {
        Some(SeatSpec {
            controller: kind,
            name: Some("bot".into()),
            token: None,
        })
    }

    /// Two humans on a 5x5 standard board, both connected.
    fn two_humans() -> (MatchSession, Participant, Participant) {
        let mut session = MatchSession::new(
            "m1".into(),
            GameConfig::new(Variant::Standard, 5, 5),
            PerPlayer::new(human("t1"), human("t2")),
            PlayerId::One,
            settings(),
            T0,
        )
        .unwrap();
        let p1 = session.connect(1, Some("t1")).unwrap();
        let p2 = session.connect(2, Some("t2")).unwrap();
        session.take_outbox();
        session.take_effects();
        (session, p1, p2)
    }

    fn cat_to(row: usize, col: usize) -> ClientMessage {
        ClientMessage::SubmitMove {
            mv: vec![Action::cat(Cell::new(row, col))].into(),
        }
    }

    fn errors_for(outbox: &[Outbound], socket_id: u64) -> Vec<String> {
        outbox
            .iter()
            .filter(|o| o.audience == Audience::Socket(socket_id))
            .filter_map(|o| match &o.message {
                ServerMessage::Error { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_join_fills_seat_and_starts_clock() {
        let mut session = MatchSession::new(
            "m1".into(),
            GameConfig::new(Variant::Standard, 5, 5),
            PerPlayer::new(human("t1"), None),
            PlayerId::One,
            settings(),
            T0,
        )
        .unwrap();
        assert_eq!(session.phase(), MatchPhase::Waiting);
        assert_eq!(session.next_deadline(), None);

        let seat = session.join(Some("bo".into()), "t2".into(), T0 + 60_000).unwrap();
        assert_eq!(seat, PlayerId::Two);
        assert_eq!(session.phase(), MatchPhase::Ready);
        assert_eq!(session.state().last_move_time(), T0 + 60_000);
        assert!(matches!(session.join(None, "t3".into(), T0), Err(SessionError::MatchFull)));
    }

    #[test]
    fn test_illegal_move_reported_to_sender_only() {
        let (mut session, p1, _) = two_humans();
        let before = session.state().clone();

        // Two rows at once.
        session.handle(p1, cat_to(2, 0), T0 + 1000);
        let outbox = session.take_outbox();
        assert_eq!(errors_for(&outbox, 1).len(), 1);
        assert!(outbox.iter().all(|o| o.audience == Audience::Socket(1)));
        assert_eq!(session.state(), &before);
    }

    #[test]
    fn test_move_broadcasts_state_and_flips_turn() {
        let (mut session, p1, p2) = two_humans();
        session.handle(p2, cat_to(1, 4), T0 + 500);
        assert_eq!(errors_for(&session.take_outbox(), 2).len(), 1);

        session.handle(p1, cat_to(3, 0), T0 + 1000);
        let outbox = session.take_outbox();
        assert!(outbox
            .iter()
            .any(|o| o.audience == Audience::All && matches!(o.message, ServerMessage::State { .. })));
        assert_eq!(session.state().turn(), PlayerId::Two);
        assert_eq!(session.phase(), MatchPhase::InProgress);
    }

    #[test]
    fn test_spectator_is_receive_only() {
        let (mut session, _, _) = two_humans();
        let spectator = session.connect(9, None).unwrap();
        assert_eq!(spectator.seat, None);
        session.take_outbox();

        session.handle(spectator, cat_to(3, 0), T0 + 1000);
        assert_eq!(errors_for(&session.take_outbox(), 9), vec!["Spectators cannot act in a match"]);
        assert_eq!(session.state().ply(), 0);

        session.handle(
            spectator,
            ClientMessage::ChatMessage {
                channel: ChatChannel::Game,
                text: "hi".into(),
            },
            T0,
        );
        let outbox = session.take_outbox();
        assert!(matches!(
            outbox[0].message,
            ServerMessage::ChatError {
                code: ChatErrorCode::Spectator
            }
        ));
    }

    #[test]
    fn test_chat_validation() {
        let (mut session, p1, _) = two_humans();
        let chat = |text: &str| ClientMessage::ChatMessage {
            channel: ChatChannel::Game,
            text: text.into(),
        };

        session.handle(p1, chat("   "), T0);
        session.handle(p1, chat(&"x".repeat(21)), T0);
        session.handle(p1, chat("good game"), T0);
        let outbox = session.take_outbox();
        let codes: Vec<_> = outbox
            .iter()
            .filter_map(|o| match o.message {
                ServerMessage::ChatError { code } => Some(code),
                _ => None,
            })
            .collect();
        assert_eq!(codes, vec![ChatErrorCode::Empty, ChatErrorCode::TooLong]);
        assert!(outbox.iter().any(|o| matches!(
            &o.message,
            ServerMessage::ChatMessage { text, sender: Some(PlayerId::One), .. } if text == "good game"
        )));
    }

    #[test]
    fn test_draw_offer_and_accept() {
        let (mut session, p1, p2) = two_humans();
        session.handle(p1, ClientMessage::DrawOffer, T0 + 100);
        session.handle(p2, ClientMessage::DrawOffer, T0 + 200);
        assert_eq!(errors_for(&session.take_outbox(), 2), vec!["A draw offer is already pending"]);

        session.handle(p1, ClientMessage::DrawAccept, T0 + 300);
        assert_eq!(errors_for(&session.take_outbox(), 1).len(), 1);

        session.handle(p2, ClientMessage::DrawAccept, T0 + 400);
        let result = session.state().result().unwrap();
        assert_eq!(result.winner, None);
        assert_eq!(result.reason, ResultReason::DrawAgreement);
        assert_eq!(session.phase(), MatchPhase::Completed);
        assert!(session.take_effects().iter().any(|e| matches!(e, Effect::Completed)));
    }

    #[test]
    fn test_cancel_respects_grace() {
        let (mut session, p1, _) = two_humans();
        session.handle(p1, ClientMessage::DrawOffer, T0);
        session.handle(p1, ClientMessage::DrawReject, T0 + 1000);
        assert_eq!(errors_for(&session.take_outbox(), 1).len(), 1);
        assert_eq!(session.snapshot().pending_offers.len(), 1);

        session.handle(p1, ClientMessage::DrawReject, T0 + 2000);
        let outbox = session.take_outbox();
        assert!(outbox.iter().any(|o| matches!(
            &o.message,
            ServerMessage::DrawRejected { offer } if offer.status == OfferStatus::Declined
        )));
        assert!(session.snapshot().pending_offers.is_empty());
    }

    #[test]
    fn test_takeback_truncates_and_rewinds() {
        let (mut session, p1, p2) = two_humans();
        session.handle(p1, cat_to(3, 0), T0 + 1000);
        session.handle(p2, cat_to(1, 4), T0 + 2000);
        session.handle(p1, cat_to(2, 0), T0 + 3000);
        assert_eq!(session.state().ply(), 3);
        session.take_effects();

        // Player 2 is on move, so both of their plies' worth come back.
        session.handle(p2, ClientMessage::TakebackOffer, T0 + 4000);
        session.handle(p1, ClientMessage::TakebackAccept, T0 + 5000);

        assert_eq!(session.state().history().len(), 1);
        assert_eq!(session.state().turn(), PlayerId::Two);
        assert_eq!(session.snapshot().takebacks, 1);
        let effects = session.take_effects();
        assert!(matches!(effects[0], Effect::Rewound { ply: 1 }));
    }

    #[test]
    fn test_takeback_needs_history() {
        let (mut session, _, p2) = two_humans();
        session.handle(p2, ClientMessage::TakebackOffer, T0 + 100);
        assert_eq!(errors_for(&session.take_outbox(), 2).len(), 1);
        assert!(session.snapshot().pending_offers.is_empty());
    }

    #[test]
    fn test_bot_seat_auto_accepts_after_delay() {
        let mut session = MatchSession::new(
            "m2".into(),
            GameConfig::new(Variant::Standard, 5, 5),
            PerPlayer::new(human("t1"), bot(ControllerKind::LocalAi)),
            PlayerId::One,
            settings(),
            T0,
        )
        .unwrap();
        let p1 = session.connect(1, Some("t1")).unwrap();
        session.handle(p1, ClientMessage::DrawOffer, T0 + 1000);
        assert_eq!(session.next_deadline(), Some(T0 + 1500));

        session.on_deadline(T0 + 1499);
        assert!(session.state().is_playing());
        session.on_deadline(T0 + 1500);
        assert_eq!(session.state().result().unwrap().reason, ResultReason::DrawAgreement);
    }

    #[test]
    fn test_bot_on_move_gets_request_and_stale_answers_drop() {
        let mut session = MatchSession::new(
            "m3".into(),
            GameConfig::new(Variant::Standard, 5, 5),
            PerPlayer::new(bot(ControllerKind::LocalAi), human("t2")),
            PlayerId::Two,
            settings(),
            T0,
        )
        .unwrap();
        let version = match session.take_effects().as_slice() {
            [Effect::RequestMove { seat, version, .. }] => {
                assert_eq!(*seat, PlayerId::One);
                *version
            }
            other => panic!("unexpected {other:?}"),
        };

        session.controller_move(PlayerId::One, version + 7, Ok(vec![Action::cat(Cell::new(3, 0))].into()), T0 + 10);
        assert_eq!(session.state().ply(), 0);

        session.controller_move(PlayerId::One, version, Ok(vec![Action::cat(Cell::new(3, 0))].into()), T0 + 10);
        assert_eq!(session.state().ply(), 1);
    }

    #[test]
    fn test_controller_fault_forfeits() {
        let mut session = MatchSession::new(
            "m4".into(),
            GameConfig::new(Variant::Standard, 5, 5),
            PerPlayer::new(bot(ControllerKind::RemoteBot), human("t2")),
            PlayerId::Two,
            settings(),
            T0,
        )
        .unwrap();
        let effects = session.take_effects();
        let Some(Effect::RequestMove { version, .. }) = effects.last() else {
            panic!("no move requested");
        };

        // Illegal answer: two steps at once.
        session.controller_move(PlayerId::One, *version, Ok(vec![Action::cat(Cell::new(2, 0))].into()), T0 + 10);
        let result = session.state().result().unwrap();
        assert_eq!(result.winner, Some(PlayerId::Two));
        assert_eq!(result.reason, ResultReason::Resignation);
    }

    #[test]
    fn test_controller_fault_continue_keeps_playing() {
        let mut s = settings();
        s.fault_policy = FaultPolicy::Continue;
        let mut session = MatchSession::new(
            "m5".into(),
            GameConfig::new(Variant::Standard, 5, 5),
            PerPlayer::new(bot(ControllerKind::RemoteBot), human("t2")),
            PlayerId::Two,
            s,
            T0,
        )
        .unwrap();
        session.take_effects();
        session.controller_move(PlayerId::One, 1, Err("timed out".into()), T0 + 10);
        assert!(session.state().is_playing());
        assert!(session
            .take_outbox()
            .iter()
            .any(|o| matches!(&o.message, ServerMessage::Error { message } if message.contains("timed out"))));
    }

    #[test]
    fn test_clock_expiry_flags_on_deadline() {
        let (mut session, _, _) = two_humans();
        let deadline = session.next_deadline().unwrap();
        assert_eq!(deadline, T0 + 300_000);

        session.on_deadline(deadline);
        let result = session.state().result().unwrap();
        assert_eq!(result.winner, Some(PlayerId::Two));
        assert_eq!(result.reason, ResultReason::Timeout);
    }

    #[test]
    fn test_abort_only_by_creator_before_moves() {
        let (mut session, p1, _) = two_humans();
        assert!(session.abort("t2", T0).is_err());
        session.handle(p1, cat_to(3, 0), T0 + 1000);
        assert!(session.abort("t1", T0 + 2000).is_err());

        let (mut fresh, _, _) = two_humans();
        fresh.abort("t1", T0 + 10).unwrap();
        assert_eq!(fresh.phase(), MatchPhase::Aborted);
        assert_eq!(fresh.state().status(), GameStatus::Aborted);
    }

    #[test]
    fn test_rematch_swaps_seats() {
        let (mut session, p1, p2) = two_humans();
        session.handle(p1, ClientMessage::Resign, T0 + 100);
        session.handle(p2, ClientMessage::RematchOffer, T0 + 200);
        session.handle(p1, ClientMessage::RematchAccept, T0 + 300);

        let plan = session
            .take_effects()
            .into_iter()
            .find_map(|e| match e {
                Effect::StartRematch(plan) => Some(plan),
                _ => None,
            })
            .unwrap();
        assert_eq!(plan.seats.p1.unwrap().token.as_deref(), Some("t2"));
        assert_eq!(plan.seats.p2.unwrap().token.as_deref(), Some("t1"));
        assert_eq!(plan.creator, PlayerId::Two);

        session.rematch_started("m9".into());
        assert_eq!(session.snapshot().next_match_id.as_deref(), Some("m9"));
        session.handle(p2, ClientMessage::RematchOffer, T0 + 400);
        assert_eq!(errors_for(&session.take_outbox(), 2).last().unwrap(), "The rematch has already started");
    }
}
