//! Live matches and the tasks that run them.
//!
//! Every match is owned by one task holding its [`MatchSession`]. Sockets
//! and HTTP handlers talk to it through a [`MatchHandle`]: commands go in
//! over an mpsc channel, messages come out over a broadcast channel, and the
//! latest snapshot is readable at any time from a watch channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tracing::{debug, info, warn};
use wallwars_core::{ConfigError, GameConfig, GameState, GameStatus, PerPlayer, PlayerId};

use crate::archive::{Archive, ArchivedMatch};
use crate::bots::{BotDriver, MoveReply};
use crate::config::Config;
use crate::error::AppError;
use crate::eval_hub::{self, EvalFeed, EvalSubscription};
use crate::protocol::{ClientMessage, MatchSnapshot};
use crate::session::{Effect, MatchSession, Outbound, Participant, SeatSpec, SessionError, SessionSettings};

const COMMAND_CAPACITY: usize = 64;
const EVENT_CAPACITY: usize = 256;
const MATCH_ID_LEN: usize = 10;
const TOKEN_LEN: usize = 32;
/// Finished matches with nobody attached are dropped after this long.
const IDLE_TTL: Duration = Duration::from_secs(600);

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Secret that authenticates a seat.
pub fn new_token() -> String {
    random_string(TOKEN_LEN)
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchView {
    pub snapshot: MatchSnapshot,
    pub state: GameState,
}

impl MatchView {
    fn of(session: &MatchSession) -> Self {
        Self {
            snapshot: session.snapshot(),
            state: session.state().clone(),
        }
    }
}

#[derive(Debug)]
enum Command {
    Connect {
        socket_id: u64,
        token: Option<String>,
        reply: oneshot::Sender<Result<Participant, SessionError>>,
    },
    Disconnect(Participant),
    Client {
        from: Participant,
        message: ClientMessage,
    },
    Join {
        name: Option<String>,
        token: String,
        reply: oneshot::Sender<Result<PlayerId, SessionError>>,
    },
    Abort {
        token: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    SubscribeEval {
        reply: oneshot::Sender<EvalSubscription>,
    },
}

#[derive(Clone)]
pub struct MatchHandle {
    id: String,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<Outbound>,
    view: watch::Receiver<MatchView>,
}

fn gone() -> AppError {
    AppError::NotFound("Match not found".to_string())
}

impl MatchHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn view(&self) -> MatchView {
        self.view.borrow().clone()
    }

    /// Subscribe before connecting so no message addressed to the new
    /// socket is missed.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.events.subscribe()
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, AppError> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(make(reply)).await.map_err(|_| gone())?;
        rx.await.map_err(|_| gone())
    }

    pub async fn connect(&self, socket_id: u64, token: Option<String>) -> Result<Participant, AppError> {
        Ok(self
            .call(|reply| Command::Connect {
                socket_id,
                token,
                reply,
            })
            .await??)
    }

    pub async fn disconnect(&self, participant: Participant) {
        let _ = self.commands.send(Command::Disconnect(participant)).await;
    }

    pub async fn send(&self, from: Participant, message: ClientMessage) -> Result<(), AppError> {
        self.commands
            .send(Command::Client { from, message })
            .await
            .map_err(|_| gone())
    }

    pub async fn join(&self, name: Option<String>, token: String) -> Result<PlayerId, AppError> {
        Ok(self.call(|reply| Command::Join { name, token, reply }).await??)
    }

    pub async fn abort(&self, token: String) -> Result<(), AppError> {
        Ok(self.call(|reply| Command::Abort { token, reply }).await??)
    }

    pub async fn subscribe_eval(&self) -> Result<EvalSubscription, AppError> {
        self.call(|reply| Command::SubscribeEval { reply }).await
    }
}

#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    archive: Archive,
    matches: RwLock<HashMap<String, MatchHandle>>,
    sockets: AtomicU64,
}

impl Registry {
    pub fn new(config: Config) -> Self {
        let archive = Archive::new(config.archive_dir.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                archive,
                matches: RwLock::new(HashMap::new()),
                sockets: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn archive(&self) -> &Archive {
        &self.inner.archive
    }

    pub fn next_socket_id(&self) -> u64 {
        self.inner.sockets.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.inner.matches.read().await.len()
    }

    pub async fn get(&self, match_id: &str) -> Option<MatchHandle> {
        self.inner.matches.read().await.get(match_id).cloned()
    }

    async fn remove(&self, match_id: &str) {
        self.inner.matches.write().await.remove(match_id);
    }

    /// Creates a match and starts its task.
    pub async fn create(
        &self,
        config: GameConfig,
        seats: PerPlayer<Option<SeatSpec>>,
        creator: PlayerId,
        rematch_of: Option<String>,
    ) -> Result<MatchHandle, ConfigError> {
        let mut matches = self.inner.matches.write().await;
        let id = loop {
            let candidate = random_string(MATCH_ID_LEN);
            if !matches.contains_key(&candidate) {
                break candidate;
            }
        };

        let settings = SessionSettings::from(&self.inner.config);
        let mut session = MatchSession::new(id.clone(), config, seats, creator, settings, now_ms())?;
        if let Some(previous) = rematch_of {
            session = session.with_rematch_of(previous);
        }

        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (view_tx, view) = watch::channel(MatchView::of(&session));
        let handle = MatchHandle {
            id: id.clone(),
            commands,
            events: events.clone(),
            view,
        };
        matches.insert(id.clone(), handle.clone());
        drop(matches);

        let (replies, reply_rx) = mpsc::unbounded_channel();
        let task = MatchTask {
            registry: self.clone(),
            session,
            events,
            view: view_tx,
            bots: PerPlayer::new(None, None),
            replies,
            eval: None,
        };
        task.spawn(command_rx, reply_rx);
        Ok(handle)
    }
}

enum Wake {
    Command(Command),
    Reply(MoveReply),
    Deadline,
    Idle,
}

struct MatchTask {
    registry: Registry,
    session: MatchSession,
    events: broadcast::Sender<Outbound>,
    view: watch::Sender<MatchView>,
    bots: PerPlayer<Option<BotDriver>>,
    replies: mpsc::UnboundedSender<MoveReply>,
    /// Started by the first evaluation observer.
    eval: Option<mpsc::UnboundedSender<EvalFeed>>,
}

impl MatchTask {
    /// Boxed, since a running task creates rematches through [`Registry::create`].
    fn spawn(self, commands: mpsc::Receiver<Command>, replies: mpsc::UnboundedReceiver<MoveReply>) {
        let task: BoxFuture<'static, ()> = Box::pin(self.run(commands, replies));
        tokio::spawn(task);
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut replies: mpsc::UnboundedReceiver<MoveReply>) {
        let id = self.session.id().to_string();
        debug!(match_id = %id, "Match task started");
        self.flush().await;

        loop {
            let deadline = self.session.next_deadline();
            let idle = self.session.completed_at().is_some() && self.session.connections() == 0;

            let wake = tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => Wake::Command(cmd),
                    None => break,
                },
                Some(reply) = replies.recv() => Wake::Reply(reply),
                _ = sleep_until(deadline) => Wake::Deadline,
                _ = tokio::time::sleep(IDLE_TTL), if idle => Wake::Idle,
            };

            match wake {
                Wake::Command(cmd) => self.on_command(cmd).await,
                Wake::Reply(reply) => {
                    self.session
                        .controller_move(reply.seat, reply.version, reply.result, now_ms())
                }
                Wake::Deadline => self.session.on_deadline(now_ms()),
                Wake::Idle => break,
            }
            self.flush().await;
        }

        self.registry.remove(&id).await;
        info!(match_id = %id, "Match task stopped");
    }

    /// Replies are sent after the resulting messages went out, so a caller
    /// that reads the view next sees the change.
    async fn on_command(&mut self, cmd: Command) {
        let now = now_ms();
        match cmd {
            Command::Connect {
                socket_id,
                token,
                reply,
            } => {
                let result = self.session.connect(socket_id, token.as_deref());
                self.flush().await;
                let _ = reply.send(result);
            }
            Command::Disconnect(participant) => self.session.disconnect(participant),
            Command::Client { from, message } => self.session.handle(from, message, now),
            Command::Join { name, token, reply } => {
                let result = self.session.join(name, token, now);
                self.flush().await;
                let _ = reply.send(result);
            }
            Command::Abort { token, reply } => {
                let result = self.session.abort(&token, now);
                self.flush().await;
                let _ = reply.send(result);
            }
            Command::SubscribeEval { reply } => {
                let feed = self.eval.get_or_insert_with(|| {
                    eval_hub::spawn_live(
                        self.session.id().to_string(),
                        self.registry.config().engine.clone(),
                        self.session.state().clone(),
                    )
                });
                let _ = feed.send(EvalFeed::Subscribe(reply));
            }
        }
    }

    /// Runs queued effects, then delivers queued messages, until the session
    /// is quiet. A finished match is archived before anyone hears it ended.
    async fn flush(&mut self) {
        loop {
            let outbox = self.session.take_outbox();
            let effects = self.session.take_effects();
            if outbox.is_empty() && effects.is_empty() {
                break;
            }
            for effect in effects {
                self.apply(effect).await;
            }
            for outbound in outbox {
                // No subscribers is fine.
                let _ = self.events.send(outbound);
            }
        }
        self.view.send_replace(MatchView::of(&self.session));
    }

    async fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::RequestMove { seat, version, state } => {
                let Some(kind) = self.session.controller(seat) else {
                    return;
                };
                let driver = self.bots[seat].get_or_insert_with(|| {
                    BotDriver::spawn(
                        self.session.id(),
                        seat,
                        kind,
                        &self.registry.config().engine,
                        state.config(),
                        self.replies.clone(),
                    )
                });
                driver.request(version, state);
            }
            Effect::StateChanged(state) => self.feed_eval(EvalFeed::State(state)),
            Effect::Rewound { ply } => self.feed_eval(EvalFeed::Rewind(ply)),
            Effect::Completed => {
                self.bots = PerPlayer::new(None, None);
                if self.session.state().status() == GameStatus::Finished {
                    let record = ArchivedMatch {
                        match_id: self.session.id().to_string(),
                        snapshot: self.session.snapshot(),
                        state: self.session.state().clone(),
                        completed_at: Utc::now(),
                    };
                    if let Err(e) = self.registry.archive().store(record).await {
                        warn!(match_id = %self.session.id(), error = %e, "Failed to archive match");
                    }
                }
            }
            Effect::StartRematch(plan) => {
                let created = self
                    .registry
                    .create(plan.config, plan.seats, plan.creator, Some(self.session.id().to_string()))
                    .await;
                match created {
                    Ok(handle) => self.session.rematch_started(handle.id().to_string()),
                    Err(e) => self.session.rematch_failed(&e.to_string()),
                }
            }
        }
    }

    fn feed_eval(&mut self, item: EvalFeed) {
        if let Some(feed) = &self.eval {
            if feed.send(item).is_err() {
                self.eval = None;
            }
        }
    }
}

async fn sleep_until(deadline: Option<i64>) {
    match deadline {
        Some(at) => {
            let wait = u64::try_from(at - now_ms()).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
        None => std::future::pending().await,
    }
}
