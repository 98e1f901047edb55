//! The session driver.
//!
//! A [`Game`] owns one party's position in a shared plan. It enters steps,
//! runs their callbacks, publishes lifecycle events and outbound
//! notifications, and asks the effective step rule whether it may move on.
//! Callbacks and event handlers receive the game itself, so they may step,
//! emit, or mark the step done from inside a dispatch. A transition counter
//! keeps the outer call from overwriting the state such a reentrant call
//! left behind.

use std::fmt;
use std::sync::Arc;

use lockstep_core::address::Address;
use lockstep_core::clock::{Clock, SystemClock};
use lockstep_core::error::{CallbackError, NavigationError};
use lockstep_core::event::{
    ENGINE_FATAL, ENGINE_INITIALIZING, ENGINE_OVER, ENGINE_READY, STAGE_ACTIVE, STAGE_DONE,
    STAGE_LOADED, STAGE_LOADING, STAGE_PAUSED, STAGE_RESUMED,
};
use lockstep_core::level::{CompletionLevel, EngineLevel};
use lockstep_core::roster::PartyId;
use lockstep_core::transport::{
    NullStore, NullTransport, StageNotification, Store, StoreRecord, Transport,
};
use lockstep_events::{
    EmittedEvent, EmitterHost, EventEmitter, EventError, EventHistory, HandlerId, ReplayFilter,
};
use lockstep_plan::{Destination, GameLoop, Plan, RuleContext, Stager, Step};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::SessionConfig;
use crate::domain::roster::{Roster, StageTrail};

/// A plan whose callbacks drive a [`Game`] holding session data `S`.
pub type SessionPlan<S = ()> = Plan<Game<S>>;

/// Builder for a [`SessionPlan`].
pub type SessionStager<S = ()> = Stager<Game<S>>;

/// Errors raised by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// The call is not allowed in the current state.
    #[error("cannot {action} while engine is {engine:?} and step is {completion:?}")]
    InvalidTransition {
        /// The rejected call.
        action: &'static str,
        /// Engine level at the time.
        engine: EngineLevel,
        /// Completion level at the time.
        completion: CompletionLevel,
    },

    /// The one-time setup hook failed; the session cannot run.
    #[error("session setup failed: {0}")]
    Setup(#[source] CallbackError),

    /// A step callback failed in diagnostics mode.
    #[error("step {address} failed: {source}")]
    RuntimeCallback {
        /// Address of the failing step.
        address: Address,
        /// The callback's error.
        #[source]
        source: CallbackError,
    },

    /// The teardown hook failed in diagnostics mode.
    #[error("session teardown failed: {0}")]
    Teardown(#[source] CallbackError),

    /// A lifecycle event handler failed in diagnostics mode.
    #[error(transparent)]
    Event(#[from] EventError),

    /// A requested address does not exist in the plan.
    #[error("cannot go to {address}: {source}")]
    Navigation {
        /// The requested address.
        address: Address,
        /// Why it did not resolve.
        #[source]
        source: NavigationError,
    },
}

/// One party's running session.
pub struct Game<S = ()> {
    plan: Arc<SessionPlan<S>>,
    config: SessionConfig,
    address: Address,
    completion: CompletionLevel,
    engine: EngineLevel,
    roster: Roster,
    trail: StageTrail,
    emitter: EventEmitter<Self>,
    transport: Box<dyn Transport + Send>,
    store: Box<dyn Store + Send>,
    transitions: u64,
    sequence: u64,
    data: S,
}

/// Assembles a [`Game`] with its collaborators.
pub struct GameBuilder<S = ()> {
    plan: Arc<SessionPlan<S>>,
    data: S,
    config: SessionConfig,
    transport: Box<dyn Transport + Send>,
    store: Box<dyn Store + Send>,
    clock: Arc<dyn Clock>,
}

impl<S> GameBuilder<S> {
    /// Starts a builder with default configuration and null collaborators.
    #[must_use]
    pub fn new(plan: Arc<SessionPlan<S>>, data: S) -> Self {
        Self {
            plan,
            data,
            config: SessionConfig::default(),
            transport: Box::new(NullTransport),
            store: Box::new(NullStore),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the outbound transport.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + Send + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    /// Sets the data store.
    #[must_use]
    pub fn store(mut self, store: impl Store + Send + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    /// Sets the clock stamping recorded events.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Creates the game, not yet started.
    #[must_use]
    pub fn build(self) -> Game<S> {
        let emitter = if self.config.record_history {
            EventEmitter::with_history(EventHistory::new(self.clock))
        } else {
            EventEmitter::new()
        };
        Game {
            plan: self.plan,
            config: self.config,
            address: Address::zero(),
            completion: CompletionLevel::NotStarted,
            engine: EngineLevel::Uninitialized,
            roster: Roster::new(),
            trail: StageTrail::new(),
            emitter,
            transport: self.transport,
            store: self.store,
            transitions: 0,
            sequence: 0,
            data: self.data,
        }
    }
}

impl<S> Game<S> {
    /// Starts a builder.
    #[must_use]
    pub fn builder(plan: Arc<SessionPlan<S>>, data: S) -> GameBuilder<S> {
        GameBuilder::new(plan, data)
    }

    /// Creates a game with default configuration and null collaborators.
    #[must_use]
    pub fn new(plan: Arc<SessionPlan<S>>, data: S) -> Self {
        GameBuilder::new(plan, data).build()
    }

    /// Runs the setup hook and enters the first step.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless the engine is uninitialized; `Setup` if the
    /// setup hook fails (always fatal); otherwise as [`Game::step`].
    pub fn start(&mut self) -> Result<(), GameError> {
        if self.engine != EngineLevel::Uninitialized {
            return Err(self.invalid("start"));
        }
        info!(party = %self.config.party_id, "starting session");
        self.engine = EngineLevel::Initializing;
        self.announce(ENGINE_INITIALIZING, vec![])?;

        if let Some(init) = self.plan.on_init().cloned()
            && let Err(source) = init(self)
        {
            return Err(self.fail(GameError::Setup(source)));
        }

        self.engine = EngineLevel::Ready;
        self.announce(ENGINE_READY, vec![])?;
        self.engine = EngineLevel::Running;
        self.step()
    }

    /// Moves to the next address of the plan.
    ///
    /// At the end of a sequence without game over the session idles; an
    /// unresolvable address makes no progress.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless running; in diagnostics mode, callback and
    /// handler failures.
    pub fn step(&mut self) -> Result<(), GameError> {
        self.ensure_running("step")?;
        let destination = GameLoop::new(&self.plan).next(&self.address);
        match destination {
            Destination::At(address) => self.enter(address),
            Destination::GameOver => self.finish(),
            Destination::SequenceEnded => {
                info!(address = %self.address, "sequence ended without game over; idling");
                Ok(())
            }
            Destination::Unresolvable(_) => Ok(()),
        }
    }

    /// Marks the current step done and advances if the rule allows it.
    /// Returns whether the game advanced.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless a step is playing; otherwise as
    /// [`Game::step`].
    pub fn mark_done(&mut self) -> Result<bool, GameError> {
        self.ensure_running("mark_done")?;
        if !matches!(
            self.completion,
            CompletionLevel::Playing | CompletionLevel::Loaded
        ) {
            return Err(self.invalid("mark_done"));
        }
        let transition = self.transitions;
        self.set_completion(CompletionLevel::Done, STAGE_DONE)?;
        if self.superseded(transition, CompletionLevel::Done) {
            return Ok(true);
        }
        self.recheck()
    }

    /// Consults the effective rule again, e.g. after the roster changed.
    /// Returns whether the game advanced.
    ///
    /// # Errors
    ///
    /// As [`Game::step`].
    pub fn recheck(&mut self) -> Result<bool, GameError> {
        let parked = matches!(
            self.completion,
            CompletionLevel::Playing | CompletionLevel::Done
        );
        if self.engine != EngineLevel::Running || !parked {
            return Ok(false);
        }
        if !self.may_advance() {
            debug!(address = %self.address, completion = ?self.completion, "waiting on step rule");
            return Ok(false);
        }
        self.step()?;
        Ok(true)
    }

    /// Applies a remote party's notification and re-consults the rule.
    /// Returns whether the game advanced.
    ///
    /// # Errors
    ///
    /// As [`Game::step`].
    pub fn apply_notification(
        &mut self,
        notification: &StageNotification,
    ) -> Result<bool, GameError> {
        if notification.sender == self.config.party_id {
            return Ok(false);
        }
        let mut notification = notification.clone();
        if !notification.address.is_zero() {
            match GameLoop::new(&self.plan).normalize(&notification.address) {
                Ok(address) => notification.address = address,
                Err(error) => {
                    warn!(party = %notification.sender, %error, "ignoring notification for unknown address");
                    return Ok(false);
                }
            }
        }
        if !self.roster.apply(&notification) {
            warn!(
                party = %notification.sender,
                sequence = notification.sequence,
                "ignoring stale notification"
            );
            return Ok(false);
        }
        self.recheck()
    }

    /// Suspends the playing step.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless a step is playing.
    pub fn pause(&mut self) -> Result<(), GameError> {
        self.ensure_running("pause")?;
        if self.completion != CompletionLevel::Playing {
            return Err(self.invalid("pause"));
        }
        self.set_completion(CompletionLevel::Paused, STAGE_PAUSED)
    }

    /// Resumes a paused step.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless paused.
    pub fn resume(&mut self) -> Result<(), GameError> {
        self.ensure_running("resume")?;
        if self.completion != CompletionLevel::Paused {
            return Err(self.invalid("resume"));
        }
        self.set_completion(CompletionLevel::Playing, STAGE_RESUMED)
    }

    /// Enters `address` directly, by name or index.
    ///
    /// # Errors
    ///
    /// `Navigation` when the address does not resolve; otherwise as
    /// [`Game::step`].
    pub fn goto_step(&mut self, address: &Address) -> Result<(), GameError> {
        self.ensure_running("goto_step")?;
        let mut target = GameLoop::new(&self.plan)
            .normalize(address)
            .map_err(|source| GameError::Navigation {
                address: address.clone(),
                source,
            })?;
        target.repetition = target.repetition.max(1);
        info!(from = %self.address, to = %target, "jumping to step");
        self.enter(target)
    }

    /// Ends the session now.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` unless running; in diagnostics mode, teardown and
    /// handler failures.
    pub fn game_over(&mut self) -> Result<(), GameError> {
        self.ensure_running("game_over")?;
        self.finish()
    }

    /// Registers a session-wide handler.
    pub fn on<F>(&mut self, name: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&mut Self, &EmittedEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.emitter.add(name, handler)
    }

    /// Registers a handler dropped when the game leaves the current step.
    pub fn on_local<F>(&mut self, name: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&mut Self, &EmittedEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.emitter.add_local(name, handler)
    }

    /// Removes one handler, or all handlers for `name`.
    pub fn off(&mut self, name: &str, id: Option<HandlerId>) -> bool {
        self.emitter.remove(name, id)
    }

    /// Emits an application event. Returns whether any handler ran.
    ///
    /// # Errors
    ///
    /// `EventError` for oversized payloads or a failing handler.
    pub fn emit(&mut self, name: &str, args: Vec<Value>) -> Result<bool, EventError> {
        lockstep_events::emit(self, name, args)
    }

    /// Replays recorded events accepted by `filter`.
    ///
    /// # Errors
    ///
    /// `EventError` if a handler fails during the replay.
    pub fn remit(&mut self, filter: &ReplayFilter) -> Result<bool, EventError> {
        lockstep_events::remit(self, filter)
    }

    /// Writes `value` under `key`, tagged with the current address and the
    /// local party.
    pub fn store(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let record = StoreRecord {
            key: key.into(),
            value: value.into(),
            address: self.labelled_address(),
            party: self.config.party_id,
        };
        self.store.write(record);
    }

    /// Property `key` of the current step, falling back to its stage and the
    /// plan defaults.
    #[must_use]
    pub fn step_property(&self, key: &str) -> Option<&Value> {
        self.plan.property(&self.address, key)
    }

    /// Current (normalized) address.
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Current address with the stage name as major.
    #[must_use]
    pub fn labelled_address(&self) -> Address {
        GameLoop::new(&self.plan)
            .label(&self.address)
            .unwrap_or_else(|_| self.address.clone())
    }

    /// Local completion level.
    #[must_use]
    pub fn completion(&self) -> CompletionLevel {
        self.completion
    }

    /// Engine level.
    #[must_use]
    pub fn engine_level(&self) -> EngineLevel {
        self.engine
    }

    /// The plan being run.
    #[must_use]
    pub fn plan(&self) -> &Arc<SessionPlan<S>> {
        &self.plan
    }

    /// The step bound at the current address.
    #[must_use]
    pub fn current_step(&self) -> Option<&Step<Self>> {
        self.plan.step_at(&self.address)
    }

    /// The local party.
    #[must_use]
    pub fn party_id(&self) -> PartyId {
        self.config.party_id
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Remote parties.
    #[must_use]
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Mutable access to the roster, e.g. to register expected parties.
    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    /// Recorded events, when history is enabled.
    #[must_use]
    pub fn history(&self) -> Option<&EventHistory> {
        self.emitter.history()
    }

    /// Mutable access to the event log.
    pub fn history_mut(&mut self) -> Option<&mut EventHistory> {
        self.emitter.history_mut()
    }

    /// Number of address changes so far.
    #[must_use]
    pub fn transition_count(&self) -> u64 {
        self.transitions
    }

    /// Session data.
    #[must_use]
    pub fn data(&self) -> &S {
        &self.data
    }

    /// Mutable session data.
    pub fn data_mut(&mut self) -> &mut S {
        &mut self.data
    }

    fn enter(&mut self, address: Address) -> Result<(), GameError> {
        let Some(step) = self.plan.step_at(&address) else {
            warn!(%address, "no step bound at address");
            return Ok(());
        };
        let callback = Arc::clone(step.callback());
        let step_name = step.name().to_owned();

        self.transitions += 1;
        let transition = self.transitions;
        self.emitter.clear_local();
        self.trail.enter(&address);
        self.address = address;
        debug!(address = %self.address, step = %step_name, "entering step");

        self.set_completion(CompletionLevel::Loading, STAGE_LOADING)?;
        if self.superseded(transition, CompletionLevel::Loading) {
            return Ok(());
        }

        match callback(self) {
            Ok(true) => {}
            Ok(false) => {
                warn!(address = %self.address, step = %step_name, "step callback reported failure");
            }
            Err(source) if self.config.diagnostics => {
                let address = self.address.clone();
                return Err(self.fail(GameError::RuntimeCallback { address, source }));
            }
            Err(source) => {
                warn!(address = %self.address, step = %step_name, error = %source, "step callback failed");
            }
        }
        if self.superseded(transition, CompletionLevel::Loading) {
            return Ok(());
        }

        self.set_completion(CompletionLevel::Loaded, STAGE_LOADED)?;
        if self.superseded(transition, CompletionLevel::Loaded) {
            return Ok(());
        }
        self.set_completion(CompletionLevel::Playing, STAGE_ACTIVE)
    }

    fn finish(&mut self) -> Result<(), GameError> {
        self.transitions += 1;
        self.engine = EngineLevel::Over;
        self.emitter.clear_local();
        info!(address = %self.address, "game over");
        self.notify();
        self.announce(ENGINE_OVER, vec![])?;

        if let Some(teardown) = self.plan.on_gameover().cloned()
            && let Err(source) = teardown(self)
        {
            if self.config.diagnostics {
                return Err(self.fail(GameError::Teardown(source)));
            }
            warn!(error = %source, "teardown hook failed");
        }
        Ok(())
    }

    /// True when a reentrant call moved the game on since `transition`, or
    /// changed the completion level away from `expected`.
    fn superseded(&self, transition: u64, expected: CompletionLevel) -> bool {
        self.transitions != transition
            || self.engine != EngineLevel::Running
            || self.completion != expected
    }

    fn may_advance(&self) -> bool {
        let Some((stage, _)) = self.plan.locate(&self.address) else {
            return false;
        };
        let roster = self.roster.progress(&self.trail);
        let ctx = RuleContext {
            address: &self.address,
            completion: self.completion,
            roster: &roster,
            stage_steps: stage.steps().len(),
        };
        self.plan.effective_rule(&self.address).evaluate(&ctx)
    }

    fn set_completion(&mut self, level: CompletionLevel, event: &str) -> Result<(), GameError> {
        self.completion = level;
        self.notify();
        let address = Value::String(self.labelled_address().to_string());
        self.announce(event, vec![address])
    }

    fn notify(&mut self) {
        self.sequence += 1;
        self.transport.send(StageNotification {
            sender: self.config.party_id,
            address: self.address.clone(),
            completion: self.completion,
            sequence: self.sequence,
        });
    }

    /// Emits a lifecycle event. Handler failures are logged, or fatal in
    /// diagnostics mode.
    fn announce(&mut self, name: &str, args: Vec<Value>) -> Result<(), GameError> {
        match lockstep_events::emit(self, name, args) {
            Ok(_) => Ok(()),
            Err(error) if self.config.diagnostics => Err(self.fail(GameError::Event(error))),
            Err(error) => {
                warn!(event = name, %error, "lifecycle handler failed");
                Ok(())
            }
        }
    }

    fn fail(&mut self, failure: GameError) -> GameError {
        error!(address = %self.address, error = %failure, "session failed");
        self.engine = EngineLevel::Fatal;
        if let Err(error) = lockstep_events::emit(self, ENGINE_FATAL, vec![]) {
            warn!(%error, "fatal handler failed");
        }
        failure
    }

    fn ensure_running(&self, action: &'static str) -> Result<(), GameError> {
        if self.engine == EngineLevel::Running {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    fn invalid(&self, action: &'static str) -> GameError {
        GameError::InvalidTransition {
            action,
            engine: self.engine,
            completion: self.completion,
        }
    }
}

impl<S> EmitterHost for Game<S> {
    fn emitter_mut(&mut self) -> &mut EventEmitter<Self> {
        &mut self.emitter
    }

    fn event_address(&self) -> Address {
        self.address.clone()
    }
}

impl<S> fmt::Debug for Game<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("party", &self.config.party_id)
            .field("address", &self.address)
            .field("completion", &self.completion)
            .field("engine", &self.engine)
            .field("roster", &self.roster.len())
            .finish_non_exhaustive()
    }
}
