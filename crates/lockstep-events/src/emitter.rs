//! Dual-scope publish/subscribe bus.
//!
//! Handlers live in two tables. Global handlers persist for the session;
//! local handlers are dropped in bulk whenever the driver moves to another
//! step. Handlers receive the host context mutably, so a handler may emit
//! again or drive the session from inside a dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lockstep_core::address::Address;
use lockstep_core::error::CallbackError;
use lockstep_core::event::MAX_EVENT_ARGS;
use serde_json::Value;
use tracing::debug;

use crate::error::EventError;
use crate::history::{EventHistory, ReplayFilter};

/// Event handler bound to a host context `C`.
pub type Handler<C> = Arc<dyn Fn(&mut C, &EmittedEvent) -> Result<(), CallbackError> + Send + Sync>;

/// Token returned on registration, used to remove a single handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// An event as delivered to handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    /// The event name.
    pub name: String,
    /// Up to [`MAX_EVENT_ARGS`] payload arguments.
    pub args: Vec<Value>,
}

impl EmittedEvent {
    /// Creates an event, rejecting oversized payloads.
    ///
    /// # Errors
    ///
    /// Returns `EventError::TooManyArgs` for more than three arguments.
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Result<Self, EventError> {
        let name = name.into();
        if args.len() > MAX_EVENT_ARGS {
            return Err(EventError::TooManyArgs {
                name,
                count: args.len(),
            });
        }
        Ok(Self { name, args })
    }

    /// Returns the argument in `slot`, if present.
    #[must_use]
    pub fn arg(&self, slot: usize) -> Option<&Value> {
        self.args.get(slot)
    }
}

struct Registration<C> {
    id: HandlerId,
    handler: Handler<C>,
}

impl<C> Clone for Registration<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Handler tables plus the optional event log.
pub struct EventEmitter<C> {
    global: HashMap<String, Vec<Registration<C>>>,
    local: HashMap<String, Vec<Registration<C>>>,
    next_id: u64,
    history: Option<EventHistory>,
}

impl<C> EventEmitter<C> {
    /// Creates an emitter that keeps no history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            global: HashMap::new(),
            local: HashMap::new(),
            next_id: 0,
            history: None,
        }
    }

    /// Creates an emitter that appends every emit to `history`.
    #[must_use]
    pub fn with_history(history: EventHistory) -> Self {
        Self {
            history: Some(history),
            ..Self::new()
        }
    }

    /// Registers a session-wide handler.
    pub fn add<F>(&mut self, name: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&mut C, &EmittedEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let registration = self.registration(Arc::new(handler));
        let id = registration.id;
        self.global.entry(name.into()).or_default().push(registration);
        id
    }

    /// Registers a handler that is dropped at the next step transition.
    pub fn add_local<F>(&mut self, name: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(&mut C, &EmittedEvent) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        let registration = self.registration(Arc::new(handler));
        let id = registration.id;
        self.local.entry(name.into()).or_default().push(registration);
        id
    }

    fn registration(&mut self, handler: Handler<C>) -> Registration<C> {
        self.next_id += 1;
        Registration {
            id: HandlerId(self.next_id),
            handler,
        }
    }

    /// Removes one handler (by id) or every handler for `name` from both
    /// tables. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str, id: Option<HandlerId>) -> bool {
        let mut changed = false;
        for table in [&mut self.global, &mut self.local] {
            match id {
                None => changed |= table.remove(name).is_some_and(|list| !list.is_empty()),
                Some(id) => {
                    if let Some(list) = table.get_mut(name) {
                        let before = list.len();
                        list.retain(|r| r.id != id);
                        changed |= list.len() != before;
                        if list.is_empty() {
                            table.remove(name);
                        }
                    }
                }
            }
        }
        changed
    }

    /// Drops every local handler.
    pub fn clear_local(&mut self) {
        self.local.clear();
    }

    /// Number of handlers (both scopes) registered for `name`.
    #[must_use]
    pub fn handler_count(&self, name: &str) -> usize {
        self.global.get(name).map_or(0, Vec::len) + self.local.get(name).map_or(0, Vec::len)
    }

    /// The event log, when recording.
    #[must_use]
    pub fn history(&self) -> Option<&EventHistory> {
        self.history.as_ref()
    }

    /// Mutable access to the event log, e.g. for pruning.
    pub fn history_mut(&mut self) -> Option<&mut EventHistory> {
        self.history.as_mut()
    }

    /// Global handlers first, then local, each in registration order.
    fn snapshot(&self, name: &str) -> Vec<Handler<C>> {
        let global = self.global.get(name).into_iter().flatten();
        let local = self.local.get(name).into_iter().flatten();
        global.chain(local).map(|r| Arc::clone(&r.handler)).collect()
    }
}

impl<C> Default for EventEmitter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for EventEmitter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("global", &self.global.keys().collect::<Vec<_>>())
            .field("local", &self.local.keys().collect::<Vec<_>>())
            .field("history", &self.history.as_ref().map(EventHistory::len))
            .finish()
    }
}

/// A context that owns an emitter for itself.
pub trait EmitterHost: Sized {
    /// The host's emitter.
    fn emitter_mut(&mut self) -> &mut EventEmitter<Self>;

    /// Address stamped on recorded events.
    fn event_address(&self) -> Address;
}

/// Emits `name` on the host's emitter.
///
/// Records the event when history is enabled, then runs global handlers
/// followed by local handlers. Returns whether any handler ran.
///
/// # Errors
///
/// Returns `EventError::TooManyArgs` for oversized payloads and
/// `EventError::Handler` with the first failing handler's error; handlers
/// after it are not run.
pub fn emit<H: EmitterHost>(host: &mut H, name: &str, args: Vec<Value>) -> Result<bool, EventError> {
    let event = EmittedEvent::new(name, args)?;
    let address = host.event_address();
    let emitter = host.emitter_mut();
    if let Some(history) = emitter.history.as_mut() {
        history.record(&event, address);
    }
    let handlers = emitter.snapshot(name);
    debug!(event = name, handlers = handlers.len(), "emitting event");
    dispatch(host, &handlers, &event)
}

/// Re-emits recorded events accepted by `filter`, in their original order.
///
/// Replayed events are not recorded again. Returns `Ok(false)` when there is
/// no history or nothing matches.
///
/// # Errors
///
/// Returns `EventError::Handler` if a handler fails during the replay.
pub fn remit<H: EmitterHost>(host: &mut H, filter: &ReplayFilter) -> Result<bool, EventError> {
    let replay = match host.emitter_mut().history() {
        Some(history) => history.replay_set(filter),
        None => return Ok(false),
    };
    if replay.is_empty() {
        return Ok(false);
    }

    debug!(events = replay.len(), "replaying recorded events");
    for event in &replay {
        let handlers = host.emitter_mut().snapshot(&event.name);
        dispatch(host, &handlers, event)?;
    }
    Ok(true)
}

fn dispatch<H>(host: &mut H, handlers: &[Handler<H>], event: &EmittedEvent) -> Result<bool, EventError> {
    for handler in handlers {
        handler(host, event).map_err(|source| EventError::Handler {
            event: event.name.clone(),
            source,
        })?;
    }
    Ok(!handlers.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lockstep_test_support::FixedClock;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Default)]
    struct Host {
        emitter: EventEmitter<Host>,
        address: Address,
        seen: Vec<String>,
    }

    impl Host {
        fn recording() -> Self {
            let clock = FixedClock::session_start();
            Self {
                emitter: EventEmitter::with_history(EventHistory::new(Arc::new(clock))),
                ..Self::default()
            }
        }
    }

    impl EmitterHost for Host {
        fn emitter_mut(&mut self) -> &mut EventEmitter<Self> {
            &mut self.emitter
        }

        fn event_address(&self) -> Address {
            self.address.clone()
        }
    }

    fn tag(label: &'static str) -> impl Fn(&mut Host, &EmittedEvent) -> Result<(), CallbackError> {
        move |host, event| {
            host.seen.push(format!("{label}:{}", event.name));
            Ok(())
        }
    }

    #[test]
    fn test_emit_runs_global_then_local_handlers_in_registration_order() {
        // Arrange
        let mut host = Host::default();
        host.emitter.add_local("ping", tag("local1"));
        host.emitter.add("ping", tag("global1"));
        host.emitter.add("ping", tag("global2"));
        host.emitter.add_local("ping", tag("local2"));

        // Act
        let handled = emit(&mut host, "ping", vec![]).unwrap();

        // Assert
        assert!(handled);
        assert_eq!(
            host.seen,
            ["global1:ping", "global2:ping", "local1:ping", "local2:ping"]
        );
    }

    #[test]
    fn test_emit_without_handlers_returns_false() {
        let mut host = Host::default();

        assert!(!emit(&mut host, "nobody", vec![json!(1)]).unwrap());
    }

    #[test]
    fn test_emit_rejects_more_than_three_args() {
        let mut host = Host::default();

        let result = emit(&mut host, "big", vec![json!(1), json!(2), json!(3), json!(4)]);

        assert_eq!(
            result,
            Err(EventError::TooManyArgs {
                name: "big".to_owned(),
                count: 4
            })
        );
    }

    #[test]
    fn test_handler_error_propagates_and_stops_dispatch() {
        // Arrange
        let mut host = Host::default();
        host.emitter.add("ping", |_, _| Err(CallbackError::new("boom")));
        host.emitter.add("ping", tag("after"));

        // Act
        let result = emit(&mut host, "ping", vec![]);

        // Assert
        match result {
            Err(EventError::Handler { event, source }) => {
                assert_eq!(event, "ping");
                assert_eq!(source, CallbackError::new("boom"));
            }
            other => panic!("expected Handler error, got {other:?}"),
        }
        assert!(host.seen.is_empty());
    }

    #[test]
    fn test_handlers_may_emit_reentrantly() {
        // Arrange
        let mut host = Host::default();
        host.emitter.add("outer", |host: &mut Host, _| {
            host.seen.push("outer".to_owned());
            emit(host, "inner", vec![])
                .map(|_| ())
                .map_err(|e| CallbackError::new(e.to_string()))
        });
        host.emitter.add("inner", tag("h"));

        // Act
        emit(&mut host, "outer", vec![]).unwrap();

        // Assert
        assert_eq!(host.seen, ["outer", "h:inner"]);
    }

    #[test]
    fn test_remove_by_id_and_by_name() {
        // Arrange
        let mut host = Host::default();
        let keep = host.emitter.add("ping", tag("keep"));
        let drop = host.emitter.add_local("ping", tag("drop"));

        // Act
        let removed_one = host.emitter.remove("ping", Some(drop));
        let removed_again = host.emitter.remove("ping", Some(drop));

        // Assert
        assert!(removed_one);
        assert!(!removed_again);
        assert_eq!(host.emitter.handler_count("ping"), 1);
        assert!(host.emitter.remove("ping", None));
        assert!(!host.emitter.remove("ping", Some(keep)));
        assert_eq!(host.emitter.handler_count("ping"), 0);
    }

    #[test]
    fn test_clear_local_keeps_global_handlers() {
        // Arrange
        let mut host = Host::default();
        host.emitter.add("ping", tag("global"));
        host.emitter.add_local("ping", tag("local"));

        // Act
        host.emitter.clear_local();
        emit(&mut host, "ping", vec![]).unwrap();

        // Assert
        assert_eq!(host.seen, ["global:ping"]);
    }

    #[test]
    fn test_emit_records_history_with_current_address() {
        // Arrange
        let mut host = Host::recording();
        host.address = Address::new(2, 1, 1);

        // Act
        emit(&mut host, "bid", vec![json!(10)]).unwrap();

        // Assert
        let history = host.emitter.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history.records()[0].address, Address::new(2, 1, 1));
        assert_eq!(history.records()[0].args, vec![json!(10)]);
    }

    #[test]
    fn test_remit_replays_filtered_subset_in_order_without_rerecording() {
        // Arrange
        let mut host = Host::recording();
        host.address = Address::new(1, 1, 1);
        emit(&mut host, "a", vec![]).unwrap();
        emit(&mut host, "skip", vec![]).unwrap();
        host.address = Address::new(1, 2, 1);
        emit(&mut host, "b", vec![]).unwrap();
        host.address = Address::new(1, 1, 1);
        emit(&mut host, "c", vec![]).unwrap();
        for name in ["a", "b", "c", "skip"] {
            host.emitter.add(name, tag("replay"));
        }

        // Act
        let filter = ReplayFilter::at(Address::new(1, 1, 1)).excluding(["skip"]);
        let replayed = remit(&mut host, &filter).unwrap();

        // Assert
        assert!(replayed);
        assert_eq!(host.seen, ["replay:a", "replay:c"]);
        assert_eq!(host.emitter.history().unwrap().len(), 4);
    }

    #[test]
    fn test_remit_with_no_match_returns_false() {
        // Arrange
        let mut host = Host::recording();
        emit(&mut host, "a", vec![]).unwrap();

        // Act
        let replayed = remit(&mut host, &ReplayFilter::all().only(["missing"])).unwrap();

        // Assert
        assert!(!replayed);
    }

    #[test]
    fn test_remit_without_history_returns_false() {
        let mut host = Host::default();

        assert!(!remit(&mut host, &ReplayFilter::all()).unwrap());
    }
}
