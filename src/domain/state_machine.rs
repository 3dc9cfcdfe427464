//! Table-Driven State Machine Engine
//!
//! Generic event-dispatched finite-state machine used to express every device
//! lifecycle in the host. A machine is built once from a transition table plus a
//! set of choice points and is then driven purely by `dispatch`.
//!
//! Choice points are decision states: entering one immediately re-routes to one
//! of two successor branches based on a boolean evaluation of the owning
//! context, without waiting for an external event.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use thiserror::Error;
use tracing::warn;

/// Upper bound on consecutive choice-point hops in a single dispatch.
///
/// Resolution is synchronous and recursive in nature; a mis-built table could
/// chain decision states into a cycle with no progress, so resolution stops
/// (and logs) once this depth is reached.
const MAX_CHOICE_DEPTH: usize = 8;

/// State identifier for a machine.
///
/// `is_decision` marks the states that must resolve through a registered
/// [`ChoicePoint`] immediately upon entry.
pub trait MachineState: Copy + Eq + Hash + Debug {
    fn is_decision(&self) -> bool {
        false
    }
}

/// Side-effect function invoked while taking a transition. Receives the owning
/// context and the dispatch parameters.
pub type Action<C, P> = fn(&mut C, &P);

/// Boolean evaluation function of a choice point.
pub type Guard<C> = fn(&C) -> bool;

/// One row of the transition table: `(state, event) -> (action, next)`.
///
/// At most one transition may exist per `(state, event)` key; duplicates are
/// rejected at construction and the first registration wins.
pub struct Transition<S, E, C, P> {
    pub state: S,
    pub event: E,
    pub action: Option<Action<C, P>>,
    pub next: S,
}

/// Successor branch of a choice point. The optional action runs before the
/// machine settles in `next`, mirroring a full transition taken on the
/// synthetic yes/no outcome.
pub struct Branch<S, C, P> {
    pub action: Option<Action<C, P>>,
    pub next: S,
}

/// Immediate boolean re-dispatch attached to a decision state.
pub struct ChoicePoint<S, C, P> {
    pub state: S,
    pub eval: Guard<C>,
    pub on_true: Branch<S, C, P>,
    pub on_false: Branch<S, C, P>,
}

/// Engine-layer protocol violations. These are logged at the dispatch boundary
/// and never propagate as panics; the machine stays in its prior state.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("machine '{0}' constructed with an empty transition table")]
    EmptyTable(&'static str),
    #[error("machine '{machine}' received unexpected event '{event}' in state '{state}'")]
    UnexpectedEvent {
        machine: &'static str,
        state: String,
        event: String,
    },
    #[error("machine '{machine}' has no action for event '{event}' in state '{state}'")]
    MissingAction {
        machine: &'static str,
        state: String,
        event: String,
    },
    #[error("machine '{machine}' entered unknown choice point '{state}'")]
    UnknownChoicePoint {
        machine: &'static str,
        state: String,
    },
}

struct Entry<S, C, P> {
    action: Option<Action<C, P>>,
    next: S,
}

/// Table-driven state machine over states `S`, events `E`, an owning context
/// `C` and dispatch parameters `P`.
pub struct StateMachine<S, E, C, P> {
    name: &'static str,
    table: HashMap<(S, E), Entry<S, C, P>>,
    choices: HashMap<S, ChoicePoint<S, C, P>>,
    state: S,
}

impl<S, E, C, P> StateMachine<S, E, C, P>
where
    S: MachineState,
    E: Copy + Eq + Hash + Debug,
{
    /// Build a machine from an ordered transition table and its choice points.
    ///
    /// The initial state is the `state` of the first listed transition.
    pub fn new(
        name: &'static str,
        transitions: Vec<Transition<S, E, C, P>>,
        choice_points: Vec<ChoicePoint<S, C, P>>,
    ) -> Result<Self, ProtocolError> {
        let initial = transitions
            .first()
            .map(|t| t.state)
            .ok_or(ProtocolError::EmptyTable(name))?;

        let mut table: HashMap<(S, E), Entry<S, C, P>> = HashMap::new();
        for t in transitions {
            let key = (t.state, t.event);
            if table.contains_key(&key) {
                warn!(
                    machine = name,
                    state = ?t.state,
                    event = ?t.event,
                    "transition already defined, keeping first registration"
                );
                continue;
            }
            table.insert(
                key,
                Entry {
                    action: t.action,
                    next: t.next,
                },
            );
        }

        let mut choices: HashMap<S, ChoicePoint<S, C, P>> = HashMap::new();
        for cp in choice_points {
            if choices.contains_key(&cp.state) {
                warn!(
                    machine = name,
                    state = ?cp.state,
                    "choice point already defined, keeping first registration"
                );
                continue;
            }
            choices.insert(cp.state, cp);
        }

        Ok(Self {
            name,
            table,
            choices,
            state: initial,
        })
    }

    /// Current state of the machine.
    pub fn state(&self) -> S {
        self.state
    }

    /// Dispatch one event against the current state.
    ///
    /// Unknown `(state, event)` pairs and rows without an action are reported
    /// and ignored: no side effect runs and the state does not change. After a
    /// successful transition, decision states resolve synchronously until the
    /// machine rests in a non-decision state.
    pub fn dispatch(&mut self, ctx: &mut C, event: E, params: &P) {
        let (action, next) = match self.table.get(&(self.state, event)) {
            Some(entry) => (entry.action, entry.next),
            None => {
                warn!(
                    "{}",
                    ProtocolError::UnexpectedEvent {
                        machine: self.name,
                        state: format!("{:?}", self.state),
                        event: format!("{event:?}"),
                    }
                );
                return;
            }
        };

        let Some(action) = action else {
            warn!(
                "{}",
                ProtocolError::MissingAction {
                    machine: self.name,
                    state: format!("{:?}", self.state),
                    event: format!("{event:?}"),
                }
            );
            return;
        };

        action(ctx, params);

        let previous = self.state;
        self.state = next;
        self.resolve_choices(ctx, params, previous);
    }

    /// Walk decision states until the machine rests.
    ///
    /// An unregistered decision state restores the state held before it was
    /// entered. The side effect that led there has already run and is not
    /// undone.
    fn resolve_choices(&mut self, ctx: &mut C, params: &P, mut previous: S) {
        let mut depth = 0;
        while self.state.is_decision() {
            if depth == MAX_CHOICE_DEPTH {
                warn!(
                    machine = self.name,
                    state = ?self.state,
                    "choice resolution exceeded depth limit, stopping"
                );
                return;
            }

            let (branch_action, branch_next) = match self.choices.get(&self.state) {
                Some(cp) => {
                    let branch = if (cp.eval)(ctx) { &cp.on_true } else { &cp.on_false };
                    (branch.action, branch.next)
                }
                None => {
                    warn!(
                        "{}",
                        ProtocolError::UnknownChoicePoint {
                            machine: self.name,
                            state: format!("{:?}", self.state),
                        }
                    );
                    self.state = previous;
                    return;
                }
            };

            previous = self.state;
            if let Some(action) = branch_action {
                action(ctx, params);
            }
            self.state = branch_next;
            depth += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestState {
        Idle,
        Left,
        Right,
        Decide,
        Loop,
    }

    impl MachineState for TestState {
        fn is_decision(&self) -> bool {
            matches!(self, TestState::Decide | TestState::Loop)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestEvent {
        Go,
        Poke,
    }

    #[derive(Default)]
    struct Ctx {
        hits: Vec<&'static str>,
        flag: bool,
    }

    fn record_go(ctx: &mut Ctx, _: &()) {
        ctx.hits.push("go");
    }

    fn record_left(ctx: &mut Ctx, _: &()) {
        ctx.hits.push("left");
    }

    fn flag_set(ctx: &Ctx) -> bool {
        ctx.flag
    }

    fn always(_: &Ctx) -> bool {
        true
    }

    fn machine_with_choice() -> StateMachine<TestState, TestEvent, Ctx, ()> {
        StateMachine::new(
            "test",
            vec![Transition {
                state: TestState::Idle,
                event: TestEvent::Go,
                action: Some(record_go),
                next: TestState::Decide,
            }],
            vec![ChoicePoint {
                state: TestState::Decide,
                eval: flag_set,
                on_true: Branch {
                    action: Some(record_left),
                    next: TestState::Left,
                },
                on_false: Branch {
                    action: None,
                    next: TestState::Right,
                },
            }],
        )
        .unwrap()
    }

    #[test]
    fn empty_table_is_rejected() {
        let result: Result<StateMachine<TestState, TestEvent, Ctx, ()>, _> =
            StateMachine::new("empty", vec![], vec![]);
        assert!(matches!(result, Err(ProtocolError::EmptyTable("empty"))));
    }

    #[test]
    fn unexpected_event_is_a_no_op() {
        let mut machine = machine_with_choice();
        let mut ctx = Ctx::default();
        machine.dispatch(&mut ctx, TestEvent::Poke, &());
        assert_eq!(machine.state(), TestState::Idle);
        assert!(ctx.hits.is_empty());
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let mut machine = StateMachine::new(
            "dup",
            vec![
                Transition {
                    state: TestState::Idle,
                    event: TestEvent::Go,
                    action: Some(record_go),
                    next: TestState::Left,
                },
                Transition {
                    state: TestState::Idle,
                    event: TestEvent::Go,
                    action: Some(record_left),
                    next: TestState::Right,
                },
            ],
            vec![],
        )
        .unwrap();
        let mut ctx = Ctx::default();
        machine.dispatch(&mut ctx, TestEvent::Go, &());
        assert_eq!(machine.state(), TestState::Left);
        assert_eq!(ctx.hits, vec!["go"]);
    }

    #[test]
    fn missing_action_leaves_state_unchanged() {
        let mut machine: StateMachine<TestState, TestEvent, Ctx, ()> = StateMachine::new(
            "noact",
            vec![Transition {
                state: TestState::Idle,
                event: TestEvent::Go,
                action: None,
                next: TestState::Left,
            }],
            vec![],
        )
        .unwrap();
        let mut ctx = Ctx::default();
        machine.dispatch(&mut ctx, TestEvent::Go, &());
        assert_eq!(machine.state(), TestState::Idle);
        assert!(ctx.hits.is_empty());
    }

    #[test]
    fn choice_point_routes_on_true() {
        let mut machine = machine_with_choice();
        let mut ctx = Ctx {
            flag: true,
            ..Default::default()
        };
        machine.dispatch(&mut ctx, TestEvent::Go, &());
        assert_eq!(machine.state(), TestState::Left);
        assert_eq!(ctx.hits, vec!["go", "left"]);
    }

    #[test]
    fn choice_point_routes_on_false() {
        let mut machine = machine_with_choice();
        let mut ctx = Ctx::default();
        machine.dispatch(&mut ctx, TestEvent::Go, &());
        assert_eq!(machine.state(), TestState::Right);
        assert_eq!(ctx.hits, vec!["go"]);
    }

    #[test]
    fn unknown_choice_point_rolls_back_state() {
        let mut machine: StateMachine<TestState, TestEvent, Ctx, ()> = StateMachine::new(
            "orphan",
            vec![Transition {
                state: TestState::Idle,
                event: TestEvent::Go,
                action: Some(record_go),
                next: TestState::Decide,
            }],
            vec![],
        )
        .unwrap();
        let mut ctx = Ctx::default();
        machine.dispatch(&mut ctx, TestEvent::Go, &());
        // The action ran, but the machine is back where it started.
        assert_eq!(machine.state(), TestState::Idle);
        assert_eq!(ctx.hits, vec!["go"]);
    }

    #[test]
    fn choice_cycle_is_depth_limited() {
        let mut machine: StateMachine<TestState, TestEvent, Ctx, ()> = StateMachine::new(
            "cycle",
            vec![Transition {
                state: TestState::Idle,
                event: TestEvent::Go,
                action: Some(record_go),
                next: TestState::Loop,
            }],
            vec![ChoicePoint {
                state: TestState::Loop,
                eval: always,
                on_true: Branch {
                    action: None,
                    next: TestState::Loop,
                },
                on_false: Branch {
                    action: None,
                    next: TestState::Idle,
                },
            }],
        )
        .unwrap();
        let mut ctx = Ctx::default();
        machine.dispatch(&mut ctx, TestEvent::Go, &());
        // Terminates despite the self-referential choice point.
        assert_eq!(machine.state(), TestState::Loop);
    }
}
