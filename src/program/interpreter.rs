//! Walks a call graph to either ground or execute it.
//!
//! Both modes share one traversal. Resolving collects every primitive
//! invocation with its parameters bound to concrete values. Executing
//! additionally hands each grounded call to a [`PrimitiveHandler`] as it is
//! reached and applies each finished action's postconditions.
//!
//! Every loop construct runs under [`Limits`] and an optional [`CancelToken`],
//! so a condition that never settles fails instead of spinning forever.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::action::{bind_arguments, Call, Executable, Flow, Primitive, Subaction};
use super::context::{Context, Scope};
use super::expr::{Expr, Term};
use super::knowledge::KnowledgeBase;
use super::value::{EntityId, Value};
use crate::config::EngineConfig;
use crate::error::{ChoreoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Iterations allowed per loop construct.
    pub max_loop_iterations: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for Limits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_loop_iterations: config.max_loop_iterations,
        }
    }
}

/// A shared flag that stops a running program at its next call or loop
/// iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A primitive invocation with every parameter bound to a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundedCall {
    pub id: EntityId,
    pub name: String,
    pub parameters: BTreeMap<String, Value>,
}

/// Receives grounded primitive calls during execution.
pub trait PrimitiveHandler {
    fn handle(&mut self, call: &GroundedCall, ctx: &mut Context) -> Result<()>;
}

impl<F> PrimitiveHandler for F
where
    F: FnMut(&GroundedCall, &mut Context) -> Result<()>,
{
    fn handle(&mut self, call: &GroundedCall, ctx: &mut Context) -> Result<()> {
        self(call, ctx)
    }
}

struct Run<'h> {
    grounded: Vec<GroundedCall>,
    handler: Option<&'h mut dyn PrimitiveHandler>,
}

impl Run<'_> {
    fn executing(&self) -> bool {
        self.handler.is_some()
    }
}

pub struct Interpreter<'kb> {
    kb: &'kb KnowledgeBase,
    limits: Limits,
    cancel: Option<CancelToken>,
}

impl<'kb> Interpreter<'kb> {
    pub fn new(kb: &'kb KnowledgeBase) -> Self {
        Self {
            kb,
            limits: Limits::default(),
            cancel: None,
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Ground the call graph under `id` without side effects beyond the
    /// program's own assignments and effect statements.
    pub fn resolve(
        &self,
        id: &EntityId,
        arguments: &BTreeMap<String, Expr>,
        ctx: &mut Context,
    ) -> Result<Vec<GroundedCall>> {
        let mut run = Run {
            grounded: Vec::new(),
            handler: None,
        };
        self.call(&root_call(id, arguments), ctx, &mut run)?;
        Ok(run.grounded)
    }

    /// Run the call graph under `id`, dispatching primitives to `handler`.
    /// Returns the calls dispatched, in order.
    pub fn execute(
        &self,
        id: &EntityId,
        arguments: &BTreeMap<String, Expr>,
        ctx: &mut Context,
        handler: &mut dyn PrimitiveHandler,
    ) -> Result<Vec<GroundedCall>> {
        let mut run = Run {
            grounded: Vec::new(),
            handler: Some(handler),
        };
        self.call(&root_call(id, arguments), ctx, &mut run)?;
        Ok(run.grounded)
    }

    fn checkpoint(&self) -> Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(ChoreoError::Cancelled),
            _ => Ok(()),
        }
    }

    fn tick(&self, iterations: &mut u64) -> Result<()> {
        *iterations += 1;
        if *iterations > self.limits.max_loop_iterations {
            return Err(ChoreoError::LoopLimit {
                limit: self.limits.max_loop_iterations,
            });
        }
        self.checkpoint()
    }

    fn call(&self, call: &Call, ctx: &mut Context, run: &mut Run<'_>) -> Result<()> {
        self.checkpoint()?;
        let executable = self
            .kb
            .get_by_id(&call.id)
            .ok_or_else(|| ChoreoError::not_found("executable", call.id.as_str()))?;
        let scope = bind_arguments(
            executable.name(),
            executable.parameters(),
            &call.parameters,
            ctx,
        )?;
        let mut guard = ctx.scoped(scope);

        match executable {
            Executable::Primitive(primitive) => {
                let grounded = ground(primitive, &guard)?;
                debug!(primitive = %grounded.name, "grounded call");
                if let Some(handler) = run.handler.as_deref_mut() {
                    handler.handle(&grounded, &mut guard)?;
                }
                run.grounded.push(grounded);
            }
            Executable::Action(action) => {
                trace!(action = %action.name, depth = guard.depth(), "entering action");
                self.block(&action.subactions, &mut guard, run)?;
                if run.executing() {
                    for condition in action.all_postconditions() {
                        condition.execute(&mut guard)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn block(&self, subactions: &[Subaction], ctx: &mut Context, run: &mut Run<'_>) -> Result<()> {
        for subaction in subactions {
            match subaction {
                Subaction::Call(call) => self.call(call, ctx, run)?,
                Subaction::Flow(flow) => self.flow(flow, ctx, run)?,
                Subaction::Assign(assign) => assign.evaluate(ctx)?,
                Subaction::Effect(condition) => condition.execute(ctx)?,
            }
        }
        Ok(())
    }

    fn flow(&self, flow: &Flow, ctx: &mut Context, run: &mut Run<'_>) -> Result<()> {
        let mut iterations = 0u64;
        match flow {
            Flow::Branch {
                condition,
                if_pass,
                if_fail,
            } => {
                if condition.check(ctx)? {
                    self.block(if_pass, ctx, run)
                } else {
                    self.block(if_fail, ctx, run)
                }
            }
            Flow::While {
                condition,
                subactions,
            } => {
                while condition.check(ctx)? {
                    self.tick(&mut iterations)?;
                    self.block(subactions, ctx, run)?;
                }
                Ok(())
            }
            Flow::ForThingObserved {
                term,
                operation,
                subactions,
            } => {
                // Re-observed every pass so the body's own changes are seen.
                while let Some(first) = candidates(operation.evaluate(ctx)?).into_iter().next() {
                    self.tick(&mut iterations)?;
                    let mut guard = ctx.scoped(Scope::new());
                    guard.bind(term, first);
                    self.block(subactions, &mut guard, run)?;
                }
                Ok(())
            }
            Flow::ExecuteOnConditionUntil {
                on,
                until,
                subactions,
            } => {
                while !until.check(ctx)? {
                    self.tick(&mut iterations)?;
                    if on.check(ctx)? {
                        self.block(subactions, ctx, run)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn root_call(id: &EntityId, arguments: &BTreeMap<String, Expr>) -> Call {
    Call {
        id: id.clone(),
        parameters: arguments.clone(),
    }
}

fn ground(primitive: &Primitive, ctx: &Context) -> Result<GroundedCall> {
    let mut parameters = BTreeMap::new();
    for name in &primitive.parameters {
        let value = ctx.get(&Term::new(name.as_str()))?.unwrap_or_default();
        parameters.insert(name.clone(), value);
    }
    Ok(GroundedCall {
        id: primitive.id.clone(),
        name: primitive.name.clone(),
        parameters,
    })
}

fn candidates(observed: Value) -> Vec<Value> {
    match observed {
        Value::List(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{
        Action, Assign, Condition, ConditionOperator, Description, Operation, Property, Thing,
    };

    fn args(pairs: &[(&str, Expr)]) -> BTreeMap<String, Expr> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// `Grasp(agent, object)` calling `move_ee` then `grasp`.
    fn grasp_kb() -> (KnowledgeBase, EntityId) {
        let mut kb = KnowledgeBase::new();
        let move_ee = kb.create_primitive("move_ee", &["agent", "pose", "priority"]);
        let grasp = kb.create_primitive("grasp", &["agent", "object"]);
        let action = Action::new("Grasp", &["agent", "object"])
            .then(
                Call::new(move_ee)
                    .arg("agent", Term::new("agent"))
                    .arg("pose", Term::new("object").access("pose"))
                    .arg("priority", 1.0),
            )
            .then(
                Call::new(grasp)
                    .arg("agent", Term::new("agent"))
                    .arg("object", Term::new("object")),
            );
        let id = kb.add(action);
        (kb, id)
    }

    fn grasp_context() -> (Context, Thing, Thing) {
        let mut ctx = Context::default();
        let panda = Thing::with_id("panda", "panda", vec![]);
        let ball = Thing::with_id(
            "ball",
            "ball",
            vec![Property::new("pose", crate::geometry::Pose::default())],
        );
        ctx.add_to_state(panda.clone(), Some(&Term::new("PandaRef")));
        ctx.add_to_state(ball.clone(), Some(&Term::new("BallRef")));
        (ctx, panda, ball)
    }

    #[test]
    fn test_resolve_grasp_scenario() {
        let (kb, grasp) = grasp_kb();
        let (mut ctx, panda, ball) = grasp_context();
        let calls = Interpreter::new(&kb)
            .resolve(
                &grasp,
                &args(&[
                    ("agent", Expr::term("PandaRef")),
                    ("object", Expr::term("BallRef")),
                ]),
                &mut ctx,
            )
            .unwrap();

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "move_ee");
        assert_eq!(calls[0].parameters["agent"], Value::Thing(panda.clone()));
        assert_eq!(
            calls[0].parameters["pose"],
            Value::Pose(crate::geometry::Pose::default())
        );
        assert_eq!(calls[0].parameters["priority"], Value::Number(1.0));
        assert_eq!(calls[1].name, "grasp");
        assert_eq!(calls[1].parameters["agent"], Value::Thing(panda));
        assert_eq!(calls[1].parameters["object"], Value::Thing(ball));
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_execute_dispatches_and_applies_postconditions() {
        let (mut kb, grasp) = grasp_kb();
        let action = kb.action_mut(&grasp).unwrap();
        action
            .postconditions
            .push(Condition::has_property(Term::new("object"), Property::new("held", true)));

        let (mut ctx, _, ball) = grasp_context();
        let mut seen = Vec::new();
        let mut handler = |call: &GroundedCall, _: &mut Context| -> Result<()> {
            seen.push(call.name.clone());
            Ok(())
        };
        Interpreter::new(&kb)
            .execute(
                &grasp,
                &args(&[
                    ("agent", Expr::term("PandaRef")),
                    ("object", Expr::term("BallRef")),
                ]),
                &mut ctx,
                &mut handler,
            )
            .unwrap();

        assert_eq!(seen, vec!["move_ee", "grasp"]);
        assert_eq!(
            ctx.entity(&ball.id).unwrap().property("held"),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_resolve_skips_postconditions() {
        let (mut kb, grasp) = grasp_kb();
        kb.action_mut(&grasp)
            .unwrap()
            .postconditions
            .push(Condition::has_property(Term::new("object"), Property::new("held", true)));
        let (mut ctx, _, ball) = grasp_context();
        Interpreter::new(&kb)
            .resolve(
                &grasp,
                &args(&[
                    ("agent", Expr::term("PandaRef")),
                    ("object", Expr::term("BallRef")),
                ]),
                &mut ctx,
            )
            .unwrap();
        assert!(ctx.entity(&ball.id).unwrap().property("held").is_none());
    }

    #[test]
    fn test_unknown_callee() {
        let kb = KnowledgeBase::new();
        let err = Interpreter::new(&kb)
            .resolve(&EntityId::from("nope"), &BTreeMap::new(), &mut Context::default())
            .unwrap_err();
        assert!(matches!(err, ChoreoError::NotFound { what: "executable", .. }));
    }

    #[test]
    fn test_parameter_mismatch_leaves_no_scope() {
        let (kb, grasp) = grasp_kb();
        let (mut ctx, _, _) = grasp_context();
        let err = Interpreter::new(&kb)
            .resolve(&grasp, &args(&[("agent", Expr::term("PandaRef"))]), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, ChoreoError::ParameterMismatch { .. }));
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_failure_inside_body_pops_scopes() {
        let mut kb = KnowledgeBase::new();
        let inner = kb.add(
            Action::new("divide", &["n"])
                .then(Assign::new(Term::new("out"), Operation::divide(Term::new("n"), 0.0))),
        );
        let outer = kb.add(Action::new("outer", &[]).then(Call::new(inner).arg("n", 4.0)));
        let mut ctx = Context::default();
        let err = Interpreter::new(&kb)
            .resolve(&outer, &BTreeMap::new(), &mut ctx)
            .unwrap_err();
        assert!(matches!(err, ChoreoError::Evaluation { .. }));
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_while_counts_down() {
        let mut kb = KnowledgeBase::new();
        let tick = kb.create_primitive("tick", &["n"]);
        let looping = kb.add(Action::new("countdown", &["n"]).then(Flow::While {
            condition: Condition::new(Term::new("n"), ConditionOperator::Greater, 0.0),
            subactions: vec![
                Call::new(tick).arg("n", Term::new("n")).into(),
                Assign::new(Term::new("n"), Operation::subtract(Term::new("n"), 1.0)).into(),
            ],
        }));
        let calls = Interpreter::new(&kb)
            .resolve(&looping, &args(&[("n", Expr::literal(3.0))]), &mut Context::default())
            .unwrap();
        let counted: Vec<Value> = calls.iter().map(|c| c.parameters["n"].clone()).collect();
        assert_eq!(
            counted,
            vec![Value::Number(3.0), Value::Number(2.0), Value::Number(1.0)]
        );
    }

    #[test]
    fn test_loop_limit() {
        let mut kb = KnowledgeBase::new();
        let spin = kb.add(Action::new("spin", &[]).then(Flow::While {
            condition: Condition::new(1.0, ConditionOperator::Equals, 1.0),
            subactions: vec![],
        }));
        let err = Interpreter::new(&kb)
            .with_limits(Limits {
                max_loop_iterations: 25,
            })
            .resolve(&spin, &BTreeMap::new(), &mut Context::default())
            .unwrap_err();
        assert!(matches!(err, ChoreoError::LoopLimit { limit: 25 }));
    }

    #[test]
    fn test_cancellation() {
        let mut kb = KnowledgeBase::new();
        let noop = kb.create_primitive("noop", &[]);
        let spin = kb.add(Action::new("spin", &[]).then(Flow::While {
            condition: Condition::new(1.0, ConditionOperator::Equals, 1.0),
            subactions: vec![Call::new(noop).into()],
        }));

        let token = CancelToken::new();
        let mut dispatched = 0;
        let stopper = token.clone();
        let mut handler = |_: &GroundedCall, _: &mut Context| -> Result<()> {
            dispatched += 1;
            if dispatched == 3 {
                stopper.cancel();
            }
            Ok(())
        };
        let mut ctx = Context::default();
        let err = Interpreter::new(&kb)
            .with_cancel(token)
            .execute(&spin, &BTreeMap::new(), &mut ctx, &mut handler)
            .unwrap_err();
        assert!(matches!(err, ChoreoError::Cancelled));
        assert_eq!(dispatched, 3);
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_for_thing_observed_reobserves() {
        let mut kb = KnowledgeBase::new();
        let pick = kb.create_primitive("pick", &["item"]);
        let dirty = Description::new().with("dirty", ConditionOperator::Equals, true);
        let clean_all = kb.add(Action::new("clean_all", &[]).then(Flow::ForThingObserved {
            term: Term::new("item"),
            operation: Operation::observe(dirty),
            subactions: vec![
                Call::new(pick).arg("item", Term::new("item")).into(),
                Condition::has_property(Term::new("item"), Property::new("dirty", false)).into(),
            ],
        }));

        let mut ctx = Context::default();
        for name in ["a", "b", "c"] {
            ctx.add_to_state(
                Thing::with_id(name, name, vec![Property::new("dirty", true)]),
                None,
            );
        }
        ctx.add_to_state(
            Thing::with_id("d", "d", vec![Property::new("dirty", false)]),
            None,
        );

        let calls = Interpreter::new(&kb)
            .resolve(&clean_all, &BTreeMap::new(), &mut ctx)
            .unwrap();
        let picked: Vec<String> = calls
            .iter()
            .filter_map(|c| c.parameters["item"].as_thing().map(|t| t.id.to_string()))
            .collect();
        assert_eq!(picked, vec!["a", "b", "c"]);
        assert!(ctx
            .state()
            .iter()
            .all(|t| t.property("dirty") == Some(&Value::Bool(false))));
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_branch_picks_one_side() {
        let mut kb = KnowledgeBase::new();
        let yes = kb.create_primitive("yes", &[]);
        let no = kb.create_primitive("no", &[]);
        let decide = kb.add(Action::new("decide", &["x"]).then(Flow::Branch {
            condition: Condition::new(Term::new("x"), ConditionOperator::Less, 5.0),
            if_pass: vec![Call::new(yes).into()],
            if_fail: vec![Call::new(no).into()],
        }));
        let interpreter = Interpreter::new(&kb);
        let small = interpreter
            .resolve(&decide, &args(&[("x", Expr::literal(1.0))]), &mut Context::default())
            .unwrap();
        let large = interpreter
            .resolve(&decide, &args(&[("x", Expr::literal(9.0))]), &mut Context::default())
            .unwrap();
        assert_eq!(small.len(), 1);
        assert_eq!(small[0].name, "yes");
        assert_eq!(large[0].name, "no");
    }

    #[test]
    fn test_execute_on_condition_until() {
        let mut kb = KnowledgeBase::new();
        let act = kb.create_primitive("act", &["step"]);
        let guarded = kb.add(
            Action::new("guarded", &["ready"])
                .then(Assign::new(Term::new("step"), 0.0))
                .then(Flow::ExecuteOnConditionUntil {
                    on: Condition::new(Term::new("ready"), ConditionOperator::Equals, Expr::literal(true)),
                    until: Condition::new(Term::new("step"), ConditionOperator::GreaterOrEqual, 3.0),
                    subactions: vec![
                        Call::new(act).arg("step", Term::new("step")).into(),
                        Assign::new(Term::new("step"), Operation::add(Term::new("step"), 1.0))
                            .into(),
                    ],
                }),
        );
        let interpreter = Interpreter::new(&kb).with_limits(Limits {
            max_loop_iterations: 10,
        });

        let calls = interpreter
            .resolve(&guarded, &args(&[("ready", Expr::literal(true))]), &mut Context::default())
            .unwrap();
        let steps: Vec<Value> = calls.iter().map(|c| c.parameters["step"].clone()).collect();
        assert_eq!(
            steps,
            vec![Value::Number(0.0), Value::Number(1.0), Value::Number(2.0)]
        );

        // Nothing runs while `on` is false, so `until` never holds.
        let err = interpreter
            .resolve(&guarded, &args(&[("ready", Expr::literal(false))]), &mut Context::default())
            .unwrap_err();
        assert!(matches!(err, ChoreoError::LoopLimit { limit: 10 }));
    }
}
