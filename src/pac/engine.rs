// src/pac/engine.rs
use super::cache::ResolutionResult;
use super::natives;
use super::policy::SandboxPolicy;
use crate::error::{PacError, PacResult};
use boa_engine::{vm::RuntimeLimits, Context, JsError, JsString, JsValue, Source};

/// A named piece of script text.
#[derive(Debug, Clone, Copy)]
pub struct ScriptSource<'a> {
    pub name: &'a str,
    pub text: &'a str,
}

impl<'a> ScriptSource<'a> {
    pub fn new(name: &'a str, text: &'a str) -> Self {
        Self { name, text }
    }
}

/// Runs a PAC script and calls its resolution function.
///
/// Implementations evaluate `helpers` then `pac` in one scope, look up
/// `entry_point` there and call it with `args`. A `null`/`undefined` return
/// is a valid "no proxy" answer and maps to `Ok(None)`.
pub trait PacEvaluator: Send + Sync {
    fn evaluate(
        &self,
        helpers: &ScriptSource<'_>,
        pac: &ScriptSource<'_>,
        entry_point: &str,
        args: &[&str],
    ) -> PacResult<ResolutionResult>;
}

/// [`PacEvaluator`] backed by boa, restricted by a [`SandboxPolicy`].
///
/// Every call gets a fresh interpreter context, so nothing a script defines
/// survives into the next evaluation. boa only interprets bytecode, there is
/// no code generation path to lock down.
#[derive(Debug, Clone, Default)]
pub struct SandboxedEvaluator {
    policy: SandboxPolicy,
}

impl SandboxedEvaluator {
    pub fn new(policy: SandboxPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SandboxPolicy {
        &self.policy
    }

    fn context(&self) -> PacResult<Context> {
        let mut context = Context::default();

        let limits = self.policy.evaluation_limits();
        let mut runtime = RuntimeLimits::default();
        runtime.set_loop_iteration_limit(limits.loop_iteration_limit);
        runtime.set_recursion_limit(limits.recursion_limit);
        runtime.set_stack_size_limit(limits.stack_size_limit);
        context.set_runtime_limits(runtime);

        natives::register(&mut context, &self.policy).map_err(|e| script_error("sandbox", e))?;
        Ok(context)
    }

    fn run(
        &self,
        helpers: &ScriptSource<'_>,
        pac: &ScriptSource<'_>,
        entry_point: &str,
        args: &[&str],
    ) -> PacResult<ResolutionResult> {
        let mut context = self.context()?;

        eval(&mut context, helpers)?;
        eval(&mut context, pac)?;

        let global = context.global_object();
        let value = global
            .get(JsString::from(entry_point), &mut context)
            .map_err(|e| script_error(pac.name, e))?;
        let Some(function) = value.as_callable() else {
            return Err(PacError::MissingEntryPoint {
                name: entry_point.to_string(),
            });
        };

        let args: Vec<JsValue> = args
            .iter()
            .map(|arg| JsValue::from(JsString::from(*arg)))
            .collect();
        let result = function
            .call(&JsValue::undefined(), &args, &mut context)
            .map_err(|e| script_error(pac.name, e))?;

        if result.is_null_or_undefined() {
            return Ok(None);
        }
        let text = result
            .to_string(&mut context)
            .map_err(|e| script_error(pac.name, e))?;
        Ok(Some(text.to_std_string_escaped()))
    }
}

impl PacEvaluator for SandboxedEvaluator {
    fn evaluate(
        &self,
        helpers: &ScriptSource<'_>,
        pac: &ScriptSource<'_>,
        entry_point: &str,
        args: &[&str],
    ) -> PacResult<ResolutionResult> {
        natives::reset_violation();
        let outcome = self.run(helpers, pac, entry_point, args);

        // A refused operation fails the evaluation even if the script caught it.
        match natives::take_violation() {
            Some(operation) => Err(PacError::SandboxViolation { operation }),
            None => outcome,
        }
    }
}

fn eval(context: &mut Context, script: &ScriptSource<'_>) -> PacResult<()> {
    context
        .eval(Source::from_bytes(script.text.as_bytes()))
        .map(|_| ())
        .map_err(|e| script_error(script.name, e))
}

fn script_error(script: &str, error: JsError) -> PacError {
    PacError::Script {
        script: script.to_string(),
        message: error.to_string(),
    }
}
