use rquickjs::{
    Context, Runtime, Value,
    context::{EvalOptions, intrinsic},
};
use tracing::debug;

use crate::{
    TRACE_TARGET_SCRIPT,
    config::{ContextConfig, GlobalsConfig},
    error::{Error, Result, ScriptError},
    marshal::{Marshaler, ScriptValue},
    value::HostValue,
    watchdog::InterruptHandle,
};

/// Name reported for the evaluated source in diagnostics.
pub const SOURCE_NAME: &str = "spindle";

/// Lifecycle of an [`ExecutionContext`]. Destruction is terminal and is
/// expressed by dropping the context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Initialized,
    Bound,
    Evaluating,
    Completed,
    Failed,
    Cancelled,
}

/// One isolated QuickJS runtime and its global scope, used for exactly one
/// call. Dropping the context releases the runtime.
pub struct ExecutionContext {
    // Declared before `runtime` so it is released first.
    context: Context,
    _runtime: Runtime,
    interrupt: InterruptHandle,
    config: ContextConfig,
    state: State,
}

impl ExecutionContext {
    /// Allocate a runtime with the configured budgets and a context with the
    /// configured intrinsics, and wire the cancellation hook.
    ///
    /// # Errors
    /// Returns [`Error::EngineInit`] if the runtime or context cannot be
    /// allocated.
    pub fn create(config: &ContextConfig) -> Result<Self> {
        let runtime = Runtime::new().map_err(|e| {
            Error::EngineInit(anyhow::anyhow!("unable to initialize JS runtime: {e}"))
        })?;
        runtime.set_memory_limit(config.memory_limit);
        runtime.set_max_stack_size(config.max_stack_size);

        let interrupt = InterruptHandle::new();
        let hook = interrupt.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || hook.is_interrupted())));

        let context = if config.globals.standard_library {
            Context::full(&runtime)
        } else {
            // Eval compiles both scripts and marshaling helpers; typed arrays
            // back `toDouble`.
            Context::custom::<(intrinsic::Eval, intrinsic::TypedArrays)>(&runtime)
        }
        .map_err(|e| Error::EngineInit(anyhow::anyhow!("unable to initialize JS context: {e}")))?;

        debug!(
            target: TRACE_TARGET_SCRIPT,
            memory_limit = config.memory_limit,
            max_stack_size = config.max_stack_size,
            standard_library = config.globals.standard_library,
            "execution context created"
        );

        Ok(Self {
            context,
            _runtime: runtime,
            interrupt,
            config: config.clone(),
            state: State::Initialized,
        })
    }

    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// The hook a [`Watchdog`](crate::watchdog::Watchdog) raises to stop
    /// evaluation at the next safepoint.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Run `f` with access to the global scope. Script values handed out by
    /// the [`Scope`] cannot escape the closure.
    ///
    /// # Errors
    /// Returns [`Error::EngineInit`] if the scope cannot be prepared, or
    /// whatever `f` returns.
    pub fn enter<R>(
        &mut self,
        f: impl for<'a, 'js> FnOnce(&mut Scope<'a, 'js>) -> Result<R>,
    ) -> Result<R> {
        let Self {
            context,
            interrupt,
            config,
            state,
            ..
        } = self;
        context.with(|ctx| {
            let marshaler = Marshaler::new(ctx, config.max_depth)?;
            let mut scope = Scope {
                marshaler,
                globals: &config.globals,
                interrupt,
                state,
            };
            f(&mut scope)
        })
    }

    /// Release the context and its runtime.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        debug!(target: TRACE_TARGET_SCRIPT, state = ?self.state, "execution context destroyed");
    }
}

/// Access to a live context's global scope.
pub struct Scope<'a, 'js> {
    marshaler: Marshaler<'js>,
    globals: &'a GlobalsConfig,
    interrupt: &'a InterruptHandle,
    state: &'a mut State,
}

impl<'js> Scope<'_, 'js> {
    #[must_use]
    pub const fn marshaler(&self) -> &Marshaler<'js> {
        &self.marshaler
    }

    #[must_use]
    pub fn state(&self) -> State {
        *self.state
    }

    /// Install each string-keyed entry of `params` as a global, and the whole
    /// mapping under the configured params name. The globals and the
    /// aggregate's properties are the same script values.
    ///
    /// # Errors
    /// Returns [`Error::ParameterType`] if `params` is not a mapping, or a
    /// marshaling error.
    pub fn bind(&mut self, params: &HostValue) -> Result<()> {
        if !matches!(params, HostValue::Mapping(_)) {
            return Err(Error::ParameterType {
                found: params.kind(),
            });
        }

        let ctx = self.marshaler.ctx();
        let globals = ctx.globals();
        match &self.globals.params_name {
            Some(name) => {
                let aggregate = self.marshaler.to_script(params)?.into_value();
                globals
                    .set(name.as_str(), aggregate.clone())
                    .map_err(|e| Error::Conversion(ScriptError::capture(ctx, e)))?;
                // Keys are installed after the aggregate so a key equal to
                // `name` shadows it.
                if let Some(source) = aggregate.as_object() {
                    self.marshaler.share(&globals, source, params)?;
                }
            }
            None => self.marshaler.install(&globals, params)?,
        }

        *self.state = State::Bound;
        Ok(())
    }

    /// Compile and run `source` against the global scope on the calling
    /// thread. The interpreter polls the interrupt hook while it runs.
    ///
    /// # Errors
    /// Returns [`Error::Script`] if compilation or evaluation fails.
    pub fn evaluate(&mut self, source: &str) -> Result<ScriptValue<'js>> {
        *self.state = State::Evaluating;

        let mut options = EvalOptions::default();
        options.strict = self.globals.strict;
        let ctx = self.marshaler.ctx();
        match ctx.eval_with_options::<Value<'js>, _>(source, options) {
            Ok(value) => {
                *self.state = State::Completed;
                Ok(ScriptValue::new(value))
            }
            Err(err) => {
                *self.state = State::Failed;
                Err(Error::Script(ScriptError::capture(ctx, err)))
            }
        }
    }

    /// Replace a pending failure with a timeout after the watchdog fired.
    pub fn cancel(&mut self, pending: &Error, timeout: std::time::Duration) -> Error {
        debug!(target: TRACE_TARGET_SCRIPT, %pending, "evaluation cancelled by watchdog");
        *self.state = State::Cancelled;
        Error::Timeout { timeout }
    }

    /// Clear an interrupt request that arrived after evaluation finished so it
    /// cannot abort result conversion.
    pub fn disarm(&self) {
        self.interrupt.disarm();
    }

    /// # Errors
    /// See [`Marshaler::to_host`].
    pub fn to_host(&self, value: &ScriptValue<'js>) -> Result<HostValue> {
        self.marshaler.to_host(value)
    }

    /// # Errors
    /// See [`Marshaler::to_script`].
    pub fn to_script(&self, value: &HostValue) -> Result<ScriptValue<'js>> {
        self.marshaler.to_script(value)
    }
}
