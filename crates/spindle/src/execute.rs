use std::time::Duration;

use tracing::{debug, info_span};

use crate::{
    TRACE_TARGET_SCRIPT,
    config::ContextConfig,
    context::ExecutionContext,
    error::{Error, Result},
    value::HostValue,
    watchdog::Watchdog,
};

/// Options for a single [`execute`](ExecuteOptions::execute) call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Wall-clock bound on evaluation. `None` (or zero) runs unbounded.
    pub timeout: Option<Duration>,
    pub context: ContextConfig,
}

impl ExecuteOptions {
    pub const DEFAULT_TIMEOUT_SECONDS: i64 = 10;

    /// Set the timeout in whole seconds. Values `<= 0` disable the watchdog.
    #[must_use]
    pub fn timeout_seconds(mut self, seconds: i64) -> Self {
        self.timeout = u64::try_from(seconds)
            .ok()
            .filter(|s| *s > 0)
            .map(Duration::from_secs);
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn context(mut self, config: ContextConfig) -> Self {
        self.context = config;
        self
    }

    /// The deadline a watchdog is armed with, if any.
    #[must_use]
    pub fn watchdog_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|t| !t.is_zero())
    }

    /// Evaluate `script` in a fresh context and return its final value.
    ///
    /// `params` must be a [`HostValue::Mapping`]; its entries become globals.
    /// The context (and the watchdog, if armed) is torn down before this
    /// returns, on every path.
    ///
    /// # Errors
    /// See [`Error`] for the failure kinds.
    pub fn execute(&self, script: &str, params: Option<&HostValue>) -> Result<HostValue> {
        let span = info_span!(
            target: TRACE_TARGET_SCRIPT,
            "script.execute",
            timeout = ?self.watchdog_timeout(),
            has_params = params.is_some(),
        );
        let _enter = span.enter();

        if let Some(params) = params
            && !matches!(params, HostValue::Mapping(_))
        {
            return Err(Error::ParameterType {
                found: params.kind(),
            });
        }

        let mut context = ExecutionContext::create(&self.context)?;
        let hook = context.interrupt_handle();
        let timeout = self.watchdog_timeout();

        let result = context.enter(|scope| {
            if let Some(params) = params {
                scope.bind(params)?;
            }

            let watchdog = timeout
                .map(|timeout| Watchdog::start(hook, timeout))
                .transpose()?;
            let evaluated = scope.evaluate(script);
            let fired = watchdog.and_then(|watchdog| {
                let timeout = watchdog.timeout();
                watchdog.stop().then_some(timeout)
            });

            let value = match (evaluated, fired) {
                (Ok(value), _) => value,
                (Err(pending), Some(timeout)) => return Err(scope.cancel(&pending, timeout)),
                (Err(err), None) => return Err(err),
            };
            scope.disarm();
            scope.to_host(&value)
        });
        context.destroy();

        if let Err(err) = &result {
            debug!(target: TRACE_TARGET_SCRIPT, error = %err, "script execution failed");
        }
        result
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            context: ContextConfig::default(),
        }
        .timeout_seconds(Self::DEFAULT_TIMEOUT_SECONDS)
    }
}

/// Evaluate `script` with optional `params` and a timeout in seconds
/// (`<= 0` disables it). Uses [`ContextConfig::default`].
///
/// # Errors
/// See [`Error`] for the failure kinds.
pub fn execute(script: &str, params: Option<&HostValue>, timeout_seconds: i64) -> Result<HostValue> {
    ExecuteOptions::default()
        .timeout_seconds(timeout_seconds)
        .execute(script, params)
}
