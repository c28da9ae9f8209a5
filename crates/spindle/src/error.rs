use std::{fmt, time::Duration};

use rquickjs::{Ctx, convert::Coerced};
use thiserror::Error;

use crate::context::SOURCE_NAME;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// `params` was supplied but is not a mapping. Raised before any engine
    /// resource is allocated.
    #[error("params must be a mapping, got {found}")]
    ParameterType { found: &'static str },

    /// Runtime, context or watchdog allocation failed.
    #[error("engine initialization failed: {0:#}")]
    EngineInit(#[source] anyhow::Error),

    /// The script failed to compile or threw during evaluation.
    #[error("{0}")]
    Script(ScriptError),

    /// The watchdog fired before evaluation completed.
    #[error("script timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// An engine operation failed while reading the result back.
    #[error("conversion failed: {0}")]
    Conversion(ScriptError),

    /// A container nested deeper than the configured limit, which includes
    /// cyclic structures.
    #[error("value nesting exceeds {limit} levels, possible circular reference")]
    DepthLimit { limit: usize },
}

/// Diagnostic captured from the engine when a script operation fails.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptError {
    pub message: String,
    pub source_name: Option<String>,
    /// 1-based line number, matching the engine's numbering.
    pub line: Option<u32>,
    pub stack: Option<String>,
}

impl ScriptError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Build a diagnostic from a failed engine call, taking the pending
    /// exception (if any) off the context.
    pub(crate) fn capture(ctx: &Ctx<'_>, err: rquickjs::Error) -> Self {
        if !matches!(err, rquickjs::Error::Exception) {
            return Self::new(err.to_string());
        }

        let caught = ctx.catch();
        let Some(exc) = caught.as_exception() else {
            // `throw "text"` and other non-Error values.
            let message = caught
                .get::<Coerced<String>>()
                .map_or_else(|_| format!("{caught:?}"), |text| text.0);
            return Self::new(message);
        };

        let message = exc.message().unwrap_or_default();
        let message = match exc.as_object().get::<_, Option<String>>("name") {
            Ok(Some(name)) if !name.is_empty() => format!("{name}: {message}"),
            _ => message,
        };
        let stack = exc.stack().map(|stack| rename_source(&stack));
        let line = exc
            .as_object()
            .get::<_, Option<i32>>("lineNumber")
            .ok()
            .flatten()
            .and_then(|line| u32::try_from(line).ok())
            .or_else(|| stack.as_deref().and_then(first_frame_line));

        Self {
            message,
            source_name: line.map(|_| SOURCE_NAME.to_string()),
            line,
            stack,
        }
    }
}

/// File name the engine gives evaluated source.
const ENGINE_SOURCE_NAME: &str = "eval_script";

/// Report stack frames under [`SOURCE_NAME`] instead of the engine's name.
fn rename_source(stack: &str) -> String {
    stack.replace(ENGINE_SOURCE_NAME, SOURCE_NAME)
}

/// Line of the innermost stack frame that carries a location, e.g.
/// `at <eval> (file:3)`, `at f (file:3:14)` or `at file:3`.
fn first_frame_line(stack: &str) -> Option<u32> {
    stack.lines().find_map(|frame| {
        let frame = frame.trim().strip_prefix("at ")?;
        let location = match frame.strip_suffix(')') {
            Some(call) => call.rsplit_once('(')?.1,
            None => frame,
        };
        let (rest, last) = location.rsplit_once(':')?;
        let last = last.parse::<u32>().ok()?;
        match rest.rsplit_once(':').map(|(_, line)| line.parse::<u32>()) {
            Some(Ok(line)) => Some(line),
            _ => Some(last),
        }
    })
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source_name, self.line) {
            (Some(source), Some(line)) => write!(f, "{source}:{line}:{}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl Error {
    /// Location-aware diagnostic for script and conversion failures.
    #[must_use]
    pub const fn script_error(&self) -> Option<&ScriptError> {
        match self {
            Self::Script(err) | Self::Conversion(err) => Some(err),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
