//! Run a JavaScript snippet in a throwaway QuickJS context and get its value
//! back as a [`HostValue`].
//!
//! Each call:
//! 1. creates an isolated [`ExecutionContext`],
//! 2. binds the params mapping into its global scope,
//! 3. arms a [`Watchdog`] when a timeout is set,
//! 4. evaluates the script on the calling thread,
//! 5. converts the result and tears everything down.
//!
//! ```no_run
//! use spindle::{HostValue, execute};
//!
//! let params: HostValue = [("x", 5_i64)].into_iter().collect();
//! let value = execute("params.x + 1", Some(&params), 10)?;
//! assert_eq!(value, HostValue::Int(6));
//! # Ok::<(), spindle::Error>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod execute;
pub mod marshal;
pub mod value;
pub mod watchdog;

pub const TRACE_TARGET_SCRIPT: &str = "spindle::script";

pub use config::{ContextConfig, GlobalsConfig};
pub use context::{ExecutionContext, SOURCE_NAME, Scope, State};
pub use error::{Error, Result, ScriptError};
pub use execute::{ExecuteOptions, execute};
pub use marshal::{Marshaler, ScriptValue};
pub use value::HostValue;
pub use watchdog::{InterruptHandle, Watchdog};
