use std::sync::Once;

use anyhow::{Context as _, Result};
use chrono::{NaiveDate, NaiveDateTime};
use spindle::{ContextConfig, ExecutionContext, HostValue};
use tracing_subscriber::EnvFilter;

/// Opt-in logs: `RUST_LOG=spindle=debug cargo test`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn mapping<const N: usize>(entries: [(&str, HostValue); N]) -> HostValue {
    entries.into_iter().collect()
}

pub fn datetime(date: (i32, u32, u32), time: (u32, u32, u32)) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(date.0, date.1, date.2)
        .and_then(|d| d.and_hms_opt(time.0, time.1, time.2))
        .context("invalid test datetime")
}

/// Marshal `value` into a fresh context and straight back out.
pub fn roundtrip(value: &HostValue) -> Result<HostValue> {
    init_tracing();
    let mut context = ExecutionContext::create(&ContextConfig::default())?;
    let back = context.enter(|scope| {
        let script_value = scope.to_script(value)?;
        scope.to_host(&script_value)
    })?;
    context.destroy();
    Ok(back)
}

/// Bind `params` and evaluate `script` without a watchdog.
pub fn eval_with(script: &str, params: &HostValue) -> Result<HostValue> {
    init_tracing();
    Ok(spindle::execute(script, Some(params), 0)?)
}

pub fn eval(script: &str) -> Result<HostValue> {
    init_tracing();
    Ok(spindle::execute(script, None, 10)?)
}
