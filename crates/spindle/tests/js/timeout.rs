use std::time::{Duration, Instant};

use anyhow::Result;
use spindle::{Error as SpindleError, ExecuteOptions, HostValue};

use super::common::init_tracing;

#[test]
fn infinite_loop_times_out() {
    init_tracing();
    let started = Instant::now();
    let err = spindle::execute("while (true) {}", None, 1).expect_err("loop must be stopped");
    assert!(err.is_timeout(), "{err}");
    assert!(
        started.elapsed() < Duration::from_secs(3),
        "took {:?}",
        started.elapsed()
    );
}

#[test]
fn sub_second_timeout() {
    init_tracing();
    let options = ExecuteOptions::default().timeout(Some(Duration::from_millis(200)));
    let started = Instant::now();
    let err = options
        .execute("for (;;) { Math.sqrt(2); }", None)
        .expect_err("loop must be stopped");
    assert!(
        matches!(err, SpindleError::Timeout { timeout } if timeout == Duration::from_millis(200)),
        "{err}"
    );
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn catch_block_cannot_swallow_interrupt() {
    init_tracing();
    let err = spindle::execute(
        "while (true) { try { while (true) {} } catch (e) {} }",
        None,
        1,
    )
    .expect_err("interrupt must propagate");
    assert!(err.is_timeout(), "{err}");
}

#[test]
fn fast_script_does_not_wait_for_deadline() -> Result<()> {
    init_tracing();
    let started = Instant::now();
    assert_eq!(spindle::execute("1+1", None, 30)?, HostValue::Int(2));
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}

#[test]
fn zero_timeout_runs_unbounded() -> Result<()> {
    init_tracing();
    assert_eq!(spindle::execute("1+1", None, 0)?, HostValue::Int(2));
    assert_eq!(spindle::execute("1+1", None, -5)?, HostValue::Int(2));
    Ok(())
}

#[test]
fn largest_timeout_is_accepted() -> Result<()> {
    init_tracing();
    assert_eq!(spindle::execute("1+1", None, i64::MAX)?, HostValue::Int(2));
    Ok(())
}

#[test]
fn script_errors_are_not_reported_as_timeouts() {
    init_tracing();
    let err = spindle::execute("throw new Error('early')", None, 5).expect_err("throws");
    assert!(matches!(err, SpindleError::Script(_)), "{err}");
}

#[test]
fn next_call_after_timeout_is_clean() -> Result<()> {
    init_tracing();
    let err = spindle::execute("while (true) {}", None, 1).expect_err("times out");
    assert!(err.is_timeout());
    assert_eq!(spindle::execute("40 + 2", None, 1)?, HostValue::Int(42));
    Ok(())
}

#[test]
fn concurrent_calls_time_out_independently() -> Result<()> {
    init_tracing();
    let looping = std::thread::spawn(|| spindle::execute("while (true) {}", None, 1));
    let quick = std::thread::spawn(|| spindle::execute("'done'", None, 1));

    let quick = quick
        .join()
        .map_err(|_| anyhow::anyhow!("quick thread panicked"))??;
    assert_eq!(quick, HostValue::from("done"));

    let looping = looping
        .join()
        .map_err(|_| anyhow::anyhow!("looping thread panicked"))?;
    assert!(looping.is_err_and(|err| err.is_timeout()));
    Ok(())
}
