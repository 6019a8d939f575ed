//! Bounded-retry reachability checks.
//!
//! A single probe can race the data plane while flows are still being
//! programmed, so both polarities poll. Must-connect checks use a short
//! budget with a tight interval and stop at the first matching reply.
//! Must-not-connect checks have to sit out their whole budget before they can
//! pass.
//!
//! # Example
//!
//! ```rust,ignore
//! use segmentation_probe::{expect_reachable, ExecOutput, ProbePolicy, UdpProbe};
//!
//! let cmd = UdpProbe::hostname("10.96.0.15", 80).shell_command();
//! expect_reachable(|| cluster.exec_shell("ns", "client", &cmd), "backend-pod", ProbePolicy::REACHABLE)
//!     .await?;
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Output of one command execution inside the client context.
///
/// Both streams are expected to be trimmed by the executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Poll cadence and total budget for one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl ProbePolicy {
    /// Must-connect cadence: 200ms interval, 5s budget.
    pub const REACHABLE: Self = Self {
        interval: Duration::from_millis(200),
        timeout: Duration::from_secs(5),
    };

    /// Must-not-connect cadence: 500ms interval, 2s budget.
    pub const UNREACHABLE: Self = Self {
        interval: Duration::from_millis(500),
        timeout: Duration::from_secs(2),
    };
}

/// What the probe is expected to observe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    /// stdout must eventually equal `expected_output`.
    Reachable { expected_output: String },
    /// stdout must stay empty for the whole budget.
    Unreachable,
}

impl Expectation {
    pub fn reachable(expected_output: impl Into<String>) -> Self {
        Self::Reachable {
            expected_output: expected_output.into(),
        }
    }

    pub fn should_connect(&self) -> bool {
        matches!(self, Self::Reachable { .. })
    }

    /// Policy matching this polarity.
    pub fn default_policy(&self) -> ProbePolicy {
        match self {
            Self::Reachable { .. } => ProbePolicy::REACHABLE,
            Self::Unreachable => ProbePolicy::UNREACHABLE,
        }
    }
}

/// Reachability check failures.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(
        "expected output {expected:?} not observed within {timeout:?} \
         ({attempts} attempts, last stdout {last_stdout:?})"
    )]
    Timeout {
        expected: String,
        timeout: Duration,
        attempts: u32,
        last_stdout: String,
    },

    #[error("probe execution failed: {0}")]
    Transport(String),

    #[error("probe wrote to stderr: {0}")]
    Stderr(String),

    #[error("connection unexpectedly succeeded, stdout: {stdout}")]
    UnexpectedConnection { stdout: String },
}

enum Verdict {
    Pass,
    Retry,
    Fail(ProbeError),
}

fn classify<E: Display>(expectation: &Expectation, result: &Result<ExecOutput, E>) -> Verdict {
    match expectation {
        Expectation::Reachable { expected_output } => match result {
            Ok(out) if !out.stderr.is_empty() => Verdict::Fail(ProbeError::Stderr(out.stderr.clone())),
            Err(e) => Verdict::Fail(ProbeError::Transport(e.to_string())),
            Ok(out) if out.stdout == *expected_output => Verdict::Pass,
            Ok(_) => Verdict::Retry,
        },
        // stderr here is nc complaining about the refused flow, which is
        // what a blocked path looks like. Executor failures arrive as Err.
        Expectation::Unreachable => match result {
            Ok(out) if !out.stderr.is_empty() => Verdict::Retry,
            Err(e) => Verdict::Fail(ProbeError::Transport(e.to_string())),
            Ok(out) if !out.stdout.is_empty() => {
                Verdict::Fail(ProbeError::UnexpectedConnection {
                    stdout: out.stdout.clone(),
                })
            }
            Ok(_) => Verdict::Retry,
        },
    }
}

/// Poll `execute` until `expectation` is decided or `policy.timeout` elapses.
///
/// The first attempt runs immediately. After each undecided attempt the
/// deadline is checked, then the loop sleeps for `policy.interval` (never past
/// the deadline).
///
/// # Errors
///
/// See [`expect_reachable`] and [`expect_unreachable`] for the per-polarity
/// failure conditions.
pub async fn probe<F, Fut, E>(
    expectation: &Expectation,
    policy: ProbePolicy,
    mut execute: F,
) -> Result<(), ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ExecOutput, E>>,
    E: Display,
{
    let deadline = Instant::now() + policy.timeout;
    let mut attempts: u32 = 0;
    let mut last_stdout = String::new();

    loop {
        attempts = attempts.saturating_add(1);
        let result = execute().await;

        match &result {
            Ok(out) => debug!(
                attempt = attempts,
                stdout = %out.stdout,
                stderr = %out.stderr,
                "Probe attempt"
            ),
            Err(e) => debug!(attempt = attempts, error = %e, "Probe attempt failed"),
        }

        match classify(expectation, &result) {
            Verdict::Pass => return Ok(()),
            Verdict::Fail(err) => return Err(err),
            Verdict::Retry => {}
        }

        if let Ok(out) = result {
            last_stdout = out.stdout;
        }

        let now = Instant::now();
        if now >= deadline {
            return match expectation {
                Expectation::Reachable { expected_output } => Err(ProbeError::Timeout {
                    expected: expected_output.clone(),
                    timeout: policy.timeout,
                    attempts,
                    last_stdout,
                }),
                Expectation::Unreachable => {
                    debug!(attempts, "No connection within budget");
                    Ok(())
                }
            };
        }

        sleep(policy.interval.min(deadline - now)).await;
    }
}

/// Assert that `execute` eventually prints exactly `expected_output`.
///
/// # Errors
///
/// - [`ProbeError::Stderr`] as soon as an attempt writes to stderr
/// - [`ProbeError::Transport`] as soon as an attempt fails to execute
/// - [`ProbeError::Timeout`] if the budget runs out first
pub async fn expect_reachable<F, Fut, E>(
    execute: F,
    expected_output: &str,
    policy: ProbePolicy,
) -> Result<(), ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ExecOutput, E>>,
    E: Display,
{
    probe(&Expectation::reachable(expected_output), policy, execute).await
}

/// Assert that `execute` prints nothing on stdout for the whole budget.
///
/// Attempts that only write to stderr are treated as not connected.
///
/// # Errors
///
/// - [`ProbeError::UnexpectedConnection`] as soon as stdout is non-empty
/// - [`ProbeError::Transport`] as soon as an attempt fails to execute
pub async fn expect_unreachable<F, Fut, E>(execute: F, policy: ProbePolicy) -> Result<(), ProbeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ExecOutput, E>>,
    E: Display,
{
    probe(&Expectation::Unreachable, policy, execute).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn out(stdout: &str, stderr: &str) -> Result<ExecOutput, String> {
        Ok(ExecOutput::new(stdout, stderr))
    }

    #[test]
    fn test_policy_constants() {
        assert_eq!(ProbePolicy::REACHABLE.interval, Duration::from_millis(200));
        assert_eq!(ProbePolicy::REACHABLE.timeout, Duration::from_secs(5));
        assert_eq!(ProbePolicy::UNREACHABLE.interval, Duration::from_millis(500));
        assert_eq!(ProbePolicy::UNREACHABLE.timeout, Duration::from_secs(2));
        assert_eq!(
            Expectation::reachable("x").default_policy(),
            ProbePolicy::REACHABLE
        );
        assert_eq!(
            Expectation::Unreachable.default_policy(),
            ProbePolicy::UNREACHABLE
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_succeeds_immediately() {
        let start = Instant::now();
        let result = expect_reachable(
            || async { out("backend-pod", "") },
            "backend-pod",
            ProbePolicy::REACHABLE,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_succeeds_after_retry() {
        let mut calls = 0u32;
        let result = expect_reachable(
            || {
                calls += 1;
                let n = calls;
                async move {
                    if n >= 3 {
                        out("backend-pod", "")
                    } else {
                        out("", "")
                    }
                }
            },
            "backend-pod",
            ProbePolicy::REACHABLE,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_ignores_other_backend() {
        let mut calls = 0u32;
        let result = expect_reachable(
            || {
                calls += 1;
                let n = calls;
                async move {
                    if n == 1 {
                        out("some-other-pod", "")
                    } else {
                        out("backend-pod", "")
                    }
                }
            },
            "backend-pod",
            ProbePolicy::REACHABLE,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_fails_fast_on_stderr() {
        let start = Instant::now();
        let mut calls = 0u32;
        let result = expect_reachable(
            || {
                calls += 1;
                async { out("", "nc: bad address") }
            },
            "backend-pod",
            ProbePolicy::REACHABLE,
        )
        .await;

        let err = result.expect_err("stderr must fail the check");
        assert!(matches!(err, ProbeError::Stderr(ref s) if s == "nc: bad address"));
        assert_eq!(calls, 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_fails_fast_on_exec_error() {
        let mut calls = 0u32;
        let result = expect_reachable(
            || {
                calls += 1;
                async { Err::<ExecOutput, _>("pod not found".to_string()) }
            },
            "backend-pod",
            ProbePolicy::REACHABLE,
        )
        .await;

        assert!(matches!(result, Err(ProbeError::Transport(ref s)) if s == "pod not found"));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachable_times_out() {
        let start = Instant::now();
        let mut calls = 0u32;
        let result = expect_reachable(
            || {
                calls += 1;
                async { out("", "") }
            },
            "backend-pod",
            ProbePolicy::REACHABLE,
        )
        .await;

        match result {
            Err(ProbeError::Timeout {
                expected,
                timeout,
                attempts,
                ..
            }) => {
                assert_eq!(expected, "backend-pod");
                assert_eq!(timeout, Duration::from_secs(5));
                assert_eq!(attempts, calls);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(calls > 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_succeeds_after_full_budget() {
        let start = Instant::now();
        let mut calls = 0u32;
        let result = expect_unreachable(
            || {
                calls += 1;
                async { out("", "") }
            },
            ProbePolicy::UNREACHABLE,
        )
        .await;

        assert!(result.is_ok());
        assert!(start.elapsed() >= Duration::from_secs(2));
        // 0s, 0.5s, 1s, 1.5s, 2s
        assert_eq!(calls, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_tolerates_stderr() {
        let result = expect_unreachable(
            || async { out("", "command terminated with exit code 1") },
            ProbePolicy::UNREACHABLE,
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_fails_fast_on_stdout() {
        let start = Instant::now();
        let mut calls = 0u32;
        let result = expect_unreachable(
            || {
                calls += 1;
                let n = calls;
                async move {
                    if n == 2 {
                        out("backend-pod", "")
                    } else {
                        out("", "")
                    }
                }
            },
            ProbePolicy::UNREACHABLE,
        )
        .await;

        assert!(
            matches!(result, Err(ProbeError::UnexpectedConnection { ref stdout }) if stdout == "backend-pod")
        );
        assert_eq!(calls, 2);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_fails_on_exec_error() {
        let result = expect_unreachable(
            || async { Err::<ExecOutput, _>("kubectl: not found".to_string()) },
            ProbePolicy::UNREACHABLE,
        )
        .await;

        assert!(matches!(result, Err(ProbeError::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_respects_custom_policy() {
        let policy = ProbePolicy {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(3),
        };
        let mut calls = 0u32;
        let result = probe(
            &Expectation::Unreachable,
            policy,
            || {
                calls += 1;
                async { out("", "") }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_error_messages() {
        let err = ProbeError::UnexpectedConnection {
            stdout: "backend-pod".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "connection unexpectedly succeeded, stdout: backend-pod"
        );

        let err = ProbeError::Stderr("boom".to_string());
        assert_eq!(err.to_string(), "probe wrote to stderr: boom");
    }
}
