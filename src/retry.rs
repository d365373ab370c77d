use std::{fmt, future::Future, time::Duration};

/// Bounded retry with linearly increasing backoff.
///
/// The wait before attempt *n* is `base_delay × n`, so a three-attempt policy
/// waits `base_delay × 2` after the first attempt and `base_delay × 3` after
/// the second. Attempt counts and bases are operational tuning, not protocol
/// requirements; the defaults mirror the asymmetry between plain and signed
/// calls (a signed retry costs an extra round trip for the nonce plus a
/// signing pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Default policy for unauthenticated fetches (directory, renewal info).
    pub const fn unauthenticated() -> Self {
        Self::new(6, Duration::from_millis(650))
    }

    /// Default policy for signed calls.
    pub const fn signed() -> Self {
        Self::new(3, Duration::from_millis(2250))
    }

    pub(crate) fn backoff(&self, next_attempt: u32) -> Duration {
        self.base_delay * next_attempt
    }
}

/// Repeats an unauthenticated HTTP attempt until it returns 2xx or the policy
/// is exhausted.
///
/// - A 2xx response returns immediately.
/// - A non-2xx response is held; if attempts remain the call is retried after
///   the backoff wait, otherwise the last such response is returned as-is so
///   the caller can surface the server's error detail.
/// - A transport error is logged and retried; if no response was ever
///   obtained, `None` is returned and the caller must synthesize a local
///   failure.
pub(crate) async fn retry_until_ok<F, Fut, E>(
    policy: &RetryPolicy,
    mut attempt_fn: F,
) -> Option<reqwest::Response>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, E>>,
    E: fmt::Display,
{
    let mut last_response = None;

    for attempt in 1..=policy.max_attempts {
        match attempt_fn().await {
            Ok(res) if res.status().is_success() => return Some(res),

            Ok(res) => {
                log::debug!("attempt {attempt}: server returned {}", res.status());
                last_response = Some(res);
            }

            Err(err) => {
                log::debug!("attempt {attempt}: transport error: {err}");
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.backoff(attempt + 1)).await;
        }
    }

    last_response
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug)]
    struct FakeTimeout;

    impl fmt::Display for FakeTimeout {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("connection timed out")
        }
    }

    fn response(status: u16, body: &'static str) -> reqwest::Response {
        http::Response::builder()
            .status(status)
            .body(body)
            .unwrap()
            .into()
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_attempts_on_transport_failure() {
        let policy = RetryPolicy::new(3, Duration::from_millis(650));
        let attempts = AtomicU32::new(0);

        let started = tokio::time::Instant::now();
        let res = retry_until_ok(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<reqwest::Response, _>(FakeTimeout) }
        })
        .await;

        assert!(res.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // waits of base×2 and base×3 between the three attempts
        assert_eq!(started.elapsed(), Duration::from_millis(650 * 2 + 650 * 3));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_response_when_never_ok() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        let attempts = AtomicU32::new(0);

        let res = retry_until_ok(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok::<_, FakeTimeout>(if n == 0 {
                    response(500, "first")
                } else {
                    response(503, "second")
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(res.status().as_u16(), 503);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_first_success() {
        let policy = RetryPolicy::new(6, Duration::from_millis(650));
        let attempts = AtomicU32::new(0);

        let started = tokio::time::Instant::now();
        let res = retry_until_ok(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, FakeTimeout>(response(200, "ok")) }
        })
        .await;

        assert!(res.is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transport_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let attempts = AtomicU32::new(0);

        let res = retry_until_ok(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FakeTimeout)
                } else {
                    Ok(response(201, "created"))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(res.status().as_u16(), 201);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
