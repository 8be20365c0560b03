use debridmirror_sync::{MirrorResult, RateLimiter, RetryPolicy, SyncError};
use debridmirror_types::ServiceTag;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn live() -> CancellationToken {
    CancellationToken::new()
}

fn throttled() -> SyncError {
    SyncError::from_status(429, "too many requests")
}

/// Fails with 429 for the first `failures` attempts, then succeeds.
async fn flaky(limiter: &RateLimiter, failures: u32, calls: &AtomicU32) -> MirrorResult<u32> {
    limiter
        .execute(ServiceTag::A, "torrents?page=1", &live(), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt.number <= failures {
                    Err(throttled())
                } else {
                    Ok(attempt.number)
                }
            }
        })
        .await
}

// --- Pacing ---

#[tokio::test(start_paused = true)]
async fn request_starts_are_spaced_by_min_interval() {
    let limiter = RateLimiter::default().with_min_interval(ServiceTag::A, Duration::from_millis(240));
    let starts = Mutex::new(Vec::new());

    let calls = (0..5).map(|i| {
        let limiter = &limiter;
        let starts = &starts;
        async move {
            limiter
                .execute(ServiceTag::A, &format!("req-{i}"), &live(), move |_| async move {
                    starts.lock().unwrap().push(Instant::now());
                    Ok::<_, SyncError>(())
                })
                .await
        }
    });
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }

    let mut starts = starts.into_inner().unwrap();
    starts.sort();
    assert_eq!(starts.len(), 5);
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(240));
    }
}

#[tokio::test(start_paused = true)]
async fn lanes_are_independent_per_service() {
    let limiter = RateLimiter::default()
        .with_min_interval(ServiceTag::A, Duration::from_secs(10))
        .with_min_interval(ServiceTag::B, Duration::from_millis(1));
    let begin = Instant::now();

    limiter
        .execute(ServiceTag::A, "a-1", &live(), |_| async { Ok::<_, SyncError>(()) })
        .await
        .unwrap();
    limiter
        .execute(ServiceTag::B, "b-1", &live(), |_| async { Ok::<_, SyncError>(()) })
        .await
        .unwrap();

    assert!(begin.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn completions_overlap_while_starts_are_serialized() {
    let limiter = RateLimiter::default().with_min_interval(ServiceTag::C, Duration::from_millis(100));
    let begin = Instant::now();

    let slow = |key: &'static str| {
        let limiter = &limiter;
        async move {
            limiter
                .execute(ServiceTag::C, key, &live(), |_| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Ok::<_, SyncError>(())
                })
                .await
        }
    };
    let (a, b) = tokio::join!(slow("one"), slow("two"));
    a.unwrap();
    b.unwrap();

    // Second start waits 100ms, not for the first request to finish.
    assert!(begin.elapsed() < Duration::from_millis(2_500));
}

// --- Retry ---

#[tokio::test(start_paused = true)]
async fn six_throttles_then_success() {
    let limiter = RateLimiter::default();
    let calls = AtomicU32::new(0);

    let result = flaky(&limiter, 6, &calls).await;

    assert_eq!(result.unwrap(), 7);
    assert_eq!(calls.load(Ordering::SeqCst), 7);
}

#[tokio::test(start_paused = true)]
async fn eight_throttles_exhaust_the_policy() {
    let limiter = RateLimiter::default();
    let calls = AtomicU32::new(0);

    let err = flaky(&limiter, 8, &calls).await.unwrap_err();

    assert!(err.is_rate_limited());
    assert_eq!(calls.load(Ordering::SeqCst), 7);
}

#[tokio::test(start_paused = true)]
async fn backoff_grows_exponentially() {
    let limiter = RateLimiter::default();
    let calls = AtomicU32::new(0);
    let begin = Instant::now();

    flaky(&limiter, 3, &calls).await.unwrap();

    // 1s + 2s + 4s, each jittered by 0.8 to 1.2.
    let elapsed = begin.elapsed();
    assert!(elapsed >= Duration::from_millis(5_600), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(8_400), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn permanent_errors_are_not_retried() {
    let limiter = RateLimiter::default();
    let calls = AtomicU32::new(0);

    let err = limiter
        .execute(ServiceTag::B, "magnet/status", &live(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(SyncError::from_status(404, "not found")) }
        })
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_policy_limits_attempts() {
    let limiter = RateLimiter::new(RetryPolicy {
        max_attempts: 2,
        ..RetryPolicy::default()
    });
    let calls = AtomicU32::new(0);

    assert!(flaky(&limiter, 5, &calls).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn every_attempt_gets_a_fresh_cache_buster() {
    let limiter = RateLimiter::default();
    let busters = Mutex::new(Vec::new());

    limiter
        .execute(ServiceTag::A, "torrents?page=2", &live(), |attempt| {
            busters.lock().unwrap().push(attempt.cache_buster.clone());
            async move {
                if attempt.number < 4 {
                    Err(SyncError::from_status(503, "unavailable"))
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();

    let busters = busters.into_inner().unwrap();
    assert_eq!(busters.len(), 4);
    let unique: HashSet<_> = busters.iter().collect();
    assert_eq!(unique.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn retry_count_tracks_request_in_progress() {
    let limiter = Arc::new(RateLimiter::default());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let inner = limiter.clone();
    let record = seen.clone();
    limiter
        .execute(ServiceTag::A, "torrents?page=3", &live(), move |attempt| {
            let inner = inner.clone();
            let record = record.clone();
            async move {
                let count = inner.retry_count(ServiceTag::A, "torrents?page=3").await;
                record.lock().unwrap().push(count);
                if attempt.number < 3 { Err(throttled()) } else { Ok(()) }
            }
        })
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(limiter.retry_count(ServiceTag::A, "torrents?page=3").await, 0);
}

// --- Cancellation ---

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_sends_no_further_attempt() {
    let limiter = RateLimiter::default();
    let calls = AtomicU32::new(0);
    let token = CancellationToken::new();
    let begin = Instant::now();

    let trigger = token.clone();
    tokio::spawn(async move {
        // First backoff is at least 800ms.
        tokio::time::sleep(Duration::from_millis(500)).await;
        trigger.cancel();
    });

    let err = limiter
        .execute(ServiceTag::A, "torrents?page=4", &token, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(throttled()) }
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(begin.elapsed() < Duration::from_millis(800));
    assert_eq!(limiter.retry_count(ServiceTag::A, "torrents?page=4").await, 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_prevents_first_attempt() {
    let limiter = RateLimiter::default();
    let calls = AtomicU32::new(0);
    let token = CancellationToken::new();
    token.cancel();

    let err = limiter
        .execute(ServiceTag::B, "magnet/status", &token, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, SyncError>(()) }
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_while_queued_for_a_slot() {
    let limiter = RateLimiter::default().with_min_interval(ServiceTag::C, Duration::from_secs(5));
    let token = CancellationToken::new();

    limiter
        .execute(ServiceTag::C, "first", &live(), |_| async { Ok::<_, SyncError>(()) })
        .await
        .unwrap();

    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });
    let calls = AtomicU32::new(0);
    let err = limiter
        .execute(ServiceTag::C, "second", &token, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, SyncError>(()) }
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The abandoned wait did not claim the slot.
    let begin = Instant::now();
    limiter
        .execute(ServiceTag::C, "third", &live(), |_| async { Ok::<_, SyncError>(()) })
        .await
        .unwrap();
    assert!(begin.elapsed() <= Duration::from_secs(4));
}
