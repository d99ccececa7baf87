use std::sync::Arc;
use std::time::Duration;

use taskline::error::Error;
use taskline::limiter::RateLimiter;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn concurrent_waiters_are_spaced_by_the_rate() {
    let limiter = Arc::new(RateLimiter::new(10.0, 1).unwrap());
    let cancel = CancellationToken::new();
    let start = Instant::now();

    let mut handles = Vec::new();
    for _ in 0..5 {
        let limiter = Arc::clone(&limiter);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            limiter.wait(&cancel).await.unwrap();
            start.elapsed()
        }));
    }

    let mut grants = Vec::new();
    for handle in handles {
        grants.push(handle.await.unwrap());
    }
    grants.sort();

    assert_eq!(grants[0], Duration::ZERO);
    for pair in grants.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(100), "{grants:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn burst_is_granted_at_once_then_paced() {
    let limiter = RateLimiter::new(4.0, 3).unwrap();
    let cancel = CancellationToken::new();
    let start = Instant::now();

    for _ in 0..3 {
        limiter.wait(&cancel).await.unwrap();
    }
    assert_eq!(start.elapsed(), Duration::ZERO);

    limiter.wait(&cancel).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(250));
}

#[tokio::test(start_paused = true)]
async fn cancelled_wait_returns_promptly() {
    let limiter = Arc::new(RateLimiter::new(1.0, 1).unwrap());
    let cancel = CancellationToken::new();
    limiter.wait(&cancel).await.unwrap();

    let waiter = {
        let limiter = Arc::clone(&limiter);
        let cancel = cancel.clone();
        tokio::spawn(async move { limiter.wait(&cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let cancelled_at = Instant::now();
    cancel.cancel();

    let result = waiter.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(cancelled_at.elapsed() < Duration::from_millis(1));
}

#[tokio::test(start_paused = true)]
async fn tokens_accrue_while_idle_up_to_burst() {
    let limiter = RateLimiter::new(2.0, 2).unwrap();
    assert!(limiter.try_acquire());
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());

    tokio::time::advance(Duration::from_millis(500)).await;
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());

    tokio::time::advance(Duration::from_secs(10)).await;
    assert!(limiter.try_acquire());
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());
}

#[tokio::test(start_paused = true)]
async fn cancelled_waiters_hand_their_slots_to_the_next_wait() {
    let limiter = Arc::new(RateLimiter::new(1.0, 1).unwrap());
    let start = Instant::now();
    limiter.wait(&CancellationToken::new()).await.unwrap();

    let abandon = CancellationToken::new();
    let mut waiters = Vec::new();
    for _ in 0..5 {
        let limiter = Arc::clone(&limiter);
        let abandon = abandon.clone();
        waiters.push(tokio::spawn(async move { limiter.wait(&abandon).await }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    abandon.cancel();
    for waiter in waiters {
        assert!(matches!(waiter.await.unwrap(), Err(Error::Cancelled)));
    }

    let live = CancellationToken::new();
    limiter.wait(&live).await.unwrap();
    assert!(start.elapsed() <= Duration::from_millis(1_001), "{:?}", start.elapsed());

    // The rate still holds for whoever comes next.
    limiter.wait(&live).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(2));
    assert!(start.elapsed() <= Duration::from_millis(2_001));
}

#[tokio::test(start_paused = true)]
async fn slots_vacated_long_ago_do_not_exceed_burst() {
    let limiter = Arc::new(RateLimiter::new(1.0, 1).unwrap());
    limiter.wait(&CancellationToken::new()).await.unwrap();

    let abandon = CancellationToken::new();
    let mut waiters = Vec::new();
    for _ in 0..5 {
        let limiter = Arc::clone(&limiter);
        let abandon = abandon.clone();
        waiters.push(tokio::spawn(async move { limiter.wait(&abandon).await }));
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    abandon.cancel();
    for waiter in waiters {
        waiter.await.unwrap().unwrap_err();
    }

    tokio::time::advance(Duration::from_secs(100)).await;
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());
}
