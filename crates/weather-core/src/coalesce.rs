//! Single-flight coalescing of upstream weather requests.
//!
//! Concurrent callers asking for the same [`CoalesceKey`] share one upstream
//! call: the first caller (the leader) starts the producer, later callers
//! join and receive a clone of the same outcome, success or error. Once the
//! producer finishes the key is released, so the next call fetches again.
//!
//! The producer runs on its own tokio task. Dropping any caller, the leader
//! included, only stops that caller from waiting; the upstream call and the
//! other waiters are unaffected.
//!
//! # Example
//!
//! ```
//! use weather_core::{CoalesceKey, RequestCoalescer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let coalescer = RequestCoalescer::<u32>::new();
//!     let value = coalescer
//!         .coalesce(CoalesceKey::Current, || async { Ok(42) })
//!         .await
//!         .unwrap();
//!     assert_eq!(value, 42);
//!     assert_eq!(coalescer.in_flight(), 0);
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, trace};

use weather_types::WeatherReading;

use crate::error::{Error, Result};
use crate::source::WeatherSource;

/// Identity of a logical upstream request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoalesceKey {
    /// Current conditions. All such requests share one key.
    Current,
    /// Conditions at a Unix timestamp in seconds.
    Historical(i64),
}

impl fmt::Display for CoalesceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoalesceKey::Current => f.write_str("current_weather"),
            CoalesceKey::Historical(ts) => write!(f, "historical_weather_{}", ts),
        }
    }
}

type Outcome<T> = Option<Result<T>>;
type InFlight<T> = Arc<Mutex<HashMap<CoalesceKey, watch::Receiver<Outcome<T>>>>>;

fn lock<T>(in_flight: &InFlight<T>) -> MutexGuard<'_, HashMap<CoalesceKey, watch::Receiver<Outcome<T>>>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a key from the in-flight table when dropped.
///
/// Held by the producer task, so the key is released even if the producer
/// panics.
struct Release<T> {
    in_flight: InFlight<T>,
    key: CoalesceKey,
}

impl<T> Drop for Release<T> {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.key);
        trace!(key = %self.key, "Released in-flight weather request");
    }
}

enum Role<T> {
    Leader(watch::Sender<Outcome<T>>, watch::Receiver<Outcome<T>>),
    Follower(watch::Receiver<Outcome<T>>),
}

/// Table of in-flight requests keyed by [`CoalesceKey`].
///
/// Cloning shares the table.
pub struct RequestCoalescer<T> {
    in_flight: InFlight<T>,
}

impl<T> Clone for RequestCoalescer<T> {
    fn clone(&self) -> Self {
        Self {
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

impl<T> Default for RequestCoalescer<T> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> RequestCoalescer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty coalescer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys with a producer currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Run `producer` for `key`, or join the run already in flight.
    ///
    /// `producer` is only invoked by the leader. Every caller receives a
    /// clone of the leader's outcome. A producer that panics yields
    /// [`Error::Abandoned`] to everyone waiting on it.
    pub async fn coalesce<F, Fut>(&self, key: CoalesceKey, producer: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let role = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key, rx.clone());
                    Role::Leader(tx, rx)
                }
            }
        };

        let mut rx = match role {
            Role::Follower(rx) => {
                debug!(%key, "Joining in-flight weather request");
                rx
            }
            Role::Leader(tx, rx) => {
                debug!(%key, "Starting weather request");
                let release = Release {
                    in_flight: Arc::clone(&self.in_flight),
                    key,
                };
                let fut = producer();
                tokio::spawn(async move {
                    let outcome = fut.await;
                    drop(release);
                    // No receivers left is fine: every caller gave up.
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        };

        let outcome: Outcome<T> = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(Error::Abandoned(key.to_string())))
    }
}

/// A [`WeatherSource`] decorator that coalesces concurrent identical calls.
///
/// `current()` calls share [`CoalesceKey::Current`]; `historical(t)` calls
/// share [`CoalesceKey::Historical`] keyed by `t` in whole seconds.
pub struct CoalescingSource<S: ?Sized> {
    inner: Arc<S>,
    coalescer: RequestCoalescer<WeatherReading>,
}

impl<S: WeatherSource + ?Sized + 'static> CoalescingSource<S> {
    /// Wrap a source with a fresh coalescer.
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            coalescer: RequestCoalescer::new(),
        }
    }

    /// The coalescer shared by all calls through this source.
    pub fn coalescer(&self) -> &RequestCoalescer<WeatherReading> {
        &self.coalescer
    }
}

#[async_trait]
impl<S: WeatherSource + ?Sized + 'static> WeatherSource for CoalescingSource<S> {
    async fn current(&self) -> Result<WeatherReading> {
        let inner = Arc::clone(&self.inner);
        self.coalescer
            .coalesce(CoalesceKey::Current, move || async move {
                inner.current().await
            })
            .await
    }

    async fn historical(&self, at: OffsetDateTime) -> Result<WeatherReading> {
        let inner = Arc::clone(&self.inner);
        self.coalescer
            .coalesce(
                CoalesceKey::Historical(at.unix_timestamp()),
                move || async move { inner.historical(at).await },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use futures::future::join_all;
    use time::macros::datetime;

    use crate::mock::MockWeatherSource;

    fn counted_producer(
        calls: &Arc<AtomicU32>,
        result: Result<u32>,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = Result<u32>> + Send>> + use<> {
        let calls = Arc::clone(calls);
        move || {
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                result
            })
        }
    }

    #[test]
    fn test_key_display() {
        assert_eq!(CoalesceKey::Current.to_string(), "current_weather");
        assert_eq!(
            CoalesceKey::Historical(1672574400).to_string(),
            "historical_weather_1672574400"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_share_one_producer() {
        let coalescer = RequestCoalescer::<u32>::new();
        let calls = Arc::new(AtomicU32::new(0));

        let results = join_all((0..10).map(|i| {
            coalescer.coalesce(CoalesceKey::Current, counted_producer(&calls, Ok(i)))
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == Ok(0)));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_reaches_every_waiter() {
        let coalescer = RequestCoalescer::<u32>::new();
        let calls = Arc::new(AtomicU32::new(0));
        let err = Error::UpstreamBadStatus {
            status: 503,
            message: "unavailable".to_string(),
        };

        let results = join_all((0..5).map(|_| {
            coalescer.coalesce(
                CoalesceKey::Historical(1672574400),
                counted_producer(&calls, Err(err.clone())),
            )
        }))
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| *r == Err(err.clone())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_run_independently() {
        let coalescer = RequestCoalescer::<u32>::new();
        let calls = Arc::new(AtomicU32::new(0));

        let (a, b, c) = tokio::join!(
            coalescer.coalesce(CoalesceKey::Current, counted_producer(&calls, Ok(1))),
            coalescer.coalesce(CoalesceKey::Historical(100), counted_producer(&calls, Ok(2))),
            coalescer.coalesce(CoalesceKey::Historical(200), counted_producer(&calls, Ok(3))),
        );

        assert_eq!((a, b, c), (Ok(1), Ok(2), Ok(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_calls_fetch_again() {
        let coalescer = RequestCoalescer::<u32>::new();
        let calls = Arc::new(AtomicU32::new(0));

        let first = coalescer
            .coalesce(CoalesceKey::Current, counted_producer(&calls, Ok(1)))
            .await;
        let second = coalescer
            .coalesce(CoalesceKey::Current, counted_producer(&calls, Ok(2)))
            .await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_leader_does_not_cancel_upstream() {
        let coalescer = RequestCoalescer::<u32>::new();
        let calls = Arc::new(AtomicU32::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let producer = {
            let calls = Arc::clone(&calls);
            let finished = Arc::clone(&finished);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                finished.store(true, Ordering::SeqCst);
                Ok(7)
            }
        };

        let leader = tokio::spawn({
            let coalescer = coalescer.clone();
            async move { coalescer.coalesce(CoalesceKey::Current, producer).await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(coalescer.in_flight(), 1);

        let follower = tokio::spawn({
            let coalescer = coalescer.clone();
            let calls = Arc::clone(&calls);
            async move {
                coalescer
                    .coalesce(CoalesceKey::Current, counted_producer(&calls, Ok(0)))
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());

        assert_eq!(follower.await.unwrap(), Ok(7));
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_producer_releases_key() {
        let coalescer = RequestCoalescer::<u32>::new();

        let explode = true;
        let result = coalescer
            .coalesce(CoalesceKey::Current, move || async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if explode {
                    panic!("producer blew up");
                }
                Ok(1)
            })
            .await;

        assert_eq!(result, Err(Error::Abandoned("current_weather".to_string())));
        assert_eq!(coalescer.in_flight(), 0);

        let retry = coalescer
            .coalesce(CoalesceKey::Current, || async { Ok(2) })
            .await;
        assert_eq!(retry, Ok(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescing_source_dedupes_current() {
        let mock = Arc::new(MockWeatherSource::new());
        mock.set_latency(Duration::from_millis(50));
        let source = CoalescingSource::new(Arc::clone(&mock));

        let results = join_all((0..5).map(|_| source.current())).await;

        assert!(results.iter().all(|r| r == &Ok(mock.current_reading())));
        assert_eq!(mock.current_calls(), 1);
        assert_eq!(mock.historical_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescing_source_keys_historical_by_second() {
        let mock = Arc::new(MockWeatherSource::new());
        mock.set_latency(Duration::from_millis(50));
        let source = CoalescingSource::new(Arc::clone(&mock));

        let t = datetime!(2023-01-01 12:00:00 UTC);
        let (a, b, c) = tokio::join!(
            source.historical(t),
            source.historical(t + time::Duration::milliseconds(500)),
            source.historical(t + time::Duration::seconds(1)),
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(mock.historical_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalescing_source_shares_errors() {
        let mock = Arc::new(MockWeatherSource::new());
        mock.set_latency(Duration::from_millis(50));
        mock.set_should_fail(Some(Error::NoHistoricalData(1672574400)));
        let source = CoalescingSource::new(Arc::clone(&mock));

        let t = datetime!(2023-01-01 12:00:00 UTC);
        let results = join_all((0..3).map(|_| source.historical(t))).await;

        assert!(
            results
                .iter()
                .all(|r| *r == Err(Error::NoHistoricalData(1672574400)))
        );
        assert_eq!(mock.historical_calls(), 1);
    }
}
