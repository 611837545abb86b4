//! Outstanding-work tracking and the fault boundary for background recording tasks.

use crate::error::GatewayError;
use crate::metrics;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::error;

/// Counter of outstanding work with a wait-until-zero primitive.
///
/// Background tasks and buffered records each hold one unit until they are
/// finished, so shutdown can wait for captured traffic to reach disk.
#[derive(Clone, Default)]
pub struct InFlight {
    inner: Arc<InFlightInner>,
}

#[derive(Default)]
struct InFlightInner {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        self.inner.count.fetch_add(n, Ordering::SeqCst);
    }

    pub fn done(&self) {
        let previous = self.inner.count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "InFlight::done called more often than add");
        if previous == 1 {
            self.inner.idle.notify_waiters();
        }
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Resolves once the counter is zero.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Run `task` detached from the request that produced it.
///
/// Errors and panics are reported and never reach the client, which already
/// has its response. The task holds one unit of `in_flight` until it ends.
pub fn spawn_background<F>(in_flight: &InFlight, context: String, task: F)
where
    F: Future<Output = Result<(), GatewayError>> + Send + 'static,
{
    in_flight.add(1);
    let in_flight = in_flight.clone();

    tokio::spawn(async move {
        match AssertUnwindSafe(task).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                metrics::record_background_failure("error");
                error!(task = %context, "backgroundTaskFailed: {}", e);
            }
            Err(panic) => {
                metrics::record_background_failure("panic");
                error!(
                    task = %context,
                    "backgroundTaskPanicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
        in_flight.done();
    });
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_idle_returns_immediately_when_zero() {
        let in_flight = InFlight::new();
        tokio::time::timeout(Duration::from_secs(1), in_flight.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_idle_waits_for_done() {
        let in_flight = InFlight::new();
        in_flight.add(2);

        let waiter = {
            let in_flight = in_flight.clone();
            tokio::spawn(async move { in_flight.wait_idle().await })
        };

        in_flight.done();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        in_flight.done();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    fn explode() -> Result<(), GatewayError> {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_spawn_background_survives_panic() {
        let in_flight = InFlight::new();
        spawn_background(&in_flight, "panics".to_string(), async { explode() });
        spawn_background(&in_flight, "fails".to_string(), async {
            Err::<(), _>(GatewayError::InvalidProfile(String::new()))
        });

        tokio::time::timeout(Duration::from_secs(1), in_flight.wait_idle())
            .await
            .unwrap();
        assert_eq!(in_flight.count(), 0);
    }

    #[test]
    fn test_panic_message_variants() {
        let owned: Box<dyn std::any::Any + Send> = Box::new("owned".to_string());
        let borrowed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "static");
    }
}
