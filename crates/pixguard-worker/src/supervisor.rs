//! Consume loop: one task per in-flight delivery, bounded by the prefetch count.
//!
//! Shutdown: cancelling the token stops intake. In-flight handlers get the
//! grace period to finish and settle; whatever is still running after that is
//! aborted, leaving its delivery unsettled for the broker to redeliver once
//! the connection closes. The caller closes the connection after `run` returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerError, DeliveryStream, Settlement};
use crate::pipeline::ConsumerPipeline;

/// Upper bound on the delay between reconnect attempts.
pub const MAX_RECONNECT_BACKOFF_SECS: u64 = 30;

/// Exponential reconnect backoff starting at one second, capped.
pub fn reconnect_backoff(attempt: u32) -> Duration {
    Duration::from_secs(
        2_u64
            .checked_pow(attempt)
            .unwrap_or(u64::MAX)
            .min(MAX_RECONNECT_BACKOFF_SECS),
    )
}

pub struct Supervisor {
    pipeline: Arc<ConsumerPipeline>,
    max_in_flight: usize,
    grace: Duration,
}

impl Supervisor {
    pub fn new(pipeline: Arc<ConsumerPipeline>, max_in_flight: usize, grace: Duration) -> Self {
        Self {
            pipeline,
            max_in_flight: max_in_flight.max(1),
            grace,
        }
    }

    /// Consume until shutdown or until the stream ends.
    ///
    /// Returns an error only for connection-level failures; per-message
    /// failures are settled by the pipeline and never surface here.
    pub async fn run<S>(&self, stream: &mut S, shutdown: CancellationToken) -> Result<(), BrokerError>
    where
        S: DeliveryStream + ?Sized,
    {
        let slots = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks: JoinSet<Settlement> = JoinSet::new();

        tracing::info!(max_in_flight = self.max_in_flight, "Supervisor started");

        let outcome = loop {
            while let Some(joined) = tasks.try_join_next() {
                log_joined(joined);
            }

            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Err(BrokerError::Closed),
                },
            };

            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break Ok(()),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    let pipeline = Arc::clone(&self.pipeline);
                    tasks.spawn(async move {
                        let _permit = permit;
                        pipeline.handle(delivery).await
                    });
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Delivery stream failed");
                    break Err(e);
                }
                None => {
                    tracing::warn!("Consumer cancelled by broker");
                    break Ok(());
                }
            }
        };

        self.drain(&mut tasks).await;
        tracing::info!("Supervisor stopped");
        outcome
    }

    async fn drain(&self, tasks: &mut JoinSet<Settlement>) {
        if tasks.is_empty() {
            return;
        }

        tracing::info!(
            in_flight = tasks.len(),
            grace_seconds = self.grace.as_secs(),
            "Draining in-flight messages"
        );

        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = tasks.join_next().await {
                log_joined(joined);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                aborted = tasks.len(),
                "Grace period elapsed, aborting unfinished messages"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }
}

fn log_joined(joined: Result<Settlement, tokio::task::JoinError>) {
    match joined {
        Ok(settlement) => tracing::trace!(%settlement, "Handler finished"),
        Err(e) if e.is_cancelled() => tracing::debug!("Handler aborted"),
        Err(e) => tracing::error!(error = %e, "Handler panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_backoff_exponential_then_capped() {
        assert_eq!(reconnect_backoff(0), Duration::from_secs(1));
        assert_eq!(reconnect_backoff(1), Duration::from_secs(2));
        assert_eq!(reconnect_backoff(4), Duration::from_secs(16));
        assert_eq!(reconnect_backoff(5), Duration::from_secs(MAX_RECONNECT_BACKOFF_SECS));
        assert_eq!(reconnect_backoff(100), Duration::from_secs(MAX_RECONNECT_BACKOFF_SECS));
    }
}
