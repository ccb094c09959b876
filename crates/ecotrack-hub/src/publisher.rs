//! Periodic analytics publisher.

use std::sync::Arc;
use std::time::Duration;

use ecotrack_core::{AnalyticsSnapshot, OutboundMessage};
use metrics::counter;
use rand::Rng;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::hub::BroadcastHub;
use crate::metrics::HUB_STATS_PUBLISHED_TOTAL;

/// Produces the values carried by each `analytics_update`.
pub trait MetricsSource: Send {
    /// Take the next snapshot.
    fn snapshot(&mut self) -> AnalyticsSnapshot;
}

/// Random placeholder metrics for the admin dashboard.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyntheticMetrics;

impl SyntheticMetrics {
    /// Range of `active_users`.
    pub const ACTIVE_USERS: std::ops::RangeInclusive<u32> = 100..=500;
    /// Range of `co2_saved`.
    pub const CO2_SAVED: std::ops::RangeInclusive<u32> = 1_000..=5_000;
    /// Range of `waste_collected`.
    pub const WASTE_COLLECTED: std::ops::RangeInclusive<u32> = 500..=2_000;
}

impl MetricsSource for SyntheticMetrics {
    fn snapshot(&mut self) -> AnalyticsSnapshot {
        let mut rng = rand::rng();
        AnalyticsSnapshot {
            active_users: rng.random_range(Self::ACTIVE_USERS),
            co2_saved: rng.random_range(Self::CO2_SAVED),
            waste_collected: rng.random_range(Self::WASTE_COLLECTED),
        }
    }
}

/// Broadcast a snapshot to administrators every `period` until `cancel`.
///
/// The first snapshot goes out one full period after start. Each tick
/// broadcasts even when no administrator is connected. Returns the number
/// of snapshots published. A zero `period` is clamped to one millisecond.
pub async fn run_live_stats<S: MetricsSource>(
    hub: Arc<BroadcastHub>,
    period: Duration,
    mut source: S,
    cancel: CancellationToken,
) -> u64 {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut published = 0_u64;

    info!(period_ms = period.as_millis(), "live stats publisher started");
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = source.snapshot();
                let report = hub.broadcast_to_admins(&OutboundMessage::AnalyticsUpdate(snapshot));
                published += 1;
                counter!(HUB_STATS_PUBLISHED_TOTAL).increment(1);
                debug!(
                    active_users = snapshot.active_users,
                    recipients = report.recipients,
                    "published live stats"
                );
            }
        }
    }
    info!(published, "live stats publisher stopped");
    published
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecotrack_core::Identity;
    use serde_json::Value;
    use tokio::sync::mpsc;

    struct Fixed(u32);

    impl MetricsSource for Fixed {
        fn snapshot(&mut self) -> AnalyticsSnapshot {
            self.0 += 1;
            AnalyticsSnapshot {
                active_users: self.0,
                co2_saved: 0,
                waste_collected: 0,
            }
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<Value> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|raw| serde_json::from_str(&raw).unwrap())
            .collect()
    }

    #[test]
    fn synthetic_values_stay_in_bounds() {
        let mut source = SyntheticMetrics;
        for _ in 0..200 {
            let s = source.snapshot();
            assert!(SyntheticMetrics::ACTIVE_USERS.contains(&s.active_users));
            assert!(SyntheticMetrics::CO2_SAVED.contains(&s.co2_saved));
            assert!(SyntheticMetrics::WASTE_COLLECTED.contains(&s.waste_collected));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_twice_in_twelve_seconds() {
        let hub = Arc::new(BroadcastHub::default());
        let (_admin, mut admin_rx) = hub.connect(Identity::classify("admin_1", "admin"));
        let (_user, mut user_rx) = hub.connect(Identity::classify("user_1", "admin"));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_live_stats(
            Arc::clone(&hub),
            Duration::from_secs(5),
            SyntheticMetrics,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(12)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), 2);

        let frames = drain(&mut admin_rx);
        assert_eq!(frames.len(), 2);
        for frame in &frames {
            assert_eq!(frame["type"], "analytics_update");
            let users = u32::try_from(frame["active_users"].as_u64().unwrap()).unwrap();
            let co2 = u32::try_from(frame["co2_saved"].as_u64().unwrap()).unwrap();
            let waste = u32::try_from(frame["waste_collected"].as_u64().unwrap()).unwrap();
            assert!(SyntheticMetrics::ACTIVE_USERS.contains(&users));
            assert!(SyntheticMetrics::CO2_SAVED.contains(&co2));
            assert!(SyntheticMetrics::WASTE_COLLECTED.contains(&waste));
        }
        assert!(drain(&mut user_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_before_first_period() {
        let hub = Arc::new(BroadcastHub::default());
        let (_admin, mut admin_rx) = hub.connect(Identity::classify("admin_1", "admin"));

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_live_stats(
            Arc::clone(&hub),
            Duration::from_secs(5),
            Fixed(0),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(drain(&mut admin_rx).is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let frames = drain(&mut admin_rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["active_users"], 1);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_with_no_admins() {
        let hub = Arc::new(BroadcastHub::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_live_stats(
            Arc::clone(&hub),
            Duration::from_secs(5),
            Fixed(0),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(16)).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_clamped() {
        let hub = Arc::new(BroadcastHub::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_live_stats(
            Arc::clone(&hub),
            Duration::ZERO,
            Fixed(0),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
        let published = task.await.unwrap();
        assert!(published > 0);
        assert!(published <= 11);
    }

    #[tokio::test]
    async fn stops_promptly_on_cancel() {
        let hub = Arc::new(BroadcastHub::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let published =
            run_live_stats(hub, Duration::from_secs(3_600), SyntheticMetrics, cancel).await;
        assert_eq!(published, 0);
    }
}
