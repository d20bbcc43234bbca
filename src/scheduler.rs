use crate::platform::ChatPlatform;
use crate::services::CountTracker;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;

pub struct ReportScheduler {
    tracker: Arc<CountTracker>,
    platform: Arc<dyn ChatPlatform>,
    report_interval: Duration,
}

impl ReportScheduler {
    pub fn new(
        tracker: Arc<CountTracker>,
        platform: Arc<dyn ChatPlatform>,
        report_interval: Duration,
    ) -> Self {
        Self {
            tracker,
            platform,
            report_interval,
        }
    }

    /// Relog every configured guild, then report on a fixed interval forever.
    pub async fn run(self) {
        let relogged = self.tracker.relog_all(self.platform.as_ref()).await;
        info!(
            "Startup relog finished for {}/{} guilds",
            relogged,
            self.tracker.configured_count()
        );

        let mut ticker = interval(self.report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately and the relog just covered it.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.tracker.report_tick(self.platform.as_ref()).await;
        }
    }
}
