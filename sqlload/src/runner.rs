use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::client::{Client, StopSignal};
use crate::db::Connector;
use crate::metrics::MetricSink;
use crate::schedule::Schedule;
use crate::workloads::Workload;

struct VuHandle {
    stop: Arc<StopSignal>,
    join_handle: JoinHandle<()>,
}

/// What the scheduler did, independent of statement metrics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub vus_spawned: u64,
    pub vus_max: u64,
    pub iterations: u64,
    pub elapsed: Duration,
}

/// Drives the stage schedule: every tick the active VU count is moved to the
/// schedule's target by spawning new VUs or retiring the newest ones. When the
/// last stage ends, every VU still running is abandoned mid-iteration.
pub struct Runner<C: Connector, U: Workload> {
    connector: Arc<C>,
    workload: Arc<U>,
    sink: Arc<dyn MetricSink>,
    schedule: Schedule,
    tick: Duration,
    seed: Option<u64>,
}

impl<C: Connector, U: Workload> Runner<C, U> {
    pub fn new(
        connector: Arc<C>,
        workload: Arc<U>,
        sink: Arc<dyn MetricSink>,
        schedule: Schedule,
        tick: Duration,
        seed: Option<u64>,
    ) -> Self {
        Runner {
            connector,
            workload,
            sink,
            schedule,
            tick,
            seed,
        }
    }

    pub async fn run(self) -> RunStats {
        let progress = Arc::new(AtomicU64::new(0));
        let mut active: Vec<VuHandle> = Vec::new();
        let mut retired: Vec<VuHandle> = Vec::new();
        let mut stats = RunStats::default();

        let start = Instant::now();
        let end = sleep_until(start + self.schedule.total_duration());
        tokio::pin!(end);
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut end => break,
                _ = ticker.tick() => {}
            }
            let target = self.schedule.target_at(start.elapsed()) as usize;
            if target != active.len() {
                debug!(from = active.len(), to = target, "adjusting vus");
            }
            while active.len() < target {
                stats.vus_spawned += 1;
                active.push(self.spawn(stats.vus_spawned, progress.clone()));
            }
            while active.len() > target {
                if let Some(vu) = active.pop() {
                    vu.stop.stop();
                    retired.push(vu);
                }
            }
            stats.vus_max = stats.vus_max.max(active.len() as u64);
        }

        info!(
            active = active.len(),
            spawned = stats.vus_spawned,
            "schedule finished"
        );
        for vu in active.into_iter().chain(retired) {
            vu.stop.stop();
            vu.join_handle.abort();
        }
        stats.iterations = progress.load(Ordering::Relaxed);
        stats.elapsed = start.elapsed();
        stats
    }

    fn spawn(&self, vu: u64, progress: Arc<AtomicU64>) -> VuHandle {
        let stop = Arc::new(StopSignal::default());
        let client = Client::new(
            vu,
            self.connector.clone(),
            self.workload.clone(),
            self.sink.clone(),
            self.seed,
            stop.clone(),
            progress,
        );
        VuHandle {
            stop,
            join_handle: tokio::spawn(client.run()),
        }
    }
}
