use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::db::{Connector, DB};
use crate::metrics::MetricSink;
use crate::workloads::{StatementClass, Workload};

/// Retirement signal from the scheduler to one VU. A VU checks it between
/// iterations and is woken by it while sleeping its think time.
#[derive(Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        // notify_one keeps a permit when the VU is not waiting yet
        self.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    async fn stopped(&self) {
        if !self.is_stopped() {
            self.notify.notified().await;
        }
    }
}

/// One virtual user. Owns its RNG and its single connection, which is opened
/// on the first iteration and kept until the VU is retired.
pub struct Client<C: Connector, U: Workload> {
    vu: u64,

    connector: Arc<C>,
    db: Option<C::Conn>,
    workload: Arc<U>,
    sink: Arc<dyn MetricSink>,
    rng: StdRng,

    stop: Arc<StopSignal>,
    progress: Arc<AtomicU64>,
}

impl<C: Connector, U: Workload> Client<C, U> {
    pub fn new(
        vu: u64,
        connector: Arc<C>,
        workload: Arc<U>,
        sink: Arc<dyn MetricSink>,
        seed: Option<u64>,
        stop: Arc<StopSignal>,
        progress: Arc<AtomicU64>,
    ) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s.wrapping_add(vu)),
            None => StdRng::from_entropy(),
        };
        Client {
            vu,
            connector,
            db: None,
            workload,
            sink,
            rng,
            stop,
            progress,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.db.is_some()
    }

    /// One iteration without think time. `None` when no connection could be
    /// opened; the failure is already recorded.
    pub async fn iterate(&mut self) -> Option<StatementClass> {
        if self.db.is_none() {
            match self.connector.connect().await {
                Ok(conn) => {
                    debug!(vu = self.vu, "connection opened");
                    self.db = Some(conn);
                }
                Err(err) => {
                    warn!(vu = self.vu, error = %err, "could not open connection");
                    self.sink.record_connect_failure(err.to_string());
                    return None;
                }
            }
        }
        let db = self.db.as_mut()?;
        let class = self
            .workload
            .do_transaction(db, &mut self.rng, self.sink.as_ref())
            .await;
        self.progress.fetch_add(1, Ordering::Relaxed);
        Some(class)
    }

    /// Iterates until told to stop, sleeping the workload's think time between
    /// iterations, then closes the connection. A stop during think time ends
    /// the sleep early.
    pub async fn run(mut self) {
        debug!(vu = self.vu, "vu started");
        while !self.stop.is_stopped() {
            self.iterate().await;
            let think = self.workload.think_time(&mut self.rng);
            tokio::select! {
                _ = tokio::time::sleep(think) => {}
                _ = self.stop.stopped() => break,
            }
        }
        if let Some(db) = self.db.take() {
            if let Err(err) = db.close().await {
                debug!(vu = self.vu, error = %err, "closing connection failed");
            }
        }
        debug!(vu = self.vu, "vu retired");
    }
}
