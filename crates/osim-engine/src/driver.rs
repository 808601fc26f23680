use crate::simulation::{Simulation, TickReport};
use osim_common::RandomSource;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

const REPORT_BACKLOG: usize = 64;

/// Owns the background ticker. Commands lock the same mutex as the ticker,
/// so a command never lands in the middle of a tick.
pub struct DriverHandle<R: RandomSource + 'static> {
    sim: Arc<Mutex<Simulation<R>>>,
    reports: broadcast::Sender<TickReport>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Starts ticking `sim` on the current tokio runtime. The period is re-read
/// from the simulation before every tick, so speed changes apply at once.
pub fn spawn<R: RandomSource + 'static>(sim: Simulation<R>) -> DriverHandle<R> {
    let sim = Arc::new(Mutex::new(sim));
    let (reports, _) = broadcast::channel(REPORT_BACKLOG);
    let (shutdown, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run(sim.clone(), reports.clone(), shutdown_rx));

    DriverHandle {
        sim,
        reports,
        shutdown,
        task,
    }
}

async fn run<R: RandomSource + 'static>(
    sim: Arc<Mutex<Simulation<R>>>,
    reports: broadcast::Sender<TickReport>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let period = sim.lock().await.speed().interval();

        tokio::select! {
            _ = tokio::time::sleep(period) => {
                // Lock, tick, unlock
                let report = sim.lock().await.tick();
                if let Some(report) = report {
                    for w in report.warnings() {
                        warn!("tick {}: {:?}", report.tick, w);
                    }
                    // No subscribers is fine
                    let _ = reports.send(report);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("driver shutting down");
                    break;
                }
            }
        }
    }
}

impl<R: RandomSource + 'static> DriverHandle<R> {
    /// Exclusive access for commands and queries.
    pub async fn lock(&self) -> MutexGuard<'_, Simulation<R>> {
        self.sim.lock().await
    }

    pub fn simulation(&self) -> Arc<Mutex<Simulation<R>>> {
        self.sim.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TickReport> {
        self.reports.subscribe()
    }

    /// Stops the ticker and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("driver task failed: {}", e);
        }
    }
}
