//! Recurring background triggers.

mod error;
mod job;

pub use error::RuntimeError;
pub use job::*;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn interval(&self) -> Duration;
    async fn run(&self) -> Result<(), RuntimeError>;
}

/// Runs every registered [`Job`] on its own interval until [`Scheduler::stop`] is called.
pub struct Scheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown: broadcast::Sender<()>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            jobs: Vec::new(),
            shutdown,
        }
    }

    pub fn add_job<J: Job>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    pub fn start(&self) -> Vec<JoinHandle<()>> {
        self.jobs
            .iter()
            .map(|job| {
                let job = Arc::clone(job);
                let mut shutdown = self.shutdown.subscribe();

                info!("Scheduling job {} every {:?}", job.name(), job.interval());

                tokio::spawn(async move {
                    let period = job.interval();
                    let mut ticker = interval_at(Instant::now() + period, period);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                if let Err(e) = job.run().await {
                                    error!("Job {} failed: {}", job.name(), e);
                                }
                            }
                            _ = shutdown.recv() => {
                                debug!("Job {} stopped", job.name());
                                break;
                            }
                        }
                    }
                })
            })
            .collect()
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob(Arc<AtomicUsize>);

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn run(&self) -> Result<(), RuntimeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_scheduler_runs_until_stopped() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.add_job(CountingJob(Arc::clone(&counter)));

        let handles = scheduler.start();
        tokio::time::sleep(Duration::from_millis(55)).await;
        scheduler.stop();
        for handle in handles {
            handle.await.unwrap();
        }

        let runs = counter.load(Ordering::SeqCst);
        assert!(runs >= 2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.load(Ordering::SeqCst), runs);
    }
}
