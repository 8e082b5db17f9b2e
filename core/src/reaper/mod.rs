//! Stuck-job reaper. Periodically sweeps generations abandoned in an
//! active state past `stuck_threshold` and closes them out exactly like a
//! failed-path compensation, relying on ledger idempotency to make
//! repeated sweeps over the same request a no-op.

use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::CoreError;
use crate::ledger::Ledger;
use crate::models::{GenerationStatus, JobStatus};
use crate::store::GenerationRepo;

#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    pub sweep_interval: Duration,
    pub stuck_threshold: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        ReaperConfig {
            sweep_interval: Duration::from_secs(60),
            stuck_threshold: Duration::from_secs(600),
        }
    }
}

pub struct Reaper {
    generations: GenerationRepo,
    ledger: Ledger,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(generations: GenerationRepo, ledger: Ledger, config: ReaperConfig) -> Self {
        Reaper {
            generations,
            ledger,
            config,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.sweep_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    warn!(error = %e, "reaper sweep failed");
                }
            }
        })
    }

    /// Runs one sweep, returning the number of requests it closed out.
    pub async fn sweep_once(&self) -> Result<usize, CoreError> {
        let threshold = Utc::now()
            - chrono::Duration::from_std(self.config.stuck_threshold)
                .unwrap_or_else(|_| chrono::Duration::seconds(600));
        let stuck = self.generations.find_stuck(threshold).await?;
        let mut reaped = 0;
        for request in stuck {
            self.generations
                .transition(&request.id, GenerationStatus::Failed)
                .await?;
            if let Some(job) = self.generations.job_for_request(&request.id).await? {
                self.generations
                    .update_job_status(job.id, JobStatus::Failed, Some("system cleanup".into()))
                    .await?;
            }
            if request.cost.is_positive() {
                self.ledger
                    .refund_generation(request.user_telegram_id, &request.id, request.cost)
                    .await?;
            }
            self.generations
                .remove_trial_use(request.user_telegram_id, &request.id)
                .await?;
            info!(request_id = %request.id, "reaped stuck generation");
            reaped += 1;
        }
        Ok(reaped)
    }
}
