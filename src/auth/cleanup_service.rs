//! Background maintenance: deletes refresh and email tokens that can never be
//! honoured again once they are older than the retention window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::errors::{DomainResult, ErrorHandler};
use crate::observability::MetricsRecorder;
use crate::storage::TransactionManager;

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub refresh_tokens: u64,
    pub email_tokens: u64,
}

#[derive(Clone)]
pub struct CleanupService {
    tx: Arc<dyn TransactionManager>,
    retention_days: i64,
    metrics: MetricsRecorder,
}

impl CleanupService {
    pub fn new(tx: Arc<dyn TransactionManager>, retention_days: i64) -> Self {
        Self { tx, retention_days, metrics: MetricsRecorder::new() }
    }

    /// Delete revoked or expired refresh tokens and used or expired email
    /// tokens past the retention window. Safe to repeat.
    pub async fn run_once(&self) -> DomainResult<SweepReport> {
        let repos = self.tx.repositories();

        let refresh_tokens = repos
            .refresh_tokens
            .delete_revoked_and_old_tokens(self.retention_days)
            .await
            .map_err(|err| ErrorHandler::repository("delete_revoked_and_old_tokens", err))?;
        self.metrics.record_tokens_swept("refresh", refresh_tokens);

        let email_tokens = repos
            .email_tokens
            .delete_used_and_old_tokens(self.retention_days)
            .await
            .map_err(|err| ErrorHandler::repository("delete_used_and_old_tokens", err))?;
        self.metrics.record_tokens_swept("email", email_tokens);

        let report = SweepReport { refresh_tokens, email_tokens };
        if refresh_tokens + email_tokens > 0 {
            info!(
                refresh_tokens,
                email_tokens,
                retention_days = self.retention_days,
                "token sweep removed dead tokens"
            );
        } else {
            debug!("token sweep found nothing to remove");
        }
        Ok(report)
    }

    /// Sweep every `interval` until `shutdown` turns true or its sender is
    /// dropped. The first sweep runs immediately.
    pub fn spawn(self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "token sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = self.run_once().await {
                            ErrorHandler::report(&err);
                            error!(error = %err, "token sweep failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("token sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    }
}
