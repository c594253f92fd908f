//! # Epoch Reward Scheduler
//!
//! Periodically checks whether the contract's reward epoch is ready and, if so, distributes
//! rewards weighted by node uptime. Reward amounts are computed on chain from the uptimes,
//! so the scheduler passes an empty reward map.
//!
//! Every tick sleeps the full interval afterwards whether or not anything was distributed,
//! and a failed tick is logged and never stops the loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use log::{debug, error, info, warn};

use crate::amount::TokenAmount;
use crate::stop::StopHandle;
use crate::submitter::ChainStats;
use crate::uptime::{to_percentages, UptimeProvider};

/// Default pause between ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// The outbound operations the scheduler needs.
#[async_trait]
pub trait RewardPusher: Send + Sync {
    /// Reads the contract's reward state; `None` if the chain could not be read.
    async fn chain_stats(&self) -> Option<ChainStats>;

    /// Distributes rewards; `None` if nothing was distributed.
    async fn push_rewards(
        &self,
        rewards: &HashMap<String, TokenAmount>,
        uptimes: &HashMap<String, u8>,
    ) -> Option<B256>;
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The chain could not be read.
    StatsUnavailable,
    /// The epoch is not ready yet.
    NotReady,
    /// The uptime provider had no data, so nothing was submitted.
    NoUptimeData,
    /// Rewards were distributed in this transaction.
    Distributed(B256),
    /// Distribution was attempted and did not go through.
    Failed,
}

/// Periodic driver for epoch reward distribution.
pub struct EpochRewardScheduler<P: RewardPusher, U: UptimeProvider> {
    pusher: Arc<P>,
    uptime: U,
    interval: Duration,
    stop: StopHandle,
}

impl<P: RewardPusher, U: UptimeProvider> EpochRewardScheduler<P, U> {
    /// Creates a stopped scheduler.
    pub fn new(pusher: Arc<P>, uptime: U, interval: Duration) -> Self {
        Self {
            pusher,
            uptime,
            interval,
            stop: StopHandle::new(),
        }
    }

    /// Handle for stopping [`EpochRewardScheduler::start`] from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs one check-and-distribute step.
    pub async fn tick(&self) -> TickOutcome {
        let Some(stats) = self.pusher.chain_stats().await else {
            return TickOutcome::StatsUnavailable;
        };

        if !stats.can_distribute {
            debug!("Epoch {} not ready for distribution", stats.current_epoch);
            return TickOutcome::NotReady;
        }

        info!("Epoch {} ready, distributing rewards...", stats.current_epoch);

        let uptimes = self.uptime.fetch_uptimes().await;
        if uptimes.is_empty() {
            warn!("⚠️ No uptime data available, skipping distribution");
            return TickOutcome::NoUptimeData;
        }

        let percentages = to_percentages(&uptimes);
        match self.pusher.push_rewards(&HashMap::new(), &percentages).await {
            Some(tx_hash) => {
                info!("✅ Rewards distributed: {}", tx_hash);
                TickOutcome::Distributed(tx_hash)
            }
            None => {
                error!("❌ Epoch {} distribution did not go through", stats.current_epoch);
                TickOutcome::Failed
            }
        }
    }

    /// Ticks until stopped, sleeping the interval after every tick.
    pub async fn start(&self) {
        info!("🚀 Epoch reward scheduler started (interval {:?})", self.interval);

        loop {
            self.tick().await;
            if !self.stop.sleep(self.interval).await {
                break;
            }
        }

        info!("Epoch reward scheduler stopped");
    }
}
