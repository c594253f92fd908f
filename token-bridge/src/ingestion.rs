//! # Chain Event Ingestion Loop
//!
//! Polls the chain for new blocks and feeds the token contract's events to the
//! [`EventSyncDispatcher`].
//!
//! The loop observes events from the height it first sees onwards; there is no historical
//! backfill. Each poll covers `[cursor + 1, head]` and fetches the inbound event kinds in
//! [`EventKind::INBOUND`] order. The cursor moves to `head` only after every kind was fetched
//! and dispatched without error. On any failure the cursor stays put and the next poll
//! refetches the whole range, which is why the dispatcher must tolerate redelivery. Once the
//! cursor has moved, the dispatcher forgets the events at or below it.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use snafu::ResultExt;

use crate::chain_client::ChainClient;
use crate::dispatcher::EventSyncDispatcher;
use crate::error::{ChainSnafu, FetchEventsSnafu, Result};
use crate::events::EventKind;
use crate::mesh_ledger::MeshLedger;
use crate::stop::StopHandle;

/// Polling driver for inbound chain events.
pub struct ChainEventIngestionLoop<C: ChainClient, L: MeshLedger> {
    client: Arc<C>,
    dispatcher: EventSyncDispatcher<L>,
    poll_interval: Duration,
    cursor: Option<u64>,
    stop: StopHandle,
}

impl<C: ChainClient, L: MeshLedger> ChainEventIngestionLoop<C, L> {
    /// Creates a loop that has not yet observed the chain.
    pub fn new(client: Arc<C>, dispatcher: EventSyncDispatcher<L>, poll_interval: Duration) -> Self {
        Self {
            client,
            dispatcher,
            poll_interval,
            cursor: None,
            stop: StopHandle::new(),
        }
    }

    /// Last fully processed block, or `None` before the first height was read.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    /// Handle for stopping [`ChainEventIngestionLoop::start`] from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The dispatcher, e.g. for subscribing observers before the loop starts.
    pub fn dispatcher_mut(&mut self) -> &mut EventSyncDispatcher<L> {
        &mut self.dispatcher
    }

    /// Runs one poll step and returns the number of events dispatched.
    ///
    /// The first call only records the current height as the cursor.
    pub async fn poll_once(&mut self) -> Result<usize> {
        let head = self.client.block_number().await.context(ChainSnafu)?;

        let Some(last) = self.cursor else {
            info!("Event listener starting from block {}", head);
            self.cursor = Some(head);
            return Ok(0);
        };

        if head <= last {
            return Ok(0);
        }

        let from = last + 1;
        let mut dispatched = 0;
        for kind in EventKind::INBOUND {
            let events = self
                .client
                .fetch_events(kind, from, head)
                .await
                .context(FetchEventsSnafu {
                    kind,
                    from,
                    to: head,
                })?;

            for event in &events {
                self.dispatcher.dispatch(event).await?;
                dispatched += 1;
            }
        }

        self.cursor = Some(head);
        self.dispatcher.forget_through(head);
        debug!(
            "Processed blocks {}..={} ({} events)",
            from, head, dispatched
        );
        Ok(dispatched)
    }

    /// Polls until stopped. Failures are logged and the same range is retried next tick.
    pub async fn start(&mut self) {
        info!("🚀 Starting event listener (poll interval {:?})", self.poll_interval);

        while self.cursor.is_none() {
            if let Err(e) = self.poll_once().await {
                error!("❌ Failed to read initial block height: {}", e);
            }
            if self.cursor.is_none() && !self.stop.sleep(self.poll_interval).await {
                info!("Event listener stopped");
                return;
            }
        }

        while self.stop.sleep(self.poll_interval).await {
            match self.poll_once().await {
                Ok(0) => {}
                Ok(count) => info!("✅ Synced {} chain events", count),
                Err(e) => error!("❌ Poll cycle failed, range will be retried: {}", e),
            }
        }

        info!("Event listener stopped");
    }
}
