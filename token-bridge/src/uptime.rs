//! # Uptime Providers
//!
//! The node registry reports each node's uptime over the current epoch as a fraction in
//! `[0, 1]`. An empty map means "no data" and makes the scheduler skip the tick; it is not an
//! error, so providers swallow their own failures and return an empty map instead.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use url::Url;

/// Uptime fraction per node id.
pub type Uptimes = HashMap<String, f64>;

/// Source of node uptimes.
#[async_trait]
pub trait UptimeProvider: Send + Sync {
    /// Current uptime fraction per node. Empty when no data is available.
    async fn fetch_uptimes(&self) -> Uptimes;
}

#[async_trait]
impl<U: UptimeProvider + ?Sized> UptimeProvider for Box<U> {
    async fn fetch_uptimes(&self) -> Uptimes {
        (**self).fetch_uptimes().await
    }
}

/// Adapts a synchronous closure into an [`UptimeProvider`].
pub struct UptimeFn<F>(pub F);

#[async_trait]
impl<F> UptimeProvider for UptimeFn<F>
where
    F: Fn() -> Uptimes + Send + Sync,
{
    async fn fetch_uptimes(&self) -> Uptimes {
        (self.0)()
    }
}

/// Fetches uptimes from the node registry's HTTP endpoint.
///
/// The endpoint returns a JSON object mapping node ids to fractions.
pub struct HttpUptimeProvider {
    client: reqwest::Client,
    url: Url,
}

impl HttpUptimeProvider {
    /// Request timeout for one fetch.
    pub const TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a provider for `url`.
    pub fn new(url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    async fn try_fetch(&self) -> Result<Uptimes, reqwest::Error> {
        self.client
            .get(self.url.clone())
            .timeout(Self::TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[async_trait]
impl UptimeProvider for HttpUptimeProvider {
    async fn fetch_uptimes(&self) -> Uptimes {
        match self.try_fetch().await {
            Ok(uptimes) => {
                debug!("Fetched uptime for {} nodes", uptimes.len());
                uptimes
            }
            Err(e) => {
                warn!("⚠️ Failed to fetch uptimes from {}: {}", self.url, e);
                Uptimes::new()
            }
        }
    }
}

/// Converts fractions to whole percentages, truncating. Fractions outside `[0, 1]` are clamped.
pub fn to_percentages(uptimes: &Uptimes) -> HashMap<String, u8> {
    uptimes
        .iter()
        .map(|(node_id, fraction)| {
            let clamped = if fraction.is_nan() {
                0.0
            } else {
                fraction.clamp(0.0, 1.0)
            };
            (node_id.clone(), (clamped * 100.0) as u8)
        })
        .collect()
}
