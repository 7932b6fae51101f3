//! Drives the resolve, reconstruct, age and write steps for every zone.

use crate::age::compute_ages;
use crate::error::{HistoryError, StoreError};
use crate::history;
use crate::model::fqdn;
use crate::resolver::{DnsTransport, KeyLookup, KeyResolver, NetworkTransport};
use crate::store::HistoryStore;
use crate::writer::{WriteOutcome, write_observations};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// What happened to a single zone.
#[derive(Debug, Clone)]
pub enum ZoneOutcome {
    /// Observations for this many keys were written
    Written { keys: usize },
    /// Observations for this many keys were built but not sent
    DryRun { keys: usize },
    /// A resolver answered with an empty DNSKEY set
    NoKeys,
    /// No resolver produced an answer
    Unreachable,
    HistoryFailed(HistoryError),
    WriteFailed(StoreError),
    /// Not finished before shutdown
    Cancelled,
}

impl ZoneOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ZoneOutcome::Unreachable | ZoneOutcome::HistoryFailed(_) | ZoneOutcome::WriteFailed(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ZoneReport {
    pub zone: String,
    pub outcome: ZoneOutcome,
}

/// Outcomes of one run, in zone order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub zones: Vec<ZoneReport>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.zones.iter().filter(|r| r.outcome.is_failure()).count()
    }

    pub fn cancelled(&self) -> usize {
        self.zones
            .iter()
            .filter(|r| matches!(r.outcome, ZoneOutcome::Cancelled))
            .count()
    }

    /// True when every zone finished without failure.
    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.cancelled() == 0
    }

    pub fn outcome(&self, zone: &str) -> Option<&ZoneOutcome> {
        let zone = fqdn(zone);
        self.zones
            .iter()
            .find(|r| r.zone == zone)
            .map(|r| &r.outcome)
    }
}

fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct Monitor<T = NetworkTransport, S = dyn HistoryStore>
where
    T: DnsTransport,
    S: HistoryStore + ?Sized,
{
    resolver: KeyResolver<T>,
    store: Arc<S>,
    dry_run: bool,
    concurrency: usize,
    clock: fn() -> i64,
}

impl<T, S> Monitor<T, S>
where
    T: DnsTransport,
    S: HistoryStore + ?Sized,
{
    pub fn new(resolver: KeyResolver<T>, store: Arc<S>, dry_run: bool) -> Self {
        Self {
            resolver,
            store,
            dry_run,
            concurrency: 1,
            clock: unix_now,
        }
    }

    /// Number of zones processed at the same time. Values below 1 are
    /// raised to 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Source of the current Unix time used for ages and point timestamps.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Process every zone. A failing zone never stops the others; a
    /// shutdown signal drops in-flight zones and marks the rest cancelled.
    pub async fn run(&self, zones: &[String], mut shutdown: broadcast::Receiver<()>) -> RunSummary {
        let zones: Vec<String> = zones.iter().map(|z| fqdn(z)).collect();
        info!(
            "Checking {} zones against {} resolvers (concurrency {})",
            zones.len(),
            self.resolver.resolvers().len(),
            self.concurrency
        );

        let mut summary = RunSummary::default();
        let mut shutdown_closed = false;
        {
            let pipeline = stream::iter(zones.iter().cloned())
                .map(|zone| async move {
                    let outcome = self.process_zone(&zone).await;
                    ZoneReport { zone, outcome }
                })
                .buffered(self.concurrency);
            tokio::pin!(pipeline);

            loop {
                tokio::select! {
                    biased;
                    signal = shutdown.recv(), if !shutdown_closed => match signal {
                        Ok(()) | Err(RecvError::Lagged(_)) => {
                            warn!("Shutdown requested, cancelling remaining zones");
                            break;
                        }
                        Err(RecvError::Closed) => shutdown_closed = true,
                    },
                    report = pipeline.next() => match report {
                        Some(report) => summary.zones.push(report),
                        None => break,
                    },
                }
            }
        }

        for zone in zones.into_iter().skip(summary.zones.len()) {
            summary.zones.push(ZoneReport {
                zone,
                outcome: ZoneOutcome::Cancelled,
            });
        }
        summary
    }

    /// Run the whole pipeline for one zone.
    pub async fn process_zone(&self, zone: &str) -> ZoneOutcome {
        let zone = fqdn(zone);
        debug!("Processing zone {}", zone);

        let keys = match self.resolver.lookup(&zone).await {
            KeyLookup::Keys(keys) => keys,
            KeyLookup::Unreachable { attempts } => {
                for attempt in &attempts {
                    debug!(
                        "{}: {} via {} failed: {}",
                        zone, attempt.resolver, attempt.protocol, attempt.error
                    );
                }
                error!(
                    "Skipping {}: all {} resolver attempts failed",
                    zone,
                    attempts.len()
                );
                return ZoneOutcome::Unreachable;
            }
        };

        if keys.is_empty() {
            info!("{} has no DNSKEY records", zone);
            return ZoneOutcome::NoKeys;
        }

        let history = match history::reconstruct(self.store.as_ref(), &zone).await {
            Ok(history) => history,
            Err(e) => {
                error!("Skipping {}: {}", zone, e);
                return ZoneOutcome::HistoryFailed(e);
            }
        };

        let observations = compute_ages(&keys, &history, (self.clock)());

        match write_observations(self.store.as_ref(), &observations, self.dry_run).await {
            Ok(WriteOutcome::Written(keys)) => {
                info!("{}: wrote age of {} keys", zone, keys);
                ZoneOutcome::Written { keys }
            }
            Ok(WriteOutcome::DryRun(keys)) => ZoneOutcome::DryRun { keys },
            Ok(WriteOutcome::Empty) => ZoneOutcome::NoKeys,
            Err(e) => {
                error!("Error writing points for {}: {}", zone, e);
                ZoneOutcome::WriteFailed(e)
            }
        }
    }
}
