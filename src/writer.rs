use crate::error::StoreError;
use crate::model::{AgeObservation, MEASUREMENT};
use crate::store::{HistoryStore, Point, PointBatch};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Batch sent with this many points
    Written(usize),
    /// Batch built but not sent
    DryRun(usize),
    /// Nothing to write
    Empty,
}

pub fn to_point(observation: &AgeObservation) -> Point {
    Point::new(MEASUREMENT, observation.timestamp)
        .tag("domain", observation.domain.as_str())
        .tag("algorithm", observation.algorithm.as_str())
        .tag("keytag", observation.keytag.to_string())
        .tag("keytype", observation.keytype.to_string())
        .field("age", observation.age)
}

pub fn build_batch(observations: &[AgeObservation]) -> PointBatch {
    let mut batch = PointBatch::default();
    for observation in observations {
        batch.push(to_point(observation));
    }
    batch
}

/// Persist one zone's observations with a single write call, unless
/// `dry_run` is set.
pub async fn write_observations<S>(
    store: &S,
    observations: &[AgeObservation],
    dry_run: bool,
) -> Result<WriteOutcome, StoreError>
where
    S: HistoryStore + ?Sized,
{
    if observations.is_empty() {
        return Ok(WriteOutcome::Empty);
    }

    let batch = build_batch(observations);
    for point in &batch.points {
        debug!("Point: {}", point);
    }

    if dry_run {
        info!(
            "DRYRUN! {} points not written to the store",
            batch.len()
        );
        return Ok(WriteOutcome::DryRun(batch.len()));
    }

    store.write(&batch).await?;
    debug!("Successfully written {} points", batch.len());
    Ok(WriteOutcome::Written(batch.len()))
}
