use crate::model::{AgeObservation, HistoryRecord, LiveKey};
use tracing::{debug, warn};

/// Join live keys against their history. A key without history is new and
/// gets age 0; the first matching record wins.
pub fn compute_ages(keys: &[LiveKey], history: &[HistoryRecord], now: i64) -> Vec<AgeObservation> {
    keys.iter()
        .map(|key| {
            let age = match history.iter().find(|record| record.matches(key)) {
                Some(record) if record.first_seen > now => {
                    warn!(
                        "First observation of {} {} {} lies in the future ({} > {}), using age 0",
                        key.domain, key.algorithm, key.keytag, record.first_seen, now
                    );
                    0
                }
                Some(record) => now - record.first_seen,
                None => 0,
            };
            debug!(
                "Age of {} {} {} ({}): {}s, key {}",
                key.domain, key.algorithm, key.keytag, key.keytype, age, key.record
            );

            AgeObservation {
                domain: key.domain.clone(),
                algorithm: key.algorithm.clone(),
                keytag: key.keytag,
                keytype: key.keytype,
                age,
                timestamp: now,
            }
        })
        .collect()
}
