use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ValidationOutcome;

/// Wall-clock instants captured while a message moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingTimings {
    /// When the delivery was handed to the pipeline
    pub message_received: DateTime<Utc>,
    /// When the object finished downloading
    pub file_received: DateTime<Utc>,
}

impl ProcessingTimings {
    pub fn new(message_received: DateTime<Utc>, file_received: DateTime<Utc>) -> Self {
        // Clocks are sampled in order, but a skewed clock must not break the
        // record's ordering invariant.
        Self {
            message_received,
            file_received: file_received.max(message_received),
        }
    }
}

/// Row of `image_validation_result`, created once per validated message.
///
/// Invariant: `message_received_time <= file_received_time <= created_time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResultRecord {
    /// Time-ordered (UUIDv7) identifier generated by the worker
    pub id: Uuid,
    pub gid: Uuid,
    pub is_blank: bool,
    pub is_folded: bool,
    pub tilt_angle: f64,
    pub message_received_time: DateTime<Utc>,
    pub file_received_time: DateTime<Utc>,
    pub created_time: DateTime<Utc>,
}

impl ValidationResultRecord {
    pub fn new(gid: Uuid, outcome: &ValidationOutcome, timings: ProcessingTimings) -> Self {
        let created_time = Utc::now().max(timings.file_received);
        Self {
            id: Uuid::now_v7(),
            gid,
            is_blank: outcome.is_blank,
            is_folded: outcome.is_folded,
            tilt_angle: outcome.tilt_angle,
            message_received_time: timings.message_received,
            file_received_time: timings.file_received,
            created_time,
        }
    }

    pub fn outcome(&self) -> ValidationOutcome {
        ValidationOutcome {
            is_blank: self.is_blank,
            is_folded: self.is_folded,
            tilt_angle: self.tilt_angle,
        }
    }

    pub fn timestamps_ordered(&self) -> bool {
        self.message_received_time <= self.file_received_time
            && self.file_received_time <= self.created_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_record_keeps_timestamp_order() {
        let received = Utc::now() - Duration::seconds(2);
        let fetched = received + Duration::seconds(1);
        let record = ValidationResultRecord::new(
            Uuid::new_v4(),
            &ValidationOutcome::default(),
            ProcessingTimings::new(received, fetched),
        );
        assert!(record.timestamps_ordered());
        assert_eq!(record.id.get_version_num(), 7);
    }

    #[test]
    fn skewed_file_time_is_clamped() {
        let received = Utc::now();
        let timings = ProcessingTimings::new(received, received - Duration::seconds(5));
        assert_eq!(timings.file_received, received);
    }
}
