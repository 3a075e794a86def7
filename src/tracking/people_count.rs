use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::{DocumentStore, Repository, keys};

/// Occupancy samples for one room booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeopleCount {
    pub booking_id: String,
    pub capacity: u32,
    pub maximum: u32,
    pub average: f64,
    pub median: f64,
    #[serde(default)]
    pub counts: Vec<u32>,
}

impl PeopleCount {
    pub fn new(booking_id: impl Into<String>, capacity: u32) -> Self {
        Self {
            booking_id: booking_id.into(),
            capacity,
            maximum: 0,
            average: 0.0,
            median: 0.0,
            counts: Vec::new(),
        }
    }

    /// Append a sample and recompute the statistics.
    pub fn record(&mut self, count: u32) {
        self.counts.push(count);

        let mut sorted = self.counts.clone();
        sorted.sort_unstable();
        let n = sorted.len();
        self.maximum = sorted[n - 1];
        self.average = sorted.iter().map(|&c| f64::from(c)).sum::<f64>() / n as f64;
        self.median = if n % 2 == 1 {
            f64::from(sorted[n / 2])
        } else {
            (f64::from(sorted[n / 2 - 1]) + f64::from(sorted[n / 2])) / 2.0
        };
    }
}

#[derive(Debug, Clone)]
pub struct PeopleCounts<S> {
    repo: Repository<S>,
}

impl<S: DocumentStore> PeopleCounts<S> {
    pub fn new(repo: Repository<S>) -> Self {
        Self { repo }
    }

    pub async fn get(&self, booking_id: &str) -> Result<Option<PeopleCount>> {
        Ok(self
            .repo
            .get(&keys::people_count(booking_id))
            .await?
            .map(|doc| doc.value))
    }

    /// Add a sample to the booking's record, creating it if needed.
    pub async fn record(&self, booking_id: &str, capacity: u32, count: u32) -> Result<PeopleCount> {
        let key = keys::people_count(booking_id);
        self.repo
            .with_conflict_retry(&key, || async {
                let mut doc = self
                    .repo
                    .get_or_else(&key, || PeopleCount::new(booking_id, capacity))
                    .await?;
                doc.value.capacity = capacity;
                doc.value.record(count);
                self.repo.save(&key, &doc).await?;
                Ok(doc.value)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics() {
        let mut pc = PeopleCount::new("b-17", 8);
        pc.record(3);
        assert_eq!((pc.maximum, pc.average, pc.median), (3, 3.0, 3.0));
        pc.record(6);
        assert_eq!((pc.maximum, pc.average, pc.median), (6, 4.5, 4.5));
        pc.record(1);
        pc.record(2);
        assert_eq!(pc.counts, vec![3, 6, 1, 2]);
        assert_eq!((pc.maximum, pc.average, pc.median), (6, 3.0, 2.5));
    }
}
