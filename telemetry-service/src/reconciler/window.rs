use std::collections::VecDeque;

use meter_client::ChartPoint;

/// Bounded, timestamp-ordered window of chart points. When full, the oldest
/// point by timestamp is evicted, which may be the point just inserted.
#[derive(Debug, Clone)]
pub struct ChartWindow {
    points: VecDeque<ChartPoint>,
    capacity: usize,
    dedupe_by_timestamp: bool,
}

impl ChartWindow {
    pub fn new(capacity: usize, dedupe_by_timestamp: bool) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity + 1),
            capacity,
            dedupe_by_timestamp,
        }
    }

    /// Insert at the sorted position; equal timestamps keep arrival order.
    /// Returns whether the point is retained.
    pub fn insert(&mut self, point: ChartPoint) -> bool {
        if self.dedupe_by_timestamp && self.points.iter().any(|p| p.ts == point.ts) {
            return false;
        }

        let idx = self.points.partition_point(|p| p.ts <= point.ts);
        self.points.insert(idx, point);

        if self.points.len() > self.capacity {
            // Index 0 means the new point was strictly older than everything held.
            self.points.pop_front();
            return idx != 0;
        }
        true
    }

    /// Discard the current contents and rebuild from `points`, keeping the
    /// most recent `capacity` of them.
    pub fn replace(&mut self, points: impl IntoIterator<Item = ChartPoint>) {
        self.points.clear();
        for point in points {
            self.insert(point);
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<ChartPoint> {
        self.points.iter().copied().collect()
    }
}
