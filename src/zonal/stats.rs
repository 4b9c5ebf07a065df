use serde::Serialize;

/// Sum and count of the valid values covered by one zone.
///
/// Both come from a single pass over the cleaned values, so `count` is always
/// the number of values that contributed to `sum`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ZonalStats {
    pub sum: f64,
    pub count: u64,
}

impl ZonalStats {
    #[inline]
    pub fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    pub fn merge(&mut self, other: ZonalStats) {
        self.sum += other.sum;
        self.count += other.count;
    }

    /// Mean of the valid values; `None` when nothing was counted.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

impl FromIterator<Option<f64>> for ZonalStats {
    fn from_iter<I: IntoIterator<Item = Option<f64>>>(iter: I) -> Self {
        let mut stats = Self::default();
        iter.into_iter().for_each(|v| stats.push(v));
        stats
    }
}
