//! Fixed-capacity latency history.

/// Ring of the most recent latency samples, in milliseconds.
///
/// Slots are allocated once; writes overwrite the oldest sample once the
/// ring is full.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    slots: Box<[f64]>,
    cursor: usize,
    len: usize,
}

impl LatencyWindow {
    pub fn new(capacity: u16) -> Self {
        let capacity = usize::from(capacity.max(1));
        Self {
            slots: vec![0.0; capacity].into_boxed_slice(),
            cursor: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, latency: f64) {
        self.slots[self.cursor] = latency;
        self.cursor = (self.cursor + 1) % self.slots.len();
        if self.len < self.slots.len() {
            self.len += 1;
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Populated samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + Clone + '_ {
        let start = if self.len < self.slots.len() { 0 } else { self.cursor };
        (0..self.len).map(move |i| self.slots[(start + i) % self.slots.len()])
    }

    /// Aggregate the populated samples.
    pub fn summarize(&self) -> WindowSummary {
        WindowSummary::from_samples(self.iter())
    }
}

/// Population statistics over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindowSummary {
    pub samples: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub skewness: f64,
}

impl WindowSummary {
    /// Compute min/max/mean, population standard deviation and population
    /// skewness. Dispersion measures are 0 below two samples or when every
    /// sample is equal.
    pub fn from_samples<I>(samples: I) -> Self
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Clone,
    {
        let samples = samples.into_iter();

        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for x in samples.clone() {
            count += 1;
            sum += x;
            min = min.min(x);
            max = max.max(x);
        }

        if count == 0 {
            return Self::default();
        }

        let n = count as f64;
        let mean = sum / n;

        let mut summary = Self {
            samples: count,
            min,
            max,
            mean,
            std_dev: 0.0,
            skewness: 0.0,
        };

        if count < 2 {
            return summary;
        }

        let (m2, m3) = samples.fold((0.0, 0.0), |(m2, m3), x| {
            let d = x - mean;
            (m2 + d * d, m3 + d * d * d)
        });
        let variance = m2 / n;
        let third = m3 / n;

        summary.std_dev = variance.sqrt();
        if variance > 0.0 {
            summary.skewness = third / variance.powf(1.5);
        }
        summary
    }
}
