/// Weighted running average of a scalar.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AverageMeter {
    val: f64,
    sum: f64,
    count: f64,
}

impl AverageMeter {
    pub fn update(&mut self, val: f64, weight: f64) {
        self.val = val;
        self.sum += val * weight;
        self.count += weight;
    }

    pub fn value(&self) -> f64 {
        self.val
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    pub fn average(&self) -> f64 {
        if self.count > 0.0 {
            self.sum / self.count
        } else {
            0.0
        }
    }
}

/// Element-wise running sums of a fixed-length vector, one slot per class.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMeter {
    sum: Vec<f64>,
    count: usize,
}

impl ArrayMeter {
    pub fn new(len: usize) -> Self {
        Self {
            sum: vec![0.0; len],
            count: 0,
        }
    }

    /// Adds `val` slot by slot. Panics if the length differs from the meter's.
    pub fn update(&mut self, val: &[u64]) {
        assert_eq!(val.len(), self.sum.len(), "per-class vector length mismatch");
        self.sum
            .iter_mut()
            .zip(val)
            .for_each(|(s, v)| *s += *v as f64);
        self.count += 1;
    }

    pub fn sum(&self) -> &[f64] {
        &self.sum
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weighted_average() {
        let mut m = AverageMeter::default();
        m.update(1.0, 3.0);
        m.update(0.0, 1.0);
        assert_eq!(m.average(), 0.75);
        assert_eq!(m.value(), 0.0);
        assert_eq!(AverageMeter::default().average(), 0.0);
    }

    #[test]
    fn array_sums_per_slot() {
        let mut m = ArrayMeter::new(3);
        m.update(&[2, 0, 1]);
        m.update(&[1, 1, 0]);
        assert_eq!(m.sum(), &[3.0, 1.0, 1.0]);
        assert_eq!(m.count(), 2);
    }
}
