use std::time::Duration;

/// Accumulates wall-clock durations, optionally split into several stages.
///
/// Slot `i` sums the durations of stage `i`; every call counts one
/// measurement, so `n()` is the number of complete runs when all stages are
/// pushed once per run.
#[derive(Debug, Default, Clone)]
pub struct TimeCalc {
    n: usize,
    duration: Vec<Duration>,
}

impl TimeCalc {
    pub fn total(&self) -> Duration {
        self.duration.iter().sum::<Duration>()
    }

    pub fn n(&self) -> usize {
        if self.duration.is_empty() {
            return 0;
        }
        self.n / self.duration.len()
    }

    pub fn avg(&self) -> Duration {
        match self.n() {
            0 => Duration::ZERO,
            n => self.total() / n as u32,
        }
    }

    pub fn avg_i(&self, i: usize) -> Duration {
        match (self.duration.get(i), self.n()) {
            (Some(d), n) if n > 0 => *d / n as u32,
            _ => Duration::ZERO,
        }
    }

    /// Single-stage shorthand for `add_or_push(0, x)`.
    pub fn add(&mut self, x: Duration) {
        self.add_or_push(0, x);
    }

    pub fn add_or_push(&mut self, i: usize, x: Duration) {
        match self.duration.get_mut(i) {
            Some(elem) => *elem += x,
            None => {
                if i >= self.duration.len() {
                    self.duration.push(x)
                }
            }
        }
        self.n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_average_is_zero() {
        assert_eq!(TimeCalc::default().avg(), Duration::ZERO);
    }

    #[test]
    fn averages_single_stage() {
        let mut t = TimeCalc::default();
        t.add(Duration::from_millis(10));
        t.add(Duration::from_millis(30));
        assert_eq!(t.n(), 2);
        assert_eq!(t.avg(), Duration::from_millis(20));
    }

    #[test]
    fn averages_per_stage() {
        let mut t = TimeCalc::default();
        for _ in 0..2 {
            t.add_or_push(0, Duration::from_millis(1));
            t.add_or_push(1, Duration::from_millis(4));
        }
        assert_eq!(t.n(), 2);
        assert_eq!(t.avg_i(1), Duration::from_millis(4));
        assert_eq!(t.avg(), Duration::from_millis(5));
    }
}
