use std::time::Duration;

/// What a training run went through.
#[derive(Debug, Default, Clone)]
pub struct TrainMetrics {
    pub steps: u64,
    pub sequences: u64,
    pub skipped: u64,
    pub first_loss: Option<f32>,
    pub last_loss: Option<f32>,
    pub compute_time: Duration,
    pub wait_time: Duration,
    pub elapsed: Duration,
}

impl TrainMetrics {
    #[inline]
    pub fn bump_step(&mut self, total_loss: f32) {
        self.steps += 1;
        self.first_loss.get_or_insert(total_loss);
        self.last_loss = Some(total_loss);
    }

    #[inline]
    pub fn add_sequences(&mut self, n: usize) {
        self.sequences += n as u64;
    }

    #[inline]
    pub fn bump_skipped(&mut self) {
        self.skipped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_and_last_loss() {
        let mut metrics = TrainMetrics::default();
        assert!(metrics.first_loss.is_none());

        metrics.bump_step(3.);
        metrics.bump_step(2.);
        metrics.bump_step(1.);

        assert_eq!(metrics.steps, 3);
        assert_eq!(metrics.first_loss, Some(3.));
        assert_eq!(metrics.last_loss, Some(1.));
    }
}
