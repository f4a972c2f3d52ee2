use std::time::Duration;

/// Stepped reconnect delays; sticks at the last step until reset.
pub(crate) struct Backoff {
    schedule: Vec<Duration>,
    index: usize,
}

impl Backoff {
    pub(crate) fn new(schedule: Vec<Duration>) -> Self {
        Self { schedule, index: 0 }
    }

    /// 1s, 2s, 5s, 10s, 30s.
    pub(crate) fn realtime() -> Self {
        Self::new(
            [1, 2, 5, 10, 30]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
        )
    }

    pub(crate) fn on_failure(&mut self) -> Duration {
        let delay = self
            .schedule
            .get(self.index)
            .cloned()
            .unwrap_or_else(|| Duration::from_secs(1));
        if self.index + 1 < self.schedule.len() {
            self.index += 1;
        }
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.index = 0;
    }
}
