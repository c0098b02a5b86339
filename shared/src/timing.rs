use std::time::Duration;

/// Duration of one nominal 60 Hz frame; motion constants are expressed per nominal frame
pub const NOMINAL_FRAME: Duration = Duration::from_micros(16_666);

/// Scale factor that turns per-frame displacement into real-time displacement
pub fn frame_factor(elapsed: Duration) -> f32 {
    (elapsed.as_secs_f64() / NOMINAL_FRAME.as_secs_f64()) as f32
}

/// Returns true when a tick took long enough to count as an overrun
pub fn is_overrun(elapsed: Duration) -> bool {
    elapsed > NOMINAL_FRAME * 2
}

/// Repeating timer driven by elapsed time fed in from the tick loop
#[derive(Debug, Clone)]
pub struct Timer {
    period: Duration,
    accumulated: Duration,
}

impl Timer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            accumulated: Duration::ZERO,
        }
    }

    /// Advances the timer and reports whether it fired, resetting it if so.
    ///
    /// Fires at most once per call; leftover time past the period is dropped.
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        self.accumulated += elapsed;
        if self.accumulated >= self.period {
            self.accumulated = Duration::ZERO;
            true
        } else {
            false
        }
    }
}
