//! Wall-clock timing of pipeline stages.

use std::time::Instant;

/// Logs how long a stage took when it goes out of scope.
///
/// ```
/// use tab_core::timing::Timer;
///
/// let _timer = Timer::new("Pitch detection");
/// // ... work ...
/// // logs "Pitch detection completed in 0.0123s" here
/// ```
#[derive(Debug)]
pub struct Timer {
    name: String,
    start: Instant,
    reported: bool,
}

impl Timer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: Instant::now(),
            reported: false,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Restarts the clock.
    pub fn reset(&mut self) {
        self.start = Instant::now();
        self.reported = false;
    }

    /// Stops the timer, logs and returns the elapsed seconds.
    pub fn stop(mut self) -> f64 {
        self.report()
    }

    fn report(&mut self) -> f64 {
        let elapsed = self.elapsed_secs();
        if !self.reported {
            log::info!("{} completed in {:.4}s", self.name, elapsed);
            self.reported = true;
        }
        elapsed
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.report();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn stop_returns_elapsed_time() {
        let timer = Timer::new("sleep");
        std::thread::sleep(Duration::from_millis(20));
        let elapsed = timer.stop();
        assert!(elapsed >= 0.02, "{}", elapsed);
    }

    #[test]
    fn reset_restarts_the_clock() {
        let mut timer = Timer::new("reset");
        std::thread::sleep(Duration::from_millis(30));
        timer.reset();
        assert!(timer.elapsed_secs() < 0.03);
    }
}
