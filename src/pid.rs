// Single-axis PID used to smooth velocity setpoints before they reach the kinematics
//
// The drive loop keeps one filter per axis (vx, vy, omega) and a running value
// for each. Every tick the running value moves by the filter output instead of
// jumping straight to the commanded setpoint.

use crate::config::PidGains;

#[derive(Debug, Clone)]
pub struct SetpointFilter {
    gains: PidGains,
    integral: f64,
    previous_error: f64,
}

impl SetpointFilter {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            previous_error: 0.0,
        }
    }

    /// Incremental correction that moves `measured` toward `setpoint`
    pub fn update(&mut self, setpoint: f64, measured: f64) -> f64 {
        let PidGains { kp, ki, kd, dt } = self.gains;
        let error = setpoint - measured;

        self.integral += error * dt;
        let derivative = (error - self.previous_error) / dt;
        self.previous_error = error;

        kp * error + ki * self.integral + kd * derivative
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
    }
}

/// A filter together with the value it has reached so far
#[derive(Debug, Clone)]
pub struct FilteredAxis {
    filter: SetpointFilter,
    value: f64,
}

impl FilteredAxis {
    pub fn new(gains: PidGains) -> Self {
        Self {
            filter: SetpointFilter::new(gains),
            value: 0.0,
        }
    }

    /// Advance one tick toward `setpoint` and return the new running value
    pub fn step(&mut self, setpoint: f64) -> f64 {
        self.value += self.filter.update(setpoint, self.value);
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update() {
        let mut filter = SetpointFilter::new(PidGains::default());
        // 0.2*100 + 0.01*100 + 0.01*100
        let output = filter.update(100.0, 0.0);
        assert!((output - 22.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut filter = SetpointFilter::new(PidGains::default());
        let first = filter.update(100.0, 0.0);
        filter.update(100.0, 50.0);
        filter.reset();
        assert!((filter.update(100.0, 0.0) - first).abs() < 1e-9);
    }

    #[test]
    fn test_running_value_converges() {
        let mut axis = FilteredAxis::new(PidGains::default());
        let mut previous_gap = 100.0f64;

        for step in 0..9 {
            let value = axis.step(100.0);
            let gap = (100.0 - value).abs();
            assert!(
                gap < previous_gap,
                "step {}: gap {} did not shrink from {}",
                step,
                gap,
                previous_gap
            );
            previous_gap = gap;
        }

        // Stays bounded near the setpoint afterwards
        for _ in 0..200 {
            let value = axis.step(100.0);
            assert!((100.0 - value).abs() < 25.0);
        }
        assert!((100.0 - axis.value()).abs() < 1.0);
    }
}
