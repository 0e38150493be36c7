use std::time::Duration;

use crate::config::ConfigError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Stage { duration, target }
    }
}

/// Ordered ramping stages. Each stage moves the VU count linearly from the
/// previous stage's target (or `start_vus`) to its own target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schedule {
    start_vus: u64,
    stages: Vec<Stage>,
}

impl Schedule {
    pub fn new(start_vus: u64, stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        if let Some(i) = stages.iter().position(|s| s.duration.is_zero()) {
            return Err(ConfigError::ZeroDuration(i));
        }
        Ok(Schedule { start_vus, stages })
    }

    /// 60 minutes: warm up, steady, load, spike, recover.
    pub fn reference() -> Self {
        let m = |n: u64| Duration::from_secs(n * 60);
        Schedule {
            start_vus: 0,
            stages: vec![
                Stage::new(m(5), 10),
                Stage::new(m(20), 10),
                Stage::new(m(5), 30),
                Stage::new(m(15), 30),
                Stage::new(m(2), 50),
                Stage::new(m(3), 50),
                Stage::new(m(5), 10),
                Stage::new(m(5), 10),
            ],
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_vus(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .fold(self.start_vus, u64::max)
    }

    /// Target VU count at `elapsed`. Partial VUs round up, so a ramp away
    /// from zero starts its first VU as soon as the ramp begins. Past the end
    /// the last target holds.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let mut from = self.start_vus;
        let mut offset = Duration::ZERO;
        for stage in &self.stages {
            if elapsed < offset + stage.duration {
                let frac = (elapsed - offset).as_secs_f64() / stage.duration.as_secs_f64();
                let value = from as f64 + (stage.target as f64 - from as f64) * frac;
                return value.ceil() as u64;
            }
            offset += stage.duration;
            from = stage.target;
        }
        from
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn reference_schedule_shape() {
        let s = Schedule::reference();
        assert_eq!(s.total_duration(), secs(3600));
        assert_eq!(s.max_vus(), 50);
        assert_eq!(s.stages().len(), 8);
    }

    #[test]
    fn ramps_and_holds() {
        let s = Schedule::reference();
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(secs(1)), 1);
        assert_eq!(s.target_at(secs(150)), 5);
        assert_eq!(s.target_at(secs(300)), 10);
        assert_eq!(s.target_at(secs(20 * 60)), 10);
        // halfway through the 10 -> 30 ramp
        assert_eq!(s.target_at(secs(27 * 60 + 30)), 20);
        assert_eq!(s.target_at(secs(45 * 60)), 30);
        assert_eq!(s.target_at(secs(46 * 60)), 40);
        assert_eq!(s.target_at(secs(48 * 60)), 50);
        // ramp down 50 -> 10 over 5 minutes
        assert_eq!(s.target_at(secs(52 * 60) + Duration::from_millis(30_000)), 30);
        assert_eq!(s.target_at(secs(59 * 60)), 10);
        assert_eq!(s.target_at(secs(4000)), 10);
    }

    #[test]
    fn single_stage_reaches_one_vu_immediately() {
        let s = Schedule::new(0, vec![Stage::new(secs(10), 1)]).unwrap();
        assert_eq!(s.target_at(Duration::from_millis(1)), 1);
        assert_eq!(s.target_at(secs(9)), 1);
        assert_eq!(s.max_vus(), 1);
    }

    #[test]
    fn rejects_empty_and_zero_length() {
        assert!(matches!(
            Schedule::new(0, vec![]),
            Err(ConfigError::EmptySchedule)
        ));
        assert!(matches!(
            Schedule::new(0, vec![Stage::new(secs(5), 1), Stage::new(Duration::ZERO, 2)]),
            Err(ConfigError::ZeroDuration(1))
        ));
    }
}
