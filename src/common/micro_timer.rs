//! re-armable interval timer over microsecond clock readings

pub struct MicroTimer {
    last_time: u128,
    interval: u128,
}

impl MicroTimer {
    pub fn build(now: u128, interval: u128) -> MicroTimer {
        MicroTimer {
            last_time: now,
            interval: interval,
        }
    }
    pub fn set_interval(&mut self, interval: u128) -> () {
        self.interval = interval;
    }
    pub fn get_interval(&self) -> u128 {
        self.interval
    }
    /// true once a full interval has gone by since the last reset
    pub fn expired(&self, now: u128) -> bool {
        self.last_time + self.interval <= now
    }
    pub fn reset(&mut self, now: u128) {
        self.last_time = now;
    }
    pub fn since(&self, now: u128) -> u128 {
        now.saturating_sub(self.last_time)
    }
}

#[cfg(test)]
mod test_micro_timer {
    use super::*;

    #[test]
    fn test_expiration() {
        let mut now = 1000;
        let mut mt = MicroTimer::build(now, 100);
        assert!(!mt.expired(now));
        now += 99;
        assert!(!mt.expired(now));
        now += 1;
        assert!(mt.expired(now));
        mt.reset(now);
        assert!(!mt.expired(now));
        assert_eq!(mt.since(now + 10), 10);
        mt.set_interval(9);
        now += 10;
        assert!(mt.expired(now));
    }
    #[test]
    fn zero_interval_fires_immediately() {
        let mt = MicroTimer::build(5_000, 0);
        assert!(mt.expired(5_000));
        assert_eq!(mt.since(3), 0);
        assert_eq!(mt.get_interval(), 0);
    }
}
