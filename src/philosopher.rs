use std::{fmt, str::FromStr, sync::Arc, thread, time::Duration};

use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    arbiter::{Arbiter, Meal},
    error::Error,
};

/// 考える・食べる時間の範囲 (ミリ秒)。0..0 なら待たない
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delay {
    min_ms: u64,
    max_ms: u64,
}

impl Delay {
    pub const NONE: Delay = Delay {
        min_ms: 0,
        max_ms: 0,
    };

    pub fn millis(min_ms: u64, max_ms: u64) -> Self {
        assert!(min_ms <= max_ms);
        Delay { min_ms, max_ms }
    }

    fn pause(&self, rng: &mut impl Rng) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        let d = Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms));
        thread::sleep(d);
        d
    }
}

impl FromStr for Delay {
    type Err = Error;

    // "1000..3000" か "500" の形
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidDelay(s.to_string());
        let (min, max) = match s.split_once("..") {
            Some((min, max)) => (min.trim(), max.trim()),
            None => (s.trim(), s.trim()),
        };
        let min = min.parse().map_err(|_| invalid())?;
        let max = max.parse().map_err(|_| invalid())?;
        if min > max {
            return Err(invalid());
        }
        Ok(Delay::millis(min, max))
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min_ms, self.max_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub think: Delay,
    pub eat: Delay,
}

impl Timing {
    // テスト用。考えも食べもせずに回る
    pub fn instant() -> Self {
        Timing {
            think: Delay::NONE,
            eat: Delay::NONE,
        }
    }
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            think: Delay::millis(1000, 3000),
            eat: Delay::millis(1000, 3000),
        }
    }
}

/// 1 つの席を think → hungry → eat → think と回す
///
/// 終了フラグは各段階の間で確認する。止めるのは協調的にだけ。
pub struct Philosopher<A: Arbiter + ?Sized = dyn Arbiter> {
    seat: usize,
    arbiter: Arc<A>,
    timing: Timing,
    rng: StdRng,
    meals: u64,
}

impl<A: Arbiter + ?Sized> Philosopher<A> {
    pub fn new(seat: usize, arbiter: Arc<A>, timing: Timing) -> Self {
        Philosopher {
            seat,
            arbiter,
            timing,
            rng: StdRng::from_entropy(),
            meals: 0,
        }
    }

    pub fn seat(&self) -> usize {
        self.seat
    }

    /// 終了要求が出るまで食事を続け、自分が食べた回数を返す
    pub fn dine(&mut self) -> u64 {
        // Meal がこの Arc を借りている間も rng を使うため
        let arbiter = Arc::clone(&self.arbiter);
        info!("philosopher {} sits down", self.seat);

        while !arbiter.is_terminating() {
            self.think();
            if arbiter.is_terminating() {
                break;
            }

            debug!("philosopher {} is HUNGRY", self.seat);
            let meal = match Meal::serve(&*arbiter, self.seat) {
                Some(meal) => meal,
                None => break,
            };
            // ここから先で抜けても meal の drop で箸は返る
            if arbiter.is_terminating() {
                break;
            }

            self.eat();
            if arbiter.is_terminating() {
                break;
            }

            drop(meal);
            debug!("philosopher {} put the forks down", self.seat);
        }

        info!(
            "philosopher {} leaves the table after {} meals",
            self.seat, self.meals
        );
        self.meals
    }

    fn think(&mut self) {
        let d = self.timing.think.pause(&mut self.rng);
        debug!("philosopher {} was THINKING for {:?}", self.seat, d);
    }

    fn eat(&mut self) {
        self.meals += 1;
        let d = self.timing.eat.pause(&mut self.rng);
        debug!("philosopher {} was EATING for {:?}", self.seat, d);
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, thread, time::Duration};

    use test_log::test;

    use super::*;
    use crate::{arbiter::Admission, monitor::Monitor, seat::SeatState};

    #[test]
    fn test_parse_delay() {
        assert_eq!("1000..3000".parse::<Delay>().unwrap(), Delay::millis(1000, 3000));
        assert_eq!("5".parse::<Delay>().unwrap(), Delay::millis(5, 5));
        assert_eq!("0..0".parse::<Delay>().unwrap(), Delay::NONE);
        assert!("3..1".parse::<Delay>().is_err());
        assert!("a..b".parse::<Delay>().is_err());
        assert_eq!(Delay::millis(1, 3).to_string(), "1..3");
    }

    #[test]
    fn test_pause_within_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let d = Delay::millis(1, 3).pause(&mut rng);
            assert!(d >= Duration::from_millis(1) && d <= Duration::from_millis(3));
        }
        assert_eq!(Delay::NONE.pause(&mut rng), Duration::ZERO);
    }

    #[test]
    fn test_dine_until_shutdown() {
        let monitor = Arc::new(Monitor::new(3).unwrap());
        let mut v = Vec::new();
        for seat in 0..3 {
            let mut p = Philosopher::new(seat, monitor.clone(), Timing::instant());
            v.push(thread::spawn(move || p.dine()));
        }

        thread::sleep(Duration::from_millis(50));
        monitor.shutdown();

        let eaten: u64 = v.into_iter().map(|t| t.join().unwrap()).sum();
        let stats = monitor.statistics();
        assert!(stats.total() > 0);
        // 許可された回数と返した回数は一致する
        assert_eq!(stats.total(), stats.served);
        assert!(eaten <= stats.total());
        assert!(monitor.states().iter().all(|s| *s != SeatState::Eating));
    }

    #[test]
    fn test_no_meal_after_shutdown() {
        let monitor = Arc::new(Monitor::new(2).unwrap());
        monitor.shutdown();
        let mut p = Philosopher::new(1, monitor.clone(), Timing::instant());
        assert_eq!(p.dine(), 0);
        assert_eq!(monitor.request(0), Admission::Cancelled);
        assert_eq!(monitor.statistics().total(), 0);
    }

    #[test]
    fn test_dyn_arbiter() {
        let arbiter: Arc<dyn Arbiter> = Arc::new(Monitor::new(1).unwrap());
        let mut p: Philosopher = Philosopher::new(0, arbiter.clone(), Timing::instant());
        let t = thread::spawn(move || p.dine());
        thread::sleep(Duration::from_millis(50));
        arbiter.shutdown();
        let eaten = t.join().unwrap();
        let stats = arbiter.statistics();
        // 1 人なら待たされることはない
        assert!(eaten > 0);
        assert!(stats.total() >= eaten);
        assert_eq!(stats.total(), stats.served);
    }
}
