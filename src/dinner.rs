use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};

use clap::ValueEnum;
use log::{info, warn};
use nix::{
    sys::wait::{waitpid, WaitStatus},
    unistd::{fork, ForkResult, Pid},
};

use crate::{
    arbiter::{Arbiter, Statistics},
    error::{Error, Result},
    ipc::IpcTable,
    monitor::Monitor,
    philosopher::{Philosopher, Timing},
    seat::{Ring, SeatState},
};

/// 哲学者をスレッドで動かすか、プロセスで動かすか
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    // モニタ (Mutex + Condvar)、全員を起こす
    Threads,
    // 共有メモリ + セマフォ、食べられる隣人だけ起こす
    Processes,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Threads => f.write_str("threads"),
            Variant::Processes => f.write_str("processes"),
        }
    }
}

enum Actor {
    Thread(JoinHandle<u64>),
    Process(Pid),
}

/// テーブルと、そこに座った哲学者たち
pub struct Dinner {
    variant: Variant,
    arbiter: Arc<dyn Arbiter>,
    seated: Vec<bool>,
    actors: Vec<(usize, Actor)>,
}

impl Dinner {
    pub fn new(variant: Variant, seats: usize) -> Result<Self> {
        let arbiter: Arc<dyn Arbiter> = match variant {
            Variant::Threads => Arc::new(Monitor::new(seats)?),
            Variant::Processes => Arc::new(IpcTable::new(seats)?),
        };
        info!("table for {} philosophers set ({})", seats, variant);
        Ok(Dinner {
            variant,
            arbiter,
            seated: vec![false; seats],
            actors: Vec::new(),
        })
    }

    pub fn threads(seats: usize) -> Result<Self> {
        Dinner::new(Variant::Threads, seats)
    }

    pub fn processes(seats: usize) -> Result<Self> {
        Dinner::new(Variant::Processes, seats)
    }

    pub fn ring(&self) -> Ring {
        self.arbiter.ring()
    }

    pub fn arbiter(&self) -> &Arc<dyn Arbiter> {
        &self.arbiter
    }

    /// 席 seat に哲学者を 1 人座らせて動かす
    pub fn spawn(&mut self, seat: usize, timing: Timing) -> Result<()> {
        self.ring().check(seat)?;
        if self.seated[seat] {
            return Err(Error::AlreadySeated { seat });
        }

        let philosopher = Philosopher::new(seat, self.arbiter.clone(), timing);
        let actor = match self.variant {
            Variant::Threads => spawn_thread(philosopher)?,
            Variant::Processes => spawn_process(philosopher)?,
        };

        self.seated[seat] = true;
        self.actors.push((seat, actor));
        Ok(())
    }

    /// 空いている席すべてに座らせる。途中で失敗したらそこで止める
    pub fn spawn_all(&mut self, timing: Timing) -> Result<()> {
        for seat in 0..self.ring().seats() {
            if !self.seated[seat] {
                self.spawn(seat, timing)?;
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.arbiter.shutdown();
    }

    /// 全員が席を立つまで待つ。失敗した哲学者がいても全員を待ってから最初のエラーを返す
    pub fn wait(&mut self) -> Result<()> {
        let mut result = Ok(());
        for (seat, actor) in self.actors.drain(..) {
            let joined = match actor {
                Actor::Thread(t) => match t.join() {
                    Ok(meals) => {
                        info!("philosopher {} finished after {} meals", seat, meals);
                        Ok(())
                    }
                    Err(_) => Err(Error::Join { seat }),
                },
                Actor::Process(pid) => match waitpid(pid, None) {
                    Ok(WaitStatus::Exited(_, 0)) => {
                        info!("philosopher {} (pid {}) finished", seat, pid);
                        Ok(())
                    }
                    Ok(status) => {
                        warn!("philosopher {} (pid {}) ended with {:?}", seat, pid, status);
                        Err(Error::Join { seat })
                    }
                    Err(e) => {
                        warn!("waitpid for philosopher {} failed: {}", seat, e);
                        Err(Error::Join { seat })
                    }
                },
            };
            if result.is_ok() {
                result = joined;
            }
        }
        result
    }

    pub fn is_running(&self) -> bool {
        !self.actors.is_empty()
    }

    /// wait の後に読むこと
    pub fn statistics(&self) -> Statistics {
        self.arbiter.statistics()
    }

    pub fn states(&self) -> Vec<SeatState> {
        self.arbiter.states()
    }

    /// 終了させて待ち、共有資源を解放する
    pub fn dispose(mut self) -> Result<()> {
        self.shutdown();
        self.wait()
        // self の drop で arbiter も解放される
    }
}

impl Drop for Dinner {
    fn drop(&mut self) {
        if self.is_running() {
            self.shutdown();
            if let Err(e) = self.wait() {
                warn!("{}", e);
            }
        }
    }
}

fn spawn_thread(mut philosopher: Philosopher) -> Result<Actor> {
    let seat = philosopher.seat();
    let t = thread::Builder::new()
        .name(format!("philosopher-{seat}"))
        .spawn(move || philosopher.dine())
        .map_err(|source| Error::SpawnThread { seat, source })?;
    Ok(Actor::Thread(t))
}

fn spawn_process(mut philosopher: Philosopher) -> Result<Actor> {
    let seat = philosopher.seat();
    // Safety: 子プロセスは哲学者のループを回して _exit するだけで、親のロックには触れない。
    // 呼び出し側は他のスレッドを起こす前に fork すること
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            info!("philosopher {} started with pid {}", seat, child);
            Ok(Actor::Process(child))
        }
        Ok(ForkResult::Child) => {
            // 子プロセスは親のコードへ戻らずに終わる
            let code = match panic::catch_unwind(AssertUnwindSafe(|| philosopher.dine())) {
                Ok(_) => 0,
                Err(_) => 101,
            };
            unsafe { libc::_exit(code) }
        }
        Err(source) => Err(Error::SpawnProcess { seat, source }),
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use test_log::test;

    use super::*;

    #[test]
    fn test_threads_run() {
        let mut dinner = Dinner::threads(5).unwrap();
        dinner.spawn_all(Timing::instant()).unwrap();
        assert!(dinner.is_running());

        let ring = dinner.ring();
        for _ in 0..100 {
            let states = dinner.states();
            assert!(ring.is_independent(&states), "{states:?}");
            thread::sleep(Duration::from_millis(1));
        }

        dinner.shutdown();
        dinner.wait().unwrap();
        assert!(!dinner.is_running());

        let stats = dinner.statistics();
        assert_eq!(stats.meals.len(), 5);
        assert!(stats.total() > 0);
        assert_eq!(stats.total(), stats.served);
        dinner.dispose().unwrap();
    }

    #[test]
    fn test_termination_for_any_size() {
        for variant in [Variant::Threads, Variant::Processes] {
            for seats in 1..=7 {
                let mut dinner = Dinner::new(variant, seats).unwrap();
                // プロセス版もスレッドで動かす (テストハーネス内で fork しない)
                for seat in 0..seats {
                    let mut p = Philosopher::new(seat, dinner.arbiter().clone(), Timing::instant());
                    dinner.seated[seat] = true;
                    dinner
                        .actors
                        .push((seat, Actor::Thread(thread::spawn(move || p.dine()))));
                }
                thread::sleep(Duration::from_millis(5));
                dinner.shutdown();
                dinner.wait().unwrap();

                let stats = dinner.statistics();
                assert_eq!(stats.total(), stats.served, "{variant} with {seats} seats");
            }
        }
    }

    #[test]
    fn test_invalid_seats() {
        assert!(matches!(Dinner::threads(0), Err(Error::InvalidSeatCount)));
        assert!(matches!(Dinner::processes(0), Err(Error::InvalidSeatCount)));

        let mut dinner = Dinner::threads(2).unwrap();
        assert!(matches!(
            dinner.spawn(2, Timing::instant()),
            Err(Error::NoSuchSeat { seat: 2, seats: 2 })
        ));
        dinner.spawn(1, Timing::instant()).unwrap();
        assert!(matches!(
            dinner.spawn(1, Timing::instant()),
            Err(Error::AlreadySeated { seat: 1 })
        ));
        // 残りの席だけ埋まる
        dinner.spawn_all(Timing::instant()).unwrap();
        assert_eq!(dinner.actors.len(), 2);
        dinner.dispose().unwrap();
    }

    #[test]
    fn test_drop_stops_actors() {
        let arbiter;
        {
            let mut dinner = Dinner::threads(3).unwrap();
            dinner.spawn_all(Timing::instant()).unwrap();
            arbiter = dinner.arbiter().clone();
        }
        assert!(arbiter.is_terminating());
        let stats = arbiter.statistics();
        assert_eq!(stats.total(), stats.served);
    }
}
