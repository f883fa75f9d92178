use std::sync::{
    atomic::{AtomicBool, Ordering},
    Condvar, Mutex,
};

use log::debug;

use crate::{
    arbiter::{Admission, Arbiter, Statistics},
    error::Result,
    fork::Fork,
    seat::{Ring, SeatState, SeatTable},
};

/// スレッド版の調停役。Mutex + Condvar のモニタで、release のたびに全員を起こす
///
/// 起こされた側は自分の条件を見直すだけなので、誰を起こすべきかは考えない。
#[derive(Debug)]
pub struct Monitor {
    ring: Ring,
    table: Mutex<SeatTable>,
    cond: Condvar,
    forks: Vec<Fork>,
    // 書き込みはロックの中で行う。哲学者側のポーリングはロックなしで読む
    terminating: AtomicBool,
}

impl Monitor {
    pub fn new(seats: usize) -> Result<Self> {
        let ring = Ring::new(seats)?;
        Ok(Monitor {
            ring,
            table: Mutex::new(SeatTable::new(ring)),
            cond: Condvar::new(),
            forks: (0..seats).map(Fork::new).collect(),
            terminating: AtomicBool::new(false),
        })
    }

    pub fn fork(&self, id: usize) -> &Fork {
        &self.forks[id]
    }
}

impl Arbiter for Monitor {
    fn ring(&self) -> Ring {
        self.ring
    }

    fn request(&self, seat: usize) -> Admission {
        let mut table = self.table.lock().unwrap();
        if self.is_terminating() {
            return Admission::Cancelled;
        }

        table.set(seat, SeatState::Hungry);
        debug!(
            "philosopher {} asks for forks {} and {}",
            seat,
            self.ring.left_fork(seat),
            self.ring.right_fork(seat)
        );

        // 起こされたら条件を見直す (見逃しや偽の起床があってもよい)
        while !table.admit(seat) && !self.is_terminating() {
            table = self.cond.wait(table).unwrap();
        }

        if self.is_terminating() {
            debug!("philosopher {} gave up waiting: shutting down", seat);
            return Admission::Cancelled;
        }

        table.set(seat, SeatState::Eating);
        table.record_meal(seat);
        drop(table);

        // 許可が出た時点で両隣は食事中でないので、箸は空いているはず
        for id in self.ring.forks(seat) {
            self.forks[id].take(seat);
        }
        debug!("philosopher {} took the forks", seat);

        Admission::Granted
    }

    fn release(&self, seat: usize) {
        let mut table = self.table.lock().unwrap();
        table.set(seat, SeatState::Thinking);
        for id in self.ring.forks(seat).rev() {
            self.forks[id].put(seat);
        }
        table.record_served();

        // 誰が食べられるようになったかは各自が判断する
        self.cond.notify_all();
        debug!("philosopher {} put the forks down", seat);
    }

    fn shutdown(&self) {
        let _table = self.table.lock().unwrap();
        if !self.terminating.swap(true, Ordering::SeqCst) {
            debug!("monitor shutting down");
        }
        self.cond.notify_all();
    }

    fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    fn states(&self) -> Vec<SeatState> {
        self.table.lock().unwrap().states().to_vec()
    }

    fn statistics(&self) -> Statistics {
        let table = self.table.lock().unwrap();
        Statistics {
            meals: table.meals().to_vec(),
            served: table.served(),
        }
    }
}
