//! プロセス版の調停役
//!
//! 状態表・箸・待ち合わせ用セマフォをすべて 1 枚の共有メモリに置く。
//! fork した子プロセスはこのメモリを親と共有したまま哲学者として動く。
//! 許可はテーブル側が大域セマフォの中で決めて記録してから、その席の
//! セマフォを post して起こす (起こす相手を絞る)。

mod segment;
mod semaphore;

use std::{
    alloc::{Layout, LayoutError},
    iter, slice,
    sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering},
};

use log::{debug, trace};

pub use segment::Segment;
pub use semaphore::ProcessSemaphore;

use crate::{
    arbiter::{Admission, Arbiter, Statistics},
    error::{Error, Result},
    seat::{Ring, SeatState},
};

const NO_OWNER: usize = usize::MAX;

#[cfg(test)]
thread_local! {
    // このスレッドで destroy したセマフォの数
    static DESTROYED: std::cell::Cell<usize> = std::cell::Cell::new(0);
}

// 共有メモリの先頭
#[repr(C)]
struct Header {
    terminating: AtomicBool,
    served: AtomicU64,
    global: ProcessSemaphore,
}

// Header の後ろに席の数だけ並べる配列の位置
#[derive(Debug, Clone, Copy)]
struct Offsets {
    size: usize,
    wake: usize,
    forks: usize,
    owners: usize,
    states: usize,
    meals: usize,
}

impl Offsets {
    fn new(seats: usize) -> std::result::Result<Self, LayoutError> {
        let layout = Layout::new::<Header>();
        let (layout, wake) = layout.extend(Layout::array::<ProcessSemaphore>(seats)?)?;
        let (layout, forks) = layout.extend(Layout::array::<ProcessSemaphore>(seats)?)?;
        let (layout, owners) = layout.extend(Layout::array::<AtomicUsize>(seats)?)?;
        let (layout, states) = layout.extend(Layout::array::<AtomicU8>(seats)?)?;
        let (layout, meals) = layout.extend(Layout::array::<AtomicU64>(seats)?)?;
        Ok(Offsets {
            size: layout.pad_to_align().size(),
            wake,
            forks,
            owners,
            states,
            meals,
        })
    }
}

/// 共有メモリとセマフォで作ったテーブル。スレッド間でもプロセス間でも使える
pub struct IpcTable {
    ring: Ring,
    offsets: Offsets,
    // 初期化が済んだセマフォの数 (大域、起床用、箸の順)
    initialized: usize,
    segment: Segment,
}

impl IpcTable {
    pub fn new(seats: usize) -> Result<Self> {
        IpcTable::with_init(seats, |sem, value| unsafe { sem.init(value) })
    }

    // セマフォの初期化だけ差し替えられる
    fn with_init<F>(seats: usize, mut init: F) -> Result<Self>
    where
        F: FnMut(&ProcessSemaphore, u32) -> nix::Result<()>,
    {
        let ring = Ring::new(seats)?;
        let offsets = Offsets::new(seats).map_err(|_| Error::SegmentTooLarge { seats })?;
        let segment = Segment::map(offsets.size).map_err(|source| Error::Init {
            what: "shared segment",
            source,
        })?;

        let mut table = IpcTable {
            ring,
            offsets,
            initialized: 0,
            segment,
        };

        // 大域セマフォは 1、起床用は 0、箸は 1
        let values = iter::once(1)
            .chain(iter::repeat(0).take(seats))
            .chain(iter::repeat(1).take(seats));
        let mut initialized = 0;
        let result = table
            .semaphores()
            .zip(values)
            .try_for_each(|(sem, value)| -> nix::Result<()> {
                init(sem, value)?;
                initialized += 1;
                Ok(())
            });
        // 失敗しても、ここまで作った分は drop で解放される
        table.initialized = initialized;
        result.map_err(|source| Error::Init {
            what: "semaphore",
            source,
        })?;

        for owner in table.owners() {
            owner.store(NO_OWNER, Ordering::Relaxed);
        }

        debug!(
            "shared table for {} philosophers mapped ({} bytes)",
            seats,
            table.segment.len()
        );
        Ok(table)
    }

    fn header(&self) -> &Header {
        unsafe { &*self.segment.at::<Header>(0) }
    }

    fn array<T>(&self, offset: usize) -> &[T] {
        unsafe { slice::from_raw_parts(self.segment.at::<T>(offset), self.ring.seats()) }
    }

    fn wake(&self) -> &[ProcessSemaphore] {
        self.array(self.offsets.wake)
    }

    fn forks(&self) -> &[ProcessSemaphore] {
        self.array(self.offsets.forks)
    }

    fn owners(&self) -> &[AtomicUsize] {
        self.array(self.offsets.owners)
    }

    fn seat_states(&self) -> &[AtomicU8] {
        self.array(self.offsets.states)
    }

    fn meals(&self) -> &[AtomicU64] {
        self.array(self.offsets.meals)
    }

    fn semaphores(&self) -> impl Iterator<Item = &ProcessSemaphore> {
        iter::once(&self.header().global)
            .chain(self.wake())
            .chain(self.forks())
    }

    /// 箸 id の持ち主
    pub fn fork_owner(&self, id: usize) -> Option<usize> {
        match self.owners()[id].load(Ordering::SeqCst) {
            NO_OWNER => None,
            seat => Some(seat),
        }
    }

    // 以下、大域セマフォを取ってから呼ぶ

    fn state(&self, seat: usize) -> SeatState {
        SeatState::from(self.seat_states()[seat].load(Ordering::Relaxed))
    }

    fn set_state(&self, seat: usize, state: SeatState) {
        self.seat_states()[seat].store(state as u8, Ordering::Relaxed);
        if cfg!(debug_assertions) {
            let states = self.snapshot();
            assert!(
                self.ring.is_independent(&states),
                "neighbours eating at once: {:?}",
                states
            );
        }
    }

    fn snapshot(&self) -> Vec<SeatState> {
        (0..self.ring.seats()).map(|i| self.state(i)).collect()
    }

    // 食べてよければ Eating を記録する。起こすのは呼び出し側
    fn authorize(&self, seat: usize) -> bool {
        if self.ring.admit(seat, |i| self.state(i)) {
            self.set_state(seat, SeatState::Eating);
            debug!("philosopher {} may eat", seat);
            true
        } else {
            false
        }
    }

    fn take_fork(&self, id: usize, seat: usize) {
        self.forks()[id].wait();
        let prev = self.owners()[id].swap(seat, Ordering::SeqCst);
        assert_eq!(
            prev, NO_OWNER,
            "fork {} taken by philosopher {} while held by {}",
            id, seat, prev
        );
        trace!("fork {} taken by philosopher {}", id, seat);
    }

    fn put_fork(&self, id: usize, seat: usize) {
        let prev = self.owners()[id].swap(NO_OWNER, Ordering::SeqCst);
        assert_eq!(
            prev, seat,
            "fork {} put down by philosopher {} but held by {}",
            id, seat, prev
        );
        self.forks()[id].post();
        trace!("fork {} put down by philosopher {}", id, seat);
    }
}

impl Arbiter for IpcTable {
    fn ring(&self) -> Ring {
        self.ring
    }

    fn request(&self, seat: usize) -> Admission {
        if self.is_terminating() {
            return Admission::Cancelled;
        }

        let global = &self.header().global;
        global.wait();
        self.set_state(seat, SeatState::Hungry);
        debug!(
            "philosopher {} asks for forks {} and {}",
            seat,
            self.ring.left_fork(seat),
            self.ring.right_fork(seat)
        );
        if self.authorize(seat) {
            // 自分で post しておけば下の wait で止まらない
            self.wake()[seat].post();
        } else {
            debug!("philosopher {} waits for a neighbour to finish", seat);
        }
        global.post();

        self.wake()[seat].wait();
        if self.is_terminating() {
            debug!("philosopher {} woke up to a shutdown", seat);
            return Admission::Cancelled;
        }

        for id in self.ring.forks(seat) {
            self.take_fork(id, seat);
        }

        global.wait();
        self.meals()[seat].fetch_add(1, Ordering::Relaxed);
        global.post();

        Admission::Granted
    }

    fn release(&self, seat: usize) {
        // 箸は先に返す
        for id in self.ring.forks(seat).rev() {
            self.put_fork(id, seat);
        }

        let global = &self.header().global;
        global.wait();
        self.set_state(seat, SeatState::Thinking);
        for neighbor in [self.ring.left_neighbor(seat), self.ring.right_neighbor(seat)] {
            if self.authorize(neighbor) {
                debug!("philosopher {} wakes philosopher {}", seat, neighbor);
                self.wake()[neighbor].post();
            }
        }
        self.header().served.fetch_add(1, Ordering::Relaxed);
        global.post();
    }

    fn shutdown(&self) {
        if self.header().terminating.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("shared table shutting down");
        // 待っているかもしれない全員を 1 回ずつ起こす
        for sem in self.wake() {
            sem.post();
        }
    }

    fn is_terminating(&self) -> bool {
        self.header().terminating.load(Ordering::SeqCst)
    }

    fn states(&self) -> Vec<SeatState> {
        let global = &self.header().global;
        global.wait();
        let states = self.snapshot();
        global.post();
        states
    }

    fn statistics(&self) -> Statistics {
        let global = &self.header().global;
        global.wait();
        let stats = Statistics {
            meals: self
                .meals()
                .iter()
                .map(|n| n.load(Ordering::Relaxed))
                .collect(),
            served: self.header().served.load(Ordering::Relaxed),
        };
        global.post();
        stats
    }
}

impl Drop for IpcTable {
    fn drop(&mut self) {
        for sem in self.semaphores().take(self.initialized) {
            unsafe { sem.destroy() };
            #[cfg(test)]
            DESTROYED.with(|n| n.set(n.get() + 1));
        }
        debug!("shared table released");
        // segment の drop で munmap
    }
}
