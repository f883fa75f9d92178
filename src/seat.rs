use std::{fmt, iter};

use crate::error::{Error, Result};

// 哲学者(席)の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SeatState {
    Thinking = 0,
    Hungry = 1,
    Eating = 2,
}

impl From<u8> for SeatState {
    // 共有メモリ上では u8 で持つ
    fn from(v: u8) -> Self {
        match v {
            1 => SeatState::Hungry,
            2 => SeatState::Eating,
            _ => SeatState::Thinking,
        }
    }
}

impl fmt::Display for SeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SeatState::Thinking => "THINKING",
            SeatState::Hungry => "HUNGRY",
            SeatState::Eating => "EATING",
        };
        f.write_str(s)
    }
}

/// 円卓の形。席 i の左の箸は i、右の箸は (i + 1) mod N
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ring {
    seats: usize,
}

impl Ring {
    pub fn new(seats: usize) -> Result<Self> {
        if seats == 0 {
            return Err(Error::InvalidSeatCount);
        }
        Ok(Ring { seats })
    }

    pub fn seats(&self) -> usize {
        self.seats
    }

    pub fn left_fork(&self, seat: usize) -> usize {
        seat
    }

    pub fn right_fork(&self, seat: usize) -> usize {
        (seat + 1) % self.seats
    }

    pub fn left_neighbor(&self, seat: usize) -> usize {
        (seat + self.seats - 1) % self.seats
    }

    pub fn right_neighbor(&self, seat: usize) -> usize {
        (seat + 1) % self.seats
    }

    /// 席 seat が使う箸を番号の小さい順に返す。
    /// 1 人しかいないときは左右が同じ箸なので 1 本だけ
    pub fn forks(&self, seat: usize) -> impl DoubleEndedIterator<Item = usize> {
        let (l, r) = (self.left_fork(seat), self.right_fork(seat));
        let (lo, hi) = if l <= r { (l, r) } else { (r, l) };
        iter::once(lo).chain((hi != lo).then_some(hi))
    }

    pub fn check(&self, seat: usize) -> Result<usize> {
        if seat < self.seats {
            Ok(seat)
        } else {
            Err(Error::NoSuchSeat {
                seat,
                seats: self.seats,
            })
        }
    }

    // 自分が空腹で、両隣が食事中でなければ食べてよい
    pub fn admit(&self, seat: usize, state: impl Fn(usize) -> SeatState) -> bool {
        state(seat) == SeatState::Hungry
            && state(self.left_neighbor(seat)) != SeatState::Eating
            && state(self.right_neighbor(seat)) != SeatState::Eating
    }

    /// 食事中の席が隣り合っていないか (独立集合になっているか)
    pub fn is_independent(&self, states: &[SeatState]) -> bool {
        assert_eq!(states.len(), self.seats);

        // 1 人なら自分自身が隣なので判定しない
        if self.seats == 1 {
            return true;
        }

        (0..self.seats).all(|i| {
            states[i] != SeatState::Eating || states[self.right_neighbor(i)] != SeatState::Eating
        })
    }
}

/// モニタ版で使う状態表。必ずモニタのロックの中で操作する
#[derive(Debug)]
pub struct SeatTable {
    ring: Ring,
    states: Vec<SeatState>,
    meals: Vec<u64>,
    served: u64,
}

impl SeatTable {
    pub fn new(ring: Ring) -> Self {
        SeatTable {
            ring,
            states: vec![SeatState::Thinking; ring.seats()],
            meals: vec![0; ring.seats()],
            served: 0,
        }
    }

    pub fn states(&self) -> &[SeatState] {
        &self.states
    }

    pub fn set(&mut self, seat: usize, state: SeatState) {
        self.states[seat] = state;
        if cfg!(debug_assertions) {
            assert!(
                self.ring.is_independent(&self.states),
                "neighbours eating at once: {:?}",
                self.states
            );
        }
    }

    pub fn admit(&self, seat: usize) -> bool {
        self.ring.admit(seat, |i| self.states[i])
    }

    pub fn record_meal(&mut self, seat: usize) {
        self.meals[seat] += 1;
    }

    pub fn record_served(&mut self) {
        self.served += 1;
    }

    pub fn meals(&self) -> &[u64] {
        &self.meals
    }

    pub fn served(&self) -> u64 {
        self.served
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use SeatState::*;

    #[test]
    fn test_neighbors() {
        let ring = Ring::new(5).unwrap();
        assert_eq!(ring.left_neighbor(0), 4);
        assert_eq!(ring.right_neighbor(4), 0);
        assert_eq!(ring.left_fork(3), 3);
        assert_eq!(ring.right_fork(4), 0);
    }

    #[test]
    fn test_forks_in_order() {
        let ring = Ring::new(5).unwrap();
        assert_eq!(ring.forks(1).collect::<Vec<_>>(), vec![1, 2]);
        // 最後の席は箸 0 から取る
        assert_eq!(ring.forks(4).collect::<Vec<_>>(), vec![0, 4]);
        assert_eq!(ring.forks(4).rev().collect::<Vec<_>>(), vec![4, 0]);
    }

    #[test]
    fn test_single_seat() {
        let ring = Ring::new(1).unwrap();
        assert_eq!(ring.left_neighbor(0), 0);
        assert_eq!(ring.right_neighbor(0), 0);
        assert_eq!(ring.forks(0).collect::<Vec<_>>(), vec![0]);
        assert!(ring.admit(0, |_| Hungry));
        assert!(!ring.admit(0, |_| Thinking));
        assert!(ring.is_independent(&[Eating]));
    }

    #[test]
    fn test_zero_seats() {
        assert!(matches!(Ring::new(0), Err(Error::InvalidSeatCount)));
    }

    #[test]
    fn test_admit() {
        let ring = Ring::new(5).unwrap();
        let states = [Eating, Hungry, Hungry, Thinking, Hungry];
        assert!(!ring.admit(1, |i| states[i]));
        assert!(ring.admit(2, |i| states[i]));
        assert!(!ring.admit(3, |i| states[i]));
        assert!(!ring.admit(4, |i| states[i]));
    }

    #[test]
    fn test_is_independent() {
        let ring = Ring::new(5).unwrap();
        assert!(ring.is_independent(&[Eating, Thinking, Eating, Hungry, Thinking]));
        assert!(!ring.is_independent(&[Eating, Eating, Thinking, Thinking, Thinking]));
        // 0 と 4 も隣同士
        assert!(!ring.is_independent(&[Eating, Thinking, Thinking, Thinking, Eating]));
    }

    #[test]
    fn test_check_seat() {
        let ring = Ring::new(3).unwrap();
        assert_eq!(ring.check(2).unwrap(), 2);
        assert!(matches!(
            ring.check(3),
            Err(Error::NoSuchSeat { seat: 3, seats: 3 })
        ));
    }

    #[test]
    #[should_panic(expected = "neighbours eating at once")]
    #[cfg(debug_assertions)]
    fn test_table_rejects_adjacent_eaters() {
        let mut table = SeatTable::new(Ring::new(3).unwrap());
        table.set(0, Eating);
        table.set(1, Eating);
    }
}
