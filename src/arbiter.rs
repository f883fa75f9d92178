use std::fmt;

use crate::seat::{Ring, SeatState};

/// 要求の結果。Cancelled のときは箸を持っていないので食べてはいけない
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Granted,
    Cancelled,
}

/// 箸の割り当てを決める調停役
///
/// 状態表の読み書きはすべて実装側の大域ロック (またはセマフォ) の中で行う。
/// 個々の箸のロックは許可が出た後にしか取らないので、片方の箸を持ったまま
/// もう片方を待つことはなく、循環待ちは起きない。
pub trait Arbiter: Send + Sync {
    fn ring(&self) -> Ring;

    /// 両隣が食事中でなくなるまで待って、左右の箸を取る。
    /// 終了要求が出ていれば何も持たずに Cancelled を返す
    fn request(&self, seat: usize) -> Admission;

    /// 箸を置いて Thinking に戻り、待っている隣人を起こす
    fn release(&self, seat: usize);

    /// 終了フラグを立てて、待っている全員を起こす。何度呼んでもよい
    fn shutdown(&self);

    fn is_terminating(&self) -> bool;

    fn states(&self) -> Vec<SeatState>;

    fn statistics(&self) -> Statistics;
}

/// 食事中であることを表すガード。drop で箸を返す
pub struct Meal<'a, A: Arbiter + ?Sized> {
    arbiter: &'a A,
    seat: usize,
}

impl<'a, A: Arbiter + ?Sized> Meal<'a, A> {
    pub fn serve(arbiter: &'a A, seat: usize) -> Option<Self> {
        match arbiter.request(seat) {
            Admission::Granted => Some(Meal { arbiter, seat }),
            Admission::Cancelled => None,
        }
    }

    pub fn seat(&self) -> usize {
        self.seat
    }
}

impl<'a, A: Arbiter + ?Sized> Drop for Meal<'a, A> {
    fn drop(&mut self) {
        self.arbiter.release(self.seat);
    }
}

/// 実行後の集計
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    /// 席ごとの食事回数
    pub meals: Vec<u64>,
    /// release された要求の数
    pub served: u64,
}

impl Statistics {
    pub fn total(&self) -> u64 {
        self.meals.iter().sum()
    }

    pub fn average(&self) -> f64 {
        if self.meals.is_empty() {
            return 0.0;
        }
        self.total() as f64 / self.meals.len() as f64
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(70);
        writeln!(f, "{rule}")?;
        writeln!(f, "FINAL STATISTICS")?;
        writeln!(f, "{rule}")?;
        for (i, n) in self.meals.iter().enumerate() {
            writeln!(f, "Philosopher {i} ate {n} times")?;
        }
        writeln!(f)?;
        writeln!(f, "Total meals: {}", self.total())?;
        writeln!(f, "Average per philosopher: {:.2}", self.average())?;
        writeln!(f, "Requests served: {}", self.served)?;
        writeln!(f, "{rule}")
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_statistics() {
        let stats = Statistics {
            meals: vec![3, 1, 2],
            served: 6,
        };
        assert_eq!(stats.total(), 6);
        assert!((stats.average() - 2.0).abs() < f64::EPSILON);

        let report = stats.to_string();
        assert!(report.contains("Philosopher 1 ate 1 times"));
        assert!(report.contains("Average per philosopher: 2.00"));
        assert!(report.contains("Requests served: 6"));
    }
}
