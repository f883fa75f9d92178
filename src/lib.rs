//! 食事する哲学者問題
//!
//! 隣り合う哲学者が同時に食べないように、箸の割り当てを状態表で調停する。
//! スレッド版 ([`Monitor`]) とプロセス版 ([`IpcTable`]) の 2 通り。

pub mod arbiter;
pub mod config;
pub mod dinner;
pub mod error;
pub mod fork;
pub mod ipc;
pub mod monitor;
pub mod philosopher;
pub mod seat;

pub use arbiter::{Admission, Arbiter, Meal, Statistics};
pub use dinner::{Dinner, Variant};
pub use error::{Error, Result};
pub use ipc::IpcTable;
pub use monitor::Monitor;
pub use philosopher::{Delay, Philosopher, Timing};
pub use seat::{Ring, SeatState};
