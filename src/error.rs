use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("a table needs at least one seat")]
    InvalidSeatCount,

    #[error("seat {seat} does not exist at a table of {seats}")]
    NoSuchSeat { seat: usize, seats: usize },

    #[error("philosopher {seat} is already seated")]
    AlreadySeated { seat: usize },

    #[error("{seats} seats do not fit in a shared segment")]
    SegmentTooLarge { seats: usize },

    /// 共有メモリやセマフォの確保に失敗。作りかけのものは解放済み
    #[error("failed to create {what}: {source}")]
    Init {
        what: &'static str,
        source: nix::Error,
    },

    #[error("failed to spawn thread for philosopher {seat}: {source}")]
    SpawnThread { seat: usize, source: io::Error },

    #[error("failed to fork process for philosopher {seat}: {source}")]
    SpawnProcess { seat: usize, source: nix::Error },

    #[error("philosopher {seat} did not exit cleanly")]
    Join { seat: usize },

    #[error("invalid delay {0:?}, expected MIN..MAX in milliseconds")]
    InvalidDelay(String),
}

pub type Result<T> = std::result::Result<T, Error>;
