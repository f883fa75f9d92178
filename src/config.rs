use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

use crate::{
    dinner::Variant,
    philosopher::{Delay, Timing},
};

// コマンドライン引数
#[derive(Debug, Parser)]
#[command(
    version,
    about = "Dining philosophers with a monitor or with shared memory and semaphores"
)]
pub struct Config {
    #[arg(
        default_value_t = 5,
        value_parser = parse_seats,
        help = "Number of philosophers"
    )]
    pub philosophers: usize,

    #[arg(
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "How long the dinner lasts, in seconds"
    )]
    pub duration: u64,

    #[arg(
        long,
        value_enum,
        default_value_t = Variant::Threads,
        help = "Run philosophers as threads or as processes"
    )]
    pub variant: Variant,

    #[arg(
        long,
        default_value = "1000..3000",
        help = "Thinking time range MIN..MAX in milliseconds"
    )]
    pub think_ms: Delay,

    #[arg(
        long,
        default_value = "1000..3000",
        help = "Eating time range MIN..MAX in milliseconds"
    )]
    pub eat_ms: Delay,

    #[arg(
        long,
        default_value_t = LevelFilter::Info,
        help = "Log level (off, error, warn, info, debug, trace)"
    )]
    pub log_level: LevelFilter,
}

impl Config {
    pub fn timing(&self) -> Timing {
        Timing {
            think: self.think_ms,
            eat: self.eat_ms,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }
}

fn parse_seats(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("the number of philosophers must be a positive integer".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
