use std::{error::Error, sync::mpsc, thread};

use clap::Parser;
use libc::{SIGINT, SIGTERM};
use log::{info, warn};
use signal_hook::iterator::Signals;
use simplelog::{ColorChoice, TermLogger, TerminalMode};

use philosophers::{config::Config, Dinner};

fn rule() -> String {
    "=".repeat(70)
}

fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::parse();
    TermLogger::init(
        config.log_level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    println!("\n{}", rule());
    println!("DINING PHILOSOPHERS - {}", config.variant.to_string().to_uppercase());
    println!("{}", rule());
    println!("Configuration:");
    println!("  - Philosophers: {}", config.philosophers);
    println!("  - Duration: {} seconds", config.duration);
    println!("  - Thinking: {} ms", config.think_ms);
    println!("  - Eating: {} ms", config.eat_ms);
    println!("{}\n", rule());

    let mut dinner = Dinner::new(config.variant, config.philosophers)?;

    // Ctrl+C などを受け取ったら、時間切れを待たずに終了する。
    // 登録だけ先に済ませ、監視スレッドは fork が終わってから起こす (届いたシグナルはパイプに溜まる)
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    dinner.spawn_all(config.timing())?;

    let (tx, rx) = mpsc::channel();
    let watcher = thread::spawn(move || {
        for sig in signals.forever() {
            info!("received signal: {:?}", sig);
            if tx.send(sig).is_err() {
                break;
            }
        }
    });

    println!("\nDinner running for {} seconds...", config.duration);
    println!("Press Ctrl+C to stop earlier.\n");

    if rx.recv_timeout(config.duration()).is_ok() {
        println!("\n\nDinner interrupted by the user.\n");
    }

    dinner.shutdown();
    println!("\nWaiting for the philosophers to leave...");
    let waited = dinner.wait();

    handle.close();
    if watcher.join().is_err() {
        warn!("signal watcher panicked");
    }

    println!("\n{}", rule());
    println!("End of dinner");
    println!("{}\n", rule());
    print!("{}", dinner.statistics());

    dinner.dispose()?;
    waited?;
    Ok(())
}
