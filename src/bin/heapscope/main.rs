use env_logger::{Builder, Env};
use log::error;

mod cli;

fn init_logger() {
    // RUST_LOG wins, e.g. RUST_LOG=heapscope=debug
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = cli::run() {
        error!("{e:#}");
        std::process::exit(1);
    }
}
