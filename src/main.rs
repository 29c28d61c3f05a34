// rforth main program

mod config;
mod engine;
mod errors;
mod files;
mod internals;
mod kernel;

use config::Config;

fn main() {
    let mut config = Config::new();
    config.process_args();

    if config.run {
        config.run_forth();
    }
}
