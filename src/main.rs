use std::env;

use arena::cli;

fn main() {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    std::process::exit(cli::run_with_args(&args));
}
