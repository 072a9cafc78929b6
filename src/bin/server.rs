//! Relay server binary.
//! Run with: cargo run --bin streamchat-server

use std::process::ExitCode;

use streamchat::start;

fn main() -> ExitCode {
    start::run()
}
