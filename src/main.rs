use env_logger::Builder;
use ferric_sftpd::Engine;
use log::{error, LevelFilter};
use std::process::exit;

fn main() {
    // stdout carries the protocol, so diagnostics stay on stderr
    let mut builder = Builder::from_default_env();
    builder
        .default_format()
        .filter(None, LevelFilter::Warn)
        .target(env_logger::Target::Stderr)
        .init();

    let mut engine = Engine::new();
    match engine.run() {
        // Peer closed the stream at a frame boundary
        Ok(()) => {}
        Err(e) => {
            error!("fatal: {}", e);
            exit(1);
        }
    }
}
