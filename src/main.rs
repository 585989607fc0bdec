#[macro_use]
extern crate log;

use linkbird::configuration::{Configuration, Parser};
use linkbird::daemon;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = Configuration::parse();
    if let Err(e) = args.validate() {
        eprintln!("invalid configuration: {}", e);
        std::process::exit(1);
    }

    let psk = match args.load_psk() {
        Ok(psk) => psk,
        Err(e) => {
            eprintln!("failed to load pre-shared key: {}", e);
            std::process::exit(1);
        }
    };

    info!("configuration valid, starting up");

    if let Err(e) = daemon::run(args, psk).await {
        eprintln!("fatal: {}", e);
        std::process::exit(1);
    }
}
