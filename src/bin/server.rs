use clap::Parser;
use redkv::config::Config;
use redkv::{server, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    server::run(config).await
}
