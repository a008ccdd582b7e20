use clap::Parser;

use crate::replication::ReplicaOf;

const PORT: u16 = 6379;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Config {
    /// The port to listen on
    #[arg(short, long, env = "REDKV_PORT", default_value_t = PORT)]
    pub port: u16,

    /// Start as a replica of the master at "<host> <port>"
    #[arg(long, env = "REDKV_REPLICAOF")]
    pub replicaof: Option<ReplicaOf>,
}
