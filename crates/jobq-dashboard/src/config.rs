use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("PORT")
            .ok()
            .map(|v| v.parse().expect("PORT must be a number"))
            .unwrap_or(8080);
        let bind = SocketAddr::from(([0, 0, 0, 0], port));

        let db_path = std::env::var("QUEUE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("queue.db"));

        Self { bind, db_path }
    }
}
