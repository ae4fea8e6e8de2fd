use std::net::SocketAddr;
use std::path::PathBuf;

/// Default port the browser client dials (`ws://<host>:8080`).
pub const DEFAULT_PORT: u16 = 8080;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Directory served as static assets on the same listener, if it exists.
    pub static_dir: Option<PathBuf>,
    /// Frames buffered per connection before further broadcasts to it are dropped.
    pub outbox_capacity: usize,
    /// Pending commands queued for the relay loop.
    pub command_capacity: usize,
    /// Send each newcomer the last `player_update` of every other player.
    pub replay_last_state: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            static_dir: Some(PathBuf::from("public")),
            outbox_capacity: 256,
            command_capacity: 1024,
            replay_last_state: false,
        }
    }
}

impl ServerConfig {
    /// Defaults, with the listen port taken from `PORT` when set.
    pub fn from_env() -> Result<Self, String> {
        Self::from_port_var(std::env::var("PORT").ok())
    }

    fn from_port_var(port: Option<String>) -> Result<Self, String> {
        let mut config = Self::default();
        if let Some(raw) = port {
            let port: u16 = raw
                .trim()
                .parse()
                .map_err(|_| format!("PORT must be a valid port number, got {:?}", raw))?;
            config.listen_addr = format!("0.0.0.0:{}", port);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(format!(
                "listen_addr must be a socket address, got {:?}",
                self.listen_addr
            ));
        }
        if self.outbox_capacity == 0 {
            return Err("outbox_capacity must be > 0".to_string());
        }
        if self.command_capacity == 0 {
            return Err("command_capacity must be > 0".to_string());
        }
        Ok(())
    }
}
