//! Node configuration
//!
//! The TOML manifest loader is an external collaborator; this struct is the
//! interface it fills in.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Where the keyed store lives; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// How often the gossip tick loop fires
    pub gossip_interval: Duration,
    /// Timeout applied to every transport send
    pub send_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            gossip_interval: Duration::from_secs(2),
            send_timeout: Duration::from_secs(10),
        }
    }
}
