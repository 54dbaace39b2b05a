//! Session configuration.

use csnd_engine::FeedConfig;
use csnd_ir::NOMINAL_SAMPLE_RATE;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Rate every channel stream is opened at
    pub nominal_rate: u32,
    pub feed: FeedConfig,
    pub shared_memory_name: String,
    pub mutex_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            nominal_rate: NOMINAL_SAMPLE_RATE,
            feed: FeedConfig::default(),
            shared_memory_name: "CSND-SHARED_MEM".to_string(),
            mutex_name: "CSND-MUTEX".to_string(),
        }
    }
}
