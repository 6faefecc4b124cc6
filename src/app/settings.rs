use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ViewSettings {
    /// Never switch handler when replaying history.
    pub locked_view_mode: bool,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub user_agent: String,
    /// How long a headless caller waits for a load to settle.
    pub load_timeout: Duration,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            locked_view_mode: false,
            cache_enabled: true,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 100,
            user_agent: "KonqView/1.0".to_string(),
            load_timeout: Duration::from_secs(30),
        }
    }
}
