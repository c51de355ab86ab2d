use rand::Rng;
use std::sync::RwLock;

const DEFAULT_USER_AGENTS: [&str; 8] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
];

/// The user agent scrapers should currently present, and a pool to rotate to
/// when the target starts rejecting it.
pub struct UserAgentRotator {
    user_agents: Vec<String>,
    current: RwLock<usize>,
}

impl Default for UserAgentRotator {
    fn default() -> Self {
        Self::new(DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect())
    }
}

impl UserAgentRotator {
    /// An empty pool falls back to the built-in desktop agents.
    pub fn new(user_agents: Vec<String>) -> Self {
        let user_agents = if user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect()
        } else {
            user_agents
        };

        Self {
            user_agents,
            current: RwLock::new(0),
        }
    }

    pub fn current(&self) -> String {
        let index = *self.current.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.user_agents[index].clone()
    }

    pub fn pool_size(&self) -> usize {
        self.user_agents.len()
    }

    /// Switch to a randomly picked agent different from the current one.
    /// Returns `None` when the pool has nothing else to offer.
    pub fn rotate(&self) -> Option<String> {
        if self.user_agents.len() < 2 {
            return None;
        }

        let mut current = self.current.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        // skip over the current slot so the pick is always a change
        let offset = rand::thread_rng().gen_range(1..self.user_agents.len());
        *current = (*current + offset) % self.user_agents.len();
        Some(self.user_agents[*current].clone())
    }
}
