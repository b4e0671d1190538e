use std::{sync::Arc, time::Duration};

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::time::Instant;

/// Per-user button cooldown. The first press inside a window wins, later ones are dropped.
#[derive(Clone, Debug)]
pub struct CooldownService {
    presses: Arc<DashMap<u64, Instant>>,
    window: Duration,
}

impl CooldownService {
    pub fn new(window_ms: u64) -> Self {
        info!("Initializing CooldownService with a {}ms window", window_ms);
        Self {
            presses: Arc::new(DashMap::new()),
            window: Duration::from_millis(window_ms),
        }
    }

    /// Returns `false` when `user_id` already pressed something within the window.
    pub fn try_acquire(&self, user_id: u64) -> bool {
        let now = Instant::now();

        match self.presses.entry(user_id) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.window {
                    return false;
                }
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
            }
        }

        let presses = Arc::clone(&self.presses);
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            presses.remove_if(&user_id, |_, pressed| *pressed == now);
        });

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_press_within_window_is_dropped() {
        let cooldown = CooldownService::new(50);

        assert!(cooldown.try_acquire(1));
        assert!(!cooldown.try_acquire(1));
        assert!(cooldown.try_acquire(2));

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(cooldown.try_acquire(1));
    }
}
