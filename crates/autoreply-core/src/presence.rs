//! Owner presence: the single process-wide switch that gates the assistant.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Owner availability. While `Offline` the assistant answers on the owner's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    #[default]
    Offline,
}

impl Presence {
    /// Human-readable label used by the control surface.
    pub fn label(self) -> &'static str {
        match self {
            Presence::Online => "Online",
            Presence::Offline => "Offline",
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Presence::Online => Presence::Offline,
            Presence::Offline => Presence::Online,
        }
    }
}

/// Shared presence flag. Cloned by handle (`Arc`) into the gateway and the dispatcher.
#[derive(Debug)]
pub struct PresenceFlag {
    online: AtomicBool,
}

impl PresenceFlag {
    pub fn new(initial: Presence) -> Self {
        Self {
            online: AtomicBool::new(initial == Presence::Online),
        }
    }

    pub fn get(&self) -> Presence {
        if self.online.load(Ordering::SeqCst) {
            Presence::Online
        } else {
            Presence::Offline
        }
    }

    pub fn set(&self, presence: Presence) {
        self.online
            .store(presence == Presence::Online, Ordering::SeqCst);
    }

    /// Flip presence and return the new value.
    pub fn toggle(&self) -> Presence {
        // fetch_xor returns the previous value
        let was_online = self.online.fetch_xor(true, Ordering::SeqCst);
        let now = if was_online {
            Presence::Offline
        } else {
            Presence::Online
        };
        tracing::info!("[PRESENCE] Owner is now {}", now.label());
        now
    }
}

impl Default for PresenceFlag {
    fn default() -> Self {
        Self::new(Presence::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_offline_by_default() {
        assert_eq!(PresenceFlag::default().get(), Presence::Offline);
    }

    #[test]
    fn toggle_returns_new_state() {
        let flag = PresenceFlag::new(Presence::Offline);
        assert_eq!(flag.toggle(), Presence::Online);
        assert_eq!(flag.get(), Presence::Online);
    }

    #[test]
    fn toggle_twice_is_identity() {
        for initial in [Presence::Online, Presence::Offline] {
            let flag = PresenceFlag::new(initial);
            flag.toggle();
            flag.toggle();
            assert_eq!(flag.get(), initial);
        }
    }

    #[test]
    fn labels() {
        assert_eq!(Presence::Online.label(), "Online");
        assert_eq!(Presence::Offline.label(), "Offline");
        assert_eq!(Presence::Online.flipped(), Presence::Offline);
    }
}
