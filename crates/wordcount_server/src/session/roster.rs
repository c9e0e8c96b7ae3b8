//! Membership partitions of a session.
//!
//! A player name lives in at most one of three partitions: active,
//! disconnected or departed. Every transition moves the player's address
//! along with the name so notifications keep reaching the same mailbox.

use crate::mailbox::{Notification, PlayerAddress};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub(crate) struct Roster {
    active: BTreeMap<String, PlayerAddress>,
    disconnected: BTreeMap<String, PlayerAddress>,
    departed: BTreeMap<String, PlayerAddress>,
    join_order: HashMap<String, u64>,
    next_join: u64,
}

impl Roster {
    /// Adds a player to the active partition with the next join-sequence
    /// number. A departed player who comes back is moved out of `departed`.
    pub fn activate(&mut self, player: PlayerAddress) -> u64 {
        let name = player.name().to_string();
        self.disconnected.remove(&name);
        self.departed.remove(&name);
        let seq = self.next_join;
        self.next_join += 1;
        self.join_order.insert(name.clone(), seq);
        self.active.insert(name, player);
        seq
    }

    /// Moves an active player to `disconnected`.
    pub fn disconnect(&mut self, name: &str) -> bool {
        match self.active.remove(name) {
            Some(address) => {
                self.disconnected.insert(name.to_string(), address);
                true
            }
            None => false,
        }
    }

    /// Moves a disconnected player back to `active`, keeping its join order.
    pub fn reconnect(&mut self, name: &str) -> bool {
        match self.disconnected.remove(name) {
            Some(address) => {
                self.active.insert(name.to_string(), address);
                true
            }
            None => false,
        }
    }

    /// Moves an active player to `departed`.
    pub fn depart(&mut self, name: &str) -> bool {
        match self.active.remove(name) {
            Some(address) => {
                self.departed.insert(name.to_string(), address);
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.active.contains_key(name)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Active player names in ascending order.
    pub fn active_names(&self) -> impl Iterator<Item = &str> {
        self.active.keys().map(String::as_str)
    }

    /// Address of a player that is still reachable in this session.
    pub fn address(&self, name: &str) -> Option<&PlayerAddress> {
        self.active
            .get(name)
            .or_else(|| self.disconnected.get(name))
    }

    /// The active player that joined earliest.
    pub fn earliest_active(&self) -> Option<&str> {
        self.active
            .keys()
            .min_by_key(|name| self.join_order.get(*name).copied().unwrap_or(u64::MAX))
            .map(String::as_str)
    }

    pub fn notify(&self, name: &str, notification: Notification) {
        if let Some(address) = self.address(name) {
            address.deliver(notification);
        }
    }

    pub fn notify_active(&self, notification: &Notification) {
        for address in self.active.values() {
            address.deliver(notification.clone());
        }
    }

    pub fn notify_active_except(&self, skip: &str, notification: &Notification) {
        for (name, address) in &self.active {
            if name != skip {
                address.deliver(notification.clone());
            }
        }
    }

    pub fn notify_departed(&self, notification: &Notification) {
        for address in self.departed.values() {
            address.deliver(notification.clone());
        }
    }
}
