//! Named event counters

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Counter {
    counters: HashMap<&'static str, u64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, name: &'static str, value: u64) {
        *self.counters.entry(name).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.counters.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.counters.iter().map(|(name, value)| (*name, *value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate_per_name() {
        let mut counter = Counter::new();
        counter.increment("messages_delivered", 3);
        counter.increment("messages_delivered", 2);
        counter.increment("objects_deleted", 1);
        assert_eq!(counter.get("messages_delivered"), 5);
        assert_eq!(counter.get("objects_deleted"), 1);
        assert_eq!(counter.get("unknown"), 0);

        counter.reset_all();
        assert_eq!(counter.get("messages_delivered"), 0);
    }
}
