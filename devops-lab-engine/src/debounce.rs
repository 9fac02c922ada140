//! Clock-driven debounce and throttle. Nothing here owns a timer: the host
//! polls with the current time and flushes on teardown.
use std::collections::BTreeMap;

/// Keeps the latest value per key until it has been quiet for `delay_ms`.
#[derive(Debug, Clone)]
pub struct Debouncer<K, V> {
    delay_ms: u64,
    pending: BTreeMap<K, (V, u64)>,
}

impl<K: Ord, V> Debouncer<K, V> {
    #[must_use]
    pub const fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            pending: BTreeMap::new(),
        }
    }

    /// Replace any pending value for `key` and restart its delay.
    pub fn push(&mut self, key: K, value: V, now_ms: u64) {
        let due = now_ms.saturating_add(self.delay_ms);
        self.pending.insert(key, (value, due));
    }

    /// Take every value whose delay has elapsed.
    pub fn poll(&mut self, now_ms: u64) -> Vec<(K, V)> {
        let (due, waiting): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(_, (_, due_at))| *due_at <= now_ms);
        self.pending = waiting;
        due.into_iter().map(|(key, (value, _))| (key, value)).collect()
    }

    /// Take everything regardless of timing.
    pub fn flush(&mut self) -> Vec<(K, V)> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, (value, _))| (key, value))
            .collect()
    }

    pub fn cancel(&mut self) {
        self.pending.clear();
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Lets at most one event through per `interval_ms`.
#[derive(Debug, Clone, Copy)]
pub struct Throttle {
    interval_ms: u64,
    last: Option<u64>,
}

impl Throttle {
    #[must_use]
    pub const fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last: None,
        }
    }

    pub fn ready(&mut self, now_ms: u64) -> bool {
        let open = self
            .last
            .is_none_or(|last| now_ms.saturating_sub(last) >= self.interval_ms);
        if open {
            self.last = Some(now_ms);
        }
        open
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debouncer_keeps_latest_value_until_quiet() {
        let mut debouncer = Debouncer::new(500);
        debouncer.push("kube", "a", 0);
        debouncer.push("kube", "ab", 300);
        assert!(debouncer.poll(600).is_empty());
        assert_eq!(debouncer.poll(800), vec![("kube", "ab")]);
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn flush_ignores_timing() {
        let mut debouncer = Debouncer::new(500);
        debouncer.push("main.tf", 1, 0);
        debouncer.push("outputs.tf", 2, 0);
        assert_eq!(debouncer.flush(), vec![("main.tf", 1), ("outputs.tf", 2)]);
        debouncer.push("main.tf", 3, 0);
        debouncer.cancel();
        assert!(debouncer.flush().is_empty());
    }

    #[test]
    fn throttle_spaces_events() {
        let mut throttle = Throttle::new(1_500);
        assert!(throttle.ready(0));
        assert!(!throttle.ready(1_000));
        assert!(throttle.ready(1_500));
        throttle.reset();
        assert!(throttle.ready(1_600));
    }
}
