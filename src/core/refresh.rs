use tokio::sync::watch;

/// Signals renderers that observable state changed.
///
/// Backed by a `watch` channel carrying a generation counter, so bursts of
/// triggers between two renders coalesce into one.
#[derive(Clone)]
pub struct RefreshTrigger {
    tx: watch::Sender<u64>,
}

impl RefreshTrigger {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn trigger(&self) {
        self.tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for RefreshTrigger {
    fn default() -> Self {
        Self::new()
    }
}
