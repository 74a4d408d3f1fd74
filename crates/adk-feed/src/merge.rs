use adk_events::Event;
use std::collections::HashSet;

/// Merges replay pages and live delivery into one strictly-ascending,
/// duplicate-free sequence. The view is rebuilt whenever either input
/// changes; both inputs keep growing independently, so patching the merged
/// view in place cannot uphold the total-order invariant.
#[derive(Debug, Default)]
pub struct EventMerger {
    replay: Vec<Event>,
    live: Vec<Event>,
    merged: Vec<Event>,
}

impl EventMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_replay(&mut self, events: Vec<Event>) {
        self.replay = events;
        self.rebuild();
    }

    pub fn extend_replay(&mut self, events: impl IntoIterator<Item = Event>) {
        self.replay.extend(events);
        self.rebuild();
    }

    pub fn push_live(&mut self, event: Event) {
        self.live.push(event);
        self.rebuild();
    }

    pub fn extend_live(&mut self, events: impl IntoIterator<Item = Event>) {
        self.live.extend(events);
        self.rebuild();
    }

    /// The merged view: ascending by cursor, no duplicate cursors. Gaps are
    /// tolerated; contiguity is never assumed.
    pub fn merged(&self) -> &[Event] {
        &self.merged
    }

    pub fn len(&self) -> usize {
        self.merged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }

    /// Highest cursor seen so far, across both inputs.
    pub fn head_cursor(&self) -> Option<u64> {
        self.merged.last().map(|event| event.cursor)
    }

    fn rebuild(&mut self) {
        let mut seen = HashSet::with_capacity(self.replay.len() + self.live.len());
        let mut merged: Vec<Event> = self
            .replay
            .iter()
            .chain(self.live.iter())
            .filter(|event| seen.insert(event.cursor))
            .cloned()
            .collect();
        merged.sort_by_key(|event| event.cursor);
        self.merged = merged;
    }
}
