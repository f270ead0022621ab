use std::collections::VecDeque;

pub const DEFAULT_CAPACITY: usize = 10;

// one announce as reported to the tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnounceEntry {
    pub sequence: u64,
    pub downloaded: u64,
    pub uploaded: u64,
    pub left: u64,
    pub percent_downloaded: f32,
}

impl AnnounceEntry {
    pub fn new(
        sequence: u64,
        downloaded: u64,
        uploaded: u64,
        left: u64,
        total_size: u64,
    ) -> AnnounceEntry {
        let percent_downloaded = if total_size == 0 {
            0.0
        } else {
            (downloaded as f64 / total_size as f64 * 100.0) as f32
        };
        AnnounceEntry { sequence, downloaded, uploaded, left, percent_downloaded }
    }
}

// the most recent announces, oldest first. pushing onto a full history
// drops the oldest entry.
#[derive(Debug, Clone)]
pub struct AnnounceHistory {
    entries: VecDeque<AnnounceEntry>,
    capacity: usize,
}

impl AnnounceHistory {
    pub fn new(capacity: usize) -> AnnounceHistory {
        let capacity = capacity.max(1);
        AnnounceHistory { entries: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn push(&mut self, entry: AnnounceEntry) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn last(&self) -> Option<&AnnounceEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnounceEntry> {
        self.entries.iter()
    }
}

impl Default for AnnounceHistory {
    fn default() -> Self {
        AnnounceHistory::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(sequence: u64) -> AnnounceEntry {
        AnnounceEntry::new(sequence, sequence * 10, sequence, 1000 - sequence * 10, 1000)
    }

    #[test]
    fn keeps_the_newest_entries_in_order() {
        let mut history = AnnounceHistory::default();
        for seq in 1..=15 {
            history.push(entry(seq));
        }

        assert_eq!(history.len(), 10);
        let sequences: Vec<u64> = history.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, (6..=15).collect::<Vec<_>>());
        assert_eq!(history.last(), Some(&entry(15)));
    }

    #[test]
    fn under_capacity_nothing_is_evicted() {
        let mut history = AnnounceHistory::new(3);
        assert!(history.is_empty());
        history.push(entry(1));
        history.push(entry(2));
        assert_eq!(history.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn percent_downloaded() {
        assert_eq!(AnnounceEntry::new(1, 512, 0, 512, 1024).percent_downloaded, 50.0);
        assert_eq!(AnnounceEntry::new(1, 0, 0, 0, 0).percent_downloaded, 0.0);
    }
}
