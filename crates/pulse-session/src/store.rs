//! In-memory notification list for the signed-in user.

use pulse_protocol_types::NotificationRecord;
use std::collections::{HashSet, VecDeque};

/// Ordered notification list, newest first, with a cached unread count.
///
/// Ids are unique and the cached count always equals the number of
/// records whose `is_read` is false.
#[derive(Debug, Clone, Default)]
pub struct NotificationStore {
    records: VecDeque<NotificationRecord>,
    ids: HashSet<String>,
    unread: usize,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with an authoritative snapshot.
    ///
    /// Order is kept as given. Repeated ids keep their first occurrence.
    pub fn replace_snapshot(&mut self, records: Vec<NotificationRecord>) {
        self.clear();
        for record in records {
            if self.ids.insert(record.id.clone()) {
                if !record.is_read {
                    self.unread += 1;
                }
                self.records.push_back(record);
            }
        }
    }

    /// Prepend a pushed notification. Returns false for a known id.
    pub fn push_incoming(&mut self, record: NotificationRecord) -> bool {
        if !self.ids.insert(record.id.clone()) {
            return false;
        }
        if !record.is_read {
            self.unread += 1;
        }
        self.records.push_front(record);
        true
    }

    /// Mark one record read. Returns true if it was unread.
    pub fn apply_read(&mut self, id: &str) -> bool {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) if !record.is_read => {
                record.is_read = true;
                self.unread -= 1;
                true
            }
            _ => false,
        }
    }

    /// Mark every record read. Returns how many flipped.
    pub fn apply_all_read(&mut self) -> usize {
        let flipped = self.unread;
        for record in self.records.iter_mut() {
            record.is_read = true;
        }
        self.unread = 0;
        flipped
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.ids.clear();
        self.unread = 0;
    }

    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&NotificationRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
