use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{AttendanceFilter, AttendanceStore, Page, Stamp, StoreError, Transition};
use crate::model::attendance::AttendanceRecord;

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    rows: BTreeMap<(u64, NaiveDate), AttendanceRecord>,
}

/// Process-local store. Each guarded write holds the lock across its check
/// and its mutation.
#[derive(Debug, Default)]
pub struct MemoryAttendanceStore {
    inner: Mutex<Inner>,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row as-is, for seeding.
    pub fn insert(&self, mut record: AttendanceRecord) -> AttendanceRecord {
        let mut inner = self.lock();
        inner.next_id += 1;
        record.id = inner.next_id;
        inner
            .rows
            .insert((record.user_id, record.date), record.clone());
        record
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn find(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self.lock().rows.get(&(user_id, date)).cloned())
    }

    async fn record_check_in(
        &self,
        user_id: u64,
        date: NaiveDate,
        stamp: Stamp<'_>,
    ) -> Result<Transition, StoreError> {
        let mut inner = self.lock();
        let next_id = inner.next_id + 1;

        let row = inner
            .rows
            .entry((user_id, date))
            .or_insert_with(|| AttendanceRecord {
                id: next_id,
                user_id,
                date,
                check_in: None,
                check_out: None,
                location_in: None,
                location_out: None,
                photo_in: None,
                photo_out: None,
                created_at: stamp.at,
                updated_at: stamp.at,
            });

        if row.check_in.is_some() {
            return Ok(Transition::Rejected);
        }

        row.check_in = Some(stamp.at);
        row.location_in = Some(stamp.location.to_string());
        row.photo_in = Some(stamp.photo_key.to_string());
        row.check_out = None;
        row.location_out = None;
        row.photo_out = None;
        row.updated_at = stamp.at;
        let record = row.clone();

        if record.id == next_id {
            inner.next_id = next_id;
        }
        Ok(Transition::Applied(record))
    }

    async fn record_check_out(
        &self,
        user_id: u64,
        date: NaiveDate,
        stamp: Stamp<'_>,
    ) -> Result<Transition, StoreError> {
        let mut inner = self.lock();
        let Some(row) = inner.rows.get_mut(&(user_id, date)) else {
            return Ok(Transition::Rejected);
        };
        if row.check_in.is_none() || row.check_out.is_some() {
            return Ok(Transition::Rejected);
        }

        row.check_out = Some(stamp.at);
        row.location_out = Some(stamp.location.to_string());
        row.photo_out = Some(stamp.photo_key.to_string());
        row.updated_at = stamp.at;
        Ok(Transition::Applied(row.clone()))
    }

    async fn list(&self, filter: &AttendanceFilter) -> Result<Page<AttendanceRecord>, StoreError> {
        let inner = self.lock();
        let mut matching: Vec<&AttendanceRecord> =
            inner.rows.values().filter(|r| filter.matches(r)).collect();
        matching.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.per_page as usize)
            .cloned()
            .collect();

        Ok(Page { items, total })
    }
}
