//! Persistence of attendance records, one row per `(user_id, date)`.

pub mod memory;
pub mod mysql;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

use crate::model::attendance::AttendanceRecord;

pub use memory::MemoryAttendanceStore;
pub use mysql::MySqlAttendanceStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record for user {user_id} on {date} vanished after write")]
    MissingAfterWrite { user_id: u64, date: NaiveDate },
}

/// Outcome of a guarded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied(AttendanceRecord),
    /// The guard did not hold; nothing was written.
    Rejected,
}

/// The event being recorded: when, where and with which photo.
#[derive(Debug, Clone)]
pub struct Stamp<'a> {
    pub at: NaiveDateTime,
    pub location: &'a str,
    pub photo_key: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct AttendanceFilter {
    pub user_id: Option<u64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: u64,
    pub per_page: u64,
}

impl AttendanceFilter {
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.user_id.is_none_or(|id| record.user_id == id)
            && self.from.is_none_or(|from| record.date >= from)
            && self.to.is_none_or(|to| record.date <= to)
    }
}

#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn find(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Creates the day's record with `check_in` set, or fills an existing row
    /// whose `check_in` is still null (clearing its check-out fields).
    /// `Rejected` when the user already checked in that day.
    async fn record_check_in(
        &self,
        user_id: u64,
        date: NaiveDate,
        stamp: Stamp<'_>,
    ) -> Result<Transition, StoreError>;

    /// Sets the check-out fields only if checked in and not yet checked out.
    async fn record_check_out(
        &self,
        user_id: u64,
        date: NaiveDate,
        stamp: Stamp<'_>,
    ) -> Result<Transition, StoreError>;

    /// Newest first: date descending, then id descending.
    async fn list(&self, filter: &AttendanceFilter) -> Result<Page<AttendanceRecord>, StoreError>;
}
