use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::MySqlPool;
use tracing::debug;

use super::{AttendanceFilter, AttendanceStore, Page, Stamp, StoreError, Transition};
use crate::model::attendance::AttendanceRecord;

const SELECT_COLUMNS: &str = r#"
    SELECT id, user_id, date, check_in, check_out,
           location_in, location_out, photo_in, photo_out,
           created_at, updated_at
    FROM attendances
"#;

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Date(NaiveDate),
}

/// MySQL-backed store. Relies on the unique key `(user_id, date)` created by
/// the migrations for the one-record-per-day invariant.
#[derive(Debug, Clone)]
pub struct MySqlAttendanceStore {
    pool: MySqlPool,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn applied(&self, user_id: u64, date: NaiveDate) -> Result<Transition, StoreError> {
        self.find(user_id, date)
            .await?
            .map(Transition::Applied)
            .ok_or(StoreError::MissingAfterWrite { user_id, date })
    }
}

fn is_duplicate_key(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn find(
        &self,
        user_id: u64,
        date: NaiveDate,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let sql = format!("{SELECT_COLUMNS} WHERE user_id = ? AND date = ?");
        let record = sqlx::query_as::<_, AttendanceRecord>(&sql)
            .bind(user_id)
            .bind(date)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn record_check_in(
        &self,
        user_id: u64,
        date: NaiveDate,
        stamp: Stamp<'_>,
    ) -> Result<Transition, StoreError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO attendances
                (user_id, date, check_in, location_in, photo_in, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(stamp.at)
        .bind(stamp.location)
        .bind(stamp.photo_key)
        .bind(stamp.at)
        .bind(stamp.at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => return self.applied(user_id, date).await,
            Err(e) if is_duplicate_key(&e) => {
                debug!(user_id, %date, "Row exists, attempting guarded check-in");
            }
            Err(e) => return Err(e.into()),
        }

        // A row exists. Only a row that was never checked in may be claimed.
        let result = sqlx::query(
            r#"
            UPDATE attendances
            SET check_in = ?, location_in = ?, photo_in = ?,
                check_out = NULL, location_out = NULL, photo_out = NULL,
                updated_at = ?
            WHERE user_id = ?
            AND date = ?
            AND check_in IS NULL
            "#,
        )
        .bind(stamp.at)
        .bind(stamp.location)
        .bind(stamp.photo_key)
        .bind(stamp.at)
        .bind(user_id)
        .bind(date)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(Transition::Rejected);
        }
        self.applied(user_id, date).await
    }

    async fn record_check_out(
        &self,
        user_id: u64,
        date: NaiveDate,
        stamp: Stamp<'_>,
    ) -> Result<Transition, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE attendances
            SET check_out = ?, location_out = ?, photo_out = ?, updated_at = ?
            WHERE user_id = ?
            AND date = ?
            AND check_in IS NOT NULL
            AND check_out IS NULL
            "#,
        )
        .bind(stamp.at)
        .bind(stamp.location)
        .bind(stamp.photo_key)
        .bind(stamp.at)
        .bind(user_id)
        .bind(date)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(Transition::Rejected);
        }
        self.applied(user_id, date).await
    }

    async fn list(&self, filter: &AttendanceFilter) -> Result<Page<AttendanceRecord>, StoreError> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(user_id) = filter.user_id {
            where_sql.push_str(" AND user_id = ?");
            args.push(FilterValue::U64(user_id));
        }
        if let Some(from) = filter.from {
            where_sql.push_str(" AND date >= ?");
            args.push(FilterValue::Date(from));
        }
        if let Some(to) = filter.to {
            where_sql.push_str(" AND date <= ?");
            args.push(FilterValue::Date(to));
        }

        let count_sql = format!("SELECT COUNT(*) FROM attendances{}", where_sql);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::Date(d) => count_q.bind(*d),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let data_sql = format!(
            "{SELECT_COLUMNS}{where_sql} ORDER BY date DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut data_q = sqlx::query_as::<_, AttendanceRecord>(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(v),
                FilterValue::Date(d) => data_q.bind(d),
            };
        }
        let items = data_q
            .bind(filter.per_page)
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Page { items, total })
    }
}
