use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One attendance day of one user. `(user_id, date)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 1,
        "user_id": 42,
        "date": "2026-01-05",
        "check_in": "2026-01-05T09:00:00",
        "check_out": null,
        "location_in": "Office A",
        "location_out": null,
        "photo_in": "20260105_090000_000_42_in.jpg",
        "photo_out": null,
        "created_at": "2026-01-05T09:00:00",
        "updated_at": "2026-01-05T09:00:00"
    })
)]
pub struct AttendanceRecord {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = 42)]
    pub user_id: u64,

    #[schema(example = "2026-01-05", value_type = String, format = "date")]
    pub date: NaiveDate,

    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub check_in: Option<NaiveDateTime>,

    #[schema(value_type = Option<String>, format = "date-time", nullable = true)]
    pub check_out: Option<NaiveDateTime>,

    #[schema(example = "Office A", nullable = true)]
    pub location_in: Option<String>,

    #[schema(nullable = true)]
    pub location_out: Option<String>,

    /// Storage key of the check-in photo
    #[schema(nullable = true)]
    pub photo_in: Option<String>,

    /// Storage key of the check-out photo
    #[schema(nullable = true)]
    pub photo_out: Option<String>,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,

    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
}

/// Where a user stands for a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceState {
    NotStarted,
    CheckedIn,
    CheckedOut,
}

impl AttendanceState {
    pub fn of(record: Option<&AttendanceRecord>) -> Self {
        // a stray check-out without a check-in does not count as a day started
        match record {
            Some(r) if r.check_in.is_none() => AttendanceState::NotStarted,
            Some(r) if r.check_out.is_some() => AttendanceState::CheckedOut,
            Some(_) => AttendanceState::CheckedIn,
            None => AttendanceState::NotStarted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AttendanceRecord {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let at = date.and_hms_opt(9, 0, 0).unwrap();
        AttendanceRecord {
            id: 1,
            user_id: 42,
            date,
            check_in: None,
            check_out: None,
            location_in: None,
            location_out: None,
            photo_in: None,
            photo_out: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn state_follows_populated_timestamps() {
        assert_eq!(AttendanceState::of(None), AttendanceState::NotStarted);

        let mut r = record();
        assert_eq!(AttendanceState::of(Some(&r)), AttendanceState::NotStarted);

        r.check_in = Some(r.created_at);
        assert_eq!(AttendanceState::of(Some(&r)), AttendanceState::CheckedIn);

        r.check_out = Some(r.created_at);
        assert_eq!(AttendanceState::of(Some(&r)), AttendanceState::CheckedOut);
        assert_eq!(AttendanceState::CheckedOut.to_string(), "checked_out");
    }

    #[test]
    fn check_out_without_check_in_is_not_started() {
        let mut r = record();
        r.check_out = Some(r.created_at);
        assert_eq!(AttendanceState::of(Some(&r)), AttendanceState::NotStarted);
    }

    #[test]
    fn serializes_with_snake_case_fields_and_nulls() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["date"], "2026-01-05");
        assert!(json["check_in"].is_null());
        assert!(json.get("photo_out").is_some());
    }
}
