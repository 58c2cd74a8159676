use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::error::{AttendanceError, ValidationErrors};
use crate::model::attendance::{AttendanceRecord, AttendanceState};
use crate::photo::{ImageFormat, PhotoEvent, PhotoIngestor, PhotoPayload, StorageError};
use crate::photo::storage::validate_key;
use crate::store::{AttendanceFilter, AttendanceStore, Page, Stamp, Transition};

/// Enforces `NotStarted -> CheckedIn -> CheckedOut` per user per day.
///
/// Photo evidence is written before the record transition and gates it; a
/// transition that loses a race leaves the photo orphaned.
pub struct AttendanceService {
    store: Arc<dyn AttendanceStore>,
    ingestor: PhotoIngestor,
    clock: Arc<dyn Clock>,
}

impl AttendanceService {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        ingestor: PhotoIngestor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ingestor,
            clock,
        }
    }

    /// The caller's record for the server's current date, if any.
    #[instrument(name = "attendance_today", skip(self))]
    pub async fn today(&self, user_id: u64) -> Result<Option<AttendanceRecord>, AttendanceError> {
        let today = self.clock.today();
        Ok(self.store.find(user_id, today).await?)
    }

    #[instrument(name = "attendance_check_in", skip(self, location, photo))]
    pub async fn check_in(
        &self,
        user_id: u64,
        location: &str,
        photo: PhotoPayload,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let today = self.clock.today();

        let current = self.store.find(user_id, today).await?;
        if AttendanceState::of(current.as_ref()) != AttendanceState::NotStarted {
            info!(%today, "Rejected check-in: already checked in");
            return Err(AttendanceError::AlreadyCheckedIn);
        }

        let artifact = self.ingestor.ingest(photo, user_id, PhotoEvent::In).await?;

        let stamp = Stamp {
            at: self.clock.now(),
            location,
            photo_key: &artifact.storage_key,
        };
        match self.store.record_check_in(user_id, today, stamp).await {
            Ok(Transition::Applied(record)) => {
                info!(%today, photo = %artifact.storage_key, "Checked in");
                Ok(record)
            }
            Ok(Transition::Rejected) => {
                warn!(photo = %artifact.storage_key, "Concurrent check-in won; photo orphaned");
                Err(AttendanceError::AlreadyCheckedIn)
            }
            Err(e) => {
                warn!(photo = %artifact.storage_key, error = %e, "Check-in write failed; photo orphaned");
                Err(e.into())
            }
        }
    }

    #[instrument(name = "attendance_check_out", skip(self, location, photo))]
    pub async fn check_out(
        &self,
        user_id: u64,
        location: &str,
        photo: PhotoPayload,
    ) -> Result<AttendanceRecord, AttendanceError> {
        let today = self.clock.today();

        let current = self.store.find(user_id, today).await?;
        guard_check_out(AttendanceState::of(current.as_ref()))?;

        let artifact = self.ingestor.ingest(photo, user_id, PhotoEvent::Out).await?;

        let stamp = Stamp {
            at: self.clock.now(),
            location,
            photo_key: &artifact.storage_key,
        };
        match self.store.record_check_out(user_id, today, stamp).await {
            Ok(Transition::Applied(record)) => {
                info!(%today, photo = %artifact.storage_key, "Checked out");
                Ok(record)
            }
            Ok(Transition::Rejected) => {
                warn!(photo = %artifact.storage_key, "Check-out guard failed; photo orphaned");
                let latest = self.store.find(user_id, today).await?;
                guard_check_out(AttendanceState::of(latest.as_ref()))?;
                // row still looks open; report it as the conflict it raced with
                Err(AttendanceError::AlreadyCheckedOut)
            }
            Err(e) => {
                warn!(photo = %artifact.storage_key, error = %e, "Check-out write failed; photo orphaned");
                Err(e.into())
            }
        }
    }

    /// Admin view over all records.
    #[instrument(name = "attendance_list", skip(self))]
    pub async fn list(
        &self,
        filter: &AttendanceFilter,
    ) -> Result<Page<AttendanceRecord>, AttendanceError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                let mut errors = ValidationErrors::new();
                errors.add("from", "The from date must be a date before or equal to to.");
                return Err(AttendanceError::Validation(errors));
            }
        }
        Ok(self.store.list(filter).await?)
    }

    /// Reads a stored photo for the admin view.
    #[instrument(name = "attendance_photo", skip(self))]
    pub async fn photo(&self, key: &str) -> Result<(Vec<u8>, ImageFormat), AttendanceError> {
        if validate_key(key).is_err() {
            let mut errors = ValidationErrors::new();
            errors.add("key", "The key is not a valid photo key.");
            return Err(AttendanceError::Validation(errors));
        }

        let bytes = match self.ingestor.store().read(key).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound(_)) => return Err(AttendanceError::PhotoNotFound),
            Err(e) => return Err(AttendanceError::PhotoUnavailable(e)),
        };

        let format = ImageFormat::sniff(&bytes)
            .or_else(|| key.rsplit_once('.').and_then(|(_, ext)| ImageFormat::from_extension(ext)))
            .unwrap_or(ImageFormat::Jpg);
        Ok((bytes, format))
    }
}

fn guard_check_out(state: AttendanceState) -> Result<(), AttendanceError> {
    match state {
        AttendanceState::NotStarted => Err(AttendanceError::NotCheckedIn),
        AttendanceState::CheckedOut => Err(AttendanceError::AlreadyCheckedOut),
        AttendanceState::CheckedIn => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::photo::{MemoryPhotoStore, PhotoStore};
    use crate::store::{MemoryAttendanceStore, StoreError};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};

    const P1: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x01];
    const P2: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x02];

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 5)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn upload(bytes: &[u8]) -> PhotoPayload {
        PhotoPayload::Binary {
            bytes: bytes.to_vec(),
            extension: None,
        }
    }

    struct Harness {
        service: AttendanceService,
        clock: Arc<ManualClock>,
        records: Arc<MemoryAttendanceStore>,
        photos: Arc<MemoryPhotoStore>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let records = Arc::new(MemoryAttendanceStore::new());
        let photos = Arc::new(MemoryPhotoStore::new());
        let ingestor = PhotoIngestor::new(photos.clone(), clock.clone());
        let service = AttendanceService::new(records.clone(), ingestor, clock.clone());
        Harness {
            service,
            clock,
            records,
            photos,
        }
    }

    #[actix_web::test]
    async fn full_day_lifecycle() {
        let h = harness();

        let record = h.service.check_in(42, "Office A", upload(P1)).await.unwrap();
        assert_eq!(record.check_in, Some(at(9, 0)));
        assert_eq!(record.location_in.as_deref(), Some("Office A"));

        let today = h.service.today(42).await.unwrap().unwrap();
        assert_eq!(today.check_in, Some(at(9, 0)));
        assert_eq!(today.check_out, None);

        h.clock.set(at(9, 5));
        let err = h.service.check_in(42, "Office B", upload(P1)).await.unwrap_err();
        assert!(matches!(err, AttendanceError::AlreadyCheckedIn));
        assert_eq!(h.service.today(42).await.unwrap(), Some(today));
        assert_eq!(h.photos.keys().len(), 1);

        h.clock.set(at(17, 0));
        let record = h.service.check_out(42, "Office A", upload(P2)).await.unwrap();
        assert_eq!(record.check_in, Some(at(9, 0)));
        assert_eq!(record.check_out, Some(at(17, 0)));
        assert_eq!(record.location_out.as_deref(), Some("Office A"));
        let photo_out = record.photo_out.clone().unwrap();
        assert!(photo_out.ends_with("_42_out.png"));
        assert_eq!(h.photos.read(&photo_out).await.unwrap(), P2);

        h.clock.set(at(17, 5));
        let err = h.service.check_out(42, "Office A", upload(P2)).await.unwrap_err();
        assert!(matches!(err, AttendanceError::AlreadyCheckedOut));
        assert_eq!(h.service.today(42).await.unwrap(), Some(record));
    }

    #[actix_web::test]
    async fn today_is_empty_before_any_event() {
        let h = harness();
        assert_eq!(h.service.today(42).await.unwrap(), None);
    }

    #[actix_web::test]
    async fn check_out_before_check_in_changes_nothing() {
        let h = harness();

        let err = h.service.check_out(42, "Office A", upload(P1)).await.unwrap_err();

        assert!(matches!(err, AttendanceError::NotCheckedIn));
        assert!(h.records.is_empty());
        assert!(h.photos.keys().is_empty());
    }

    #[actix_web::test]
    async fn a_new_day_starts_a_new_record() {
        let h = harness();
        h.service.check_in(42, "Office A", upload(P1)).await.unwrap();

        h.clock.set(at(9, 0) + chrono::Duration::days(1));
        let record = h.service.check_in(42, "Office A", upload(P1)).await.unwrap();

        assert_eq!(record.date, NaiveDate::from_ymd_opt(2026, 1, 6).unwrap());
        assert_eq!(h.records.len(), 2);
    }

    #[actix_web::test]
    async fn users_are_independent() {
        let h = harness();
        h.service.check_in(1, "Office A", upload(P1)).await.unwrap();
        h.service.check_in(2, "Office B", upload(P1)).await.unwrap();

        let err = h.service.check_out(3, "Office A", upload(P1)).await.unwrap_err();
        assert!(matches!(err, AttendanceError::NotCheckedIn));
        assert_eq!(h.records.len(), 2);
    }

    /// Yields after every lookup so concurrent requests interleave between
    /// their state check and their write.
    struct YieldingReads(MemoryAttendanceStore);

    #[async_trait]
    impl AttendanceStore for YieldingReads {
        async fn find(
            &self,
            user_id: u64,
            date: NaiveDate,
        ) -> Result<Option<AttendanceRecord>, StoreError> {
            let found = self.0.find(user_id, date).await;
            actix_web::rt::task::yield_now().await;
            found
        }

        async fn record_check_in(
            &self,
            user_id: u64,
            date: NaiveDate,
            stamp: Stamp<'_>,
        ) -> Result<Transition, StoreError> {
            self.0.record_check_in(user_id, date, stamp).await
        }

        async fn record_check_out(
            &self,
            user_id: u64,
            date: NaiveDate,
            stamp: Stamp<'_>,
        ) -> Result<Transition, StoreError> {
            self.0.record_check_out(user_id, date, stamp).await
        }

        async fn list(
            &self,
            filter: &AttendanceFilter,
        ) -> Result<Page<AttendanceRecord>, StoreError> {
            self.0.list(filter).await
        }
    }

    #[actix_web::test]
    async fn concurrent_check_ins_admit_exactly_one() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let records = Arc::new(YieldingReads(MemoryAttendanceStore::new()));
        let photos = Arc::new(MemoryPhotoStore::new());
        let service = AttendanceService::new(
            records.clone(),
            PhotoIngestor::new(photos.clone(), clock.clone()),
            clock,
        );

        let attempts = (0..8).map(|_| service.check_in(42, "Office A", upload(P1)));
        let results = futures::future::join_all(attempts).await;

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(AttendanceError::AlreadyCheckedIn)))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(records.0.len(), 1);
    }

    #[actix_web::test]
    async fn concurrent_check_outs_admit_exactly_one() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let records = Arc::new(YieldingReads(MemoryAttendanceStore::new()));
        let photos = Arc::new(MemoryPhotoStore::new());
        let service = AttendanceService::new(
            records.clone(),
            PhotoIngestor::new(photos.clone(), clock.clone()),
            clock.clone(),
        );
        service.check_in(42, "Office A", upload(P1)).await.unwrap();

        clock.set(at(17, 0));
        let attempts = (0..4).map(|_| service.check_out(42, "Office A", upload(P2)));
        let results = futures::future::join_all(attempts).await;

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(AttendanceError::AlreadyCheckedOut)))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 3);
    }

    /// Serves one stale lookup showing today's row still open, as a request
    /// that read just before a concurrent check-out committed would see.
    struct StaleOpenRow {
        inner: MemoryAttendanceStore,
        stale: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl AttendanceStore for StaleOpenRow {
        async fn find(
            &self,
            user_id: u64,
            date: NaiveDate,
        ) -> Result<Option<AttendanceRecord>, StoreError> {
            let mut found = self.inner.find(user_id, date).await?;
            if self.stale.swap(false, std::sync::atomic::Ordering::SeqCst) {
                if let Some(record) = found.as_mut() {
                    record.check_out = None;
                    record.location_out = None;
                    record.photo_out = None;
                }
            }
            Ok(found)
        }

        async fn record_check_in(
            &self,
            user_id: u64,
            date: NaiveDate,
            stamp: Stamp<'_>,
        ) -> Result<Transition, StoreError> {
            self.inner.record_check_in(user_id, date, stamp).await
        }

        async fn record_check_out(
            &self,
            user_id: u64,
            date: NaiveDate,
            stamp: Stamp<'_>,
        ) -> Result<Transition, StoreError> {
            self.inner.record_check_out(user_id, date, stamp).await
        }

        async fn list(
            &self,
            filter: &AttendanceFilter,
        ) -> Result<Page<AttendanceRecord>, StoreError> {
            self.inner.list(filter).await
        }
    }

    #[actix_web::test]
    async fn losing_the_check_out_race_reports_already_checked_out() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let records = Arc::new(StaleOpenRow {
            inner: MemoryAttendanceStore::new(),
            stale: std::sync::atomic::AtomicBool::new(false),
        });
        let photos = Arc::new(MemoryPhotoStore::new());
        let service = AttendanceService::new(
            records.clone(),
            PhotoIngestor::new(photos.clone(), clock.clone()),
            clock.clone(),
        );

        service.check_in(42, "Office A", upload(P1)).await.unwrap();
        clock.set(at(17, 0));
        let winner = service.check_out(42, "Office A", upload(P2)).await.unwrap();

        clock.set(at(17, 1));
        records.stale.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = service.check_out(42, "Home", upload(P2)).await.unwrap_err();

        assert!(matches!(err, AttendanceError::AlreadyCheckedOut));
        // the winner's check-out is untouched; the loser's photo is orphaned
        let stored = records.inner.find(42, at(9, 0).date()).await.unwrap().unwrap();
        assert_eq!(stored, winner);
        assert_eq!(photos.keys().len(), 3);
        assert!(photos.keys().iter().any(|k| k.starts_with("20260105_170100_000_42_out")));
    }

    #[actix_web::test]
    async fn stray_check_out_fields_do_not_count_as_a_started_day() {
        let h = harness();
        h.records.insert(AttendanceRecord {
            id: 0,
            user_id: 42,
            date: at(9, 0).date(),
            check_in: None,
            check_out: Some(at(8, 0)),
            location_in: None,
            location_out: Some("Home".to_string()),
            photo_in: None,
            photo_out: Some("old.jpg".to_string()),
            created_at: at(8, 0),
            updated_at: at(8, 0),
        });

        let err = h.service.check_out(42, "Office A", upload(P2)).await.unwrap_err();
        assert!(matches!(err, AttendanceError::NotCheckedIn));
        assert!(h.photos.keys().is_empty());

        let record = h.service.check_in(42, "Office A", upload(P1)).await.unwrap();
        assert_eq!(record.check_in, Some(at(9, 0)));
        assert_eq!(record.check_out, None);
        assert_eq!(record.location_out, None);
        assert_eq!(record.photo_out, None);
        assert_eq!(h.records.len(), 1);
    }

    /// Answers every lookup with "nothing yet", as a racing reader would see.
    struct StaleReads(MemoryAttendanceStore);

    #[async_trait]
    impl AttendanceStore for StaleReads {
        async fn find(
            &self,
            _: u64,
            _: NaiveDate,
        ) -> Result<Option<AttendanceRecord>, StoreError> {
            Ok(None)
        }

        async fn record_check_in(
            &self,
            user_id: u64,
            date: NaiveDate,
            stamp: Stamp<'_>,
        ) -> Result<Transition, StoreError> {
            self.0.record_check_in(user_id, date, stamp).await
        }

        async fn record_check_out(
            &self,
            user_id: u64,
            date: NaiveDate,
            stamp: Stamp<'_>,
        ) -> Result<Transition, StoreError> {
            self.0.record_check_out(user_id, date, stamp).await
        }

        async fn list(
            &self,
            filter: &AttendanceFilter,
        ) -> Result<Page<AttendanceRecord>, StoreError> {
            self.0.list(filter).await
        }
    }

    #[actix_web::test]
    async fn losing_the_write_race_reports_already_checked_in() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let photos = Arc::new(MemoryPhotoStore::new());
        let service = AttendanceService::new(
            Arc::new(StaleReads(MemoryAttendanceStore::new())),
            PhotoIngestor::new(photos.clone(), clock.clone()),
            clock.clone(),
        );

        service.check_in(42, "Office A", upload(P1)).await.unwrap();
        clock.set(at(9, 1));
        let err = service.check_in(42, "Office A", upload(P1)).await.unwrap_err();

        assert!(matches!(err, AttendanceError::AlreadyCheckedIn));
        // the loser's photo stays behind as an orphan
        assert_eq!(photos.keys().len(), 2);
    }

    struct BrokenPhotos;

    #[async_trait]
    impl PhotoStore for BrokenPhotos {
        async fn ensure_ready(&self) -> Result<(), StorageError> {
            Ok(())
        }

        async fn put(&self, key: &str, _: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::other("disk full"),
            })
        }

        async fn exists(&self, _: &str) -> Result<bool, StorageError> {
            Ok(false)
        }

        async fn size(&self, key: &str) -> Result<u64, StorageError> {
            Err(StorageError::NotFound(key.to_string()))
        }

        async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
            Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::other("disk gone"),
            })
        }
    }

    #[actix_web::test]
    async fn photo_failure_blocks_the_transition() {
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let records = Arc::new(MemoryAttendanceStore::new());
        let service = AttendanceService::new(
            records.clone(),
            PhotoIngestor::new(Arc::new(BrokenPhotos), clock.clone()),
            clock,
        );

        let err = service.check_in(42, "Office A", upload(P1)).await.unwrap_err();

        assert!(matches!(err, AttendanceError::PhotoPersistFailure(_)));
        assert!(records.is_empty());

        let err = service.photo("a.jpg").await.unwrap_err();
        assert!(matches!(err, AttendanceError::PhotoUnavailable(_)));
    }

    #[actix_web::test]
    async fn photo_lookup_validates_key_and_reports_missing() {
        let h = harness();
        let record = h.service.check_in(42, "Office A", upload(P1)).await.unwrap();

        let (bytes, format) = h.service.photo(record.photo_in.as_deref().unwrap()).await.unwrap();
        assert_eq!(bytes, P1);
        assert_eq!(format, ImageFormat::Jpg);

        assert!(matches!(
            h.service.photo("../secret").await,
            Err(AttendanceError::Validation(_))
        ));
        assert!(matches!(
            h.service.photo("missing.png").await,
            Err(AttendanceError::PhotoNotFound)
        ));
    }

    #[actix_web::test]
    async fn list_rejects_inverted_ranges() {
        let h = harness();
        let filter = AttendanceFilter {
            from: NaiveDate::from_ymd_opt(2026, 2, 1),
            to: NaiveDate::from_ymd_opt(2026, 1, 1),
            page: 1,
            per_page: 10,
            ..Default::default()
        };

        let err = h.service.list(&filter).await.unwrap_err();
        match err {
            AttendanceError::Validation(errors) => assert!(errors.field("from").is_some()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
