//! Persistence port for the ingestion pipeline.
//!
//! The pipeline and the detail view depend only on [`LabRecordStore`]. There is a
//! single adapter, [`SqliteLabStore`], backed by the migrated SQLite schema.

use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::{self, DatabaseError, RecordFilter};
use crate::models::enums::TestCategory;
use crate::models::{LabTestFields, LabTestRecord, RunLogEntry};

pub trait LabRecordStore {
    /// Create a record and return its identity.
    fn create(&self, fields: &LabTestFields) -> Result<Uuid, DatabaseError>;

    /// Overwrite every field and sub-record of an existing record.
    fn update(&self, id: &Uuid, fields: &LabTestFields) -> Result<(), DatabaseError>;

    /// First record whose lookup copies match all supplied criteria.
    fn find_one(&self, filter: &RecordFilter<'_>) -> Result<Option<Uuid>, DatabaseError>;

    /// Set the single classification label, replacing any prior one.
    fn assign_category(&self, id: &Uuid, category: TestCategory) -> Result<(), DatabaseError>;

    fn set_pdf_url(&self, id: &Uuid, url: &str) -> Result<(), DatabaseError>;

    fn get(&self, id: &Uuid) -> Result<Option<LabTestRecord>, DatabaseError>;

    /// Lookup by the displayed origin request id (not the internal lookup copy).
    fn find_by_origin_id(&self, origin_id: &str) -> Result<Option<Uuid>, DatabaseError>;

    fn list_for_user(&self, user_id: i64) -> Result<Vec<Uuid>, DatabaseError>;

    fn prepend_log_entry(&self, entry: &RunLogEntry, capacity: usize) -> Result<(), DatabaseError>;

    /// Newest first.
    fn read_log(&self) -> Result<Vec<RunLogEntry>, DatabaseError>;

    fn set_last_run(&self, at: &NaiveDateTime) -> Result<(), DatabaseError>;

    fn last_run(&self) -> Result<Option<NaiveDateTime>, DatabaseError>;

    fn try_acquire_run_lock(
        &self,
        holder: &str,
        now: &NaiveDateTime,
        ttl_secs: i64,
    ) -> Result<bool, DatabaseError>;

    fn release_run_lock(&self, holder: &str) -> Result<(), DatabaseError>;
}

pub struct SqliteLabStore {
    conn: Connection,
}

impl SqliteLabStore {
    /// Open (and migrate) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: db::open_database(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: db::open_memory_database()?,
        })
    }

    /// Direct connection access for administrative flows outside the port.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

impl LabRecordStore for SqliteLabStore {
    fn create(&self, fields: &LabTestFields) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        db::insert_lab_test(&self.conn, &id, fields, &now())?;
        Ok(id)
    }

    fn update(&self, id: &Uuid, fields: &LabTestFields) -> Result<(), DatabaseError> {
        db::update_lab_test(&self.conn, id, fields, &now())
    }

    fn find_one(&self, filter: &RecordFilter<'_>) -> Result<Option<Uuid>, DatabaseError> {
        db::find_lab_test_id(&self.conn, filter)
    }

    fn assign_category(&self, id: &Uuid, category: TestCategory) -> Result<(), DatabaseError> {
        db::assign_lab_test_category(&self.conn, id, category)
    }

    fn set_pdf_url(&self, id: &Uuid, url: &str) -> Result<(), DatabaseError> {
        db::set_lab_test_pdf_url(&self.conn, id, url)
    }

    fn get(&self, id: &Uuid) -> Result<Option<LabTestRecord>, DatabaseError> {
        db::get_lab_test(&self.conn, id)
    }

    fn find_by_origin_id(&self, origin_id: &str) -> Result<Option<Uuid>, DatabaseError> {
        db::find_lab_test_by_origin_id(&self.conn, origin_id)
    }

    fn list_for_user(&self, user_id: i64) -> Result<Vec<Uuid>, DatabaseError> {
        db::list_lab_tests_for_user(&self.conn, user_id)
    }

    fn prepend_log_entry(&self, entry: &RunLogEntry, capacity: usize) -> Result<(), DatabaseError> {
        db::prepend_run_log_entry(&self.conn, entry, capacity)
    }

    fn read_log(&self) -> Result<Vec<RunLogEntry>, DatabaseError> {
        db::read_run_log(&self.conn)
    }

    fn set_last_run(&self, at: &NaiveDateTime) -> Result<(), DatabaseError> {
        db::set_last_run(&self.conn, at)
    }

    fn last_run(&self) -> Result<Option<NaiveDateTime>, DatabaseError> {
        db::get_last_run(&self.conn)
    }

    fn try_acquire_run_lock(
        &self,
        holder: &str,
        now: &NaiveDateTime,
        ttl_secs: i64,
    ) -> Result<bool, DatabaseError> {
        db::try_acquire_run_lock(&self.conn, holder, now, ttl_secs)
    }

    fn release_run_lock(&self, holder: &str) -> Result<(), DatabaseError> {
        db::release_run_lock(&self.conn, holder)
    }
}
