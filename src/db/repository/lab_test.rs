use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lookup criteria over the internal identity copies. Supplied criteria are ANDed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter<'a> {
    pub origin_id: Option<&'a str>,
    pub secondary_id: Option<&'a str>,
    pub hash: Option<&'a str>,
}

impl RecordFilter<'_> {
    pub fn is_empty(&self) -> bool {
        self.origin_id.is_none() && self.secondary_id.is_none() && self.hash.is_none()
    }
}

// Payload-specific scalar columns on lab_tests
#[derive(Default)]
struct ScalarColumns {
    substrate: Option<String>,
    conclusion: Option<String>,
    diagnostic_orientation: Option<String>,
    comments: Option<String>,
    resilience_index: Option<String>,
    fodmap_value: Option<String>,
    clinical_parameters: Option<String>,
    total_foods: Option<String>,
    total_elevated: Option<String>,
    total_borderline: Option<String>,
    total_normal: Option<String>,
}

impl ScalarColumns {
    fn from_fields(fields: &LabTestFields) -> Result<Self, DatabaseError> {
        let mut cols = ScalarColumns::default();
        if let Some(notes) = &fields.clinical_notes {
            cols.substrate = Some(notes.substrate.clone());
            cols.conclusion = Some(notes.conclusion.clone());
            cols.diagnostic_orientation = Some(notes.diagnostic_orientation.clone());
            cols.comments = Some(notes.comments.clone());
        }
        match &fields.payload {
            LabPayload::GasSeries(_) => {}
            LabPayload::Microbiota(panel) => {
                cols.resilience_index = panel.resilience_index.clone();
                cols.fodmap_value = panel.fodmap_value.clone();
                cols.clinical_parameters = panel
                    .clinical_parameters
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
            }
            LabPayload::Sensitivity(panel) => {
                cols.total_foods = Some(panel.summary.total_foods.clone());
                cols.total_elevated = Some(panel.summary.total_elevated.clone());
                cols.total_borderline = Some(panel.summary.total_borderline.clone());
                cols.total_normal = Some(panel.summary.total_normal.clone());
            }
        }
        Ok(cols)
    }
}

fn payload_kind(payload: &LabPayload) -> &'static str {
    payload.category().as_str()
}

pub fn insert_lab_test(
    conn: &Connection,
    id: &Uuid,
    fields: &LabTestFields,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let cols = ScalarColumns::from_fields(fields)?;
    let now = now.format(TIMESTAMP_FORMAT).to_string();
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO lab_tests (id, title, status, ui_type, payload_kind,
         origin_request_id, secondary_request_id, patient_name, doctor_name,
         substrate, conclusion, diagnostic_orientation, comments,
         resilience_index, fodmap_value, clinical_parameters,
         total_foods, total_elevated, total_borderline, total_normal,
         source_path, source_raw, source_hash,
         lookup_origin_id, lookup_secondary_id, lookup_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?27)",
        params![
            id.to_string(),
            fields.title,
            fields.status,
            fields.ui_type,
            payload_kind(&fields.payload),
            fields.origin_request_id,
            fields.secondary_request_id,
            fields.patient_name,
            fields.doctor_name,
            cols.substrate,
            cols.conclusion,
            cols.diagnostic_orientation,
            cols.comments,
            cols.resilience_index,
            cols.fodmap_value,
            cols.clinical_parameters,
            cols.total_foods,
            cols.total_elevated,
            cols.total_borderline,
            cols.total_normal,
            fields.source_path,
            fields.source_raw,
            fields.source_hash,
            fields.lookup_origin_id,
            fields.lookup_secondary_id,
            fields.lookup_hash,
            now,
        ],
    )?;

    write_payload(&tx, id, &fields.payload)?;
    tx.commit()?;
    Ok(())
}

/// Overwrite every field of an existing record; sub-records are fully replaced.
pub fn update_lab_test(
    conn: &Connection,
    id: &Uuid,
    fields: &LabTestFields,
    now: &NaiveDateTime,
) -> Result<(), DatabaseError> {
    let cols = ScalarColumns::from_fields(fields)?;
    let now = now.format(TIMESTAMP_FORMAT).to_string();
    let tx = conn.unchecked_transaction()?;

    let changed = tx.execute(
        "UPDATE lab_tests SET title = ?2, status = ?3, ui_type = ?4, payload_kind = ?5,
         origin_request_id = ?6, secondary_request_id = ?7, patient_name = ?8, doctor_name = ?9,
         substrate = ?10, conclusion = ?11, diagnostic_orientation = ?12, comments = ?13,
         resilience_index = ?14, fodmap_value = ?15, clinical_parameters = ?16,
         total_foods = ?17, total_elevated = ?18, total_borderline = ?19, total_normal = ?20,
         source_path = ?21, source_raw = ?22, source_hash = ?23,
         lookup_origin_id = ?24, lookup_secondary_id = ?25, lookup_hash = ?26, updated_at = ?27
         WHERE id = ?1",
        params![
            id.to_string(),
            fields.title,
            fields.status,
            fields.ui_type,
            payload_kind(&fields.payload),
            fields.origin_request_id,
            fields.secondary_request_id,
            fields.patient_name,
            fields.doctor_name,
            cols.substrate,
            cols.conclusion,
            cols.diagnostic_orientation,
            cols.comments,
            cols.resilience_index,
            cols.fodmap_value,
            cols.clinical_parameters,
            cols.total_foods,
            cols.total_elevated,
            cols.total_borderline,
            cols.total_normal,
            fields.source_path,
            fields.source_raw,
            fields.source_hash,
            fields.lookup_origin_id,
            fields.lookup_secondary_id,
            fields.lookup_hash,
            now,
        ],
    )?;

    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "lab_test".into(),
            id: id.to_string(),
        });
    }

    write_payload(&tx, id, &fields.payload)?;
    tx.commit()?;
    Ok(())
}

// Clears every sub-record table so a category change leaves no stale payload behind.
fn write_payload(tx: &Transaction<'_>, id: &Uuid, payload: &LabPayload) -> Result<(), DatabaseError> {
    let id = id.to_string();
    for table in ["gas_measurements", "microbiota_blocks", "sensitivity_results"] {
        tx.execute(
            &format!("DELETE FROM {table} WHERE lab_test_id = ?1"),
            params![id],
        )?;
    }

    match payload {
        LabPayload::GasSeries(rows) => {
            let mut stmt = tx.prepare(
                "INSERT INTO gas_measurements (lab_test_id, time_point, h2, ch4, co2)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for row in rows {
                stmt.execute(params![id, row.time_point, row.h2, row.ch4, row.co2])?;
            }
        }
        LabPayload::Microbiota(panel) => {
            let mut stmt = tx.prepare(
                "INSERT INTO microbiota_blocks (lab_test_id, position, name, description, items)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, block) in panel.blocks.iter().enumerate() {
                let items = serde_json::to_string(&block.items)?;
                stmt.execute(params![id, position as i64, block.name, block.description, items])?;
            }
        }
        LabPayload::Sensitivity(panel) => {
            let mut stmt = tx.prepare(
                "INSERT INTO sensitivity_results (lab_test_id, position, parameter, value, reference_range)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, row) in panel.rows.iter().enumerate() {
                stmt.execute(params![
                    id,
                    position as i64,
                    row.parameter,
                    row.value,
                    row.reference_range
                ])?;
            }
        }
    }
    Ok(())
}

/// First record (oldest) whose internal lookup copies match every supplied criterion.
pub fn find_lab_test_id(
    conn: &Connection,
    filter: &RecordFilter<'_>,
) -> Result<Option<Uuid>, DatabaseError> {
    if filter.is_empty() {
        return Ok(None);
    }

    let mut clauses = Vec::new();
    let mut values: Vec<&str> = Vec::new();
    for (column, value) in [
        ("lookup_origin_id", filter.origin_id),
        ("lookup_secondary_id", filter.secondary_id),
        ("lookup_hash", filter.hash),
    ] {
        if let Some(value) = value {
            values.push(value);
            clauses.push(format!("{column} = ?{}", values.len()));
        }
    }

    let sql = format!(
        "SELECT id FROM lab_tests WHERE {} ORDER BY created_at ASC, rowid ASC LIMIT 1",
        clauses.join(" AND ")
    );
    let id: Option<String> = conn
        .query_row(&sql, rusqlite::params_from_iter(values), |row| row.get(0))
        .optional()?;
    id.map(|s| parse_uuid(&s)).transpose()
}

pub fn find_lab_test_by_origin_id(
    conn: &Connection,
    origin_id: &str,
) -> Result<Option<Uuid>, DatabaseError> {
    let id: Option<String> = conn
        .query_row(
            "SELECT id FROM lab_tests WHERE origin_request_id = ?1
             ORDER BY created_at ASC, rowid ASC LIMIT 1",
            params![origin_id],
            |row| row.get(0),
        )
        .optional()?;
    id.map(|s| parse_uuid(&s)).transpose()
}

pub fn list_lab_tests_for_user(conn: &Connection, user_id: i64) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id FROM lab_tests WHERE linked_user_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;
    let ids = stmt
        .query_map(params![user_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    ids.iter().map(|s| parse_uuid(s)).collect()
}

/// Replace the record's classification label with the seeded term for `category`.
pub fn assign_lab_test_category(
    conn: &Connection,
    id: &Uuid,
    category: TestCategory,
) -> Result<(), DatabaseError> {
    let category_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM categories WHERE name = ?1",
            params![category.display_name()],
            |row| row.get(0),
        )
        .optional()?;

    // Seed on demand if an operator removed the term.
    let category_id = match category_id {
        Some(cid) => cid,
        None => {
            conn.execute(
                "INSERT INTO categories (name, slug) VALUES (?1, ?2)",
                params![category.display_name(), category.as_str()],
            )?;
            conn.last_insert_rowid()
        }
    };

    conn.execute(
        "INSERT INTO lab_test_categories (lab_test_id, category_id) VALUES (?1, ?2)
         ON CONFLICT(lab_test_id) DO UPDATE SET category_id = excluded.category_id",
        params![id.to_string(), category_id],
    )?;
    Ok(())
}

pub fn set_lab_test_pdf_url(conn: &Connection, id: &Uuid, url: &str) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE lab_tests SET pdf_url = ?2 WHERE id = ?1",
        params![id.to_string(), url],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "lab_test".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn get_lab_test(conn: &Connection, id: &Uuid) -> Result<Option<LabTestRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT t.id, t.title, t.status, t.ui_type, t.payload_kind,
             t.origin_request_id, t.secondary_request_id, t.patient_name, t.doctor_name,
             t.substrate, t.conclusion, t.diagnostic_orientation, t.comments,
             t.resilience_index, t.fodmap_value, t.clinical_parameters,
             t.total_foods, t.total_elevated, t.total_borderline, t.total_normal,
             t.source_path, t.source_raw, t.source_hash,
             t.lookup_origin_id, t.lookup_secondary_id, t.lookup_hash,
             t.pdf_url, t.linked_user_id, t.created_at, t.updated_at, c.name
             FROM lab_tests t
             LEFT JOIN lab_test_categories ltc ON ltc.lab_test_id = t.id
             LEFT JOIN categories c ON c.id = ltc.category_id
             WHERE t.id = ?1",
            params![id.to_string()],
            lab_test_row_from_rusqlite,
        )
        .optional()?;

    match row {
        Some(row) => Ok(Some(lab_test_from_row(conn, row)?)),
        None => Ok(None),
    }
}

pub fn count_lab_tests(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM lab_tests", [], |row| row.get(0))?;
    Ok(count)
}

// Internal row type for LabTestRecord mapping
struct LabTestRow {
    id: String,
    title: String,
    status: String,
    ui_type: String,
    payload_kind: String,
    origin_request_id: String,
    secondary_request_id: String,
    patient_name: String,
    doctor_name: String,
    substrate: Option<String>,
    conclusion: Option<String>,
    diagnostic_orientation: Option<String>,
    comments: Option<String>,
    resilience_index: Option<String>,
    fodmap_value: Option<String>,
    clinical_parameters: Option<String>,
    total_foods: Option<String>,
    total_elevated: Option<String>,
    total_borderline: Option<String>,
    total_normal: Option<String>,
    source_path: String,
    source_raw: Vec<u8>,
    source_hash: String,
    lookup_origin_id: String,
    lookup_secondary_id: String,
    lookup_hash: String,
    pdf_url: Option<String>,
    linked_user_id: Option<i64>,
    created_at: String,
    updated_at: String,
    category_name: Option<String>,
}

fn lab_test_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<LabTestRow, rusqlite::Error> {
    Ok(LabTestRow {
        id: row.get(0)?,
        title: row.get(1)?,
        status: row.get(2)?,
        ui_type: row.get(3)?,
        payload_kind: row.get(4)?,
        origin_request_id: row.get(5)?,
        secondary_request_id: row.get(6)?,
        patient_name: row.get(7)?,
        doctor_name: row.get(8)?,
        substrate: row.get(9)?,
        conclusion: row.get(10)?,
        diagnostic_orientation: row.get(11)?,
        comments: row.get(12)?,
        resilience_index: row.get(13)?,
        fodmap_value: row.get(14)?,
        clinical_parameters: row.get(15)?,
        total_foods: row.get(16)?,
        total_elevated: row.get(17)?,
        total_borderline: row.get(18)?,
        total_normal: row.get(19)?,
        source_path: row.get(20)?,
        source_raw: row.get(21)?,
        source_hash: row.get(22)?,
        lookup_origin_id: row.get(23)?,
        lookup_secondary_id: row.get(24)?,
        lookup_hash: row.get(25)?,
        pdf_url: row.get(26)?,
        linked_user_id: row.get(27)?,
        created_at: row.get(28)?,
        updated_at: row.get(29)?,
        category_name: row.get(30)?,
    })
}

fn lab_test_from_row(conn: &Connection, row: LabTestRow) -> Result<LabTestRecord, DatabaseError> {
    let id = parse_uuid(&row.id)?;
    let kind = TestCategory::from_str(&row.payload_kind)?;

    let payload = match kind {
        TestCategory::GasBreathTest => LabPayload::GasSeries(load_gas_measurements(conn, &row.id)?),
        TestCategory::GutMicrobiota => LabPayload::Microbiota(MicrobiotaPanel {
            blocks: load_microbiota_blocks(conn, &row.id)?,
            resilience_index: row.resilience_index,
            fodmap_value: row.fodmap_value,
            clinical_parameters: row
                .clinical_parameters
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
        }),
        TestCategory::FoodSensitivity => LabPayload::Sensitivity(SensitivityPanel {
            rows: load_sensitivity_rows(conn, &row.id)?,
            summary: SensitivitySummary {
                total_foods: row.total_foods.unwrap_or_default(),
                total_elevated: row.total_elevated.unwrap_or_default(),
                total_borderline: row.total_borderline.unwrap_or_default(),
                total_normal: row.total_normal.unwrap_or_default(),
            },
        }),
    };

    let clinical_notes = match kind {
        TestCategory::GasBreathTest => Some(ClinicalNotes {
            substrate: row.substrate.unwrap_or_default(),
            conclusion: row.conclusion.unwrap_or_default(),
            diagnostic_orientation: row.diagnostic_orientation.unwrap_or_default(),
            comments: row.comments.unwrap_or_default(),
        }),
        _ => None,
    };

    Ok(LabTestRecord {
        id,
        category: row.category_name.as_deref().and_then(TestCategory::from_display_name),
        fields: LabTestFields {
            title: row.title,
            status: row.status,
            ui_type: row.ui_type,
            origin_request_id: row.origin_request_id,
            secondary_request_id: row.secondary_request_id,
            patient_name: row.patient_name,
            doctor_name: row.doctor_name,
            clinical_notes,
            payload,
            source_path: row.source_path,
            source_raw: row.source_raw,
            source_hash: row.source_hash,
            lookup_origin_id: row.lookup_origin_id,
            lookup_secondary_id: row.lookup_secondary_id,
            lookup_hash: row.lookup_hash,
        },
        pdf_url: row.pdf_url,
        linked_user_id: row.linked_user_id,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

fn load_gas_measurements(conn: &Connection, id: &str) -> Result<Vec<GasMeasurement>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT time_point, h2, ch4, co2 FROM gas_measurements
         WHERE lab_test_id = ?1 ORDER BY time_point ASC",
    )?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok(GasMeasurement {
                time_point: row.get(0)?,
                h2: row.get(1)?,
                ch4: row.get(2)?,
                co2: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_microbiota_blocks(conn: &Connection, id: &str) -> Result<Vec<MicrobiotaBlock>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT name, description, items FROM microbiota_blocks
         WHERE lab_test_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(name, description, items)| -> Result<MicrobiotaBlock, DatabaseError> {
            Ok(MicrobiotaBlock {
                name,
                description,
                items: serde_json::from_str(&items)?,
            })
        })
        .collect()
}

fn load_sensitivity_rows(conn: &Connection, id: &str) -> Result<Vec<SensitivityRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT parameter, value, reference_range FROM sensitivity_results
         WHERE lab_test_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt
        .query_map(params![id], |row| {
            Ok(SensitivityRow {
                parameter: row.get(0)?,
                value: row.get(1)?,
                reference_range: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_timestamp(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap_or_default()
}
