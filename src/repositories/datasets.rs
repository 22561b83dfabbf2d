use diesel::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use crate::{
    models::records::{DatasetRow, NewDatasetRow},
    repositories::call_history::epoch_now,
    schema::connected_datasets,
    DbPool,
};

/// A connected dataset with its JSON columns parsed. The row snapshot is what
/// the in-call query tool searches; for sheet-backed datasets it is kept in
/// sync with the remote sheet on every append.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    pub id: i32,
    pub name: String,
    pub source_type: String,
    pub summary: String,
    pub columns: Vec<String>,
    pub tool_ids: Vec<String>,
    pub rows: Vec<Value>,
    pub connection: Value,
    pub created_at: i32,
}

pub struct NewDataset {
    pub name: String,
    pub source_type: String,
    pub summary: String,
    pub columns: Vec<String>,
    pub tool_ids: Vec<String>,
    pub rows: Vec<Value>,
    pub connection: Value,
}

fn parse_dataset(row: DatasetRow) -> Dataset {
    // A malformed stored blob should not take the whole listing down.
    let columns = serde_json::from_str(&row.columns_json).unwrap_or_else(|e| {
        warn!("Bad columns_json for dataset {}: {}", row.id, e);
        Vec::new()
    });
    let tool_ids = serde_json::from_str(&row.tool_ids_json).unwrap_or_else(|e| {
        warn!("Bad tool_ids_json for dataset {}: {}", row.id, e);
        Vec::new()
    });
    let rows = serde_json::from_str(&row.rows_json).unwrap_or_else(|e| {
        warn!("Bad rows_json for dataset {}: {}", row.id, e);
        Vec::new()
    });
    let connection =
        serde_json::from_str(&row.connection_json).unwrap_or(Value::Object(Default::default()));

    Dataset {
        id: row.id,
        name: row.name,
        source_type: row.source_type,
        summary: row.summary,
        columns,
        tool_ids,
        rows,
        connection,
        created_at: row.created_at,
    }
}

pub struct DatasetRepository {
    pool: DbPool,
}

impl DatasetRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(&self, dataset: NewDataset) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let new_row = NewDatasetRow {
            name: dataset.name,
            source_type: dataset.source_type,
            summary: dataset.summary,
            columns_json: serde_json::to_string(&dataset.columns).unwrap_or_else(|_| "[]".into()),
            tool_ids_json: serde_json::to_string(&dataset.tool_ids).unwrap_or_else(|_| "[]".into()),
            rows_json: serde_json::to_string(&dataset.rows).unwrap_or_else(|_| "[]".into()),
            connection_json: serde_json::to_string(&dataset.connection)
                .unwrap_or_else(|_| "{}".into()),
            created_at: epoch_now(),
        };
        diesel::insert_into(connected_datasets::table)
            .values(&new_row)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<Dataset>, diesel::result::Error> {
        use crate::schema::connected_datasets::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let rows: Vec<DatasetRow> = connected_datasets
            .order(created_at.desc())
            .select(DatasetRow::as_select())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(parse_dataset).collect())
    }

    /// Number of rows removed; duplicate names are purged together.
    pub fn delete_by_name(&self, target: &str) -> Result<usize, diesel::result::Error> {
        use crate::schema::connected_datasets::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        diesel::delete(connected_datasets.filter(name.eq(target))).execute(&mut conn)
    }

    /// Append one record to the stored snapshot, keeping it in sync with the
    /// remote sheet after a write-tool invocation.
    pub fn append_row(&self, dataset_id: i32, record: &Value) -> Result<(), diesel::result::Error> {
        use crate::schema::connected_datasets::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let row: DatasetRow = connected_datasets
            .find(dataset_id)
            .select(DatasetRow::as_select())
            .first(&mut conn)?;

        let mut rows: Vec<Value> = serde_json::from_str(&row.rows_json).unwrap_or_default();
        rows.push(record.clone());
        let updated = serde_json::to_string(&rows).unwrap_or_else(|_| "[]".into());

        diesel::update(connected_datasets.find(dataset_id))
            .set(rows_json.eq(updated))
            .execute(&mut conn)?;
        Ok(())
    }
}
