use diesel::prelude::*;
use chrono::Utc;
use crate::{
    models::records::{CallRecord, NewCallRecord},
    DbPool,
};

pub struct CallHistoryRepository {
    pool: DbPool,
}

impl CallHistoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create or update the record for a vapi call id. The webhook can fire
    /// more than once for the same call, so the last report wins.
    pub fn upsert_report(&self, report: NewCallRecord) -> Result<(), diesel::result::Error> {
        use crate::schema::call_history::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let existing: Option<CallRecord> = call_history
            .filter(call_id.eq(&report.call_id))
            .select(CallRecord::as_select())
            .first(&mut conn)
            .optional()?;

        match existing {
            Some(record) => {
                diesel::update(call_history.find(record.id))
                    .set((
                        phone_number.eq(&report.phone_number),
                        status.eq(&report.status),
                        duration_secs.eq(report.duration_secs),
                        started_at.eq(report.started_at),
                        ended_at.eq(report.ended_at),
                        summary.eq(&report.summary),
                        recording_url.eq(&report.recording_url),
                        assistant_id.eq(&report.assistant_id),
                    ))
                    .execute(&mut conn)?;
            }
            None => {
                diesel::insert_into(crate::schema::call_history::table)
                    .values(&report)
                    .execute(&mut conn)?;
            }
        }
        Ok(())
    }

    /// Newest first, optionally narrowed to one status.
    pub fn list(
        &self,
        status_filter: Option<&str>,
    ) -> Result<Vec<CallRecord>, diesel::result::Error> {
        use crate::schema::call_history::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let mut query = call_history.into_boxed();
        if let Some(wanted) = status_filter {
            query = query.filter(status.eq(wanted.to_string()));
        }
        query
            .order(created_at.desc())
            .select(CallRecord::as_select())
            .load(&mut conn)
    }
}

pub fn epoch_now() -> i32 {
    Utc::now().timestamp() as i32
}
