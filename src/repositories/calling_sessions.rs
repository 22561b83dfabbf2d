use diesel::prelude::*;
use crate::{
    models::records::{CallingSession, NewCallingSession},
    repositories::call_history::epoch_now,
    schema::calling_sessions,
    DbPool,
};

pub struct CallingSessionRepository {
    pool: DbPool,
}

impl CallingSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn start(&self, new_session_id: &str) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let new_session = NewCallingSession {
            session_id: new_session_id.to_string(),
            is_active: true,
            started_at: epoch_now(),
            ended_at: None,
        };
        diesel::insert_into(calling_sessions::table)
            .values(&new_session)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn find_active(&self) -> Result<Option<CallingSession>, diesel::result::Error> {
        use crate::schema::calling_sessions::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        calling_sessions
            .filter(is_active.eq(true))
            .order(started_at.desc())
            .select(CallingSession::as_select())
            .first(&mut conn)
            .optional()
    }

    /// Returns false when no session with that id exists.
    pub fn stop(&self, target_session_id: &str) -> Result<bool, diesel::result::Error> {
        use crate::schema::calling_sessions::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let updated = diesel::update(calling_sessions.filter(session_id.eq(target_session_id)))
            .set((is_active.eq(false), ended_at.eq(Some(epoch_now()))))
            .execute(&mut conn)?;
        Ok(updated > 0)
    }
}
