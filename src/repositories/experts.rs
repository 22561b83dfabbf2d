use diesel::prelude::*;
use crate::{
    models::records::{HumanExpert, NewHumanExpert},
    repositories::call_history::epoch_now,
    DbPool,
};

pub struct ExpertRepository {
    pool: DbPool,
}

impl ExpertRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(
        &self,
        number: &str,
        field: &str,
        tool_id: &str,
    ) -> Result<HumanExpert, diesel::result::Error> {
        use crate::schema::human_experts::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let new_expert = NewHumanExpert {
            phone_number: number.to_string(),
            expert_field: field.to_string(),
            vapi_tool_id: tool_id.to_string(),
            is_active: true,
            created_at: epoch_now(),
        };
        diesel::insert_into(crate::schema::human_experts::table)
            .values(&new_expert)
            .execute(&mut conn)?;

        human_experts
            .filter(vapi_tool_id.eq(tool_id))
            .select(HumanExpert::as_select())
            .first(&mut conn)
    }

    pub fn active(&self) -> Result<Vec<HumanExpert>, diesel::result::Error> {
        use crate::schema::human_experts::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        human_experts
            .filter(is_active.eq(true))
            .order(created_at.desc())
            .select(HumanExpert::as_select())
            .load(&mut conn)
    }

    /// Hard delete. The transferCall tool stays registered remotely but is no
    /// longer attached to new calls.
    pub fn delete(&self, expert_id: i32) -> Result<Option<HumanExpert>, diesel::result::Error> {
        use crate::schema::human_experts::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let existing: Option<HumanExpert> = human_experts
            .find(expert_id)
            .select(HumanExpert::as_select())
            .first(&mut conn)
            .optional()?;

        if existing.is_some() {
            diesel::delete(human_experts.find(expert_id)).execute(&mut conn)?;
        }
        Ok(existing)
    }
}
