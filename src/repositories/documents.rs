use diesel::prelude::*;
use crate::{
    models::records::{KnowledgeDocument, NewKnowledgeDocument},
    repositories::call_history::epoch_now,
    schema::knowledge_documents,
    DbPool,
};

pub struct DocumentRepository {
    pool: DbPool,
}

impl DocumentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn create(&self, file_id: &str, name: &str) -> Result<(), diesel::result::Error> {
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let new_doc = NewKnowledgeDocument {
            vapi_file_id: file_id.to_string(),
            file_name: name.to_string(),
            created_at: epoch_now(),
        };
        diesel::insert_into(knowledge_documents::table)
            .values(&new_doc)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<KnowledgeDocument>, diesel::result::Error> {
        use crate::schema::knowledge_documents::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        knowledge_documents
            .order(created_at.desc())
            .select(KnowledgeDocument::as_select())
            .load(&mut conn)
    }

    /// Every stored vapi file id. This is the full list the knowledge query
    /// tool gets re-synced with after an upload or delete.
    pub fn all_file_ids(&self) -> Result<Vec<String>, diesel::result::Error> {
        use crate::schema::knowledge_documents::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        knowledge_documents.select(vapi_file_id).load(&mut conn)
    }

    /// Returns false when the file id was not stored locally.
    pub fn delete_by_file_id(&self, file_id: &str) -> Result<bool, diesel::result::Error> {
        use crate::schema::knowledge_documents::dsl::*;
        let mut conn = self.pool.get().expect("Failed to get DB connection");

        let deleted = diesel::delete(knowledge_documents.filter(vapi_file_id.eq(file_id)))
            .execute(&mut conn)?;
        Ok(deleted > 0)
    }
}
