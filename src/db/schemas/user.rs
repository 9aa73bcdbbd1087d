//! User account schema
//!
//! Farm accounts created via `/auth/signUp`.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for user accounts
pub const USER_COLLECTION: &str = "userdatas";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub full_name: String,

    /// Login email, unique across accounts
    pub email: String,

    /// Argon2 password hash
    pub password: String,

    pub created_at: DateTime,
}

impl UserDoc {
    pub fn new(full_name: String, email: String, password_hash: String) -> Self {
        Self {
            id: None,
            full_name,
            email,
            password: password_hash,
            created_at: DateTime::now(),
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "email": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("email_unique".to_string())
                    .build(),
            ),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_doc_field_names() {
        let user = UserDoc::new("Asha Rao".into(), "asha@example.com".into(), "$argon2id$x".into());
        let doc = bson::to_document(&user).unwrap();

        assert!(!doc.contains_key("_id"));
        assert_eq!(doc.get_str("fullName").unwrap(), "Asha Rao");
        assert_eq!(doc.get_str("password").unwrap(), "$argon2id$x");
        assert!(doc.get_datetime("createdAt").is_ok());
    }
}
