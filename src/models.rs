// src/models.rs
use chrono::{DateTime, Utc};
use mongodb::bson::{oid::ObjectId, Bson, Document};
use serde::{Deserialize, Serialize};
use validator::Validate;

// --- 1. Plant documents ---

/// One watering event, embedded in the plant document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterEvent {
    pub at: DateTime<Utc>,
    pub by: String,
}

/// Stored plant record. `deleted` and `notes` tolerate absence so documents
/// written by earlier variants still deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plant {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub owner: String,
    pub name: String,
    pub water_interval_days: i64,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub last_watered: DateTime<Utc>,
    #[serde(default)]
    pub water_history: Vec<WaterEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl Plant {
    /// A fresh plant carries exactly one seed watering entry, and
    /// `last_watered` mirrors that entry's timestamp.
    pub fn new(
        owner: String,
        name: String,
        water_interval_days: i64,
        notes: String,
        first_watered: DateTime<Utc>,
        photo: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let seed = WaterEvent {
            at: first_watered,
            by: owner.clone(),
        };
        Self {
            id: None,
            owner,
            name,
            water_interval_days,
            notes,
            created_at,
            last_watered: seed.at,
            water_history: vec![seed],
            photo,
            deleted: false,
        }
    }
}

/// One staged field change, reported back to the client and recorded in the
/// update activity's `extra.changes`.
#[derive(Debug, Clone, Serialize)]
pub struct Change {
    pub field: &'static str,
    pub from: Bson,
    pub to: Bson,
}

// --- 2. Activity documents ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityAction {
    Create,
    Update,
    Delete,
    Restore,
    Water,
}

/// Append-only audit record, one per successful plant mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub owner: String,
    pub action: ActivityAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plant_name: Option<String>,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Document>,
}

// --- 3. Users and auth schemas ---

#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub username: String,
    // Never leaves the backend: users are not serialized into responses.
    pub password_hash: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterSchema {
    #[validate(length(min = 3, max = 30, message = "username must be 3-30 characters"))]
    pub username: String,
    #[validate(length(min = 5, max = 32, message = "password must be 5-32 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginSchema {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub username: String,
}

// --- 4. Query parameters ---

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub nome: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FilterQuery {
    pub order: Option<String>,
    pub dir: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub plant_id: Option<String>,
    pub day: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn new_plant_has_one_seed_watering() {
        let now = Utc::now();
        let plant = Plant::new(
            "u1".into(),
            "Ficus".into(),
            3,
            String::new(),
            now,
            None,
            now,
        );
        assert_eq!(plant.water_history.len(), 1);
        assert_eq!(plant.last_watered, plant.water_history[0].at);
        assert_eq!(plant.water_history[0].by, "u1");
        assert!(!plant.deleted);
        assert_eq!(plant.water_interval_days, 3);
    }

    #[test]
    fn plant_tolerates_missing_optional_fields() {
        let now = Utc::now();
        let doc = doc! {
            "owner": "u1",
            "name": "Cactus",
            "water_interval_days": 7_i64,
            "created_at": mongodb::bson::to_bson(&now).unwrap(),
            "last_watered": mongodb::bson::to_bson(&now).unwrap(),
        };
        let plant: Plant = mongodb::bson::from_document(doc).unwrap();
        assert!(!plant.deleted);
        assert!(plant.notes.is_empty());
        assert!(plant.water_history.is_empty());
        assert!(plant.photo.is_none());
    }

    #[test]
    fn activity_actions_serialize_lowercase() {
        let json = serde_json::to_value(ActivityAction::Water).unwrap();
        assert_eq!(json, serde_json::json!("water"));
        let back: ActivityAction = serde_json::from_value(json).unwrap();
        assert_eq!(back, ActivityAction::Water);
    }
}
