// src/plants.rs
//
// Plant store: owns the plant lifecycle (create, read, update with change
// tracking, soft-delete, restore, watering) and appends one activity entry
// per successful mutation.
use axum::{
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    Json,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, to_bson, Bson, Document};
use serde_json::{json, Map, Value};

use crate::activities::log_activity;
use crate::auth::AuthUser;
use crate::models::{ActivityAction, Change, FilterQuery, Plant, SearchQuery, WaterEvent};
use crate::uploads::store_photo;
use crate::{AppError, AppState};

pub const DEFAULT_WATER_INTERVAL_DAYS: i64 = 7;

// --- Request body handling ---

/// Create/update body: a JSON object or a multipart form with text fields
/// plus an optional `photo` file part. Values are held as JSON values so
/// both transports share the same lenient coercions.
pub struct PlantForm {
    fields: Map<String, Value>,
    photo: Option<(String, Vec<u8>)>,
}

impl PlantForm {
    pub async fn read(req: Request, state: &AppState) -> Result<Self, AppError> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let Json(value) = Json::<Value>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
            return Ok(Self::from_json(value));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;

        let mut fields = Map::new();
        let mut photo = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "photo" {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                if !filename.is_empty() {
                    photo = Some((filename, data.to_vec()));
                }
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                fields.insert(name, Value::String(text));
            }
        }

        Ok(Self { fields, photo })
    }

    fn from_json(value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            fields,
            photo: None,
        }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

// --- Lenient field coercions ---

/// Intervals arrive as integers from JSON and strings from multipart.
fn opt_interval(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Absent or unparsable intervals fall back to the default instead of
/// failing the request. No range check: zero and negatives pass through.
fn parse_interval(value: Option<&Value>) -> i64 {
    opt_interval(value).unwrap_or(DEFAULT_WATER_INTERVAL_DAYS)
}

/// Any past-or-present first-watering timestamp is accepted; unparsable or
/// strictly-future values are discarded in favor of `now`.
fn resolve_first_watering(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return now;
    };

    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.and_utc())
        });

    match parsed {
        Some(at) if at <= now => at,
        _ => now,
    }
}

// --- Update staging ---

#[derive(Debug, Default, PartialEq)]
struct PlantPatch {
    name: Option<String>,
    water_interval_days: Option<i64>,
    notes: Option<String>,
}

impl PlantPatch {
    /// Blank names and unparsable intervals are dropped. An explicit empty
    /// `notes` string is kept: absent and empty differ.
    fn from_form(form: &PlantForm) -> Self {
        Self {
            name: form
                .str_field("name")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
            water_interval_days: opt_interval(form.fields.get("water_interval_days")),
            notes: form.str_field("notes").map(String::from),
        }
    }
}

/// Stage every present-and-different field as a `$set` entry plus a
/// `{field, from, to}` change tuple.
fn compute_changes(plant: &Plant, patch: &PlantPatch) -> (Document, Vec<Change>) {
    let mut set = Document::new();
    let mut changes = Vec::new();

    if let Some(name) = &patch.name {
        if *name != plant.name {
            changes.push(Change {
                field: "name",
                from: Bson::String(plant.name.clone()),
                to: Bson::String(name.clone()),
            });
            set.insert("name", name.clone());
        }
    }
    if let Some(days) = patch.water_interval_days {
        if days != plant.water_interval_days {
            changes.push(Change {
                field: "water_interval_days",
                from: Bson::Int64(plant.water_interval_days),
                to: Bson::Int64(days),
            });
            set.insert("water_interval_days", days);
        }
    }
    if let Some(notes) = &patch.notes {
        if *notes != plant.notes {
            changes.push(Change {
                field: "notes",
                from: Bson::String(plant.notes.clone()),
                to: Bson::String(notes.clone()),
            });
            set.insert("notes", notes.clone());
        }
    }

    (set, changes)
}

// --- Queries ---

fn visible_filter(owner: &str) -> Document {
    doc! { "owner": owner, "deleted": { "$ne": true } }
}

async fn drain(mut cursor: mongodb::Cursor<Plant>) -> Result<Vec<Plant>, AppError> {
    let mut plants = Vec::new();
    while let Some(plant) = cursor.try_next().await? {
        plants.push(plant);
    }
    Ok(plants)
}

// --- Handlers ---

// GET /api/plants
pub async fn list_plants_handler(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Plant>>, AppError> {
    let cursor = state.plants().find(visible_filter(&user.id)).await?;
    Ok(Json(drain(cursor).await?))
}

// POST /api/plants
pub async fn create_plant_handler(
    user: AuthUser,
    State(state): State<AppState>,
    req: Request,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let form = PlantForm::read(req, &state).await?;

    let name = form.str_field("name").unwrap_or_default().to_string();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }

    let now = Utc::now();
    let water_interval_days = parse_interval(form.fields.get("water_interval_days"));
    let notes = form.str_field("notes").unwrap_or_default().to_string();
    let first_watered = resolve_first_watering(form.str_field("first_watering_at"), now);

    // The upload completes before the plant references its filename.
    let photo = match &form.photo {
        Some((original, data)) => Some(store_photo(&state.upload_dir, original, data).await?),
        None => None,
    };

    let plant = Plant::new(
        user.id.clone(),
        name.clone(),
        water_interval_days,
        notes,
        first_watered,
        photo,
        now,
    );
    let inserted = state.plants().insert_one(plant).await?;
    let id = inserted
        .inserted_id
        .as_object_id()
        .ok_or(AppError::Internal)?
        .to_hex();

    log_activity(
        &state,
        &user.id,
        ActivityAction::Create,
        Some(&id),
        Some(&name),
        Some(doc! { "first_watered": to_bson(&first_watered)? }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(json!({ "_id": id }))))
}

// GET /api/plants/:id
pub async fn get_plant_handler(
    _user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Plant>, AppError> {
    let oid =
        ObjectId::parse_str(&id).map_err(|_| AppError::NotFound("plant not found".into()))?;

    // Direct lookup bypasses the soft-delete filter.
    let plant = state
        .plants()
        .find_one(doc! { "_id": oid })
        .await?
        .ok_or_else(|| AppError::NotFound("plant not found".into()))?;

    Ok(Json(plant))
}

// PUT|PATCH /api/plants/:id
pub async fn update_plant_handler(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    req: Request,
) -> Result<Json<Value>, AppError> {
    let oid =
        ObjectId::parse_str(&id).map_err(|_| AppError::NotFound("plant not found".into()))?;
    let form = PlantForm::read(req, &state).await?;

    let plant = state
        .plants()
        .find_one(doc! { "_id": oid, "owner": &user.id })
        .await?
        .ok_or_else(|| AppError::NotFound("plant not found".into()))?;

    let patch = PlantPatch::from_form(&form);
    let (mut set, mut changes) = compute_changes(&plant, &patch);

    let photo_changed = form.photo.is_some();
    if let Some((original, data)) = &form.photo {
        let filename = store_photo(&state.upload_dir, original, data).await?;
        changes.push(Change {
            field: "photo",
            from: plant.photo.clone().map(Bson::String).unwrap_or(Bson::Null),
            to: Bson::String(filename.clone()),
        });
        set.insert("photo", filename);
    }

    if changes.is_empty() {
        return Err(AppError::BadRequest("nothing to update".into()));
    }

    state
        .plants()
        .update_one(doc! { "_id": oid, "owner": &user.id }, doc! { "$set": set })
        .await?;

    let updated: Vec<&str> = changes.iter().map(|c| c.field).collect();
    log_activity(
        &state,
        &user.id,
        ActivityAction::Update,
        Some(&oid.to_hex()),
        Some(&plant.name),
        Some(doc! { "changes": to_bson(&changes)?, "photo_changed": photo_changed }),
    )
    .await;

    Ok(Json(json!({
        "ok": true,
        "updated": updated,
        "changes": changes,
        "photo_changed": photo_changed,
    })))
}

// DELETE /api/plants/:id
pub async fn delete_plant_handler(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    // Idempotent delete: malformed and unknown ids are a zero-count success.
    let Ok(oid) = ObjectId::parse_str(&id) else {
        return Ok(Json(json!({ "deleted": 0 })));
    };

    let Some(snapshot) = state
        .plants()
        .find_one(doc! { "_id": oid, "owner": &user.id })
        .await?
    else {
        return Ok(Json(json!({ "deleted": 0 })));
    };

    let result = state
        .plants()
        .update_one(
            doc! { "_id": oid, "owner": &user.id },
            doc! { "$set": { "deleted": true } },
        )
        .await?;

    if result.modified_count > 0 {
        log_activity(
            &state,
            &user.id,
            ActivityAction::Delete,
            Some(&oid.to_hex()),
            Some(&snapshot.name),
            Some(doc! { "plant_data": to_bson(&snapshot)? }),
        )
        .await;
    }

    Ok(Json(json!({ "deleted": result.modified_count })))
}

// POST /api/plants/:id/restore
pub async fn restore_plant_handler(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let oid = ObjectId::parse_str(&id)
        .map_err(|_| AppError::NotFound("plant not found or not deleted".into()))?;

    let result = state
        .plants()
        .update_one(
            doc! { "_id": oid, "owner": &user.id, "deleted": true },
            doc! { "$set": { "deleted": false } },
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::NotFound("plant not found or not deleted".into()));
    }

    if let Some(plant) = state
        .plants()
        .find_one(doc! { "_id": oid, "owner": &user.id })
        .await?
    {
        log_activity(
            &state,
            &user.id,
            ActivityAction::Restore,
            Some(&oid.to_hex()),
            Some(&plant.name),
            Some(doc! { "plant_data": to_bson(&plant)? }),
        )
        .await;
    }

    Ok(Json(json!({ "restored": true })))
}

// POST /api/plants/:id/water
pub async fn water_plant_handler(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let oid =
        ObjectId::parse_str(&id).map_err(|_| AppError::NotFound("plant not found".into()))?;

    let event = WaterEvent {
        at: Utc::now(),
        by: user.id.clone(),
    };

    // History append and last-watered bump in one atomic document update.
    let result = state
        .plants()
        .update_one(
            doc! { "_id": oid, "owner": &user.id },
            doc! {
                "$push": { "water_history": to_bson(&event)? },
                "$set": { "last_watered": to_bson(&event.at)? },
            },
        )
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::NotFound("plant not found".into()));
    }

    let plant_name = state
        .plants()
        .find_one(doc! { "_id": oid })
        .await?
        .map(|p| p.name);
    log_activity(
        &state,
        &user.id,
        ActivityAction::Water,
        Some(&oid.to_hex()),
        plant_name.as_deref(),
        None,
    )
    .await;

    Ok(Json(json!({ "ok": true })))
}

// GET /api/plants/search?nome=
pub async fn search_plants_handler(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Plant>>, AppError> {
    let mut filter = visible_filter(&user.id);
    if let Some(pattern) = query.nome.as_deref().filter(|s| !s.is_empty()) {
        filter.insert("name", doc! { "$regex": pattern, "$options": "i" });
    }

    let cursor = state.plants().find(filter).await?;
    Ok(Json(drain(cursor).await?))
}

// GET /api/plants/filter?order=&dir=
pub async fn filter_plants_handler(
    user: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<Plant>>, AppError> {
    let plants = state.plants();
    let find = plants.find(visible_filter(&user.id));

    // The sort field is forwarded as given; ascending unless dir=desc.
    let find = match query
        .order
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(field) => {
            let direction: i32 = if query.dir.as_deref() == Some("desc") { -1 } else { 1 };
            let mut sort = Document::new();
            sort.insert(field, direction);
            find.sort(sort)
        }
        None => find,
    };

    Ok(Json(drain(find.await?).await?))
}

// POST /api/plants/:id/upload
pub async fn upload_photo_handler(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, AppError> {
    let oid =
        ObjectId::parse_str(&id).map_err(|_| AppError::NotFound("plant not found".into()))?;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("photo") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            upload = Some((filename, data.to_vec()));
        }
    }

    let Some((original, data)) = upload else {
        return Err(AppError::BadRequest("no file attached".into()));
    };
    if original.is_empty() {
        return Err(AppError::BadRequest("empty filename".into()));
    }

    let filename = store_photo(&state.upload_dir, &original, &data).await?;

    // Referencing a missing plant is a silent no-op, like the delete path.
    state
        .plants()
        .update_one(
            doc! { "_id": oid, "owner": &user.id },
            doc! { "$set": { "photo": filename.as_str() } },
        )
        .await?;

    Ok(Json(json!({ "filename": filename })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_plant() -> Plant {
        let now = Utc::now();
        Plant::new(
            "u1".into(),
            "Ficus".into(),
            7,
            "sunny spot".into(),
            now,
            None,
            now,
        )
    }

    fn form(value: Value) -> PlantForm {
        PlantForm::from_json(value)
    }

    #[test]
    fn interval_defaults_on_absent_or_unparsable() {
        assert_eq!(parse_interval(None), DEFAULT_WATER_INTERVAL_DAYS);
        assert_eq!(parse_interval(Some(&json!(3))), 3);
        assert_eq!(parse_interval(Some(&json!("4"))), 4);
        assert_eq!(parse_interval(Some(&json!(" 5 "))), 5);
        assert_eq!(parse_interval(Some(&json!("often"))), DEFAULT_WATER_INTERVAL_DAYS);
        assert_eq!(parse_interval(Some(&json!(null))), DEFAULT_WATER_INTERVAL_DAYS);
        // No range validation: zero and negatives pass through.
        assert_eq!(parse_interval(Some(&json!(-2))), -2);
        assert_eq!(parse_interval(Some(&json!(0))), 0);
    }

    #[test]
    fn future_first_watering_falls_back_to_now() {
        let now = Utc::now();
        let future = (now + Duration::days(1)).to_rfc3339();
        assert_eq!(resolve_first_watering(Some(&future), now), now);
    }

    #[test]
    fn past_first_watering_is_kept() {
        let now = Utc::now();
        let past = now - Duration::days(2);
        assert_eq!(
            resolve_first_watering(Some(&past.to_rfc3339()), now),
            past
        );
    }

    #[test]
    fn unparsable_first_watering_falls_back_to_now() {
        let now = Utc::now();
        assert_eq!(resolve_first_watering(Some("last tuesday"), now), now);
        assert_eq!(resolve_first_watering(Some(""), now), now);
        assert_eq!(resolve_first_watering(None, now), now);
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let now = Utc::now();
        let at = resolve_first_watering(Some("2020-01-01T08:30:00"), now);
        assert_eq!(at.to_rfc3339(), "2020-01-01T08:30:00+00:00");
    }

    #[test]
    fn patch_drops_blank_name_and_bad_interval() {
        let patch = PlantPatch::from_form(&form(json!({
            "name": "   ",
            "water_interval_days": "weekly",
        })));
        assert_eq!(patch, PlantPatch::default());
    }

    #[test]
    fn patch_keeps_explicit_empty_notes() {
        let patch = PlantPatch::from_form(&form(json!({ "notes": "" })));
        assert_eq!(patch.notes, Some(String::new()));

        let absent = PlantPatch::from_form(&form(json!({})));
        assert_eq!(absent.notes, None);
    }

    #[test]
    fn non_object_bodies_read_as_empty_forms() {
        let patch = PlantPatch::from_form(&form(json!("just a string")));
        assert_eq!(patch, PlantPatch::default());
    }

    #[test]
    fn unchanged_fields_stage_nothing() {
        let plant = sample_plant();
        let patch = PlantPatch::from_form(&form(json!({
            "name": "Ficus",
            "water_interval_days": 7,
            "notes": "sunny spot",
        })));
        let (set, changes) = compute_changes(&plant, &patch);
        assert!(set.is_empty());
        assert!(changes.is_empty());
    }

    #[test]
    fn changed_fields_are_staged_with_from_and_to() {
        let plant = sample_plant();
        let patch = PlantPatch::from_form(&form(json!({
            "name": "Ficus benjamina",
            "water_interval_days": "3",
        })));
        let (set, changes) = compute_changes(&plant, &patch);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].field, "name");
        assert_eq!(changes[0].from, Bson::String("Ficus".into()));
        assert_eq!(changes[0].to, Bson::String("Ficus benjamina".into()));
        assert_eq!(changes[1].field, "water_interval_days");
        assert_eq!(changes[1].from, Bson::Int64(7));
        assert_eq!(changes[1].to, Bson::Int64(3));

        assert_eq!(set.get_str("name").unwrap(), "Ficus benjamina");
        assert_eq!(set.get_i64("water_interval_days").unwrap(), 3);
    }

    #[test]
    fn clearing_notes_counts_as_a_change() {
        let plant = sample_plant();
        let patch = PlantPatch::from_form(&form(json!({ "notes": "" })));
        let (_, changes) = compute_changes(&plant, &patch);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "notes");
        assert_eq!(changes[0].to, Bson::String(String::new()));
    }
}
