use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use meddle_scheduler::{plan_course_edit, plan_new_course};
use meddle_types::api::{Claims, MedicationRequest, MedicationResponse, MedicationSearch};

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /medications`: validate the course and seed its schedule.
pub async fn create_medication(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MedicationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = state.clock.now();
    let plan = plan_new_course(&req, claims.sub, now, &state.dosage)?;

    let medication = state
        .blocking(move |db| db.insert_medication(&plan, now))
        .await?;

    info!(
        medication_id = medication.id,
        user_id = %claims.sub,
        next = %medication.next_dosage_time,
        "Medication course created"
    );
    Ok((StatusCode::CREATED, Json(MedicationResponse::from(medication))))
}

/// `PUT /medications/{id}`: rewrite the course and restart its schedule.
/// A finished course stays finished.
pub async fn update_medication(
    State(state): State<AppState>,
    Path(medication_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MedicationRequest>,
) -> Result<Json<MedicationResponse>, ApiError> {
    let now = state.clock.now();
    let plan = plan_course_edit(&req, claims.sub, &state.dosage)?;
    let user_id = claims.sub;

    let updated = state
        .blocking(move |db| {
            if !db.update_medication(medication_id, &plan, now)? {
                return Ok(None);
            }
            db.get_medication(medication_id, user_id)
        })
        .await?
        .ok_or_else(ApiError::medication_not_found)?;

    info!(medication_id, user_id = %user_id, "Medication course updated");
    Ok(Json(updated.into()))
}

pub async fn get_medication(
    State(state): State<AppState>,
    Path(medication_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MedicationResponse>, ApiError> {
    let user_id = claims.sub;
    let medication = state
        .blocking(move |db| db.get_medication(medication_id, user_id))
        .await?
        .ok_or_else(ApiError::medication_not_found)?;

    Ok(Json(medication.into()))
}

pub async fn list_medications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MedicationResponse>>, ApiError> {
    let user_id = claims.sub;
    let medications = state
        .blocking(move |db| db.list_medications(user_id))
        .await?;

    Ok(Json(medications.into_iter().map(Into::into).collect()))
}

/// `GET /medications/search`: the caller's courses matching every filter given.
pub async fn search_medications(
    State(state): State<AppState>,
    Query(search): Query<MedicationSearch>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MedicationResponse>>, ApiError> {
    let user_id = claims.sub;
    let medications = state
        .blocking(move |db| db.search_medications(user_id, &search))
        .await?;

    Ok(Json(medications.into_iter().map(Into::into).collect()))
}

/// `GET /medications/next`: running courses, soonest dose first.
pub async fn next_medications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<MedicationResponse>>, ApiError> {
    let user_id = claims.sub;
    let medications = state
        .blocking(move |db| db.list_next_medications(user_id))
        .await?;

    Ok(Json(medications.into_iter().map(Into::into).collect()))
}
