//! Customer record endpoints.
//!
//! Every route requires an authenticated caller; destructive and bulk
//! operations additionally require an administrator. Customer email is
//! opt-in: the welcome mail only goes out when the record allows it.

use anyhow::{Context, Result};
use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::email::{send_best_effort, EmailMessage, Mailer};
use crate::api::error::ApiError;

use super::auth::principal::require_auth;
use super::auth::types::Role;
use super::auth::AuthState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    pub id: String,
    pub is_active: bool,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    pub address: String,
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    pub company_phone_number: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub preferred_language: Option<String>,
    pub is_email_allowed: bool,
    pub notes: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Notes arrive as a single string on create and as either shape on update.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Notes {
    One(String),
    Many(Vec<String>),
}

impl Notes {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(note) => vec![note],
            Self::Many(notes) => notes,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerRequest {
    pub is_active: Option<bool>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub address: String,
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    pub company_phone_number: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub preferred_language: Option<String>,
    pub is_email_allowed: Option<bool>,
    pub notes: Option<Notes>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerRequest {
    pub is_active: Option<bool>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub company_name: Option<String>,
    pub company_address: Option<String>,
    pub company_phone_number: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub preferred_language: Option<String>,
    pub is_email_allowed: Option<bool>,
    pub notes: Option<Notes>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomerSearchQuery {
    pub filter: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomerEmailRequest {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[utoipa::path(
    post,
    path = "/api/customers",
    request_body = CreateCustomerRequest,
    responses(
        (status = 201, description = "Customer created", body = CustomerResponse),
        (status = 400, description = "Missing required fields"),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "customers"
)]
pub async fn create_customer(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<dyn Mailer>>,
    payload: Option<Json<CreateCustomerRequest>>,
) -> Response {
    if let Err(err) = require_auth(&headers, &pool, &auth_state).await {
        return err.into_response();
    }

    let Some(Json(request)) = payload else {
        return ApiError::BadRequest("Please provide all required fields.".to_string())
            .into_response();
    };

    if request.first_name.trim().is_empty()
        || request.last_name.trim().is_empty()
        || request.email.trim().is_empty()
        || request.phone_number.trim().is_empty()
        || request.address.trim().is_empty()
    {
        return ApiError::BadRequest("Please provide all required fields.".to_string())
            .into_response();
    }

    let send_welcome = request.is_email_allowed.unwrap_or(false);

    let created = match insert_customer(&pool, &request).await {
        Ok(record) => record,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    if send_welcome {
        let message = EmailMessage {
            to: created.email.clone(),
            subject: "Welcome to the Insight CRM!".to_string(),
            template: "blank".to_string(),
            payload_json: json!({
                "body": format!(
                    "Hello {} {},\n\nWelcome to the Insight CRM!",
                    created.first_name, created.last_name
                )
            })
            .to_string(),
        };
        send_best_effort(mailer.0.as_ref(), &message);
    }

    (StatusCode::CREATED, Json(created)).into_response()
}

#[utoipa::path(
    get,
    path = "/api/customers",
    responses(
        (status = 200, description = "All customers", body = [CustomerResponse]),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "customers"
)]
pub async fn list_customers(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(err) = require_auth(&headers, &pool, &auth_state).await {
        return err.into_response();
    }

    match fetch_customers(&pool, None).await {
        Ok(customers) => (StatusCode::OK, Json(customers)).into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/customers/search",
    params(("filter" = Option<String>, Query, description = "Free-text filter")),
    responses(
        (status = 200, description = "Matching customers", body = [CustomerResponse]),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "customers"
)]
pub async fn search_customers(
    Query(query): Query<CustomerSearchQuery>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(err) = require_auth(&headers, &pool, &auth_state).await {
        return err.into_response();
    }

    let filter = query
        .filter
        .map(|filter| filter.trim().to_string())
        .filter(|filter| !filter.is_empty());

    match fetch_customers(&pool, filter.as_deref()).await {
        Ok(customers) => (StatusCode::OK, Json(customers)).into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/customers/{id}",
    params(("id" = String, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer detail", body = CustomerResponse),
        (status = 400, description = "Invalid customer id"),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Customer not found")
    ),
    tag = "customers"
)]
pub async fn get_customer(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Err(err) = require_auth(&headers, &pool, &auth_state).await {
        return err.into_response();
    }
    let Ok(customer_id) = Uuid::parse_str(id.trim()) else {
        return ApiError::BadRequest("Invalid customer id.".to_string()).into_response();
    };

    match fetch_customer(&pool, customer_id).await {
        Ok(Some(customer)) => (StatusCode::OK, Json(customer)).into_response(),
        Ok(None) => ApiError::NotFound("Customer not found.".to_string()).into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/customers/{id}",
    params(("id" = String, Path, description = "Customer id")),
    request_body = UpdateCustomerRequest,
    responses(
        (status = 200, description = "Customer updated", body = CustomerResponse),
        (status = 400, description = "Invalid customer id"),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Customer not found")
    ),
    tag = "customers"
)]
pub async fn update_customer(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateCustomerRequest>>,
) -> Response {
    if let Err(err) = require_auth(&headers, &pool, &auth_state).await {
        return err.into_response();
    }
    let Ok(customer_id) = Uuid::parse_str(id.trim()) else {
        return ApiError::BadRequest("Invalid customer id.".to_string()).into_response();
    };
    let Some(Json(request)) = payload else {
        return ApiError::BadRequest("No updates provided.".to_string()).into_response();
    };

    match update_customer_record(&pool, customer_id, request).await {
        Ok(Some(customer)) => (StatusCode::OK, Json(customer)).into_response(),
        Ok(None) => ApiError::NotFound("Customer not found.".to_string()).into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/customers/{id}",
    params(("id" = String, Path, description = "Customer id")),
    responses(
        (status = 200, description = "Customer deleted"),
        (status = 400, description = "Invalid customer id"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Customer not found")
    ),
    tag = "customers"
)]
pub async fn delete_customer(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = principal.authorize(&[Role::Administrator]) {
        return err.into_response();
    }
    let Ok(customer_id) = Uuid::parse_str(id.trim()) else {
        return ApiError::BadRequest("Invalid customer id.".to_string()).into_response();
    };

    match delete_customer_record(&pool, customer_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "message": "Customer deleted." })),
        )
            .into_response(),
        Ok(false) => ApiError::NotFound("Customer not found.".to_string()).into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/customers/{id}/send-email",
    params(("id" = String, Path, description = "Customer id")),
    request_body = CustomerEmailRequest,
    responses(
        (status = 200, description = "Email sent"),
        (status = 400, description = "Invalid customer id"),
        (status = 401, description = "Missing or invalid session"),
        (status = 404, description = "Customer not found")
    ),
    tag = "customers"
)]
pub async fn send_email(
    Path(id): Path<String>,
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<dyn Mailer>>,
    payload: Option<Json<CustomerEmailRequest>>,
) -> Response {
    if let Err(err) = require_auth(&headers, &pool, &auth_state).await {
        return err.into_response();
    }
    let Ok(customer_id) = Uuid::parse_str(id.trim()) else {
        return ApiError::BadRequest("Invalid customer id.".to_string()).into_response();
    };
    let Some(Json(request)) = payload else {
        return ApiError::BadRequest("Please provide a subject and body.".to_string())
            .into_response();
    };

    match fetch_customer(&pool, customer_id).await {
        Ok(Some(customer)) => {
            let message = EmailMessage {
                to: customer.email,
                subject: request.subject,
                template: "blank".to_string(),
                payload_json: json!({ "body": request.body }).to_string(),
            };
            send_best_effort(mailer.0.as_ref(), &message);
            (
                StatusCode::OK,
                Json(json!({ "message": "Email sent." })),
            )
                .into_response()
        }
        Ok(None) => ApiError::NotFound("Customer not found.".to_string()).into_response(),
        Err(err) => ApiError::Internal(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/customers/send-email-to-all",
    request_body = CustomerEmailRequest,
    responses(
        (status = 200, description = "Email sent to all customers"),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Forbidden")
    ),
    tag = "customers"
)]
pub async fn send_email_to_all(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    mailer: Extension<Arc<dyn Mailer>>,
    payload: Option<Json<CustomerEmailRequest>>,
) -> Response {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = principal.authorize(&[Role::Administrator]) {
        return err.into_response();
    }
    let Some(Json(request)) = payload else {
        return ApiError::BadRequest("Please provide a subject and body.".to_string())
            .into_response();
    };

    let customers = match fetch_customers(&pool, None).await {
        Ok(customers) => customers,
        Err(err) => return ApiError::Internal(err).into_response(),
    };

    for customer in &customers {
        let message = EmailMessage {
            to: customer.email.clone(),
            subject: request.subject.clone(),
            template: "blank".to_string(),
            payload_json: json!({ "body": request.body }).to_string(),
        };
        send_best_effort(mailer.0.as_ref(), &message);
    }

    (
        StatusCode::OK,
        Json(json!({ "message": "Email sent to all customers." })),
    )
        .into_response()
}

const CUSTOMER_COLUMNS: &str = r#"id, is_active, first_name, last_name, email, phone_number,
    address, company_name, company_address, company_phone_number, gender,
    to_char(date_of_birth, 'YYYY-MM-DD') AS date_of_birth, preferred_language,
    is_email_allowed, notes,
    to_char(created_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS created_at,
    to_char(updated_at AT TIME ZONE 'utc', 'YYYY-MM-DD"T"HH24:MI:SS"Z"') AS updated_at"#;

fn customer_from_row(row: &PgRow) -> CustomerResponse {
    let id: Uuid = row.get("id");
    CustomerResponse {
        id: id.to_string(),
        is_active: row.get("is_active"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        phone_number: row.get("phone_number"),
        address: row.get("address"),
        company_name: row.get("company_name"),
        company_address: row.get("company_address"),
        company_phone_number: row.get("company_phone_number"),
        gender: row.get("gender"),
        date_of_birth: row.get("date_of_birth"),
        preferred_language: row.get("preferred_language"),
        is_email_allowed: row.get("is_email_allowed"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

async fn insert_customer(
    pool: &PgPool,
    request: &CreateCustomerRequest,
) -> Result<CustomerResponse> {
    let query = &format!(
        "INSERT INTO customers
            (is_active, first_name, last_name, email, phone_number, address, company_name,
             company_address, company_phone_number, gender, date_of_birth, preferred_language,
             is_email_allowed, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11::date, $12, $13, $14)
        RETURNING {CUSTOMER_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let notes = request
        .notes
        .as_ref()
        .map_or_else(Vec::new, |notes| match notes {
            Notes::One(note) => vec![note.clone()],
            Notes::Many(notes) => notes.clone(),
        });
    let row = sqlx::query(query)
        .bind(request.is_active.unwrap_or(true))
        .bind(request.first_name.trim())
        .bind(request.last_name.trim())
        .bind(request.email.trim())
        .bind(request.phone_number.trim())
        .bind(request.address.trim())
        .bind(request.company_name.as_deref())
        .bind(request.company_address.as_deref())
        .bind(request.company_phone_number.as_deref())
        .bind(request.gender.as_deref())
        .bind(request.date_of_birth.as_deref())
        .bind(request.preferred_language.as_deref())
        .bind(request.is_email_allowed.unwrap_or(true))
        .bind(&notes)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert customer")?;

    Ok(customer_from_row(&row))
}

/// Fetch all customers, optionally narrowed by a free-text filter over the
/// name, email, and company fields.
async fn fetch_customers(pool: &PgPool, filter: Option<&str>) -> Result<Vec<CustomerResponse>> {
    let query = &format!(
        "SELECT {CUSTOMER_COLUMNS} FROM customers
        WHERE ($1::text IS NULL
            OR first_name ILIKE '%' || $1 || '%'
            OR last_name ILIKE '%' || $1 || '%'
            OR email ILIKE '%' || $1 || '%'
            OR company_name ILIKE '%' || $1 || '%')
        ORDER BY last_name ASC, first_name ASC"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let rows = sqlx::query(query)
        .bind(filter)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to fetch customers")?;

    Ok(rows.iter().map(customer_from_row).collect())
}

async fn fetch_customer(pool: &PgPool, customer_id: Uuid) -> Result<Option<CustomerResponse>> {
    let query = &format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(query)
        .bind(customer_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch customer")?;

    Ok(row.as_ref().map(customer_from_row))
}

async fn update_customer_record(
    pool: &PgPool,
    customer_id: Uuid,
    request: UpdateCustomerRequest,
) -> Result<Option<CustomerResponse>> {
    let query = &format!(
        "UPDATE customers
        SET is_active = COALESCE($2, is_active),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            email = COALESCE($5, email),
            phone_number = COALESCE($6, phone_number),
            address = COALESCE($7, address),
            company_name = COALESCE($8, company_name),
            company_address = COALESCE($9, company_address),
            company_phone_number = COALESCE($10, company_phone_number),
            gender = COALESCE($11, gender),
            date_of_birth = COALESCE($12::date, date_of_birth),
            preferred_language = COALESCE($13, preferred_language),
            is_email_allowed = COALESCE($14, is_email_allowed),
            notes = COALESCE($15, notes),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {CUSTOMER_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let notes = request.notes.map(Notes::into_vec);
    let row = sqlx::query(query)
        .bind(customer_id)
        .bind(request.is_active)
        .bind(request.first_name.as_deref())
        .bind(request.last_name.as_deref())
        .bind(request.email.as_deref())
        .bind(request.phone_number.as_deref())
        .bind(request.address.as_deref())
        .bind(request.company_name.as_deref())
        .bind(request.company_address.as_deref())
        .bind(request.company_phone_number.as_deref())
        .bind(request.gender.as_deref())
        .bind(request.date_of_birth.as_deref())
        .bind(request.preferred_language.as_deref())
        .bind(request.is_email_allowed)
        .bind(notes)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update customer")?;

    Ok(row.as_ref().map(customer_from_row))
}

async fn delete_customer_record(pool: &PgPool, customer_id: Uuid) -> Result<bool> {
    let query = "DELETE FROM customers WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(customer_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete customer")?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::AuthConfig;
    use crate::cli::globals::GlobalArgs;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    fn auth_state() -> Arc<AuthState> {
        let globals = GlobalArgs::new(
            SecretString::from("jwt-secret".to_string()),
            SecretString::from("cookie-secret".to_string()),
        );
        Arc::new(AuthState::new(
            AuthConfig::new("http://localhost:8000".to_string()),
            &globals,
        ))
    }

    #[test]
    fn notes_accepts_both_shapes() {
        let one: Notes = serde_json::from_str(r#""call back""#).expect("one");
        assert_eq!(one.into_vec(), vec!["call back".to_string()]);

        let many: Notes = serde_json::from_str(r#"["a","b"]"#).expect("many");
        assert_eq!(many.into_vec(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn create_request_defaults_required_fields_to_empty() {
        let request: CreateCustomerRequest = serde_json::from_str("{}").expect("json");
        assert!(request.first_name.is_empty());
        assert!(request.notes.is_none());
        assert!(request.is_email_allowed.is_none());
    }

    #[tokio::test]
    async fn list_customers_requires_session() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://postgres@localhost/postgres")
            .expect("lazy pool");
        let response = list_customers(HeaderMap::new(), Extension(pool), Extension(auth_state())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
