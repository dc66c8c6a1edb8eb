//! `OpenAPI` document assembly.
//!
//! Add new endpoints to `paths(...)` so they show up in the generated spec
//! served by Swagger UI. Routes registered outside (like `/`) are
//! intentionally not documented.

use utoipa::OpenApi;

use super::handlers::{auth, customers, health, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::login,
        auth::session::current_user,
        auth::session::logout,
        auth::reset::request_password_reset,
        auth::reset::reset_password,
        users::create_user,
        users::list_users,
        users::search_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        users::send_email,
        customers::create_customer,
        customers::list_customers,
        customers::search_customers,
        customers::get_customer,
        customers::update_customer,
        customers::delete_customer,
        customers::send_email,
        customers::send_email_to_all,
    ),
    components(schemas(
        auth::types::Role,
        auth::types::LoginRequest,
        auth::types::PasswordResetRequest,
        auth::types::PasswordResetConfirm,
        auth::types::UserResponse,
        users::CreateUserRequest,
        users::UpdateUserRequest,
        users::SendEmailRequest,
        users::UserDetail,
        customers::CustomerResponse,
        customers::Notes,
        customers::CreateCustomerRequest,
        customers::UpdateCustomerRequest,
        customers::CustomerEmailRequest,
        health::Health,
    )),
    tags(
        (name = "auth", description = "Login, session, and password reset"),
        (name = "users", description = "Administrative user management"),
        (name = "customers", description = "Customer records and outreach"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;
