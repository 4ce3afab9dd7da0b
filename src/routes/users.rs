/// User CRUD Routes
///
/// Thin dispatch onto `AccountService`. The password hash never appears
/// in a response.

use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::accounts::{AccountService, RegisterRequest, UpdateUserRequest};
use crate::error::AppError;
use crate::routes::ApiResponse;
use crate::store::User;

/// User information response
#[derive(Debug, Serialize)]
pub struct UserResponse {
    #[serde(rename = "userId")]
    pub id: i64,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub email: String,
    #[serde(rename = "userPhone")]
    pub phone: Option<String>,
    #[serde(rename = "userLocation")]
    pub location: String,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            user_name: user.user_name,
            email: user.email,
            phone: user.phone,
            location: user.location,
            is_active: user.is_active,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// GET /users
pub async fn list_users(accounts: web::Data<AccountService>) -> Result<HttpResponse, AppError> {
    let users: Vec<UserResponse> = accounts
        .list()
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(ApiResponse::data(users)))
}

/// POST /users
pub async fn create_user(
    form: web::Json<RegisterRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let user = accounts.register(form.into_inner()).await?;
    Ok(HttpResponse::Created().json(ApiResponse::data(UserResponse::from(user))))
}

/// GET /users/{id}
///
/// # Errors
/// - 404: No user with this id
pub async fn get_user(
    path: web::Path<i64>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let user = accounts.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(UserResponse::from(user))))
}

/// PUT /users/{id}
///
/// Partial update. A supplied password is validated and hashed.
///
/// # Errors
/// - 400: Validation error
/// - 404: No user with this id
/// - 409: Email or phone belongs to another user
pub async fn update_user(
    path: web::Path<i64>,
    form: web::Json<UpdateUserRequest>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    let user = accounts.update(path.into_inner(), form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::data(UserResponse::from(user))))
}

/// DELETE /users/{id}
pub async fn delete_user(
    path: web::Path<i64>,
    accounts: web::Data<AccountService>,
) -> Result<HttpResponse, AppError> {
    accounts.delete(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::message("deleted")))
}
