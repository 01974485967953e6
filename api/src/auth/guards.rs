use axum::{
    Json,
    body::Body,
    extract::FromRequestParts,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::auth::claims::{AuthUser, Role};
use crate::response::{ApiResponse, Empty};

/// Helper to extract and validate the user from request extensions, then
/// insert it back into the request for downstream handlers.
async fn extract_and_insert_authuser(
    req: Request<Body>,
) -> Result<(Request<Body>, AuthUser), (StatusCode, Json<ApiResponse<Empty>>)> {
    let (mut parts, body) = req.into_parts();
    let user = AuthUser::from_request_parts(&mut parts, &())
        .await
        .map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::error("Authentication required")),
            )
        })?;

    let mut req = Request::from_parts(parts, body);
    req.extensions_mut().insert(user.clone());
    Ok((req, user))
}

/// Basic guard to ensure the request is authenticated.
pub async fn allow_authenticated(
    req: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiResponse<Empty>>)> {
    let (req, _user) = extract_and_insert_authuser(req).await?;
    Ok(next.run(req).await)
}

/// Admin-only guard.
pub async fn allow_admin(
    req: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiResponse<Empty>>)> {
    let (req, user) = extract_and_insert_authuser(req).await?;

    if user.0.role != Role::Admin {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error("Admin access required")),
        ));
    }
    Ok(next.run(req).await)
}

/// Faculty or admin guard (token issuance, manual event check-ins).
pub async fn allow_faculty_or_admin(
    req: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<ApiResponse<Empty>>)> {
    let (req, user) = extract_and_insert_authuser(req).await?;

    match user.0.role {
        Role::Admin | Role::Faculty => Ok(next.run(req).await),
        Role::Student => Err((
            StatusCode::FORBIDDEN,
            Json(ApiResponse::error("Faculty access required")),
        )),
    }
}
