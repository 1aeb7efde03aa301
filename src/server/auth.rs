use super::AppState;
use crate::db::Store;
use crate::models::User;
use crate::Error;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

/// The authenticated caller, resolved from `Authorization: Token <key>`
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl<S: Store> FromRequestParts<AppState<S>> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(Error::Unauthorized)?;

        let token = parse_token(header).ok_or(Error::Unauthorized)?;

        match state.store.find_user_by_token(token).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                tracing::debug!("Rejected unknown or inactive API token");
                Err(Error::Unauthorized)
            }
        }
    }
}

/// Extract the key from `Token <key>` or `Bearer <key>`
pub fn parse_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    let known = scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer");
    (known && !token.is_empty()).then_some(token)
}
