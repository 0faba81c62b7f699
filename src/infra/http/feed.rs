use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::application::error::HttpError;

use super::HttpState;
use super::auth::VerifiedUser;

/// Raw query; malformed values fall back to defaults rather than rejecting the request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct FeedQuery {
    limit: Option<String>,
    offset: Option<String>,
}

impl FeedQuery {
    fn limit(&self) -> usize {
        self.limit
            .as_deref()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0)
    }

    fn offset(&self) -> usize {
        self.offset
            .as_deref()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0)
    }
}

pub(super) async fn get_feed(
    State(state): State<HttpState>,
    VerifiedUser(user): VerifiedUser,
    Query(query): Query<FeedQuery>,
) -> Response {
    match state
        .feed
        .read_feed(user, query.limit(), query.offset())
        .await
    {
        Ok(page) => Json(page).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<&str>, offset: Option<&str>) -> FeedQuery {
        FeedQuery {
            limit: limit.map(str::to_owned),
            offset: offset.map(str::to_owned),
        }
    }

    #[test]
    fn malformed_values_fall_back() {
        let q = query(Some("abc"), Some("-3"));
        assert_eq!(q.limit(), 0);
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn valid_values_pass_through() {
        let q = query(Some("15"), Some("40"));
        assert_eq!(q.limit(), 15);
        assert_eq!(q.offset(), 40);
    }
}
