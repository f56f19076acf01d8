use std::{fmt, str::FromStr};

use jiff::Timestamp;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    entities::{review, title, user},
    error::{AppError, AppResult},
};

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 5.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ListKind {
    Watched,
    Watchlist,
}

impl ListKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ListKind::Watched => "watched",
            ListKind::Watchlist => "watchlist",
        }
    }

    /// The list an id is evicted from when it is added to `self`.
    pub fn other(self) -> Self {
        match self {
            ListKind::Watched => ListKind::Watchlist,
            ListKind::Watchlist => ListKind::Watched,
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watched" => Ok(ListKind::Watched),
            "watchlist" => Ok(ListKind::Watchlist),
            _ => Err(AppError::validation(r#"Invalid list type. Must be "watched" or "watchlist"."#)),
        }
    }
}

pub fn validate_rating(rating: f64) -> AppResult<f64> {
    if !rating.is_finite() || !(MIN_RATING..=MAX_RATING).contains(&rating) {
        return Err(AppError::validation("Rating must be a number between 0 and 5."));
    }
    Ok(rating)
}

/// TMDB ids are positive integers.
pub fn parse_tmdb_id(raw: &str) -> AppResult<i64> {
    match raw.trim().parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(AppError::validation("Please provide a valid TMDB movie ID.")),
    }
}

/// A list entry id from a JSON body. Integral floats such as `99.0` count.
pub fn tmdb_id_from_json(value: Option<&Value>) -> AppResult<i64> {
    let id = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 1.0 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    };
    id.filter(|id| *id > 0)
        .ok_or_else(|| AppError::validation("Please provide a valid TMDB movie ID."))
}

pub fn validate_external_id(raw: &str) -> AppResult<String> {
    let id = raw.trim();
    if id.is_empty() || id.chars().any(char::is_whitespace) {
        return Err(AppError::validation("Please provide a valid TMDB movie ID."));
    }
    Ok(id.to_string())
}

// ---- request bodies ----

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewRequest {
    pub rating: Option<f64>,
    pub review_text: Option<String>,
    pub movie_title: Option<String>,
}

/// `reviewText: ""` overwrites the body, an absent `reviewText` keeps it.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReviewRequest {
    pub rating: Option<f64>,
    pub review_text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntryRequest {
    pub tmdb_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

/// Unparseable numbers in a query string fall back to the default instead of
/// rejecting the request.
fn lenient_number<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().map(str::trim).and_then(|s| s.parse().ok()))
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscoverQuery {
    #[serde(default, deserialize_with = "lenient_number")]
    pub page: Option<u32>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub with_genres: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReviewsQuery {
    #[serde(default, deserialize_with = "lenient_number")]
    pub page: Option<u64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub limit: Option<u64>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

// ---- views ----

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: i32,
    pub tmdb_id: String,
    pub title_id: i32,
    pub user_id: i32,
    pub username: String,
    pub rating: f64,
    pub review_text: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie_title: Option<String>,
}

impl ReviewView {
    pub fn from_model(model: review::Model) -> AppResult<Self> {
        Ok(Self {
            id: model.id,
            tmdb_id: model.external_id,
            title_id: model.title_id,
            user_id: model.user_id,
            username: model.username,
            rating: model.rating,
            review_text: model.body,
            created_at: Timestamp::from_millisecond(model.created_at)?,
            updated_at: Timestamp::from_millisecond(model.updated_at)?,
            movie_title: None,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleView {
    pub id: i32,
    pub tmdb_id: String,
    pub title: String,
    pub average_rating: f64,
    pub number_of_reviews: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TitleView {
    pub fn from_model(model: title::Model) -> AppResult<Self> {
        Ok(Self {
            id: model.id,
            tmdb_id: model.external_id,
            title: model.title,
            average_rating: model.average_rating,
            number_of_reviews: model.review_count,
            created_at: Timestamp::from_millisecond(model.created_at)?,
            updated_at: Timestamp::from_millisecond(model.updated_at)?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub average_rating: f64,
    pub number_of_reviews: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleReviews {
    pub reviews: Vec<ReviewView>,
    #[serde(flatten)]
    pub aggregate: Aggregate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPage {
    pub reviews: Vec<ReviewView>,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub total_reviews: u64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<&user::Model> for UserView {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserView,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializedLists {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub watched_movies: Vec<Value>,
    pub watchlist_movies: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub message: &'static str,
    pub review: ReviewView,
}
