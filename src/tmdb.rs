use std::{num::NonZeroU32, sync::Arc};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use jiff::{ToSpan, civil::Date};
use serde_json::{Value, json};

use crate::error::{AppError, AppResult};

const DEFAULT_SORT: &str = "popularity.desc";
const NOW_PLAYING_WINDOW_DAYS: i64 = 60;
const NOW_PLAYING_MIN_VOTES: u32 = 10;

pub struct TmdbClient {
    client: reqwest::Client,
    access_token: String,
    api_key: String,
    base_url: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

/// Filters shared by the discover-backed listings.
#[derive(Clone, Debug, Default)]
pub struct Discover {
    pub page: Option<u32>,
    pub sort_by: Option<String>,
    pub with_genres: Option<String>,
}

impl TmdbClient {
    pub fn new(
        client: reqwest::Client,
        access_token: String,
        api_key: String,
        base_url: String,
        rps: u32,
    ) -> Self {
        if access_token.trim().is_empty() && api_key.trim().is_empty() {
            tracing::warn!("Using mock TMDB data - no TMDB_ACCESS_TOKEN or TMDB_API_KEY provided");
        }

        let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));
        Self { client, access_token, api_key, base_url, limiter }
    }

    fn is_mock(&self) -> bool {
        self.access_token.trim().is_empty() && self.api_key.trim().is_empty()
    }

    pub async fn search(&self, query: &str) -> AppResult<Value> {
        if self.is_mock() {
            return Ok(mock_page(vec![mock_movie(550, &format!("{query} (mock)"))]));
        }

        self.get_json(
            "search/movie",
            &[("query", query.to_string())],
            "Could not search movies from external API.",
        )
        .await
    }

    pub async fn popular(&self, filters: &Discover) -> AppResult<Value> {
        if self.is_mock() {
            return Ok(mock_page(vec![mock_movie(550, "Fight Club"), mock_movie(27205, "Inception")]));
        }

        let params = discover_params(filters);
        self.get_json("discover/movie", &params, "Failed to fetch popular movies.").await
    }

    pub async fn now_playing(&self, filters: &Discover) -> AppResult<Value> {
        if self.is_mock() {
            return Ok(mock_page(vec![mock_movie(27205, "Inception")]));
        }

        let today: Date = jiff::Zoned::now().into();
        let mut params = discover_params(filters);
        params.extend(now_playing_window(today)?);
        self.get_json("discover/movie", &params, "Failed to fetch now playing movies.").await
    }

    /// Full detail with trailers, cast and crew.
    pub async fn movie_details(&self, tmdb_id: &str) -> AppResult<Value> {
        if self.is_mock() {
            let id = tmdb_id.parse().unwrap_or_default();
            let mut movie = mock_movie(id, "Mock movie");
            movie["credits"] = json!({ "cast": [], "crew": [] });
            movie["videos"] = json!({ "results": [] });
            return Ok(movie);
        }

        self.get_json(
            &format!("movie/{tmdb_id}"),
            &[("append_to_response", "videos,credits,reviews".to_string())],
            "Could not fetch movie details from external API.",
        )
        .await
    }

    /// Plain detail used to materialize list entries.
    pub async fn movie_summary(&self, tmdb_id: i64) -> AppResult<Value> {
        if self.is_mock() {
            return Ok(mock_movie(tmdb_id, &format!("Mock movie {tmdb_id}")));
        }

        self.get_json(
            &format!("movie/{tmdb_id}"),
            &[],
            "Could not fetch movie details from external API.",
        )
        .await
    }

    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
        context: &str,
    ) -> AppResult<Value> {
        self.limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let mut req = self.client.get(url).query(params);
        if !self.access_token.trim().is_empty() {
            req = req.bearer_auth(&self.access_token);
        }
        if !self.api_key.trim().is_empty() {
            req = req.query(&[("api_key", &self.api_key)]);
        }

        send_json(req).await.map_err(|err| {
            tracing::warn!(path = %path, status = ?err.status(), error = %err, "TMDB request failed");
            AppError::Upstream {
                status: err.status().map(|s| s.as_u16()),
                message: context.to_string(),
            }
        })
    }
}

async fn send_json(req: reqwest::RequestBuilder) -> reqwest::Result<Value> {
    req.send().await?.error_for_status()?.json().await
}

fn discover_params(filters: &Discover) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", filters.page.unwrap_or(1).max(1).to_string()),
        ("language", "en-US".to_string()),
        (
            "sort_by",
            filters
                .sort_by
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SORT)
                .to_string(),
        ),
    ];
    if let Some(genres) = filters.with_genres.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        params.push(("with_genres", genres.to_string()));
    }
    params
}

fn now_playing_window(today: Date) -> AppResult<Vec<(&'static str, String)>> {
    let from = today.checked_sub(NOW_PLAYING_WINDOW_DAYS.days())?;
    Ok(vec![
        ("primary_release_date.gte", from.to_string()),
        ("primary_release_date.lte", today.to_string()),
        ("vote_count.gte", NOW_PLAYING_MIN_VOTES.to_string()),
    ])
}

fn mock_movie(id: i64, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "overview": "Mock TMDB entry",
        "poster_path": null,
        "release_date": "2010-07-16",
        "vote_average": 0.0,
    })
}

fn mock_page(results: Vec<Value>) -> Value {
    let total = results.len();
    json!({ "page": 1, "results": results, "total_pages": 1, "total_results": total })
}
