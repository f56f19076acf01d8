use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
};
use serde_json::{Value, json};

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::{Json, Path, Query},
    lists::{TitleLists, materialize_lists},
    models::{
        AuthResponse, DiscoverQuery, ListEntryRequest, ListKind, LoginRequest, MaterializedLists,
        RegisterRequest, ReviewPage, ReviewResponse, ReviewView, SearchQuery, SubmitReviewRequest,
        TitleReviews, TitleView, UpdateReviewRequest, UserReviewsQuery, parse_tmdb_id,
        tmdb_id_from_json,
    },
    tmdb::Discover,
};

type SharedState = State<Arc<AppState>>;

pub fn router(state: Arc<AppState>) -> Router {
    let movies = Router::new()
        .route("/search", get(search))
        .route("/tmdb/popular", get(popular))
        .route("/tmdb/now_playing", get(now_playing))
        .route("/tmdb/{external_id}", get(movie_details))
        .route("/reviewed", get(reviewed))
        .route("/reviews/{review_id}", put(update_review).delete(delete_review))
        .route("/{external_id}/reviews", get(title_reviews).post(submit_review));

    let users = Router::new()
        .route("/me/reviews", get(my_reviews))
        .route("/lists", get(get_lists))
        .route("/lists/{list_type}", post(add_to_list))
        .route("/lists/{list_type}/{tmdb_id}", delete(remove_from_list));

    let auth = Router::new().route("/register", post(register)).route("/login", post(login));

    Router::new()
        .route("/", get(index))
        .nest("/api/movies", movies)
        .nest("/api/users", users)
        .nest("/api/auth", auth)
        .with_state(state)
}

pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "Movie Review App API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "Server is running successfully!",
    }))
}

// ---- external catalog ----

pub async fn search(State(state): SharedState, Query(q): Query<SearchQuery>) -> AppResult<Json<Value>> {
    let query = q.query.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(AppError::validation("Please provide a search query."));
    }
    Ok(Json(state.tmdb.search(query).await?))
}

pub async fn popular(State(state): SharedState, Query(q): Query<DiscoverQuery>) -> AppResult<Json<Value>> {
    Ok(Json(state.tmdb.popular(&discover(q)).await?))
}

pub async fn now_playing(
    State(state): SharedState,
    Query(q): Query<DiscoverQuery>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.tmdb.now_playing(&discover(q)).await?))
}

pub async fn movie_details(
    State(state): SharedState,
    Path(external_id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_tmdb_id(&external_id)?;
    Ok(Json(state.tmdb.movie_details(&id.to_string()).await?))
}

fn discover(q: DiscoverQuery) -> Discover {
    Discover { page: q.page, sort_by: q.sort_by, with_genres: q.with_genres }
}

// ---- reviews ----

pub async fn title_reviews(
    State(state): SharedState,
    Path(external_id): Path<String>,
) -> AppResult<Json<TitleReviews>> {
    Ok(Json(state.reviews.reviews_for_title(&external_id).await?))
}

pub async fn submit_review(
    State(state): SharedState,
    user: AuthUser,
    Path(external_id): Path<String>,
    Json(req): Json<SubmitReviewRequest>,
) -> AppResult<(StatusCode, Json<ReviewResponse>)> {
    let (review, outcome) = state.reviews.submit_or_update(&external_id, &user, req).await?;
    let status = match outcome {
        crate::reviews::Outcome::Created => StatusCode::CREATED,
        crate::reviews::Outcome::Updated => StatusCode::OK,
    };
    let review = ReviewView::from_model(review)?;
    Ok((status, Json(ReviewResponse { message: outcome.message(), review })))
}

pub async fn update_review(
    State(state): SharedState,
    user: AuthUser,
    Path(review_id): Path<i32>,
    Json(req): Json<UpdateReviewRequest>,
) -> AppResult<Json<ReviewResponse>> {
    let review = state.reviews.update(review_id, &user, req).await?;
    Ok(Json(ReviewResponse {
        message: "Review updated successfully.",
        review: ReviewView::from_model(review)?,
    }))
}

pub async fn delete_review(
    State(state): SharedState,
    user: AuthUser,
    Path(review_id): Path<i32>,
) -> AppResult<Json<Value>> {
    state.reviews.delete(review_id, &user).await?;
    Ok(Json(json!({ "message": "Review deleted successfully." })))
}

pub async fn reviewed(State(state): SharedState) -> AppResult<Json<Vec<TitleView>>> {
    let titles = state
        .reviews
        .reviewed_titles()
        .await?
        .into_iter()
        .map(TitleView::from_model)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Json(titles))
}

pub async fn my_reviews(
    State(state): SharedState,
    user: AuthUser,
    Query(q): Query<UserReviewsQuery>,
) -> AppResult<Json<ReviewPage>> {
    Ok(Json(state.reviews.reviews_by_author(user.id, &q).await?))
}

// ---- lists ----

pub async fn get_lists(State(state): SharedState, user: AuthUser) -> AppResult<Json<MaterializedLists>> {
    let lists = state.lists.lists(user.id).await?;
    Ok(Json(materialized(&state, &lists, None).await))
}

pub async fn add_to_list(
    State(state): SharedState,
    user: AuthUser,
    Path(list_type): Path<String>,
    Json(req): Json<ListEntryRequest>,
) -> AppResult<Json<MaterializedLists>> {
    let kind: ListKind = list_type.parse()?;
    let tmdb_id = tmdb_id_from_json(req.tmdb_id.as_ref())?;

    let lists = state.lists.add(user.id, kind, tmdb_id).await?;
    let message = format!("Movie added to {kind} list.");
    Ok(Json(materialized(&state, &lists, Some(message)).await))
}

pub async fn remove_from_list(
    State(state): SharedState,
    user: AuthUser,
    Path((list_type, tmdb_id)): Path<(String, String)>,
) -> AppResult<Json<MaterializedLists>> {
    let tmdb_id = parse_tmdb_id(&tmdb_id)?;
    let kind: ListKind = list_type.parse()?;

    let lists = state.lists.remove(user.id, kind, tmdb_id).await?;
    let message = format!("Movie removed from {kind} list.");
    Ok(Json(materialized(&state, &lists, Some(message)).await))
}

async fn materialized(state: &AppState, lists: &TitleLists, message: Option<String>) -> MaterializedLists {
    let (watched_movies, watchlist_movies) =
        materialize_lists(&state.tmdb, lists, state.config.max_concurrent).await;
    MaterializedLists { message, watched_movies, watchlist_movies }
}

// ---- auth ----

pub async fn register(
    State(state): SharedState,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let resp = state
        .identity
        .register(
            req.name.as_deref().unwrap_or_default(),
            req.email.as_deref().unwrap_or_default(),
            req.password.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

pub async fn login(State(state): SharedState, Json(req): Json<LoginRequest>) -> AppResult<Json<AuthResponse>> {
    let (Some(email), Some(password)) = (req.email.as_deref(), req.password.as_deref()) else {
        return Err(AppError::validation("Please provide an email and password."));
    };
    Ok(Json(state.identity.login(email, password).await?))
}
