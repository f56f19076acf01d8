use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, QueryTrait, Set,
    sea_query::{Expr, OnConflict},
};
use tracing::debug;

use crate::{
    auth::AuthUser,
    db::now_ms,
    entities::{review, title},
    error::{AppError, AppResult},
    models::{
        Aggregate, ReviewPage, ReviewView, SubmitReviewRequest, TitleReviews, UpdateReviewRequest,
        UserReviewsQuery, validate_external_id, validate_rating,
    },
};

const DEFAULT_PAGE_SIZE: u64 = 6;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Created,
    Updated,
}

impl Outcome {
    pub fn message(self) -> &'static str {
        match self {
            Outcome::Created => "Review submitted successfully.",
            Outcome::Updated => "Review updated successfully.",
        }
    }
}

/// Owns reviews and the per-title rating rollup derived from them.
///
/// Every mutation ends with [`ReviewEngine::recompute`], which rebuilds the
/// rollup from all of the title's reviews instead of applying a delta.
#[derive(Clone)]
pub struct ReviewEngine {
    db: DatabaseConnection,
}

impl ReviewEngine {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn submit_or_update(
        &self,
        external_id: &str,
        author: &AuthUser,
        req: SubmitReviewRequest,
    ) -> AppResult<(review::Model, Outcome)> {
        let external_id = validate_external_id(external_id)?;
        let rating = req.rating.ok_or_else(|| AppError::validation("Please provide a rating."))?;
        let rating = validate_rating(rating)?;
        let body = req.review_text.unwrap_or_default();

        let title = self.find_or_create_title(&external_id, req.movie_title.as_deref()).await?;
        let (stored, outcome) = self.write_review(&title, author, rating, body).await?;

        debug!(external_id = %external_id, review_id = stored.id, ?outcome, "stored review");
        self.recompute(&external_id).await?;
        Ok((stored, outcome))
    }

    /// Inserts the author's review for `title`, or overwrites it in place when
    /// the `(title, author)` pair already has one.
    async fn write_review(
        &self,
        title: &title::Model,
        author: &AuthUser,
        rating: f64,
        body: String,
    ) -> AppResult<(review::Model, Outcome)> {
        let now = now_ms();
        let model = review::ActiveModel {
            id: Default::default(),
            title_id: Set(title.id),
            external_id: Set(title.external_id.clone()),
            user_id: Set(author.id),
            username: Set(author.name.clone()),
            rating: Set(rating),
            body: Set(body.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let inserted = review::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([review::Column::TitleId, review::Column::UserId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        let existing = review::Entity::find()
            .filter(review::Column::TitleId.eq(title.id))
            .filter(review::Column::UserId.eq(author.id))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("review vanished after insert")))?;

        if inserted > 0 {
            return Ok((existing, Outcome::Created));
        }

        let mut active = existing.into_active_model();
        active.rating = Set(rating);
        active.body = Set(body);
        active.username = Set(author.name.clone());
        active.updated_at = Set(now);
        Ok((active.update(&self.db).await?, Outcome::Updated))
    }

    pub async fn update(
        &self,
        review_id: i32,
        caller: &AuthUser,
        req: UpdateReviewRequest,
    ) -> AppResult<review::Model> {
        let existing = self.owned_review(review_id, caller, "update").await?;
        let external_id = existing.external_id.clone();

        let mut active = existing.into_active_model();
        if let Some(rating) = req.rating {
            active.rating = Set(validate_rating(rating)?);
        }
        if let Some(body) = req.review_text {
            active.body = Set(body);
        }
        active.updated_at = Set(now_ms());
        let updated = active.update(&self.db).await?;

        self.recompute(&external_id).await?;
        Ok(updated)
    }

    pub async fn delete(&self, review_id: i32, caller: &AuthUser) -> AppResult<()> {
        let existing = self.owned_review(review_id, caller, "delete").await?;

        review::Entity::delete_by_id(existing.id).exec(&self.db).await?;
        debug!(review_id, external_id = %existing.external_id, "deleted review");

        self.recompute(&existing.external_id).await?;
        Ok(())
    }

    /// Reviews newest first plus the rollup. An unknown title is an empty
    /// result, not an error.
    pub async fn reviews_for_title(&self, external_id: &str) -> AppResult<TitleReviews> {
        let external_id = validate_external_id(external_id)?;

        let reviews = review::Entity::find()
            .filter(review::Column::ExternalId.eq(external_id.as_str()))
            .order_by_desc(review::Column::CreatedAt)
            .order_by_desc(review::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(ReviewView::from_model)
            .collect::<AppResult<Vec<_>>>()?;

        let aggregate = title::Entity::find()
            .filter(title::Column::ExternalId.eq(external_id.as_str()))
            .one(&self.db)
            .await?
            .map(|t| Aggregate {
                average_rating: t.average_rating,
                number_of_reviews: u64::try_from(t.review_count).unwrap_or(0),
            })
            .unwrap_or_default();

        Ok(TitleReviews { reviews, aggregate })
    }

    pub async fn reviewed_titles(&self) -> AppResult<Vec<title::Model>> {
        Ok(title::Entity::find().order_by_asc(title::Column::Id).all(&self.db).await?)
    }

    pub async fn reviews_by_author(
        &self,
        user_id: i32,
        query: &UserReviewsQuery,
    ) -> AppResult<ReviewPage> {
        let paging = Paging::from_query(query)?;

        let total = review::Entity::find()
            .filter(review::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?;

        let rows = review::Entity::find()
            .find_also_related(title::Entity)
            .filter(review::Column::UserId.eq(user_id))
            .order_by(paging.sort_column, paging.order.clone())
            .order_by(review::Column::Id, paging.order.clone())
            .offset(paging.offset)
            .limit(paging.limit)
            .all(&self.db)
            .await?;

        let reviews = rows
            .into_iter()
            .map(|(review, title)| {
                let mut view = ReviewView::from_model(review)?;
                view.movie_title = title.map(|t| t.title);
                Ok(view)
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(ReviewPage {
            reviews,
            page: paging.page,
            limit: paging.limit,
            total_pages: total.div_ceil(paging.limit),
            total_reviews: total,
        })
    }

    /// Rebuild the rollup for `external_id` from its current reviews. The
    /// title record is removed once no reviews are left.
    pub async fn recompute(&self, external_id: &str) -> AppResult<Aggregate> {
        let ratings: Vec<f64> = review::Entity::find()
            .select_only()
            .column(review::Column::Rating)
            .filter(review::Column::ExternalId.eq(external_id))
            .into_tuple()
            .all(&self.db)
            .await?;

        let aggregate = aggregate(&ratings);

        if aggregate.number_of_reviews == 0 {
            let removed = self.remove_unreviewed_title(external_id).await?;
            debug!(external_id = %external_id, removed, "title has no reviews left");
            return Ok(aggregate);
        }

        let count = i32::try_from(aggregate.number_of_reviews)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("review count overflow")))?;

        title::Entity::update_many()
            .col_expr(title::Column::AverageRating, Expr::value(aggregate.average_rating))
            .col_expr(title::Column::ReviewCount, Expr::value(count))
            .col_expr(title::Column::UpdatedAt, Expr::value(now_ms()))
            .filter(title::Column::ExternalId.eq(external_id))
            .exec(&self.db)
            .await?;

        debug!(
            external_id = %external_id,
            average = aggregate.average_rating,
            count = aggregate.number_of_reviews,
            "recomputed aggregate"
        );
        Ok(aggregate)
    }

    /// Deletes the title only while no review references it, so a review
    /// written after the rollup scan is never cascaded away.
    async fn remove_unreviewed_title(&self, external_id: &str) -> AppResult<u64> {
        let referenced = review::Entity::find()
            .select_only()
            .column(review::Column::TitleId)
            .into_query();

        let res = title::Entity::delete_many()
            .filter(title::Column::ExternalId.eq(external_id))
            .filter(title::Column::Id.not_in_subquery(referenced))
            .exec(&self.db)
            .await?;
        Ok(res.rows_affected)
    }

    async fn find_or_create_title(
        &self,
        external_id: &str,
        display_title: Option<&str>,
    ) -> AppResult<title::Model> {
        if let Some(existing) = self.find_title(external_id).await? {
            return Ok(existing);
        }

        let display_title = display_title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::validation("Please provide a rating and movie title."))?;

        let now = now_ms();
        let model = title::ActiveModel {
            id: Default::default(),
            external_id: Set(external_id.to_string()),
            title: Set(display_title.to_string()),
            average_rating: Set(0.0),
            review_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        title::Entity::insert(model)
            .on_conflict(OnConflict::column(title::Column::ExternalId).do_nothing().to_owned())
            .exec_without_returning(&self.db)
            .await?;

        debug!(external_id = %external_id, title = %display_title, "created title record");

        self.find_title(external_id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("title vanished after insert")))
    }

    async fn find_title(&self, external_id: &str) -> AppResult<Option<title::Model>> {
        Ok(title::Entity::find()
            .filter(title::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?)
    }

    async fn owned_review(
        &self,
        review_id: i32,
        caller: &AuthUser,
        action: &str,
    ) -> AppResult<review::Model> {
        let review = review::Entity::find_by_id(review_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("Review not found."))?;

        if review.user_id != caller.id {
            return Err(AppError::NotAuthorized(format!("Not authorized to {action} this review.")));
        }
        Ok(review)
    }
}

/// Arithmetic mean and count; an empty slice is `0 / 0`.
pub fn aggregate(ratings: &[f64]) -> Aggregate {
    if ratings.is_empty() {
        return Aggregate::default();
    }
    let sum: f64 = ratings.iter().sum();
    Aggregate { average_rating: sum / ratings.len() as f64, number_of_reviews: ratings.len() as u64 }
}

#[derive(Clone, Debug)]
struct Paging {
    page: u64,
    limit: u64,
    offset: u64,
    sort_column: review::Column,
    order: Order,
}

impl Paging {
    fn from_query(query: &UserReviewsQuery) -> AppResult<Self> {
        let page = query.page.filter(|p| *p >= 1).unwrap_or(1);
        let limit = query
            .limit
            .filter(|l| *l >= 1)
            .map(|l| l.min(MAX_PAGE_SIZE))
            .unwrap_or(DEFAULT_PAGE_SIZE);

        // SQLite binds offsets as i64.
        let offset = (page - 1)
            .checked_mul(limit)
            .filter(|o| i64::try_from(*o).is_ok())
            .ok_or_else(|| AppError::validation("Page is out of range."))?;

        let sort_column = match query.sort_by.as_deref().unwrap_or("createdAt") {
            "createdAt" => review::Column::CreatedAt,
            "updatedAt" => review::Column::UpdatedAt,
            "rating" => review::Column::Rating,
            other => {
                return Err(AppError::validation(format!(
                    "Cannot sort reviews by '{other}'. Use createdAt, updatedAt or rating."
                )));
            },
        };

        let order = match query.order.as_deref() {
            Some("asc") => Order::Asc,
            None | Some("desc") => Order::Desc,
            Some(other) => {
                return Err(AppError::validation(format!(
                    "Invalid order '{other}'. Use asc or desc."
                )));
            },
        };

        Ok(Self { page, limit, offset, sort_column, order })
    }
}
