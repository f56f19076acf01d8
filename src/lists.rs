use std::future::Future;

use futures::{StreamExt, stream};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    db::now_ms,
    entities::user,
    error::{AppError, AppResult},
    models::ListKind,
    tmdb::TmdbClient,
};

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum ListError {
    #[error("Movie already in {0} list.")]
    AlreadyPresent(ListKind),
    #[error("Movie not found in {0} list.")]
    NotPresent(ListKind),
}

impl From<ListError> for AppError {
    fn from(err: ListError) -> Self {
        match err {
            ListError::AlreadyPresent(_) => AppError::Conflict(err.to_string()),
            ListError::NotPresent(_) => AppError::NotFound(err.to_string()),
        }
    }
}

/// A user's two disjoint sets of TMDB ids, in insertion order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TitleLists {
    pub watched: Vec<i64>,
    pub watchlist: Vec<i64>,
}

impl TitleLists {
    pub fn from_user(user: &user::Model) -> AppResult<Self> {
        let lists = Self {
            watched: serde_json::from_str(&user.watched)?,
            watchlist: serde_json::from_str(&user.watchlist)?,
        };
        Ok(lists.normalized())
    }

    pub fn get(&self, kind: ListKind) -> &[i64] {
        match kind {
            ListKind::Watched => &self.watched,
            ListKind::Watchlist => &self.watchlist,
        }
    }

    fn get_mut(&mut self, kind: ListKind) -> &mut Vec<i64> {
        match kind {
            ListKind::Watched => &mut self.watched,
            ListKind::Watchlist => &mut self.watchlist,
        }
    }

    pub fn contains(&self, kind: ListKind, id: i64) -> bool {
        self.get(kind).contains(&id)
    }

    /// Adds `id` to `kind`, evicting it from the other list.
    pub fn with_added(&self, kind: ListKind, id: i64) -> Result<Self, ListError> {
        if self.contains(kind, id) {
            return Err(ListError::AlreadyPresent(kind));
        }
        let mut next = self.clone();
        next.get_mut(kind.other()).retain(|x| *x != id);
        next.get_mut(kind).push(id);
        Ok(next)
    }

    pub fn with_removed(&self, kind: ListKind, id: i64) -> Result<Self, ListError> {
        if !self.contains(kind, id) {
            return Err(ListError::NotPresent(kind));
        }
        let mut next = self.clone();
        next.get_mut(kind).retain(|x| *x != id);
        Ok(next)
    }

    /// Drops duplicates; an id found in both lists stays in `watched`.
    fn normalized(mut self) -> Self {
        dedup_in_order(&mut self.watched);
        dedup_in_order(&mut self.watchlist);
        let watched = self.watched.clone();
        self.watchlist.retain(|id| !watched.contains(id));
        self
    }
}

fn dedup_in_order(ids: &mut Vec<i64>) {
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
}

/// Reads and writes the stored id sets on the user record.
#[derive(Clone)]
pub struct ListManager {
    db: DatabaseConnection,
}

impl ListManager {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn lists(&self, user_id: i32) -> AppResult<TitleLists> {
        let user = self.load(user_id).await?;
        TitleLists::from_user(&user)
    }

    pub async fn add(&self, user_id: i32, kind: ListKind, tmdb_id: i64) -> AppResult<TitleLists> {
        let user = self.load(user_id).await?;
        let next = TitleLists::from_user(&user)?.with_added(kind, tmdb_id)?;
        self.store(user, &next).await?;
        debug!(user_id, list = %kind, tmdb_id, "added to list");
        Ok(next)
    }

    pub async fn remove(&self, user_id: i32, kind: ListKind, tmdb_id: i64) -> AppResult<TitleLists> {
        let user = self.load(user_id).await?;
        let next = TitleLists::from_user(&user)?.with_removed(kind, tmdb_id)?;
        self.store(user, &next).await?;
        debug!(user_id, list = %kind, tmdb_id, "removed from list");
        Ok(next)
    }

    async fn load(&self, user_id: i32) -> AppResult<user::Model> {
        user::Entity::find_by_id(user_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::not_found("User not found."))
    }

    async fn store(&self, user: user::Model, lists: &TitleLists) -> AppResult<()> {
        let mut active = user.into_active_model();
        active.watched = Set(serde_json::to_string(&lists.watched)?);
        active.watchlist = Set(serde_json::to_string(&lists.watchlist)?);
        active.updated_at = Set(now_ms());
        active.update(&self.db).await?;
        Ok(())
    }
}

/// Resolves ids through `fetch` with at most `max_concurrent` lookups in
/// flight. Failed lookups are logged and left out; order follows `ids`.
pub async fn materialize<F, Fut>(ids: &[i64], max_concurrent: usize, fetch: F) -> Vec<Value>
where
    F: Fn(i64) -> Fut,
    Fut: Future<Output = AppResult<Value>>,
{
    let items: Vec<Option<Value>> = stream::iter(ids.iter().copied())
        .map(|id| {
            let lookup = fetch(id);
            async move {
                match lookup.await {
                    Ok(detail) => Some(detail),
                    Err(err) => {
                        warn!(tmdb_id = id, error = %err, "dropping list entry that failed to resolve");
                        None
                    },
                }
            }
        })
        .buffered(max_concurrent.max(1))
        .collect()
        .await;

    items.into_iter().flatten().collect()
}

/// Both lists resolved to TMDB detail, watched first.
pub async fn materialize_lists(
    tmdb: &TmdbClient,
    lists: &TitleLists,
    max_concurrent: usize,
) -> (Vec<Value>, Vec<Value>) {
    let fetch = move |id| tmdb.movie_summary(id);
    let watched = materialize(&lists.watched, max_concurrent, fetch).await;
    let watchlist = materialize(&lists.watchlist, max_concurrent, fetch).await;
    (watched, watchlist)
}
