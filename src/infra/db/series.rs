use async_trait::async_trait;
use longbox_api_types::{CreateSeriesRequest, Series, UpdateSeriesRequest};
use sqlx::QueryBuilder;

use crate::application::{
    pagination::{Page, PageRequest},
    repos::{RepoError, SeriesFilter, SeriesRepo},
};

use super::{SqliteRepositories, empty_patch, map_sqlx_error};

const SERIES_COLUMNS: &str = "series_id, title, publisher, series_group, age";

#[async_trait]
impl SeriesRepo for SqliteRepositories {
    async fn list_series(
        &self,
        filter: &SeriesFilter,
        page: PageRequest,
    ) -> Result<Page<Series>, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT {SERIES_COLUMNS} FROM series WHERE 1=1"));
        if let Some(publisher) = filter.publisher.as_deref() {
            qb.push(" AND publisher = ");
            qb.push_bind(publisher);
        }
        if let Some(search) = filter.title_search.as_deref() {
            Self::push_contains(&mut qb, "title", search);
        }
        qb.push(" ORDER BY series_id");
        Self::push_page(&mut qb, page);

        let rows = qb
            .build_query_as::<Series>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(Page::from_window(rows, page))
    }

    async fn find_series(&self, series_id: i64) -> Result<Option<Series>, RepoError> {
        sqlx::query_as::<_, Series>(&format!(
            "SELECT {SERIES_COLUMNS} FROM series WHERE series_id = ?"
        ))
        .bind(series_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn create_series(&self, params: CreateSeriesRequest) -> Result<Series, RepoError> {
        sqlx::query_as::<_, Series>(&format!(
            "INSERT INTO series ({SERIES_COLUMNS}) VALUES (?, ?, ?, ?, ?) RETURNING {SERIES_COLUMNS}"
        ))
        .bind(params.series_id)
        .bind(params.title)
        .bind(params.publisher)
        .bind(params.series_group)
        .bind(params.age)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn update_series(
        &self,
        series_id: i64,
        patch: UpdateSeriesRequest,
    ) -> Result<Option<Series>, RepoError> {
        if patch.is_empty() {
            return Err(empty_patch());
        }

        let mut qb = QueryBuilder::new("UPDATE series SET ");
        let mut set = qb.separated(", ");
        if let Some(title) = patch.title {
            set.push("title = ");
            set.push_bind_unseparated(title);
        }
        if let Some(publisher) = patch.publisher {
            set.push("publisher = ");
            set.push_bind_unseparated(publisher);
        }
        if let Some(series_group) = patch.series_group {
            set.push("series_group = ");
            set.push_bind_unseparated(series_group);
        }
        if let Some(age) = patch.age {
            set.push("age = ");
            set.push_bind_unseparated(age);
        }
        qb.push(" WHERE series_id = ");
        qb.push_bind(series_id);
        qb.push(format!(" RETURNING {SERIES_COLUMNS}"));

        qb.build_query_as::<Series>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete_series(&self, series_id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM series WHERE series_id = ?")
            .bind(series_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::affected(result.rows_affected()))
    }
}
