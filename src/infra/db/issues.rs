use async_trait::async_trait;
use longbox_api_types::{CreateIssueRequest, Issue, UpdateIssueRequest};
use sqlx::QueryBuilder;

use crate::application::{
    pagination::{Page, PageRequest},
    repos::{IssueFilter, IssuesRepo, RepoError},
};

use super::{SqliteRepositories, empty_patch, map_sqlx_error};

const ISSUE_COLUMNS: &str = "issue_id, series_id, issue_nr, variant, title, subtitle, \
    full_title, cover_date, cover_year, story_arc";

#[async_trait]
impl IssuesRepo for SqliteRepositories {
    async fn list_issues(
        &self,
        series_id: i64,
        filter: &IssueFilter,
        page: PageRequest,
    ) -> Result<Page<Issue>, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT {ISSUE_COLUMNS} FROM issues WHERE series_id = "));
        qb.push_bind(series_id);
        if let Some(story_arc) = filter.story_arc.as_deref() {
            qb.push(" AND story_arc = ");
            qb.push_bind(story_arc);
        }
        qb.push(" ORDER BY issue_nr, variant, issue_id");
        Self::push_page(&mut qb, page);

        let rows = qb
            .build_query_as::<Issue>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(Page::from_window(rows, page))
    }

    async fn search_issues(
        &self,
        title_search: &str,
        page: PageRequest,
    ) -> Result<Page<Issue>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT i.issue_id, i.series_id, i.issue_nr, i.variant, i.title, i.subtitle, \
                    i.full_title, i.cover_date, i.cover_year, i.story_arc \
             FROM issues i \
             INNER JOIN series s ON s.series_id = i.series_id \
             WHERE 1=1",
        );
        Self::push_contains(&mut qb, "s.title", title_search);
        qb.push(" ORDER BY i.series_id, i.issue_nr, i.variant, i.issue_id");
        Self::push_page(&mut qb, page);

        let rows = qb
            .build_query_as::<Issue>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(Page::from_window(rows, page))
    }

    async fn find_issue(&self, issue_id: i64) -> Result<Option<Issue>, RepoError> {
        sqlx::query_as::<_, Issue>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE issue_id = ?"
        ))
        .bind(issue_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn find_series_issue(
        &self,
        series_id: i64,
        issue_id: i64,
    ) -> Result<Option<Issue>, RepoError> {
        sqlx::query_as::<_, Issue>(&format!(
            "SELECT {ISSUE_COLUMNS} FROM issues WHERE series_id = ? AND issue_id = ?"
        ))
        .bind(series_id)
        .bind(issue_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn create_issue(
        &self,
        series_id: i64,
        params: CreateIssueRequest,
    ) -> Result<Issue, RepoError> {
        sqlx::query_as::<_, Issue>(&format!(
            "INSERT INTO issues (series_id, issue_nr, variant, title, subtitle, full_title, \
                                 cover_date, cover_year, story_arc) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {ISSUE_COLUMNS}"
        ))
        .bind(series_id)
        .bind(params.issue_nr)
        .bind(params.variant)
        .bind(params.title)
        .bind(params.subtitle)
        .bind(params.full_title)
        .bind(params.cover_date)
        .bind(params.cover_year)
        .bind(params.story_arc)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn update_issue(
        &self,
        series_id: i64,
        issue_id: i64,
        patch: UpdateIssueRequest,
    ) -> Result<Option<Issue>, RepoError> {
        if patch.is_empty() {
            return Err(empty_patch());
        }

        let mut qb = QueryBuilder::new("UPDATE issues SET ");
        let mut set = qb.separated(", ");
        if let Some(issue_nr) = patch.issue_nr {
            set.push("issue_nr = ");
            set.push_bind_unseparated(issue_nr);
        }
        if let Some(variant) = patch.variant {
            set.push("variant = ");
            set.push_bind_unseparated(variant);
        }
        if let Some(title) = patch.title {
            set.push("title = ");
            set.push_bind_unseparated(title);
        }
        if let Some(subtitle) = patch.subtitle {
            set.push("subtitle = ");
            set.push_bind_unseparated(subtitle);
        }
        if let Some(full_title) = patch.full_title {
            set.push("full_title = ");
            set.push_bind_unseparated(full_title);
        }
        if let Some(cover_date) = patch.cover_date {
            set.push("cover_date = ");
            set.push_bind_unseparated(cover_date);
        }
        if let Some(cover_year) = patch.cover_year {
            set.push("cover_year = ");
            set.push_bind_unseparated(cover_year);
        }
        if let Some(story_arc) = patch.story_arc {
            set.push("story_arc = ");
            set.push_bind_unseparated(story_arc);
        }
        qb.push(" WHERE series_id = ");
        qb.push_bind(series_id);
        qb.push(" AND issue_id = ");
        qb.push_bind(issue_id);
        qb.push(format!(" RETURNING {ISSUE_COLUMNS}"));

        qb.build_query_as::<Issue>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete_issue(&self, series_id: i64, issue_id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM issues WHERE series_id = ? AND issue_id = ?")
            .bind(series_id)
            .bind(issue_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::affected(result.rows_affected()))
    }
}
