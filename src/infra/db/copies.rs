use async_trait::async_trait;
use longbox_api_types::{ComicCopy, CopyFields};
use sqlx::QueryBuilder;

use crate::application::{
    pagination::{Page, PageRequest},
    repos::{CopiesRepo, RepoError},
};

use super::{SqliteRepositories, empty_patch, map_sqlx_error};

/// Expands `$mac!($($args)*; <every copy attribute column>)`.
macro_rules! with_copy_fields {
    ($mac:ident!($($args:tt)*)) => {
        $mac!($($args)*;
            clz_comic_id, custom_label, format, grade, grader_notes, grading_company,
            raw_slabbed, signed_by, slab_cert_number, purchase_date, purchase_price,
            purchase_store, purchase_year, date_sold, price_sold, sold_year, my_value,
            covrprice_value, value, country, language, age, barcode, cover_price,
            page_quality, key_flag, key_category, key_reason, label_type, no_of_pages,
            variant_description
        )
    };
}

macro_rules! push_columns {
    ($qb:ident; $($column:ident),+) => {
        $( $qb.push(concat!(", ", stringify!($column))); )+
    };
}

macro_rules! push_values {
    ($values:ident, $fields:ident; $($column:ident),+) => {
        $( $values.push_bind($fields.$column); )+
    };
}

macro_rules! push_assignments {
    ($set:ident, $fields:ident; $($column:ident),+) => {
        $(
            if let Some(value) = $fields.$column {
                $set.push(concat!(stringify!($column), " = "));
                $set.push_bind_unseparated(value);
            }
        )+
    };
}

#[async_trait]
impl CopiesRepo for SqliteRepositories {
    async fn list_copies(
        &self,
        issue_id: i64,
        page: PageRequest,
    ) -> Result<Page<ComicCopy>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT * FROM copies WHERE issue_id = ");
        qb.push_bind(issue_id);
        qb.push(" ORDER BY copy_id");
        Self::push_page(&mut qb, page);

        let rows = qb
            .build_query_as::<ComicCopy>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(Page::from_window(rows, page))
    }

    async fn find_copy(
        &self,
        issue_id: i64,
        copy_id: i64,
    ) -> Result<Option<ComicCopy>, RepoError> {
        sqlx::query_as::<_, ComicCopy>("SELECT * FROM copies WHERE issue_id = ? AND copy_id = ?")
            .bind(issue_id)
            .bind(copy_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn create_copy(
        &self,
        issue_id: i64,
        fields: CopyFields,
    ) -> Result<ComicCopy, RepoError> {
        let mut qb = QueryBuilder::new("INSERT INTO copies (issue_id");
        with_copy_fields!(push_columns!(qb));
        qb.push(") VALUES (");
        let mut values = qb.separated(", ");
        values.push_bind(issue_id);
        with_copy_fields!(push_values!(values, fields));
        qb.push(") RETURNING *");

        qb.build_query_as::<ComicCopy>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn update_copy(
        &self,
        issue_id: i64,
        copy_id: i64,
        patch: CopyFields,
    ) -> Result<Option<ComicCopy>, RepoError> {
        if patch.is_empty() {
            return Err(empty_patch());
        }

        let mut qb = QueryBuilder::new("UPDATE copies SET ");
        let mut set = qb.separated(", ");
        with_copy_fields!(push_assignments!(set, patch));
        qb.push(" WHERE issue_id = ");
        qb.push_bind(issue_id);
        qb.push(" AND copy_id = ");
        qb.push_bind(copy_id);
        qb.push(" RETURNING *");

        qb.build_query_as::<ComicCopy>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete_copy(&self, issue_id: i64, copy_id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM copies WHERE issue_id = ? AND copy_id = ?")
            .bind(issue_id)
            .bind(copy_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::affected(result.rows_affected()))
    }
}
