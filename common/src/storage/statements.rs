//! Bulk DML builders for the two target tables.
//!
//! Every placeholder carries an explicit cast so binding does not depend on
//! the exact column types of the externally managed schema: numeric casts
//! narrow through assignment casts, structured values go through `jsonb`.

use std::fmt::Write;

/// Postgres rejects statements with more bind parameters than this.
pub const MAX_BIND_PARAMS: usize = 65_535;

pub const METADATA_TABLE: &str = "metadata";
pub const REVIEW_TABLE: &str = "user_reviews";

/// A target column and the SQL type its placeholder is cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub cast: &'static str,
}

const fn col(name: &'static str, cast: &'static str) -> Column {
    Column { name, cast }
}

pub const METADATA_KEY: &str = "parent_asin";

pub const METADATA_COLUMNS: &[Column] = &[
    col("parent_asin", "text"),
    col("main_category", "text"),
    col("title", "text"),
    col("average_rating", "float8"),
    col("rating_number", "int8"),
    col("features", "text::jsonb"),
    col("description", "text::jsonb"),
    col("price", "float8"),
    col("images", "text::jsonb"),
    col("videos", "text::jsonb"),
    col("store", "text"),
    col("categories", "text::jsonb"),
    col("details", "text::jsonb"),
    col("bought_together", "text::jsonb"),
];

pub const REVIEW_COLUMNS: &[Column] = &[
    col("asin", "text"),
    col("user_id", "text"),
    col("rating", "int8"),
    col("title", "text"),
    col("review_text", "text"),
    col("images", "text::jsonb"),
    col("parent_asin", "text"),
    col("ts", "timestamp"),
    col("helpful_vote", "int8"),
    col("verified_purchase", "bool"),
    col("embedding", "vector"),
];

/// Largest number of rows one statement over `columns` may carry.
pub fn rows_per_statement(columns: &[Column]) -> usize {
    (MAX_BIND_PARAMS / columns.len().max(1)).max(1)
}

fn column_list(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `($1::text, $2::float8), ($3::text, $4::float8), ...` for `rows` rows.
pub fn values_clause(columns: &[Column], rows: usize) -> String {
    let mut clause = String::new();
    let mut param = 1usize;
    for row in 0..rows {
        if row > 0 {
            clause.push_str(", ");
        }
        clause.push('(');
        for (idx, column) in columns.iter().enumerate() {
            if idx > 0 {
                clause.push_str(", ");
            }
            let _ = write!(clause, "${param}::{}", column.cast);
            param += 1;
        }
        clause.push(')');
    }
    clause
}

/// Insert-or-overwrite keyed on `parent_asin`.
pub fn metadata_upsert_sql(rows: usize) -> String {
    let updates = METADATA_COLUMNS
        .iter()
        .filter(|column| column.name != METADATA_KEY)
        .map(|column| format!("{0} = EXCLUDED.{0}", column.name))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {METADATA_TABLE} ({}) VALUES {} ON CONFLICT ({METADATA_KEY}) DO UPDATE SET {updates}",
        column_list(METADATA_COLUMNS),
        values_clause(METADATA_COLUMNS, rows),
    )
}

/// Insert-or-ignore. Which rows count as duplicates is decided by the unique
/// constraints of the `user_reviews` table.
pub fn review_insert_sql(rows: usize) -> String {
    format!(
        "INSERT INTO {REVIEW_TABLE} ({}) VALUES {} ON CONFLICT DO NOTHING",
        column_list(REVIEW_COLUMNS),
        values_clause(REVIEW_COLUMNS, rows),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_clause_numbers_placeholders_row_major() {
        let columns = [col("a", "text"), col("b", "int8")];
        assert_eq!(
            values_clause(&columns, 2),
            "($1::text, $2::int8), ($3::text, $4::int8)"
        );
    }

    #[test]
    fn metadata_upsert_overwrites_every_non_key_column() {
        let sql = metadata_upsert_sql(1);
        assert!(sql.starts_with("INSERT INTO metadata (parent_asin, main_category,"));
        assert!(sql.contains("ON CONFLICT (parent_asin) DO UPDATE SET"));
        for column in METADATA_COLUMNS {
            let assignment = format!("{0} = EXCLUDED.{0}", column.name);
            if column.name == METADATA_KEY {
                assert!(!sql.contains(&assignment));
            } else {
                assert!(sql.contains(&assignment), "missing {assignment}");
            }
        }
        assert!(sql.contains("$14::text::jsonb)"));
        assert!(!sql.contains("$15"));
    }

    #[test]
    fn review_insert_ignores_conflicts() {
        let sql = review_insert_sql(3);
        assert!(sql.starts_with("INSERT INTO user_reviews (asin, user_id, rating,"));
        assert!(sql.ends_with("ON CONFLICT DO NOTHING"));
        assert!(sql.contains("$33::vector)"));
        assert!(!sql.contains("$34"));
    }

    #[test]
    fn statement_pages_stay_under_bind_limit() {
        let rows = rows_per_statement(REVIEW_COLUMNS);
        assert!(rows * REVIEW_COLUMNS.len() <= MAX_BIND_PARAMS);
        assert!((rows + 1) * REVIEW_COLUMNS.len() > MAX_BIND_PARAMS);
        assert_eq!(rows_per_statement(&[]), MAX_BIND_PARAMS);
    }
}
