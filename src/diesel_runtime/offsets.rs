//! `stream_offset_tracker` persistence.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text, Timestamptz};

use crate::diesel_runtime::Pool;
use crate::offsets::{OffsetRange, OffsetStore};
use crate::schema::ddl::{qualified, OFFSET_TABLE};
use crate::writer::WarehouseError;

#[derive(QueryableByName)]
struct OffsetRow {
    #[diesel(sql_type = BigInt)]
    id: i64,
    #[diesel(sql_type = BigInt)]
    offset: i64,
    #[diesel(sql_type = BigInt)]
    end_offset: i64,
    #[diesel(sql_type = Text)]
    application: String,
    #[diesel(sql_type = Timestamptz)]
    start_date: DateTime<Utc>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    end_date: Option<DateTime<Utc>>,
}

impl From<OffsetRow> for OffsetRange {
    fn from(row: OffsetRow) -> Self {
        OffsetRange {
            id: row.id,
            start_offset: row.offset,
            end_offset: row.end_offset,
            application: row.application,
            start_date: row.start_date,
            end_date: row.end_date,
        }
    }
}

#[derive(QueryableByName)]
struct MaxEnd {
    #[diesel(sql_type = Nullable<BigInt>)]
    end_offset: Option<i64>,
}

/// Offset ranges stored in the warehouse; each operation commits on its own
pub struct DieselOffsetStore {
    pool: Pool,
    table: String,
}

impl DieselOffsetStore {
    pub fn new(pool: Pool, schema: &str) -> Self {
        Self {
            pool,
            table: qualified(schema, OFFSET_TABLE),
        }
    }
}

impl OffsetStore for DieselOffsetStore {
    fn latest_open_range(
        &self,
        application: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<OffsetRange>, WarehouseError> {
        let mut conn = self.pool.get()?;
        let rows = diesel::sql_query(format!(
            "SELECT id, \"offset\", end_offset, application, start_date, end_date FROM {} \
             WHERE application = $1 AND end_date IS NULL AND start_date >= $2 \
             ORDER BY start_date DESC, id DESC LIMIT 1",
            self.table
        ))
        .bind::<Text, _>(application)
        .bind::<Timestamptz, _>(since)
        .load::<OffsetRow>(&mut conn)?;

        Ok(rows.into_iter().next().map(OffsetRange::from))
    }

    fn max_closed_end(&self, application: &str) -> Result<Option<i64>, WarehouseError> {
        let mut conn = self.pool.get()?;
        let max = diesel::sql_query(format!(
            "SELECT MAX(end_offset) AS end_offset FROM {} \
             WHERE application = $1 AND end_date IS NOT NULL",
            self.table
        ))
        .bind::<Text, _>(application)
        .get_result::<MaxEnd>(&mut conn)?;

        Ok(max.end_offset)
    }

    fn insert_range(
        &self,
        start_offset: i64,
        end_offset: i64,
        application: &str,
    ) -> Result<(), WarehouseError> {
        let mut conn = self.pool.get()?;
        diesel::sql_query(format!(
            "INSERT INTO {} (\"offset\", end_offset, application, start_date) \
             VALUES ($1, $2, $3, CURRENT_TIMESTAMP)",
            self.table
        ))
        .bind::<BigInt, _>(start_offset)
        .bind::<BigInt, _>(end_offset)
        .bind::<Text, _>(application)
        .execute(&mut conn)?;
        Ok(())
    }

    fn close_range(
        &self,
        start_offset: i64,
        end_offset: i64,
        application: &str,
    ) -> Result<usize, WarehouseError> {
        let mut conn = self.pool.get()?;
        let closed = diesel::sql_query(format!(
            "UPDATE {} SET end_date = CURRENT_TIMESTAMP \
             WHERE \"offset\" = $1 AND end_offset = $2 AND application = $3 AND end_date IS NULL",
            self.table
        ))
        .bind::<BigInt, _>(start_offset)
        .bind::<BigInt, _>(end_offset)
        .bind::<Text, _>(application)
        .execute(&mut conn)?;
        Ok(closed)
    }
}
