use crate::domain::prices::{PriceRecord, PriceTable};
use crate::error::StructuralError;
use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::Row;

const TEXT_TYPES: &[&str] = &["text", "character varying", "character"];
const DATE_TYPES: &[&str] = &["date", "timestamp without time zone", "timestamp with time zone"];
const DECIMAL_TYPES: &[&str] = &[
    "double precision",
    "real",
    "numeric",
    "bigint",
    "integer",
    "smallint",
];
const INTEGER_TYPES: &[&str] = &["bigint", "integer", "smallint", "numeric"];

const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[
    ("symbol", TEXT_TYPES),
    ("trade_date", DATE_TYPES),
    ("close", DECIMAL_TYPES),
    ("volume", INTEGER_TYPES),
];

/// Source of the canonical daily price table.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    fn source_name(&self) -> String;

    async fn load(&self) -> anyhow::Result<PriceTable>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

/// Optional columns present (with a usable type) in the source table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionalColumns {
    pub open: bool,
    pub high: bool,
    pub low: bool,
    pub sector: bool,
}

/// Checks required columns and their types before any row is read.
pub fn check_price_schema(
    table: &str,
    columns: &[ColumnInfo],
) -> Result<OptionalColumns, StructuralError> {
    if columns.is_empty() {
        return Err(StructuralError::MissingTable(table.to_string()));
    }

    let find = |name: &str| columns.iter().find(|c| c.name.eq_ignore_ascii_case(name));
    let check_type = |col: &ColumnInfo, allowed: &[&str]| {
        if allowed.contains(&col.data_type.as_str()) {
            Ok(())
        } else {
            Err(StructuralError::WrongColumnType {
                column: col.name.clone(),
                found: col.data_type.clone(),
                expected: allowed.join(", "),
            })
        }
    };

    for &(name, allowed) in REQUIRED_COLUMNS {
        let col = find(name).ok_or_else(|| StructuralError::MissingColumn {
            table: table.to_string(),
            column: name.to_string(),
        })?;
        check_type(col, allowed)?;
    }

    let optional = |name: &str, allowed: &[&str]| -> Result<bool, StructuralError> {
        match find(name) {
            Some(col) => check_type(col, allowed).map(|_| true),
            None => Ok(false),
        }
    };

    Ok(OptionalColumns {
        open: optional("open", DECIMAL_TYPES)?,
        high: optional("high", DECIMAL_TYPES)?,
        low: optional("low", DECIMAL_TYPES)?,
        sector: optional("sector", TEXT_TYPES)?,
    })
}

/// Splits `schema.table` and rejects anything that is not a plain identifier.
pub fn parse_table_name(name: &str) -> Result<(Option<String>, String), StructuralError> {
    let is_ident = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };

    let name = name.trim();
    let (schema, table) = match name.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    };

    if !is_ident(table) || schema.is_some_and(|s| !is_ident(s)) {
        return Err(StructuralError::InvalidConfig(format!(
            "PRICES_TABLE is not a valid table name: {name:?}"
        )));
    }

    Ok((schema.map(str::to_string), table.to_string()))
}

fn select_sql(qualified: &str, optional: OptionalColumns) -> String {
    let float_col = |present: bool, name: &str| {
        if present {
            format!("{name}::double precision AS {name}")
        } else {
            format!("NULL::double precision AS {name}")
        }
    };
    let sector = if optional.sector {
        "sector::text AS sector".to_string()
    } else {
        "NULL::text AS sector".to_string()
    };

    format!(
        "SELECT symbol::text AS symbol, trade_date::date AS trade_date, \
         close::double precision AS close, volume::bigint AS volume, \
         {}, {}, {}, {} \
         FROM {qualified} \
         ORDER BY symbol, trade_date",
        float_col(optional.open, "open"),
        float_col(optional.high, "high"),
        float_col(optional.low, "low"),
        sector,
    )
}

#[derive(Debug, Clone)]
pub struct PgPriceSource {
    pool: sqlx::PgPool,
    schema: Option<String>,
    table: String,
}

impl PgPriceSource {
    pub fn new(pool: sqlx::PgPool, table_name: &str) -> Result<Self, StructuralError> {
        let (schema, table) = parse_table_name(table_name)?;
        Ok(Self {
            pool,
            schema,
            table,
        })
    }

    fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.table),
            None => self.table.clone(),
        }
    }

    async fn fetch_columns(&self) -> anyhow::Result<Vec<ColumnInfo>> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT column_name::text, data_type::text \
             FROM information_schema.columns \
             WHERE table_name = $1 AND table_schema = COALESCE($2::text, current_schema()) \
             ORDER BY ordinal_position",
        )
        .persistent(false)
        .bind(&self.table)
        .bind(self.schema.as_deref())
        .fetch_all(&self.pool)
        .await
        .context("failed to inspect price table columns")?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| ColumnInfo { name, data_type })
            .collect())
    }
}

#[async_trait::async_trait]
impl PriceSource for PgPriceSource {
    fn source_name(&self) -> String {
        format!("postgres:{}", self.qualified_name())
    }

    async fn load(&self) -> anyhow::Result<PriceTable> {
        let t0 = std::time::Instant::now();
        let qualified = self.qualified_name();

        let columns = self.fetch_columns().await?;
        let optional = check_price_schema(&qualified, &columns)?;

        let rows = sqlx::query(&select_sql(&qualified, optional))
            .persistent(false)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StructuralError::Unreadable(format!("{qualified}: {e}")))?;

        let mut out = Vec::with_capacity(rows.len());
        for (idx, row) in rows.iter().enumerate() {
            out.push(decode_row(row).map_err(|e| {
                StructuralError::Unreadable(format!("{qualified} row {idx}: {e}"))
            })?);
        }

        tracing::info!(
            table = %qualified,
            rows = out.len(),
            ?optional,
            elapsed_ms = t0.elapsed().as_millis(),
            "loaded canonical price table"
        );

        Ok(PriceTable::new(out))
    }
}

fn decode_row(row: &PgRow) -> Result<PriceRecord, sqlx::Error> {
    Ok(PriceRecord {
        symbol: row.try_get::<Option<String>, _>("symbol")?,
        trade_date: row.try_get::<NaiveDate, _>("trade_date")?,
        close: row.try_get::<f64, _>("close")?,
        volume: row.try_get::<i64, _>("volume")?,
        open: row.try_get::<Option<f64>, _>("open")?,
        high: row.try_get::<Option<f64>, _>("high")?,
        low: row.try_get::<Option<f64>, _>("low")?,
        sector: row.try_get::<Option<String>, _>("sector")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, data_type: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
        }
    }

    fn base_columns() -> Vec<ColumnInfo> {
        vec![
            col("symbol", "text"),
            col("trade_date", "date"),
            col("close", "numeric"),
            col("volume", "bigint"),
        ]
    }

    #[test]
    fn accepts_required_columns_only() {
        let opt = check_price_schema("prices", &base_columns()).unwrap();
        assert_eq!(opt, OptionalColumns::default());
    }

    #[test]
    fn detects_optional_columns() {
        let mut cols = base_columns();
        cols.push(col("open", "double precision"));
        cols.push(col("sector", "character varying"));
        let opt = check_price_schema("prices", &cols).unwrap();
        assert!(opt.open && opt.sector);
        assert!(!opt.high && !opt.low);
    }

    #[test]
    fn missing_required_column_is_structural() {
        let cols: Vec<_> = base_columns()
            .into_iter()
            .filter(|c| c.name != "volume")
            .collect();
        assert_eq!(
            check_price_schema("prices", &cols).unwrap_err(),
            StructuralError::MissingColumn {
                table: "prices".to_string(),
                column: "volume".to_string(),
            }
        );
    }

    #[test]
    fn wrong_type_is_structural() {
        let mut cols = base_columns();
        cols[2] = col("close", "text");
        assert!(matches!(
            check_price_schema("prices", &cols),
            Err(StructuralError::WrongColumnType { column, .. }) if column == "close"
        ));

        let mut cols = base_columns();
        cols.push(col("high", "jsonb"));
        assert!(check_price_schema("prices", &cols).is_err());
    }

    #[test]
    fn no_columns_means_missing_table() {
        assert_eq!(
            check_price_schema("prices", &[]).unwrap_err(),
            StructuralError::MissingTable("prices".to_string())
        );
    }

    #[test]
    fn table_names_must_be_identifiers() {
        assert_eq!(
            parse_table_name("silver.sector_prices_daily").unwrap(),
            (Some("silver".to_string()), "sector_prices_daily".to_string())
        );
        assert_eq!(
            parse_table_name("sector_prices_daily").unwrap(),
            (None, "sector_prices_daily".to_string())
        );
        assert!(parse_table_name("prices; DROP TABLE x").is_err());
        assert!(parse_table_name("1prices").is_err());
        assert!(parse_table_name("a.b.c").is_err());
    }

    #[test]
    fn select_fills_absent_optional_columns_with_nulls() {
        let sql = select_sql(
            "prices",
            OptionalColumns {
                open: true,
                ..Default::default()
            },
        );
        assert!(sql.contains("open::double precision AS open"));
        assert!(sql.contains("NULL::double precision AS high"));
        assert!(sql.contains("NULL::text AS sector"));
    }
}
