//! SQL over registered tables with polars-sql.

use color_eyre::Result;
use lazy_static::lazy_static;
use polars::prelude::*;
use polars_sql::SQLContext;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::DataQueryError;
use crate::registry::TableRegistry;

lazy_static! {
    static ref LEADING_COMMENTS: Regex =
        Regex::new(r"^(?:\s+|--[^\n]*(?:\n|$)|/\*(?s:.*?)\*/|\()*").expect("static regex");
    static ref MISSING_RELATION: Regex =
        Regex::new(r"(?i)relation '[^']*' (?:was )?not found|no table (?:or alias )?named|table '[^']*' not found")
            .expect("static regex");
}

/// Statements that would modify a table rather than read it.
const MUTATING_KEYWORDS: [&str; 4] = ["UPDATE", "INSERT", "DELETE", "MERGE"];

/// Create a SQL context with every registered table.
pub fn new_sql_context(registry: &TableRegistry) -> SQLContext {
    let mut ctx = SQLContext::new();
    for (name, entry) in registry.tables() {
        ctx.register(name, entry.frame.as_ref().clone().lazy());
    }
    ctx
}

/// First keyword of a statement, uppercased, skipping comments and parentheses.
pub fn leading_keyword(sql: &str) -> Option<String> {
    let rest = match LEADING_COMMENTS.find(sql) {
        Some(m) => &sql[m.end()..],
        None => sql,
    };
    let word: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if word.is_empty() {
        None
    } else {
        Some(word.to_ascii_uppercase())
    }
}

fn classify_engine_error(err: PolarsError) -> DataQueryError {
    let message = err.to_string();
    if MISSING_RELATION.is_match(&message) {
        DataQueryError::TableNotFound { detail: message }
    } else {
        DataQueryError::QueryFailed(message)
    }
}

pub struct QueryEngine;

impl QueryEngine {
    /// Execute a read-only statement against every registered table.
    pub fn run(registry: &TableRegistry, sql: &str) -> Result<DataFrame> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(DataQueryError::EmptyQuery.report());
        }
        if let Some(keyword) = leading_keyword(sql)
            && MUTATING_KEYWORDS.contains(&keyword.as_str())
        {
            warn!("Rejected {} statement", keyword);
            return Err(DataQueryError::UpdateNotAvailable.report());
        }

        debug!("Executing query over {} table(s): {}", registry.len(), sql);
        let mut ctx = new_sql_context(registry);
        let frame = ctx
            .execute(sql)
            .and_then(|lf| lf.collect())
            .map_err(|e| classify_engine_error(e).report())?;
        info!("Query returned {} rows x {} columns", frame.height(), frame.width());
        Ok(frame)
    }

    /// First `rows` rows of a table through the SQL engine.
    pub fn preview(registry: &TableRegistry, name: &str, rows: usize) -> Result<DataFrame> {
        if registry.get(name).is_none() {
            return Err(DataQueryError::UnknownTable(name.to_string()).report());
        }
        Self::run(registry, &format!("SELECT * FROM \"{name}\" LIMIT {rows}"))
    }
}
