//! Portable SQL statement builder.
//!
//! A `Query` accumulates SQL fragments and positional arguments for exactly
//! one statement. Placeholder text follows the [`Dialect`]: SQLite repeats
//! `?`, Postgres numbers `$1, $2, ...` across the whole statement.
//!
//! Clauses that may appear only once (SELECT, FROM, GROUP BY, ORDER BY,
//! LIMIT, OFFSET) are written on first use and ignored afterwards, so
//! conditional building never duplicates a keyword. The builder does not
//! validate clause order; malformed statements fail in the database.

use std::fmt;

use crate::error::StoreError;
use crate::value::Value;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `?` placeholders.
    Sqlite,
    /// `$N` placeholders.
    Postgres,
}

impl Dialect {
    /// Pick the dialect from a database URL scheme.
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        if marknest_core::db::is_sqlite_url(url) {
            Ok(Self::Sqlite)
        } else if marknest_core::db::is_postgres_url(url) {
            Ok(Self::Postgres)
        } else {
            Err(StoreError::Connection(format!(
                "unsupported database URL scheme: {}",
                marknest_core::db::redact_url(url)
            )))
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
        }
    }

    /// Render the marker for the `position`-th (1-based) argument.
    pub fn marker(self, position: usize) -> String {
        match self {
            Self::Sqlite => "?".to_string(),
            Self::Postgres => format!("${position}"),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Two-table join flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// Builder state for a single statement.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct Query {
    dialect: Dialect,
    parts: Vec<String>,
    args: Vec<Value>,
    position: usize,
    depth: usize,
    has_select: bool,
    has_from: bool,
    has_where: bool,
    has_group_by: bool,
    has_having: bool,
    has_order_by: bool,
    has_limit: bool,
    has_offset: bool,
    has_set: bool,
}

impl Query {
    pub const fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            parts: Vec::new(),
            args: Vec::new(),
            position: 0,
            depth: 0,
            has_select: false,
            has_from: false,
            has_where: false,
            has_group_by: false,
            has_having: false,
            has_order_by: false,
            has_limit: false,
            has_offset: false,
            has_set: false,
        }
    }

    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    // =========================================================================
    // Read clauses
    // =========================================================================

    pub fn select(&mut self, columns: &[&str]) -> &mut Self {
        if !self.has_select {
            self.has_select = true;
            self.parts.push(format!("SELECT {}", columns.join(", ")));
        }
        self
    }

    pub fn from(&mut self, table: &str) -> &mut Self {
        if !self.has_from {
            self.has_from = true;
            self.parts.push(format!(" FROM {table}"));
        }
        self
    }

    /// Open the WHERE clause, or continue it with `AND` once open.
    pub fn where_(&mut self, condition: &str) -> &mut Self {
        if self.has_where {
            self.parts.push(format!(" AND {condition}"));
        } else {
            self.has_where = true;
            self.parts.push(format!(" WHERE {condition}"));
        }
        self
    }

    pub fn and(&mut self, condition: &str) -> &mut Self {
        self.parts.push(format!(" AND {condition}"));
        self
    }

    pub fn or(&mut self, condition: &str) -> &mut Self {
        self.parts.push(format!(" OR {condition}"));
        self
    }

    /// `column IN (...)` under the same WHERE/AND rule as [`Query::where_`].
    ///
    /// An empty list renders a condition that matches no rows.
    pub fn where_in<V: Into<Value>>(
        &mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self.where_("1 = 0");
        }
        self.where_(&format!("{column} IN ("));
        let count = values.len();
        self.placeholders(count);
        self.args.extend(values);
        self.parts.push(")".to_string());
        self
    }

    pub fn join(&mut self, kind: JoinKind, table: &str, on: &str) -> &mut Self {
        self.parts.push(format!(" {} {table} ON {on}", kind.keyword()));
        self
    }

    pub fn group_by(&mut self, columns: &[&str]) -> &mut Self {
        if !self.has_group_by {
            self.has_group_by = true;
            self.parts.push(format!(" GROUP BY {}", columns.join(", ")));
        }
        self
    }

    /// Open the HAVING clause, or continue it with `AND` once open.
    pub fn having(&mut self, condition: &str) -> &mut Self {
        if self.has_having {
            self.parts.push(format!(" AND {condition}"));
        } else {
            self.has_having = true;
            self.parts.push(format!(" HAVING {condition}"));
        }
        self
    }

    /// Columns may carry a direction, e.g. `"created_at DESC"`.
    pub fn order_by(&mut self, columns: &[&str]) -> &mut Self {
        if !self.has_order_by {
            self.has_order_by = true;
            self.parts.push(format!(" ORDER BY {}", columns.join(", ")));
        }
        self
    }

    pub fn limit(&mut self, limit: i64) -> &mut Self {
        if !self.has_limit {
            self.has_limit = true;
            self.parts.push(" LIMIT ".to_string());
            self.placeholder(limit);
        }
        self
    }

    pub fn offset(&mut self, offset: i64) -> &mut Self {
        if !self.has_offset {
            self.has_offset = true;
            self.parts.push(" OFFSET ".to_string());
            self.placeholder(offset);
        }
        self
    }

    pub fn start_group(&mut self) -> &mut Self {
        self.depth += 1;
        self.parts.push("(".to_string());
        self
    }

    /// Close the innermost group; ignored when no group is open.
    pub fn end_group(&mut self) -> &mut Self {
        if self.depth > 0 {
            self.depth -= 1;
            self.parts.push(")".to_string());
        }
        self
    }

    // =========================================================================
    // Placeholders and arguments
    // =========================================================================

    fn next_marker(&mut self) -> String {
        self.position += 1;
        self.dialect.marker(self.position)
    }

    /// Append one marker and register `value` as its argument.
    pub fn placeholder(&mut self, value: impl Into<Value>) -> &mut Self {
        let marker = self.next_marker();
        self.parts.push(marker);
        self.args.push(value.into());
        self
    }

    /// Append `count` comma-separated markers without registering arguments.
    pub fn placeholders(&mut self, count: usize) -> &mut Self {
        let markers: Vec<String> = (0..count).map(|_| self.next_marker()).collect();
        self.parts.push(markers.join(", "));
        self
    }

    pub fn add_arg(&mut self, value: impl Into<Value>) -> &mut Self {
        self.args.push(value.into());
        self
    }

    pub fn add_args<V: Into<Value>>(&mut self, values: impl IntoIterator<Item = V>) -> &mut Self {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    // =========================================================================
    // Write clauses
    // =========================================================================

    pub fn insert(&mut self, table: &str, columns: &[&str]) -> &mut Self {
        self.parts.push(format!("INSERT INTO {table} ({})", columns.join(", ")));
        self
    }

    /// `VALUES (...)` with `count` markers; arguments come from `add_args`.
    pub fn values(&mut self, count: usize) -> &mut Self {
        self.parts.push(" VALUES (".to_string());
        self.placeholders(count);
        self.parts.push(")".to_string());
        self
    }

    pub fn update(&mut self, table: &str) -> &mut Self {
        self.parts.push(format!("UPDATE {table} SET "));
        self
    }

    /// `column = `, comma-separated from the second call on.
    pub fn set(&mut self, column: &str) -> &mut Self {
        if self.has_set {
            self.parts.push(format!(", {column} = "));
        } else {
            self.has_set = true;
            self.parts.push(format!("{column} = "));
        }
        self
    }

    pub fn delete(&mut self, table: &str) -> &mut Self {
        self.parts.push(format!("DELETE FROM {table}"));
        self
    }

    pub fn returning(&mut self, columns: &[&str]) -> &mut Self {
        self.parts.push(format!(" RETURNING {}", columns.join(", ")));
        self
    }

    /// Append a raw fragment verbatim.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.parts.push(sql.to_string());
        self
    }

    // =========================================================================
    // Dialect expressions
    // =========================================================================

    /// Unix-seconds expression for "now minus `days` days".
    pub fn time_since(&self, days: u32) -> String {
        match self.dialect {
            Dialect::Sqlite => {
                format!("CAST(strftime('%s', 'now', '-{days} days') AS INTEGER)")
            }
            Dialect::Postgres => {
                format!("CAST(EXTRACT(EPOCH FROM NOW() - INTERVAL '{days} days') AS BIGINT)")
            }
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// The finished SQL text.
    pub fn sql(&self) -> String {
        self.parts.concat()
    }

    /// Arguments in emission order.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.parts.concat(), self.args)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            f.write_str(part)?;
        }
        Ok(())
    }
}
