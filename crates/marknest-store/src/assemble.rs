//! INSERT and UPDATE statements generated from record descriptors.

use marknest_crypto::Secrets;

use crate::error::StoreError;
use crate::query::Query;
use crate::record::{Field, Record, extract_fields};
use crate::value::Value;

/// Encrypt `field` in place when it is flagged and holds text.
fn seal(field: &mut Field, secrets: &dyn Secrets, table: &str) -> Result<(), StoreError> {
    if !field.encrypted {
        return Ok(());
    }
    if let Value::Text(plain) = &field.value {
        let sealed = secrets
            .encrypt(plain)
            .map_err(|e| StoreError::from(e).context(format!("{table}.{}", field.column)))?;
        field.value = Value::Text(sealed);
    }
    Ok(())
}

impl Query {
    /// `INSERT INTO table (cols) VALUES (...)` from the record's columns.
    ///
    /// `default` columns are left out so the database fills them in.
    pub fn insert_struct<R: Record>(
        &mut self,
        record: &R,
        table: &str,
        secrets: &dyn Secrets,
    ) -> Result<&mut Self, StoreError> {
        let mut fields: Vec<Field> = extract_fields(record)?
            .into_iter()
            .filter(|f| !f.default)
            .collect();
        if fields.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "insert into {table}: no insertable columns"
            )));
        }
        for field in &mut fields {
            seal(field, secrets, table)?;
        }

        let columns: Vec<&str> = fields.iter().map(|f| f.column).collect();
        self.insert(table, &columns)
            .values(fields.len())
            .add_args(fields.into_iter().map(|f| f.value));
        Ok(self)
    }

    /// `UPDATE table SET ... WHERE c1 = ? AND c2 = ?` covering every extracted column.
    pub fn update_struct<R: Record>(
        &mut self,
        record: &R,
        table: &str,
        where_columns: &[&str],
        where_args: Vec<Value>,
        secrets: &dyn Secrets,
    ) -> Result<&mut Self, StoreError> {
        if where_columns.len() != where_args.len() {
            return Err(StoreError::InvalidInput(format!(
                "update {table}: {} where columns but {} arguments",
                where_columns.len(),
                where_args.len()
            )));
        }

        let fields = extract_fields(record)?;
        if fields.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "update {table}: no columns to set"
            )));
        }

        self.update(table);
        for mut field in fields {
            seal(&mut field, secrets, table)?;
            self.set(field.column).placeholder(field.value);
        }
        for (column, arg) in where_columns.iter().zip(where_args) {
            self.where_(&format!("{column} = ")).placeholder(arg);
        }
        Ok(self)
    }
}
