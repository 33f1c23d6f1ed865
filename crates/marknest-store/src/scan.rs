//! Row hydration: the reverse of field extraction.
//!
//! Result columns are matched to record fields by column name. Columns the
//! record does not declare are ignored, as are `skip` fields. `encrypted`
//! fields are decrypted after decoding so the record only ever holds plaintext.

use marknest_crypto::Secrets;
use sqlx::Column;
use sqlx::Row;
use sqlx::any::AnyRow;

use crate::error::StoreError;
use crate::record::{FieldFlags, Record};
use crate::value::Value;

/// Populate `dest` from `row`.
pub fn scan_into<R: Record>(
    row: &AnyRow,
    dest: &mut R,
    secrets: &dyn Secrets,
) -> Result<(), StoreError> {
    for column in row.columns() {
        let name = column.name();
        let Some(def) = R::field(name) else {
            continue;
        };
        if def.flags.contains(FieldFlags::SKIP) {
            continue;
        }

        dest.decode_column(name, row)
            .map_err(|e| StoreError::from(e).context(format!("scan {}.{name}", R::TABLE)))?;

        if def.flags.contains(FieldFlags::ENCRYPTED) {
            if let Some(Value::Text(sealed)) = dest.value(name) {
                let plain = secrets.decrypt(&sealed).map_err(|e| {
                    StoreError::from(e).context(format!("decrypt {}.{name}", R::TABLE))
                })?;
                dest.set_value(name, Value::Text(plain))?;
            }
        }
    }
    Ok(())
}

/// Hydrate a fresh record from one row.
pub fn scan_one<R: Record + Default>(row: &AnyRow, secrets: &dyn Secrets) -> Result<R, StoreError> {
    let mut record = R::default();
    scan_into(row, &mut record, secrets)?;
    Ok(record)
}

/// Hydrate one record per row, preserving row order.
pub fn scan_many<R: Record + Default>(
    rows: &[AnyRow],
    secrets: &dyn Secrets,
) -> Result<Vec<R>, StoreError> {
    rows.iter().map(|row| scan_one(row, secrets)).collect()
}
