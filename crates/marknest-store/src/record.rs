//! Per-type field descriptors and the field extractor.
//!
//! A record type declares its columns once with [`impl_record!`](crate::impl_record).
//! The generated [`Record`] impl exposes a static descriptor table plus
//! column-keyed accessors, which is all the insert, update and scan paths need
//! to stay generic over entity types.

use crate::error::StoreError;
use crate::value::{Value, ValueKind};

pub use sqlx::Error as RowError;
pub use sqlx::any::AnyRow;

/// Behaviour flags attached to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldFlags(u8);

impl FieldFlags {
    pub const NONE: Self = Self(0);
    /// Never written and never scanned.
    pub const SKIP: Self = Self(1);
    /// Dropped from extraction while holding its zero value.
    pub const OMIT_EMPTY: Self = Self(1 << 1);
    /// Left to the storage engine's default on insert.
    pub const DEFAULT: Self = Self(1 << 2);
    /// Passed through the secrets collaborator on write and read.
    pub const ENCRYPTED: Self = Self(1 << 3);

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Static description of one column of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub column: &'static str,
    pub kind: ValueKind,
    pub flags: FieldFlags,
}

/// One extracted column value, ready for the insert or update path.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub column: &'static str,
    pub value: Value,
    pub kind: ValueKind,
    pub default: bool,
    pub encrypted: bool,
}

/// A type with a column mapping. Implemented through [`impl_record!`](crate::impl_record).
pub trait Record {
    /// Table the type is usually stored in; used for error context.
    const TABLE: &'static str;

    /// Column descriptors in declaration order.
    fn fields() -> &'static [FieldDef];

    /// Current value of `column`, or `None` for an unknown column.
    fn value(&self, column: &str) -> Option<Value>;

    /// Overwrite `column` with `value`.
    fn set_value(&mut self, column: &str, value: Value) -> Result<(), StoreError>;

    /// Decode `column` from `row` into the matching field.
    ///
    /// Returns `false` when the type has no such column.
    fn decode_column(&mut self, column: &str, row: &AnyRow) -> Result<bool, RowError>;

    fn field(column: &str) -> Option<&'static FieldDef> {
        Self::fields().iter().find(|def| def.column == column)
    }
}

/// Declare the column mapping of a record type.
///
/// ```ignore
/// impl_record!(Workspace => "workspaces" {
///     id: i64 [default],
///     user_id: i64,
///     git_token: String [encrypted],
///     last_opened_file_path as "last_opened_file": Option<String> [omit_empty],
/// });
/// ```
///
/// Column names default to the field name. Every listed field type must
/// implement [`ColumnType`](crate::value::ColumnType); fields that are not
/// persisted at all are simply left out of the list.
#[macro_export]
macro_rules! impl_record {
    (@column $field:ident) => {
        stringify!($field)
    };
    (@column $field:ident $column:literal) => {
        $column
    };
    (@flag skip) => {
        $crate::record::FieldFlags::SKIP
    };
    (@flag omit_empty) => {
        $crate::record::FieldFlags::OMIT_EMPTY
    };
    (@flag default) => {
        $crate::record::FieldFlags::DEFAULT
    };
    (@flag encrypted) => {
        $crate::record::FieldFlags::ENCRYPTED
    };
    ($ty:ty => $table:literal {
        $( $field:ident $(as $column:literal)? : $fty:ty $([ $($flag:ident),* ])? ),* $(,)?
    }) => {
        impl $crate::record::Record for $ty {
            const TABLE: &'static str = $table;

            fn fields() -> &'static [$crate::record::FieldDef] {
                const FIELDS: &[$crate::record::FieldDef] = &[
                    $(
                        $crate::record::FieldDef {
                            column: $crate::impl_record!(@column $field $($column)?),
                            kind: <$fty as $crate::value::ColumnType>::KIND,
                            flags: $crate::record::FieldFlags::NONE
                                $($( .union($crate::impl_record!(@flag $flag)) )*)?,
                        },
                    )*
                ];
                FIELDS
            }

            fn value(&self, column: &str) -> Option<$crate::value::Value> {
                $(
                    if column == $crate::impl_record!(@column $field $($column)?) {
                        return Some(<$fty as $crate::value::ColumnType>::to_value(&self.$field));
                    }
                )*
                None
            }

            fn set_value(
                &mut self,
                column: &str,
                value: $crate::value::Value,
            ) -> Result<(), $crate::error::StoreError> {
                $(
                    if column == $crate::impl_record!(@column $field $($column)?) {
                        self.$field = <$fty as $crate::value::ColumnType>::from_value(value)
                            .map_err(|e| e.context(format!("{}.{}", $table, column)))?;
                        return Ok(());
                    }
                )*
                Err($crate::error::StoreError::InvalidInput(format!(
                    "{} has no column {column}",
                    $table
                )))
            }

            fn decode_column(
                &mut self,
                column: &str,
                row: &$crate::record::AnyRow,
            ) -> Result<bool, $crate::record::RowError> {
                $(
                    if column == $crate::impl_record!(@column $field $($column)?) {
                        self.$field = <$fty as $crate::value::ColumnType>::decode(row, column)?;
                        return Ok(true);
                    }
                )*
                Ok(false)
            }
        }
    };
}

/// Extract the persistable columns of `record` in declaration order.
///
/// `skip` fields are never returned and `omit_empty` fields are dropped while
/// they hold their zero value. `default` and `encrypted` are reported on the
/// [`Field`] and left for the caller to act on; no value is transformed here.
pub fn extract_fields<R: Record>(record: &R) -> Result<Vec<Field>, StoreError> {
    let defs = R::fields();
    if defs.is_empty() {
        return Err(StoreError::InvalidInput(format!(
            "record for {} declares no columns",
            R::TABLE
        )));
    }

    let mut fields = Vec::with_capacity(defs.len());
    for def in defs {
        if def.flags.contains(FieldFlags::SKIP) {
            continue;
        }
        if def.flags.contains(FieldFlags::ENCRYPTED) && def.kind != ValueKind::Text {
            return Err(StoreError::InvalidInput(format!(
                "{}.{} is encrypted but not a text column",
                R::TABLE,
                def.column
            )));
        }

        let value = record.value(def.column).ok_or_else(|| {
            StoreError::InvalidInput(format!("{} has no accessor for {}", R::TABLE, def.column))
        })?;
        if def.flags.contains(FieldFlags::OMIT_EMPTY) && value.is_zero() {
            continue;
        }

        fields.push(Field {
            column: def.column,
            value,
            kind: def.kind,
            default: def.flags.contains(FieldFlags::DEFAULT),
            encrypted: def.flags.contains(FieldFlags::ENCRYPTED),
        });
    }
    Ok(fields)
}
