//! Column names, ordinals and data types of a file. The schema is the single
//! source of truth for the block layout: stripe order follows ordinals and
//! stripe sizes follow data types.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::Arc;

use crate::block::{VALIDITY_SIZE, VAR_SLOT_SIZE};
use crate::error::SchemaError;
use crate::value::Value;
use crate::BLOCK_CAPACITY;

pub mod parser;

/// Largest number of columns, and longest column name in bytes, the
/// metadata encoding can represent.
pub const MAX_COLUMNS: usize = u16::MAX as usize;
pub const MAX_NAME_LENGTH: usize = u16::MAX as usize;

pub type SchemaRef = Arc<Schema>;

/// DataType is the closed set of primitive column types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    String,
    Bytes,
}

impl DataType {
    pub const ALL: [DataType; 7] = [
        DataType::Bool,
        DataType::Int32,
        DataType::Int64,
        DataType::Float32,
        DataType::Float64,
        DataType::String,
        DataType::Bytes,
    ];

    /// tag is the on-disk type identifier.
    pub fn tag(&self) -> u8 {
        match self {
            DataType::Bool => 0,
            DataType::Int32 => 1,
            DataType::Int64 => 2,
            DataType::Float32 => 3,
            DataType::Float64 => 4,
            DataType::String => 5,
            DataType::Bytes => 6,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, SchemaError> {
        DataType::ALL
            .iter()
            .find(|t| t.tag() == tag)
            .copied()
            .ok_or(SchemaError::UnknownType(tag))
    }

    /// fixed_width returns the byte size of a value, or `None` for variable
    /// width types.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            DataType::Bool => Some(1),
            DataType::Int32 | DataType::Float32 => Some(4),
            DataType::Int64 | DataType::Float64 => Some(8),
            DataType::String | DataType::Bytes => None,
        }
    }

    pub fn is_variable(&self) -> bool {
        self.fixed_width().is_none()
    }

    /// slot_width is the size of one stripe slot: the value itself, or an
    /// (offset, length) pair into the unsized section.
    pub fn slot_width(&self) -> usize {
        self.fixed_width().unwrap_or(VAR_SLOT_SIZE)
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "Bool",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
            DataType::String => "String",
            DataType::Bytes => "Bytes",
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .iter()
            .find(|t| t.name() == s)
            .copied()
            .ok_or_else(|| SchemaError::Parse(format!("unknown data type '{}'", s)))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub dtype: DataType,
    /// Position in the schema, defines stripe order.
    pub ordinal: usize,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: DataType, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            dtype,
            ordinal,
            nullable: false,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// stripe_size is the number of bytes this column occupies in a block's
    /// sized section.
    pub fn stripe_size(&self) -> usize {
        let validity = if self.nullable { VALIDITY_SIZE } else { 0 };
        validity + BLOCK_CAPACITY * self.dtype.slot_width()
    }

    /// parse_value converts the textual form of a field into a typed value.
    /// Empty text is `Null` in a nullable column. Bytes are hex encoded.
    pub fn parse_value(&self, text: &str) -> Result<Value, SchemaError> {
        if text.is_empty() && self.nullable {
            return Ok(Value::Null);
        }

        let invalid = || SchemaError::InvalidValue {
            column: self.name.clone(),
            dtype: self.dtype,
            text: text.to_string(),
        };

        let field = text.trim();
        let value = match self.dtype {
            DataType::Bool => match field.to_ascii_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => return Err(invalid()),
            },
            DataType::Int32 => Value::Int32(field.parse().map_err(|_| invalid())?),
            DataType::Int64 => Value::Int64(field.parse().map_err(|_| invalid())?),
            DataType::Float32 => Value::Float32(field.parse().map_err(|_| invalid())?),
            DataType::Float64 => Value::Float64(field.parse().map_err(|_| invalid())?),
            DataType::String => Value::String(text.to_string()),
            DataType::Bytes => Value::Bytes(hex::decode(field).map_err(|_| invalid())?),
        };

        Ok(value)
    }
}

/// Schema is an ordered, validated sequence of columns. It is immutable once
/// built and shared read-only through [`SchemaRef`].
#[derive(Clone, Debug)]
pub struct Schema {
    columns: Vec<Column>,
    by_name: HashMap<String, usize>,

    /// Offset of each column's stripe from the start of the sized section.
    stripe_offsets: Vec<usize>,
    sized_len: usize,
}

impl Schema {
    /// build validates `columns` and orders them by ordinal. Ordinals must
    /// be exactly `0..columns.len()`.
    pub fn build(mut columns: Vec<Column>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::Empty);
        }
        if columns.len() > MAX_COLUMNS {
            return Err(SchemaError::Limit(format!(
                "{} columns, max {}",
                columns.len(),
                MAX_COLUMNS
            )));
        }

        columns.sort_by_key(|c| c.ordinal);

        let mut by_name = HashMap::with_capacity(columns.len());
        for (expected, column) in columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(SchemaError::EmptyName {
                    ordinal: column.ordinal,
                });
            }
            if column.name.len() > MAX_NAME_LENGTH {
                return Err(SchemaError::Limit(format!(
                    "column name of {} bytes, max {}",
                    column.name.len(),
                    MAX_NAME_LENGTH
                )));
            }
            if by_name.insert(column.name.clone(), expected).is_some() {
                return Err(SchemaError::DuplicateName(column.name.clone()));
            }
            if column.ordinal != expected {
                return Err(SchemaError::InvalidOrdinal {
                    name: column.name.clone(),
                    ordinal: column.ordinal,
                    expected,
                });
            }
        }

        let mut stripe_offsets = Vec::with_capacity(columns.len());
        let mut sized_len = 0;
        for column in &columns {
            stripe_offsets.push(sized_len);
            sized_len += column.stripe_size();
        }

        Ok(Self {
            columns,
            by_name,
            stripe_offsets,
            sized_len,
        })
    }

    /// from_fields builds a schema of non-nullable columns, assigning ordinals
    /// in the given order.
    pub fn from_fields(fields: &[(&str, DataType)]) -> Result<Self, SchemaError> {
        Self::build(
            fields
                .iter()
                .enumerate()
                .map(|(i, (name, dtype))| Column::new(*name, *dtype, i))
                .collect(),
        )
    }

    /// parse builds a schema from a declaration such as
    /// `"id: Int32, name: String Nullable"`.
    pub fn parse(decl: &str) -> Result<Self, SchemaError> {
        Self::build(parser::parse_columns(decl)?)
    }

    pub fn into_ref(self) -> SchemaRef {
        Arc::new(self)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, j: usize) -> Option<&Column> {
        self.columns.get(j)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn resolve(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|j| &self.columns[j])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn fixed_width_of(dtype: DataType) -> Option<usize> {
        dtype.fixed_width()
    }

    /// stripe_offset is the offset of column `j`'s stripe from the start of
    /// the sized section.
    pub fn stripe_offset(&self, j: usize) -> usize {
        self.stripe_offsets[j]
    }

    /// sized_len is the byte length of a block's sized section.
    pub fn sized_len(&self) -> usize {
        self.sized_len
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

impl Eq for Schema {}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", column.name, column.dtype)?;
            if column.nullable {
                f.write_str(" Nullable")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SchemaError;
    use crate::schema::{Column, DataType, Schema};
    use crate::value::Value;

    #[test]
    fn test_build_orders_by_ordinal() {
        let schema = Schema::build(vec![
            Column::new("name", DataType::String, 1),
            Column::new("id", DataType::Int32, 0),
            Column::new("active", DataType::Bool, 2).with_nullable(true),
        ])
        .unwrap();

        let names: Vec<&str> = schema.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "active"]);

        assert_eq!(schema.stripe_offset(0), 0);
        assert_eq!(schema.stripe_offset(1), 64 * 4);
        assert_eq!(schema.stripe_offset(2), 64 * 4 + 64 * 8);
        assert_eq!(schema.sized_len(), 64 * 4 + 64 * 8 + 8 + 64);
    }

    #[test]
    fn test_build_rejects_bad_columns() {
        assert_eq!(Schema::build(vec![]), Err(SchemaError::Empty));

        assert_eq!(
            Schema::build(vec![Column::new("", DataType::Int32, 0)]),
            Err(SchemaError::EmptyName { ordinal: 0 })
        );

        assert_eq!(
            Schema::from_fields(&[("a", DataType::Int32), ("a", DataType::Bool)]),
            Err(SchemaError::DuplicateName("a".to_string()))
        );

        assert!(matches!(
            Schema::build(vec![
                Column::new("a", DataType::Int32, 0),
                Column::new("b", DataType::Int32, 2),
            ]),
            Err(SchemaError::InvalidOrdinal { ordinal: 2, expected: 1, .. })
        ));
    }

    #[test]
    fn test_resolve() {
        let schema = Schema::from_fields(&[("id", DataType::Int64), ("v", DataType::Float64)])
            .unwrap();

        let column = schema.resolve("v").unwrap();
        assert_eq!(column.ordinal, 1);
        assert_eq!(column.dtype, DataType::Float64);
        assert!(schema.resolve("missing").is_none());
    }

    #[test]
    fn test_fixed_width_of() {
        assert_eq!(Schema::fixed_width_of(DataType::Bool), Some(1));
        assert_eq!(Schema::fixed_width_of(DataType::Int32), Some(4));
        assert_eq!(Schema::fixed_width_of(DataType::Float64), Some(8));
        assert_eq!(Schema::fixed_width_of(DataType::String), None);
        assert_eq!(Schema::fixed_width_of(DataType::Bytes), None);
    }

    #[test]
    fn test_structural_equality() {
        let a = Schema::parse("id: Int32, name: String").unwrap();
        let b = Schema::from_fields(&[("id", DataType::Int32), ("name", DataType::String)])
            .unwrap();
        let c = Schema::parse("id: Int32, name: String Nullable").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_type_tags() {
        for dtype in DataType::ALL {
            assert_eq!(DataType::from_tag(dtype.tag()).unwrap(), dtype);
            assert_eq!(dtype.name().parse::<DataType>().unwrap(), dtype);
        }
        assert_eq!(DataType::from_tag(42), Err(SchemaError::UnknownType(42)));
    }

    #[test]
    fn test_parse_value() {
        let id = Column::new("id", DataType::Int32, 0);
        assert_eq!(id.parse_value(" 42 ").unwrap(), Value::Int32(42));
        assert!(id.parse_value("4x").is_err());
        assert!(id.parse_value("").is_err());

        let score = Column::new("score", DataType::Float32, 1).with_nullable(true);
        assert_eq!(score.parse_value("").unwrap(), Value::Null);
        assert_eq!(score.parse_value("1.5").unwrap(), Value::Float32(1.5));

        let flag = Column::new("flag", DataType::Bool, 2);
        assert_eq!(flag.parse_value("TRUE").unwrap(), Value::Bool(true));
        assert_eq!(flag.parse_value("0").unwrap(), Value::Bool(false));

        let blob = Column::new("blob", DataType::Bytes, 3);
        assert_eq!(blob.parse_value("00ff10").unwrap(), Value::Bytes(vec![0, 255, 16]));
        assert!(blob.parse_value("abc").is_err());
        assert!(blob.parse_value("0g").is_err());
        assert_eq!(blob.parse_value("DEad").unwrap(), Value::Bytes(vec![0xde, 0xad]));

        let name = Column::new("name", DataType::String, 4);
        assert_eq!(name.parse_value("").unwrap(), Value::String(String::new()));
    }

    #[test]
    fn test_display_parses_back() {
        let schema = Schema::parse("id: Int32, name: String Nullable, blob: Bytes").unwrap();
        let text = schema.to_string();
        assert_eq!(text, "id: Int32, name: String Nullable, blob: Bytes");
        assert_eq!(Schema::parse(&text).unwrap(), schema);
    }
}
