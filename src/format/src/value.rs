use std::fmt::{Display, Formatter};
use std::ops::Index;

use crate::schema::DataType;

/// Value is an owned, typed field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// data_type returns the column type this value belongs to, `None` for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        self.as_value_ref().data_type()
    }

    pub fn kind(&self) -> &'static str {
        self.as_value_ref().kind()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_value_ref(&self) -> ValueRef<'_> {
        match self {
            Value::Null => ValueRef::Null,
            Value::Bool(v) => ValueRef::Bool(*v),
            Value::Int32(v) => ValueRef::Int32(*v),
            Value::Int64(v) => ValueRef::Int64(*v),
            Value::Float32(v) => ValueRef::Float32(*v),
            Value::Float64(v) => ValueRef::Float64(*v),
            Value::String(v) => ValueRef::String(v.as_str()),
            Value::Bytes(v) => ValueRef::Bytes(v.as_slice()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.as_value_ref().fmt(f)
    }
}

macro_rules! impl_value_from {
    ($t:ty, $variant:ident) => {
        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v.into())
            }
        }
    };
}

impl_value_from!(bool, Bool);
impl_value_from!(i32, Int32);
impl_value_from!(i64, Int64);
impl_value_from!(f32, Float32);
impl_value_from!(f64, Float64);
impl_value_from!(String, String);
impl_value_from!(&str, String);
impl_value_from!(Vec<u8>, Bytes);
impl_value_from!(&[u8], Bytes);

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// ValueRef is a field value borrowed from encoded block bytes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ValueRef<'a> {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(&'a str),
    Bytes(&'a [u8]),
}

impl<'a> ValueRef<'a> {
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            ValueRef::Null => None,
            ValueRef::Bool(_) => Some(DataType::Bool),
            ValueRef::Int32(_) => Some(DataType::Int32),
            ValueRef::Int64(_) => Some(DataType::Int64),
            ValueRef::Float32(_) => Some(DataType::Float32),
            ValueRef::Float64(_) => Some(DataType::Float64),
            ValueRef::String(_) => Some(DataType::String),
            ValueRef::Bytes(_) => Some(DataType::Bytes),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.data_type().map(|t| t.name()).unwrap_or("Null")
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ValueRef::Null)
    }

    pub fn to_value(&self) -> Value {
        match *self {
            ValueRef::Null => Value::Null,
            ValueRef::Bool(v) => Value::Bool(v),
            ValueRef::Int32(v) => Value::Int32(v),
            ValueRef::Int64(v) => Value::Int64(v),
            ValueRef::Float32(v) => Value::Float32(v),
            ValueRef::Float64(v) => Value::Float64(v),
            ValueRef::String(v) => Value::String(v.to_string()),
            ValueRef::Bytes(v) => Value::Bytes(v.to_vec()),
        }
    }
}

/// Renders the textual form accepted by `Column::parse_value`: nulls are
/// empty and bytes are lowercase hex.
impl<'a> Display for ValueRef<'a> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueRef::Null => Ok(()),
            ValueRef::Bool(v) => write!(f, "{}", v),
            ValueRef::Int32(v) => write!(f, "{}", v),
            ValueRef::Int64(v) => write!(f, "{}", v),
            ValueRef::Float32(v) => write!(f, "{}", v),
            ValueRef::Float64(v) => write!(f, "{}", v),
            ValueRef::String(v) => f.write_str(v),
            ValueRef::Bytes(v) => f.write_str(&hex::encode(v)),
        }
    }
}

/// Record is one logical row: one value per column, in ordinal order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, j: usize) -> Option<&Value> {
        self.values.get(j)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl FromIterator<Value> for Record {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl Index<usize> for Record {
    type Output = Value;

    fn index(&self, j: usize) -> &Self::Output {
        &self.values[j]
    }
}

/// Builds a [`Record`] from expressions convertible into [`Value`].
///
/// ```
/// use kobuta_format::{record, Value};
///
/// let r = record![1_i32, "alice", Some(true)];
/// assert_eq!(r[1], Value::String("alice".to_string()));
/// ```
#[macro_export]
macro_rules! record {
    ($($v:expr),* $(,)?) => {
        $crate::value::Record::new(vec![$($crate::value::Value::from($v)),*])
    };
}

#[cfg(test)]
mod tests {
    use crate::schema::{Column, DataType};
    use crate::value::{Value, ValueRef};

    #[test]
    fn test_record_macro() {
        let none: Option<i64> = None;
        let r = record![7_i32, "x", none, vec![1_u8, 2]];
        assert_eq!(
            r.values(),
            &[
                Value::Int32(7),
                Value::String("x".to_string()),
                Value::Null,
                Value::Bytes(vec![1, 2]),
            ]
        );
        assert_eq!(r.len(), 4);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Value::Null.kind(), "Null");
        assert_eq!(Value::from(1.5_f64).data_type(), Some(DataType::Float64));
        assert_eq!(ValueRef::Bytes(b"a").kind(), "Bytes");
    }

    #[test]
    fn test_display_round_trips_through_parse_value() {
        let cases = [
            (Column::new("a", DataType::Int64, 0), Value::Int64(-12)),
            (Column::new("b", DataType::Float64, 0), Value::Float64(0.25)),
            (Column::new("c", DataType::Bool, 0), Value::Bool(true)),
            (Column::new("d", DataType::Bytes, 0), Value::Bytes(vec![0xde, 0xad])),
            (
                Column::new("e", DataType::Int32, 0).with_nullable(true),
                Value::Null,
            ),
        ];

        assert_eq!(Value::Bytes(vec![0x0f, 0xa0]).to_string(), "0fa0");
        for (column, value) in cases {
            let text = value.to_string();
            assert_eq!(column.parse_value(&text).unwrap(), value, "text {:?}", text);
        }
    }
}
