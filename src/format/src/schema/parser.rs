//! Parser for textual schema declarations:
//!
//! ```text
//! schema  := column ("," column)*
//! column  := name ":" type ["Nullable"]
//! type    := "Bool" | "Int32" | "Int64" | "Float32" | "Float64" | "String" | "Bytes"
//! ```

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, multispace0, multispace1};
use nom::combinator::{all_consuming, map, opt};
use nom::multi::separated_list1;
use nom::sequence::{delimited, preceded};
use nom::IResult;

use crate::error::SchemaError;
use crate::schema::{Column, DataType};

const NULLABLE: &str = "Nullable";

fn identifier(i: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')(i)
}

fn data_type(i: &str) -> IResult<&str, DataType> {
    alt((
        map(tag("Bool"), |_| DataType::Bool),
        map(tag("Int32"), |_| DataType::Int32),
        map(tag("Int64"), |_| DataType::Int64),
        map(tag("Float32"), |_| DataType::Float32),
        map(tag("Float64"), |_| DataType::Float64),
        map(tag("String"), |_| DataType::String),
        map(tag("Bytes"), |_| DataType::Bytes),
    ))(i)
}

fn column(i: &str) -> IResult<&str, (&str, DataType, bool)> {
    let (i, name) = identifier(i)?;
    let (i, _) = delimited(multispace0, char(':'), multispace0)(i)?;
    let (i, dtype) = data_type(i)?;
    let (i, nullable) = opt(preceded(multispace1, tag(NULLABLE)))(i)?;
    Ok((i, (name, dtype, nullable.is_some())))
}

fn columns(i: &str) -> IResult<&str, Vec<(&str, DataType, bool)>> {
    separated_list1(delimited(multispace0, char(','), multispace0), column)(i)
}

/// parse_columns parses a declaration into columns with ordinals assigned in
/// declaration order. The result still has to go through `Schema::build`.
pub fn parse_columns(decl: &str) -> Result<Vec<Column>, SchemaError> {
    let (_, parsed) = all_consuming(delimited(multispace0, columns, multispace0))(decl)
        .map_err(|e| SchemaError::Parse(e.to_string()))?;

    Ok(parsed
        .into_iter()
        .enumerate()
        .map(|(ordinal, (name, dtype, nullable))| {
            Column::new(name, dtype, ordinal).with_nullable(nullable)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use crate::error::SchemaError;
    use crate::schema::parser::parse_columns;
    use crate::schema::{Column, DataType, Schema};

    #[test]
    fn test_parse_happy_path() {
        let cases: &[(&str, &[Column])] = &[
            (
                "a: Float32 Nullable, b: Int32, c: Float32",
                &[
                    Column {
                        name: "a".to_string(),
                        dtype: DataType::Float32,
                        ordinal: 0,
                        nullable: true,
                    },
                    Column {
                        name: "b".to_string(),
                        dtype: DataType::Int32,
                        ordinal: 1,
                        nullable: false,
                    },
                    Column {
                        name: "c".to_string(),
                        dtype: DataType::Float32,
                        ordinal: 2,
                        nullable: false,
                    },
                ],
            ),
            (
                "  value:Float64   ",
                &[Column {
                    name: "value".to_string(),
                    dtype: DataType::Float64,
                    ordinal: 0,
                    nullable: false,
                }],
            ),
            (
                "payload : Bytes   Nullable",
                &[Column {
                    name: "payload".to_string(),
                    dtype: DataType::Bytes,
                    ordinal: 0,
                    nullable: true,
                }],
            ),
        ];

        for (decl, expected) in cases {
            let parsed = parse_columns(decl).unwrap();
            assert_eq!(*expected, parsed.as_slice(), "declaration {:?}", decl);
        }
    }

    #[test]
    fn test_parse_error_path() {
        let cases = [
            "a: Float32 Nullable, b: Int32,, c: Float32",
            "a: Float33",
            "a: Float32 nullable",
            "a: Float32 Int32",
            "a: Float32,",
            "Float32",
            ": Int32",
            "",
        ];

        for decl in cases {
            assert!(
                matches!(parse_columns(decl), Err(SchemaError::Parse(_))),
                "declaration {:?} should not parse",
                decl
            );
        }
    }

    #[test]
    fn test_parse_then_build_rejects_duplicates() {
        assert_eq!(
            Schema::parse("id: Int32, id: Int64"),
            Err(SchemaError::DuplicateName("id".to_string()))
        );
    }
}
