use byteorder::{ByteOrder, LittleEndian};
use tracing::trace;

use crate::block::{BlockHeader, BLOCK_HEADER_SIZE, MAX_UNSIZED_LEN, VALIDITY_SIZE};
use crate::error::BlockError;
use crate::schema::{Schema, SchemaRef};
use crate::value::{Record, Value};
use crate::{align_up, BLOCK_CAPACITY};

/// EncodedBlock is a block's bytes together with the number of records they hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedBlock {
    pub bytes: Vec<u8>,
    pub record_count: usize,
}

/// validate_record checks that `record` can be stored under `schema`.
pub fn validate_record(record: &Record, schema: &Schema) -> Result<(), BlockError> {
    if record.len() != schema.len() {
        return Err(BlockError::ArityMismatch {
            expected: schema.len(),
            got: record.len(),
        });
    }

    for (column, value) in schema.columns().iter().zip(record.values()) {
        match value.data_type() {
            None if column.nullable => {}
            None => {
                return Err(BlockError::NullViolation {
                    column: column.name.clone(),
                })
            }
            Some(dtype) if dtype == column.dtype => {}
            Some(_) => {
                return Err(BlockError::TypeMismatch {
                    column: column.name.clone(),
                    expected: column.dtype,
                    got: value.kind(),
                })
            }
        }
    }

    Ok(())
}

/// encode_block appends the block encoding of `records` to `dst` and
/// returns the number of bytes written, always a multiple of 64.
///
/// Every record is validated before `dst` is touched, so a failed encode
/// leaves `dst` unchanged.
pub fn encode_block(
    records: &[Record],
    schema: &Schema,
    dst: &mut Vec<u8>,
) -> Result<usize, BlockError> {
    if records.is_empty() {
        return Err(BlockError::EmptyBlock);
    }
    if records.len() > BLOCK_CAPACITY {
        return Err(BlockError::RecordCountExceeded {
            got: records.len(),
            max: BLOCK_CAPACITY,
        });
    }

    let mut unsized_len = 0_u64;
    for record in records {
        validate_record(record, schema)?;
        unsized_len += record
            .values()
            .iter()
            .map(|v| match v {
                Value::String(s) => s.len() as u64,
                Value::Bytes(b) => b.len() as u64,
                _ => 0,
            })
            .sum::<u64>();
    }
    if unsized_len > MAX_UNSIZED_LEN {
        return Err(BlockError::PayloadTooLarge {
            max: MAX_UNSIZED_LEN,
        });
    }
    let unsized_len = unsized_len as usize;

    let arena_base = BLOCK_HEADER_SIZE + schema.sized_len();
    let size = align_up(arena_base + unsized_len);

    let start = dst.len();
    dst.resize(start + size, 0);
    let buf = &mut dst[start..];

    BlockHeader {
        record_count: records.len(),
        unsized_len,
    }
    .write_to(buf);

    let mut arena_pos = 0_usize;
    for (j, column) in schema.columns().iter().enumerate() {
        let stripe = BLOCK_HEADER_SIZE + schema.stripe_offset(j);
        let slots = if column.nullable {
            stripe + VALIDITY_SIZE
        } else {
            stripe
        };
        let width = column.dtype.slot_width();

        let mut validity = 0_u64;
        for (i, record) in records.iter().enumerate() {
            let slot = slots + i * width;
            let value = &record[j];
            if !value.is_null() {
                validity |= 1 << i;
            }

            match value {
                Value::Null => {}
                Value::Bool(v) => buf[slot] = *v as u8,
                Value::Int32(v) => LittleEndian::write_i32(&mut buf[slot..slot + 4], *v),
                Value::Int64(v) => LittleEndian::write_i64(&mut buf[slot..slot + 8], *v),
                Value::Float32(v) => LittleEndian::write_f32(&mut buf[slot..slot + 4], *v),
                Value::Float64(v) => LittleEndian::write_f64(&mut buf[slot..slot + 8], *v),
                Value::String(_) | Value::Bytes(_) => {
                    let payload = match value {
                        Value::String(s) => s.as_bytes(),
                        Value::Bytes(b) => b.as_slice(),
                        _ => unreachable!(),
                    };

                    let at = arena_base + arena_pos;
                    buf[at..at + payload.len()].copy_from_slice(payload);

                    LittleEndian::write_u32(&mut buf[slot..slot + 4], arena_pos as u32);
                    LittleEndian::write_u32(&mut buf[slot + 4..slot + 8], payload.len() as u32);
                    arena_pos += payload.len();
                }
            }
        }

        if column.nullable {
            LittleEndian::write_u64(&mut buf[stripe..stripe + VALIDITY_SIZE], validity);
        }
    }

    trace!(
        records = records.len(),
        unsized_len,
        size,
        "encoded block"
    );

    Ok(size)
}

/// BlockBuilder collects validated records until a block is full.
#[derive(Debug)]
pub struct BlockBuilder {
    schema: SchemaRef,
    records: Vec<Record>,
}

impl BlockBuilder {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            records: Vec::with_capacity(BLOCK_CAPACITY),
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// push validates `record` and buffers it. A rejected record leaves the
    /// builder unchanged.
    pub fn push(&mut self, record: Record) -> Result<(), BlockError> {
        if self.is_full() {
            return Err(BlockError::RecordCountExceeded {
                got: self.records.len() + 1,
                max: BLOCK_CAPACITY,
            });
        }

        validate_record(&record, &self.schema)?;
        self.records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= BLOCK_CAPACITY
    }

    /// encode_into appends the buffered records to `dst` as one block and
    /// clears the builder. Returns the number of records encoded.
    pub fn encode_into(&mut self, dst: &mut Vec<u8>) -> Result<usize, BlockError> {
        let n = self.encode_to(dst)?;
        self.clear();
        Ok(n)
    }

    /// encode_to appends the block to `dst` and keeps the records pending.
    pub fn encode_to(&self, dst: &mut Vec<u8>) -> Result<usize, BlockError> {
        encode_block(&self.records, &self.schema, dst)
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn finish(&mut self) -> Result<EncodedBlock, BlockError> {
        let mut bytes = Vec::new();
        let record_count = self.encode_into(&mut bytes)?;
        Ok(EncodedBlock {
            bytes,
            record_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use byteorder::{ByteOrder, LittleEndian};

    use crate::block::encoder::{encode_block, BlockBuilder};
    use crate::block::BLOCK_HEADER_SIZE;
    use crate::error::BlockError;
    use crate::schema::{DataType, Schema};
    use crate::value::{Record, Value};

    fn people() -> Schema {
        Schema::parse("id: Int32, name: String, active: Bool").unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let schema = people();
        let records = vec![record![1_i32, "ab", true], record![2_i32, "cde", false]];

        let mut buf = vec![];
        let n = encode_block(&records, &schema, &mut buf).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(n % 64, 0);

        // header
        assert_eq!(LittleEndian::read_u16(&buf[0..2]), 2);
        assert_eq!(LittleEndian::read_u32(&buf[4..8]), 5);

        // id stripe
        let ids = BLOCK_HEADER_SIZE;
        assert_eq!(LittleEndian::read_i32(&buf[ids..]), 1);
        assert_eq!(LittleEndian::read_i32(&buf[ids + 4..]), 2);
        assert!(buf[ids + 8..ids + 64 * 4].iter().all(|b| *b == 0));

        // name stripe: (offset, length) pairs into the arena
        let names = BLOCK_HEADER_SIZE + schema.stripe_offset(1);
        assert_eq!(LittleEndian::read_u32(&buf[names..]), 0);
        assert_eq!(LittleEndian::read_u32(&buf[names + 4..]), 2);
        assert_eq!(LittleEndian::read_u32(&buf[names + 8..]), 2);
        assert_eq!(LittleEndian::read_u32(&buf[names + 12..]), 3);

        // active stripe
        let active = BLOCK_HEADER_SIZE + schema.stripe_offset(2);
        assert_eq!(&buf[active..active + 3], &[1, 0, 0]);

        let arena = BLOCK_HEADER_SIZE + schema.sized_len();
        assert_eq!(&buf[arena..arena + 5], b"abcde");
        assert!(buf[arena + 5..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encode_appends_after_existing_bytes() {
        let schema = Schema::from_fields(&[("v", DataType::Int64)]).unwrap();
        let mut buf = vec![0xAA; 64];
        let n = encode_block(&[record![5_i64]], &schema, &mut buf).unwrap();
        assert_eq!(buf.len(), 64 + n);
        assert_eq!(LittleEndian::read_i64(&buf[64 + BLOCK_HEADER_SIZE..]), 5);
    }

    #[test]
    fn test_encode_rejects_bad_input_without_writing() {
        let schema = people();
        let mut buf = vec![];

        let too_many: Vec<Record> = (0..65_i32).map(|i| record![i, "x", true]).collect();
        assert_eq!(
            encode_block(&too_many, &schema, &mut buf),
            Err(BlockError::RecordCountExceeded { got: 65, max: 64 })
        );

        let mismatched = vec![record![1_i32, "a", true], record![2_i64, "b", true]];
        assert_eq!(
            encode_block(&mismatched, &schema, &mut buf),
            Err(BlockError::TypeMismatch {
                column: "id".to_string(),
                expected: DataType::Int32,
                got: "Int64",
            })
        );

        let null: Option<bool> = None;
        assert_eq!(
            encode_block(&[record![1_i32, "a", null]], &schema, &mut buf),
            Err(BlockError::NullViolation {
                column: "active".to_string()
            })
        );

        assert_eq!(
            encode_block(&[record![1_i32]], &schema, &mut buf),
            Err(BlockError::ArityMismatch {
                expected: 3,
                got: 1
            })
        );

        assert_eq!(encode_block(&[], &schema, &mut buf), Err(BlockError::EmptyBlock));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_builder_validates_on_push() {
        let schema = people().into_ref();
        let mut builder = BlockBuilder::new(schema);

        assert!(builder.push(record![1_i32, 2_i32, true]).is_err());
        assert!(builder.is_empty());

        for i in 0..64_i32 {
            builder.push(record![i, "n", i % 2 == 0]).unwrap();
        }
        assert!(builder.is_full());
        assert!(matches!(
            builder.push(record![64_i32, "n", true]),
            Err(BlockError::RecordCountExceeded { .. })
        ));

        let block = builder.finish().unwrap();
        assert_eq!(block.record_count, 64);
        assert_eq!(block.bytes.len() % 64, 0);
        assert!(builder.is_empty());
    }

    #[test]
    fn test_nullable_validity_word() {
        let schema = Schema::parse("score: Float64 Nullable").unwrap();
        let records = vec![
            record![Some(1.0_f64)],
            record![Value::Null],
            record![Some(3.0_f64)],
        ];

        let mut buf = vec![];
        encode_block(&records, &schema, &mut buf).unwrap();
        assert_eq!(LittleEndian::read_u64(&buf[BLOCK_HEADER_SIZE..]), 0b101);
    }
}
