use std::str;

use byteorder::{ByteOrder, LittleEndian};

use crate::align_up;
use crate::block::{BlockHeader, BLOCK_HEADER_SIZE, VALIDITY_SIZE};
use crate::error::BlockError;
use crate::schema::{DataType, Schema};
use crate::value::{Record, ValueRef};

/// BlockView is a validated, zero copy view over one encoded block.
///
/// `decode` checks every (offset, length) slot against the unsized section
/// and every String payload for UTF-8, so field access afterwards cannot
/// fail on well-formed indices.
#[derive(Clone, Copy, Debug)]
pub struct BlockView<'a> {
    bytes: &'a [u8],
    schema: &'a Schema,
    header: BlockHeader,
}

impl<'a> BlockView<'a> {
    pub fn decode(bytes: &'a [u8], schema: &'a Schema) -> Result<Self, BlockError> {
        let header = BlockHeader::unmarshal_binary(bytes)?;

        let need = BLOCK_HEADER_SIZE + schema.sized_len() + header.unsized_len;
        if bytes.len() < need {
            return Err(BlockError::Truncated {
                need,
                got: bytes.len(),
            });
        }

        let view = Self {
            bytes,
            schema,
            header,
        };
        view.validate_slots()?;
        Ok(view)
    }

    fn validate_slots(&self) -> Result<(), BlockError> {
        let arena = self.arena();
        for (j, column) in self.schema.columns().iter().enumerate() {
            if !column.dtype.is_variable() {
                continue;
            }

            for i in 0..self.header.record_count {
                if !self.is_valid(i, j) {
                    continue;
                }

                let (offset, length) = self.var_slot(i, j);
                let payload = offset
                    .checked_add(length)
                    .filter(|end| *end as usize <= arena.len())
                    .map(|end| &arena[offset as usize..end as usize])
                    .ok_or_else(|| BlockError::OffsetOutOfRange {
                        column: column.name.clone(),
                        slot: i,
                        offset,
                        length,
                        size: arena.len(),
                    })?;

                if column.dtype == DataType::String && str::from_utf8(payload).is_err() {
                    return Err(BlockError::InvalidUtf8 {
                        column: column.name.clone(),
                        slot: i,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn record_count(&self) -> usize {
        self.header.record_count
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// byte_len is the padded size of the block, the distance to the next
    /// block in a chunk.
    pub fn byte_len(&self) -> usize {
        align_up(self.unsized_base() + self.header.unsized_len)
    }

    fn unsized_base(&self) -> usize {
        BLOCK_HEADER_SIZE + self.schema.sized_len()
    }

    fn arena(&self) -> &'a [u8] {
        let base = self.unsized_base();
        &self.bytes[base..base + self.header.unsized_len]
    }

    fn stripe(&self, j: usize) -> usize {
        BLOCK_HEADER_SIZE + self.schema.stripe_offset(j)
    }

    fn slot(&self, i: usize, j: usize) -> usize {
        let column = &self.schema.columns()[j];
        let mut at = self.stripe(j) + i * column.dtype.slot_width();
        if column.nullable {
            at += VALIDITY_SIZE;
        }
        at
    }

    fn var_slot(&self, i: usize, j: usize) -> (u32, u32) {
        let at = self.slot(i, j);
        (
            LittleEndian::read_u32(&self.bytes[at..at + 4]),
            LittleEndian::read_u32(&self.bytes[at + 4..at + 8]),
        )
    }

    /// is_valid reports whether slot `i` of column `j` holds a value.
    /// Non-nullable columns are always valid.
    pub fn is_valid(&self, i: usize, j: usize) -> bool {
        if !self.schema.columns()[j].nullable {
            return true;
        }
        let at = self.stripe(j);
        let validity = LittleEndian::read_u64(&self.bytes[at..at + VALIDITY_SIZE]);
        validity & (1 << i) != 0
    }

    fn check_index(&self, i: usize, j: usize) -> Result<(), BlockError> {
        if i >= self.header.record_count {
            return Err(BlockError::RecordOutOfRange {
                index: i,
                count: self.header.record_count,
            });
        }
        if j >= self.schema.len() {
            return Err(BlockError::ColumnOutOfRange {
                index: j,
                count: self.schema.len(),
            });
        }
        Ok(())
    }

    /// payload returns the raw arena bytes of a variable width field, or
    /// `None` for fixed width columns and null slots.
    pub fn payload(&self, i: usize, j: usize) -> Result<Option<&'a [u8]>, BlockError> {
        self.check_index(i, j)?;
        if !self.schema.columns()[j].dtype.is_variable() || !self.is_valid(i, j) {
            return Ok(None);
        }

        let (offset, length) = self.var_slot(i, j);
        let (offset, length) = (offset as usize, length as usize);
        Ok(Some(&self.arena()[offset..offset + length]))
    }

    /// field returns the value of column `j` in record `i`.
    pub fn field(&self, i: usize, j: usize) -> Result<ValueRef<'a>, BlockError> {
        self.check_index(i, j)?;
        if !self.is_valid(i, j) {
            return Ok(ValueRef::Null);
        }

        let b = self.bytes;
        let at = self.slot(i, j);
        let value = match self.schema.columns()[j].dtype {
            DataType::Bool => ValueRef::Bool(b[at] != 0),
            DataType::Int32 => ValueRef::Int32(LittleEndian::read_i32(&b[at..at + 4])),
            DataType::Int64 => ValueRef::Int64(LittleEndian::read_i64(&b[at..at + 8])),
            DataType::Float32 => ValueRef::Float32(LittleEndian::read_f32(&b[at..at + 4])),
            DataType::Float64 => ValueRef::Float64(LittleEndian::read_f64(&b[at..at + 8])),
            DataType::String => {
                let payload = self.payload(i, j)?.unwrap_or_default();
                let column = &self.schema.columns()[j];
                let s = str::from_utf8(payload).map_err(|_| BlockError::InvalidUtf8 {
                    column: column.name.clone(),
                    slot: i,
                })?;
                ValueRef::String(s)
            }
            DataType::Bytes => ValueRef::Bytes(self.payload(i, j)?.unwrap_or_default()),
        };

        Ok(value)
    }

    /// record materializes record `i` as owned values.
    pub fn record(&self, i: usize) -> Result<Record, BlockError> {
        (0..self.schema.len())
            .map(|j| self.field(i, j).map(|v| v.to_value()))
            .collect::<Result<Vec<_>, _>>()
            .map(Record::new)
    }

    pub fn records(&self) -> BlockRecords<'a> {
        BlockRecords {
            view: *self,
            next: 0,
        }
    }
}

/// BlockRecords iterates the records of a block in slot order.
pub struct BlockRecords<'a> {
    view: BlockView<'a>,
    next: usize,
}

impl<'a> Iterator for BlockRecords<'a> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.view.record_count() {
            return None;
        }

        // slots were validated by decode
        let record = self.view.record(self.next).ok()?;
        self.next += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.view.record_count() - self.next;
        (n, Some(n))
    }
}

impl<'a> ExactSizeIterator for BlockRecords<'a> {}

#[cfg(test)]
mod tests {
    use byteorder::{ByteOrder, LittleEndian};
    use quickcheck::{quickcheck, Arbitrary, Gen};

    use crate::block::decoder::BlockView;
    use crate::block::encoder::encode_block;
    use crate::block::{BLOCK_HEADER_SIZE, VALIDITY_SIZE};
    use crate::error::BlockError;
    use crate::schema::{DataType, Schema};
    use crate::value::{Record, Value, ValueRef};

    fn people() -> Schema {
        Schema::parse("id: Int32, name: String, active: Bool").unwrap()
    }

    fn people_records(n: i32) -> Vec<Record> {
        (0..n)
            .map(|i| record![i, format!("name-{}", i), i % 3 == 0])
            .collect()
    }

    #[test]
    fn test_decode_fields() {
        let schema = people();
        let records = people_records(10);
        let mut buf = vec![];
        encode_block(&records, &schema, &mut buf).unwrap();

        let view = BlockView::decode(&buf, &schema).unwrap();
        assert_eq!(view.record_count(), 10);
        assert_eq!(view.byte_len(), buf.len());
        assert_eq!(view.field(3, 0).unwrap(), ValueRef::Int32(3));
        assert_eq!(view.field(3, 1).unwrap(), ValueRef::String("name-3"));
        assert_eq!(view.field(3, 2).unwrap(), ValueRef::Bool(true));
        assert_eq!(view.field(4, 2).unwrap(), ValueRef::Bool(false));

        let decoded: Vec<Record> = view.records().collect();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_field_out_of_range() {
        let schema = people();
        let mut buf = vec![];
        encode_block(&people_records(2), &schema, &mut buf).unwrap();
        let view = BlockView::decode(&buf, &schema).unwrap();

        assert_eq!(
            view.field(2, 0),
            Err(BlockError::RecordOutOfRange { index: 2, count: 2 })
        );
        assert_eq!(
            view.field(0, 3),
            Err(BlockError::ColumnOutOfRange { index: 3, count: 3 })
        );
    }

    #[test]
    fn test_decode_nullable_columns() {
        let schema = Schema::parse("id: Int64, note: String Nullable, score: Float32 Nullable")
            .unwrap();
        let none_str: Option<&str> = None;
        let none_f32: Option<f32> = None;
        let records = vec![
            record![1_i64, Some("a"), none_f32],
            record![2_i64, none_str, Some(0.5_f32)],
            record![3_i64, Some(""), Some(1.5_f32)],
        ];

        let mut buf = vec![];
        encode_block(&records, &schema, &mut buf).unwrap();
        let view = BlockView::decode(&buf, &schema).unwrap();

        assert!(view.is_valid(0, 1));
        assert!(!view.is_valid(1, 1));
        assert_eq!(view.field(1, 1).unwrap(), ValueRef::Null);
        assert_eq!(view.payload(1, 1).unwrap(), None);
        assert_eq!(view.field(2, 1).unwrap(), ValueRef::String(""));
        assert_eq!(view.records().collect::<Vec<_>>(), records);
    }

    #[test]
    fn test_decode_rejects_corrupt_slots() {
        let schema = people();
        let mut buf = vec![];
        encode_block(&people_records(4), &schema, &mut buf).unwrap();

        let names = BLOCK_HEADER_SIZE + schema.stripe_offset(1);

        // length of slot 2 points far past the arena
        let mut corrupt = buf.clone();
        LittleEndian::write_u32(&mut corrupt[names + 2 * 8 + 4..], 1 << 20);
        assert!(matches!(
            BlockView::decode(&corrupt, &schema),
            Err(BlockError::OffsetOutOfRange { slot: 2, .. })
        ));

        // offset + length overflows u32
        let mut corrupt = buf.clone();
        LittleEndian::write_u32(&mut corrupt[names..], u32::MAX);
        assert!(matches!(
            BlockView::decode(&corrupt, &schema),
            Err(BlockError::OffsetOutOfRange { slot: 0, .. })
        ));

        // invalid UTF-8 in a String payload
        let mut corrupt = buf.clone();
        let arena = BLOCK_HEADER_SIZE + schema.sized_len();
        corrupt[arena] = 0xFF;
        assert!(matches!(
            BlockView::decode(&corrupt, &schema),
            Err(BlockError::InvalidUtf8 { slot: 0, .. })
        ));

        assert!(matches!(
            BlockView::decode(&buf[..arena], &schema),
            Err(BlockError::Truncated { .. })
        ));
    }

    #[test]
    fn test_altered_payload_is_not_detected_at_block_level() {
        let schema = Schema::from_fields(&[("n", DataType::Int32), ("s", DataType::String)])
            .unwrap();
        let records: Vec<Record> = (0..64_i32)
            .map(|i| record![i * 7, format!("value-{:02}", i)])
            .collect();

        let mut buf = vec![];
        encode_block(&records, &schema, &mut buf).unwrap();

        // each payload is 8 bytes: alter the last byte of record 10's string
        let arena = BLOCK_HEADER_SIZE + schema.sized_len();
        let at = arena + 10 * 8 + 7;
        assert_eq!(buf[at], b'0');
        buf[at] = b'X';

        let view = BlockView::decode(&buf, &schema).unwrap();
        assert_eq!(view.field(10, 1).unwrap(), ValueRef::String("value-1X"));
        assert_eq!(view.payload(10, 1).unwrap(), Some(&b"value-1X"[..]));
        for i in 0..64 {
            assert_eq!(view.field(i, 0).unwrap(), ValueRef::Int32(i as i32 * 7));
            if i != 10 {
                assert_eq!(view.record(i).unwrap(), records[i]);
            }
        }
    }

    #[test]
    fn test_validity_word_is_first_in_stripe() {
        let schema = Schema::parse("v: Int32 Nullable").unwrap();
        let records = vec![record![Value::Null], record![Some(9_i32)]];
        let mut buf = vec![];
        encode_block(&records, &schema, &mut buf).unwrap();

        assert_eq!(LittleEndian::read_u64(&buf[BLOCK_HEADER_SIZE..]), 0b10);
        let slot1 = BLOCK_HEADER_SIZE + VALIDITY_SIZE + 4;
        assert_eq!(LittleEndian::read_i32(&buf[slot1..]), 9);
    }

    #[derive(Clone, Debug)]
    struct Rows(Vec<(i64, Option<String>, Vec<u8>, f64, bool)>);

    impl Arbitrary for Rows {
        fn arbitrary(g: &mut Gen) -> Self {
            let n = usize::arbitrary(g) % 64 + 1;
            Rows(
                (0..n)
                    .map(|_| {
                        (
                            i64::arbitrary(g),
                            Option::<String>::arbitrary(g),
                            Vec::<u8>::arbitrary(g),
                            // NaN breaks equality of decoded records
                            f64::arbitrary(g).max(f64::MIN),
                            bool::arbitrary(g),
                        )
                    })
                    .collect(),
            )
        }
    }

    quickcheck! {
        fn prop_block_round_trip(rows: Rows) -> bool {
            let schema = Schema::parse(
                "a: Int64, b: String Nullable, c: Bytes, d: Float64, e: Bool",
            )
            .unwrap();
            let records: Vec<Record> = rows
                .0
                .into_iter()
                .map(|(a, b, c, d, e)| record![a, b, c, d, e])
                .collect();

            let mut buf = vec![];
            let n = encode_block(&records, &schema, &mut buf).unwrap();
            let view = BlockView::decode(&buf, &schema).unwrap();

            n % 64 == 0 && view.records().collect::<Vec<_>>() == records
        }
    }
}
