use byteorder::{ByteOrder, LittleEndian};
use bytes::BufMut;

use crate::error::FileError;
use crate::file::{
    CHECKSUM_SIZE, COLUMN_ENTRY_FIXED_SIZE, METADATA_FIXED_SIZE, METADATA_PREFIX_SIZE,
    MIN_METADATA_SIZE,
};
use crate::integrity::{self, Section, MAGIC, VERSION};
use crate::schema::{Column, DataType, Schema, SchemaRef};

const FLAG_NULLABLE: u8 = 1;

/// Metadata is the first section of a file: identification, counts and
/// the schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub schema: SchemaRef,
    /// Id of the codec compressed chunks use, 0 when uncompressed.
    pub compression_id: u8,
    pub record_count: u64,
    pub chunk_count: u32,
}

impl Metadata {
    /// encoded_len is the size of the metadata section for `schema`.
    pub fn encoded_len(schema: &Schema) -> usize {
        METADATA_FIXED_SIZE
            + schema
                .columns()
                .iter()
                .map(|c| COLUMN_ENTRY_FIXED_SIZE + c.name.len())
                .sum::<usize>()
            + CHECKSUM_SIZE
    }

    pub fn marshal_binary(&self) -> Vec<u8> {
        let len = Self::encoded_len(&self.schema);

        let mut b = Vec::with_capacity(len);
        b.put_slice(&MAGIC);
        b.put_u8(VERSION);
        b.put_u8(self.compression_id);
        b.put_u16_le(0);
        b.put_u32_le(len as u32);
        b.put_u64_le(self.record_count);
        b.put_u32_le(self.chunk_count);
        b.put_u16_le(self.schema.len() as u16);

        for column in self.schema.columns() {
            b.put_u16_le(column.ordinal as u16);
            b.put_u8(column.dtype.tag());
            b.put_u8(if column.nullable { FLAG_NULLABLE } else { 0 });
            b.put_u16_le(column.name.len() as u16);
            b.put_slice(column.name.as_bytes());
        }

        let crc = integrity::checksum(&b);
        b.put_u32_le(crc);
        debug_assert_eq!(b.len(), len);
        b
    }

    /// peek_len validates the fixed prefix and returns the length of the
    /// whole metadata section. `source_len` bounds the length when known.
    ///
    /// Past magic and version, any inconsistency is reported as a metadata
    /// checksum failure: the checksum is the only authority over those bytes.
    pub fn peek_len(prefix: &[u8], source_len: Option<u64>) -> Result<usize, FileError> {
        integrity::check_magic(prefix)?;
        if prefix.len() < METADATA_PREFIX_SIZE {
            if let Some(version) = prefix.get(4) {
                integrity::check_version(*version)?;
            }
            return Err(FileError::Truncated {
                section: Section::Metadata,
                need: METADATA_PREFIX_SIZE as u64,
                got: prefix.len() as u64,
            });
        }
        integrity::check_version(prefix[4])?;

        let len = LittleEndian::read_u32(&prefix[8..12]) as usize;
        let out_of_source = source_len.map_or(false, |l| len as u64 > l);
        if len < MIN_METADATA_SIZE || out_of_source {
            return Err(FileError::ChecksumMismatch {
                section: Section::Metadata,
            });
        }
        Ok(len)
    }

    /// unmarshal_binary decodes a complete metadata section, checksum
    /// included.
    pub fn unmarshal_binary(b: &[u8]) -> Result<Self, FileError> {
        let len = Self::peek_len(b, Some(b.len() as u64))?;
        let b = &b[..len];

        let (body, crc) = b.split_at(len - CHECKSUM_SIZE);
        integrity::verify_checksum(Section::Metadata, body, LittleEndian::read_u32(crc))?;

        let compression_id = body[5];
        let record_count = LittleEndian::read_u64(&body[12..20]);
        let chunk_count = LittleEndian::read_u32(&body[20..24]);
        let column_count = LittleEndian::read_u16(&body[24..26]) as usize;

        let mut columns = Vec::with_capacity(column_count);
        let mut at = METADATA_FIXED_SIZE;
        for _ in 0..column_count {
            let fixed = body
                .get(at..at + COLUMN_ENTRY_FIXED_SIZE)
                .ok_or_else(|| corrupt("column entry past end of metadata"))?;
            let ordinal = LittleEndian::read_u16(&fixed[0..2]) as usize;
            let dtype = DataType::from_tag(fixed[2])
                .map_err(|e| FileError::CorruptMetadata(e.to_string()))?;
            let nullable = fixed[3] & FLAG_NULLABLE != 0;
            let name_len = LittleEndian::read_u16(&fixed[4..6]) as usize;
            at += COLUMN_ENTRY_FIXED_SIZE;

            let name = body
                .get(at..at + name_len)
                .ok_or_else(|| corrupt("column name past end of metadata"))?;
            let name =
                std::str::from_utf8(name).map_err(|_| corrupt("column name is not UTF-8"))?;
            at += name_len;

            columns.push(Column::new(name, dtype, ordinal).with_nullable(nullable));
        }
        if at != body.len() {
            return Err(corrupt("trailing bytes after column entries"));
        }

        let schema =
            Schema::build(columns).map_err(|e| FileError::CorruptMetadata(e.to_string()))?;

        Ok(Self {
            schema: schema.into_ref(),
            compression_id,
            record_count,
            chunk_count,
        })
    }
}

fn corrupt(msg: &str) -> FileError {
    FileError::CorruptMetadata(msg.to_string())
}

#[cfg(test)]
mod tests {
    use crate::error::FileError;
    use crate::file::metadata::Metadata;
    use crate::integrity::Section;
    use crate::schema::Schema;

    fn metadata() -> Metadata {
        Metadata {
            schema: Schema::parse("id: Int32, name: String Nullable, active: Bool")
                .unwrap()
                .into_ref(),
            compression_id: 1,
            record_count: 130,
            chunk_count: 2,
        }
    }

    #[test]
    fn test_layout() {
        let m = metadata();
        let b = m.marshal_binary();
        assert_eq!(b.len(), Metadata::encoded_len(&m.schema));
        assert_eq!(&b[..4], b"KBTF");
        assert_eq!(b[4], 1);
        assert_eq!(b[5], 1);
        assert_eq!(Metadata::peek_len(&b[..12], None).unwrap(), b.len());
        assert_eq!(Metadata::unmarshal_binary(&b).unwrap(), m);
    }

    #[test]
    fn test_every_flipped_byte_is_detected() {
        let b = metadata().marshal_binary();

        for i in 0..b.len() {
            let mut corrupt = b.clone();
            corrupt[i] ^= 0x20;

            let err = Metadata::unmarshal_binary(&corrupt).unwrap_err();
            match i {
                0..=3 => assert!(matches!(err, FileError::InvalidMagic(_)), "byte {}", i),
                4 => assert!(matches!(err, FileError::VersionUnsupported { .. })),
                _ => assert!(
                    matches!(
                        err,
                        FileError::ChecksumMismatch {
                            section: Section::Metadata
                        }
                    ),
                    "byte {}: {:?}",
                    i,
                    err
                ),
            }
        }
    }

    #[test]
    fn test_truncated_prefix() {
        let b = metadata().marshal_binary();
        assert!(matches!(
            Metadata::peek_len(&b[..8], None),
            Err(FileError::Truncated { need: 12, got: 8, .. })
        ));
        assert!(matches!(
            Metadata::peek_len(b"KB", None),
            Err(FileError::InvalidMagic(_))
        ));
    }
}
