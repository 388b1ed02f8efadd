//! Column manifest embedded in the local-use sections.
//!
//! Carries what the native descriptors cannot: the original column name,
//! its canonical kind and unit, and the packing parameters. Layout per entry
//! (big-endian):
//!
//! ```text
//! u16 name_len | name (UTF-8) | u8 kind | u8 unit_len | unit | i16 scale | i64 reference | u8 width
//! ```

use crate::codec::bits::{ByteReader, ByteWriter};
use crate::error_handling::CodecError;
use crate::table::ColumnType;

/// Packing and identity of one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub column_type: ColumnType,
    pub unit: String,
    pub scale: i16,
    pub reference: i64,
    pub width: u8,
}

fn kind_code(column_type: ColumnType) -> u8 {
    match column_type {
        ColumnType::Boolean => 1,
        ColumnType::Integer => 2,
        ColumnType::Float => 3,
        ColumnType::Timestamp => 4,
        ColumnType::Decimal => 5,
        ColumnType::Text => 6,
    }
}

fn kind_from_code(format: &'static str, code: u8) -> Result<ColumnType, CodecError> {
    match code {
        1 => Ok(ColumnType::Boolean),
        2 => Ok(ColumnType::Integer),
        3 => Ok(ColumnType::Float),
        4 => Ok(ColumnType::Timestamp),
        other => Err(CodecError::malformed(
            format,
            format!("unknown or unpackable column kind code {}", other),
        )),
    }
}

impl ManifestEntry {
    pub fn write(&self, format: &'static str, out: &mut ByteWriter) -> Result<(), CodecError> {
        let name = self.name.as_bytes();
        let name_len = u16::try_from(name.len())
            .map_err(|_| CodecError::limit(format, format!("column name '{}' too long", self.name)))?;
        let unit = self.unit.as_bytes();
        let unit_len = u8::try_from(unit.len())
            .map_err(|_| CodecError::limit(format, format!("unit of '{}' too long", self.name)))?;
        out.u16(name_len)
            .bytes(name)
            .u8(kind_code(self.column_type))
            .u8(unit_len)
            .bytes(unit)
            .u16(self.scale as u16)
            .i64(self.reference)
            .u8(self.width);
        Ok(())
    }

    pub fn read(format: &'static str, input: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let name_len = input.u16("manifest name length")?;
        let name = String::from_utf8(input.take(usize::from(name_len), "manifest name")?.to_vec())
            .map_err(|_| CodecError::malformed(format, "column name is not UTF-8"))?;
        let column_type = kind_from_code(format, input.u8("manifest kind")?)?;
        let unit_len = input.u8("manifest unit length")?;
        let unit = String::from_utf8(input.take(usize::from(unit_len), "manifest unit")?.to_vec())
            .map_err(|_| CodecError::malformed(format, "unit is not UTF-8"))?;
        let scale = input.u16("manifest scale")? as i16;
        let reference = input.i64("manifest reference")?;
        let width = input.u8("manifest width")?;
        Ok(Self {
            name,
            column_type,
            unit,
            scale,
            reference,
            width,
        })
    }
}

/// Writes a count-prefixed list of entries.
pub fn write_manifest(
    format: &'static str,
    entries: &[ManifestEntry],
    out: &mut ByteWriter,
) -> Result<(), CodecError> {
    let count = u16::try_from(entries.len())
        .map_err(|_| CodecError::limit(format, format!("{} columns (limit 65535)", entries.len())))?;
    out.u16(count);
    for entry in entries {
        entry.write(format, out)?;
    }
    Ok(())
}

/// Reads a count-prefixed list of entries.
pub fn read_manifest(
    format: &'static str,
    input: &mut ByteReader<'_>,
) -> Result<Vec<ManifestEntry>, CodecError> {
    let count = input.u16("manifest column count")?;
    (0..count)
        .map(|_| ManifestEntry::read(format, input))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_preserves_every_field() {
        let entries = vec![
            ManifestEntry {
                name: "temperature".to_string(),
                column_type: ColumnType::Float,
                unit: "K".to_string(),
                scale: -2,
                reference: -40,
                width: 17,
            },
            ManifestEntry {
                name: "ts".to_string(),
                column_type: ColumnType::Timestamp,
                unit: String::new(),
                scale: 0,
                reference: 1_700_000_000_000,
                width: 30,
            },
        ];
        let mut out = ByteWriter::new();
        write_manifest("BUFR", &entries, &mut out).unwrap();
        let bytes = out.into_bytes();
        let mut input = ByteReader::new("BUFR", &bytes);
        assert_eq!(read_manifest("BUFR", &mut input).unwrap(), entries);
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn test_text_kind_is_rejected_on_read() {
        let bytes = [0, 1, b'x', 6, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        let mut input = ByteReader::new("BUFR", &bytes);
        assert!(matches!(
            ManifestEntry::read("BUFR", &mut input),
            Err(CodecError::Malformed { .. })
        ));
    }
}
