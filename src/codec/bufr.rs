//! BUFR edition 4 codec.
//!
//! Message layout:
//! - Section 0: `BUFR`, total length (u24), edition 4
//! - Section 1: identification, typical time = first timestamp of the message
//! - Section 2: column manifest (local use)
//! - Section 3: subset count, observed/uncompressed flags, one element
//!   descriptor per column
//! - Section 4: one subset per row, each column packed at its manifest
//!   width; missing values are all ones
//! - Section 5: `7777`
//!
//! A table is split over as many messages as needed to keep each below
//! 65535 subsets and the 24-bit length limit.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use log::debug;

use crate::codec::bits::{all_ones, BitReader, BitWriter, ByteReader, ByteWriter};
use crate::codec::descriptors::{bufr_descriptors, unit_for, Fxy};
use crate::codec::manifest::{read_manifest, write_manifest, ManifestEntry};
use crate::codec::packing::{scale_column, unscale};
use crate::codec::{first_timestamp, CodecOptions, ScientificFormat};
use crate::error_handling::CodecError;
use crate::table::{CanonicalTable, Column, Value};

const FORMAT: &str = "BUFR";
const EDITION: u8 = 4;
const MAX_MESSAGE_LEN: usize = 0xFF_FFFF;
const MAX_SUBSETS: usize = u16::MAX as usize;

const SECTION0_LEN: usize = 8;
const SECTION1_LEN: usize = 22;
const SECTION5_LEN: usize = 4;

const MASTER_TABLE_VERSION: u8 = 40;
const LOCAL_TABLE_VERSION: u8 = 1;
const MISSING_CENTRE: u16 = 0xFFFF;
/// Section 1 flag: optional section 2 present.
const HAS_SECTION2: u8 = 0x80;
/// Section 3 flags.
const OBSERVED_DATA: u8 = 0x80;
const COMPRESSED_DATA: u8 = 0x40;

/// BUFR edition 4 encoder/decoder.
#[derive(Debug, Clone, Default)]
pub struct BufrCodec {
    options: CodecOptions,
}

impl BufrCodec {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }
}

struct PackedColumn {
    entry: ManifestEntry,
    offsets: Vec<Option<u64>>,
}

/// One decoded message.
#[derive(Debug, Clone, PartialEq)]
pub struct BufrMessage {
    pub typical_time: Option<DateTime<Utc>>,
    pub descriptors: Vec<Fxy>,
    pub manifest: Vec<ManifestEntry>,
    pub rows: Vec<Vec<Value>>,
}

fn pack(table: &CanonicalTable, options: &CodecOptions) -> Result<Vec<PackedColumn>, CodecError> {
    table
        .columns()
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let scaled = scale_column(
                FORMAT,
                &column.name,
                column.column_type,
                table.column_values(index),
                options.float_precision,
            )?;
            let reference = scaled.min().unwrap_or(0);
            let (width, offsets) = scaled.offsets(FORMAT, &column.name, reference, true)?;
            Ok(PackedColumn {
                entry: ManifestEntry {
                    name: column.name.clone(),
                    column_type: column.column_type,
                    unit: unit_for(&column.name, column.column_type).to_string(),
                    scale: scaled.scale,
                    reference,
                    width,
                },
                offsets,
            })
        })
        .collect()
}

fn section1(time: DateTime<Utc>) -> ByteWriter {
    let mut s = ByteWriter::new();
    s.u24(SECTION1_LEN as u32)
        .u8(0)
        .u16(MISSING_CENTRE)
        .u16(0)
        .u8(0)
        .u8(HAS_SECTION2)
        .u8(0)
        .u8(255)
        .u8(0)
        .u8(MASTER_TABLE_VERSION)
        .u8(LOCAL_TABLE_VERSION)
        .u16(u16::try_from(time.year()).unwrap_or(0))
        .u8(time.month() as u8)
        .u8(time.day() as u8)
        .u8(time.hour() as u8)
        .u8(time.minute() as u8)
        .u8(time.second() as u8);
    s
}

fn encode_message(
    table: &CanonicalTable,
    manifest: &[u8],
    descriptors: &[Fxy],
    columns: &[PackedColumn],
    rows: std::ops::Range<usize>,
) -> Vec<u8> {
    let s1 = section1(first_timestamp(table, rows.clone()));

    let mut s2 = ByteWriter::new();
    s2.u24((4 + manifest.len()) as u32).u8(0).bytes(manifest);

    let mut s3 = ByteWriter::new();
    s3.u24((7 + 2 * descriptors.len()) as u32)
        .u8(0)
        .u16(rows.len() as u16)
        .u8(OBSERVED_DATA);
    for fxy in descriptors {
        s3.u16(fxy.to_u16());
    }

    let mut bits = BitWriter::new();
    for row in rows {
        for column in columns {
            match column.offsets[row] {
                Some(offset) => bits.write(offset, column.entry.width),
                None => bits.write_missing(column.entry.width),
            }
        }
    }
    let data = bits.finish();
    let mut s4 = ByteWriter::new();
    s4.u24((4 + data.len()) as u32).u8(0).bytes(&data);

    let total = SECTION0_LEN + s1.len() + s2.len() + s3.len() + s4.len() + SECTION5_LEN;
    let mut message = ByteWriter::new();
    message
        .bytes(b"BUFR")
        .u24(total as u32)
        .u8(EDITION)
        .bytes(&s1.into_bytes())
        .bytes(&s2.into_bytes())
        .bytes(&s3.into_bytes())
        .bytes(&s4.into_bytes())
        .bytes(b"7777");
    message.into_bytes()
}

/// Body length of a section whose declared length includes `header` octets.
fn body_len(declared: u32, header: usize, what: &str) -> Result<usize, CodecError> {
    (declared as usize)
        .checked_sub(header)
        .ok_or_else(|| CodecError::malformed(FORMAT, format!("{} length {} too small", what, declared)))
}

fn read_message(input: &mut ByteReader<'_>) -> Result<BufrMessage, CodecError> {
    let start = input.position();
    input.expect_tag(b"BUFR", "section 0")?;
    let total = input.u24("message length")? as usize;
    let edition = input.u8("edition")?;
    if edition != EDITION {
        return Err(CodecError::malformed(
            FORMAT,
            format!("edition {} is not supported", edition),
        ));
    }

    let len1 = input.u24("section 1 length")?;
    let s1 = input.take(body_len(len1, 3, "section 1")?, "section 1")?;
    if s1.len() < SECTION1_LEN - 3 {
        return Err(CodecError::truncated(FORMAT, "section 1"));
    }
    if s1[6] & HAS_SECTION2 == 0 {
        return Err(CodecError::malformed(FORMAT, "no column manifest (section 2 absent)"));
    }
    let typical_time = NaiveDate::from_ymd_opt(
        i32::from(u16::from_be_bytes([s1[12], s1[13]])),
        u32::from(s1[14]),
        u32::from(s1[15]),
    )
    .and_then(|d| d.and_hms_opt(u32::from(s1[16]), u32::from(s1[17]), u32::from(s1[18])))
    .map(|t| t.and_utc());

    let len2 = input.u24("section 2 length")?;
    input.u8("section 2 reserved")?;
    let s2 = input.take(body_len(len2, 4, "section 2")?, "section 2")?;
    let manifest = read_manifest(FORMAT, &mut ByteReader::new(FORMAT, s2))?;

    let len3 = input.u24("section 3 length")?;
    input.u8("section 3 reserved")?;
    let subsets = usize::from(input.u16("subset count")?);
    let flags = input.u8("section 3 flags")?;
    if flags & COMPRESSED_DATA != 0 {
        return Err(CodecError::malformed(FORMAT, "compressed data is not supported"));
    }
    let s3 = input.take(body_len(len3, 7, "section 3")?, "section 3 descriptors")?;
    let descriptors: Vec<Fxy> = s3
        .chunks_exact(2)
        .map(|pair| Fxy::from_u16(u16::from_be_bytes([pair[0], pair[1]])))
        .collect();
    if descriptors.len() != manifest.len() {
        return Err(CodecError::malformed(
            FORMAT,
            format!(
                "{} descriptors but {} manifest entries",
                descriptors.len(),
                manifest.len()
            ),
        ));
    }

    let len4 = input.u24("section 4 length")?;
    input.u8("section 4 reserved")?;
    let data = input.take(body_len(len4, 4, "section 4")?, "section 4")?;
    let mut bits = BitReader::new(data);
    let mut rows = Vec::with_capacity(subsets);
    for _ in 0..subsets {
        let row = manifest
            .iter()
            .map(|entry| {
                let raw = bits
                    .read(entry.width)
                    .ok_or_else(|| CodecError::truncated(FORMAT, "section 4 data"))?;
                if raw == all_ones(entry.width) {
                    return Ok(Value::Null);
                }
                let scaled = i64::try_from(i128::from(entry.reference) + i128::from(raw))
                    .map_err(|_| CodecError::malformed(FORMAT, "packed value overflows"))?;
                unscale(FORMAT, entry.column_type, entry.scale, scaled)
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    input.expect_tag(b"7777", "section 5")?;
    if input.position() - start != total {
        return Err(CodecError::malformed(
            FORMAT,
            format!(
                "declared length {} but sections span {}",
                total,
                input.position() - start
            ),
        ));
    }

    Ok(BufrMessage {
        typical_time,
        descriptors,
        manifest,
        rows,
    })
}

/// Decodes every message in `bytes`.
pub fn read_messages(bytes: &[u8]) -> Result<Vec<BufrMessage>, CodecError> {
    let mut input = ByteReader::new(FORMAT, bytes);
    let mut messages = Vec::new();
    while input.remaining() > 0 {
        messages.push(read_message(&mut input)?);
    }
    Ok(messages)
}

impl ScientificFormat for BufrCodec {
    fn name(&self) -> &'static str {
        FORMAT
    }

    fn encode(&self, table: &CanonicalTable) -> Result<Vec<u8>, CodecError> {
        let columns = pack(table, &self.options)?;
        let descriptors = bufr_descriptors(table.column_names())?;
        let entries: Vec<ManifestEntry> = columns.iter().map(|c| c.entry.clone()).collect();
        let mut manifest = ByteWriter::new();
        write_manifest(FORMAT, &entries, &mut manifest)?;
        let manifest = manifest.into_bytes();

        let overhead = SECTION0_LEN
            + SECTION1_LEN
            + (4 + manifest.len())
            + (7 + 2 * descriptors.len())
            + 4
            + SECTION5_LEN;
        if overhead >= MAX_MESSAGE_LEN {
            return Err(CodecError::limit(
                FORMAT,
                format!("{} columns do not fit in one message", entries.len()),
            ));
        }
        let row_bits: usize = entries.iter().map(|e| usize::from(e.width)).sum();
        let rows_per_message = if row_bits == 0 {
            MAX_SUBSETS
        } else {
            MAX_SUBSETS.min((MAX_MESSAGE_LEN - overhead) * 8 / row_bits)
        };
        if rows_per_message == 0 {
            return Err(CodecError::limit(FORMAT, "a single row does not fit in one message"));
        }

        let total_rows = table.row_count();
        let mut out = Vec::new();
        let mut start = 0;
        loop {
            let end = total_rows.min(start + rows_per_message);
            out.extend(encode_message(table, &manifest, &descriptors, &columns, start..end));
            start = end;
            if start >= total_rows {
                break;
            }
        }
        debug!(
            "Encoded {} rows x {} columns as {} BUFR byte(s)",
            total_rows,
            entries.len(),
            out.len()
        );
        Ok(out)
    }

    fn decode(&self, bytes: &[u8]) -> Result<CanonicalTable, CodecError> {
        let messages = read_messages(bytes)?;
        let Some(first) = messages.first() else {
            return Err(CodecError::malformed(FORMAT, "no messages"));
        };
        let manifest = first.manifest.clone();
        let mut rows = Vec::new();
        for message in messages {
            if message.manifest != manifest {
                return Err(CodecError::malformed(
                    FORMAT,
                    "messages describe different columns",
                ));
            }
            rows.extend(message.rows);
        }
        let columns = manifest
            .into_iter()
            .map(|entry| Column::new(entry.name, entry.column_type))
            .collect();
        Ok(CanonicalTable::try_new(columns, rows)?)
    }
}
