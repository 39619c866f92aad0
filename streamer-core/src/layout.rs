//! Fixed-size record layouts.
//!
//! A layout is described with the compact struct-style notation used by the
//! recording tools, e.g. `<Q3f` for a little-endian `u64` followed by three
//! `f32` values. [`RecordLayout::parse`] turns that string into an explicit
//! list of fields with offsets, so the record size and the position of every
//! field are known before the first byte is read.
//!
//! ```text
//!  first char   order           sizes      alignment
//!  ----------   -------------   --------   ---------
//!  @ (default)  native          native     native
//!  =            native          standard   none
//!  <            little-endian   standard   none
//!  > or !       big-endian      standard   none
//! ```
//!
//! A count before `s` or `p` is the length of one byte-string field. A count
//! before any other code repeats the field (`3f` is three `f32` fields), and a
//! count before `x` inserts that many pad bytes.

use std::collections::HashMap;
use std::fmt;

use crate::error::{DecodeError, LayoutError};

/// Byte order of multi-byte fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Byte order of the machine we are running on
    pub const NATIVE: ByteOrder = if cfg!(target_endian = "big") {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    };
}

/// Decoded shape of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Char,
    I8,
    U8,
    Bool,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    F32,
    F64,
    Bytes,
    PascalString,
}

/// One field of a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Type code this field came from
    pub code: char,
    pub kind: FieldKind,
    /// Byte offset from the start of the record
    pub offset: usize,
    /// Width in bytes
    pub size: usize,
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::UInt(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Bytes(v) => write!(f, "{:02X?}", v),
        }
    }
}

/// Ordered field list with a fixed total size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    format: String,
    order: ByteOrder,
    fields: Vec<Field>,
    size: usize,
}

impl RecordLayout {
    /// Parse a layout string such as `<Q3f` or `@iid`.
    pub fn parse(format: &str) -> Result<Self, LayoutError> {
        let mut chars = format.char_indices().peekable();

        let (order, native) = match chars.peek().map(|&(_, c)| c) {
            Some('@') => (ByteOrder::NATIVE, true),
            Some('=') => (ByteOrder::NATIVE, false),
            Some('<') => (ByteOrder::Little, false),
            Some('>') | Some('!') => (ByteOrder::Big, false),
            _ => (ByteOrder::NATIVE, true),
        };
        if matches!(chars.peek(), Some((_, '@' | '=' | '<' | '>' | '!'))) {
            chars.next();
        }

        let mut fields = Vec::new();
        let mut offset = 0usize;

        while let Some((position, c)) = chars.next() {
            if c.is_whitespace() {
                continue;
            }

            let (count, code_position, code) = match c.to_digit(10) {
                Some(first) => {
                    let mut count = first as usize;
                    while let Some(digit) = chars.peek().and_then(|&(_, d)| d.to_digit(10)) {
                        count = count
                            .checked_mul(10)
                            .and_then(|n| n.checked_add(digit as usize))
                            .ok_or(LayoutError::CountOverflow(position))?;
                        chars.next();
                    }
                    match chars.next() {
                        Some((p, code)) if !code.is_whitespace() => (Some(count), p, code),
                        _ => return Err(LayoutError::DanglingCount(position)),
                    }
                }
                None => (None, position, c),
            };

            match code {
                '@' | '=' | '<' | '>' | '!' => {
                    return Err(LayoutError::MisplacedByteOrder {
                        code,
                        position: code_position,
                    });
                }
                'x' => {
                    offset = offset
                        .checked_add(count.unwrap_or(1))
                        .ok_or(LayoutError::CountOverflow(position))?;
                }
                's' | 'p' => {
                    let size = count.unwrap_or(1);
                    let kind = if code == 's' {
                        FieldKind::Bytes
                    } else {
                        FieldKind::PascalString
                    };
                    fields.push(Field {
                        code,
                        kind,
                        offset,
                        size,
                    });
                    offset = offset
                        .checked_add(size)
                        .ok_or(LayoutError::CountOverflow(position))?;
                }
                _ => {
                    let (kind, size) = scalar(code, code_position, native)?;
                    for _ in 0..count.unwrap_or(1) {
                        if native {
                            offset = offset.next_multiple_of(size);
                        }
                        fields.push(Field {
                            code,
                            kind,
                            offset,
                            size,
                        });
                        offset = offset
                            .checked_add(size)
                            .ok_or(LayoutError::CountOverflow(position))?;
                    }
                }
            }
        }

        if fields.is_empty() || offset == 0 {
            return Err(LayoutError::Empty(format.to_string()));
        }

        Ok(Self {
            format: format.to_string(),
            order,
            fields,
            size: offset,
        })
    }

    /// The layout string this was parsed from
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of bytes in one record
    pub fn size(&self) -> usize {
        self.size
    }

    /// Decode a single field of `record`.
    pub fn decode_field(&self, record: &[u8], index: usize) -> Result<FieldValue, DecodeError> {
        self.check_size(record)?;
        let field = self
            .fields
            .get(index)
            .ok_or(DecodeError::NoSuchField(index))?;
        Ok(self.decode(field, &record[field.offset..field.offset + field.size]))
    }

    /// Decode every field of `record`, in layout order.
    pub fn decode_record(&self, record: &[u8]) -> Result<Vec<FieldValue>, DecodeError> {
        self.check_size(record)?;
        Ok(self
            .fields
            .iter()
            .map(|field| self.decode(field, &record[field.offset..field.offset + field.size]))
            .collect())
    }

    /// Decode a record into a name -> value map, using `field_index` to name
    /// the fields.
    pub fn decode_named(
        &self,
        record: &[u8],
        field_index: &HashMap<String, usize>,
    ) -> Result<HashMap<String, FieldValue>, DecodeError> {
        let values = self.decode_record(record)?;
        Ok(field_index
            .iter()
            .filter_map(|(name, &i)| values.get(i).map(|v| (name.clone(), v.clone())))
            .collect())
    }

    fn check_size(&self, record: &[u8]) -> Result<(), DecodeError> {
        if record.len() != self.size {
            return Err(DecodeError::SizeMismatch {
                expected: self.size,
                actual: record.len(),
            });
        }
        Ok(())
    }

    fn decode(&self, field: &Field, bytes: &[u8]) -> FieldValue {
        macro_rules! number {
            ($t:ty) => {
                match self.order {
                    ByteOrder::Little => <$t>::from_le_bytes(array(bytes)),
                    ByteOrder::Big => <$t>::from_be_bytes(array(bytes)),
                }
            };
        }

        match field.kind {
            FieldKind::Char | FieldKind::Bytes => FieldValue::Bytes(bytes.to_vec()),
            FieldKind::PascalString => match bytes.split_first() {
                Some((&len, rest)) => {
                    FieldValue::Bytes(rest[..(len as usize).min(rest.len())].to_vec())
                }
                None => FieldValue::Bytes(Vec::new()),
            },
            FieldKind::Bool => FieldValue::Bool(bytes[0] != 0),
            FieldKind::I8 => FieldValue::Int(bytes[0] as i8 as i64),
            FieldKind::U8 => FieldValue::UInt(bytes[0] as u64),
            FieldKind::I16 => FieldValue::Int(number!(i16) as i64),
            FieldKind::U16 => FieldValue::UInt(number!(u16) as u64),
            FieldKind::I32 => FieldValue::Int(number!(i32) as i64),
            FieldKind::U32 => FieldValue::UInt(number!(u32) as u64),
            FieldKind::I64 => FieldValue::Int(number!(i64)),
            FieldKind::U64 => FieldValue::UInt(number!(u64)),
            FieldKind::F16 => FieldValue::Float(f16_to_f64(number!(u16))),
            FieldKind::F32 => FieldValue::Float(number!(f32) as f64),
            FieldKind::F64 => FieldValue::Float(number!(f64)),
        }
    }
}

impl fmt::Display for RecordLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' ({} fields, {} bytes)",
            self.format,
            self.fields.len(),
            self.size
        )
    }
}

/// Kind and width of a numeric/char type code.
fn scalar(code: char, position: usize, native: bool) -> Result<(FieldKind, usize), LayoutError> {
    let signed = |size: usize| if size == 8 { FieldKind::I64 } else { FieldKind::I32 };
    let unsigned = |size: usize| if size == 8 { FieldKind::U64 } else { FieldKind::U32 };

    Ok(match code {
        'c' => (FieldKind::Char, 1),
        'b' => (FieldKind::I8, 1),
        'B' => (FieldKind::U8, 1),
        '?' => (FieldKind::Bool, 1),
        'h' => (FieldKind::I16, 2),
        'H' => (FieldKind::U16, 2),
        'i' => (FieldKind::I32, 4),
        'I' => (FieldKind::U32, 4),
        'l' if native => {
            let size = std::mem::size_of::<std::ffi::c_long>();
            (signed(size), size)
        }
        'L' if native => {
            let size = std::mem::size_of::<std::ffi::c_ulong>();
            (unsigned(size), size)
        }
        'l' => (FieldKind::I32, 4),
        'L' => (FieldKind::U32, 4),
        'q' => (FieldKind::I64, 8),
        'Q' => (FieldKind::U64, 8),
        'n' | 'N' | 'P' if !native => return Err(LayoutError::NativeOnly(code)),
        'n' => {
            let size = std::mem::size_of::<isize>();
            (signed(size), size)
        }
        'N' | 'P' => {
            let size = std::mem::size_of::<usize>();
            (unsigned(size), size)
        }
        'e' => (FieldKind::F16, 2),
        'f' => (FieldKind::F32, 4),
        'd' => (FieldKind::F64, 8),
        _ => return Err(LayoutError::UnknownCode { code, position }),
    })
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[..N]);
    buf
}

/// IEEE 754 binary16 to f64
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1f) as i32;
    let mantissa = (bits & 0x3ff) as f64;

    match exponent {
        0 => sign * mantissa * 2f64.powi(-24),
        0x1f if mantissa == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + mantissa / 1024.0) * 2f64.powi(exponent - 15),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_sizes() {
        let layout = RecordLayout::parse("<Q3f").unwrap();
        assert_eq!(layout.size(), 20);
        assert_eq!(layout.fields().len(), 4);
        assert_eq!(layout.fields()[0].kind, FieldKind::U64);
        assert_eq!(layout.fields()[3].offset, 16);
        assert_eq!(layout.byte_order(), ByteOrder::Little);
    }

    #[test]
    fn test_native_alignment() {
        // b at 0, padding to 4, i at 4, h at 8, padding to 16, d at 16
        let layout = RecordLayout::parse("bihd").unwrap();
        let offsets: Vec<usize> = layout.fields().iter().map(|f| f.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8, 16]);
        assert_eq!(layout.size(), 24);

        // Standard mode packs the same fields
        let packed = RecordLayout::parse("=bihd").unwrap();
        assert_eq!(packed.size(), 15);
    }

    #[test]
    fn test_strings_and_padding() {
        let layout = RecordLayout::parse("<4s2xH 3p").unwrap();
        assert_eq!(layout.fields().len(), 3);
        assert_eq!(layout.fields()[0].size, 4);
        assert_eq!(layout.fields()[1].offset, 6);
        assert_eq!(layout.fields()[2].kind, FieldKind::PascalString);
        assert_eq!(layout.size(), 11);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            RecordLayout::parse("<Qz"),
            Err(LayoutError::UnknownCode {
                code: 'z',
                position: 2
            })
        );
        assert_eq!(
            RecordLayout::parse("<Q3"),
            Err(LayoutError::DanglingCount(2))
        );
        assert_eq!(
            RecordLayout::parse("<Q>f"),
            Err(LayoutError::MisplacedByteOrder {
                code: '>',
                position: 2
            })
        );
        assert_eq!(RecordLayout::parse("<N"), Err(LayoutError::NativeOnly('N')));
        assert!(matches!(RecordLayout::parse("<4x"), Err(LayoutError::Empty(_))));
        assert!(matches!(RecordLayout::parse(""), Err(LayoutError::Empty(_))));
        assert!(matches!(RecordLayout::parse("<0s"), Err(LayoutError::Empty(_))));
    }

    #[test]
    fn test_decode_big_endian() {
        let layout = RecordLayout::parse(">hIf").unwrap();
        let mut record = Vec::new();
        record.extend_from_slice(&(-2i16).to_be_bytes());
        record.extend_from_slice(&70000u32.to_be_bytes());
        record.extend_from_slice(&1.5f32.to_be_bytes());

        let values = layout.decode_record(&record).unwrap();
        assert_eq!(
            values,
            vec![
                FieldValue::Int(-2),
                FieldValue::UInt(70000),
                FieldValue::Float(1.5)
            ]
        );
    }

    #[test]
    fn test_decode_pascal_string_and_bool() {
        let layout = RecordLayout::parse("<4p?").unwrap();
        let record = [2u8, b'o', b'k', b'!', 7];
        assert_eq!(
            layout.decode_field(&record, 0).unwrap(),
            FieldValue::Bytes(b"ok".to_vec())
        );
        assert_eq!(layout.decode_field(&record, 1).unwrap(), FieldValue::Bool(true));
    }

    #[test]
    fn test_decode_half_float() {
        let layout = RecordLayout::parse("<e").unwrap();
        // 0x3C00 = 1.0, 0xC000 = -2.0
        assert_eq!(
            layout.decode_field(&0x3C00u16.to_le_bytes(), 0).unwrap(),
            FieldValue::Float(1.0)
        );
        assert_eq!(
            layout.decode_field(&0xC000u16.to_le_bytes(), 0).unwrap(),
            FieldValue::Float(-2.0)
        );
    }

    #[test]
    fn test_decode_size_mismatch() {
        let layout = RecordLayout::parse("<Qf").unwrap();
        assert_eq!(
            layout.decode_field(&[0u8; 11], 0),
            Err(DecodeError::SizeMismatch {
                expected: 12,
                actual: 11
            })
        );
        assert_eq!(
            layout.decode_field(&[0u8; 12], 5),
            Err(DecodeError::NoSuchField(5))
        );
    }

    #[test]
    fn test_decode_named() {
        let layout = RecordLayout::parse("<Qh").unwrap();
        let mut record = 42u64.to_le_bytes().to_vec();
        record.extend_from_slice(&(-7i16).to_le_bytes());

        let index = HashMap::from([("timestamp".to_string(), 0), ("temp".to_string(), 1)]);
        let named = layout.decode_named(&record, &index).unwrap();
        assert_eq!(named["timestamp"], FieldValue::UInt(42));
        assert_eq!(named["temp"], FieldValue::Int(-7));
    }
}
