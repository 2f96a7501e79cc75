//! Minimal `.npy` codec.
//!
//! Shard records carry each channel as a serialized NumPy array. This module
//! decodes those payloads into an [`NpyArray`] (element type, shape and the raw
//! element bytes) without converting the data, so frames can be stacked in the
//! array's native representation.
//!
//! Supported: format versions 1.0, 2.0 and 3.0, C-ordered arrays of the
//! scalar dtypes listed in [`DType`]. Structured dtypes and Fortran-ordered
//! arrays are rejected.

use std::fmt;

use bytes::Bytes;
use snafu::prelude::*;

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

/// Errors raised while decoding or constructing `.npy` arrays.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum NpyError {
    /// The payload does not start with the `\x93NUMPY` magic string.
    #[snafu(display("not an .npy payload (bad magic)"))]
    BadMagic,

    /// The payload ended before the header or data was complete.
    #[snafu(display("truncated .npy payload: needed {needed} bytes, have {available}"))]
    Truncated {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// The format version is not 1.x, 2.x or 3.x.
    #[snafu(display("unsupported .npy format version {major}.{minor}"))]
    UnsupportedVersion {
        /// Major version byte.
        major: u8,
        /// Minor version byte.
        minor: u8,
    },

    /// The header dictionary could not be interpreted.
    #[snafu(display("malformed .npy header: {reason}"))]
    MalformedHeader {
        /// What was wrong with the header.
        reason: String,
    },

    /// The `descr` entry names a dtype this codec does not handle.
    #[snafu(display("unsupported .npy dtype descriptor '{descr}'"))]
    UnsupportedDescr {
        /// The raw descriptor string.
        descr: String,
    },

    /// Fortran-ordered arrays are not supported.
    #[snafu(display("fortran-ordered .npy arrays are not supported"))]
    FortranOrder,

    /// The data section length does not match `shape * itemsize`.
    #[snafu(display("array data is {actual} bytes, shape requires {expected}"))]
    LengthMismatch {
        /// Byte length implied by shape and element size.
        expected: usize,
        /// Byte length actually present.
        actual: usize,
    },
}

/// Scalar element kinds understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// `?` boolean, one byte.
    Bool,
    /// `i1`
    I8,
    /// `u1`
    U8,
    /// `i2`
    I16,
    /// `u2`
    U16,
    /// `i4`
    I32,
    /// `u4`
    U32,
    /// `i8`
    I64,
    /// `u8`
    U64,
    /// `f2` half precision float.
    F16,
    /// `f4`
    F32,
    /// `f8`
    F64,
}

impl DType {
    /// Size of one element in bytes.
    pub fn item_size(self) -> usize {
        match self {
            DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 | DType::F16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    fn code(self) -> &'static str {
        match self {
            DType::Bool => "b1",
            DType::I8 => "i1",
            DType::U8 => "u1",
            DType::I16 => "i2",
            DType::U16 => "u2",
            DType::I32 => "i4",
            DType::U32 => "u4",
            DType::I64 => "i8",
            DType::U64 => "u8",
            DType::F16 => "f2",
            DType::F32 => "f4",
            DType::F64 => "f8",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "?" | "b1" => DType::Bool,
            "i1" => DType::I8,
            "u1" => DType::U8,
            "i2" => DType::I16,
            "u2" => DType::U16,
            "i4" => DType::I32,
            "u4" => DType::U32,
            "i8" => DType::I64,
            "u8" => DType::U64,
            "f2" => DType::F16,
            "f4" => DType::F32,
            "f8" => DType::F64,
            _ => return None,
        })
    }
}

/// Byte order of multi-byte elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Little endian (`<`).
    Little,
    /// Big endian (`>`).
    Big,
}

impl Endian {
    fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

/// A dtype together with its byte order, as written in an `.npy` `descr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementType {
    /// Scalar kind.
    pub dtype: DType,
    /// Byte order; irrelevant for one-byte kinds but kept for equality.
    pub endian: Endian,
}

impl ElementType {
    /// Little-endian element of the given kind.
    pub fn little(dtype: DType) -> Self {
        Self {
            dtype,
            endian: Endian::Little,
        }
    }

    /// Parse a NumPy `descr` string such as `<f4`, `|u1` or `>i2`.
    pub fn parse_descr(descr: &str) -> Result<Self, NpyError> {
        let unsupported = || NpyError::UnsupportedDescr {
            descr: descr.to_string(),
        };
        let mut chars = descr.chars();
        let first = chars.next().ok_or_else(unsupported)?;
        let (endian, code) = match first {
            '<' => (Some(Endian::Little), chars.as_str()),
            '>' => (Some(Endian::Big), chars.as_str()),
            '=' => (Some(Endian::native()), chars.as_str()),
            '|' => (None, chars.as_str()),
            _ => (None, descr),
        };
        let dtype = DType::from_code(code).ok_or_else(unsupported)?;
        let endian = match endian {
            Some(e) => e,
            None if dtype.item_size() == 1 => Endian::Little,
            None => return Err(unsupported()),
        };
        // One-byte kinds compare equal regardless of the prefix they were written with.
        let endian = if dtype.item_size() == 1 {
            Endian::Little
        } else {
            endian
        };
        Ok(Self { dtype, endian })
    }

    /// Render as a NumPy `descr` string.
    pub fn descr(&self) -> String {
        let prefix = if self.dtype.item_size() == 1 {
            '|'
        } else {
            match self.endian {
                Endian::Little => '<',
                Endian::Big => '>',
            }
        };
        format!("{prefix}{}", self.dtype.code())
    }

    fn decode_f64(&self, raw: &[u8]) -> f64 {
        macro_rules! read {
            ($t:ty) => {{
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(raw);
                match self.endian {
                    Endian::Little => <$t>::from_le_bytes(buf),
                    Endian::Big => <$t>::from_be_bytes(buf),
                }
            }};
        }
        match self.dtype {
            DType::Bool => f64::from(u8::from(raw[0] != 0)),
            DType::I8 => f64::from(raw[0] as i8),
            DType::U8 => f64::from(raw[0]),
            DType::I16 => f64::from(read!(i16)),
            DType::U16 => f64::from(read!(u16)),
            DType::I32 => f64::from(read!(i32)),
            DType::U32 => f64::from(read!(u32)),
            DType::I64 => read!(i64) as f64,
            DType::U64 => read!(u64) as f64,
            DType::F16 => half_to_f64(read!(u16)),
            DType::F32 => f64::from(read!(f32)),
            DType::F64 => read!(f64),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descr())
    }
}

fn half_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = i32::from((bits >> 10) & 0x1f);
    let frac = f64::from(bits & 0x03ff);
    match exp {
        0 => sign * frac * 2f64.powi(-24),
        0x1f if frac == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + frac / 1024.0) * 2f64.powi(exp - 15),
    }
}

/// Rust scalars that map one-to-one onto an `.npy` dtype.
pub trait NpyElement: Copy {
    /// The matching dtype.
    const DTYPE: DType;
    /// Append the little-endian encoding of `self` to `out`.
    fn write_le(self, out: &mut Vec<u8>);
}

macro_rules! npy_element {
    ($($t:ty => $d:expr),* $(,)?) => {
        $(
            impl NpyElement for $t {
                const DTYPE: DType = $d;
                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

npy_element! {
    i8 => DType::I8,
    u8 => DType::U8,
    i16 => DType::I16,
    u16 => DType::U16,
    i32 => DType::I32,
    u32 => DType::U32,
    i64 => DType::I64,
    u64 => DType::U64,
    f32 => DType::F32,
    f64 => DType::F64,
}

/// A decoded, C-ordered n-dimensional array with untouched element bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    element: ElementType,
    shape: Vec<usize>,
    data: Bytes,
}

impl NpyArray {
    /// Build an array from raw element bytes, checking that the length matches
    /// `shape` and the element size.
    pub fn new(element: ElementType, shape: Vec<usize>, data: Bytes) -> Result<Self, NpyError> {
        let expected = shape
            .iter()
            .try_fold(element.dtype.item_size(), |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| NpyError::MalformedHeader {
                reason: format!("shape {shape:?} overflows the address space"),
            })?;
        ensure!(
            data.len() == expected,
            LengthMismatchSnafu {
                expected,
                actual: data.len()
            }
        );
        Ok(Self {
            element,
            shape,
            data,
        })
    }

    /// Build a little-endian array from typed values.
    pub fn from_values<T: NpyElement>(shape: Vec<usize>, values: &[T]) -> Result<Self, NpyError> {
        let mut data = Vec::with_capacity(values.len() * T::DTYPE.item_size());
        for v in values {
            v.write_le(&mut data);
        }
        Self::new(ElementType::little(T::DTYPE), shape, Bytes::from(data))
    }

    /// Decode an `.npy` payload.
    pub fn parse(payload: Bytes) -> Result<Self, NpyError> {
        let available = payload.len();
        ensure!(
            available >= MAGIC.len() + 2,
            TruncatedSnafu {
                needed: MAGIC.len() + 2,
                available
            }
        );
        ensure!(&payload[..MAGIC.len()] == MAGIC, BadMagicSnafu);

        let major = payload[6];
        let minor = payload[7];
        let (len_bytes, utf8) = match major {
            1 => (2usize, false),
            2 => (4usize, false),
            3 => (4usize, true),
            _ => return UnsupportedVersionSnafu { major, minor }.fail(),
        };

        let prelude = 8 + len_bytes;
        ensure!(
            available >= prelude,
            TruncatedSnafu {
                needed: prelude,
                available
            }
        );
        let header_len = if len_bytes == 2 {
            usize::from(u16::from_le_bytes([payload[8], payload[9]]))
        } else {
            u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]) as usize
        };

        let data_start = prelude + header_len;
        ensure!(
            available >= data_start,
            TruncatedSnafu {
                needed: data_start,
                available
            }
        );

        let raw_header = &payload[prelude..data_start];
        let header = if utf8 {
            std::str::from_utf8(raw_header).ok()
        } else {
            raw_header.is_ascii().then(|| {
                // ASCII is valid UTF-8.
                std::str::from_utf8(raw_header).unwrap_or_default()
            })
        }
        .ok_or_else(|| NpyError::MalformedHeader {
            reason: "header is not valid text".to_string(),
        })?;

        let header = Header::parse(header)?;
        ensure!(!header.fortran_order, FortranOrderSnafu);
        let element = ElementType::parse_descr(&header.descr)?;

        Self::new(element, header.shape, payload.slice(data_start..))
    }

    /// Encode as a version 1.0 `.npy` payload.
    pub fn to_npy_bytes(&self) -> Vec<u8> {
        let shape = match self.shape.len() {
            1 => format!("({},)", self.shape[0]),
            _ => format!(
                "({})",
                self.shape
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {shape}, }}",
            self.element.descr()
        );
        // Pad so that magic + version + length + header + '\n' is 64-byte aligned.
        let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
        let pad = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
        header.extend(std::iter::repeat_n(' ', pad));
        header.push('\n');

        let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + self.data.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Element type and byte order.
    pub fn element_type(&self) -> ElementType {
        self.element
    }

    /// Array dimensions.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns `true` when the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw element bytes in C order.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Read element `flat_index` (C order) widened to `f64`.
    pub fn value_f64(&self, flat_index: usize) -> Option<f64> {
        let size = self.element.dtype.item_size();
        let start = flat_index.checked_mul(size)?;
        let raw = self.data.get(start..start.checked_add(size)?)?;
        Some(self.element.decode_f64(raw))
    }
}

struct Header {
    descr: String,
    fortran_order: bool,
    shape: Vec<usize>,
}

impl Header {
    fn parse(text: &str) -> Result<Self, NpyError> {
        let malformed = |reason: &str| NpyError::MalformedHeader {
            reason: reason.to_string(),
        };

        let descr_value = value_after(text, "descr").ok_or_else(|| malformed("missing 'descr'"))?;
        let descr = quoted(descr_value).ok_or_else(|| malformed("'descr' is not a string"))?;

        let fortran_value = value_after(text, "fortran_order")
            .ok_or_else(|| malformed("missing 'fortran_order'"))?;
        let fortran_order = if fortran_value.starts_with("True") {
            true
        } else if fortran_value.starts_with("False") {
            false
        } else {
            return Err(malformed("'fortran_order' is not a bool"));
        };

        let shape_value = value_after(text, "shape").ok_or_else(|| malformed("missing 'shape'"))?;
        let inner = shape_value
            .strip_prefix('(')
            .and_then(|s| s.split_once(')'))
            .map(|(inner, _)| inner)
            .ok_or_else(|| malformed("'shape' is not a tuple"))?;
        let shape = inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.trim_end_matches('L')
                    .parse::<usize>()
                    .map_err(|_| malformed("'shape' holds a non-integer dimension"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Header {
            descr: descr.to_string(),
            fortran_order,
            shape,
        })
    }
}

/// Text following `'key':` with leading whitespace removed.
fn value_after<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let needle_single = format!("'{key}'");
    let needle_double = format!("\"{key}\"");
    let pos = text
        .find(&needle_single)
        .map(|p| p + needle_single.len())
        .or_else(|| text.find(&needle_double).map(|p| p + needle_double.len()))?;
    let rest = text[pos..].trim_start().strip_prefix(':')?;
    Some(rest.trim_start())
}

fn quoted(value: &str) -> Option<&str> {
    let quote = value.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let rest = &value[1..];
    rest.find(quote).map(|end| &rest[..end])
}
