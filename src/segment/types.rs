//! Segment storage types and constants.
//!
//! Defines the element trait every matrix cell type implements and the
//! defaults shared by the geometry, tile file and config layers.

use serde::{Deserialize, Serialize};

// ── Constants ──────────────────────────────────────────────────────

/// Default tile height in rows.
pub const DEFAULT_TILE_ROWS: usize = 64;

/// Default tile width in columns.
pub const DEFAULT_TILE_COLS: usize = 64;

/// Default memory fraction. 100 is the "all memory" sentinel of the
/// percent budget rule.
pub const DEFAULT_MEMORY_PERCENT: i64 = 100;

/// Reserved per-record header bytes. Zero keeps records payload-only.
pub const DEFAULT_HEADER_BYTES: usize = 0;

/// Suffix of the JSON sidecar written next to a tile file.
pub const CONFIG_SIDECAR_SUFFIX: &str = "json";

// ── CellValue ──────────────────────────────────────────────────────

/// Fixed-width numeric element stored in a tile.
///
/// Values are encoded little-endian, `SIZE` bytes each. `NULL` is the value
/// a filled tile file reads back before any `put`; it must encode to all
/// zero bytes.
pub trait CellValue: Copy + PartialEq + std::fmt::Debug + 'static {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Value of a never-written cell in a filled tile file.
    const NULL: Self;

    /// Decode from exactly `SIZE` bytes.
    fn read_le(bytes: &[u8]) -> Self;

    /// Encode into exactly `SIZE` bytes.
    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_cell_value {
    ($($t:ty => $null:expr),* $(,)?) => {
        $(
            impl CellValue for $t {
                const SIZE: usize = std::mem::size_of::<$t>();
                const NULL: Self = $null;

                #[inline]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::SIZE]);
                    <$t>::from_le_bytes(raw)
                }

                #[inline]
                fn write_le(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_cell_value! {
    u8 => 0,
    u16 => 0,
    u32 => 0,
    u64 => 0,
    i16 => 0,
    i32 => 0,
    i64 => 0,
    f32 => 0.0,
    f64 => 0.0,
}

// ── Raster Type ────────────────────────────────────────────────────

/// Classic raster map cell types.
///
/// The map type picks the element size of a segment file at open time:
/// integer maps use `i32`, floating maps `f32` or `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RasterType {
    /// 32-bit signed integer cells.
    Cell,
    /// 32-bit float cells.
    FCell,
    /// 64-bit float cells.
    DCell,
}

impl RasterType {
    /// Element size in bytes.
    pub fn element_size(self) -> usize {
        match self {
            RasterType::Cell => <i32 as CellValue>::SIZE,
            RasterType::FCell => <f32 as CellValue>::SIZE,
            RasterType::DCell => <f64 as CellValue>::SIZE,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CELL" => Some(Self::Cell),
            "FCELL" => Some(Self::FCell),
            "DCELL" => Some(Self::DCell),
            _ => None,
        }
    }
}

// ── Encoding Helpers ───────────────────────────────────────────────

/// Decode `out.len()` consecutive elements from `bytes`.
pub(crate) fn decode_into<T: CellValue>(bytes: &[u8], out: &mut [T]) {
    debug_assert_eq!(bytes.len(), out.len() * T::SIZE);
    for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(T::SIZE)) {
        *slot = T::read_le(chunk);
    }
}

/// Encode `values` into consecutive `T::SIZE` chunks of `bytes`.
pub(crate) fn encode_from<T: CellValue>(values: &[T], bytes: &mut [u8]) {
    debug_assert_eq!(bytes.len(), values.len() * T::SIZE);
    for (value, chunk) in values.iter().zip(bytes.chunks_exact_mut(T::SIZE)) {
        value.write_le(chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_encodes_to_zero_bytes() {
        let mut buf = [0xffu8; 8];
        <f64 as CellValue>::NULL.write_le(&mut buf);
        assert_eq!(buf, [0u8; 8]);

        let mut buf = [0xffu8; 4];
        <i32 as CellValue>::NULL.write_le(&mut buf);
        assert_eq!(buf, [0u8; 4]);
    }

    #[test]
    fn test_negative_and_float_values() {
        let mut buf = [0u8; 4];
        (-123_456i32).write_le(&mut buf);
        assert_eq!(i32::read_le(&buf), -123_456);

        let mut buf = [0u8; 8];
        f64::NAN.write_le(&mut buf);
        assert!(f64::read_le(&buf).is_nan());
    }

    #[test]
    fn test_encode_decode_slices() {
        let values = [1.5f32, -2.25, 0.0, 1e30];
        let mut bytes = vec![0u8; values.len() * 4];
        encode_from(&values, &mut bytes);
        let mut out = [0f32; 4];
        decode_into(&bytes, &mut out);
        assert_eq!(out, values);
    }

    #[test]
    fn test_raster_type_sizes() {
        assert_eq!(RasterType::Cell.element_size(), 4);
        assert_eq!(RasterType::FCell.element_size(), 4);
        assert_eq!(RasterType::DCell.element_size(), 8);
        assert_eq!(RasterType::from_name("DCELL"), Some(RasterType::DCell));
        assert_eq!(RasterType::from_name("double"), None);
    }
}
