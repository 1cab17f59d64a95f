// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Lossy fixed-point quantization between normalized floats and small integers.
//!
//! Values live in `-1..=1`, with `NaN` meaning "not observed". For an N-bit
//! signed format the scale is `2^(N-1) - 1`; `NaN` maps to the most negative
//! integer, which clamping a real value can never produce. The 32-bit float
//! format is the identity codec.
//!
//! ```rust
//! use sensorium::codec::{decode, encode, EncodedArray, IntFormat};
//!
//! let coded = encode(&[0.5, f32::NAN, -2.0], EncodedArray::empty(IntFormat::I8));
//! assert_eq!(coded, EncodedArray::I8(vec![64, -128, -127]));
//!
//! let mut back = [0.0f32; 3];
//! decode(&coded, &mut back);
//! assert!(back[1].is_nan());
//! assert_eq!(back[2], -1.0);
//! ```

use serde::{Deserialize, Serialize};

/// Element format of quantized arrays, negotiated once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntFormat {
    F32,
    I8,
    I16,
}

impl IntFormat {
    /// Value sent on the wire during negotiation.
    pub fn wire_value(self) -> u32 {
        match self {
            IntFormat::F32 => 0,
            IntFormat::I8 => 1,
            IntFormat::I16 => 2,
        }
    }

    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(IntFormat::F32),
            1 => Some(IntFormat::I8),
            2 => Some(IntFormat::I16),
            _ => None,
        }
    }

    pub fn bytes_per_element(self) -> usize {
        match self {
            IntFormat::F32 => 4,
            IntFormat::I8 => 1,
            IntFormat::I16 => 2,
        }
    }
}

/// A quantized array in one of the wire element formats.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedArray {
    F32(Vec<f32>),
    I8(Vec<i8>),
    I16(Vec<i16>),
}

impl EncodedArray {
    pub fn empty(format: IntFormat) -> Self {
        match format {
            IntFormat::F32 => EncodedArray::F32(Vec::new()),
            IntFormat::I8 => EncodedArray::I8(Vec::new()),
            IntFormat::I16 => EncodedArray::I16(Vec::new()),
        }
    }

    pub fn format(&self) -> IntFormat {
        match self {
            EncodedArray::F32(_) => IntFormat::F32,
            EncodedArray::I8(_) => IntFormat::I8,
            EncodedArray::I16(_) => IntFormat::I16,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            EncodedArray::F32(v) => v.len(),
            EncodedArray::I8(v) => v.len(),
            EncodedArray::I16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw element bytes in native order, byte-swapped per element if asked.
    pub fn to_bytes(&self, byteswap: bool) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.format().bytes_per_element());
        match self {
            EncodedArray::F32(v) => {
                for x in v {
                    let bits = if byteswap { x.to_bits().swap_bytes() } else { x.to_bits() };
                    out.extend_from_slice(&bits.to_ne_bytes());
                }
            }
            EncodedArray::I8(v) => out.extend(v.iter().map(|x| *x as u8)),
            EncodedArray::I16(v) => {
                for x in v {
                    let x = if byteswap { x.swap_bytes() } else { *x };
                    out.extend_from_slice(&x.to_ne_bytes());
                }
            }
        }
        out
    }

    /// Inverse of [`EncodedArray::to_bytes`]. Trailing bytes that do not fill a
    /// whole element are ignored.
    pub fn from_bytes(format: IntFormat, bytes: &[u8], byteswap: bool) -> Self {
        match format {
            IntFormat::F32 => EncodedArray::F32(
                bytes
                    .chunks_exact(4)
                    .map(|c| {
                        let bits = u32::from_ne_bytes([c[0], c[1], c[2], c[3]]);
                        f32::from_bits(if byteswap { bits.swap_bytes() } else { bits })
                    })
                    .collect(),
            ),
            IntFormat::I8 => EncodedArray::I8(bytes.iter().map(|b| *b as i8).collect()),
            IntFormat::I16 => EncodedArray::I16(
                bytes
                    .chunks_exact(2)
                    .map(|c| {
                        let x = i16::from_ne_bytes([c[0], c[1]]);
                        if byteswap { x.swap_bytes() } else { x }
                    })
                    .collect(),
            ),
        }
    }
}

/// Quantize `values` into `into`'s format.
///
/// The returned array may be a resized `into`; keep it and pass it back on the
/// next call so the allocation is reused.
pub fn encode(values: &[f32], into: EncodedArray) -> EncodedArray {
    match into {
        EncodedArray::F32(mut out) => {
            out.clear();
            out.extend_from_slice(values);
            EncodedArray::F32(out)
        }
        EncodedArray::I8(mut out) => {
            out.clear();
            out.extend(values.iter().map(|v| quantize(*v, i8::MAX as f32, i8::MIN as f32) as i8));
            EncodedArray::I8(out)
        }
        EncodedArray::I16(mut out) => {
            out.clear();
            out.extend(values.iter().map(|v| quantize(*v, i16::MAX as f32, i16::MIN as f32) as i16));
            EncodedArray::I16(out)
        }
    }
}

/// Dequantize `data` into `into`.
///
/// Only the overlapping prefix is written; the tail of a longer `into` is left
/// untouched, so fill it with `NaN` first if stale values must not show through.
pub fn decode(data: &EncodedArray, into: &mut [f32]) {
    match data {
        EncodedArray::F32(v) => overwrite_array(into, v),
        EncodedArray::I8(v) => {
            for (dst, src) in into.iter_mut().zip(v) {
                *dst = dequantize(*src as f32, i8::MAX as f32, i8::MIN as f32);
            }
        }
        EncodedArray::I16(v) => {
            for (dst, src) in into.iter_mut().zip(v) {
                *dst = dequantize(*src as f32, i16::MAX as f32, i16::MIN as f32);
            }
        }
    }
}

/// Copy the overlapping prefix of `src` into `dst`, ignoring any size difference.
pub fn overwrite_array(dst: &mut [f32], src: &[f32]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
}

fn quantize(v: f32, scale: f32, masked: f32) -> f32 {
    if v.is_nan() {
        masked
    } else {
        (v.clamp(-1.0, 1.0) * scale).round()
    }
}

fn dequantize(x: f32, scale: f32, masked: f32) -> f32 {
    if x == masked {
        f32::NAN
    } else {
        x / scale
    }
}
