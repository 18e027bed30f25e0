//! Payload codecs: typed numeric arrays, full surface snapshots, and
//! sparse surface deltas.
//!
//! All multi-byte values are little-endian IEEE-754 / two's complement.
//! The surface snapshot layout is
//!
//! ```text
//! u32 nx | u32 ny | u32 meta_len | meta JSON | pad to 4 | f32[nx] x | f32[ny] y | f32[nx*ny] z
//! ```
//!
//! Metadata decoding tolerates unknown keys so newer peers can extend the
//! JSON without breaking older receivers.

use crate::ProtoError;
use core_surface::{AxisLabels, Surface};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScalarType {
    F32 = 0,
    F64 = 1,
    U32 = 2,
    I32 = 3,
}

impl ScalarType {
    pub fn from_u8(v: u8) -> Option<ScalarType> {
        match v {
            0 => Some(ScalarType::F32),
            1 => Some(ScalarType::F64),
            2 => Some(ScalarType::U32),
            3 => Some(ScalarType::I32),
            _ => None,
        }
    }

    pub fn elem_size(self) -> usize {
        match self {
            ScalarType::F64 => 8,
            _ => 4,
        }
    }
}

/// A decoded numeric batch.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedArray {
    F32(Vec<f32>),
    F64(Vec<f64>),
    U32(Vec<u32>),
    I32(Vec<i32>),
}

impl TypedArray {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            TypedArray::F32(_) => ScalarType::F32,
            TypedArray::F64(_) => ScalarType::F64,
            TypedArray::U32(_) => ScalarType::U32,
            TypedArray::I32(_) => ScalarType::I32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TypedArray::F32(v) => v.len(),
            TypedArray::F64(v) => v.len(),
            TypedArray::U32(v) => v.len(),
            TypedArray::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 1-byte scalar tag followed by the raw little-endian element bytes.
pub fn encode_typed_array(array: &TypedArray) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + array.len() * array.scalar_type().elem_size());
    out.push(array.scalar_type() as u8);
    match array {
        TypedArray::F32(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        TypedArray::F64(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        TypedArray::U32(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        TypedArray::I32(v) => {
            for x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
    }
    out
}

pub fn decode_typed_array(payload: &[u8]) -> Result<TypedArray, ProtoError> {
    let (&tag, body) = payload.split_first().ok_or(ProtoError::Truncated {
        needed: 1,
        available: 0,
    })?;
    let scalar = ScalarType::from_u8(tag).ok_or(ProtoError::BadScalarTag(tag))?;
    let elem = scalar.elem_size();
    if body.len() % elem != 0 {
        return Err(ProtoError::RaggedArray {
            len: body.len(),
            elem,
        });
    }
    Ok(match scalar {
        ScalarType::F32 => TypedArray::F32(
            body.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        ScalarType::F64 => TypedArray::F64(
            body.chunks_exact(8)
                .map(|c| {
                    f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
                })
                .collect(),
        ),
        ScalarType::U32 => TypedArray::U32(
            body.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        ScalarType::I32 => TypedArray::I32(
            body.chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
    })
}

fn read_u32(payload: &[u8], offset: usize) -> Result<u32, ProtoError> {
    let end = offset + 4;
    if payload.len() < end {
        return Err(ProtoError::Truncated {
            needed: end,
            available: payload.len(),
        });
    }
    Ok(u32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ]))
}

fn read_f32_slice(payload: &[u8], offset: usize, count: usize) -> Result<Vec<f64>, ProtoError> {
    // Checked math: a hostile header must fail as truncation, not panic.
    let end = count
        .checked_mul(4)
        .and_then(|bytes| offset.checked_add(bytes))
        .ok_or(ProtoError::Truncated {
            needed: usize::MAX,
            available: payload.len(),
        })?;
    if payload.len() < end {
        return Err(ProtoError::Truncated {
            needed: end,
            available: payload.len(),
        });
    }
    Ok(payload[offset..end]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
        .collect())
}

fn pad4(n: usize) -> usize {
    (4 - (n % 4)) % 4
}

/// Wire metadata. Only the fields we understand are read; the rest of the
/// JSON object is ignored.
#[derive(Debug, Deserialize, Default)]
struct WireMeta {
    #[serde(default)]
    labels: Option<AxisLabels>,
    #[serde(default)]
    timestamp: u64,
}

/// Serialize a full surface snapshot (SURFACE_FULL payload).
pub fn encode_surface(surface: &Surface) -> Vec<u8> {
    // Domains travel inside the meta JSON; receivers recompute them from
    // the data anyway, so f32 rounding cannot desynchronize the cache.
    let meta_json = serde_json::to_vec(surface.meta()).expect("surface meta serializes");
    let nx = surface.nx();
    let ny = surface.ny();
    let pad = pad4(meta_json.len());
    let mut out =
        Vec::with_capacity(12 + meta_json.len() + pad + (nx + ny + nx * ny) * 4);
    out.extend_from_slice(&(nx as u32).to_le_bytes());
    out.extend_from_slice(&(ny as u32).to_le_bytes());
    out.extend_from_slice(&(meta_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&meta_json);
    out.extend(std::iter::repeat_n(0u8, pad));
    for &v in surface.x() {
        out.extend_from_slice(&(v as f32).to_le_bytes());
    }
    for &v in surface.y() {
        out.extend_from_slice(&(v as f32).to_le_bytes());
    }
    for &v in surface.z() {
        out.extend_from_slice(&(v as f32).to_le_bytes());
    }
    out
}

/// Decode a SURFACE_FULL payload into a fresh surface.
pub fn decode_surface(payload: &[u8]) -> Result<Surface, ProtoError> {
    let nx = read_u32(payload, 0)? as usize;
    let ny = read_u32(payload, 4)? as usize;
    let meta_len = read_u32(payload, 8)? as usize;
    let meta_end = 12 + meta_len;
    if payload.len() < meta_end {
        return Err(ProtoError::Truncated {
            needed: meta_end,
            available: payload.len(),
        });
    }
    let meta: WireMeta = serde_json::from_slice(&payload[12..meta_end])?;

    let cells = nx.checked_mul(ny).ok_or(ProtoError::Truncated {
        needed: usize::MAX,
        available: payload.len(),
    })?;
    let mut offset = meta_end + pad4(meta_len);
    let x = read_f32_slice(payload, offset, nx)?;
    offset += nx * 4;
    let y = read_f32_slice(payload, offset, ny)?;
    offset += ny * 4;
    let z = read_f32_slice(payload, offset, cells)?;

    let surface = Surface::from_wire_parts(
        x,
        y,
        z,
        meta.labels.unwrap_or_default(),
        meta.timestamp,
    )?;
    Ok(surface)
}

/// Serialize a sparse update (SURFACE_DELTA payload):
/// `u32 count | u32[count] flat indices | f32[count] new values`.
pub fn encode_surface_delta(indices: &[u32], values: &[f32]) -> Vec<u8> {
    let count = indices.len().min(values.len());
    let mut out = Vec::with_capacity(4 + count * 8);
    out.extend_from_slice(&(count as u32).to_le_bytes());
    for &i in &indices[..count] {
        out.extend_from_slice(&i.to_le_bytes());
    }
    for &v in &values[..count] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Decode a SURFACE_DELTA payload. Index validity against a concrete
/// surface is the receiver's concern (`Surface::apply_delta` skips
/// out-of-range slots).
pub fn decode_surface_delta(payload: &[u8]) -> Result<(Vec<u32>, Vec<f64>), ProtoError> {
    let count = read_u32(payload, 0)? as usize;
    let idx_end = 4 + count * 4;
    let val_end = idx_end + count * 4;
    if payload.len() < val_end {
        return Err(ProtoError::Truncated {
            needed: val_end,
            available: payload.len(),
        });
    }
    let indices = payload[4..idx_end]
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    let values = read_f32_slice(payload, idx_end, count)?;
    Ok((indices, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_surface::AxisLabels;

    #[test]
    fn typed_array_round_trips() {
        let cases = [
            TypedArray::F32(vec![1.5, -2.25, 0.0]),
            TypedArray::F64(vec![1e-9, 7.25]),
            TypedArray::U32(vec![0, 1, u32::MAX]),
            TypedArray::I32(vec![-1, 0, i32::MAX]),
        ];
        for case in cases {
            let bytes = encode_typed_array(&case);
            assert_eq!(bytes[0], case.scalar_type() as u8);
            assert_eq!(decode_typed_array(&bytes).unwrap(), case);
        }
    }

    #[test]
    fn typed_array_rejects_bad_input() {
        assert!(matches!(
            decode_typed_array(&[]),
            Err(ProtoError::Truncated { .. })
        ));
        assert!(matches!(
            decode_typed_array(&[9, 0, 0, 0, 0]),
            Err(ProtoError::BadScalarTag(9))
        ));
        assert!(matches!(
            decode_typed_array(&[0, 1, 2, 3]),
            Err(ProtoError::RaggedArray { len: 3, elem: 4 })
        ));
    }

    fn sample_surface() -> Surface {
        Surface::from_fn(
            vec![0.25, 0.5, 1.0],
            vec![90.0, 100.0, 110.0, 120.0],
            AxisLabels {
                x: "expiry".into(),
                y: "strike".into(),
                z: "iv".into(),
            },
            |t, k| 0.2 + 0.01 * t + 0.0001 * (k - 100.0).abs(),
        )
        .unwrap()
    }

    #[test]
    fn surface_round_trips_within_f32_precision() {
        let s = sample_surface();
        let bytes = encode_surface(&s);
        let back = decode_surface(&bytes).unwrap();
        assert_eq!(back.nx(), s.nx());
        assert_eq!(back.ny(), s.ny());
        assert_eq!(back.labels(), s.labels());
        assert_eq!(back.meta().timestamp, s.meta().timestamp);
        let err: f64 = s
            .x()
            .iter()
            .zip(back.x())
            .chain(s.y().iter().zip(back.y()))
            .chain(s.z().iter().zip(back.z()))
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(err < 1e-6 * (s.nx() * s.ny()) as f64, "total error {err}");
    }

    #[test]
    fn surface_payload_is_4_byte_aligned_after_meta() {
        let s = sample_surface();
        let bytes = encode_surface(&s);
        let meta_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let x_offset = 12 + meta_len + super::pad4(meta_len);
        assert_eq!(x_offset % 4, 0);
        let x0 = f32::from_le_bytes([
            bytes[x_offset],
            bytes[x_offset + 1],
            bytes[x_offset + 2],
            bytes[x_offset + 3],
        ]);
        assert_eq!(x0, 0.25);
    }

    #[test]
    fn surface_decode_tolerates_unknown_meta_keys() {
        let s = sample_surface();
        let mut bytes = encode_surface(&s);
        // Splice an extended meta JSON in place of the original.
        let meta_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let old_end = 12 + meta_len + super::pad4(meta_len);
        let meta = format!(
            "{{\"labels\":{},\"timestamp\":123,\"new_field\":[1,2,3]}}",
            serde_json::to_string(s.labels()).unwrap()
        );
        let new_meta = meta.as_bytes();
        let mut out = Vec::new();
        out.extend_from_slice(&bytes[0..8]);
        out.extend_from_slice(&(new_meta.len() as u32).to_le_bytes());
        out.extend_from_slice(new_meta);
        out.extend(std::iter::repeat_n(0u8, super::pad4(new_meta.len())));
        out.extend_from_slice(&bytes[old_end..]);
        bytes = out;
        let back = decode_surface(&bytes).unwrap();
        assert_eq!(back.labels(), s.labels());
        assert_eq!(back.meta().timestamp, 123);
    }

    #[test]
    fn surface_decode_rejects_truncation() {
        let s = sample_surface();
        let bytes = encode_surface(&s);
        for cut in [2, 10, bytes.len() - 3] {
            assert!(
                matches!(
                    decode_surface(&bytes[..cut]),
                    Err(ProtoError::Truncated { .. })
                ),
                "cut at {cut}"
            );
        }
    }

    #[test]
    fn delta_round_trip_and_apply() {
        let indices = vec![0u32, 5, 11];
        let values = vec![0.5f32, -1.25, 3.0];
        let bytes = encode_surface_delta(&indices, &values);
        assert_eq!(bytes.len(), 4 + 3 * 8);
        let (idx, vals) = decode_surface_delta(&bytes).unwrap();
        assert_eq!(idx, indices);
        for (a, b) in values.iter().zip(&vals) {
            assert_eq!(*a as f64, *b);
        }
        let mut s = sample_surface();
        let skipped = s.apply_delta(&idx, &vals);
        assert_eq!(skipped, 0);
        assert_eq!(s.at(0, 0), 0.5);
        assert_eq!(s.at(1, 1), -1.25);
        assert_eq!(s.at(2, 3), 3.0);
    }

    #[test]
    fn delta_decode_rejects_short_payload() {
        let bytes = encode_surface_delta(&[1, 2, 3], &[1.0, 2.0, 3.0]);
        assert!(matches!(
            decode_surface_delta(&bytes[..bytes.len() - 1]),
            Err(ProtoError::Truncated { .. })
        ));
    }
}
