//! NIfTI-1 single-file (`.nii` / `.nii.gz`) reading and writing.
//!
//! Only what the pipeline needs is supported: scalar voxel types, rank 2 or 3
//! volumes (a trailing 4th dimension of length 1 is accepted), slope and
//! intercept scaling, and sform/qform transforms. Label volumes are written as
//! gzip-compressed `u8` with the transform stored in the sform rows.

use crate::core::errors::{SegError, SegResult};
use crate::domain::source::SpatialTransform;
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use ndarray::{Array3, ArrayView3, ShapeBuilder};
use std::io::{Read, Write};

const HEADER_SIZE: usize = 348;
const DATA_OFFSET: usize = 352;
const MAGIC_SINGLE_FILE: &[u8; 4] = b"n+1\0";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
/// Largest header plus voxel payload accepted, compressed or not.
const MAX_DECODED_BYTES: usize = 1 << 31;

const DT_UINT8: i16 = 2;
const DT_INT16: i16 = 4;
const DT_INT32: i16 = 8;
const DT_FLOAT32: i16 = 16;
const DT_FLOAT64: i16 = 64;
const DT_INT8: i16 = 256;
const DT_UINT16: i16 = 512;
const DT_UINT32: i16 = 768;

/// NIFTI_XFORM_ALIGNED_ANAT
const XFORM_ALIGNED: i16 = 2;

/// A decoded NIfTI volume.
#[derive(Debug, Clone)]
pub struct NiftiVolume {
    /// Scaled voxel values, shape (X, Y, Z). Rank-2 files have Z = 1.
    pub data: Array3<f32>,
    /// Voxel-to-world transform, if the header declares one.
    pub transform: Option<SpatialTransform>,
    /// Voxel spacing along X, Y and Z.
    pub voxel_size: [f32; 3],
}

struct Header<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl<'a> Header<'a> {
    fn parse(bytes: &'a [u8]) -> SegResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(corrupt(format!(
                "file is {} bytes, shorter than a NIfTI-1 header",
                bytes.len()
            )));
        }
        let size = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let big_endian = if i32::from_le_bytes(size) == HEADER_SIZE as i32 {
            false
        } else if i32::from_be_bytes(size) == HEADER_SIZE as i32 {
            true
        } else {
            return Err(corrupt("sizeof_hdr is not 348"));
        };
        if &bytes[344..348] != MAGIC_SINGLE_FILE {
            return Err(corrupt("missing single-file NIfTI-1 magic"));
        }
        Ok(Self { bytes, big_endian })
    }

    fn array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[offset..offset + N]);
        out
    }

    fn i16(&self, offset: usize) -> i16 {
        let raw = self.array::<2>(offset);
        if self.big_endian {
            i16::from_be_bytes(raw)
        } else {
            i16::from_le_bytes(raw)
        }
    }

    fn f32(&self, offset: usize) -> f32 {
        let raw = self.array::<4>(offset);
        if self.big_endian {
            f32::from_be_bytes(raw)
        } else {
            f32::from_le_bytes(raw)
        }
    }

    fn dims(&self) -> SegResult<[usize; 3]> {
        let rank = self.i16(40);
        if !(2..=7).contains(&rank) {
            return Err(corrupt(format!("unsupported rank {}", rank)));
        }
        let mut dims = [1usize; 7];
        for (i, dim) in dims.iter_mut().enumerate().take(rank as usize) {
            let value = self.i16(42 + 2 * i);
            if value < 1 {
                return Err(corrupt(format!("dimension {} has length {}", i + 1, value)));
            }
            *dim = value as usize;
        }
        if dims[3..].iter().any(|&d| d > 1) {
            return Err(SegError::unsupported_format(
                ".nii",
                format!("time series and vector volumes are not supported (dims {:?})", dims),
            ));
        }
        Ok([dims[0], dims[1], dims[2]])
    }

    /// Byte range `(vox_offset, end)` of the voxel payload.
    fn data_extent(&self) -> SegResult<(usize, usize)> {
        let [x, y, z] = self.dims()?;
        let width = bytes_per_voxel(self.i16(70))?;
        let vox_offset = self.f32(108);
        if !vox_offset.is_finite()
            || vox_offset < HEADER_SIZE as f32
            || f64::from(vox_offset) > MAX_DECODED_BYTES as f64
        {
            return Err(corrupt(format!("invalid vox_offset {}", vox_offset)));
        }
        let vox_offset = vox_offset as usize;
        let end = x
            .checked_mul(y)
            .and_then(|n| n.checked_mul(z))
            .and_then(|n| n.checked_mul(width))
            .and_then(|n| n.checked_add(vox_offset))
            .filter(|&end| end <= MAX_DECODED_BYTES)
            .ok_or_else(|| {
                corrupt(format!(
                    "declared volume {}x{}x{} exceeds the supported size",
                    x, y, z
                ))
            })?;
        Ok((vox_offset, end))
    }

    fn pixdim(&self, i: usize) -> f32 {
        self.f32(76 + 4 * i)
    }

    fn transform(&self) -> Option<SpatialTransform> {
        if self.i16(254) > 0 {
            let mut m = SpatialTransform::identity().0;
            for (r, row) in m.iter_mut().take(3).enumerate() {
                for (c, value) in row.iter_mut().enumerate() {
                    *value = f64::from(self.f32(280 + 16 * r + 4 * c));
                }
            }
            return Some(SpatialTransform(m));
        }
        if self.i16(252) > 0 {
            return Some(self.qform());
        }
        None
    }

    fn qform(&self) -> SpatialTransform {
        let b = f64::from(self.f32(256));
        let c = f64::from(self.f32(260));
        let d = f64::from(self.f32(264));
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let qfac = if self.pixdim(0) < 0.0 { -1.0 } else { 1.0 };
        let spacing = [
            f64::from(self.pixdim(1)),
            f64::from(self.pixdim(2)),
            f64::from(self.pixdim(3)) * qfac,
        ];
        let rotation = [
            [
                a * a + b * b - c * c - d * d,
                2.0 * (b * c - a * d),
                2.0 * (b * d + a * c),
            ],
            [
                2.0 * (b * c + a * d),
                a * a + c * c - b * b - d * d,
                2.0 * (c * d - a * b),
            ],
            [
                2.0 * (b * d - a * c),
                2.0 * (c * d + a * b),
                a * a + d * d - b * b - c * c,
            ],
        ];
        let offset = [
            f64::from(self.f32(268)),
            f64::from(self.f32(272)),
            f64::from(self.f32(276)),
        ];
        let mut m = SpatialTransform::identity().0;
        for r in 0..3 {
            for c in 0..3 {
                m[r][c] = rotation[r][c] * spacing[c];
            }
            m[r][3] = offset[r];
        }
        SpatialTransform(m)
    }
}

fn corrupt(message: impl Into<String>) -> SegError {
    SegError::unsupported_format(".nii", message)
}

/// Returns `true` if the buffer starts with the gzip magic bytes.
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

/// Decodes a NIfTI-1 file, gzip-compressed or not.
///
/// # Errors
///
/// Returns [`SegError::UnsupportedFormat`] for truncated or malformed files,
/// unsupported data types, and volumes with more than three non-trivial axes.
pub fn read_nifti(bytes: &[u8]) -> SegResult<NiftiVolume> {
    let decompressed;
    let bytes = if is_gzip(bytes) {
        decompressed = inflate_bounded(bytes)?;
        decompressed.as_slice()
    } else {
        bytes
    };

    let header = Header::parse(bytes)?;
    let [x, y, z] = header.dims()?;
    let datatype = header.i16(70);
    let (vox_offset, end) = header.data_extent()?;
    if bytes.len() < end {
        return Err(corrupt(format!(
            "voxel data truncated: need {} bytes, have {}",
            end,
            bytes.len()
        )));
    }
    let mut values = decode_voxels(&bytes[vox_offset..end], datatype, header.big_endian);

    let slope = header.f32(112);
    let intercept = header.f32(116);
    if slope.is_finite() && slope != 0.0 && (slope != 1.0 || intercept != 0.0) {
        let intercept = if intercept.is_finite() { intercept } else { 0.0 };
        values.iter_mut().for_each(|v| *v = *v * slope + intercept);
    }

    let data = Array3::from_shape_vec((x, y, z).f(), values)?
        .as_standard_layout()
        .into_owned();

    tracing::debug!(
        "decoded NIfTI volume {:?}, datatype {}, {} endian",
        data.dim(),
        datatype,
        if header.big_endian { "big" } else { "little" }
    );

    Ok(NiftiVolume {
        data,
        transform: header.transform(),
        voxel_size: [header.pixdim(1), header.pixdim(2), header.pixdim(3)],
    })
}

/// Inflates only as much of the stream as the header declares.
fn inflate_bounded(compressed: &[u8]) -> SegResult<Vec<u8>> {
    let gzip_error = |e: std::io::Error| corrupt(format!("gzip stream is corrupt: {}", e));
    let mut decoder = GzDecoder::new(compressed);
    let mut buffer = Vec::with_capacity(HEADER_SIZE);
    decoder
        .by_ref()
        .take(HEADER_SIZE as u64)
        .read_to_end(&mut buffer)
        .map_err(gzip_error)?;
    let (_, end) = Header::parse(&buffer)?.data_extent()?;
    let remaining = end.saturating_sub(buffer.len()) as u64;
    decoder
        .by_ref()
        .take(remaining)
        .read_to_end(&mut buffer)
        .map_err(gzip_error)?;
    Ok(buffer)
}

fn bytes_per_voxel(datatype: i16) -> SegResult<usize> {
    match datatype {
        DT_UINT8 | DT_INT8 => Ok(1),
        DT_INT16 | DT_UINT16 => Ok(2),
        DT_INT32 | DT_UINT32 | DT_FLOAT32 => Ok(4),
        DT_FLOAT64 => Ok(8),
        other => Err(corrupt(format!("unsupported NIfTI datatype {}", other))),
    }
}

fn decode_voxels(raw: &[u8], datatype: i16, big_endian: bool) -> Vec<f32> {
    macro_rules! decode {
        ($ty:ty, $n:expr) => {
            raw.chunks_exact($n)
                .map(|chunk| {
                    let mut buf = [0u8; $n];
                    buf.copy_from_slice(chunk);
                    let value = if big_endian {
                        <$ty>::from_be_bytes(buf)
                    } else {
                        <$ty>::from_le_bytes(buf)
                    };
                    value as f32
                })
                .collect()
        };
    }
    match datatype {
        DT_UINT8 => raw.iter().map(|&v| f32::from(v)).collect(),
        DT_INT8 => raw.iter().map(|&v| f32::from(v as i8)).collect(),
        DT_INT16 => decode!(i16, 2),
        DT_UINT16 => decode!(u16, 2),
        DT_INT32 => decode!(i32, 4),
        DT_UINT32 => decode!(u32, 4),
        DT_FLOAT32 => decode!(f32, 4),
        DT_FLOAT64 => decode!(f64, 8),
        _ => Vec::new(),
    }
}

/// Encodes a (X, Y, Z) label volume as a gzip-compressed NIfTI-1 file.
///
/// The transform is written as the sform; voxel spacing is taken from the
/// lengths of its columns.
///
/// # Errors
///
/// Returns a validation error if any axis exceeds the format's `i16` limit.
pub fn write_nifti_labels(labels: ArrayView3<'_, u8>, transform: &SpatialTransform) -> SegResult<Vec<u8>> {
    let (x, y, z) = labels.dim();
    let mut dims = [1i16; 8];
    dims[0] = 3;
    for (slot, len) in dims[1..4].iter_mut().zip([x, y, z]) {
        *slot = i16::try_from(len).map_err(|_| {
            SegError::validation(format!("axis length {} exceeds the NIfTI-1 limit", len))
        })?;
    }

    let mut header = vec![0u8; DATA_OFFSET];
    let put = |buf: &mut Vec<u8>, offset: usize, bytes: &[u8]| {
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    };
    put(&mut header, 0, &(HEADER_SIZE as i32).to_le_bytes());
    for (i, dim) in dims.iter().enumerate() {
        put(&mut header, 40 + 2 * i, &dim.to_le_bytes());
    }
    put(&mut header, 70, &DT_UINT8.to_le_bytes());
    put(&mut header, 72, &8i16.to_le_bytes());

    let mut pixdim = [1.0f32; 8];
    for (axis, slot) in pixdim[1..4].iter_mut().enumerate() {
        let norm = transform.column_norm(axis) as f32;
        *slot = if norm > 0.0 { norm } else { 1.0 };
    }
    for (i, value) in pixdim.iter().enumerate() {
        put(&mut header, 76 + 4 * i, &value.to_le_bytes());
    }
    put(&mut header, 108, &(DATA_OFFSET as f32).to_le_bytes());
    put(&mut header, 112, &1.0f32.to_le_bytes());
    put(&mut header, 116, &0.0f32.to_le_bytes());
    // Millimetres and seconds.
    header[123] = 2 | 8;
    put(&mut header, 254, &XFORM_ALIGNED.to_le_bytes());
    for r in 0..3 {
        let row = transform.row(r);
        for (c, value) in row.iter().enumerate() {
            put(&mut header, 280 + 16 * r + 4 * c, &(*value as f32).to_le_bytes());
        }
    }
    put(&mut header, 344, MAGIC_SINGLE_FILE);

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&header)?;
    // Fortran order: X varies fastest.
    let voxels: Vec<u8> = labels.t().iter().copied().collect();
    encoder.write_all(&voxels)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_header(dims: &[i16], datatype: i16, bitpix: i16) -> Vec<u8> {
        let mut header = vec![0u8; DATA_OFFSET];
        header[0..4].copy_from_slice(&348i32.to_le_bytes());
        header[40..42].copy_from_slice(&(dims.len() as i16).to_le_bytes());
        for (i, d) in dims.iter().enumerate() {
            header[42 + 2 * i..44 + 2 * i].copy_from_slice(&d.to_le_bytes());
        }
        header[70..72].copy_from_slice(&datatype.to_le_bytes());
        header[72..74].copy_from_slice(&bitpix.to_le_bytes());
        header[108..112].copy_from_slice(&352f32.to_le_bytes());
        header[344..348].copy_from_slice(MAGIC_SINGLE_FILE);
        header
    }

    #[test]
    fn test_labels_round_trip_with_transform() {
        let labels = Array3::from_shape_fn((3, 4, 2), |(i, j, k)| (i + 2 * j + 5 * k) as u8);
        let mut transform = SpatialTransform::identity();
        transform.0[0][0] = 0.5;
        transform.0[1][1] = 0.75;
        transform.0[2][3] = -12.0;

        let bytes = write_nifti_labels(labels.view(), &transform).unwrap();
        assert!(is_gzip(&bytes));

        let volume = read_nifti(&bytes).unwrap();
        assert_eq!(volume.data.dim(), (3, 4, 2));
        assert_eq!(volume.data.mapv(|v| v as u8), labels);
        assert_eq!(volume.transform, Some(transform));
        assert_eq!(volume.voxel_size, [0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_int16_with_scaling_in_fortran_order() {
        let mut bytes = raw_header(&[2, 2, 1], DT_INT16, 16);
        bytes[112..116].copy_from_slice(&2f32.to_le_bytes());
        bytes[116..120].copy_from_slice(&1f32.to_le_bytes());
        for v in [1i16, 2, 3, 4] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let volume = read_nifti(&bytes).unwrap();
        assert_eq!(volume.data.dim(), (2, 2, 1));
        // X varies fastest on disk.
        assert_eq!(volume.data[[0, 0, 0]], 3.0);
        assert_eq!(volume.data[[1, 0, 0]], 5.0);
        assert_eq!(volume.data[[0, 1, 0]], 7.0);
        assert_eq!(volume.data[[1, 1, 0]], 9.0);
        assert!(volume.transform.is_none());
    }

    #[test]
    fn test_rank_two_becomes_single_slice() {
        let mut bytes = raw_header(&[3, 2], DT_UINT8, 8);
        bytes.extend_from_slice(&[0, 1, 2, 3, 4, 5]);
        let volume = read_nifti(&bytes).unwrap();
        assert_eq!(volume.data.dim(), (3, 2, 1));
    }

    #[test]
    fn test_qform_from_identity_quaternion() {
        let mut bytes = raw_header(&[1, 1, 1], DT_FLOAT32, 32);
        bytes[252..254].copy_from_slice(&1i16.to_le_bytes());
        for (i, v) in [1.0f32, 2.0, 3.0, 4.0].iter().enumerate() {
            bytes[76 + 4 * i..80 + 4 * i].copy_from_slice(&v.to_le_bytes());
        }
        bytes[268..272].copy_from_slice(&10f32.to_le_bytes());
        bytes.extend_from_slice(&7f32.to_le_bytes());

        let volume = read_nifti(&bytes).unwrap();
        let t = volume.transform.unwrap();
        assert_eq!(t.row(0), [2.0, 0.0, 0.0, 10.0]);
        assert_eq!(t.row(1), [0.0, 3.0, 0.0, 0.0]);
        assert_eq!(t.row(2), [0.0, 0.0, 4.0, 0.0]);
        assert_eq!(volume.data[[0, 0, 0]], 7.0);
    }

    #[test]
    fn test_time_series_rejected() {
        let mut bytes = raw_header(&[2, 2, 2, 3], DT_UINT8, 8);
        bytes.extend_from_slice(&[0u8; 24]);
        let err = read_nifti(&bytes).unwrap_err();
        assert!(matches!(err, SegError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_truncated_inputs_rejected() {
        assert!(read_nifti(&[0u8; 10]).is_err());
        let bytes = raw_header(&[4, 4, 4], DT_UINT8, 8);
        assert!(matches!(
            read_nifti(&bytes).unwrap_err(),
            SegError::UnsupportedFormat { .. }
        ));
        assert!(read_nifti(&[0x1f, 0x8b, 0, 1, 2]).is_err());
    }

    #[test]
    fn test_huge_vox_offset_rejected() {
        for offset in [1.0e30f32, f32::MAX, 4.0e9] {
            let mut bytes = raw_header(&[2, 2, 2], DT_UINT8, 8);
            bytes[108..112].copy_from_slice(&offset.to_le_bytes());
            bytes.extend_from_slice(&[0u8; 8]);
            assert!(matches!(
                read_nifti(&bytes).unwrap_err(),
                SegError::UnsupportedFormat { .. }
            ));
        }
    }

    #[test]
    fn test_oversized_declared_volume_rejected() {
        let mut bytes = raw_header(&[i16::MAX, i16::MAX, i16::MAX], DT_FLOAT64, 64);
        bytes.extend_from_slice(&[0u8; 64]);
        assert!(matches!(
            read_nifti(&bytes).unwrap_err(),
            SegError::UnsupportedFormat { .. }
        ));
    }

    #[test]
    fn test_gzip_inflation_stops_at_declared_size() {
        let mut raw = raw_header(&[2, 2, 1], DT_UINT8, 8);
        raw.extend_from_slice(&[1, 2, 3, 4]);
        // Trailing payload far beyond the declared voxel data.
        raw.extend(std::iter::repeat_n(0u8, 8 * 1024 * 1024));
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let compressed = encoder.finish().unwrap();

        let inflated = inflate_bounded(&compressed).unwrap();
        assert_eq!(inflated.len(), DATA_OFFSET + 4);
        let volume = read_nifti(&compressed).unwrap();
        assert_eq!(volume.data.dim(), (2, 2, 1));
        assert_eq!(volume.data[[1, 1, 0]], 4.0);
    }
}
