//! MetaImage (`.mha` / `.mhd`) volume containers.
//!
//! Only the subset needed for CT volumes and overlay stacks is handled:
//! 2D or 3D images, scalar or multi-channel samples, either byte order,
//! optional zlib compression, inline (`LOCAL`) or detached data files.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use image::{DynamicImage, ImageBuffer};
use ndarray::{Array2, Array3, Axis, ErrorKind, ShapeError};
use rayon::prelude::*;
use tracing::debug;

use super::DecodeOptions;
use super::raster::file_key;
use crate::enums::ContainerWindowing;
use crate::error::DecodeError;
use crate::slice::RawSlice;

pub const EXTENSIONS: &[&str] = &["mha", "mhd"];

/// Upper bound on what a zlib stream can inflate to per input byte.
const ZLIB_MAX_RATIO: usize = 1032;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    UChar,
    Char,
    UShort,
    Short,
    UInt,
    Int,
    Float,
    Double,
}

impl ElementType {
    fn parse(tag: &str) -> Option<Self> {
        Some(match tag {
            "MET_UCHAR" => Self::UChar,
            "MET_CHAR" => Self::Char,
            "MET_USHORT" => Self::UShort,
            "MET_SHORT" => Self::Short,
            "MET_UINT" => Self::UInt,
            "MET_INT" => Self::Int,
            "MET_FLOAT" => Self::Float,
            "MET_DOUBLE" => Self::Double,
            _ => return None,
        })
    }

    fn tag(&self) -> &'static str {
        match self {
            Self::UChar => "MET_UCHAR",
            Self::Char => "MET_CHAR",
            Self::UShort => "MET_USHORT",
            Self::Short => "MET_SHORT",
            Self::UInt => "MET_UINT",
            Self::Int => "MET_INT",
            Self::Float => "MET_FLOAT",
            Self::Double => "MET_DOUBLE",
        }
    }

    /// Bytes per sample.
    pub fn size(&self) -> usize {
        match self {
            Self::UChar | Self::Char => 1,
            Self::UShort | Self::Short => 2,
            Self::UInt | Self::Int | Self::Float => 4,
            Self::Double => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaImageHeader {
    /// Extent per axis, fastest first: (x, y, z).
    pub dim_size: [usize; 3],
    /// Spacing per axis, same order as `dim_size`.
    pub spacing: Option<[f32; 3]>,
    pub element_type: ElementType,
    pub channels: usize,
    pub big_endian: bool,
    pub compressed: bool,
    /// `None` for inline (`LOCAL`) data.
    pub data_file: Option<PathBuf>,
    header_size: i64,
}

impl MetaImageHeader {
    pub fn new(dim_size: [usize; 3], element_type: ElementType, channels: usize) -> Self {
        Self {
            dim_size,
            spacing: None,
            element_type,
            channels,
            big_endian: false,
            compressed: false,
            data_file: None,
            header_size: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.dim_size[0]
    }

    pub fn height(&self) -> usize {
        self.dim_size[1]
    }

    pub fn depth(&self) -> usize {
        self.dim_size[2]
    }

    /// Bytes per plane, `None` when it does not fit in memory.
    fn plane_len(&self) -> Option<usize> {
        self.width()
            .checked_mul(self.height())?
            .checked_mul(self.channels)?
            .checked_mul(self.element_type.size())
    }

    /// Bytes of sample data, `None` when it does not fit in memory.
    pub fn data_len(&self) -> Option<usize> {
        self.plane_len()?.checked_mul(self.depth())
    }

    /// (row, column) spacing.
    pub fn in_plane_spacing(&self) -> Option<(f32, f32)> {
        self.spacing.map(|s| (s[1], s[0]))
    }

    pub fn slice_spacing(&self) -> Option<f32> {
        self.spacing.map(|s| s[2])
    }

    fn render(&self) -> String {
        let [x, y, z] = self.dim_size;
        let spacing = self.spacing.unwrap_or([1.0; 3]);
        format!(
            "ObjectType = Image\n\
             NDims = 3\n\
             BinaryData = True\n\
             BinaryDataByteOrderMSB = {}\n\
             CompressedData = False\n\
             DimSize = {x} {y} {z}\n\
             ElementSpacing = {} {} {}\n\
             ElementNumberOfChannels = {}\n\
             ElementType = {}\n\
             ElementDataFile = LOCAL\n",
            if self.big_endian { "True" } else { "False" },
            spacing[0],
            spacing[1],
            spacing[2],
            self.channels,
            self.element_type.tag(),
        )
    }
}

/// Parsed header and the uncompressed sample bytes.
#[derive(Debug, Clone)]
pub struct MetaImage {
    pub header: MetaImageHeader,
    bytes: Vec<u8>,
}

impl MetaImage {
    /// Wraps `bytes` laid out x fastest, then channel-interleaved samples per
    /// voxel, then y, then z, as MetaImage stores them.
    pub fn new(header: MetaImageHeader, bytes: Vec<u8>) -> Result<Self, String> {
        let data_len = header
            .data_len()
            .ok_or_else(|| format!("DimSize {:?} too large", header.dim_size))?;
        if bytes.len() != data_len {
            return Err(format!("expected {data_len} data bytes, got {}", bytes.len()));
        }
        Ok(Self { header, bytes })
    }

    /// Reads only the header; returns it with the byte offset of inline data.
    pub fn read_header(path: &Path) -> Result<(MetaImageHeader, u64), DecodeError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut fields = Vec::new();
        let mut offset = 0u64;
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                return Err(DecodeError::container(path, "missing ElementDataFile"));
            }
            offset += read as u64;
            let text = String::from_utf8_lossy(&line);
            let Some((key, value)) = text.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim().to_string(), value.trim().to_string());
            let last = key == "ElementDataFile";
            fields.push((key, value));
            if last {
                break;
            }
        }

        Ok((parse_header(path, &fields)?, offset))
    }

    pub fn read(path: &Path) -> Result<Self, DecodeError> {
        let (header, offset) = Self::read_header(path)?;
        let data_len = header
            .data_len()
            .ok_or_else(|| DecodeError::container(path, "DimSize too large"))?;

        let raw = match &header.data_file {
            None => {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(offset))?;
                let mut raw = Vec::new();
                file.read_to_end(&mut raw)?;
                raw
            }
            Some(data_file) => {
                let data_path = path.parent().unwrap_or(Path::new(".")).join(data_file);
                std::fs::read(data_path)?
            }
        };

        let truncated = |found: usize| {
            DecodeError::container(
                path,
                format!("truncated data: expected {data_len} bytes, found {found}"),
            )
        };

        let mut bytes = if header.compressed {
            if raw.len().saturating_mul(ZLIB_MAX_RATIO) < data_len {
                return Err(truncated(raw.len()));
            }
            let mut inflated = Vec::with_capacity(data_len.min(raw.len()));
            ZlibDecoder::new(raw.as_slice())
                .take(data_len as u64)
                .read_to_end(&mut inflated)
                .map_err(|e| DecodeError::container(path, format!("zlib: {e}")))?;
            inflated
        } else {
            skip_header_bytes(raw, header.header_size, data_len)
        };

        if bytes.len() < data_len {
            return Err(truncated(bytes.len()));
        }
        bytes.truncate(data_len);
        Ok(Self { header, bytes })
    }

    /// Writes the image with inline data, replacing `path` atomically.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(directory)?;
        let mut header = self.header.clone();
        header.compressed = false;
        file.write_all(header.render().as_bytes())?;
        file.write_all(&self.bytes)?;
        file.flush()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Samples of plane `z` as (height, width, channels).
    ///
    /// Fails with [`ErrorKind::OutOfBounds`] when `z` is past the last plane.
    pub fn plane(&self, z: usize) -> Result<Array3<f32>, ShapeError> {
        let h = &self.header;
        let bytes = self
            .plane_bytes(z)
            .ok_or_else(|| ShapeError::from_kind(ErrorKind::OutOfBounds))?;
        let samples = decode_samples(bytes, h.element_type, h.big_endian);
        Array3::from_shape_vec((h.height(), h.width(), h.channels), samples)
    }

    /// Raw bytes of plane `z`, only meaningful as pixels for `MET_UCHAR` data.
    fn plane_bytes(&self, z: usize) -> Option<&[u8]> {
        let len = self.header.plane_len()?;
        let start = z.checked_mul(len)?;
        self.bytes.get(start..start.checked_add(len)?)
    }
}

fn parse_header(path: &Path, fields: &[(String, String)]) -> Result<MetaImageHeader, DecodeError> {
    let get = |key: &str| {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    let flag = |key: &str| get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let numbers = |key: &str| -> Result<Option<Vec<f64>>, DecodeError> {
        get(key)
            .map(|v| {
                v.split_whitespace()
                    .map(|n| n.parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| DecodeError::container(path, format!("{key}: {e}")))
            })
            .transpose()
    };

    let dims = numbers("DimSize")?.ok_or_else(|| DecodeError::container(path, "missing DimSize"))?;
    let ndims = get("NDims")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(dims.len());
    if !(2..=3).contains(&ndims) || dims.len() != ndims {
        return Err(DecodeError::container(
            path,
            format!("unsupported dimensionality {ndims} with DimSize {dims:?}"),
        ));
    }
    if dims.iter().any(|&d| !d.is_finite() || d < 1.0 || d.fract() != 0.0) {
        return Err(DecodeError::container(path, format!("invalid DimSize {dims:?}")));
    }
    let dim_size = [
        dims[0] as usize,
        dims[1] as usize,
        dims.get(2).map_or(1, |&d| d as usize),
    ];

    let spacing = numbers("ElementSpacing")?
        .or(numbers("ElementSize")?)
        .filter(|s| s.len() == ndims)
        .map(|s| [s[0] as f32, s[1] as f32, s.get(2).map_or(1.0, |&z| z as f32)]);

    let element_type = get("ElementType")
        .and_then(ElementType::parse)
        .ok_or_else(|| {
            DecodeError::container(path, format!("unsupported ElementType {:?}", get("ElementType")))
        })?;

    let channels = match get("ElementNumberOfChannels") {
        Some(v) => v
            .parse::<usize>()
            .ok()
            .filter(|&c| c >= 1)
            .ok_or_else(|| DecodeError::container(path, format!("invalid channel count {v}")))?,
        None => 1,
    };

    let data_file = match get("ElementDataFile") {
        Some(v) if v.eq_ignore_ascii_case("LOCAL") => None,
        Some(v) => Some(PathBuf::from(v)),
        None => return Err(DecodeError::container(path, "missing ElementDataFile")),
    };

    let header = MetaImageHeader {
        dim_size,
        spacing,
        element_type,
        channels,
        big_endian: flag("BinaryDataByteOrderMSB") || flag("ElementByteOrderMSB"),
        compressed: flag("CompressedData"),
        data_file,
        header_size: get("HeaderSize")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0),
    };
    if dims.iter().any(|&d| d > usize::MAX as f64) || header.data_len().is_none() {
        return Err(DecodeError::container(path, "DimSize too large"));
    }
    Ok(header)
}

/// `HeaderSize = -1` means the data sits at the end of the file.
fn skip_header_bytes(mut raw: Vec<u8>, header_size: i64, data_len: usize) -> Vec<u8> {
    match header_size {
        -1 => raw.split_off(raw.len().saturating_sub(data_len)),
        n if n > 0 => raw.split_off((n as usize).min(raw.len())),
        _ => raw,
    }
}

fn decode_samples(bytes: &[u8], element_type: ElementType, big_endian: bool) -> Vec<f32> {
    match element_type {
        ElementType::UChar => bytes.iter().map(|&b| f32::from(b)).collect(),
        ElementType::Char => bytes.iter().map(|&b| f32::from(b as i8)).collect(),
        ElementType::UShort => samples(bytes, big_endian, |b| f32::from(u16::from_le_bytes(b))),
        ElementType::Short => samples(bytes, big_endian, |b| f32::from(i16::from_le_bytes(b))),
        ElementType::UInt => samples(bytes, big_endian, |b| u32::from_le_bytes(b) as f32),
        ElementType::Int => samples(bytes, big_endian, |b| i32::from_le_bytes(b) as f32),
        ElementType::Float => samples(bytes, big_endian, f32::from_le_bytes),
        ElementType::Double => samples(bytes, big_endian, |b| f64::from_le_bytes(b) as f32),
    }
}

/// Converts fixed-width samples, swapping big-endian input to little first.
fn samples<const N: usize>(
    bytes: &[u8],
    big_endian: bool,
    convert: impl Fn([u8; N]) -> f32,
) -> Vec<f32> {
    bytes
        .chunks_exact(N)
        .map(|chunk| {
            let mut raw = [0u8; N];
            raw.copy_from_slice(chunk);
            if big_endian {
                raw.reverse();
            }
            convert(raw)
        })
        .collect()
}

/// Decodes every plane of a container into slices.
///
/// Raw intensities are windowed and reduced to 8-bit parity. 8-bit
/// containers are display-ready; multi-channel planes are reduced to luma.
/// When the channel filter rejects the container's channel count, its
/// planes are skipped, which leaves nothing to decode.
pub(super) fn decode(path: &Path, options: &DecodeOptions) -> Result<Vec<RawSlice>, DecodeError> {
    let image = MetaImage::read(path)?;
    let header = &image.header;

    let channels = u8::try_from(header.channels).unwrap_or(u8::MAX);
    if !options.channel_filter.accepts(channels) {
        debug!(
            path = %path.display(),
            channels = header.channels,
            expected = ?options.channel_filter.expected_channels,
            planes = header.depth(),
            "skipping container planes with unexpected channel count"
        );
        return Err(DecodeError::NoConformingFrames(path.to_path_buf()));
    }

    let windowed = match options.container_windowing {
        ContainerWindowing::Auto => header.element_type != ElementType::UChar,
        ContainerWindowing::Always => true,
        ContainerWindowing::Never => false,
    };
    if header.channels > 1 && (windowed || header.element_type != ElementType::UChar) {
        return Err(DecodeError::Unsupported {
            path: path.to_path_buf(),
            reason: "multi-channel containers must hold display-ready MET_UCHAR samples"
                .to_string(),
        });
    }

    let key = file_key(path);
    let bit_depth = (header.element_type.size() * 8) as u16;
    let window = options.window;

    (0..header.depth())
        .into_par_iter()
        .map(|z| -> Result<RawSlice, DecodeError> {
            let pixels = if header.channels == 1 {
                let mut pixels = image
                    .plane(z)
                    .map_err(|e| DecodeError::container(path, e.to_string()))?
                    .index_axis_move(Axis(2), 0);
                if windowed {
                    window.apply_in_place(&mut pixels);
                    window.reduce_to_8bit(&mut pixels);
                }
                pixels
            } else {
                let bytes = image
                    .plane_bytes(z)
                    .ok_or_else(|| DecodeError::container(path, "plane out of range"))?;
                luma_plane(path, header, bytes)?
            };
            Ok(RawSlice::new(pixels, z, bit_depth, format!("{key}#{z:04}"))
                .with_spacing(header.in_plane_spacing()))
        })
        .collect()
}

fn luma_plane(path: &Path, header: &MetaImageHeader, bytes: &[u8]) -> Result<Array2<f32>, DecodeError> {
    let (w, h) = (header.width() as u32, header.height() as u32);
    let raw = bytes.to_vec();
    let malformed = || DecodeError::container(path, "plane does not match its dimensions");
    let image = match header.channels {
        2 => DynamicImage::ImageLumaA8(ImageBuffer::from_raw(w, h, raw).ok_or_else(malformed)?),
        3 => DynamicImage::ImageRgb8(ImageBuffer::from_raw(w, h, raw).ok_or_else(malformed)?),
        4 => DynamicImage::ImageRgba8(ImageBuffer::from_raw(w, h, raw).ok_or_else(malformed)?),
        n => {
            return Err(DecodeError::Unsupported {
                path: path.to_path_buf(),
                reason: format!("{n} channels per sample"),
            });
        }
    };
    let luma: Vec<f32> = image.to_luma8().into_raw().into_iter().map(f32::from).collect();
    Array2::from_shape_vec((h as usize, w as usize), luma).map_err(|_| malformed())
}
