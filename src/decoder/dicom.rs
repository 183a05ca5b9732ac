use std::path::Path;

use dicom::object::{FileDicomObject, InMemDicomObject, OpenFileOptions, open_file};
use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder, VoiLutOption};
use dicom_dictionary_std::tags;
use ndarray::{Array2, s};

use super::raster::file_key;
use crate::error::DecodeError;
use crate::slice::RawSlice;
use crate::windowing::Window;

const UNREADABLE: &str = "modality LUT or pixel data unreadable";

type DicomObject = FileDicomObject<InMemDicomObject>;

/// Header attributes used to order the slices of a series.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DicomHeader {
    pub series_instance_uid: Option<String>,
    pub instance_number: Option<i32>,
    pub position_z: Option<f32>,
    pub slice_thickness: Option<f32>,
}

/// Reads the header of a DICOM file, stopping before the pixel data.
pub fn read_header(path: &Path) -> Result<DicomHeader, DecodeError> {
    let object = OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|_| unreadable(path))?;

    Ok(DicomHeader {
        series_instance_uid: object
            .element(tags::SERIES_INSTANCE_UID)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|uid| uid.trim_end_matches(['\0', ' ']).to_string()),
        instance_number: instance_number(&object),
        position_z: object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()
            .and_then(|e| e.to_multi_float32().ok())
            .and_then(|pos| pos.get(2).copied()),
        slice_thickness: object
            .element(tags::SLICE_THICKNESS)
            .ok()
            .and_then(|e| e.to_float32().ok()),
    })
}

/// Decodes one slice: stored values, then the modality LUT (rescale
/// slope/intercept), then the window, then the 8-bit parity division.
///
/// Only single-frame grayscale files are slices; multi-frame or
/// multi-sample files are rejected as unsupported.
pub(super) fn decode(path: &Path, index: usize, window: &Window) -> Result<RawSlice, DecodeError> {
    let object = open_file(path).map_err(|_| unreadable(path))?;
    ensure_single_grayscale_frame(path, &object)?;

    let (slope, intercept) = rescale(&object).ok_or_else(|| unreadable(path))?;
    let mut pixels = stored_pixels(&object).ok_or_else(|| unreadable(path))?;

    pixels.par_mapv_inplace(|v| v * slope + intercept);
    window.apply_in_place(&mut pixels);
    window.reduce_to_8bit(&mut pixels);

    let index = instance_number(&object)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(index);
    let bit_depth = object
        .element(tags::BITS_STORED)
        .ok()
        .and_then(|e| e.to_int::<u16>().ok())
        .unwrap_or(16);

    Ok(RawSlice::new(pixels, index, bit_depth, file_key(path)).with_spacing(pixel_spacing(&object)))
}

fn ensure_single_grayscale_frame(path: &Path, object: &DicomObject) -> Result<(), DecodeError> {
    let frames = object
        .element_opt(tags::NUMBER_OF_FRAMES)
        .ok()
        .flatten()
        .and_then(|e| e.to_int::<u32>().ok())
        .unwrap_or(1);
    let samples = object
        .element_opt(tags::SAMPLES_PER_PIXEL)
        .ok()
        .flatten()
        .and_then(|e| e.to_int::<u16>().ok())
        .unwrap_or(1);

    let reason = if frames > 1 {
        format!("{frames} frames per file")
    } else if samples != 1 {
        format!("{samples} samples per pixel")
    } else {
        return Ok(());
    };
    Err(DecodeError::Unsupported {
        path: path.to_path_buf(),
        reason,
    })
}

fn unreadable(path: &Path) -> DecodeError {
    DecodeError::Dicom {
        path: path.to_path_buf(),
        reason: UNREADABLE,
    }
}

fn stored_pixels(object: &DicomObject) -> Option<Array2<f32>> {
    let pixel_data = object.decode_pixel_data().ok()?;
    let options = ConvertOptions::new()
        .with_modality_lut(ModalityLutOption::None)
        .with_voi_lut(VoiLutOption::Identity);
    pixel_data
        .to_ndarray_with_options::<f32>(&options)
        .ok()
        .map(|arr| arr.slice_move(s![0, .., .., 0]))
}

/// Rescale slope and intercept, defaulting to identity when absent.
/// Present but unparseable values are an error.
fn rescale(object: &DicomObject) -> Option<(f32, f32)> {
    let attr = |tag, default| match object.element_opt(tag) {
        Ok(Some(element)) => element.to_float32().ok(),
        Ok(None) => Some(default),
        Err(_) => None,
    };
    Some((attr(tags::RESCALE_SLOPE, 1.0)?, attr(tags::RESCALE_INTERCEPT, 0.0)?))
}

fn instance_number(object: &DicomObject) -> Option<i32> {
    object
        .element(tags::INSTANCE_NUMBER)
        .ok()?
        .to_int::<i32>()
        .ok()
}

fn pixel_spacing(object: &DicomObject) -> Option<(f32, f32)> {
    let spacing = object
        .element(tags::PIXEL_SPACING)
        .ok()?
        .to_multi_float32()
        .ok()?;
    Some((*spacing.first()?, *spacing.get(1)?))
}
