//! Synthetic CT slices shared by the unit and integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};

pub const SERIES_UID: &str = "1.2.840.99.1";

/// A 16-bit unsigned CT slice with intercept -2048 where every stored value
/// is `hu + 2048`. Slices sit 2.5 mm apart, head first, at 0.7 mm pixels.
pub fn ct_slice(instance: i32, (rows, columns): (u16, u16), hu: f32) -> InMemDicomObject {
    let stored = (hu + 2048.0) as u16;
    let mut object = InMemDicomObject::new_empty();
    put(&mut object, tags::SERIES_INSTANCE_UID, VR::UI, text(SERIES_UID));
    put(&mut object, tags::INSTANCE_NUMBER, VR::IS, text(&instance.to_string()));
    put(
        &mut object,
        tags::IMAGE_POSITION_PATIENT,
        VR::DS,
        text(&format!("0\\0\\{}", -(instance as f32) * 2.5)),
    );
    put(&mut object, tags::SLICE_THICKNESS, VR::DS, text("2.5"));
    put(&mut object, tags::PIXEL_SPACING, VR::DS, text("0.7\\0.7"));
    put(&mut object, tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16));
    put(&mut object, tags::PHOTOMETRIC_INTERPRETATION, VR::CS, text("MONOCHROME2"));
    put(&mut object, tags::ROWS, VR::US, PrimitiveValue::from(rows));
    put(&mut object, tags::COLUMNS, VR::US, PrimitiveValue::from(columns));
    put(&mut object, tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16));
    put(&mut object, tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16));
    put(&mut object, tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16));
    put(&mut object, tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16));
    put(&mut object, tags::RESCALE_INTERCEPT, VR::DS, text("-2048"));
    put(&mut object, tags::RESCALE_SLOPE, VR::DS, text("1"));
    let pixels = vec![stored; rows as usize * columns as usize];
    put(&mut object, tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(pixels.into()));
    object
}

/// Writes `object` as `dir/name` with explicit VR little endian.
pub fn save_slice(object: InMemDicomObject, instance: i32, dir: &Path, name: &str) -> PathBuf {
    let file = object
        .with_meta(
            FileMetaTableBuilder::new()
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(format!("{SERIES_UID}.{instance}"))
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN),
        )
        .unwrap();
    let path = dir.join(name);
    file.write_to_file(&path).unwrap();
    path
}

pub fn write_ct_slice(
    dir: &Path,
    name: &str,
    instance: i32,
    dims: (u16, u16),
    hu: f32,
) -> PathBuf {
    save_slice(ct_slice(instance, dims, hu), instance, dir, name)
}

pub fn put(object: &mut InMemDicomObject, tag: Tag, vr: VR, value: PrimitiveValue) {
    object.put(DataElement::new(tag, vr, value));
}

/// Text value padded to even length.
pub fn text(value: &str) -> PrimitiveValue {
    let mut value = value.to_string();
    if value.len() % 2 == 1 {
        value.push(' ');
    }
    PrimitiveValue::from(value)
}
