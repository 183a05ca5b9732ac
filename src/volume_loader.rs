use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;
use web_time::Instant;

use crate::assembler::SeriesAssembler;
use crate::decoder::meta_image::{self, MetaImage};
use crate::decoder::{
    DecodeOptions, Decoder, DicomHeader, RASTER_EXTENSIONS, detect_format, has_extension,
    read_header,
};
use crate::enums::{SortBy, SourceFormat};
use crate::error::{DecodeError, GeometryError};
use crate::volume::Volume;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Resolves a study on disk into an assembled [`Volume`].
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeLoader {
    options: DecodeOptions,
    sort_by: SortBy,
}

impl VolumeLoader {
    pub fn new(options: DecodeOptions, sort_by: SortBy) -> Self {
        Self { options, sort_by }
    }

    /// Load a study from a directory of slices or a single volume container.
    ///
    /// The series id is the directory name or the container's file stem.
    /// `format` is detected from the path when not given.
    pub fn load(
        &self,
        path: impl AsRef<Path>,
        format: Option<SourceFormat>,
    ) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        let format = match format {
            Some(format) => format,
            None => detect_format(path)?,
        };
        match format {
            SourceFormat::VolumeContainer => self.load_container(path),
            SourceFormat::Raster | SourceFormat::Dicom => self.load_from_directory(path, format),
        }
    }

    /// Load every slice file of `format` found directly inside `path`.
    pub fn load_from_directory(
        &self,
        path: impl AsRef<Path>,
        format: SourceFormat,
    ) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        let extensions = match format {
            SourceFormat::Dicom => &["dcm"][..],
            SourceFormat::Raster => RASTER_EXTENSIONS,
            SourceFormat::VolumeContainer => meta_image::EXTENSIONS,
        };
        let paths: Vec<_> = fs::read_dir(path)
            .map_err(DecodeError::from)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| has_extension(path, extensions))
            .collect();

        if paths.is_empty() {
            return Err(DecodeError::NoValidImages(path.to_path_buf()).into());
        }

        self.load_from_file_paths(series_name(path), &paths, format)
    }

    /// Load the given slice files as one series, ordered per `sort_by`.
    pub fn load_from_file_paths(
        &self,
        series_id: impl Into<String>,
        paths: &[impl AsRef<Path>],
        format: SourceFormat,
    ) -> Result<Volume, VolumeLoaderError> {
        let started = Instant::now();
        let series_id = series_id.into();
        let mut paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let Some(first) = paths.first().cloned() else {
            return Err(DecodeError::NoValidImages(PathBuf::from(&series_id)).into());
        };

        let slice_spacing = if format == SourceFormat::Dicom {
            let headers = paths
                .par_iter()
                .map(|path| read_header(path))
                .collect::<Result<Vec<_>, _>>()?;
            let thickness = headers.iter().find_map(|h| h.slice_thickness);
            paths = Self::sort_dicom(paths, headers, self.sort_by);
            thickness
        } else {
            if self.sort_by != SortBy::None {
                paths.sort();
            }
            None
        };

        let decoder = Decoder::new(format, self.options);
        let slices: Vec<_> = paths
            .par_iter()
            .enumerate()
            .map(|(index, path)| decoder.decode(path, index))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        if slices.is_empty() {
            let parent = first.parent().unwrap_or(first.as_path()).to_path_buf();
            return Err(DecodeError::NoConformingFrames(parent).into());
        }
        let skipped = paths.len().saturating_sub(slices.len());

        let mut volume = SeriesAssembler::assemble(series_id, slices)?;
        volume.set_slice_spacing(slice_spacing);

        debug!(
            series = volume.series_id(),
            dim = ?volume.dim(),
            skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "assembled volume"
        );
        Ok(volume)
    }

    /// Load a single MetaImage container.
    pub fn load_container(&self, path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let started = Instant::now();
        let path = path.as_ref();
        let (header, _) = MetaImage::read_header(path)?;
        let slices = Decoder::VolumeContainer(self.options).decode(path, 0)?;

        let mut volume = SeriesAssembler::assemble(series_name(path), slices)?;
        volume.set_slice_spacing(header.slice_spacing());

        debug!(
            series = volume.series_id(),
            dim = ?volume.dim(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded volume container"
        );
        Ok(volume)
    }

    fn sort_dicom(paths: Vec<PathBuf>, headers: Vec<DicomHeader>, sort_by: SortBy) -> Vec<PathBuf> {
        let mut entries: Vec<_> = paths.into_iter().zip(headers).collect();
        match sort_by {
            SortBy::InstanceNumber => entries.sort_by(|a, b| {
                compare_keys(a.1.instance_number, b.1.instance_number).then_with(|| a.0.cmp(&b.0))
            }),
            // Descending z: head first, feet last.
            SortBy::ImagePositionPatient => entries.sort_by(|a, b| {
                compare_keys(b.1.position_z, a.1.position_z).then_with(|| a.0.cmp(&b.0))
            }),
            SortBy::FileName => entries.sort_by(|a, b| a.0.cmp(&b.0)),
            SortBy::None => {}
        }
        entries.into_iter().map(|(path, _)| path).collect()
    }
}

/// Missing keys sort after present ones.
fn compare_keys<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn series_name(path: &Path) -> String {
    let name = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };
    name.map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
