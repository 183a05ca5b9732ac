use serde::Deserialize;

/// On-disk representation of a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    /// Directory of single-frame raster images, one file per slice.
    Raster,
    /// Directory of DICOM files, one file per slice.
    Dicom,
    /// A single MetaImage volume (`.mha` / `.mhd`).
    VolumeContainer,
}

/// Ordering applied to the source units of a study before assembly.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortBy {
    /// DICOM InstanceNumber; non-DICOM sources fall back to file name.
    #[default]
    InstanceNumber,
    /// Z component of DICOM ImagePositionPatient, head first.
    ImagePositionPatient,
    /// Lexicographic file name.
    FileName,
    /// Directory listing order, untouched.
    None,
}

/// Whether volume container planes go through the intensity window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerWindowing {
    /// Window everything except 8-bit unsigned data, which is display-ready.
    #[default]
    Auto,
    Always,
    Never,
}
