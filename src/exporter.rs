use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::{AnimationDecoder, Delay, DynamicImage, Frame};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::ExportError;
use crate::overlay::OverlayFrame;

/// An animation written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnimatedArtifact {
    pub path: PathBuf,
    pub frame_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceExporter {
    frame_delay_ms: u32,
}

impl Default for SequenceExporter {
    fn default() -> Self {
        Self { frame_delay_ms: 100 }
    }
}

impl SequenceExporter {
    pub fn new(frame_delay_ms: u32) -> Self {
        Self { frame_delay_ms }
    }

    /// Writes `frames` as a looping GIF at `directory/name.gif`.
    ///
    /// The animation is encoded into a temporary file beside the target and
    /// renamed over it, so readers see either the previous artifact or the
    /// complete new one.
    pub fn export(
        &self,
        frames: &[OverlayFrame],
        directory: impl AsRef<Path>,
        name: &str,
    ) -> Result<AnimatedArtifact, ExportError> {
        let directory = directory.as_ref();
        let first = frames.first().ok_or(ExportError::EmptySequence)?;
        let expected = first.dimensions();
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.dimensions() != expected)
        {
            return Err(ExportError::FrameSize {
                index,
                expected,
                found: frame.dimensions(),
            });
        }

        fs::create_dir_all(directory)?;
        let target = directory.join(format!("{name}.gif"));

        let mut staging = NamedTempFile::new_in(directory)?;
        {
            let mut encoder = GifEncoder::new(staging.as_file_mut());
            encoder.set_repeat(Repeat::Infinite)?;
            let delay = Delay::from_numer_denom_ms(self.frame_delay_ms, 1);
            encoder.encode_frames(frames.iter().map(|frame| {
                let rgba = DynamicImage::ImageRgb8(frame.image().clone()).into_rgba8();
                Frame::from_parts(rgba, 0, 0, delay)
            }))?;
        }
        staging.as_file().sync_all()?;
        staging.persist(&target).map_err(|e| ExportError::Io(e.error))?;

        info!(path = %target.display(), frames = frames.len(), "exported overlay animation");
        Ok(AnimatedArtifact {
            path: target,
            frame_count: frames.len(),
        })
    }
}

/// Number of frames in an animated GIF.
pub fn frame_count(path: impl AsRef<Path>) -> Result<usize, ExportError> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let decoder = GifDecoder::new(reader)?;
    let mut count = 0;
    for frame in decoder.into_frames() {
        frame?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::OverlayCompositor;
    use ndarray::Array2;

    fn frames(count: usize, (h, w): (usize, usize)) -> Vec<OverlayFrame> {
        (0..count)
            .map(|i| {
                let attention = Array2::from_elem((h, w), i as f32 / count as f32);
                OverlayCompositor::composite(attention.view(), 1.0)
            })
            .collect()
    }

    #[test]
    fn exports_into_nested_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a").join("b");

        let artifact = SequenceExporter::default()
            .export(&frames(4, (8, 6)), &out, "serie_x")
            .unwrap();
        assert_eq!(artifact.path, out.join("serie_x.gif"));
        assert_eq!(artifact.frame_count, 4);
        assert_eq!(frame_count(&artifact.path).unwrap(), 4);

        // Only the artifact remains; the staging file was renamed away.
        let entries: Vec<_> = fs::read_dir(&out).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn second_export_replaces_the_first() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SequenceExporter::new(50);
        exporter.export(&frames(3, (4, 4)), dir.path(), "s").unwrap();
        let artifact = exporter.export(&frames(7, (4, 4)), dir.path(), "s").unwrap();
        assert_eq!(frame_count(&artifact.path).unwrap(), 7);
    }

    #[test]
    fn rejects_empty_and_ragged_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = SequenceExporter::default();
        assert!(matches!(
            exporter.export(&[], dir.path(), "empty"),
            Err(ExportError::EmptySequence)
        ));

        let mut ragged = frames(2, (4, 4));
        ragged.extend(frames(1, (4, 5)));
        assert!(matches!(
            exporter.export(&ragged, dir.path(), "ragged"),
            Err(ExportError::FrameSize { index: 2, expected: (4, 4), found: (5, 4) })
        ));
        assert!(!dir.path().join("ragged.gif").exists());
    }

    #[test]
    fn unwritable_target_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"not a directory").unwrap();
        assert!(matches!(
            SequenceExporter::default().export(&frames(1, (2, 2)), &blocker, "x"),
            Err(ExportError::Io(_))
        ));
    }
}
