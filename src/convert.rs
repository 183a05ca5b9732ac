//! Conversion of exported overlay animations into per-frame images and
//! back into a single multi-channel volume container.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage};
use tracing::{debug, info};

use crate::decoder::meta_image::{ElementType, MetaImage, MetaImageHeader};
use crate::decoder::{ChannelFilter, has_extension};
use crate::error::{ConvertError, DecodeError, GeometryError};

/// Writes every frame of `gif` to `out_dir/frame_NNN.png` as 8-bit RGB.
pub fn split_animation(
    gif: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>, ConvertError> {
    let (gif, out_dir) = (gif.as_ref(), out_dir.as_ref());
    fs::create_dir_all(out_dir)?;

    let decoder = GifDecoder::new(BufReader::new(File::open(gif)?))?;
    let mut written = Vec::new();
    for (index, frame) in decoder.into_frames().enumerate() {
        let rgb = DynamicImage::ImageRgba8(frame?.into_buffer()).into_rgb8();
        let path = out_dir.join(format!("frame_{index:03}.png"));
        rgb.save(&path)?;
        written.push(path);
    }

    info!(gif = %gif.display(), frames = written.len(), "split animation");
    Ok(written)
}

/// Stacks the `*.png` frames of `dir`, in file-name order, into one
/// `MET_UCHAR` container at `out_path`.
///
/// Frames whose native channel count the filter rejects are left out. The
/// container takes the channel count of the first kept frame. Returns the
/// number of stacked frames.
pub fn stack_frames(
    dir: impl AsRef<Path>,
    out_path: impl AsRef<Path>,
    filter: ChannelFilter,
) -> Result<usize, ConvertError> {
    let dir = dir.as_ref();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| has_extension(path, &["png"]))
        .collect();
    if paths.is_empty() {
        return Err(DecodeError::NoValidImages(dir.to_path_buf()).into());
    }
    paths.sort();

    let mut layout: Option<(u32, u32, u8)> = None;
    let mut bytes = Vec::new();
    let mut depth = 0;
    for path in &paths {
        let image = image::open(path)?;
        let channels = image.color().channel_count();
        if !filter.accepts(channels) {
            debug!(path = %path.display(), channels, "leaving frame out of stack");
            continue;
        }

        let (width, height, channels) = *layout.get_or_insert((image.width(), image.height(), channels));
        if (image.width(), image.height()) != (width, height) {
            return Err(GeometryError::SliceDimensions {
                index: depth,
                expected: (height as usize, width as usize),
                found: (image.height() as usize, image.width() as usize),
            }
            .into());
        }
        bytes.extend_from_slice(&interleaved(image, channels));
        depth += 1;
    }

    let Some((width, height, channels)) = layout else {
        return Err(DecodeError::NoConformingFrames(dir.to_path_buf()).into());
    };
    let header = MetaImageHeader::new(
        [width as usize, height as usize, depth],
        ElementType::UChar,
        usize::from(channels),
    );
    let out_path = out_path.as_ref();
    let volume = MetaImage::new(header, bytes).map_err(|reason| DecodeError::container(out_path, reason))?;
    volume.write(out_path)?;

    info!(path = %out_path.display(), frames = depth, channels, "stacked frames");
    Ok(depth)
}

/// 8-bit samples of `image` with `channels` interleaved components per pixel.
fn interleaved(image: DynamicImage, channels: u8) -> Vec<u8> {
    match channels {
        1 => image.into_luma8().into_raw(),
        2 => image.into_luma_alpha8().into_raw(),
        3 => image.into_rgb8().into_raw(),
        _ => image.into_rgba8().into_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::SequenceExporter;
    use crate::overlay::OverlayCompositor;
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use ndarray::Array2;

    #[test]
    fn keeps_only_three_channel_frames() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir(&frames).unwrap();
        for i in 0..9u8 {
            RgbImage::from_pixel(5, 4, Rgb([i * 10, 0, 0]))
                .save(frames.join(format!("frame_{i:03}.png")))
                .unwrap();
        }
        GrayImage::from_pixel(5, 4, Luma([200]))
            .save(frames.join("frame_009.png"))
            .unwrap();

        let out = dir.path().join("stack.mha");
        assert_eq!(stack_frames(&frames, &out, ChannelFilter::exactly(3)).unwrap(), 9);

        let stacked = MetaImage::read(&out).unwrap();
        assert_eq!(stacked.header.dim_size, [5, 4, 9]);
        assert_eq!(stacked.header.channels, 3);
        assert_eq!(stacked.header.element_type, ElementType::UChar);
        let plane = stacked.plane(8).unwrap();
        assert_eq!(plane[[3, 4, 0]], 80.0);
    }

    #[test]
    fn ragged_frames_are_a_geometry_error() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(4, 4).save(dir.path().join("a.png")).unwrap();
        RgbImage::new(4, 3).save(dir.path().join("b.png")).unwrap();

        let err = stack_frames(dir.path(), dir.path().join("out.mha"), ChannelFilter::ANY).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Geometry(GeometryError::SliceDimensions { index: 1, .. })
        ));
    }

    #[test]
    fn nothing_to_stack() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.mha");
        assert!(matches!(
            stack_frames(dir.path(), &out, ChannelFilter::ANY),
            Err(ConvertError::Decode(DecodeError::NoValidImages(_)))
        ));

        GrayImage::new(2, 2).save(dir.path().join("only.png")).unwrap();
        assert!(matches!(
            stack_frames(dir.path(), &out, ChannelFilter::exactly(3)),
            Err(ConvertError::Decode(DecodeError::NoConformingFrames(_)))
        ));
        assert!(!out.exists());
    }

    #[test]
    fn exported_animation_splits_and_restacks() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<_> = (0..4)
            .map(|i| {
                let attention = Array2::from_elem((6, 8), if i % 2 == 0 { 1.0 } else { 0.0 });
                OverlayCompositor::composite(attention.view(), 3.0)
            })
            .collect();
        let artifact = SequenceExporter::default()
            .export(&frames, dir.path(), "serie_1")
            .unwrap();

        let pngs = split_animation(&artifact.path, dir.path().join("pngs")).unwrap();
        assert_eq!(pngs.len(), 4);
        assert!(pngs[3].ends_with("frame_003.png"));

        let out = dir.path().join("serie_1.mha");
        assert_eq!(
            stack_frames(dir.path().join("pngs"), &out, ChannelFilter::exactly(3)).unwrap(),
            4
        );
        let stacked = MetaImage::read(&out).unwrap();
        assert_eq!(stacked.header.dim_size, [8, 6, 4]);
        assert_eq!(stacked.plane(0).unwrap()[[0, 0, 0]], 255.0);
        assert_eq!(stacked.plane(1).unwrap()[[0, 0, 0]], 0.0);
    }
}
