mod common;

use std::fs;

use dicom_attention::{
    AttentionGrid, AttentionTensor, AttentionUpsampler, ChannelFilter, DecodeOptions,
    OverlayCompositor, Pipeline, PipelineConfig, PrecomputedPredictor, Prediction, RiskScores,
    SequenceExporter, SortBy, SourceFormat, Study, VolumeLoader, exporter,
};
use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::{Array2, Array4};

fn uniform_attention() -> AttentionTensor {
    let grid = AttentionGrid::default();
    AttentionTensor::new(
        Array4::zeros((1, grid.depth, grid.height, grid.width)),
        Array2::zeros((1, grid.depth)),
    )
}

#[test]
fn dicom_study_at_window_center_saturates_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let study = dir.path().join("1.2.840.99.2");
    fs::create_dir(&study).unwrap();
    for instance in 1..=10 {
        common::write_ct_slice(
            &study,
            &format!("slice_{instance:03}.dcm"),
            instance,
            (512, 512),
            -600.0,
        );
    }

    let volume = VolumeLoader::default().load(&study, None).unwrap();
    assert_eq!(volume.dim(), (10, 512, 512));
    // ((0.5 / 1499 + 0.5) * 65535) / 256, floored
    assert!(volume.data().iter().all(|&v| v == 128.0));
    assert_eq!(volume.spacing(), Some((0.7, 0.7, 2.5)));

    let upsampled = AttentionUpsampler::default()
        .upsample(&uniform_attention(), 10, 512, 512)
        .unwrap();
    assert_eq!(upsampled.dim(), (10, 512, 512));
    assert!(upsampled.maps().iter().all(|&v| (v - 1.0).abs() < 1e-6));

    let frames = OverlayCompositor::composite_all(&upsampled, 3.0);
    assert_eq!(frames.len(), 10);
    for frame in &frames {
        assert_eq!(frame.dimensions(), (512, 512));
        assert!(frame.image().pixels().all(|p| p.0 == [255, 0, 0]));
    }

    let out = dir.path().join("overlays");
    let artifact = SequenceExporter::default()
        .export(&frames, &out, "serie_1.2.840.99.2")
        .unwrap();
    assert_eq!(artifact.frame_count, 10);
    assert_eq!(exporter::frame_count(&artifact.path).unwrap(), 10);
}

#[test]
fn non_conforming_raster_frame_is_excluded() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..9 {
        RgbImage::from_pixel(32, 24, Rgb([255, 255, 255]))
            .save(dir.path().join(format!("frame_{i:03}.png")))
            .unwrap();
    }
    GrayImage::from_pixel(32, 24, Luma([7]))
        .save(dir.path().join("frame_009.png"))
        .unwrap();

    let options = DecodeOptions {
        channel_filter: ChannelFilter::exactly(3),
        ..DecodeOptions::default()
    };
    let volume = VolumeLoader::new(options, SortBy::FileName)
        .load(dir.path(), Some(SourceFormat::Raster))
        .unwrap();
    assert_eq!(volume.dim(), (9, 24, 32));
    assert!(volume.data().iter().all(|&v| v == 255.0));

    // Without an expected channel count the grayscale frame is kept.
    let unfiltered = VolumeLoader::new(DecodeOptions::default(), SortBy::FileName)
        .load(dir.path(), Some(SourceFormat::Raster))
        .unwrap();
    assert_eq!(unfiltered.dim(), (10, 24, 32));
    assert_eq!(unfiltered.data()[[9, 0, 0]], 7.0);
}

#[test]
fn pipeline_renders_precomputed_prediction_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let study = dir.path().join("series-a");
    fs::create_dir(&study).unwrap();
    for instance in 1..=6 {
        common::write_ct_slice(
            &study,
            &format!("slice_{instance:03}.dcm"),
            instance,
            (64, 48),
            0.0,
        );
    }

    let config = PipelineConfig::from_toml_str(
        r#"
        [attention]
        depth = 2
        height = 2
        width = 2

        [overlay]
        gain = 0.0
        "#,
    )
    .unwrap();

    let prediction = r#"{
        "scores": [0.01, 0.02, 0.04, 0.08, 0.16, 0.32],
        "attention": {
            "ensemble": 1, "depth": 2, "height": 2, "width": 2,
            "image": [0, 0, 0, 0, 0, 0, 0, 0],
            "volume": [0, 0]
        }
    }"#;
    let predictor = PrecomputedPredictor::from_json_str(prediction).unwrap();

    let outcome = Pipeline::new(config)
        .unwrap()
        .with_output_dir(dir.path().join("out"))
        .run_study(&Study::new(&study), &predictor)
        .unwrap();
    assert_eq!(outcome.series_id, "series-a");
    assert_eq!(outcome.depth, 6);
    assert_eq!(outcome.scores.year(3), Some(0.04));
    let artifact = outcome.artifact.unwrap();
    assert_eq!(artifact.path, dir.path().join("out").join("serie_series-a.gif"));
    assert_eq!(exporter::frame_count(&artifact.path).unwrap(), 6);
}

#[test]
fn batch_runs_studies_independently() {
    let dir = tempfile::tempdir().unwrap();
    let mut studies = Vec::new();
    for (name, depth) in [("s1", 3), ("s2", 5)] {
        let study = dir.path().join(name);
        fs::create_dir(&study).unwrap();
        for instance in 1..=depth {
            common::write_ct_slice(
            &study,
            &format!("slice_{instance:03}.dcm"),
            instance,
            (16, 16),
            -600.0,
        );
        }
        studies.push(Study::new(study));
    }
    studies.push(Study::new(dir.path().join("absent.mha")));

    let predictor = PrecomputedPredictor::new(Prediction {
        scores: RiskScores([0.1; 6]),
        attention: Some(uniform_attention()),
    });
    let out = dir.path().join("out");
    let results = Pipeline::default().with_output_dir(&out).run_batch(&studies, &predictor);

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].1.as_ref().unwrap().depth, 3);
    assert_eq!(results[1].1.as_ref().unwrap().depth, 5);
    assert!(results[2].1.is_err());
    assert_eq!(exporter::frame_count(out.join("serie_s1.gif")).unwrap(), 3);
    assert_eq!(exporter::frame_count(out.join("serie_s2.gif")).unwrap(), 5);
}
