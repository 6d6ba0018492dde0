mod common;

use common::synthetic::{ramp_rgb, random_features, shifted};
use panostitch::align::{AlignOptions, MotionModel};
use panostitch::blend::BlendOptions;
use panostitch::codec;
use panostitch::features::load_matches;
use panostitch::matcher::DescriptorMatcher;
use panostitch::pipeline::{align_files, blend_pair_list, match_files, warp_file};
use panostitch::spherical::{Projection, SphericalParams};
use panostitch::warp::{Interpolation, Resampler};
use panostitch::PanoError;

#[test]
fn match_then_align_recovers_the_shift() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let f1 = random_features(80, 3);
    let f2 = shifted(&f1, 12, -5);
    let (p1, p2, pm) = (dir.path().join("a.f"), dir.path().join("b.f"), dir.path().join("m.txt"));
    f1.save(&p1).unwrap();
    f2.save(&p2).unwrap();

    let n = match_files(&p1, &p2, &pm, false, &DescriptorMatcher::default()).unwrap();
    assert_eq!(n, 80);
    assert_eq!(load_matches(&pm).unwrap().len(), 80);

    for model in [MotionModel::Translate, MotionModel::TranslateRotate] {
        let opts = AlignOptions { model, iterations: 50, ..Default::default() };
        let result = align_files(&p1, &p2, &pm, false, &opts).unwrap();
        let (tx, ty) = result.translation();
        assert!((tx - 12.0).abs() < 1e-6 && (ty + 5.0).abs() < 1e-6, "{model}: ({tx}, {ty})");
        assert_eq!(result.inliers.len(), 80);
        assert!(result.rms < 1e-6);
    }
}

#[test]
fn aligned_offsets_feed_the_placement_list() {
    let dir = tempfile::tempdir().unwrap();
    let scene = ramp_rgb(140, 40);
    codec::save(&scene.sub_view(0, 0, 100, 40).unwrap().to_image(), dir.path().join("a.png")).unwrap();
    codec::save(&scene.sub_view(40, 0, 100, 40).unwrap().to_image(), dir.path().join("b.png")).unwrap();

    // Panning right moves every feature 40 pixels left in the second photo.
    let f1 = random_features(60, 5);
    let f2 = shifted(&f1, -40, 0);
    let (p1, p2, pm) = (dir.path().join("a.f"), dir.path().join("b.f"), dir.path().join("m.txt"));
    f1.save(&p1).unwrap();
    f2.save(&p2).unwrap();
    match_files(&p1, &p2, &pm, false, &DescriptorMatcher::default()).unwrap();
    let (tx, ty) = align_files(&p1, &p2, &pm, false, &AlignOptions::default()).unwrap().translation();

    let list = dir.path().join("pairs.txt");
    std::fs::write(&list, format!("a.png b.png {tx:.2} {ty:.2}\n")).unwrap();
    let out = dir.path().join("mosaic.png");
    let shape = blend_pair_list(&list, &out, &BlendOptions::new(10.0)).unwrap();
    assert_eq!((shape.width, shape.height), (40, 40));

    // The mosaic starts at the first photo's midline and shows the scene unmirrored.
    let mosaic = codec::load(&out).unwrap();
    for y in 0..40 {
        for x in 0..40 {
            assert_eq!(mosaic.pixel(x, y), scene.pixel(x + 50, y), "({x}, {y})");
        }
    }
}

#[test]
fn align_reports_unknown_ids() {
    let dir = tempfile::tempdir().unwrap();
    let f1 = random_features(5, 1);
    let (p1, pm) = (dir.path().join("a.f"), dir.path().join("m.txt"));
    f1.save(&p1).unwrap();
    std::fs::write(&pm, "1\n1 9 0.5\n").unwrap();
    let err = align_files(&p1, &p1, &pm, false, &AlignOptions::default()).unwrap_err();
    assert!(matches!(err, PanoError::InvalidArgument(_)));
}

#[test]
fn warped_file_carries_a_validity_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    let src = ramp_rgb(64, 48);
    codec::save(&src, &input).unwrap();

    let params = SphericalParams::new(40.0).with_projection(Projection::Cylindrical);
    let shape = warp_file(&input, &output, &params, &Resampler::new(Interpolation::Bilinear), false).unwrap();
    assert_eq!((shape.width, shape.height, shape.bands), (64, 48, 4));

    let warped = codec::load(&output).unwrap();
    // The centre maps onto itself.
    assert_eq!(&warped.pixel(32, 24)[..3], src.pixel(32, 24));
    assert_eq!(warped.pixel(32, 24)[3], 255);
    // The outer columns look past the edge of the photograph.
    assert_eq!(warped.pixel(0, 24), &[0, 0, 0, 0]);
    assert_eq!(warped.pixel(63, 24), &[0, 0, 0, 0]);
}

#[test]
fn presmoothing_keeps_flat_regions() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("flat.png");
    let output = dir.path().join("flat_out.png");
    codec::save(&common::synthetic::solid_rgb(40, 30, [90, 120, 150]), &input).unwrap();
    let params = SphericalParams::new(400.0);
    warp_file(&input, &output, &params, &Resampler::default(), true).unwrap();
    let warped = codec::load(&output).unwrap();
    assert_eq!(warped.pixel(20, 15), &[90, 120, 150, 255]);
}
