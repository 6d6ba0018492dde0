use panostitch::features::{Feature, FeatureSet, SIFT_DESCRIPTOR_LEN};
use panostitch::image::{Image, Shape};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A `width x height` RGB image filled with one colour.
pub fn solid_rgb(width: usize, height: usize, rgb: [u8; 3]) -> Image<u8> {
    let mut img = Image::<u8>::new(Shape::new(width, height, 3));
    for px in img.data_mut().chunks_exact_mut(3) {
        px.copy_from_slice(&rgb);
    }
    img
}

/// Smooth RGB ramps, never black.
pub fn ramp_rgb(width: usize, height: usize) -> Image<u8> {
    let mut img = Image::<u8>::new(Shape::new(width, height, 3));
    for y in 0..height {
        for x in 0..width {
            let px = img.pixel_mut(x, y);
            px[0] = (20 + 200 * x / width.max(1)) as u8;
            px[1] = (20 + 200 * y / height.max(1)) as u8;
            px[2] = 128;
        }
    }
    img
}

/// `n` features at random positions with random 128-d descriptors.
pub fn random_features(n: usize, seed: u64) -> FeatureSet {
    let mut rng = StdRng::seed_from_u64(seed);
    let features = (1..=n)
        .map(|id| Feature {
            feature_type: 1,
            id,
            x: rng.random_range(0..600),
            y: rng.random_range(0..400),
            angle_radians: 0.0,
            descriptor: (0..SIFT_DESCRIPTOR_LEN).map(|_| rng.random_range(0.0..1.0)).collect(),
            selected: false,
        })
        .collect();
    FeatureSet::new(features)
}

/// The same features moved by `(dx, dy)`, listed in reverse order and renumbered.
pub fn shifted(set: &FeatureSet, dx: i32, dy: i32) -> FeatureSet {
    let features = set
        .iter()
        .rev()
        .enumerate()
        .map(|(i, f)| Feature {
            id: i + 1,
            x: f.x + dx,
            y: f.y + dy,
            ..f.clone()
        })
        .collect();
    FeatureSet::new(features)
}
