//! File-to-file versions of the stitching stages, as run by the command line tool.

use crate::align::{align_pair, AlignOptions, Alignment};
use crate::blend::{blend_images, BlendOptions, Placement};
use crate::codec;
use crate::convert::to_rgba;
use crate::convolve::{binomial_5, convolve_separable};
use crate::error::Result;
use crate::features::{load_matches, save_matches, FeatureSet};
use crate::image::{BorderMode, Shape};
use crate::matcher::DescriptorMatcher;
use crate::pair_list::PairList;
use crate::spherical::{spherical_field, SphericalParams};
use crate::warp::Resampler;
use log::info;
use std::path::Path;

fn load_features(path: &Path, sift: bool) -> Result<FeatureSet> {
    if sift {
        FeatureSet::load_sift(path)
    } else {
        FeatureSet::load(path)
    }
}

/// Warps a photograph into the angular frame and saves it as RGBA, the alpha
/// band marking pixels that received source data.
///
/// With `presmooth`, the source is blurred with the 5-tap binomial kernel first.
pub fn warp_file(
    input: &Path,
    output: &Path,
    params: &SphericalParams,
    resampler: &Resampler,
    presmooth: bool,
) -> Result<Shape> {
    let mut src = to_rgba(&codec::load(input)?)?;
    if presmooth {
        src.set_border_mode(BorderMode::Replicate);
        let k = binomial_5();
        src = convolve_separable(&src, &k, &k, 1)?;
    }
    let field = spherical_field(src.shape(), src.shape(), params)?;
    let warped = resampler.warp_local(src.as_view(), &field, false)?;
    codec::save(&warped, output)?;
    info!(
        "warped {} -> {} (f = {}, {})",
        input.display(),
        output.display(),
        params.focal_length,
        params.projection
    );
    Ok(warped.shape())
}

/// Aligns two feature files through a correspondence file.
pub fn align_files(
    features1: &Path,
    features2: &Path,
    matches: &Path,
    sift: bool,
    opts: &AlignOptions,
) -> Result<Alignment> {
    let f1 = load_features(features1, sift)?;
    let f2 = load_features(features2, sift)?;
    let matches = load_matches(matches)?;
    align_pair(&f1, &f2, &matches, opts)
}

/// Matches two feature files and writes the correspondence file.
/// Returns the number of matches written.
pub fn match_files(
    features1: &Path,
    features2: &Path,
    output: &Path,
    sift: bool,
    matcher: &DescriptorMatcher,
) -> Result<usize> {
    let f1 = load_features(features1, sift)?;
    let f2 = load_features(features2, sift)?;
    let matches = matcher.match_sets(&f1, &f2)?;
    save_matches(output, &matches)?;
    Ok(matches.len())
}

/// Loads every image named in a placement list, blends them and saves the mosaic.
pub fn blend_pair_list(list: &Path, output: &Path, opts: &BlendOptions) -> Result<Shape> {
    let placements = PairList::load(list)?
        .placements()
        .into_iter()
        .map(|(path, transform)| Ok(Placement::new(codec::load(&path)?, transform)))
        .collect::<Result<Vec<_>>>()?;
    let mosaic = blend_images(&placements, opts)?;
    codec::save(&mosaic, output)?;
    info!("wrote {} ({})", output.display(), mosaic.shape());
    Ok(mosaic.shape())
}
