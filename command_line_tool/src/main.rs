use clap::{CommandFactory, Parser, Subcommand};
use log::{error, info};
use panostitch::align::MotionModel;
use panostitch::blend::Coverage;
use panostitch::config::PanoramaConfig;
use panostitch::matcher::DescriptorMatcher;
use panostitch::pipeline;
use panostitch::spherical::{Projection, SphericalParams};
use panostitch::transform::Transform3x3;
use panostitch::warp::Interpolation;
use panostitch::{PanoError, Result};

use std::fs;
use std::path::{Path, PathBuf};

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "Panorama stitching: spherical warp, pairwise alignment and blending.")]
struct Cli {
    /// TOML configuration file; command line values take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug detail (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Warp a photograph into cylindrical or spherical coordinates
    #[command(alias = "sphrWarp", allow_negative_numbers = true)]
    Warp {
        input: PathBuf,
        output: PathBuf,
        /// Focal length in pixels
        focal_length: f64,
        /// Radial distortion coefficients
        k1: Option<f64>,
        k2: Option<f64>,
        /// spherical or cylindrical
        #[arg(long)]
        projection: Option<Projection>,
        /// nearest, bilinear or bicubic
        #[arg(long)]
        interp: Option<Interpolation>,
        /// Camera pitch in degrees
        #[arg(long)]
        pitch: Option<f64>,
        /// Camera yaw in degrees
        #[arg(long)]
        yaw: Option<f64>,
        /// Blur with a 5-tap binomial kernel before warping
        #[arg(long)]
        presmooth: bool,
    },

    /// Estimate the motion between two feature files and print `tx ty`
    #[command(alias = "alignPair")]
    Align {
        features1: PathBuf,
        features2: PathBuf,
        matches: PathBuf,
        iterations: usize,
        /// Inlier bound on the squared distance in pixels
        threshold: f64,
        /// Read SIFT keypoint files instead of native feature files
        #[arg(value_parser = ["sift"])]
        sift: Option<String>,
        /// translate or translate-rotate
        #[arg(long)]
        model: Option<MotionModel>,
        /// Focal length in pixels, to report pan and tilt angles
        #[arg(long)]
        focal: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Match feature descriptors and write a correspondence file
    Match {
        features1: PathBuf,
        features2: PathBuf,
        output: PathBuf,
        #[arg(long)]
        sift: bool,
        /// Lowe ratio
        #[arg(long)]
        ratio: Option<f64>,
    },

    /// Blend the images of a placement list into one mosaic
    #[command(alias = "blendPairs")]
    Blend {
        pair_list: PathBuf,
        output: PathBuf,
        blend_width: f64,
        /// auto, alpha, black or all
        #[arg(long)]
        coverage: Option<Coverage>,
    },

    /// Run the command lines of a script file, stopping at the first failure
    Script { file: PathBuf },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}

fn execute(command: Command, config: &PanoramaConfig) -> Result<()> {
    match command {
        Command::Warp {
            input,
            output,
            focal_length,
            k1,
            k2,
            projection,
            interp,
            pitch,
            yaw,
            presmooth,
        } => {
            let mut config = config.clone();
            if let Some(interp) = interp {
                config.warp.interpolation = interp;
            }
            let rotation = Transform3x3::yaw(yaw.unwrap_or(config.warp.yaw))
                * Transform3x3::pitch(pitch.unwrap_or(config.warp.pitch));
            let params = SphericalParams::new(focal_length)
                .with_distortion(k1.unwrap_or(config.warp.k1), k2.unwrap_or(config.warp.k2))
                .with_projection(projection.unwrap_or(config.warp.projection))
                .with_rotation(rotation);
            pipeline::warp_file(&input, &output, &params, &config.resampler(), presmooth)?;
        }
        Command::Align {
            features1,
            features2,
            matches,
            iterations,
            threshold,
            sift,
            model,
            focal,
            seed,
        } => {
            let mut opts = config.align_options();
            opts.iterations = iterations;
            opts.threshold = threshold;
            opts.model = model.unwrap_or(opts.model);
            opts.seed = seed.unwrap_or(opts.seed);
            opts.focal_length = focal.or(opts.focal_length).or(config.warp.focal_length);
            let result = pipeline::align_files(&features1, &features2, &matches, sift.is_some(), &opts)?;
            let (tx, ty) = result.translation();
            if let Some((pan, tilt)) = result.pan_tilt {
                info!("pan {:.4} rad, tilt {:.4} rad", pan, tilt);
            }
            if opts.model == MotionModel::TranslateRotate {
                info!("rotation {:.3} degrees", result.rotation_degrees());
            }
            println!("{:.2} {:.2}", tx, ty);
        }
        Command::Match {
            features1,
            features2,
            output,
            sift,
            ratio,
        } => {
            let matcher = DescriptorMatcher::new(ratio.unwrap_or(config.align.ratio))?;
            let n = pipeline::match_files(&features1, &features2, &output, sift, &matcher)?;
            info!("wrote {n} matches to {}", output.display());
        }
        Command::Blend {
            pair_list,
            output,
            blend_width,
            coverage,
        } => {
            let mut opts = config.blend_options();
            opts.blend_width = blend_width;
            opts.coverage = coverage.unwrap_or(opts.coverage);
            pipeline::blend_pair_list(&pair_list, &output, &opts)?;
        }
        Command::Script { file } => run_script(&file, config)?,
    }
    Ok(())
}

/// Replays a script. Each line is a command line, optionally starting with
/// the program name; blank lines and `//` comments are skipped.
fn run_script(path: &Path, config: &PanoramaConfig) -> Result<()> {
    let text = fs::read_to_string(path)?;
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        info!("{}:{}: {line}", path.display(), i + 1);
        let mut args: Vec<&str> = line.split_whitespace().collect();
        if Cli::command().find_subcommand(args[0]).is_some() {
            args.insert(0, "panostitch");
        }
        if args.len() < 2 {
            continue;
        }
        let cli = Cli::try_parse_from(args.iter().copied()).map_err(|e| {
            PanoError::InvalidArgument(format!("{}:{}: {e}", path.display(), i + 1))
        })?;
        match cli.config {
            Some(p) => execute(cli.command, &PanoramaConfig::load_from_file(p)?)?,
            None => execute(cli.command, config)?,
        }
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = PanoramaConfig::load_or_default(cli.config.as_deref())?;
    execute(cli.command, &config)
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = run(cli) {
        error!("{e}");
        std::process::exit(1);
    }
}
