use anyhow::{Context, Result};
use bbox::HW;
use log::{info, LevelFilter};
use rpn::{
    AnchorLabel, FeatureShape, ImagePrediction, Minibatch, ProposalMode, Proposals, RpnConfig,
};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
/// Anchor assignment and region proposal tool
struct Args {
    #[structopt(long)]
    /// configuration file, built-in defaults are used if not set
    pub config_file: Option<PathBuf>,
    #[structopt(long)]
    /// output JSON file, print to stdout if not set
    pub output_file: Option<PathBuf>,
    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, StructOpt)]
enum Command {
    /// Label anchors and sample a training minibatch per image
    Assign {
        #[structopt(long)]
        /// base random seed, image i is sampled with seed + i
        seed: Option<u64>,
        /// input JSON5 file with feature shapes and ground truth rows
        input_file: PathBuf,
    },
    /// Select region proposals from raw head predictions
    Propose {
        #[structopt(long, default_value = "inference")]
        /// 'training' or 'inference'
        mode: ProposalMode,
        /// input JSON5 file with feature shapes and per-anchor predictions
        input_file: PathBuf,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct AssignInput {
    pub feature_shapes: Vec<FeatureShape>,
    /// `[t, l, b, r, class]` rows per image, all-zero boxes are padding.
    pub images: Vec<Vec<[f64; 5]>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProposeInput {
    /// Image height and width.
    pub image_size: [f64; 2],
    pub feature_shapes: Vec<FeatureShape>,
    pub images: Vec<ImagePrediction>,
}

#[derive(Debug, Clone, Serialize)]
struct AssignOutput {
    pub num_positives: usize,
    pub num_negatives: usize,
    pub num_ignored: usize,
    pub minibatch: Minibatch,
}

fn main() -> Result<()> {
    if env::var("RUST_LOG").is_err() {
        pretty_env_logger::formatted_builder()
            .filter_level(LevelFilter::Info)
            .init();
    } else {
        pretty_env_logger::init();
    }

    let Args {
        config_file,
        output_file,
        command,
    } = Args::from_args();

    let config = match &config_file {
        Some(config_file) => RpnConfig::open(config_file)?,
        None => RpnConfig::default(),
    };
    let pipeline = config.build()?;

    match command {
        Command::Assign { seed, input_file } => {
            let AssignInput {
                feature_shapes,
                images,
            } = load_input(&input_file)?;

            let outputs: Vec<_> = pipeline
                .assign_batch(&feature_shapes, &images, seed)?
                .into_iter()
                .map(|sample| {
                    let assignment = &sample.assignment;
                    AssignOutput {
                        num_positives: assignment.count(AnchorLabel::Positive),
                        num_negatives: assignment.count(AnchorLabel::Negative),
                        num_ignored: assignment.count(AnchorLabel::Ignore),
                        minibatch: sample.minibatch,
                    }
                })
                .collect();

            outputs.iter().enumerate().for_each(|(index, output)| {
                info!(
                    "image {}: {} positives, {} negatives, {} ignored, {} sampled",
                    index,
                    output.num_positives,
                    output.num_negatives,
                    output.num_ignored,
                    output.minibatch.len()
                );
            });

            save_output(output_file.as_deref(), &outputs)?;
        }
        Command::Propose { mode, input_file } => {
            let ProposeInput {
                image_size,
                feature_shapes,
                images,
            } = load_input(&input_file)?;
            let image_size = HW::try_from_hw(image_size)?;

            let outputs: Vec<Proposals> =
                pipeline.propose_batch(&feature_shapes, &images, &image_size, mode)?;

            outputs.iter().enumerate().for_each(|(index, proposals)| {
                info!(
                    "image {}: {} proposals, {} padding",
                    index,
                    proposals.num_valid,
                    proposals.len() - proposals.num_valid
                );
            });

            save_output(output_file.as_deref(), &outputs)?;
        }
    }

    Ok(())
}

fn load_input<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read input file '{}'", path.display()))?;
    let input = json5::from_str(&text)
        .with_context(|| format!("failed to parse input file '{}'", path.display()))?;
    Ok(input)
}

fn save_output<T>(path: Option<&Path>, output: &T) -> Result<()>
where
    T: Serialize,
{
    match path {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, output)?;
            writer.flush()?;
            info!("output saved to '{}'", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            serde_json::to_writer_pretty(&mut writer, output)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}
