//! Per-image training targets and proposals, and their batch drivers.

use crate::{
    anchor::{AnchorGenerator, AnchorGeneratorInit, FeatureShape},
    assign::{LabelAssignment, TargetAssigner, TargetAssignerInit},
    common::*,
    proposal::{ProposalMode, ProposalSelector, ProposalSelectorInit, Proposals},
    sample::{Minibatch, MinibatchSampler, MinibatchSamplerInit},
};

#[derive(Debug, Clone)]
pub struct RegionProposalInit {
    pub anchor: AnchorGeneratorInit,
    pub assign: TargetAssignerInit,
    pub sample: MinibatchSamplerInit,
    pub proposal: ProposalSelectorInit,
    pub scale_factors: [f64; 4],
}

impl Default for RegionProposalInit {
    fn default() -> Self {
        Self {
            anchor: Default::default(),
            assign: Default::default(),
            sample: Default::default(),
            proposal: Default::default(),
            scale_factors: [0.1, 0.1, 0.2, 0.2],
        }
    }
}

impl RegionProposalInit {
    pub fn build(self) -> Result<RegionProposal> {
        let Self {
            anchor,
            assign,
            sample,
            proposal,
            scale_factors,
        } = self;

        Ok(RegionProposal {
            generator: anchor.build().context("invalid anchor options")?,
            assigner: assign.build().context("invalid assignment options")?,
            sampler: sample.build().context("invalid sampling options")?,
            selector: proposal.build().context("invalid proposal options")?,
            codec: BoxCodec::new(scale_factors).context("invalid codec options")?,
        })
    }
}

/// The training targets of one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainSample {
    /// The ground truth left after padding rows are removed.
    pub ground_truth: Vec<GroundTruth>,
    pub assignment: LabelAssignment,
    pub minibatch: Minibatch,
}

/// Raw head outputs of one image, indexed like its anchors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImagePrediction {
    /// `[background, object]` logits.
    pub scores: Vec<[f64; 2]>,
    pub deltas: Vec<Delta<f64>>,
}

/// The assembled region proposal stages.
///
/// Every method is a pure function of its arguments and the random source
/// it is given, so images can be processed concurrently.
#[derive(Debug, Clone)]
pub struct RegionProposal {
    generator: AnchorGenerator,
    assigner: TargetAssigner,
    sampler: MinibatchSampler,
    selector: ProposalSelector,
    codec: BoxCodec<f64>,
}

impl RegionProposal {
    pub fn generator(&self) -> &AnchorGenerator {
        &self.generator
    }

    pub fn assigner(&self) -> &TargetAssigner {
        &self.assigner
    }

    pub fn sampler(&self) -> &MinibatchSampler {
        &self.sampler
    }

    pub fn selector(&self) -> &ProposalSelector {
        &self.selector
    }

    pub fn codec(&self) -> &BoxCodec<f64> {
        &self.codec
    }

    pub fn anchors(&self, shapes: &[FeatureShape]) -> Result<Vec<TLBR<f64>>> {
        self.generator.generate(shapes)
    }

    /// Labels the anchors of one image and samples its minibatch.
    ///
    /// `gt_rows` holds `[t, l, b, r, class]` rows where all-zero boxes mark
    /// padding. Other boxes with zero height or width are dropped too, since
    /// no target can be encoded from them.
    pub fn assign<R>(
        &self,
        anchors: &[TLBR<f64>],
        gt_rows: &[[f64; 5]],
        rng: &mut R,
    ) -> Result<TrainSample>
    where
        R: Rng + ?Sized,
    {
        let ground_truth: Vec<GroundTruth> = {
            let labels: Vec<GroundTruth> = label::trim_padding(gt_rows)?;
            let num_labels = labels.len();
            let proper: Vec<_> = labels.into_iter().filter(|gt| gt.rect.is_proper()).collect();
            if proper.len() < num_labels {
                warn!(
                    "dropped {} ground truth boxes with zero height or width",
                    num_labels - proper.len()
                );
            }
            proper
        };
        let assignment = self.assigner.assign(anchors, &ground_truth);
        let minibatch = self
            .sampler
            .sample(&assignment, anchors, &ground_truth, &self.codec, rng)?;

        Ok(TrainSample {
            ground_truth,
            assignment,
            minibatch,
        })
    }

    /// Runs [`assign`](Self::assign) on each image of a batch in parallel.
    ///
    /// With a base seed, image `i` samples with a generator seeded by
    /// `seed + i`, so the result does not depend on thread scheduling.
    pub fn assign_batch(
        &self,
        shapes: &[FeatureShape],
        gt_batch: &[Vec<[f64; 5]>],
        seed: Option<u64>,
    ) -> Result<Vec<TrainSample>> {
        let anchors = self.anchors(shapes)?;
        info!(
            "assign {} anchors on each of {} images",
            anchors.len(),
            gt_batch.len()
        );

        gt_batch
            .par_iter()
            .enumerate()
            .map(|(index, gt_rows)| {
                let mut rng = image_rng(seed, index);
                self.assign(&anchors, gt_rows, &mut rng)
                    .with_context(|| format!("failed to assign image {}", index))
            })
            .collect()
    }

    /// Selects the proposals of one image.
    pub fn propose(
        &self,
        anchors: &[TLBR<f64>],
        prediction: &ImagePrediction,
        image_size: &HW<f64>,
        mode: ProposalMode,
    ) -> Result<Proposals> {
        let ImagePrediction { scores, deltas } = prediction;
        self.selector
            .select(scores, deltas, anchors, &self.codec, image_size, mode)
    }

    /// Runs [`propose`](Self::propose) on each image of a batch in parallel.
    pub fn propose_batch(
        &self,
        shapes: &[FeatureShape],
        predictions: &[ImagePrediction],
        image_size: &HW<f64>,
        mode: ProposalMode,
    ) -> Result<Vec<Proposals>> {
        let anchors = self.anchors(shapes)?;
        info!(
            "select {} proposals on each of {} images",
            self.selector.max_proposals(mode),
            predictions.len()
        );

        predictions
            .par_iter()
            .enumerate()
            .map(|(index, prediction)| {
                self.propose(&anchors, prediction, image_size, mode)
                    .with_context(|| format!("failed to propose on image {}", index))
            })
            .collect()
    }
}

fn image_rng(seed: Option<u64>, index: usize) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
        None => StdRng::from_entropy(),
    }
}
