//! Balanced minibatch sampling of labeled anchors.

use crate::{
    assign::{AnchorLabel, LabelAssignment},
    common::*,
};

#[derive(Debug, Clone)]
pub struct MinibatchSamplerInit {
    pub minibatch_size: usize,
    /// The fraction of the minibatch reserved for positive anchors.
    pub positive_fraction: R64,
}

impl Default for MinibatchSamplerInit {
    fn default() -> Self {
        Self {
            minibatch_size: 256,
            positive_fraction: r64(0.5),
        }
    }
}

impl MinibatchSamplerInit {
    pub fn build(self) -> Result<MinibatchSampler> {
        let Self {
            minibatch_size,
            positive_fraction,
        } = self;

        ensure!(minibatch_size > 0, "minibatch_size must be positive");
        ensure!(
            (0.0..=1.0).contains(&positive_fraction.raw()),
            "positive_fraction must be in range [0, 1]"
        );

        Ok(MinibatchSampler {
            minibatch_size,
            positive_fraction: positive_fraction.raw(),
        })
    }
}

/// One sampled anchor with its regression target and one-hot label.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinibatchEntry {
    pub anchor_index: usize,
    /// The matched ground truth encoded against the anchor. It is all-zero
    /// for negative anchors.
    pub target: Delta<f64>,
    /// `[1, 0]` for background and `[0, 1]` for object.
    pub one_hot: [f64; 2],
}

impl MinibatchEntry {
    pub fn is_positive(&self) -> bool {
        self.one_hot[1] > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Minibatch {
    pub entries: Vec<MinibatchEntry>,
    /// The configured minibatch size. A minibatch may hold fewer entries
    /// when the image lacks usable anchors.
    pub requested_size: usize,
}

impl Minibatch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks whether the minibatch holds exactly the requested number of entries.
    pub fn is_complete(&self) -> bool {
        self.entries.len() == self.requested_size
    }

    pub fn num_positives(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_positive()).count()
    }

    pub fn anchor_indices(&self) -> Vec<usize> {
        self.entries.iter().map(|entry| entry.anchor_index).collect()
    }

    /// Selects the raw predictions of the sampled anchors.
    ///
    /// `scores` and `deltas` are indexed like the anchors. The outputs follow
    /// the minibatch order.
    pub fn gather(
        &self,
        scores: &[[f64; 2]],
        deltas: &[Delta<f64>],
    ) -> Result<MinibatchPredictions> {
        ensure!(
            scores.len() == deltas.len(),
            "the number of scores ({}) and deltas ({}) differ",
            scores.len(),
            deltas.len()
        );

        let (scores, deltas, object_mask) = self
            .entries
            .iter()
            .map(|entry| -> Result<_> {
                let index = entry.anchor_index;
                ensure!(
                    index < scores.len(),
                    "anchor index {} is out of range of {} predictions",
                    index,
                    scores.len()
                );
                Ok((scores[index], deltas[index], entry.one_hot[1]))
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip_n_vec();

        Ok(MinibatchPredictions {
            scores,
            deltas,
            object_mask,
        })
    }
}

/// Raw predictions gathered at the minibatch anchors, the inputs of the
/// classification and regression losses.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MinibatchPredictions {
    pub scores: Vec<[f64; 2]>,
    pub deltas: Vec<Delta<f64>>,
    /// 1 for positive entries and 0 otherwise, masking the regression loss.
    pub object_mask: Vec<f64>,
}

/// Samples a fixed size, label balanced subset of anchors.
#[derive(Debug, Clone)]
pub struct MinibatchSampler {
    minibatch_size: usize,
    positive_fraction: f64,
}

impl MinibatchSampler {
    pub fn minibatch_size(&self) -> usize {
        self.minibatch_size
    }

    pub fn positive_fraction(&self) -> f64 {
        self.positive_fraction
    }

    /// The maximum number of positive anchors in a minibatch.
    pub fn max_positives(&self) -> usize {
        (self.minibatch_size as f64 * self.positive_fraction).floor() as usize
    }

    /// Draws the anchor indices of a minibatch.
    ///
    /// Up to `max_positives()` positive anchors are drawn, and the rest is
    /// filled with negative anchors. If negatives run short, the shortfall
    /// is drawn again from reshuffled negatives, so an anchor may appear more
    /// than once. Without any negatives, the unselected positives are used.
    /// The result is shorter than the minibatch size only if the image has
    /// fewer non-ignored anchors than that, and is empty if it has none.
    /// Ignored anchors are never drawn.
    pub fn sample_indices<R>(&self, assignment: &LabelAssignment, rng: &mut R) -> Vec<usize>
    where
        R: Rng + ?Sized,
    {
        let size = self.minibatch_size;

        let mut positives = assignment.indices_of(AnchorLabel::Positive);
        positives.shuffle(rng);
        let num_positives = positives.len().min(self.max_positives());

        let mut negatives = assignment.indices_of(AnchorLabel::Negative);
        negatives.shuffle(rng);
        let num_negatives = negatives.len().min(size - num_positives);

        let mut indices: Vec<usize> = positives[..num_positives]
            .iter()
            .chain(&negatives[..num_negatives])
            .copied()
            .collect();

        if indices.len() < size {
            if !negatives.is_empty() {
                while indices.len() < size {
                    negatives.shuffle(rng);
                    let gap = size - indices.len();
                    indices.extend(negatives.iter().take(gap));
                }
            } else {
                let gap = size - indices.len();
                indices.extend(positives[num_positives..].iter().take(gap));
            }
        }

        if indices.len() < size {
            warn!(
                "only {} of {} minibatch anchors are available",
                indices.len(),
                size
            );
        }

        indices.shuffle(rng);
        indices
    }

    /// Samples a minibatch and computes its regression targets.
    ///
    /// `anchors` and `assignment` are indexed alike, and `ground_truth` is
    /// the box set the assignment was computed against.
    pub fn sample<R>(
        &self,
        assignment: &LabelAssignment,
        anchors: &[TLBR<f64>],
        ground_truth: &[GroundTruth],
        codec: &BoxCodec<f64>,
        rng: &mut R,
    ) -> Result<Minibatch>
    where
        R: Rng + ?Sized,
    {
        ensure!(
            assignment.len() == anchors.len(),
            "the assignment covers {} anchors, but {} anchors are given",
            assignment.len(),
            anchors.len()
        );

        let entries: Vec<_> = self
            .sample_indices(assignment, rng)
            .into_iter()
            .map(|anchor_index| -> Result<_> {
                let assignment = &assignment.assignments[anchor_index];
                let entry = match assignment.label {
                    AnchorLabel::Positive => {
                        let gt = ground_truth.get(assignment.gt_index).ok_or_else(|| {
                            format_err!(
                                "anchor {} is matched to missing ground truth {}",
                                anchor_index,
                                assignment.gt_index
                            )
                        })?;
                        let target = codec
                            .encode(&gt.rect, &anchors[anchor_index])
                            .with_context(|| {
                                format!("unable to encode the target of anchor {}", anchor_index)
                            })?;

                        MinibatchEntry {
                            anchor_index,
                            target,
                            one_hot: [0.0, 1.0],
                        }
                    }
                    AnchorLabel::Negative => MinibatchEntry {
                        anchor_index,
                        target: [0.0; 4],
                        one_hot: [1.0, 0.0],
                    },
                    AnchorLabel::Ignore => unreachable!("ignored anchors are never sampled"),
                };
                Ok(entry)
            })
            .collect::<Result<_>>()?;

        Ok(Minibatch {
            entries,
            requested_size: self.minibatch_size,
        })
    }
}
