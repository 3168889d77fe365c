//! Region proposals from raw per-anchor predictions.

use crate::common::*;

/// Selects the maximum proposal count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalMode {
    Training,
    Inference,
}

impl FromStr for ProposalMode {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mode = match text {
            "training" => Self::Training,
            "inference" => Self::Inference,
            _ => bail!(
                "invalid proposal mode '{}', expect 'training' or 'inference'",
                text
            ),
        };
        Ok(mode)
    }
}

#[derive(Debug, Clone)]
pub struct ProposalSelectorInit {
    pub nms_iou_threshold: R64,
    /// If set, only this many highest scoring anchors enter the suppression.
    pub pre_nms_top_k: Option<usize>,
    pub max_proposals_training: usize,
    pub max_proposals_inference: usize,
}

impl Default for ProposalSelectorInit {
    fn default() -> Self {
        Self {
            nms_iou_threshold: r64(0.7),
            pre_nms_top_k: Some(12000),
            max_proposals_training: 2000,
            max_proposals_inference: 300,
        }
    }
}

impl ProposalSelectorInit {
    pub fn build(self) -> Result<ProposalSelector> {
        let Self {
            nms_iou_threshold,
            pre_nms_top_k,
            max_proposals_training,
            max_proposals_inference,
        } = self;

        ensure!(
            (0.0..=1.0).contains(&nms_iou_threshold.raw()),
            "nms_iou_threshold must be in range [0, 1]"
        );
        ensure!(
            pre_nms_top_k != Some(0),
            "pre_nms_top_k must be positive if set"
        );
        ensure!(
            max_proposals_training > 0 && max_proposals_inference > 0,
            "the maximum proposal counts must be positive"
        );

        Ok(ProposalSelector {
            nms_iou_threshold: nms_iou_threshold.raw(),
            pre_nms_top_k,
            max_proposals_training,
            max_proposals_inference,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Proposal {
    pub rect: TLBR<f64>,
    /// The object probability. Padding entries have zero score.
    pub score: f64,
}

impl Proposal {
    pub fn padding() -> Self {
        Self {
            rect: TLBR::zeros(),
            score: 0.0,
        }
    }
}

/// A fixed size proposal list, real proposals first in descending score
/// order followed by zero padding.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Proposals {
    pub proposals: Vec<Proposal>,
    /// The number of leading entries which are not padding.
    pub num_valid: usize,
}

impl Proposals {
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub fn valid(&self) -> &[Proposal] {
        &self.proposals[..self.num_valid]
    }
}

/// Turns per-anchor logits and box deltas into region proposals.
#[derive(Debug, Clone)]
pub struct ProposalSelector {
    nms_iou_threshold: f64,
    pre_nms_top_k: Option<usize>,
    max_proposals_training: usize,
    max_proposals_inference: usize,
}

impl ProposalSelector {
    pub fn max_proposals(&self, mode: ProposalMode) -> usize {
        match mode {
            ProposalMode::Training => self.max_proposals_training,
            ProposalMode::Inference => self.max_proposals_inference,
        }
    }

    pub fn nms_iou_threshold(&self) -> f64 {
        self.nms_iou_threshold
    }

    /// Selects the proposals of one image.
    ///
    /// `logits`, `deltas` and `anchors` are indexed alike. The output always
    /// holds exactly `max_proposals(mode)` entries.
    pub fn select(
        &self,
        logits: &[[f64; 2]],
        deltas: &[Delta<f64>],
        anchors: &[TLBR<f64>],
        codec: &BoxCodec<f64>,
        image_size: &HW<f64>,
        mode: ProposalMode,
    ) -> Result<Proposals> {
        ensure!(
            logits.len() == anchors.len() && deltas.len() == anchors.len(),
            "expect {} logits and deltas, but got {} logits and {} deltas",
            anchors.len(),
            logits.len(),
            deltas.len()
        );
        let max_proposals = self.max_proposals(mode);

        // rank by object probability
        let candidates: Vec<(usize, f64)> = {
            let mut candidates: Vec<_> = logits
                .iter()
                .map(|&logits| objectness(logits))
                .enumerate()
                .collect();
            // stable, so equal scores keep the lower anchor index first
            candidates.sort_by(|(_, lhs), (_, rhs)| {
                rhs.partial_cmp(lhs).unwrap_or(Ordering::Equal)
            });
            if let Some(top_k) = self.pre_nms_top_k {
                candidates.truncate(top_k);
            }
            candidates
        };

        // skip candidates whose deltas do not decode to a finite box
        let (rects, scores): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .filter(|&(index, _)| anchors[index].is_proper())
            .filter_map(|(index, score)| {
                match codec.decode(&deltas[index], &anchors[index]) {
                    Ok(rect) if rect.is_finite() && score.is_finite() => Some((rect, score)),
                    Ok(_) => {
                        debug!("skip anchor {} with a non-finite proposal", index);
                        None
                    }
                    Err(err) => {
                        debug!("skip anchor {}: {:#}", index, err);
                        None
                    }
                }
            })
            .unzip();

        let keep = non_max_suppression(&rects, &scores, self.nms_iou_threshold, max_proposals);
        if keep.is_empty() {
            debug!("no proposal survives, emit {} padding entries", max_proposals);
        }

        let num_valid = keep.len();
        let proposals: Vec<_> = keep
            .into_iter()
            .map(|index| Proposal {
                rect: rects[index].clip_to(image_size),
                score: scores[index],
            })
            .chain(iter_padding())
            .take(max_proposals)
            .collect();
        debug_assert_eq!(proposals.len(), max_proposals);

        Ok(Proposals {
            proposals,
            num_valid,
        })
    }
}

fn iter_padding() -> impl Iterator<Item = Proposal> {
    std::iter::repeat(Proposal::padding())
}

/// Computes the object probability of a `[background, object]` logit pair.
///
/// The softmax is shifted by the larger logit so that it stays finite for
/// finite inputs.
pub fn objectness(logits: [f64; 2]) -> f64 {
    let [background, object] = logits;
    let max = background.max(object);
    let background = (background - max).exp();
    let object = (object - max).exp();
    object / (background + object)
}

/// Greedy non-maximum suppression.
///
/// Boxes are visited in descending score order, ties by lower index. A box is
/// kept unless its IoU with an already kept box reaches `iou_threshold`.
/// Returns at most `max_output` indices in the order they are kept.
pub fn non_max_suppression(
    rects: &[TLBR<f64>],
    scores: &[f64],
    iou_threshold: f64,
    max_output: usize,
) -> Vec<usize> {
    debug_assert_eq!(rects.len(), scores.len());

    let order: Vec<usize> = (0..rects.len())
        .sorted_by(|&lhs, &rhs| {
            scores[rhs]
                .partial_cmp(&scores[lhs])
                .unwrap_or(Ordering::Equal)
        })
        .collect();

    let mut keep: Vec<usize> = Vec::with_capacity(max_output.min(rects.len()));
    for index in order {
        if keep.len() >= max_output {
            break;
        }

        let rect = &rects[index];
        let suppressed = keep
            .iter()
            .any(|&kept| rects[kept].iou_with(rect) >= iou_threshold);
        if !suppressed {
            keep.push(index);
        }
    }
    keep
}
