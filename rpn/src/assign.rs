//! Anchor labeling against ground truth boxes.

use crate::{common::*, overlap::OverlapMatrix};

/// IoU values within this distance of a column maximum count as achieving it.
const TIE_EPSILON: f64 = 1e-9;

/// The training label of an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnchorLabel {
    Ignore,
    Negative,
    Positive,
}

impl AnchorLabel {
    /// The numeric label, -1 for ignore, 0 for negative and 1 for positive.
    pub fn value(&self) -> i8 {
        match self {
            Self::Ignore => -1,
            Self::Negative => 0,
            Self::Positive => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub label: AnchorLabel,
    /// The matched ground truth index. It is meaningful only for positive
    /// anchors and is 0 otherwise.
    pub gt_index: usize,
}

/// Per-anchor assignments, indexed like the anchors.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LabelAssignment {
    pub assignments: Vec<Assignment>,
}

impl LabelAssignment {
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn indices_of(&self, label: AnchorLabel) -> Vec<usize> {
        self.assignments
            .iter()
            .enumerate()
            .filter(|(_, assignment)| assignment.label == label)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn count(&self, label: AnchorLabel) -> usize {
        self.assignments
            .iter()
            .filter(|assignment| assignment.label == label)
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct TargetAssignerInit {
    pub positive_iou_threshold: R64,
    pub negative_iou_threshold: R64,
}

impl Default for TargetAssignerInit {
    fn default() -> Self {
        Self {
            positive_iou_threshold: r64(0.7),
            negative_iou_threshold: r64(0.3),
        }
    }
}

impl TargetAssignerInit {
    pub fn build(self) -> Result<TargetAssigner> {
        let Self {
            positive_iou_threshold,
            negative_iou_threshold,
        } = self;

        ensure!(
            (0.0..=1.0).contains(&positive_iou_threshold.raw()),
            "positive_iou_threshold must be in range [0, 1]"
        );
        ensure!(
            (0.0..=1.0).contains(&negative_iou_threshold.raw()),
            "negative_iou_threshold must be in range [0, 1]"
        );
        ensure!(
            negative_iou_threshold <= positive_iou_threshold,
            "negative_iou_threshold must not exceed positive_iou_threshold"
        );

        Ok(TargetAssigner {
            positive_iou_threshold: positive_iou_threshold.raw(),
            negative_iou_threshold: negative_iou_threshold.raw(),
        })
    }
}

/// Labels anchors as positive, negative or ignored.
///
/// An anchor is positive if it achieves the highest IoU of some ground truth
/// box, or if its own best IoU reaches the positive threshold. A ground truth
/// box that overlaps no anchor has a zero maximum, which every anchor
/// achieves. Ground truth boxes must have positive height and width. Positive
/// anchors are matched to the ground truth of their best IoU. Other anchors
/// are negative when their best IoU is below the negative threshold and are
/// ignored otherwise.
#[derive(Debug, Clone)]
pub struct TargetAssigner {
    positive_iou_threshold: f64,
    negative_iou_threshold: f64,
}

impl TargetAssigner {
    pub fn positive_iou_threshold(&self) -> f64 {
        self.positive_iou_threshold
    }

    pub fn negative_iou_threshold(&self) -> f64 {
        self.negative_iou_threshold
    }

    /// Labels the anchors against the ground truth boxes.
    ///
    /// All-zero anchors are ignored instead of removed, so that the output
    /// stays aligned with the anchor indices.
    pub fn assign(&self, anchors: &[TLBR<f64>], ground_truth: &[GroundTruth]) -> LabelAssignment {
        let gt_rects: Vec<_> = ground_truth.iter().map(|gt| gt.rect).collect();
        let overlaps = OverlapMatrix::new(anchors, &gt_rects);
        let mut assignment = self.assign_overlaps(&overlaps);

        anchors
            .iter()
            .zip(&mut assignment.assignments)
            .filter(|(anchor, _)| anchor.is_zero())
            .for_each(|(_, assignment)| {
                *assignment = Assignment {
                    label: AnchorLabel::Ignore,
                    gt_index: 0,
                };
            });

        assignment
    }

    /// Labels the rows of an anchor by ground truth overlap matrix.
    pub fn assign_overlaps(&self, overlaps: &OverlapMatrix) -> LabelAssignment {
        let Self {
            positive_iou_threshold,
            negative_iou_threshold,
        } = *self;

        if overlaps.num_cols() == 0 {
            debug!("no ground truth, all {} anchors are negative", overlaps.num_rows());
            let assignments = vec![
                Assignment {
                    label: AnchorLabel::Negative,
                    gt_index: 0,
                };
                overlaps.num_rows()
            ];
            return LabelAssignment { assignments };
        }

        let col_max = overlaps.col_max();
        let row_argmax = overlaps.row_argmax();

        let assignments: Vec<_> = overlaps
            .rows()
            .zip(row_argmax)
            .map(|(row, argmax)| {
                // a row of a non-empty column set always has a maximum
                let (best_gt, best_iou) = argmax.unwrap_or((0, 0.0));

                // the anchor achieves the best IoU of some ground truth box,
                // including a zero maximum, so that every box gets a positive
                let is_best_for_gt = row
                    .iter()
                    .zip(&col_max)
                    .any(|(&iou, &max)| iou >= max - TIE_EPSILON);
                let is_above_threshold = best_iou >= positive_iou_threshold;

                if is_best_for_gt || is_above_threshold {
                    Assignment {
                        label: AnchorLabel::Positive,
                        gt_index: best_gt,
                    }
                } else if best_iou < negative_iou_threshold {
                    Assignment {
                        label: AnchorLabel::Negative,
                        gt_index: 0,
                    }
                } else {
                    Assignment {
                        label: AnchorLabel::Ignore,
                        gt_index: 0,
                    }
                }
            })
            .collect();

        let assignment = LabelAssignment { assignments };
        debug!(
            "assigned {} positive, {} negative and {} ignored anchors",
            assignment.count(AnchorLabel::Positive),
            assignment.count(AnchorLabel::Negative),
            assignment.count(AnchorLabel::Ignore)
        );
        assignment
    }
}
