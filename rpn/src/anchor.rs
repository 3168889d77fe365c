//! Dense anchor grids over a feature pyramid.

use crate::common::*;

/// A pyramid level on which anchors are placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PyramidLevel {
    /// The level name, e.g. `P2`.
    pub name: String,
    /// The side length of the square anchor before scaling, in image pixels.
    pub base_size: R64,
    /// The distance between adjacent anchor centers, in image pixels.
    pub stride: R64,
}

/// The spatial size of the feature map of one pyramid level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureShape {
    pub level: String,
    pub height: usize,
    pub width: usize,
}

impl FeatureShape {
    pub fn new(level: impl Into<String>, height: usize, width: usize) -> Self {
        Self {
            level: level.into(),
            height,
            width,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnchorGeneratorInit {
    /// Pyramid levels in the order their anchors are concatenated.
    pub levels: Vec<PyramidLevel>,
    pub scales: Vec<R64>,
    /// Height to width ratios.
    pub ratios: Vec<R64>,
}

impl Default for AnchorGeneratorInit {
    fn default() -> Self {
        let levels = [
            ("P2", 32.0, 4.0),
            ("P3", 64.0, 8.0),
            ("P4", 128.0, 16.0),
            ("P5", 256.0, 32.0),
            ("P6", 512.0, 64.0),
        ]
        .iter()
        .map(|&(name, base_size, stride)| PyramidLevel {
            name: name.into(),
            base_size: r64(base_size),
            stride: r64(stride),
        })
        .collect();

        Self {
            levels,
            scales: vec![r64(1.0)],
            ratios: vec![r64(0.5), r64(1.0), r64(2.0)],
        }
    }
}

impl AnchorGeneratorInit {
    pub fn build(self) -> Result<AnchorGenerator> {
        let Self {
            levels,
            scales,
            ratios,
        } = self;

        ensure!(!levels.is_empty(), "at least one pyramid level is required");
        ensure!(!scales.is_empty(), "anchor scales must not be empty");
        ensure!(!ratios.is_empty(), "anchor ratios must not be empty");
        ensure!(
            scales.iter().all(|&scale| scale > 0.0),
            "anchor scales must be positive"
        );
        ensure!(
            ratios.iter().all(|&ratio| ratio > 0.0),
            "anchor ratios must be positive"
        );
        {
            let mut names = HashSet::new();
            for level in &levels {
                ensure!(
                    names.insert(level.name.as_str()),
                    "duplicated pyramid level '{}'",
                    level.name
                );
                ensure!(
                    level.base_size > 0.0 && level.stride > 0.0,
                    "base size and stride of level '{}' must be positive",
                    level.name
                );
            }
        }

        let levels = levels
            .into_iter()
            .map(|level| {
                let PyramidLevel {
                    name,
                    base_size,
                    stride,
                } = level;

                // ratio-major, scale-minor
                let sizes = ratios
                    .iter()
                    .flat_map(|ratio| {
                        let sqrt_ratio = ratio.raw().sqrt();
                        scales.iter().map(move |scale| {
                            let side = base_size.raw() * scale.raw();
                            [side * sqrt_ratio, side / sqrt_ratio]
                        })
                    })
                    .collect();

                LevelAnchors {
                    name,
                    stride: stride.raw(),
                    sizes,
                }
            })
            .collect();

        Ok(AnchorGenerator { levels })
    }
}

#[derive(Debug, Clone)]
struct LevelAnchors {
    name: String,
    stride: f64,
    /// Anchor heights and widths at one location.
    sizes: Vec<[f64; 2]>,
}

/// Generates the anchors of an image from its feature pyramid shape.
///
/// Anchors are ordered by level, then by row-major grid position, then by
/// shape. The anchor centers of a level lie at `(row * stride, col * stride)`.
/// The output depends on the feature shapes only, so the anchors used for
/// target assignment and for proposal decoding are identical.
#[derive(Debug, Clone)]
pub struct AnchorGenerator {
    levels: Vec<LevelAnchors>,
}

impl AnchorGenerator {
    pub fn num_anchors_per_location(&self) -> usize {
        self.levels[0].sizes.len()
    }

    pub fn level_names(&self) -> impl Iterator<Item = &str> {
        self.levels.iter().map(|level| level.name.as_str())
    }

    pub fn num_anchors(&self, shapes: &[FeatureShape]) -> Result<usize> {
        self.check_shapes(shapes)?;
        let per_location = self.num_anchors_per_location();
        Ok(shapes
            .iter()
            .map(|shape| shape.height * shape.width * per_location)
            .sum())
    }

    pub fn generate(&self, shapes: &[FeatureShape]) -> Result<Vec<TLBR<f64>>> {
        let num_anchors = self.num_anchors(shapes)?;
        let mut anchors = Vec::with_capacity(num_anchors);

        for (level, shape) in self.levels.iter().zip(shapes) {
            let LevelAnchors {
                ref name,
                stride,
                ref sizes,
            } = *level;
            let FeatureShape { height, width, .. } = *shape;

            let level_anchors =
                iproduct!(0..height, 0..width, sizes).map(|(row, col, &[h, w])| {
                    let cy = row as f64 * stride;
                    let cx = col as f64 * stride;
                    TLBR::from_cycxhw([cy, cx, h, w])
                });
            anchors.extend(level_anchors);

            debug!(
                "generated {} anchors on level {} ({}x{})",
                height * width * sizes.len(),
                name,
                height,
                width
            );
        }

        debug_assert_eq!(anchors.len(), num_anchors);
        Ok(anchors)
    }

    fn check_shapes(&self, shapes: &[FeatureShape]) -> Result<()> {
        ensure!(
            shapes.len() == self.levels.len(),
            "expect {} feature shapes, but got {}",
            self.levels.len(),
            shapes.len()
        );
        self.levels
            .iter()
            .zip(shapes)
            .enumerate()
            .try_for_each(|(index, (level, shape))| {
                ensure!(
                    level.name == shape.level,
                    "expect level '{}' at position {}, but got '{}'",
                    level.name,
                    index,
                    shape.level
                );
                Ok(())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn single_level(scales: &[f64], ratios: &[f64]) -> AnchorGenerator {
        AnchorGeneratorInit {
            levels: vec![PyramidLevel {
                name: "P2".into(),
                base_size: r64(8.0),
                stride: r64(4.0),
            }],
            scales: scales.iter().copied().map(r64).collect(),
            ratios: ratios.iter().copied().map(r64).collect(),
        }
        .build()
        .unwrap()
    }

    #[test]
    fn anchor_grid_layout() {
        let generator = single_level(&[1.0], &[1.0]);
        let anchors = generator.generate(&[FeatureShape::new("P2", 2, 3)]).unwrap();
        assert_eq!(anchors.len(), 6);

        // row-major centers at multiples of the stride
        let expect = [
            [-4.0, -4.0, 4.0, 4.0],
            [-4.0, 0.0, 4.0, 8.0],
            [-4.0, 4.0, 4.0, 12.0],
            [0.0, -4.0, 8.0, 4.0],
            [0.0, 0.0, 8.0, 8.0],
            [0.0, 4.0, 8.0, 12.0],
        ];
        anchors.iter().zip(expect).for_each(|(anchor, expect)| {
            assert_eq!(anchor.tlbr(), expect);
        });
    }

    #[test]
    fn anchor_shapes_innermost() {
        let generator = single_level(&[1.0, 2.0], &[0.25, 1.0]);
        assert_eq!(generator.num_anchors_per_location(), 4);

        let anchors = generator.generate(&[FeatureShape::new("P2", 1, 2)]).unwrap();
        assert_eq!(anchors.len(), 8);

        // ratio 0.25: h = side / 2, w = side * 2
        let hws: Vec<_> = anchors[..4].iter().map(|anchor| anchor.hw()).collect();
        let expect = [[4.0, 16.0], [8.0, 32.0], [8.0, 8.0], [16.0, 16.0]];
        hws.iter().zip(expect).for_each(|(&[h, w], [eh, ew])| {
            assert_abs_diff_eq!(h, eh);
            assert_abs_diff_eq!(w, ew);
        });

        // the second location repeats the shapes shifted by one stride
        anchors[..4].iter().zip(&anchors[4..]).for_each(|(lhs, rhs)| {
            assert_abs_diff_eq!(lhs.cy(), rhs.cy());
            assert_abs_diff_eq!(lhs.cx() + 4.0, rhs.cx());
        });
    }

    #[test]
    fn anchors_concatenated_by_level() {
        let generator = AnchorGeneratorInit::default().build().unwrap();
        let shapes: Vec<_> = generator
            .level_names()
            .zip([8, 4, 2, 1, 1])
            .map(|(name, size)| FeatureShape::new(name, size, size))
            .collect();
        let anchors = generator.generate(&shapes).unwrap();
        assert_eq!(anchors.len(), (64 + 16 + 4 + 1 + 1) * 3);

        // the first anchor of P3 follows the last anchor of P2
        let p3_first = &anchors[64 * 3];
        assert_abs_diff_eq!(p3_first.cy(), 0.0);
        assert_abs_diff_eq!(p3_first.area(), 64.0 * 64.0, epsilon = 1e-9);
    }

    #[test]
    fn anchors_are_deterministic() {
        let generator = AnchorGeneratorInit::default().build().unwrap();
        let shapes: Vec<_> = generator
            .level_names()
            .map(|name| FeatureShape::new(name, 5, 7))
            .collect();
        assert_eq!(
            generator.generate(&shapes).unwrap(),
            generator.generate(&shapes).unwrap()
        );
    }

    #[test]
    fn empty_feature_map() {
        let generator = single_level(&[1.0], &[1.0]);
        let anchors = generator.generate(&[FeatureShape::new("P2", 0, 5)]).unwrap();
        assert!(anchors.is_empty());
    }

    #[test]
    fn reject_mismatched_levels() {
        let generator = AnchorGeneratorInit::default().build().unwrap();
        let mut shapes: Vec<_> = generator
            .level_names()
            .map(|name| FeatureShape::new(name, 2, 2))
            .collect();
        assert!(generator.generate(&shapes[1..]).is_err());

        shapes.swap(0, 1);
        assert!(generator.generate(&shapes).is_err());
    }

    #[test]
    fn reject_invalid_init() {
        let mut init = AnchorGeneratorInit::default();
        init.ratios.clear();
        assert!(init.build().is_err());

        let mut init = AnchorGeneratorInit::default();
        init.scales.push(r64(0.0));
        assert!(init.build().is_err());

        let mut init = AnchorGeneratorInit::default();
        init.levels[1].name = "P2".into();
        assert!(init.build().is_err());
    }
}
