//! Class-labeled boxes and padded label rows.

use anyhow::{ensure, Context as _, Result};
use bbox::{prelude::*, TLBR};
use num_traits::{Float, NumCast};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Label<R, C>
where
    R: Rect,
{
    pub rect: R,
    pub class: C,
}

impl<T, C> Label<TLBR<T>, C>
where
    T: Float,
    C: NumCast,
{
    /// Parses a `[y1, x1, y2, x2, class]` row.
    pub fn try_from_row(row: &[T; 5]) -> Result<Self> {
        let [t, l, b, r, class] = *row;
        let rect = TLBR::try_from_tlbr([t, l, b, r])?;
        ensure!(
            class >= T::zero() && class.fract() == T::zero(),
            "class label must be a non-negative integer"
        );
        let class = <C as NumCast>::from(class).context("class label is out of range")?;
        Ok(Self { rect, class })
    }
}

/// Parses zero-padded label rows, dropping every row whose box is all-zero.
///
/// The relative order of the remaining rows is preserved.
pub fn trim_padding<T, C>(rows: &[[T; 5]]) -> Result<Vec<Label<TLBR<T>, C>>>
where
    T: Float,
    C: NumCast,
{
    rows.iter()
        .enumerate()
        .filter(|(_, [t, l, b, r, _])| {
            let zero = T::zero();
            !(*t == zero && *l == zero && *b == zero && *r == zero)
        })
        .map(|(index, row)| {
            Label::try_from_row(row).with_context(|| format!("invalid label row {}", index))
        })
        .collect()
}
