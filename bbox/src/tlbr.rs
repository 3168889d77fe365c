use crate::{common::*, Rect, HW};

/// A box stored by its top, left, bottom and right edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TLBR<T> {
    t: T,
    l: T,
    b: T,
    r: T,
}

impl<T> TLBR<T>
where
    T: Copy + Num,
{
    /// The all-zero box used as padding.
    pub fn zeros() -> Self {
        let zero = T::zero();
        Self {
            t: zero,
            l: zero,
            b: zero,
            r: zero,
        }
    }
}

impl<T> TLBR<T>
where
    T: Float,
{
    /// Clamps the coordinates into `[0, h] x [0, w]` of an image.
    ///
    /// A box lying fully outside collapses onto the nearest image border.
    pub fn clip_to(&self, size: &HW<T>) -> Self {
        let zero = T::zero();
        let clamp = |value: T, max: T| value.max(zero).min(max);
        let (h, w) = (size.h(), size.w());

        Self {
            t: clamp(self.t, h),
            l: clamp(self.l, w),
            b: clamp(self.b, h),
            r: clamp(self.r, w),
        }
    }
}

impl<T> Rect for TLBR<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn t(&self) -> T {
        self.t
    }

    fn l(&self) -> T {
        self.l
    }

    fn b(&self) -> T {
        self.b
    }

    fn r(&self) -> T {
        self.r
    }

    fn try_from_tlbr([t, l, b, r]: [T; 4]) -> Result<Self> {
        ensure!(
            b >= t && r >= l,
            "box edges must satisfy b >= t and r >= l"
        );
        Ok(Self { t, l, b, r })
    }
}
