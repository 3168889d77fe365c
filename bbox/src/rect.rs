use crate::common::*;

/// An axis-aligned box in image coordinates.
///
/// Coordinates follow the `(y1, x1, y2, x2)` convention: `t` and `b` run
/// along the image rows, `l` and `r` along the columns. Implementors provide
/// the four edges, everything else is derived from them.
pub trait Rect: Sized {
    type Type: Copy + Num + PartialOrd;

    fn t(&self) -> Self::Type;
    fn l(&self) -> Self::Type;
    fn b(&self) -> Self::Type;
    fn r(&self) -> Self::Type;

    /// Builds a box from its edges, failing if `b < t` or `r < l`.
    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self>;

    fn try_from_cycxhw(cycxhw: [Self::Type; 4]) -> Result<Self> {
        let [cy, cx, h, w] = cycxhw;
        let zero = Self::Type::zero();
        ensure!(
            h >= zero && w >= zero,
            "box height and width must be non-negative"
        );

        let two = Self::Type::one() + Self::Type::one();
        let (half_h, half_w) = (h / two, w / two);
        Self::try_from_tlbr([cy - half_h, cx - half_w, cy + half_h, cx + half_w])
    }

    /// Panicking variant of [`try_from_tlbr`](Rect::try_from_tlbr).
    fn from_tlbr(tlbr: [Self::Type; 4]) -> Self {
        Self::try_from_tlbr(tlbr).unwrap()
    }

    /// Panicking variant of [`try_from_cycxhw`](Rect::try_from_cycxhw).
    fn from_cycxhw(cycxhw: [Self::Type; 4]) -> Self {
        Self::try_from_cycxhw(cycxhw).unwrap()
    }

    fn h(&self) -> Self::Type {
        self.b() - self.t()
    }

    fn w(&self) -> Self::Type {
        self.r() - self.l()
    }

    fn cy(&self) -> Self::Type {
        let two = Self::Type::one() + Self::Type::one();
        (self.t() + self.b()) / two
    }

    fn cx(&self) -> Self::Type {
        let two = Self::Type::one() + Self::Type::one();
        (self.l() + self.r()) / two
    }

    fn tlbr(&self) -> [Self::Type; 4] {
        [self.t(), self.l(), self.b(), self.r()]
    }

    fn cycxhw(&self) -> [Self::Type; 4] {
        [self.cy(), self.cx(), self.h(), self.w()]
    }

    fn hw(&self) -> [Self::Type; 2] {
        [self.h(), self.w()]
    }

    fn area(&self) -> Self::Type {
        self.h() * self.w()
    }

    /// Checks whether all four coordinates are zero.
    ///
    /// Zero boxes mark padding rows and absent entries.
    fn is_zero(&self) -> bool {
        let zero = Self::Type::zero();
        self.tlbr().iter().all(|&value| value == zero)
    }

    /// Checks whether the box has positive height and width.
    fn is_proper(&self) -> bool {
        let zero = Self::Type::zero();
        self.h() > zero && self.w() > zero
    }
}

/// Overlap measures on floating point boxes.
pub trait RectFloat: Rect
where
    Self::Type: Float,
{
    /// The area shared by both boxes, zero if they are disjoint or touching.
    fn intersection_area_with<R>(&self, other: &R) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        let zero = Self::Type::zero();
        let h = self.b().min(other.b()) - self.t().max(other.t());
        let w = self.r().min(other.r()) - self.l().max(other.l());
        if h > zero && w > zero {
            h * w
        } else {
            zero
        }
    }

    /// Checks whether all four coordinates are finite.
    fn is_finite(&self) -> bool {
        self.tlbr().iter().all(|value| value.is_finite())
    }

    /// Computes the intersection over union.
    ///
    /// The result lies in `[0, 1]`. It is zero, never NaN, if either box
    /// has zero area.
    fn iou_with<R>(&self, other: &R) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        let zero = Self::Type::zero();
        let inter_area = self.intersection_area_with(other);
        if inter_area <= zero {
            return zero;
        }

        let union_area = self.area() + other.area() - inter_area;
        if union_area <= zero {
            return zero;
        }
        (inter_area / union_area).min(Self::Type::one())
    }
}

impl<R> RectFloat for R
where
    R: Rect,
    R::Type: Float,
{
}
