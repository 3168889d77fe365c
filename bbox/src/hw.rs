use crate::common::*;

/// A non-negative height and width, e.g. an image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HW<T> {
    h: T,
    w: T,
}

impl<T> HW<T>
where
    T: Copy + Num + PartialOrd,
{
    pub fn try_from_hw([h, w]: [T; 2]) -> Result<Self> {
        let zero = T::zero();
        ensure!(
            h >= zero && w >= zero,
            "height and width must be non-negative"
        );
        Ok(Self { h, w })
    }

    /// Panicking variant of [`try_from_hw`](HW::try_from_hw).
    pub fn from_hw(hw: [T; 2]) -> Self {
        Self::try_from_hw(hw).unwrap()
    }

    pub fn h(&self) -> T {
        self.h
    }

    pub fn w(&self) -> T {
        self.w
    }

    pub fn hw(&self) -> [T; 2] {
        [self.h, self.w]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size() {
        let size = HW::from_hw([480.0, 640.0]);
        assert_eq!(size.hw(), [480.0, 640.0]);
        assert!(HW::try_from_hw([-1.0, 640.0]).is_err());
        assert!(HW::try_from_hw([0.0, 0.0]).is_ok());
    }
}
