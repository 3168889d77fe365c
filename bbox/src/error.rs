use thiserror::Error;

/// A box whose height or width cannot serve as a geometric reference.
///
/// It is raised instead of letting `ln(0)` or a division by zero leak
/// infinities into encoded targets.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid box geometry: {what} must have positive height and width, but got h = {h}, w = {w}")]
pub struct InvalidGeometry {
    pub what: &'static str,
    pub h: f64,
    pub w: f64,
}

impl InvalidGeometry {
    pub(crate) fn new<T>(what: &'static str, h: T, w: T) -> Self
    where
        T: num_traits::ToPrimitive,
    {
        Self {
            what,
            h: h.to_f64().unwrap_or(f64::NAN),
            w: w.to_f64().unwrap_or(f64::NAN),
        }
    }
}
