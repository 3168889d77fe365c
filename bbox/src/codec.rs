//! Reference-relative box delta encoding.

use crate::{common::*, InvalidGeometry, Rect, TLBR};

/// The encoded form of a box against a reference box, in `[dy, dx, dh, dw]` order.
pub type Delta<T> = [T; 4];

/// Converts boxes to and from deltas relative to a reference box.
///
/// A box with center `(cy, cx)` and size `(h, w)` encoded against a reference
/// with center `(ry, rx)` and size `(rh, rw)` gives
///
/// ```text
/// [(cy - ry) / rh / sy, (cx - rx) / rw / sx, ln(h / rh) / sh, ln(w / rw) / sw]
/// ```
///
/// where `[sy, sx, sh, sw]` are the scale factors. Decoding is the exact inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxCodec<T> {
    scale_factors: [T; 4],
}

impl<T> BoxCodec<T>
where
    T: Float,
{
    /// Creates a codec with per-component normalization factors.
    pub fn new(scale_factors: [T; 4]) -> Result<Self> {
        let zero = T::zero();
        ensure!(
            scale_factors.iter().all(|&s| s > zero && s.is_finite()),
            "scale factors must be positive and finite"
        );

        Ok(Self { scale_factors })
    }

    pub fn scale_factors(&self) -> [T; 4] {
        self.scale_factors
    }

    /// Encodes `target` relative to `reference`.
    ///
    /// Both boxes must have positive height and width.
    pub fn encode<R1, R2>(&self, target: &R1, reference: &R2) -> Result<Delta<T>>
    where
        R1: Rect<Type = T>,
        R2: Rect<Type = T>,
    {
        ensure_proper("reference box", reference)?;
        ensure_proper("target box", target)?;

        let [sy, sx, sh, sw] = self.scale_factors;
        let [ry, rx, rh, rw] = reference.cycxhw();
        let [cy, cx, h, w] = target.cycxhw();

        let dy = (cy - ry) / rh / sy;
        let dx = (cx - rx) / rw / sx;
        let dh = (h / rh).ln() / sh;
        let dw = (w / rw).ln() / sw;

        Ok([dy, dx, dh, dw])
    }

    /// Decodes a delta against `reference` back to absolute coordinates.
    ///
    /// Large log-scale components may overflow to infinite coordinates, and
    /// NaN components fail the box construction. Callers decoding raw
    /// predictions should check [`is_finite`](crate::RectFloat::is_finite).
    pub fn decode<R>(&self, delta: &Delta<T>, reference: &R) -> Result<TLBR<T>>
    where
        R: Rect<Type = T>,
    {
        ensure_proper("reference box", reference)?;

        let [sy, sx, sh, sw] = self.scale_factors;
        let [dy, dx, dh, dw] = *delta;
        let [ry, rx, rh, rw] = reference.cycxhw();

        let cy = dy * sy * rh + ry;
        let cx = dx * sx * rw + rx;
        let h = (dh * sh).exp() * rh;
        let w = (dw * sw).exp() * rw;

        TLBR::try_from_cycxhw([cy, cx, h, w])
    }
}

fn ensure_proper<R>(what: &'static str, rect: &R) -> Result<()>
where
    R: Rect,
    R::Type: Float,
{
    if !rect.is_proper() {
        return Err(InvalidGeometry::new(what, rect.h(), rect.w()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RectFloat;
    use approx::assert_abs_diff_eq;

    #[test]
    fn encode_identical_is_zero() {
        let codec = BoxCodec::new([0.1, 0.1, 0.2, 0.2]).unwrap();
        let rect = TLBR::from_tlbr([0.0, 0.0, 10.0, 10.0]);
        let delta = codec.encode(&rect, &rect).unwrap();
        delta.iter().for_each(|&value| assert_abs_diff_eq!(value, 0.0));
    }

    #[test]
    fn encode_known_values() {
        let codec = BoxCodec::new([1.0, 1.0, 1.0, 1.0]).unwrap();
        let reference = TLBR::from_tlbr([0.0, 0.0, 10.0, 20.0]);
        let target = TLBR::from_tlbr([5.0, 10.0, 25.0, 30.0]);
        let [dy, dx, dh, dw] = codec.encode(&target, &reference).unwrap();

        // centers (15, 20) vs (5, 10)
        assert_abs_diff_eq!(dy, 1.0);
        assert_abs_diff_eq!(dx, 0.5);
        assert_abs_diff_eq!(dh, 2f64.ln());
        assert_abs_diff_eq!(dw, 0.0);
    }

    #[test]
    fn scale_factors_divide_on_encode() {
        let unit = BoxCodec::new([1.0, 1.0, 1.0, 1.0]).unwrap();
        let scaled = BoxCodec::new([0.1, 0.5, 0.2, 4.0]).unwrap();
        let reference = TLBR::from_tlbr([3.0, 1.0, 13.0, 9.0]);
        let target = TLBR::from_tlbr([4.0, -2.0, 20.0, 7.0]);

        let raw = unit.encode(&target, &reference).unwrap();
        let normalized = scaled.encode(&target, &reference).unwrap();
        raw.iter()
            .zip(normalized)
            .zip(scaled.scale_factors())
            .for_each(|((&raw, normalized), scale)| {
                assert_abs_diff_eq!(normalized * scale, raw, epsilon = 1e-12)
            });
    }

    #[test]
    fn decode_inverts_encode() {
        let references = [
            TLBR::from_tlbr([0.0, 0.0, 10.0, 10.0]),
            TLBR::from_tlbr([-8.0, 4.0, 24.0, 12.0]),
            TLBR::from_tlbr([100.5, 30.25, 140.0, 300.0]),
        ];
        let targets = [
            TLBR::from_tlbr([1.0, 2.0, 9.0, 30.0]),
            TLBR::from_tlbr([50.0, 60.0, 51.0, 61.5]),
            TLBR::from_tlbr([-3.0, -7.0, 200.0, 90.0]),
        ];
        let scale_factors = [[0.1, 0.1, 0.2, 0.2], [1.0, 1.0, 1.0, 1.0], [2.5, 0.3, 7.0, 0.01]];

        for scale_factors in scale_factors {
            let codec = BoxCodec::new(scale_factors).unwrap();
            for reference in &references {
                for target in &targets {
                    let delta = codec.encode(target, reference).unwrap();
                    let decoded = codec.decode(&delta, reference).unwrap();
                    decoded
                        .tlbr()
                        .iter()
                        .zip(target.tlbr())
                        .for_each(|(&lhs, rhs)| assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-9));
                }
            }
        }
    }

    #[test]
    fn degenerate_reference_is_rejected() {
        let codec = BoxCodec::new([0.1, 0.1, 0.2, 0.2]).unwrap();
        let flat = TLBR::from_tlbr([5.0, 0.0, 5.0, 10.0]);
        let rect = TLBR::from_tlbr([0.0, 0.0, 10.0, 10.0]);

        let err = codec.encode(&rect, &flat).unwrap_err();
        let geometry = err.downcast_ref::<InvalidGeometry>().unwrap();
        assert_eq!(geometry.what, "reference box");
        assert_eq!(geometry.h, 0.0);

        assert!(codec.encode(&flat, &rect).is_err());
        assert!(codec.decode(&[0.0; 4], &TLBR::<f64>::zeros()).is_err());
    }

    #[test]
    fn decode_inverts_large_scale_ratio() {
        let codec = BoxCodec::new([0.1, 0.1, 0.2, 0.2]).unwrap();
        let reference = TLBR::from_tlbr([0.0, 0.0, 16.0, 16.0]);
        let targets = [
            TLBR::from_tlbr([0.0, 0.0, 1200.0, 16.0]),
            TLBR::from_tlbr([-500.0, 3.0, 4500.0, 8003.0]),
            TLBR::from_tlbr([7.0, 7.0, 7.01, 7.02]),
        ];

        for target in &targets {
            let delta = codec.encode(target, &reference).unwrap();
            let decoded = codec.decode(&delta, &reference).unwrap();
            decoded
                .tlbr()
                .iter()
                .zip(target.tlbr())
                .for_each(|(&lhs, rhs)| assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-7));
        }
    }

    #[test]
    fn decode_extreme_deltas() {
        let codec = BoxCodec::new([1.0, 1.0, 1.0, 1.0]).unwrap();
        let reference = TLBR::from_tlbr([0.0, 0.0, 16.0, 16.0]);

        let overflow = codec.decode(&[0.0, 0.0, 1e6, 0.0], &reference).unwrap();
        assert!(!overflow.is_finite());
        assert!(codec.decode(&[0.0, 0.0, 0.0, 0.0], &reference).unwrap().is_finite());

        assert!(codec.decode(&[f64::NAN, 0.0, 0.0, 0.0], &reference).is_err());
        assert!(codec.decode(&[0.0, 0.0, f64::NAN, 0.0], &reference).is_err());
    }

    #[test]
    fn invalid_scale_factors() {
        assert!(BoxCodec::new([0.0, 1.0, 1.0, 1.0]).is_err());
        assert!(BoxCodec::new([1.0, -1.0, 1.0, 1.0]).is_err());
        assert!(BoxCodec::new([1.0, 1.0, f64::INFINITY, 1.0]).is_err());
    }
}
