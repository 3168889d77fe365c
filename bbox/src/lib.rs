//! Axis-aligned boxes, overlap measures and the reference-relative delta codec.

mod common;

pub mod codec;
pub mod error;
pub mod hw;
pub mod rect;
pub mod tlbr;

pub use codec::*;
pub use error::*;
pub use hw::*;
pub use rect::*;
pub use tlbr::*;

pub mod prelude {
    pub use crate::rect::{Rect, RectFloat};
}
