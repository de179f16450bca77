//! Pixel-level building blocks shared by the still composite and the live clip.

pub mod caption;
pub mod filters;
pub mod normalize;
pub mod overlay;
