pub mod blend;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod surface;
pub mod text;
