pub mod navigator;
pub mod ratio;
pub mod size_cache;

pub use navigator::{ListingRow, Navigator};
pub use ratio::{RatioBreakdown, RatioSlice};
pub use size_cache::SizeCache;
