pub mod distribution;
pub mod format;
pub mod immutable;
pub mod math;
