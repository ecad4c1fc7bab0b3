pub mod analysis;
pub mod batch;
pub mod rate_limit;
