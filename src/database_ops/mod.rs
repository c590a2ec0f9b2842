pub mod error;
pub mod osu;
pub mod persist;
pub mod rate_limit;
pub mod scheduler;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;
