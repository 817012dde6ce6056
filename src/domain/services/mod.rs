mod cache_policy;

pub use cache_policy::{CacheLookup, CachePolicy};
