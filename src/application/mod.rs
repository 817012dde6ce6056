mod batch_resolver;
mod context;
mod resolution_service;

#[cfg(test)]
mod test_support;

pub use batch_resolver::BatchResolver;
pub use context::ResolverSettings;
pub use resolution_service::ResolutionService;
