pub mod batcher;
pub mod resolver;

pub use resolver::PrResolver;
