pub mod filter;
pub mod normalize;
pub mod types;

pub use filter::{ContextPolicy, FilterError};
pub use normalize::normalize;
pub use types::{CheckResults, GateOutcome, Verdict};
