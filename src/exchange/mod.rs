pub mod factory;
mod traits;

pub use factory::{build_collaborators, Collaborators};
pub use traits::{AccountClient, ExecutionMode, IndicatorFeed, OrderGateway};

#[cfg(test)]
pub use traits::MockOrderGateway;
