pub mod engine;
pub mod money;
pub mod policy;
pub mod surge;
pub mod window;

pub use engine::{Demand, SurgeEngine};
pub use policy::{PricingPolicy, SurgeMode};
pub use surge::{AttemptState, Quote, SurgePhase};
