pub mod attempt_pruner;

pub use attempt_pruner::AttemptLogPruner;
