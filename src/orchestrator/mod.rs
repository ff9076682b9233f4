mod runner;

pub use runner::{FlowRunner, RunOutcome};
