//! Webhook reconciliation: keep the host's event listener registrations in
//! line with the "listen to event" triggers declared in workflow source.
//!
//! - `plan` -- pure three-way diff (create / update / delete)
//! - `engine` -- the control loop: list, diff, converge, sleep

pub mod engine;
pub mod plan;

pub use engine::{
    AppSwitch, ConvergeReport, CycleOutcome, ReconcileEngine, ReconcileHandle, ReconcilePhase,
    ReconcileSettings, spawn,
};
pub use plan::{ListenerMutation, ReconcilePlan, plan};
