//! `puckbot-runtime` – Behavior Engine
//!
//! Runs the two behavior machines on fixed timesteps, shapes every command
//! on its way to the wheels, and decides which machine is in charge.
//!
//! # Modules
//!
//! - [`periodic`] – [`Behavior`][periodic::Behavior] (per-tick logic) and
//!   [`Controller`][periodic::Controller] (start/stop/tick lifecycle),
//!   implemented for any behavior by [`PeriodicTask`][periodic::PeriodicTask]
//!   on a tokio interval.
//! - [`composer`] – [`ControllerComposer`][composer::ControllerComposer]: the
//!   set of registered machines.  It does not arbitrate the actuator.
//! - [`governor`] – [`OutputGovernor`][governor::OutputGovernor]: voltage and
//!   wear compensation, clamping, dispatch, and scheduling of the stall
//!   evaluation that follows every command.
//! - [`sequence`] – [`ActionSequence`][sequence::ActionSequence]: the blocking
//!   get-free, re-arm, dismount and flee maneuvers, paced by a
//!   [`Pacer`][sequence::Pacer].
//! - [`machine`] – [`Wiring`][machine::Wiring] and
//!   [`MachineParts`][machine::MachineParts]: the collaborators each machine
//!   owns, plus the search wander and the approach control law.
//! - [`charging`] – [`ChargingMachine`][charging::ChargingMachine].
//! - [`mating`] – [`MatingMachine`][mating::MatingMachine], exchanging a
//!   [`GenePool`][genes::GenePool] with a peer.
//! - [`genes`] – the gene payload and its exchange rule.
//! - [`supervisor`] – [`Supervisor`][supervisor::Supervisor]: battery
//!   hysteresis between the machines, safety events, shutdown and restore.
//! - [`usage`] – [`UsageRecorder`][usage::UsageRecorder]: periodic rows into
//!   the usage CSV.
//! - [`config`] – [`RobotConfig`][config::RobotConfig].
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod charging;
pub mod composer;
pub mod config;
pub mod genes;
pub mod governor;
pub mod machine;
pub mod mating;
pub mod periodic;
pub mod sequence;
pub mod supervisor;
pub mod telemetry;
pub mod usage;

pub use charging::{ChargingMachine, ChargingState};
pub use composer::ControllerComposer;
pub use config::RobotConfig;
pub use genes::GenePool;
pub use governor::{OutputGovernor, WheelBias};
pub use machine::{MachineParts, StateCell, Wiring};
pub use mating::{MatingMachine, MatingState};
pub use periodic::{Behavior, Controller, PeriodicTask};
pub use sequence::{ActionSequence, Pacer, ThreadPacer};
pub use supervisor::Supervisor;
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use usage::{RecorderHandle, UsageRecorder};
