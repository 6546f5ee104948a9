#![cfg_attr(not(any(test, feature = "std")), no_std)]
//! `syntonic` is an IEEE 1588-2019 / PTP synchronization engine.
//!
//! The crate implements the computational core of a PTP node: the message
//! codec, the best master clock algorithm (dataset comparison and state
//! decision), the per-port state machine, and the clock servo that turns
//! timestamp exchanges into adjustment commands. It performs no I/O itself;
//! sockets, timers, and the physical clock are injected through small traits
//! and driven by a host runtime.
//!
//! ## Where to start
//!
//! - Wire codec: [`wire`]
//! - Port state machine (IEEE 1588 state chart as objects): [`portstate::PortState`]
//! - Dataset comparison and foreign master tracking: [`bmca`]
//! - Clock-wide state decision: [`selection`]
//! - Offset/delay computation: [`e2e`] and [`servo`]
//! - Multi-port orchestration: [`boundary::BoundaryClock`]
//!
//! For an end-to-end reference wiring, see the `syntonic-daemon` crate in this
//! repository.
//!
//! ## `no_std`
//!
//! The core supports `no_std` when the `std` feature is disabled. Depending on
//! `syntonic` with `default-features = false` builds the core as `no_std`, and
//! `heapless-storage` provides bounded foreign-record storage for constrained
//! targets.
//!
//! # Feature flags
//!
//! - `std` (default): standard-library support and `Vec`-based storage.
//! - `heapless-storage` (default): bounded storage for constrained targets.
//! - `test-support`: extra test helpers (fake clocks/ports, etc.).

pub mod bmca;
pub mod boundary;
pub mod clock;
pub mod e2e;
pub mod log;
pub mod message;
pub mod ordinary;
pub mod port;
pub mod portstate;
pub mod profile;
pub mod result;
pub mod selection;
pub mod servo;
pub mod signaling;
pub mod time;
pub mod timestamping;
pub mod wire;

mod disabled;
mod faulty;
mod initializing;
mod listening;
mod master;
mod passive;
mod premaster;
mod slave;
mod uncalibrated;

#[cfg(any(test, feature = "std"))]
pub mod infra;

#[cfg(feature = "heapless-storage")]
pub mod heapless;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
