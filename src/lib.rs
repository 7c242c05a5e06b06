#![cfg_attr(not(feature = "std"), no_std)]

//! Compass calibration - online hard-iron and soft-iron calibration for magnetometers
//!
//! This library learns the bias (hard iron) and per-axis gain (soft iron) of a
//! 3-axis magnetometer from the stream of uncalibrated readings a sensor driver
//! already produces, decides when it has seen enough of the sphere to trust a
//! calibration, and corrects every reading with the calibration in force.
//!
//! Two strategies are available behind one [`CalibrationStrategy`] interface:
//!
//! - **Bounding box**: tracks per-axis min/max, requires each axis to span
//!   twice the weakest plausible Earth field and every coverage bucket to be
//!   visited, then centres and equalises the axes.
//! - **Ellipsoid** (default): least-squares fit of an axis-aligned ellipsoid on
//!   one pool of samples, validated on a second held-out pool. A fit replaces
//!   the calibration in force only if it beats an absolute error bound and
//!   the previous calibration's error on the same pool, so accepted
//!   calibrations never regress.
//!
//! # Features
//!
//! - Spike, out-of-range and near-duplicate sample rejection
//! - Seeding from a calibration stored in a previous session
//! - Text record persistence ([`CalibrationRecord`], [`FileStore`])
//! - Output smoothing and device axis remapping in [`CompassDriver`]
//! - `#![no_std]` compatible without the default `std` feature
//!
//! # Quick Start
//!
//! ```rust
//! use compass_calibration::{CalibrationEngine, EngineSettings};
//!
//! let mut engine = CalibrationEngine::new(EngineSettings::default()).unwrap();
//! engine.init(None);
//!
//! // Once per sensor reading, in µT with a millisecond timestamp
//! engine.collect(21.5, -4.0, 37.25, 1_000);
//!
//! if engine.ready_check() {
//!     let transform = engine.compute().unwrap();
//!     println!("offset {:?} gains {:?}", transform.offset, transform.scale);
//! }
//! ```

mod axes;
pub mod bounding_box;
mod driver;
pub mod ellipsoid;
mod engine;
mod error;
pub mod filter;
mod math;
pub mod record;
#[cfg(feature = "std")]
mod shared;
mod smoothing;
mod strategy;
mod types;

// Re-export all public types
pub use axes::AxisMapping;
pub use bounding_box::{BoundingBox, Bounds};
pub use driver::CompassDriver;
pub use ellipsoid::{Ellipsoid, FitOutcome};
pub use engine::CalibrationEngine;
pub use error::{CalibrationError, CalibrationResult};
pub use filter::{Rejection, SampleFilter};
#[cfg(feature = "std")]
pub use record::FileStore;
pub use record::{CalibrationRecord, CalibrationStore, MemoryStore};
#[cfg(feature = "std")]
pub use shared::{CalibrationSnapshot, SharedCalibration};
pub use smoothing::Smoother;
pub use strategy::{CalibrationStrategy, Strategy};
pub use types::*;
