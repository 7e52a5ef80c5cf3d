//! Silicon model for the CFD inference accelerator.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the programmable-logic block: the AXI-Lite register map of
//! the four prediction engines, the Q-format used by every data register,
//! and the deployment constants of the block itself.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`axi`] | Block base address, register width, block length |
//! | [`engine`] | `EngineIndex` and start masks for the control register |
//! | [`regs`] | Register map: control, status, per-engine input/output windows |
//! | [`qformat`] | Signed fixed-point codec (`f64` ⇄ `i32`, run-time fractional bits) |
//!
//! # Block layout
//!
//! ```text
//! index  0        CONTROL   engine start bits (edge-triggered, write mask then 0)
//! index  1        STATUS    bit 2·e+1 = engine e busy
//! index  2..=13   engine 0  inputs 2..=9 (reversed), outputs 10..=13
//! index 14..=25   engine 1
//! index 26..=37   engine 2
//! index 38..=49   engine 3
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod axi;
pub mod engine;
pub mod qformat;
pub mod regs;

pub use engine::{EngineIndex, EngineMask, ENGINE_COUNT};
pub use qformat::QFormat;
