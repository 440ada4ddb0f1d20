//! Structure from Motion module
//!
//! This crate provides algorithms for 3D reconstruction from
//! multiple 2D images whose camera poses are already known.

pub mod mvs;

pub use mvs::{MultiViewStereo, MvsConfig, MvsError};
