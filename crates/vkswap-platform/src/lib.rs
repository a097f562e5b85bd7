// SPDX-License-Identifier: CEPL-1.0
//! Windowing for the player and the GPU tests.
pub use winit;
