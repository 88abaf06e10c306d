// SPDX-License-Identifier: GPL-3.0-only

//! Still image encoding
//!
//! The same [`FrameEncoder`] produces stream parts and snapshot files.

pub mod encoding;

pub use encoding::{FrameEncoder, save_snapshot};
