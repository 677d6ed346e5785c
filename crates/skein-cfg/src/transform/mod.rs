// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Passes over a lowered graph.

pub mod suspension;
