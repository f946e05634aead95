// SPDX-License-Identifier: GPL-2.0

//! Abstract transformer, forward fixpoint and property checker

pub mod checker;
pub mod fixpoint;
pub mod transformer;

pub use checker::{generate_report, CheckKind, ChecksDb};
pub use fixpoint::{run_forward, FixpointStats, InvariantTable};
pub use transformer::AbsTransformer;
