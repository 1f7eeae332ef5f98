// SPDX-License-Identifier: GPL-2.0-or-later

/// Boxed error used at seams that forward an arbitrary node-supplied cause
/// without naming its concrete type (e.g. `NodeError::Other`).
pub type DynError = Box<dyn std::error::Error + Send + Sync>;
