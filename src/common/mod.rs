// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod retry;

// Shared aliases for frequently used modules.
pub use crate::domain::constants;
pub use crate::domain::error;
