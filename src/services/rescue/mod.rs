// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

pub mod attempt;
pub mod engine;
pub mod orchestrator;
pub mod patrol;
