// SPDX-License-Identifier: MIT

//! CLI command implementations — each operates directly on the filesystem
//! queue and artifact store; there is no daemon IPC surface.

pub mod approve;
pub mod result;
pub mod status;
pub mod submit;
pub mod unlock;
