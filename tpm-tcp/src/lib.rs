// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Client for TPM 2.0 simulators exposed over TCP
//!
//! This crate talks to a TPM (typically the Microsoft reference simulator)
//! through its two TCP ports and helps make sense of what comes back.
//!
//! ## Features
//!
//! - **Command channel**: [`TcpTpm`] frames commands for the simulator's
//!   command port and buffers the response; anything that needs a TPM only
//!   depends on the [`TpmTransport`] trait
//! - **Platform channel**: [`TcpPlatform`] powers the simulated TPM on and off
//!   and toggles NV availability
//! - **Response codes**: [`rc::decode`] turns a raw `TPM_RC` into a
//!   [`Diagnosis`] with its symbolic name and description
//! - **PCR banks**: [`TpmContext::pcr_allocate`] reallocates PCR banks,
//!   skipping banks that are already in the wanted state
//!
//! ## Example
//!
//! ```no_run
//! use tpm_tcp::{TcpConfig, TpmAlgId, TpmContext, TpmSu};
//!
//! let mut ctx = TpmContext::open(&TcpConfig::default())?;
//! ctx.startup(TpmSu::Clear)?;
//! let banks = ctx.pcr_banks()?;
//! println!("active banks: {banks:?}");
//! ctx.pcr_allocate(&[TpmAlgId::Sha256, TpmAlgId::Sha384])?;
//! ctx.close()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

mod command;
mod commands;
mod config;
mod constants;
mod error;
mod marshal;
pub mod pcr_allocate;
pub mod platform;
pub mod rc;
mod transport;
mod types;

pub use command::{null_auth_area, TpmCommand, TpmResponse};
pub use commands::{TpmContext, MAX_EVENT_SIZE};
pub use config::*;
pub use constants::*;
pub use error::{Error, Phase, Result};
pub use marshal::{CommandBuffer, Marshal, ResponseBuffer, Unmarshal};
pub use pcr_allocate::{PcrAllocateError, PcrAllocateResponse};
pub use platform::{PlatformCommand, TcpPlatform};
pub use rc::{Diagnosis, Relation};
pub use transport::{TcpTpm, TpmTransport, TCP_SEND_COMMAND, TCP_SESSION_END};
pub use types::*;
