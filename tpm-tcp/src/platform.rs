// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Simulator platform channel
//!
//! Out-of-band power and NV control of a simulated TPM. Every command is a
//! single big-endian `u32` answered by a big-endian `u32` acknowledgement.

use std::io::{Read, Write};
use std::net::TcpStream;

use tracing::{debug, warn};

use crate::config::PlatformConfig;
use crate::error::{Error, Phase, Result};
use crate::transport::{read_u32, write_u32};

/// `TPM_SESSION_END` on the platform port
pub const PLATFORM_SESSION_END: u32 = 20;

/// Platform commands understood by the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PlatformCommand {
    PowerOn = 1,
    PowerOff = 2,
    NvOn = 11,
    NvOff = 12,
}

impl PlatformCommand {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// Connection to the simulator's platform port
pub struct TcpPlatform<S = TcpStream> {
    stream: S,
}

impl TcpPlatform<TcpStream> {
    /// Connect to a running platform
    pub fn open(config: &PlatformConfig) -> Result<Self> {
        let stream = TcpStream::connect(&config.address).map_err(|source| Error::Connect {
            address: config.address.clone(),
            source,
        })?;
        debug!("connected to TCP platform at {}", config.address);
        Ok(Self::from_stream(stream))
    }
}

impl<S: Read + Write> TcpPlatform<S> {
    pub fn from_stream(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Send one platform command and check its acknowledgement
    pub fn send_command(&mut self, command: PlatformCommand) -> Result<()> {
        write_u32(&mut self.stream, command.to_u32())
            .map_err(Error::transport(Phase::ControlWrite))?;
        let ack_code = read_u32(&mut self.stream).map_err(Error::transport(Phase::AckRead))?;
        debug!("platform command {command:?} acknowledged with 0x{ack_code:x}");
        if ack_code != 0 {
            return Err(Error::Control { command, ack_code });
        }
        Ok(())
    }

    pub fn power_on(&mut self) -> Result<()> {
        self.send_command(PlatformCommand::PowerOn)
    }

    pub fn power_off(&mut self) -> Result<()> {
        self.send_command(PlatformCommand::PowerOff)
    }

    pub fn nv_on(&mut self) -> Result<()> {
        self.send_command(PlatformCommand::NvOn)
    }

    pub fn nv_off(&mut self) -> Result<()> {
        self.send_command(PlatformCommand::NvOff)
    }

    /// Reset the simulated TPM: NV off, power off, power on, NV on
    ///
    /// The TPM needs `TPM2_Startup` afterwards.
    pub fn power_cycle(&mut self) -> Result<()> {
        self.nv_off()?;
        self.power_off()?;
        self.power_on()?;
        self.nv_on()
    }

    /// End the session and release the connection
    ///
    /// The stream is dropped on every path; a failed session-end write is
    /// reported after the fact.
    pub fn close(self) -> Result<()> {
        let Self { mut stream } = self;
        let result = write_u32(&mut stream, PLATFORM_SESSION_END);
        drop(stream);
        result.map_err(|source| {
            warn!("failed to send session end to TCP platform: {source}");
            Error::Close { source }
        })
    }
}
