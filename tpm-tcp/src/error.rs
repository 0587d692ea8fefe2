// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::io;

use thiserror::Error;

use crate::platform::PlatformCommand;
use crate::rc::{self, Diagnosis};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Step of an exchange that hit an I/O failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FrameWrite,
    LengthRead,
    PayloadRead,
    CodeRead,
    ControlWrite,
    AckRead,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::FrameWrite => "send command frame",
            Phase::LengthRead => "read response length",
            Phase::PayloadRead => "read response payload",
            Phase::CodeRead => "read response code",
            Phase::ControlWrite => "send platform command",
            Phase::AckRead => "read platform acknowledgement",
        };
        f.write_str(s)
    }
}

/// Errors raised by the TCP command and platform channels
///
/// After a `Transport` error the connection state is unknown (a partial frame
/// may be on the wire) and the handle must not be reused.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not connect to {address}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("could not {phase}")]
    Transport {
        phase: Phase,
        #[source]
        source: io::Error,
    },
    #[error("command of {0} bytes does not fit the frame length field")]
    CommandTooLarge(usize),
    #[error("error from TCP TPM: 0x{raw_code:x}")]
    Protocol { raw_code: u32 },
    #[error("platform command {command:?} failed: 0x{ack_code:x}")]
    Control {
        command: PlatformCommand,
        ack_code: u32,
    },
    #[error("could not send session end, connection closed anyway")]
    Close {
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn transport(phase: Phase) -> impl FnOnce(io::Error) -> Error {
        move |source| Error::Transport { phase, source }
    }

    /// Decode the code the module returned, for `Protocol` errors
    pub fn diagnosis(&self) -> Option<Diagnosis> {
        match self {
            Error::Protocol { raw_code } => Some(rc::decode(*raw_code)),
            _ => None,
        }
    }
}
