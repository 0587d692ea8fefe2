// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM command builder and response parser

use anyhow::{bail, Result};

use super::constants::*;
use super::marshal::*;
use crate::rc::{self, Diagnosis};

const TPM_HEADER_SIZE: usize = 10;

/// TPM command builder
pub struct TpmCommand {
    buf: CommandBuffer,
}

impl TpmCommand {
    /// Create a new command without sessions
    pub fn new(command_code: TpmCc) -> Self {
        Self::with_tag(TpmSt::NoSessions, command_code)
    }

    /// Create a new command with sessions
    pub fn with_sessions(command_code: TpmCc) -> Self {
        Self::with_tag(TpmSt::Sessions, command_code)
    }

    fn with_tag(tag: TpmSt, command_code: TpmCc) -> Self {
        let mut buf = CommandBuffer::with_capacity(256);

        // Header: tag (2) + size (4) + command code (4)
        buf.put_u16(tag.to_u16());
        buf.put_u32(0); // Size placeholder
        buf.put_u32(command_code.to_u32());

        Self { buf }
    }

    /// Add a handle
    pub fn add_handle(&mut self, handle: u32) {
        self.buf.put_u32(handle);
    }

    /// Add raw bytes
    pub fn add_bytes(&mut self, data: &[u8]) {
        self.buf.put_bytes(data);
    }

    /// Add a u16 parameter
    pub fn add_u16(&mut self, v: u16) {
        self.buf.put_u16(v);
    }

    /// Add a u32 parameter
    pub fn add_u32(&mut self, v: u32) {
        self.buf.put_u32(v);
    }

    /// Add a TPM2B structure (size-prefixed buffer)
    pub fn add_tpm2b(&mut self, data: &[u8]) {
        self.buf.put_tpm2b(data);
    }

    /// Add a marshallable value
    pub fn add<T: Marshal>(&mut self, value: &T) {
        value.marshal(&mut self.buf);
    }

    /// Add an authorization area holding one password session with empty auth
    pub fn add_null_auth_area(&mut self) {
        self.buf.put_bytes(&null_auth_area());
    }

    /// Patch the size field and return the command bytes
    pub fn finalize(mut self) -> Vec<u8> {
        let size = self.buf.len() as u32;
        self.buf.update_u32(2, size);
        self.buf.into_vec()
    }
}

/// Size-prefixed authorization area with a single password session
///
/// Session handle (4) + nonce (2) + attributes (1) + auth (2), preceded by
/// the 4-byte area size.
pub fn null_auth_area() -> Vec<u8> {
    let mut session = CommandBuffer::with_capacity(9);
    session.put_u32(tpm_rh::PW);
    session.put_tpm2b_empty(); // nonceCaller
    session.put_u8(0); // sessionAttributes
    session.put_tpm2b_empty(); // hmac (empty password)

    let mut area = CommandBuffer::with_capacity(4 + session.len());
    area.put_u32(session.len() as u32);
    area.put_bytes(session.as_bytes());
    area.into_vec()
}

/// TPM response parser
#[derive(Debug)]
pub struct TpmResponse {
    pub tag: TpmSt,
    pub response_code: u32,
    pub data: Vec<u8>,
}

impl TpmResponse {
    pub fn parse(response: &[u8]) -> Result<Self> {
        if response.len() < TPM_HEADER_SIZE {
            bail!("TPM response too short: {} bytes", response.len());
        }

        let mut buf = ResponseBuffer::new(response);

        let tag_raw = buf.get_u16()?;
        let tag = TpmSt::from_u16(tag_raw)
            .ok_or_else(|| anyhow::anyhow!("invalid response tag: 0x{:04x}", tag_raw))?;

        let size = buf.get_u32()? as usize;
        if size < TPM_HEADER_SIZE || response.len() < size {
            bail!(
                "TPM response size mismatch: header says {}, got {}",
                size,
                response.len()
            );
        }

        let response_code = buf.get_u32()?;
        let data = response[TPM_HEADER_SIZE..size].to_vec();

        Ok(Self {
            tag,
            response_code,
            data,
        })
    }

    pub fn is_success(&self) -> bool {
        self.response_code == 0
    }

    pub fn diagnosis(&self) -> Diagnosis {
        rc::decode(self.response_code)
    }

    /// Fail with the decoded response code unless it is `TPM_RC_SUCCESS`
    pub fn ensure_success(&self) -> Result<()> {
        match self.diagnosis() {
            Diagnosis::Success => Ok(()),
            diag => Err(diag.into()),
        }
    }

    pub fn data_buffer(&self) -> ResponseBuffer<'_> {
        ResponseBuffer::new(&self.data)
    }

    /// Skip the parameter size field (for commands with sessions)
    pub fn skip_parameter_size(&self) -> Result<ResponseBuffer<'_>> {
        let mut buf = self.data_buffer();
        if self.tag == TpmSt::Sessions {
            let _param_size = buf.get_u32()?;
        }
        Ok(buf)
    }
}
