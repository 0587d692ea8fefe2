// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 constants and command codes

use std::fmt;
use std::str::FromStr;

use anyhow::bail;

/// Number of PCRs in a bank
pub const PCR_COUNT: u32 = 24;

/// Size in bytes of a selection bitmap covering one bank
pub const PCR_SELECT_SIZE: usize = (PCR_COUNT / 8) as usize;

/// TPM 2.0 Command Codes (TPM_CC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TpmCc {
    PcrAllocate = 0x0000012B,
    PcrEvent = 0x0000013C,
    Startup = 0x00000144,
    Shutdown = 0x00000145,
    GetCapability = 0x0000017A,
    PcrRead = 0x0000017E,
}

impl TpmCc {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// Hash algorithm IDs (TPM_ALG_ID) that may back a PCR bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum TpmAlgId {
    Sha1 = 0x0004,
    Sha256 = 0x000B,
    Sha384 = 0x000C,
    Sha512 = 0x000D,
    Sm3_256 = 0x0012,
    Sha3_256 = 0x0027,
    Sha3_384 = 0x0028,
    Sha3_512 = 0x0029,
}

impl TpmAlgId {
    pub const ALL: [TpmAlgId; 8] = [
        TpmAlgId::Sha1,
        TpmAlgId::Sha256,
        TpmAlgId::Sha384,
        TpmAlgId::Sha512,
        TpmAlgId::Sm3_256,
        TpmAlgId::Sha3_256,
        TpmAlgId::Sha3_384,
        TpmAlgId::Sha3_512,
    ];

    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.to_u16() == v)
    }

    pub fn digest_size(self) -> usize {
        match self {
            TpmAlgId::Sha1 => 20,
            TpmAlgId::Sha256 | TpmAlgId::Sm3_256 | TpmAlgId::Sha3_256 => 32,
            TpmAlgId::Sha384 | TpmAlgId::Sha3_384 => 48,
            TpmAlgId::Sha512 | TpmAlgId::Sha3_512 => 64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TpmAlgId::Sha1 => "sha1",
            TpmAlgId::Sha256 => "sha256",
            TpmAlgId::Sha384 => "sha384",
            TpmAlgId::Sha512 => "sha512",
            TpmAlgId::Sm3_256 => "sm3-256",
            TpmAlgId::Sha3_256 => "sha3-256",
            TpmAlgId::Sha3_384 => "sha3-384",
            TpmAlgId::Sha3_512 => "sha3-512",
        }
    }
}

impl fmt::Display for TpmAlgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TpmAlgId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let alg = match s.to_ascii_lowercase().as_str() {
            "sha1" => TpmAlgId::Sha1,
            "sha256" | "sha2-256" => TpmAlgId::Sha256,
            "sha384" | "sha2-384" => TpmAlgId::Sha384,
            "sha512" | "sha2-512" => TpmAlgId::Sha512,
            "sm3-256" | "sm3_256" => TpmAlgId::Sm3_256,
            "sha3-256" => TpmAlgId::Sha3_256,
            "sha3-384" => TpmAlgId::Sha3_384,
            "sha3-512" => TpmAlgId::Sha3_512,
            _ => bail!("unrecognized hash algorithm '{}'", s),
        };
        Ok(alg)
    }
}

/// TPM 2.0 Permanent Handles
pub mod tpm_rh {
    pub const PW: u32 = 0x40000009; // Password authorization
    pub const PLATFORM: u32 = 0x4000000C;
}

/// TPM 2.0 Startup/Shutdown Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSu {
    Clear = 0x0000,
    State = 0x0001,
}

impl TpmSu {
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// TPM 2.0 Capability Types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TpmCap {
    Pcrs = 0x00000005,
}

impl TpmCap {
    pub fn to_u32(self) -> u32 {
        self as u32
    }
}

/// TPM command header tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TpmSt {
    NoSessions = 0x8001,
    Sessions = 0x8002,
}

impl TpmSt {
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0x8001 => Some(TpmSt::NoSessions),
            0x8002 => Some(TpmSt::Sessions),
            _ => None,
        }
    }
}
