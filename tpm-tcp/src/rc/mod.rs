// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 response code decoding
//!
//! Classifies a raw `TPM_RC` value according to the bit layout in TPM 2.0
//! Library Part 2, section 6.6 and resolves it against the reference tables.
//!
//! ```
//! use tpm_tcp::rc::{decode, Diagnosis, Relation};
//!
//! let diag = decode(0x1c4);
//! assert!(matches!(
//!     diag,
//!     Diagnosis::StructuredError { code: 0x04, relation: Relation::Parameter, index: 1, .. }
//! ));
//! assert_eq!(diag.name(), "TPM_RC_VALUE");
//! ```

use std::fmt;

pub mod tables;

pub use tables::RcDetails;

const RC_FMT1: u32 = 0x080;
const RC_VER1: u32 = 0x100;
const RC_WARN: u32 = 0x800;
const RC_P: u32 = 0x040;
const RC_S: u32 = 0x800;

const UNKNOWN_NAME: &str = "<unknown>";

/// Which part of a command a format-one error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Handle,
    Parameter,
    Session,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relation::Handle => "handle",
            Relation::Parameter => "parameter",
            Relation::Session => "session",
        };
        f.write_str(s)
    }
}

/// Decoded meaning of a raw response code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Diagnosis {
    Success,
    /// TPM 1.2 style code, kept verbatim
    LegacyCode { raw: u32 },
    /// Format-zero error defined by TPM 2.0
    ClassicError { raw: u32, code: u32 },
    Warning { raw: u32, code: u32 },
    /// Format-one error; `index` is 1-based, 0 when unspecified
    StructuredError {
        raw: u32,
        code: u32,
        relation: Relation,
        index: u32,
    },
    /// Value outside the range any TPM returns
    InvalidCode { raw: u32 },
}

/// Classify a raw response code. Never fails.
pub fn decode(raw: u32) -> Diagnosis {
    if raw == 0 {
        return Diagnosis::Success;
    }
    if raw > i32::MAX as u32 {
        return Diagnosis::InvalidCode { raw };
    }
    if raw & RC_FMT1 == 0 {
        if raw & RC_VER1 == 0 {
            return Diagnosis::LegacyCode { raw };
        }
        let code = raw & 0x7f;
        if raw & RC_WARN != 0 {
            return Diagnosis::Warning { raw, code };
        }
        return Diagnosis::ClassicError { raw, code };
    }

    let code = raw & 0x3f;
    let (relation, index) = if raw & RC_P != 0 {
        (Relation::Parameter, (raw >> 8) & 0xf)
    } else if raw & RC_S != 0 {
        (Relation::Session, (raw >> 8) & 0x7)
    } else {
        (Relation::Handle, (raw >> 8) & 0x7)
    };
    Diagnosis::StructuredError {
        raw,
        code,
        relation,
        index,
    }
}

impl Diagnosis {
    /// The raw value this diagnosis was decoded from
    pub fn raw(&self) -> u32 {
        match *self {
            Diagnosis::Success => 0,
            Diagnosis::LegacyCode { raw }
            | Diagnosis::ClassicError { raw, .. }
            | Diagnosis::Warning { raw, .. }
            | Diagnosis::StructuredError { raw, .. }
            | Diagnosis::InvalidCode { raw } => raw,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Diagnosis::Success)
    }

    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnosis::Warning { .. })
    }

    /// Table entry backing this diagnosis, if any
    pub fn details(&self) -> Option<&'static RcDetails> {
        match *self {
            Diagnosis::ClassicError { code, .. } => tables::ver1(code),
            Diagnosis::Warning { code, .. } => tables::warning(code),
            Diagnosis::StructuredError { code, .. } => tables::fmt1(code),
            _ => None,
        }
    }

    /// Symbolic name, `<unknown>` when the code is not in its table
    pub fn name(&self) -> &'static str {
        match self {
            Diagnosis::Success => "TPM_RC_SUCCESS",
            Diagnosis::LegacyCode { .. } => "TPM 1.2 error",
            Diagnosis::InvalidCode { .. } => "invalid TPM RC value",
            _ => self.details().map_or(UNKNOWN_NAME, |d| d.name),
        }
    }

    pub fn description(&self) -> &'static str {
        if let Some(details) = self.details() {
            return details.description;
        }
        match self {
            Diagnosis::Success => "success",
            Diagnosis::LegacyCode { .. } => "pre-2.0 response code, not decoded",
            Diagnosis::InvalidCode { .. } => "value has bit 31 set and cannot be a TPM response code",
            Diagnosis::ClassicError { .. } => "Unrecognized VER1 error.",
            Diagnosis::Warning { .. } => "Unrecognized warning.",
            Diagnosis::StructuredError { .. } => "Unrecognized FMT1 error.",
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Diagnosis::Success => f.write_str("TPM_RC_SUCCESS"),
            Diagnosis::LegacyCode { raw } => write!(f, "TPM 1.2 error: 0x{raw:x}"),
            Diagnosis::InvalidCode { raw } => write!(f, "invalid TPM RC value: 0x{raw:x}"),
            Diagnosis::StructuredError {
                raw,
                relation,
                index,
                ..
            } if index != 0 => write!(
                f,
                "(0x{raw:x}) {}: {} ({relation} {index})",
                self.name(),
                self.description()
            ),
            _ => write!(
                f,
                "(0x{:x}) {}: {}",
                self.raw(),
                self.name(),
                self.description()
            ),
        }
    }
}

impl std::error::Error for Diagnosis {}

impl From<u32> for Diagnosis {
    fn from(raw: u32) -> Self {
        decode(raw)
    }
}
