// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! `TPM2_PCR_Allocate` request encoding
//!
//! PCR_Allocate leaves every bank that is not named in the request untouched,
//! so a request lists the currently active banks with an empty selection
//! (dropping them) followed by the wanted banks with all 24 PCRs selected.
//! Banks that are both active and wanted are left out on both sides.

use std::collections::HashMap;
use std::fmt;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::command::{TpmCommand, TpmResponse};
use crate::constants::*;
use crate::marshal::*;
use crate::types::{TpmlPcrSelection, TpmsPcrSelection};

/// Drop the algorithms that appear exactly twice across both lists
///
/// Order and duplicates of the remaining entries are preserved.
pub fn dedup(active: &[TpmAlgId], requested: &[TpmAlgId]) -> (Vec<TpmAlgId>, Vec<TpmAlgId>) {
    let mut counts: HashMap<TpmAlgId, usize> = HashMap::new();
    for alg in active.iter().chain(requested) {
        *counts.entry(*alg).or_default() += 1;
    }
    let keep = |alg: &&TpmAlgId| counts[*alg] != 2;
    (
        active.iter().filter(keep).copied().collect(),
        requested.iter().filter(keep).copied().collect(),
    )
}

/// Build the `TPML_PCR_SELECTION` deselecting `remove` and fully selecting `add`
pub fn pcr_selections(remove: &[TpmAlgId], add: &[TpmAlgId]) -> TpmlPcrSelection {
    let selections = remove
        .iter()
        .map(|alg| TpmsPcrSelection::none(*alg))
        .chain(add.iter().map(|alg| TpmsPcrSelection::all(*alg)))
        .collect();
    TpmlPcrSelection::new(selections)
}

/// Encode the selection list of a PCR_Allocate request
pub fn encode_pcr_selections(remove: &[TpmAlgId], add: &[TpmAlgId]) -> Vec<u8> {
    pcr_selections(remove, add).to_bytes()
}

/// Build the complete command, authorized by the platform hierarchy with an
/// empty password
pub fn build_command(remove: &[TpmAlgId], add: &[TpmAlgId]) -> Vec<u8> {
    let mut cmd = TpmCommand::with_sessions(TpmCc::PcrAllocate);
    // authHandle
    cmd.add_handle(tpm_rh::PLATFORM);
    // Authorization area
    cmd.add_null_auth_area();
    // pcrAllocation
    cmd.add_bytes(&encode_pcr_selections(remove, add));
    cmd.finalize()
}

/// Output parameters of `TPM2_PCR_Allocate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcrAllocateResponse {
    pub allocation_success: u8,
    pub max_pcr: u32,
    pub size_needed: u32,
    pub size_available: u32,
}

impl PcrAllocateResponse {
    pub fn is_success(&self) -> bool {
        self.allocation_success == 1
    }
}

impl fmt::Display for PcrAllocateResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "allocationSuccess={} maxPCR={} sizeNeeded={} sizeAvailable={}",
            self.allocation_success, self.max_pcr, self.size_needed, self.size_available
        )
    }
}

impl Unmarshal for PcrAllocateResponse {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            allocation_success: buf.get_u8()?,
            max_pcr: buf.get_u32()?,
            size_needed: buf.get_u32()?,
            size_available: buf.get_u32()?,
        })
    }
}

#[derive(Debug, Error)]
pub enum PcrAllocateError {
    #[error("TPM2_PCR_Allocate returned success but did not allocate: {0}")]
    Rejected(PcrAllocateResponse),
}

/// Check and parse the response to [`build_command`]
///
/// Skips the 4-byte parameter size that precedes the output parameters in a
/// session response; the response auth area after them is ignored.
pub fn parse_response(response: &TpmResponse) -> Result<PcrAllocateResponse> {
    response.ensure_success().context("TPM2_PCR_Allocate failed")?;
    let mut buf = response.data_buffer();
    buf.skip(4).context("PCR_Allocate response too short")?;
    let parsed = PcrAllocateResponse::unmarshal(&mut buf)
        .context("failed to parse PCR_Allocate response")?;
    if !parsed.is_success() {
        return Err(PcrAllocateError::Rejected(parsed).into());
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use TpmAlgId::*;

    #[test]
    fn test_dedup_removes_shared() {
        let (remove, add) = dedup(&[Sha1, Sha256], &[Sha256, Sha384]);
        assert_eq!(remove, vec![Sha1]);
        assert_eq!(add, vec![Sha384]);
    }

    #[test]
    fn test_dedup_keeps_other_counts() {
        // Sha256 appears three times in total, so nothing is dropped
        let (remove, add) = dedup(&[Sha256, Sha1], &[Sha256, Sha256]);
        assert_eq!(remove, vec![Sha256, Sha1]);
        assert_eq!(add, vec![Sha256, Sha256]);

        // Twice on one side only also counts as two
        let (remove, add) = dedup(&[Sha1, Sha1], &[Sha512]);
        assert!(remove.is_empty());
        assert_eq!(add, vec![Sha512]);
    }

    #[test]
    fn test_dedup_never_overlaps_single_entries() {
        for active in TpmAlgId::ALL {
            for requested in TpmAlgId::ALL {
                let (remove, add) = dedup(&[active], &[requested]);
                assert!(remove.iter().all(|alg| !add.contains(alg)));
            }
        }
    }

    #[test]
    fn test_encode_add_only() {
        assert_eq!(
            encode_pcr_selections(&[], &[Sha256]),
            vec![0, 0, 0, 1, 0x00, 0x0b, 3, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn test_encode_remove_first() {
        assert_eq!(
            encode_pcr_selections(&[Sha1], &[Sha384, Sha3_256]),
            vec![
                0, 0, 0, 3, //
                0x00, 0x04, 3, 0x00, 0x00, 0x00, //
                0x00, 0x0c, 3, 0xff, 0xff, 0xff, //
                0x00, 0x27, 3, 0xff, 0xff, 0xff,
            ]
        );
        assert_eq!(encode_pcr_selections(&[], &[]), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_build_command() {
        let cmd = build_command(&[Sha1], &[Sha256]);
        let mut expected = vec![
            0x80, 0x02, // TPM_ST_SESSIONS
            0x00, 0x00, 0x00, 0x2b, // size
            0x00, 0x00, 0x01, 0x2b, // TPM_CC_PCR_Allocate
            0x40, 0x00, 0x00, 0x0c, // TPM_RH_PLATFORM
            0x00, 0x00, 0x00, 0x09, 0x40, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        expected.extend(encode_pcr_selections(&[Sha1], &[Sha256]));
        assert_eq!(cmd, expected);
        assert_eq!(cmd.len(), 0x2b);
    }

    fn session_response(params: &[u8]) -> TpmResponse {
        let mut data = (params.len() as u32).to_be_bytes().to_vec();
        data.extend_from_slice(params);
        // Response auth area: empty nonce, attributes, empty hmac
        data.extend_from_slice(&[0, 0, 1, 0, 0]);
        TpmResponse {
            tag: TpmSt::Sessions,
            response_code: 0,
            data,
        }
    }

    #[test]
    fn test_parse_response() {
        let params = [1, 0, 0, 0, 24, 0, 0, 0, 0x10, 0, 0, 0x10, 0];
        let parsed = parse_response(&session_response(&params)).unwrap();
        assert_eq!(
            parsed,
            PcrAllocateResponse {
                allocation_success: 1,
                max_pcr: 24,
                size_needed: 0x10,
                size_available: 0x1000,
            }
        );
    }

    #[test]
    fn test_parse_rejected_allocation() {
        let params = [0, 0, 0, 0, 24, 0, 0, 0x20, 0, 0, 0, 0x10, 0];
        let err = parse_response(&session_response(&params)).unwrap_err();
        let PcrAllocateError::Rejected(resp) = err.downcast_ref::<PcrAllocateError>().unwrap();
        assert_eq!(resp.size_needed, 0x2000);
        assert!(err.to_string().contains("sizeNeeded=8192"));
    }

    #[test]
    fn test_parse_error_code() {
        let mut response = session_response(&[]);
        response.response_code = 0x9a2; // TPM_RC_BAD_AUTH, session 1
        let err = parse_response(&response).unwrap_err();
        assert!(format!("{err:#}").contains("TPM_RC_BAD_AUTH"));
    }
}
