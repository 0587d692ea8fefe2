// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 data types

use anyhow::{anyhow, bail, Result};

use super::constants::*;
use super::marshal::*;

/// TPM2B_DIGEST - Variable length digest
#[derive(Debug, Clone, Default)]
pub struct Tpm2bDigest {
    pub buffer: Vec<u8>,
}

impl Unmarshal for Tpm2bDigest {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        Ok(Self {
            buffer: buf.get_tpm2b()?,
        })
    }
}

/// TPMS_PCR_SELECTION - PCR selection for a single hash algorithm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsPcrSelection {
    pub hash: TpmAlgId,
    pub pcr_select: Vec<u8>, // Bitmap of selected PCRs
}

impl TpmsPcrSelection {
    /// Select `pcrs` of the bank; every index must be below [`PCR_COUNT`]
    pub fn new(hash: TpmAlgId, pcrs: &[u32]) -> Result<Self> {
        let mut pcr_select = vec![0u8; PCR_SELECT_SIZE];
        for &pcr in pcrs {
            if pcr >= PCR_COUNT {
                bail!("PCR index {pcr} out of range, the bank has {PCR_COUNT} PCRs");
            }
            pcr_select[(pcr / 8) as usize] |= 1 << (pcr % 8);
        }
        Ok(Self { hash, pcr_select })
    }

    /// Selects every PCR of the bank
    pub fn all(hash: TpmAlgId) -> Self {
        Self {
            hash,
            pcr_select: vec![0xff; PCR_SELECT_SIZE],
        }
    }

    /// Selects no PCR of the bank
    pub fn none(hash: TpmAlgId) -> Self {
        Self {
            hash,
            pcr_select: vec![0x00; PCR_SELECT_SIZE],
        }
    }

    /// Indices of the selected PCRs, ascending
    pub fn selected(&self) -> impl Iterator<Item = u32> + '_ {
        self.pcr_select
            .iter()
            .enumerate()
            .flat_map(|(byte_idx, &byte)| {
                (0..8u32)
                    .filter(move |bit| byte & (1 << bit) != 0)
                    .map(move |bit| byte_idx as u32 * 8 + bit)
            })
    }

    pub fn is_empty(&self) -> bool {
        self.pcr_select.iter().all(|&b| b == 0)
    }
}

impl Marshal for TpmsPcrSelection {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u16(self.hash.to_u16());
        buf.put_u8(self.pcr_select.len() as u8);
        buf.put_bytes(&self.pcr_select);
    }
}

impl Unmarshal for TpmsPcrSelection {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let hash_alg = buf.get_u16()?;
        let hash = TpmAlgId::from_u16(hash_alg)
            .ok_or_else(|| anyhow!("unknown hash algorithm: 0x{:04x}", hash_alg))?;
        let size = buf.get_u8()? as usize;
        let pcr_select = buf.get_bytes(size)?;
        Ok(Self { hash, pcr_select })
    }
}

/// TPML_PCR_SELECTION - List of PCR selections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TpmlPcrSelection {
    pub pcr_selections: Vec<TpmsPcrSelection>,
}

impl TpmlPcrSelection {
    pub fn new(selections: Vec<TpmsPcrSelection>) -> Self {
        Self {
            pcr_selections: selections,
        }
    }

    pub fn single(hash: TpmAlgId, pcrs: &[u32]) -> Result<Self> {
        Ok(Self {
            pcr_selections: vec![TpmsPcrSelection::new(hash, pcrs)?],
        })
    }
}

impl Marshal for TpmlPcrSelection {
    fn marshal(&self, buf: &mut CommandBuffer) {
        buf.put_u32(self.pcr_selections.len() as u32);
        for sel in &self.pcr_selections {
            sel.marshal(buf);
        }
    }
}

impl Unmarshal for TpmlPcrSelection {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let count = buf.get_u32()? as usize;
        let mut pcr_selections = Vec::with_capacity(count.min(16));
        for _ in 0..count {
            pcr_selections.push(TpmsPcrSelection::unmarshal(buf)?);
        }
        Ok(Self { pcr_selections })
    }
}

/// TPML_DIGEST - List of digests
#[derive(Debug, Clone, Default)]
pub struct TpmlDigest {
    pub digests: Vec<Tpm2bDigest>,
}

impl Unmarshal for TpmlDigest {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let count = buf.get_u32()? as usize;
        let mut digests = Vec::with_capacity(count.min(8));
        for _ in 0..count {
            digests.push(Tpm2bDigest::unmarshal(buf)?);
        }
        Ok(Self { digests })
    }
}

/// One entry of a `TPM_CAP_PCRS` capability answer
///
/// The algorithm is kept raw so banks this crate has no name for are still
/// reported instead of failing the whole query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrBankInfo {
    pub hash_raw: u16,
    pub pcr_select: Vec<u8>,
}

impl PcrBankInfo {
    pub fn hash(&self) -> Option<TpmAlgId> {
        TpmAlgId::from_u16(self.hash_raw)
    }

    /// A bank is active when at least one of its PCRs is allocated
    pub fn is_active(&self) -> bool {
        self.pcr_select.iter().any(|&b| b != 0)
    }
}

impl Unmarshal for PcrBankInfo {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let hash_raw = buf.get_u16()?;
        let size = buf.get_u8()? as usize;
        let pcr_select = buf.get_bytes(size)?;
        Ok(Self {
            hash_raw,
            pcr_select,
        })
    }
}

/// TPMS_CAPABILITY_DATA restricted to `TPM_CAP_PCRS`
#[derive(Debug, Clone, Default)]
pub struct PcrCapability {
    pub more_data: bool,
    pub banks: Vec<PcrBankInfo>,
}

impl Unmarshal for PcrCapability {
    fn unmarshal(buf: &mut ResponseBuffer) -> Result<Self> {
        let more_data = buf.get_u8()? != 0;
        let capability = buf.get_u32()?;
        if capability != TpmCap::Pcrs.to_u32() {
            bail!("unexpected capability in response: 0x{:08x}", capability);
        }
        let count = buf.get_u32()? as usize;
        let mut banks = Vec::with_capacity(count.min(16));
        for _ in 0..count {
            banks.push(PcrBankInfo::unmarshal(buf)?);
        }
        Ok(Self { more_data, banks })
    }
}
