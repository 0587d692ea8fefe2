// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM 2.0 command implementations
//!
//! The handful of commands needed to bring up a simulated TPM and manage its
//! PCR banks, issued over any [`TpmTransport`].

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use super::command::*;
use super::constants::*;
use super::marshal::*;
use super::pcr_allocate::{self, PcrAllocateResponse};
use super::transport::{TcpTpm, TpmTransport};
use super::types::*;
use crate::config::TcpConfig;

/// Largest event accepted by `TPM2_PCR_Event`
pub const MAX_EVENT_SIZE: usize = 1024;

/// Most PCR banks asked for in one capability query
const MAX_PCR_BANKS: u32 = 8;

/// PCRs read per `TPM2_PCR_Read`
const PCR_READ_BATCH: u32 = 8;

/// TPM context driving a transport
pub struct TpmContext<T> {
    transport: T,
}

impl TpmContext<TcpTpm> {
    /// Connect to a TPM over TCP
    pub fn open(config: &TcpConfig) -> Result<Self> {
        Ok(Self::new(TcpTpm::open(config)?))
    }
}

impl<S: std::io::Read + std::io::Write> TpmContext<TcpTpm<S>> {
    /// Close the underlying TCP session
    pub fn close(self) -> Result<()> {
        self.transport.close()?;
        Ok(())
    }
}

impl<T: TpmTransport> TpmContext<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    // ==================== Startup ====================

    pub fn startup(&mut self, startup_type: TpmSu) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::Startup);
        cmd.add_u16(startup_type.to_u16());

        let response = self.transport.execute(&cmd.finalize())?;
        response.ensure_success().context("TPM2_Startup failed")?;
        debug!("TPM started up ({startup_type:?})");
        Ok(())
    }

    pub fn shutdown(&mut self, shutdown_type: TpmSu) -> Result<()> {
        let mut cmd = TpmCommand::new(TpmCc::Shutdown);
        cmd.add_u16(shutdown_type.to_u16());

        let response = self.transport.execute(&cmd.finalize())?;
        response.ensure_success().context("TPM2_Shutdown failed")?;
        debug!("TPM shut down ({shutdown_type:?})");
        Ok(())
    }

    // ==================== PCR Operations ====================

    /// Query the PCR allocation of every bank
    pub fn pcr_capability(&mut self) -> Result<PcrCapability> {
        let mut cmd = TpmCommand::new(TpmCc::GetCapability);
        cmd.add_u32(TpmCap::Pcrs.to_u32());
        // property
        cmd.add_u32(0);
        // propertyCount
        cmd.add_u32(MAX_PCR_BANKS);

        let response = self.transport.execute(&cmd.finalize())?;
        response
            .ensure_success()
            .context("TPM2_GetCapability(PCRS) failed")?;

        let mut buf = response.data_buffer();
        PcrCapability::unmarshal(&mut buf).context("failed to parse PCR capability")
    }

    /// Hash algorithms of the banks that have at least one PCR allocated
    pub fn pcr_banks(&mut self) -> Result<Vec<TpmAlgId>> {
        let capability = self.pcr_capability()?;
        if capability.more_data {
            warn!("TPM reports more than {MAX_PCR_BANKS} PCR banks, ignoring the rest");
        }
        let mut banks = Vec::new();
        for bank in capability.banks.iter().filter(|b| b.is_active()) {
            match bank.hash() {
                Some(alg) => banks.push(alg),
                None => warn!("ignoring PCR bank with unknown algorithm 0x{:04x}", bank.hash_raw),
            }
        }
        Ok(banks)
    }

    /// Read PCR values for the given selection
    pub fn pcr_read(&mut self, pcr_selection: &TpmlPcrSelection) -> Result<Vec<(u32, Vec<u8>)>> {
        let mut cmd = TpmCommand::new(TpmCc::PcrRead);
        cmd.add(pcr_selection);

        let response = self.transport.execute(&cmd.finalize())?;
        response.ensure_success().context("TPM2_PCR_Read failed")?;

        let mut buf = response.data_buffer();
        let _update_counter = buf.get_u32()?;
        let pcr_selection_out = TpmlPcrSelection::unmarshal(&mut buf)?;
        let digest_list = TpmlDigest::unmarshal(&mut buf)?;

        // Digests come back in selection order
        let indices = pcr_selection_out
            .pcr_selections
            .iter()
            .flat_map(|sel| sel.selected());
        Ok(indices
            .zip(digest_list.digests)
            .map(|(idx, digest)| (idx, digest.buffer))
            .collect())
    }

    /// Read all 24 PCRs of one bank
    ///
    /// PCRs the TPM does not return are left empty.
    pub fn pcr_read_bank(&mut self, hash_alg: TpmAlgId) -> Result<Vec<Vec<u8>>> {
        let mut values = vec![Vec::new(); PCR_COUNT as usize];
        for first in (0..PCR_COUNT).step_by(PCR_READ_BATCH as usize) {
            let batch: Vec<u32> = (first..first + PCR_READ_BATCH).collect();
            let selection = TpmlPcrSelection::single(hash_alg, &batch)?;
            for (idx, value) in self
                .pcr_read(&selection)
                .with_context(|| format!("failed to read {hash_alg} PCRs {first}.."))?
            {
                if let Some(slot) = values.get_mut(idx as usize) {
                    *slot = value;
                }
            }
        }
        Ok(values)
    }

    /// Extend a PCR with an event, returning the digest logged for each bank
    pub fn pcr_event(&mut self, pcr: u32, event_data: &[u8]) -> Result<Vec<(TpmAlgId, Vec<u8>)>> {
        if pcr >= PCR_COUNT {
            bail!("PCR index must be between 0 and {}", PCR_COUNT - 1);
        }
        if event_data.len() > MAX_EVENT_SIZE {
            bail!(
                "event of {} bytes exceeds the {} byte limit",
                event_data.len(),
                MAX_EVENT_SIZE
            );
        }

        let mut cmd = TpmCommand::with_sessions(TpmCc::PcrEvent);
        // pcrHandle
        cmd.add_handle(pcr);
        // Authorization area
        cmd.add_null_auth_area();
        // eventData
        cmd.add_tpm2b(event_data);

        let response = self.transport.execute(&cmd.finalize())?;
        response
            .ensure_success()
            .with_context(|| format!("TPM2_PCR_Event failed for PCR {pcr}"))?;

        let mut buf = response.skip_parameter_size()?;
        let count = buf.get_u32()?;
        let mut digests = Vec::new();
        for _ in 0..count {
            let raw = buf.get_u16()?;
            let alg = TpmAlgId::from_u16(raw)
                .ok_or_else(|| anyhow::anyhow!("unknown digest algorithm: 0x{raw:04x}"))?;
            digests.push((alg, buf.get_bytes(alg.digest_size())?));
        }
        debug!("extended PCR {pcr} with {} byte event", event_data.len());
        Ok(digests)
    }

    /// Allocate full banks for `algs`, dropping every other active bank
    ///
    /// Needs platform authorization; takes effect after the next reset.
    /// Repeated algorithms in `algs` are requested once.
    pub fn pcr_allocate(&mut self, algs: &[TpmAlgId]) -> Result<PcrAllocateResponse> {
        let mut wanted: Vec<TpmAlgId> = Vec::with_capacity(algs.len());
        for alg in algs {
            if !wanted.contains(alg) {
                wanted.push(*alg);
            }
        }

        let active = self.pcr_banks()?;
        let (remove, add) = pcr_allocate::dedup(&active, &wanted);
        debug!("PCR_Allocate: dropping {remove:?}, adding {add:?}");

        let cmd = pcr_allocate::build_command(&remove, &add);
        let response = self.transport.execute(&cmd)?;
        pcr_allocate::parse_response(&response)
    }
}
