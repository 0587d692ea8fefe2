// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Command-line tool for a TPM 2.0 simulator reachable over TCP

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tpm_tcp::{
    rc, PlatformConfig, TcpConfig, TcpPlatform, TcpTpm, TpmAlgId, TpmContext, TpmSu,
    MAX_EVENT_SIZE,
};
use tracing::info;

/// Drive a TCP TPM simulator
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Address of the TPM command port
    #[arg(long, env = "TPM_ADDR", default_value = tpm_tcp::DEFAULT_TPM_ADDRESS)]
    tpm_addr: String,

    /// Address of the simulator platform port
    #[arg(long, env = "TPM_PLATFORM_ADDR", default_value = tpm_tcp::DEFAULT_PLATFORM_ADDRESS)]
    platform_addr: String,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Explain a TPM response code
    Explain {
        /// Response code, decimal or 0x-prefixed hex
        #[arg(allow_negative_numbers = true)]
        code: String,
    },
    /// Send TPM2_Startup(CLEAR)
    Startup,
    /// Send TPM2_Shutdown(CLEAR)
    Shutdown,
    /// Allocate full PCR banks for the given hash algorithms
    PcrBanks {
        #[arg(required = true)]
        algorithms: Vec<TpmAlgId>,
    },
    /// Print the 24 PCRs of a bank
    PcrRead {
        #[arg(default_value = "sha256")]
        algorithm: TpmAlgId,
    },
    /// Extend a PCR with the contents of a file (TPM2_PCR_Event)
    Extend {
        /// PCR index, 0 to 23
        index: u32,
        /// Event data, at most 1 KiB
        file: PathBuf,
    },
    /// Power cycle the simulator (NV off, power off, power on, NV on)
    PowerCycle,
}

/// Parse a response code as decimal or `0x` hex, optionally negative
///
/// Negative values keep their 32-bit two's complement pattern, so they decode
/// as invalid codes.
fn parse_code(code: &str) -> Result<u32> {
    let (negative, digits) = match code.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, code),
    };
    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => digits.parse(),
    };
    let magnitude = parsed.with_context(|| format!("could not parse error code '{code}'"))?;
    if !negative {
        return Ok(magnitude);
    }
    if magnitude > 1 << 31 {
        bail!("error code '{code}' does not fit in 32 bits");
    }
    Ok(magnitude.wrapping_neg())
}

fn cmd_explain(code: &str) -> Result<()> {
    let diagnosis = rc::decode(parse_code(code)?);
    if diagnosis.is_success() {
        println!("RC_SUCCESS");
    } else {
        println!("{diagnosis}");
    }
    Ok(())
}

/// Run `f` against a fresh TPM connection and always close it afterwards
fn with_tpm<R>(
    config: &TcpConfig,
    f: impl FnOnce(&mut TpmContext<TcpTpm>) -> Result<R>,
) -> Result<R> {
    let mut ctx = TpmContext::open(config).context("failed to open TPM simulator")?;
    let result = f(&mut ctx);
    let closed = ctx.close();
    let value = result?;
    closed?;
    Ok(value)
}

fn cmd_extend(ctx: &mut TpmContext<TcpTpm>, index: u32, file: &Path) -> Result<()> {
    let data =
        std::fs::read(file).with_context(|| format!("could not read {}", file.display()))?;
    if data.len() > MAX_EVENT_SIZE {
        bail!(
            "{} is too large, pass a file of {} bytes or less",
            file.display(),
            MAX_EVENT_SIZE
        );
    }
    for (alg, digest) in ctx.pcr_event(index, &data)? {
        println!("{alg}: {}", hex::encode(digest));
    }
    Ok(())
}

fn cmd_power_cycle(config: &PlatformConfig) -> Result<()> {
    let mut platform = TcpPlatform::open(config)?;
    let result = platform.power_cycle();
    let closed = platform.close();
    result?;
    closed?;
    info!("simulator power cycled, TPM2_Startup is required");
    Ok(())
}

fn main() -> Result<()> {
    {
        use tracing_subscriber::{fmt, EnvFilter};
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();
    let tpm = TcpConfig::new(cli.tpm_addr);
    let platform = PlatformConfig::new(cli.platform_addr);

    match cli.command {
        Commands::Explain { code } => cmd_explain(&code)?,
        Commands::Startup => with_tpm(&tpm, |ctx| ctx.startup(TpmSu::Clear))?,
        Commands::Shutdown => with_tpm(&tpm, |ctx| ctx.shutdown(TpmSu::Clear))?,
        Commands::PcrBanks { algorithms } => {
            let response = with_tpm(&tpm, |ctx| ctx.pcr_allocate(&algorithms))?;
            info!("PCR banks allocated ({response}), reset the TPM to apply");
        }
        Commands::PcrRead { algorithm } => {
            let values = with_tpm(&tpm, |ctx| ctx.pcr_read_bank(algorithm))?;
            for (idx, value) in values.iter().enumerate() {
                println!("{algorithm} PCR[{idx:2}] = {}", hex::encode(value));
            }
        }
        Commands::Extend { index, file } => {
            with_tpm(&tpm, |ctx| cmd_extend(ctx, index, &file))?
        }
        Commands::PowerCycle => cmd_power_cycle(&platform)?,
    }
    Ok(())
}
