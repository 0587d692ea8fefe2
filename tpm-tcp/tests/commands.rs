// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{command_code, spawn_tpm, tpm_response};
use tpm_tcp::{TcpConfig, TpmAlgId, TpmContext, TpmSu, TpmlPcrSelection};

const TPM_CC_PCR_EVENT: u32 = 0x13c;
const TPM_CC_SHUTDOWN: u32 = 0x145;
const TPM_CC_PCR_READ: u32 = 0x17e;

/// Answer a single-bank PCR_Read with `[index; 32]` for every selected PCR
fn pcr_read_response(command: &[u8]) -> Vec<u8> {
    // count (4) + hash (2) + sizeofSelect (1) + pcrSelect (3)
    let selection = &command[10..20];
    let pcr_select = &selection[7..10];
    let selected: Vec<u8> = (0..24u8)
        .filter(|idx| pcr_select[(idx / 8) as usize] & (1 << (idx % 8)) != 0)
        .collect();

    let mut body = 7u32.to_be_bytes().to_vec(); // pcrUpdateCounter
    body.extend_from_slice(selection);
    body.extend_from_slice(&(selected.len() as u32).to_be_bytes());
    for idx in selected {
        body.extend_from_slice(&32u16.to_be_bytes());
        body.extend_from_slice(&[idx; 32]);
    }
    tpm_response(0x8001, 0, &body)
}

/// Session response to PCR_Event carrying a SHA-1 and a SHA-256 digest
fn pcr_event_response() -> Vec<u8> {
    let mut params = 2u32.to_be_bytes().to_vec();
    params.extend_from_slice(&[0x00, 0x04]);
    params.extend_from_slice(&[0xab; 20]);
    params.extend_from_slice(&[0x00, 0x0b]);
    params.extend_from_slice(&[0xcd; 32]);

    let mut body = (params.len() as u32).to_be_bytes().to_vec();
    body.extend_from_slice(&params);
    body.extend_from_slice(&[0, 0, 1, 0, 0]);
    tpm_response(0x8002, 0, &body)
}

#[test]
fn test_shutdown() {
    let port = spawn_tpm(|command| {
        assert_eq!(command_code(command), TPM_CC_SHUTDOWN);
        (tpm_response(0x8001, 0, &[]), 0)
    });

    let mut ctx = TpmContext::open(&TcpConfig::new(port.address())).unwrap();
    ctx.shutdown(TpmSu::State).unwrap();
    ctx.close().unwrap();

    assert_eq!(
        port.finish().commands,
        vec![vec![0x80, 0x01, 0, 0, 0, 0x0c, 0, 0, 0x01, 0x45, 0, 1]]
    );
}

#[test]
fn test_pcr_read() {
    let port = spawn_tpm(|command| {
        assert_eq!(command_code(command), TPM_CC_PCR_READ);
        (pcr_read_response(command), 0)
    });

    let mut ctx = TpmContext::open(&TcpConfig::new(port.address())).unwrap();
    let selection = TpmlPcrSelection::single(TpmAlgId::Sha256, &[1, 7, 16]).unwrap();
    let values = ctx.pcr_read(&selection).unwrap();
    ctx.close().unwrap();

    assert_eq!(
        values,
        vec![(1, vec![1; 32]), (7, vec![7; 32]), (16, vec![16; 32])]
    );
    let transcript = port.finish();
    assert_eq!(&transcript.commands[0][14..20], &[0x00, 0x0b, 3, 0x82, 0x00, 0x01]);
}

#[test]
fn test_pcr_read_bank_in_batches() {
    let port = spawn_tpm(|command| (pcr_read_response(command), 0));

    let mut ctx = TpmContext::open(&TcpConfig::new(port.address())).unwrap();
    let values = ctx.pcr_read_bank(TpmAlgId::Sha256).unwrap();
    ctx.close().unwrap();

    assert_eq!(values.len(), 24);
    for (idx, value) in values.iter().enumerate() {
        assert_eq!(value, &vec![idx as u8; 32]);
    }

    // 8 PCRs per command
    let transcript = port.finish();
    let bitmaps: Vec<Vec<u8>> = transcript
        .commands
        .iter()
        .map(|cmd| cmd[17..20].to_vec())
        .collect();
    assert_eq!(
        bitmaps,
        vec![
            vec![0xff, 0x00, 0x00],
            vec![0x00, 0xff, 0x00],
            vec![0x00, 0x00, 0xff]
        ]
    );
}

#[test]
fn test_pcr_event() {
    let port = spawn_tpm(|command| {
        assert_eq!(command_code(command), TPM_CC_PCR_EVENT);
        (pcr_event_response(), 0)
    });

    let mut ctx = TpmContext::open(&TcpConfig::new(port.address())).unwrap();
    let digests = ctx.pcr_event(23, b"hello").unwrap();
    assert_eq!(
        digests,
        vec![
            (TpmAlgId::Sha1, vec![0xab; 20]),
            (TpmAlgId::Sha256, vec![0xcd; 32])
        ]
    );
    ctx.close().unwrap();

    let transcript = port.finish();
    let event = &transcript.commands[0];
    assert_eq!(&event[0..2], &[0x80, 0x02]);
    assert_eq!(&event[10..14], &[0, 0, 0, 23]);
    assert_eq!(&event[27..29], &[0, 5]);
    assert_eq!(&event[29..], b"hello");
}

#[test]
fn test_pcr_event_limits() {
    let port = spawn_tpm(|_| panic!("nothing should reach the TPM"));

    let mut ctx = TpmContext::open(&TcpConfig::new(port.address())).unwrap();
    assert!(ctx.pcr_event(24, b"hello").is_err());
    assert!(ctx.pcr_event(0, &[0u8; 1025]).is_err());
    ctx.close().unwrap();

    let transcript = port.finish();
    assert!(transcript.commands.is_empty());
    assert!(transcript.session_ended);
}
