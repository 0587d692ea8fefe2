// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! Minimal stand-ins for the simulator's command and platform ports

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

/// What a fake port saw during one connection
#[derive(Debug, Default)]
pub struct Transcript {
    /// Command payloads (command port) or command words (platform port)
    pub commands: Vec<Vec<u8>>,
    /// Raw frame headers seen on the command port
    pub headers: Vec<[u8; 9]>,
    pub session_ended: bool,
}

pub struct FakePort {
    pub addr: SocketAddr,
    handle: JoinHandle<Transcript>,
}

impl FakePort {
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Wait for the client to go away and return what it sent
    pub fn finish(self) -> Transcript {
        self.handle.join().expect("fake port panicked")
    }
}

fn read_u32(stream: &mut TcpStream) -> Option<u32> {
    let mut word = [0u8; 4];
    stream.read_exact(&mut word).ok()?;
    Some(u32::from_be_bytes(word))
}

fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fake port");
    let addr = listener.local_addr().expect("local addr");
    (listener, addr)
}

/// Fake command port; `respond` maps a command payload to `(payload, code)`
pub fn spawn_tpm<F>(mut respond: F) -> FakePort
where
    F: FnMut(&[u8]) -> (Vec<u8>, u32) + Send + 'static,
{
    let (listener, addr) = listen();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut transcript = Transcript::default();
        while let Some(word) = read_u32(&mut stream) {
            match word {
                8 => {
                    let mut rest = [0u8; 5];
                    stream.read_exact(&mut rest).expect("frame header");
                    let mut header = [0u8; 9];
                    header[..4].copy_from_slice(&word.to_be_bytes());
                    header[4..].copy_from_slice(&rest);
                    let len = u32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]);
                    let mut payload = vec![0u8; len as usize];
                    stream.read_exact(&mut payload).expect("frame payload");

                    let (response, code) = respond(&payload);
                    let mut out = (response.len() as u32).to_be_bytes().to_vec();
                    out.extend_from_slice(&response);
                    out.extend_from_slice(&code.to_be_bytes());
                    stream.write_all(&out).expect("write response");

                    transcript.headers.push(header);
                    transcript.commands.push(payload);
                }
                20 => {
                    transcript.session_ended = true;
                    break;
                }
                other => panic!("unexpected command port word {other}"),
            }
        }
        transcript
    });
    FakePort { addr, handle }
}

/// Fake platform port; `ack` maps a command word to its acknowledgement
pub fn spawn_platform<F>(mut ack: F) -> FakePort
where
    F: FnMut(u32) -> u32 + Send + 'static,
{
    let (listener, addr) = listen();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut transcript = Transcript::default();
        while let Some(word) = read_u32(&mut stream) {
            if word == 20 {
                transcript.session_ended = true;
                break;
            }
            transcript.commands.push(word.to_be_bytes().to_vec());
            stream
                .write_all(&ack(word).to_be_bytes())
                .expect("write ack");
        }
        transcript
    });
    FakePort { addr, handle }
}

/// Build a TPM response `{tag, size, code}` followed by `body`
pub fn tpm_response(tag: u16, code: u32, body: &[u8]) -> Vec<u8> {
    let mut out = tag.to_be_bytes().to_vec();
    out.extend_from_slice(&((10 + body.len()) as u32).to_be_bytes());
    out.extend_from_slice(&code.to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Command code of a TPM command
pub fn command_code(command: &[u8]) -> u32 {
    u32::from_be_bytes([command[6], command[7], command[8], command[9]])
}
