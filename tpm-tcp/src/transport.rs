// SPDX-FileCopyrightText: © 2025 Phala Network <dstack@phala.network>
//
// SPDX-License-Identifier: Apache-2.0

//! TPM command channel over TCP
//!
//! Implements the framing used by the Microsoft reference simulator (TPM 2.0
//! Library Part 4, annex D): every command is prefixed by
//! `{TPM_SEND_COMMAND: u32, locality: u8, length: u32}` and every response is
//! `{length: u32, payload, code: u32}`, all big-endian.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};

use tracing::{debug, warn};

use crate::command::TpmResponse;
use crate::config::TcpConfig;
use crate::error::{Error, Phase, Result};
use crate::marshal::CommandBuffer;

/// `TPM_SEND_COMMAND` on the simulator's command port
pub const TCP_SEND_COMMAND: u32 = 8;
/// `TPM_SESSION_END`, tells the simulator the client is going away
pub const TCP_SESSION_END: u32 = 20;

const LOCALITY: u8 = 0;
const TCP_HEADER_SIZE: usize = 4 + 1 + 4;

/// Duplex byte-stream to a TPM
///
/// `send` delivers one complete command and waits for its response, which is
/// then readable through `receive` until the next `send`. Higher layers build
/// and parse commands on top of this and nothing else.
pub trait TpmTransport {
    /// Send a command, returning the number of command bytes written
    fn send(&mut self, command: &[u8]) -> Result<usize>;

    /// Copy out the unread part of the last response
    ///
    /// Returns 0 once the response is drained, or when there is none.
    fn receive(&mut self, buf: &mut [u8]) -> usize;

    /// Send a command and return the whole response
    fn transmit(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        self.send(command)?;
        let mut response = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = self.receive(&mut chunk);
            if n == 0 {
                break;
            }
            response.extend_from_slice(&chunk[..n]);
        }
        Ok(response)
    }

    /// Execute a TPM command and parse the response header
    fn execute(&mut self, command: &[u8]) -> anyhow::Result<TpmResponse> {
        let response = self.transmit(command)?;
        TpmResponse::parse(&response)
    }
}

impl<T: TpmTransport + ?Sized> TpmTransport for &mut T {
    fn send(&mut self, command: &[u8]) -> Result<usize> {
        (**self).send(command)
    }

    fn receive(&mut self, buf: &mut [u8]) -> usize {
        (**self).receive(buf)
    }
}

/// Connection to a TPM listening on a TCP command port
///
/// Holds at most one response; a new `send` discards whatever was not read.
/// Not meant to be shared between threads, open one connection per session.
pub struct TcpTpm<S = TcpStream> {
    stream: S,
    last_response: Vec<u8>,
    read_pos: usize,
}

impl TcpTpm<TcpStream> {
    /// Connect to a running TPM
    pub fn open(config: &TcpConfig) -> Result<Self> {
        let stream = TcpStream::connect(&config.address).map_err(|source| Error::Connect {
            address: config.address.clone(),
            source,
        })?;
        debug!("connected to TCP TPM at {}", config.address);
        Ok(Self::from_stream(stream))
    }

    /// Address of the TPM this connection talks to
    pub fn peer_address(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}

impl<S: Read + Write> TcpTpm<S> {
    /// Wrap an already established stream
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream,
            last_response: Vec::new(),
            read_pos: 0,
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// End the session and release the connection
    ///
    /// The stream is dropped even when the session-end word cannot be sent;
    /// the error is still reported.
    pub fn close(self) -> Result<()> {
        let Self { mut stream, .. } = self;
        let result = write_u32(&mut stream, TCP_SESSION_END);
        drop(stream);
        result.map_err(|source| {
            warn!("failed to send session end to TCP TPM: {source}");
            Error::Close { source }
        })
    }

    fn exchange(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let len = u32::try_from(command.len()).map_err(|_| Error::CommandTooLarge(command.len()))?;

        let mut frame = CommandBuffer::with_capacity(TCP_HEADER_SIZE + command.len());
        frame.put_u32(TCP_SEND_COMMAND);
        frame.put_u8(LOCALITY);
        frame.put_u32(len);
        frame.put_bytes(command);

        // write_all loops over short writes
        self.stream
            .write_all(frame.as_bytes())
            .and_then(|()| self.stream.flush())
            .map_err(Error::transport(Phase::FrameWrite))?;

        let rsp_len = read_u32(&mut self.stream).map_err(Error::transport(Phase::LengthRead))?;
        let mut response = Vec::new();
        (&mut self.stream)
            .take(rsp_len as u64)
            .read_to_end(&mut response)
            .map_err(Error::transport(Phase::PayloadRead))?;
        if response.len() != rsp_len as usize {
            return Err(Error::Transport {
                phase: Phase::PayloadRead,
                source: std::io::ErrorKind::UnexpectedEof.into(),
            });
        }

        let code = read_u32(&mut self.stream).map_err(Error::transport(Phase::CodeRead))?;
        debug!(
            "TCP TPM exchange: {} bytes sent, {} bytes received, code 0x{:x}",
            command.len(),
            response.len(),
            code
        );
        if code != 0 {
            return Err(Error::Protocol { raw_code: code });
        }
        Ok(response)
    }
}

impl<S: Read + Write> TpmTransport for TcpTpm<S> {
    fn send(&mut self, command: &[u8]) -> Result<usize> {
        self.last_response.clear();
        self.read_pos = 0;
        self.last_response = self.exchange(command)?;
        Ok(command.len())
    }

    fn receive(&mut self, buf: &mut [u8]) -> usize {
        let pending = &self.last_response[self.read_pos..];
        let n = pending.len().min(buf.len());
        buf[..n].copy_from_slice(&pending[..n]);
        self.read_pos += n;
        n
    }
}

pub(crate) fn read_u32(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_be_bytes(bytes))
}

pub(crate) fn write_u32(writer: &mut impl Write, v: u32) -> std::io::Result<()> {
    writer.write_all(&v.to_be_bytes())?;
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;
    use std::rc::Rc;

    /// In-memory stream: reads from a canned script, records writes
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl ScriptedStream {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: Cursor::new(input),
                output: Vec::new(),
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            // Accept at most 3 bytes per call to exercise short writes
            let n = buf.len().min(3);
            self.output.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn response(payload: &[u8], code: u32) -> Vec<u8> {
        let mut v = (payload.len() as u32).to_be_bytes().to_vec();
        v.extend_from_slice(payload);
        v.extend_from_slice(&code.to_be_bytes());
        v
    }

    #[test]
    fn test_send_frames_command() {
        let stream = ScriptedStream::new(response(&[0xde, 0xad], 0));
        let mut tpm = TcpTpm::from_stream(stream);

        let written = tpm.send(&[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(written, 3);
        assert_eq!(
            tpm.get_ref().output,
            vec![0, 0, 0, 8, 0, 0, 0, 0, 3, 0x01, 0x02, 0x03]
        );

        let mut buf = [0u8; 1];
        assert_eq!(tpm.receive(&mut buf), 1);
        assert_eq!(buf, [0xde]);
        assert_eq!(tpm.receive(&mut buf), 1);
        assert_eq!(buf, [0xad]);
        assert_eq!(tpm.receive(&mut buf), 0);
    }

    #[test]
    fn test_receive_before_send_is_empty() {
        let mut tpm = TcpTpm::from_stream(ScriptedStream::new(Vec::new()));
        let mut buf = [0u8; 16];
        assert_eq!(tpm.receive(&mut buf), 0);
    }

    #[test]
    fn test_nonzero_code_hides_payload() {
        let mut script = response(&[0xaa], 0);
        script.extend(response(&[0xbb, 0xcc], 0x101));
        let mut tpm = TcpTpm::from_stream(ScriptedStream::new(script));

        tpm.send(&[0x00]).unwrap();
        let err = tpm.send(&[0x00]).unwrap_err();
        assert!(matches!(err, Error::Protocol { raw_code: 0x101 }));
        assert_eq!(err.diagnosis().map(|d| d.name()), Some("TPM_RC_FAILURE"));

        // The earlier response is gone as well
        let mut buf = [0u8; 4];
        assert_eq!(tpm.receive(&mut buf), 0);
    }

    #[test]
    fn test_truncated_response() {
        let mut script = response(&[1, 2, 3, 4], 0);
        script.truncate(6);
        let mut tpm = TcpTpm::from_stream(ScriptedStream::new(script));
        let err = tpm.send(&[0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport {
                phase: Phase::PayloadRead,
                ..
            }
        ));

        let mut tpm = TcpTpm::from_stream(ScriptedStream::new(vec![0, 0]));
        let err = tpm.send(&[0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport {
                phase: Phase::LengthRead,
                ..
            }
        ));

        let mut tpm = TcpTpm::from_stream(ScriptedStream::new(vec![0, 0, 0, 0, 0]));
        let err = tpm.send(&[0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::Transport {
                phase: Phase::CodeRead,
                ..
            }
        ));
    }

    /// Stream whose writes always fail, flagging when it is dropped
    struct BrokenStream {
        dropped: Rc<Cell<bool>>,
    }

    impl Read for BrokenStream {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
    }

    impl Write for BrokenStream {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Drop for BrokenStream {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    #[test]
    fn test_close_releases_stream_when_write_fails() {
        let dropped = Rc::new(Cell::new(false));
        let tpm = TcpTpm::from_stream(BrokenStream {
            dropped: dropped.clone(),
        });
        let err = tpm.close().unwrap_err();
        assert!(matches!(err, Error::Close { .. }));
        assert!(dropped.get());
    }

    #[test]
    fn test_transmit_drains_response() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
        let mut tpm = TcpTpm::from_stream(ScriptedStream::new(response(&payload, 0)));
        assert_eq!(tpm.transmit(&[0x42]).unwrap(), payload);
    }
}
