//! Reading replies and writing commands under the provider's timeouts

use super::{ConnectionState, NntpClient};
use crate::commands;
use crate::error::{NntpError, Result};
use crate::response::{NntpBinaryResponse, NntpResponse};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

const CHUNK: usize = 256 * 1024;
/// Starting capacity for a block; fits a default part without regrowth
const BLOCK_CAPACITY: usize = 1024 * 1024;
/// A compressed block larger than this is treated as a protocol error
const COMPRESSED_LIMIT: usize = 64 * 1024 * 1024;
/// Multi-line reads get this many command timeouts
const MULTILINE_TIMEOUT_FACTOR: u32 = 3;

pub(super) fn line_content(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Drop the extra dot a sender puts in front of lines starting with "."
pub(super) fn unstuff(line: &[u8]) -> &[u8] {
    match line {
        [b'.', b'.', ..] => &line[1..],
        _ => line,
    }
}

/// Append one block line to `data`; false at the terminating "."
fn push_block_line(data: &mut Vec<u8>, raw: &[u8]) -> bool {
    let content = line_content(raw);
    if content == b"." {
        return false;
    }
    data.extend_from_slice(unstuff(content));
    data.push(b'\n');
    true
}

impl NntpClient {
    pub(super) async fn send_command(&mut self, command: &str) -> Result<()> {
        trace!(">> {}", commands::redact(command).trim_end());
        self.write_all(command.as_bytes()).await
    }

    /// Article text, already dot-stuffed and terminated
    pub(super) async fn send_bytes(&mut self, data: &[u8]) -> Result<()> {
        trace!(">> {} bytes", data.len());
        self.write_all(data).await
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let limit = self.provider.command_timeout();
        let stream = self.stream.get_mut();
        let written = timeout(limit, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.fail(NntpError::Io(e))),
            Err(_) => Err(self.fail(NntpError::Timeout)),
        }
    }

    /// Pass `err` through, retiring the session when the transport is at fault
    pub(super) fn fail(&mut self, err: NntpError) -> NntpError {
        match err {
            NntpError::Timeout => {
                debug!(provider = %self.provider.label(), "No reply in time, retiring session");
                self.mark_broken();
                NntpError::Timeout
            }
            NntpError::Io(_)
            | NntpError::ConnectionClosed
            | NntpError::Tls(_)
            | NntpError::InvalidResponse(_) => {
                debug!(provider = %self.provider.label(), "Retiring session: {}", err);
                self.mark_broken();
                self.state = ConnectionState::Closed;
                err.into_transient()
            }
            other => other,
        }
    }

    pub(super) async fn read_response(&mut self) -> Result<NntpResponse> {
        let limit = self.provider.command_timeout();
        let result = match timeout(limit, self.read_status_line()).await {
            Ok(result) => result,
            Err(_) => Err(NntpError::Timeout),
        };
        let (code, message) = result.map_err(|e| self.fail(e))?;
        Ok(NntpResponse {
            code,
            message,
            lines: Vec::new(),
        })
    }

    async fn read_status_line(&mut self) -> Result<(u16, String)> {
        let mut line = Vec::with_capacity(512);
        self.stream.read_until(b'\n', &mut line).await?;
        if line.is_empty() {
            return Err(NntpError::ConnectionClosed);
        }

        let text = String::from_utf8_lossy(&line);
        trace!("<< {}", text.trim_end());
        commands::parse_response_line(text.trim_end())
    }

    /// Multi-line reply with the block decoded lossily as UTF-8
    pub(super) async fn read_multiline_response(&mut self) -> Result<NntpResponse> {
        let binary = self.read_multiline_binary().await?;
        let lines = binary
            .lines()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();
        Ok(NntpResponse {
            code: binary.code,
            message: binary.message,
            lines,
        })
    }

    /// Multi-line reply with the block kept as bytes
    ///
    /// Only 2xx replies carry a block; anything else comes back with empty
    /// `data`.
    pub(super) async fn read_multiline_binary(&mut self) -> Result<NntpBinaryResponse> {
        let limit = self.provider.command_timeout() * MULTILINE_TIMEOUT_FACTOR;
        let result = match timeout(limit, self.read_multiline_inner()).await {
            Ok(result) => result,
            Err(_) => Err(NntpError::Timeout),
        };
        result.map_err(|e| self.fail(e))
    }

    async fn read_multiline_inner(&mut self) -> Result<NntpBinaryResponse> {
        let (code, message) = self.read_status_line().await?;
        if !(200..300).contains(&code) {
            return Ok(NntpBinaryResponse {
                code,
                message,
                data: Vec::new(),
            });
        }

        let mut data = Vec::with_capacity(BLOCK_CAPACITY);
        if self.headers_compressed && message.contains("[COMPRESS=GZIP]") {
            let block = self.read_compressed_block().await?;
            let inflated = self.inflate(&block);
            trace!("{} compressed bytes became {}", block.len(), inflated.len());
            for line in inflated.split_inclusive(|&b| b == b'\n') {
                if !push_block_line(&mut data, line) {
                    break;
                }
            }
        } else {
            let mut line = Vec::with_capacity(512);
            loop {
                line.clear();
                if self.stream.read_until(b'\n', &mut line).await? == 0 {
                    return Err(NntpError::ConnectionClosed);
                }
                if !push_block_line(&mut data, &line) {
                    break;
                }
            }
        }

        Ok(NntpBinaryResponse {
            code,
            message,
            data,
        })
    }

    /// Raw bytes up to the plain-text "." terminator that follows a
    /// compressed block
    async fn read_compressed_block(&mut self) -> Result<Vec<u8>> {
        let mut block = Vec::new();
        let mut chunk = vec![0u8; CHUNK];
        loop {
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(NntpError::ConnectionClosed);
            }
            block.extend_from_slice(&chunk[..n]);
            if block.len() > COMPRESSED_LIMIT {
                return Err(NntpError::InvalidResponse(format!(
                    "compressed block passed {COMPRESSED_LIMIT} bytes without a terminator"
                )));
            }
            for terminator in [&b".\r\n"[..], &b".\n"[..]] {
                if block.ends_with(terminator) {
                    block.truncate(block.len() - terminator.len());
                    return Ok(block);
                }
            }
        }
    }
}
