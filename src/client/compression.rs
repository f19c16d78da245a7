use crate::Result;
use crate::commands;
use crate::response::codes;
use flate2::read::ZlibDecoder;
use std::io::Read;
use tracing::{debug, trace, warn};

use super::NntpClient;

impl NntpClient {
    /// Ask for compressed multi-line headers (XFEATURE COMPRESS GZIP)
    ///
    /// A refusal is reported as `Ok(false)`; the session simply carries on
    /// uncompressed.
    pub async fn enable_compression(&mut self) -> Result<bool> {
        self.send_command(commands::xfeature_compress_gzip()).await?;
        let reply = self.read_response().await?;
        self.headers_compressed = reply.code == codes::XFEATURE_ENABLED || reply.is_success();
        debug!(
            provider = %self.provider.label(),
            "Header compression {} ({})",
            if self.headers_compressed { "on" } else { "refused" },
            reply.code
        );
        Ok(self.headers_compressed)
    }

    pub fn headers_compressed(&self) -> bool {
        self.headers_compressed
    }

    /// `(bytes on the wire, bytes after inflation)` for compressed blocks
    pub fn bandwidth_stats(&self) -> (u64, u64) {
        (self.wire_bytes, self.inflated_bytes)
    }

    /// Inflate a block the server flagged as compressed
    ///
    /// The feature is called GZIP but servers send zlib framing. A block
    /// that does not inflate is passed through unchanged.
    pub(super) fn inflate(&mut self, block: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(block.len() * 3);
        if let Err(e) = ZlibDecoder::new(block).read_to_end(&mut out) {
            warn!(provider = %self.provider.label(), "Block did not inflate, using it raw: {}", e);
            return block.to_vec();
        }
        self.wire_bytes += block.len() as u64;
        self.inflated_bytes += out.len() as u64;
        trace!("Inflated {} -> {} bytes", block.len(), out.len());
        out
    }
}
