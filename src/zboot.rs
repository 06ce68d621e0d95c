//! Boot-image decompression stub.
//!
//! A thin streaming-zstd wrapper with a fixed two-step protocol: [`init`]
//! validates the frame header and sets up the decoder, [`decompress`]
//! produces the whole payload in one call. The stream context is a plain
//! owned value handed between the two steps; nothing here is global.
//!
//! [`init`]: ZbootStream::init
//! [`decompress`]: ZbootStream::decompress

use log::error;
use ruzstd::frame::read_frame_header;
use ruzstd::frame_decoder::{BlockDecodingStrategy, FrameDecoder};
use ruzstd::io::Read;
use thiserror::Error;

/// Largest window a boot payload is allowed to declare.
pub const MAX_WINDOW_SIZE: u64 = 1 << 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ZbootError {
    /// The compressed image is malformed or exceeds decoder limits.
    #[error("cannot load compressed image: {0}")]
    Load(&'static str),

    /// The decoder workspace could not be set up.
    #[error("out of resources initializing the decompression stream")]
    OutOfResources,
}

/// Platform hook syncing the instruction cache after code is written.
pub trait IcacheSync {
    fn sync(&self, region: &[u8]);
}

/// Single-owner decompression context over one compressed boot image.
pub struct ZbootStream<'a> {
    input: &'a [u8],
    pos: usize,
    decoder: Option<FrameDecoder>,
    payload_size: usize,
}

impl core::fmt::Debug for ZbootStream<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ZbootStream")
            .field("pos", &self.pos)
            .field("payload_size", &self.payload_size)
            .field("initialized", &self.decoder.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> ZbootStream<'a> {
    /// Validates the frame header and prepares the decoder. Returns the
    /// stream and the output size the caller must allocate for
    /// [`Self::decompress`]. Header checks run before the decoder
    /// workspace exists, so a rejected image allocates nothing.
    pub fn init(compressed: &'a [u8], payload_size: usize) -> Result<(Self, usize), ZbootError> {
        let (frame, _) = read_frame_header(compressed).map_err(|_| {
            error!("compressed data has an incomplete frame header");
            ZbootError::Load("incomplete frame header")
        })?;
        let window_size = frame
            .header
            .window_size()
            .map_err(|_| ZbootError::Load("bad window descriptor"))?;
        if window_size > MAX_WINDOW_SIZE {
            error!("compressed data has too large a window size");
            return Err(ZbootError::Load("window size too large"));
        }

        let mut decoder = FrameDecoder::new();
        let mut src: &[u8] = compressed;
        decoder.init(&mut src).map_err(|_| {
            error!("can't initialize decompression stream");
            ZbootError::OutOfResources
        })?;
        let pos = compressed.len() - src.len();

        Ok((
            Self {
                input: compressed,
                pos,
                decoder: Some(decoder),
                payload_size,
            },
            payload_size,
        ))
    }

    /// Decodes the remaining input into `out` in one shot. The decoder
    /// workspace is released whether or not decoding succeeds; on success
    /// the instruction cache is synced over the written range before
    /// returning.
    pub fn decompress<S: IcacheSync>(
        &mut self,
        out: &mut [u8],
        icache: &S,
    ) -> Result<(), ZbootError> {
        // Taking the decoder out drops the workspace on every return path.
        let mut decoder = self
            .decoder
            .take()
            .ok_or(ZbootError::Load("stream not initialized"))?;
        let mut src: &[u8] = &self.input[self.pos..];

        decoder
            .decode_blocks(&mut src, BlockDecodingStrategy::All)
            .map_err(|_| {
                error!("decompression failed");
                ZbootError::Load("corrupt compressed stream")
            })?;

        let mut written = 0;
        while written < out.len() {
            let n = decoder
                .read(&mut out[written..])
                .map_err(|_| ZbootError::Load("corrupt compressed stream"))?;
            if n == 0 {
                break;
            }
            written += n;
        }
        if written != out.len() || !decoder.is_finished() {
            error!("decompressed size does not match the payload size");
            return Err(ZbootError::Load("payload size mismatch"));
        }

        icache.sync(&out[..written]);
        Ok(())
    }

    /// Output size the image advertises.
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullIcache;

    impl IcacheSync for NullIcache {
        fn sync(&self, _region: &[u8]) {}
    }

    const MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

    #[test]
    fn oversized_window_is_rejected_before_allocation() {
        // Window descriptor exponent 31: a 2 TiB window.
        let mut image = MAGIC.to_vec();
        image.extend_from_slice(&[0x00, 0xf8]);

        let err = ZbootStream::init(&image, 16).unwrap_err();
        assert!(matches!(err, ZbootError::Load(_)));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = ZbootStream::init(&MAGIC[..2], 16).unwrap_err();
        assert_eq!(err, ZbootError::Load("incomplete frame header"));
    }

    #[test]
    fn raw_block_frame_decodes() {
        // Single-segment frame holding one raw last-block of 4 bytes.
        let mut image = MAGIC.to_vec();
        image.push(0x20); // frame header descriptor: single segment
        image.push(0x04); // frame content size
        image.extend_from_slice(&[0x21, 0x00, 0x00]); // raw block, last, len 4
        image.extend_from_slice(b"abcd");

        let (mut stream, alloc_size) = ZbootStream::init(&image, 4).unwrap();
        assert_eq!(alloc_size, 4);

        let mut out = [0u8; 4];
        stream.decompress(&mut out, &NullIcache).unwrap();
        assert_eq!(&out, b"abcd");
    }

    #[test]
    fn second_decompress_call_is_refused() {
        let mut image = MAGIC.to_vec();
        image.push(0x20);
        image.push(0x04);
        image.extend_from_slice(&[0x21, 0x00, 0x00]);
        image.extend_from_slice(b"abcd");

        let (mut stream, _) = ZbootStream::init(&image, 4).unwrap();
        let mut out = [0u8; 4];
        stream.decompress(&mut out, &NullIcache).unwrap();
        assert!(stream.decompress(&mut out, &NullIcache).is_err());
    }

    #[test]
    fn payload_size_mismatch_is_an_error() {
        let mut image = MAGIC.to_vec();
        image.push(0x20);
        image.push(0x04);
        image.extend_from_slice(&[0x21, 0x00, 0x00]);
        image.extend_from_slice(b"abcd");

        let (mut stream, _) = ZbootStream::init(&image, 8).unwrap();
        let mut out = [0u8; 8];
        assert_eq!(
            stream.decompress(&mut out, &NullIcache).unwrap_err(),
            ZbootError::Load("payload size mismatch")
        );
    }
}
