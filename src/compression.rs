//! Pluggable compression for staged part files.
//!
//! Output compression is chosen by name through the
//! [`OUTPUT_COMPRESSION`](crate::config::OUTPUT_COMPRESSION) key; the codec's
//! extension is appended to both the staged and the committed file name so a
//! reader can pick the decoder from the path alone.
//!
//! ## Built-in Codecs
//!
//! When enabled via feature flags, the following codecs are available:
//! - **Gzip** (`.gz`) - via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) - via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) - via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) - via `xz2` (feature: `compression-xz`)
//!
//! Further codecs can be added at runtime with [`register_codec`].
//!
//! Writers are returned as [`EncodedWrite`] so the encoder trailer is written
//! by an explicit, fallible [`EncodedWrite::finish`] instead of on drop.

use anyhow::{Context, Result, bail};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// Global codec registry.
static CODEC_REGISTRY: RwLock<Option<Vec<Arc<dyn CompressionCodec>>>> = RwLock::new(None);

fn init_registry() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-bzip2")]
        Arc::new(Bzip2Codec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

fn registry() -> Vec<Arc<dyn CompressionCodec>> {
    if let Some(codecs) = CODEC_REGISTRY.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
        return codecs.clone();
    }
    let mut lock = CODEC_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).clone()
}

/// Register a custom compression codec globally.
///
/// A codec registered under the name of an existing one shadows it.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    let mut lock = CODEC_REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    lock.get_or_insert_with(init_registry).insert(0, codec);
}

/// A writer whose trailer must be flushed explicitly.
pub trait EncodedWrite: Write + Send {
    /// Write any trailer and flush everything down to the underlying sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the final bytes cannot be written.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Pluggable compression codec.
pub trait CompressionCodec: Send + Sync {
    /// Name used in configuration (e.g. `"gzip"`).
    fn name(&self) -> &str;

    /// Extension appended to part file names, including the leading dot.
    fn extension(&self) -> &str;

    /// Optional magic byte signature for content-based detection.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    ///
    /// # Errors
    ///
    /// Returns an error if the decoder cannot be initialised.
    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>>;

    /// Wrap a writer with compression.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoder cannot be initialised.
    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn EncodedWrite>>;
}

/// Look up a registered codec by configuration name (case-insensitive).
///
/// # Errors
///
/// Returns an error naming the available codecs if none matches.
pub fn codec_by_name(name: &str) -> Result<Arc<dyn CompressionCodec>> {
    let codecs = registry();
    if let Some(codec) = codecs.iter().find(|c| c.name().eq_ignore_ascii_case(name)) {
        return Ok(Arc::clone(codec));
    }
    let known: Vec<&str> = codecs.iter().map(|c| c.name()).collect();
    bail!("unknown compression codec `{name}` (available: {known:?})")
}

fn detect_from_extension(path: &Path) -> Option<Arc<dyn CompressionCodec>> {
    let name = path.to_string_lossy().to_lowercase();
    registry()
        .into_iter()
        .find(|codec| name.ends_with(codec.extension()))
}

fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    registry()
        .into_iter()
        .find(|codec| codec.magic_bytes().is_some_and(|magic| buf.starts_with(magic)))
}

/// Wrap `writer` with the named codec, or a plain buffered writer for `None`.
///
/// # Errors
///
/// Returns an error if the codec is unknown or fails to initialise.
pub fn encoded_writer(writer: Box<dyn Write + Send>, codec: Option<&str>) -> Result<Box<dyn EncodedWrite>> {
    match codec {
        None => Ok(Box::new(Plain(BufWriter::new(writer)))),
        Some(name) => {
            let codec = codec_by_name(name)?;
            codec
                .wrap_writer(writer)
                .with_context(|| format!("wrap writer with {} codec", codec.name()))
        }
    }
}

/// Extension for the named codec, or `""` when uncompressed.
///
/// # Errors
///
/// Returns an error if the codec is unknown.
pub fn extension_for(codec: Option<&str>) -> Result<String> {
    match codec {
        None => Ok(String::new()),
        Some(name) => Ok(codec_by_name(name)?.extension().to_string()),
    }
}

/// Wrap a reader with the codec named by the path extension, or return it
/// buffered as-is. The content is never sniffed.
///
/// # Errors
///
/// Returns an error if the codec fails to initialise.
pub fn reader_for_extension(reader: Box<dyn Read + Send>, path: &Path) -> Result<Box<dyn Read + Send>> {
    match detect_from_extension(path) {
        Some(codec) => codec
            .wrap_reader(reader)
            .with_context(|| format!("wrap reader with {} codec", codec.name())),
        None => Ok(Box::new(BufReader::new(reader))),
    }
}

/// Wrap a reader with decompression detected from the path extension, falling
/// back to magic bytes, or return it buffered as-is.
///
/// For files of unknown origin. Plain text that happens to start with a
/// codec's magic bytes is misdetected.
///
/// # Errors
///
/// Returns an error if a detected codec fails to initialise.
pub fn auto_detect_reader(reader: Box<dyn Read + Send>, path_hint: &Path) -> Result<Box<dyn Read + Send>> {
    if let Some(codec) = detect_from_extension(path_hint) {
        return codec
            .wrap_reader(reader)
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }

    let mut buf_reader = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buf_reader) {
        return codec
            .wrap_reader(Box::new(buf_reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }
    Ok(Box::new(buf_reader))
}

struct Plain(BufWriter<Box<dyn Write + Send>>);

impl Write for Plain {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl EncodedWrite for Plain {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.0.flush()
    }
}

// ============================================================================
// Built-in Codec Implementations
// ============================================================================

/// Implements [`EncodedWrite`] for an encoder whose `finish` returns the inner writer.
macro_rules! finishing_encoder {
    ($ty:ty) => {
        impl EncodedWrite for $ty {
            fn finish(self: Box<Self>) -> io::Result<()> {
                let mut inner = (*self).finish()?;
                inner.flush()
            }
        }
    };
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
finishing_encoder!(flate2::write::GzEncoder<Box<dyn Write + Send>>);

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extension(&self) -> &str {
        ".gz"
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn EncodedWrite>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
finishing_encoder!(zstd::stream::write::Encoder<'static, Box<dyn Write + Send>>);

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extension(&self) -> &str {
        ".zst"
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read + Send>)
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn EncodedWrite>> {
        zstd::stream::write::Encoder::new(writer, 3).map(|e| Box::new(e) as Box<dyn EncodedWrite>)
    }
}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
finishing_encoder!(bzip2::write::BzEncoder<Box<dyn Write + Send>>);

#[cfg(feature = "compression-bzip2")]
impl CompressionCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extension(&self) -> &str {
        ".bz2"
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x42, 0x5a, 0x68])
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn EncodedWrite>> {
        use bzip2::Compression;
        use bzip2::write::BzEncoder;
        Ok(Box::new(BzEncoder::new(writer, Compression::default())))
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
finishing_encoder!(xz2::write::XzEncoder<Box<dyn Write + Send>>);

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extension(&self) -> &str {
        ".xz"
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    }

    fn wrap_writer(&self, writer: Box<dyn Write + Send>) -> io::Result<Box<dyn EncodedWrite>> {
        Ok(Box::new(xz2::write::XzEncoder::new(writer, 6)))
    }
}
