// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! I/O helpers. */

use {
    crate::error::{DebianError, Result},
    pgp::crypto::Hasher,
    pgp_cleartext::CleartextHasher,
    serde::Deserialize,
    std::{
        fmt::Formatter,
        io::{Read, Write},
        path::Path,
        str::FromStr,
    },
};

/// A content checksum flavor.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    /// MD5.
    Md5,

    /// SHA-1.
    Sha1,

    /// SHA-256.
    Sha256,
}

impl Default for ChecksumType {
    fn default() -> Self {
        Self::Md5
    }
}

impl FromStr for ChecksumType {
    type Err = DebianError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            _ => Err(DebianError::UnknownDigest(s.to_string())),
        }
    }
}

impl ChecksumType {
    /// Name of the control archive member listing file digests of this flavor.
    pub fn listing_name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5sums",
            Self::Sha1 => "sha1sums",
            Self::Sha256 => "sha256sums",
        }
    }

    /// Name of the field in `.changes` files holding digests of this flavor.
    pub fn changes_field(&self) -> &'static str {
        match self {
            Self::Md5 => "Files",
            Self::Sha1 => "Checksums-Sha1",
            Self::Sha256 => "Checksums-Sha256",
        }
    }

    /// Obtain a new hasher for this checksum flavor.
    pub fn new_hasher(&self) -> Box<dyn Hasher + Send> {
        Box::new(match self {
            Self::Md5 => CleartextHasher::md5(),
            Self::Sha1 => CleartextHasher::sha1(),
            Self::Sha256 => CleartextHasher::sha256(),
        })
    }
}

/// Represents a content digest.
#[derive(Clone, Eq, PartialEq, PartialOrd)]
pub enum ContentDigest {
    /// An MD5 digest.
    Md5(Vec<u8>),
    /// A SHA-1 digest.
    Sha1(Vec<u8>),
    /// A SHA-256 digest.
    Sha256(Vec<u8>),
}

impl std::fmt::Debug for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5(data) => write!(f, "Md5({})", hex::encode(data)),
            Self::Sha1(data) => write!(f, "Sha1({})", hex::encode(data)),
            Self::Sha256(data) => write!(f, "Sha256({})", hex::encode(data)),
        }
    }
}

impl ContentDigest {
    fn from_checksum(checksum: ChecksumType, digest: Vec<u8>) -> Self {
        match checksum {
            ChecksumType::Md5 => Self::Md5(digest),
            ChecksumType::Sha1 => Self::Sha1(digest),
            ChecksumType::Sha256 => Self::Sha256(digest),
        }
    }

    /// Compute the digest of a byte slice.
    pub fn compute(checksum: ChecksumType, data: &[u8]) -> Self {
        let mut hasher = checksum.new_hasher();
        hasher.update(data);

        Self::from_checksum(checksum, hasher.finish())
    }

    /// Obtain the digest bytes for this content digest.
    pub fn digest_bytes(&self) -> &[u8] {
        match self {
            Self::Md5(x) => x,
            Self::Sha1(x) => x,
            Self::Sha256(x) => x,
        }
    }

    /// Obtain the hex encoded content digest.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest_bytes())
    }

    /// Obtain the [ChecksumType] for this digest.
    pub fn checksum_type(&self) -> ChecksumType {
        match self {
            Self::Md5(_) => ChecksumType::Md5,
            Self::Sha1(_) => ChecksumType::Sha1,
            Self::Sha256(_) => ChecksumType::Sha256,
        }
    }
}

/// Holds multiple flavors of content digests.
#[derive(Clone, Debug)]
pub struct MultiContentDigest {
    pub md5: ContentDigest,
    pub sha1: ContentDigest,
    pub sha256: ContentDigest,
}

impl MultiContentDigest {
    /// Obtain the [ContentDigest] for a given [ChecksumType].
    pub fn digest_from_checksum(&self, checksum: ChecksumType) -> &ContentDigest {
        match checksum {
            ChecksumType::Md5 => &self.md5,
            ChecksumType::Sha1 => &self.sha1,
            ChecksumType::Sha256 => &self.sha256,
        }
    }
}

/// A content digester that simultaneously computes multiple digest types.
pub struct MultiDigester {
    md5: Box<dyn Hasher + Send>,
    sha1: Box<dyn Hasher + Send>,
    sha256: Box<dyn Hasher + Send>,
}

impl Default for MultiDigester {
    fn default() -> Self {
        Self {
            md5: Box::new(CleartextHasher::md5()),
            sha1: Box::new(CleartextHasher::sha1()),
            sha256: Box::new(CleartextHasher::sha256()),
        }
    }
}

impl MultiDigester {
    /// Write content into the digesters.
    pub fn update(&mut self, data: &[u8]) {
        self.md5.update(data);
        self.sha1.update(data);
        self.sha256.update(data);
    }

    /// Finish digesting content.
    ///
    /// Consumes the instance and returns a [MultiContentDigest] holding all the digests.
    pub fn finish(self) -> MultiContentDigest {
        MultiContentDigest {
            md5: ContentDigest::Md5(self.md5.finish()),
            sha1: ContentDigest::Sha1(self.sha1.finish()),
            sha256: ContentDigest::Sha256(self.sha256.finish()),
        }
    }
}

/// A [Read] adapter that computes a [ContentDigest] and byte count as data is read.
pub struct DigestingReader<R> {
    checksum: ChecksumType,
    hasher: Box<dyn Hasher + Send>,
    source: R,
    size: u64,
}

impl<R: Read> DigestingReader<R> {
    /// Construct a new instance from a source reader.
    pub fn new(source: R, checksum: ChecksumType) -> Self {
        Self {
            checksum,
            hasher: checksum.new_hasher(),
            source,
            size: 0,
        }
    }

    /// Finish the stream.
    ///
    /// Returns the source reader, the digest of all data read, and its size.
    pub fn finish(self) -> (R, ContentDigest, u64) {
        (
            self.source,
            ContentDigest::from_checksum(self.checksum, self.hasher.finish()),
            self.size,
        )
    }
}

impl<R: Read> Read for DigestingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let size = self.source.read(buf)?;

        if size > 0 {
            self.hasher.update(&buf[0..size]);
            self.size += size as u64;
        }

        Ok(size)
    }
}

/// A [Write] adapter that computes multiple [ContentDigest] and a byte count as data is written.
pub struct DigestingWriter<W> {
    digester: MultiDigester,
    dest: W,
    size: u64,
}

impl<W: Write> DigestingWriter<W> {
    /// Construct a new instance from a destination writer.
    pub fn new(dest: W) -> Self {
        Self {
            digester: MultiDigester::default(),
            dest,
            size: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Finish the stream.
    ///
    /// Returns the destination writer, a resolved [MultiContentDigest], and the
    /// number of bytes written.
    pub fn finish(self) -> (W, MultiContentDigest, u64) {
        (self.dest, self.digester.finish(), self.size)
    }
}

impl<W: Write> Write for DigestingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.dest.write(buf)?;

        if size > 0 {
            self.digester.update(&buf[0..size]);
            self.size += size as u64;
        }

        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.dest.flush()
    }
}

/// Compression format used by Debian primitives.
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum Compression {
    /// No compression (no extension).
    None,

    /// Gzip compression (.gz extension).
    #[strum(serialize = "gzip", serialize = "gz")]
    #[serde(alias = "gz")]
    Gzip,

    /// Bzip2 compression (.bz2 extension).
    #[strum(serialize = "bzip2", serialize = "bz2")]
    #[serde(alias = "bz2")]
    Bzip2,

    /// XZ compression (.xz extension).
    Xz,
}

impl Default for Compression {
    fn default() -> Self {
        Self::Gzip
    }
}

impl Compression {
    /// Filename extension for files compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
            Self::Xz => ".xz",
        }
    }

    /// Resolve the compression of a file from its extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        match path.as_ref().extension().and_then(|x| x.to_str()) {
            Some("gz") | Some("tgz") => Self::Gzip,
            Some("bz2") | Some("tbz2") => Self::Bzip2,
            Some("xz") | Some("txz") => Self::Xz,
            _ => Self::None,
        }
    }

    /// Wrap a writer with transparent compression.
    pub fn compress<W: Write>(&self, dest: W) -> Result<CompressingWriter<W>> {
        Ok(match self {
            Self::None => CompressingWriter::None(dest),
            Self::Gzip => {
                // A zero modification time keeps output reproducible.
                let header = libflate::gzip::HeaderBuilder::new()
                    .modification_time(0)
                    .finish();
                CompressingWriter::Gzip(libflate::gzip::Encoder::with_options(
                    dest,
                    libflate::gzip::EncodeOptions::new().header(header),
                )?)
            }
            Self::Bzip2 => CompressingWriter::Bzip2(bzip2::write::BzEncoder::new(
                dest,
                bzip2::Compression::best(),
            )),
            Self::Xz => CompressingWriter::Xz(xz2::write::XzEncoder::new(dest, 6)),
        })
    }

    /// Wrap a reader with transparent decompression.
    pub fn decompress<'a>(&self, source: impl Read + 'a) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::None => Box::new(source),
            Self::Gzip => Box::new(libflate::gzip::Decoder::new(source)?),
            Self::Bzip2 => Box::new(bzip2::read::BzDecoder::new(source)),
            Self::Xz => Box::new(xz2::read::XzDecoder::new(source)),
        })
    }
}

/// A writer compressing data in one of the [Compression] formats.
pub enum CompressingWriter<W: Write> {
    None(W),
    Gzip(libflate::gzip::Encoder<W>),
    Bzip2(bzip2::write::BzEncoder<W>),
    Xz(xz2::write::XzEncoder<W>),
}

impl<W: Write> CompressingWriter<W> {
    /// Finalize the compressed stream, returning the inner writer.
    pub fn finish(self) -> Result<W> {
        Ok(match self {
            Self::None(w) => w,
            Self::Gzip(encoder) => encoder.finish().into_result()?,
            Self::Bzip2(encoder) => encoder.finish()?,
            Self::Xz(encoder) => encoder.finish()?,
        })
    }
}

impl<W: Write> Write for CompressingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::None(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
            Self::Bzip2(w) => w.write(buf),
            Self::Xz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::None(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
            Self::Bzip2(w) => w.flush(),
            Self::Xz(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::io::Cursor};

    #[test]
    fn compression_parse() -> Result<()> {
        assert_eq!(Compression::from_str("gzip").unwrap(), Compression::Gzip);
        assert_eq!(Compression::from_str("GZ").unwrap(), Compression::Gzip);
        assert_eq!(Compression::from_str("bzip2").unwrap(), Compression::Bzip2);
        assert_eq!(Compression::from_str("bz2").unwrap(), Compression::Bzip2);
        assert_eq!(Compression::from_str("xz").unwrap(), Compression::Xz);
        assert_eq!(Compression::from_str("none").unwrap(), Compression::None);
        assert!(Compression::from_str("lzma").is_err());

        assert_eq!(Compression::from_path("foo.tar.gz"), Compression::Gzip);
        assert_eq!(Compression::from_path("foo.tgz"), Compression::Gzip);
        assert_eq!(Compression::from_path("foo.tar.bz2"), Compression::Bzip2);
        assert_eq!(Compression::from_path("foo.tar.xz"), Compression::Xz);
        assert_eq!(Compression::from_path("foo.tar"), Compression::None);

        Ok(())
    }

    #[test]
    fn compression_codecs() -> Result<()> {
        let data = b"hello world hello world hello world".repeat(100);

        for compression in [
            Compression::None,
            Compression::Gzip,
            Compression::Bzip2,
            Compression::Xz,
        ] {
            let mut writer = compression.compress(Vec::new())?;
            writer.write_all(&data)?;
            let compressed = writer.finish()?;

            if compression != Compression::None {
                assert!(compressed.len() < data.len());
            }

            let mut decoded = vec![];
            compression
                .decompress(Cursor::new(compressed))?
                .read_to_end(&mut decoded)?;
            assert_eq!(decoded, data);
        }

        Ok(())
    }

    #[test]
    fn gzip_output_reproducible() -> Result<()> {
        let encode = || -> Result<Vec<u8>> {
            let mut writer = Compression::Gzip.compress(Vec::new())?;
            writer.write_all(b"content")?;
            writer.finish()
        };

        assert_eq!(encode()?, encode()?);

        Ok(())
    }

    #[test]
    fn digesting_reader() -> Result<()> {
        let mut reader = DigestingReader::new(Cursor::new(b"abc".to_vec()), ChecksumType::Md5);
        std::io::copy(&mut reader, &mut std::io::sink())?;
        let (_, digest, size) = reader.finish();

        assert_eq!(size, 3);
        assert_eq!(digest.digest_hex(), "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(digest.checksum_type(), ChecksumType::Md5);

        Ok(())
    }

    #[test]
    fn digesting_writer() -> Result<()> {
        let mut writer = DigestingWriter::new(Vec::new());
        writer.write_all(b"ab")?;
        writer.write_all(b"c")?;
        assert_eq!(writer.size(), 3);

        let (dest, digests, size) = writer.finish();
        assert_eq!(dest, b"abc");
        assert_eq!(size, 3);
        assert_eq!(
            digests.sha1.digest_hex(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            digests.digest_from_checksum(ChecksumType::Sha256).digest_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            ContentDigest::compute(ChecksumType::Md5, b"abc"),
            digests.md5
        );

        Ok(())
    }

    #[test]
    fn checksum_names() -> Result<()> {
        assert_eq!(ChecksumType::from_str("SHA-256")?, ChecksumType::Sha256);
        assert_eq!(ChecksumType::Md5.listing_name(), "md5sums");
        assert_eq!(ChecksumType::Sha1.changes_field(), "Checksums-Sha1");
        assert!(ChecksumType::from_str("crc32").is_err());

        Ok(())
    }
}
