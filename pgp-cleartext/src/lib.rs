// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PGP cleartext framework

The PGP cleartext framework is a mechanism to store PGP signatures inline with
the cleartext data that is being signed.

The cleartext framework is defined by
[RFC 4880 Section 7](https://datatracker.ietf.org/doc/html/rfc4880.html#section-7)
and this implementation aims to be conformant with the specification.

PGP cleartext signatures are text documents beginning with
`-----BEGIN PGP SIGNED MESSAGE-----`. They have the form:

```text
-----BEGIN PGP SIGNED MESSAGE-----
Hash: <digest>

<normalized signed content>
-----BEGIN PGP SIGNATURE-----
<headers>

<signature data>
-----END PGP SIGNATURE-----
```

Signing is streaming: [CleartextSigningWriter] emits the normalized cleartext
to its destination as soon as a line is complete and digests it at the same
time, so the signed content never needs to be buffered or read twice.
[SignatureHasher] exposes the same incremental machinery for other signature
types, such as detached binary signatures.
*/

use {
    chrono::{DateTime, SubsecRound, Utc},
    digest::Digest,
    pgp::{
        armor::BlockType,
        crypto::{HashAlgorithm, Hasher},
        packet::{Packet, SignatureConfig, SignatureType, Subpacket},
        types::{KeyVersion, SecretKeyTrait},
        Signature,
    },
    smallvec::SmallVec,
    std::io::{self, Read, Write},
};

const HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";

/// Wrapper around content digesting to work around lack of clone() in pgp crate.
#[derive(Clone)]
pub enum CleartextHasher {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha224(sha2::Sha224),
    Sha256(sha2::Sha256),
    Sha384(sha2::Sha384),
    Sha512(sha2::Sha512),
}

impl CleartextHasher {
    pub fn md5() -> Self {
        Self::Md5(md5::Md5::new())
    }

    pub fn sha1() -> Self {
        Self::Sha1(sha1::Sha1::new())
    }

    pub fn sha224() -> Self {
        Self::Sha224(sha2::Sha224::new())
    }

    pub fn sha256() -> Self {
        Self::Sha256(sha2::Sha256::new())
    }

    pub fn sha384() -> Self {
        Self::Sha384(sha2::Sha384::new())
    }

    pub fn sha512() -> Self {
        Self::Sha512(sha2::Sha512::new())
    }

    /// Obtain a hasher for a PGP hash algorithm, if we implement it natively.
    pub fn from_algorithm(algorithm: HashAlgorithm) -> Option<Self> {
        match algorithm {
            HashAlgorithm::MD5 => Some(Self::md5()),
            HashAlgorithm::SHA1 => Some(Self::sha1()),
            HashAlgorithm::SHA2_224 => Some(Self::sha224()),
            HashAlgorithm::SHA2_256 => Some(Self::sha256()),
            HashAlgorithm::SHA2_384 => Some(Self::sha384()),
            HashAlgorithm::SHA2_512 => Some(Self::sha512()),
            _ => None,
        }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        match self {
            Self::Md5(_) => HashAlgorithm::MD5,
            Self::Sha1(_) => HashAlgorithm::SHA1,
            Self::Sha224(_) => HashAlgorithm::SHA2_224,
            Self::Sha256(_) => HashAlgorithm::SHA2_256,
            Self::Sha384(_) => HashAlgorithm::SHA2_384,
            Self::Sha512(_) => HashAlgorithm::SHA2_512,
        }
    }
}

impl std::io::Write for CleartextHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Hasher for CleartextHasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(digest) => digest.update(data),
            Self::Sha1(digest) => digest.update(data),
            Self::Sha224(digest) => digest.update(data),
            Self::Sha256(digest) => digest.update(data),
            Self::Sha384(digest) => digest.update(data),
            Self::Sha512(digest) => digest.update(data),
        }
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        match *self {
            Self::Md5(digest) => digest.finalize().to_vec(),
            Self::Sha1(digest) => digest.finalize().to_vec(),
            Self::Sha224(digest) => digest.finalize().to_vec(),
            Self::Sha256(digest) => digest.finalize().to_vec(),
            Self::Sha384(digest) => digest.finalize().to_vec(),
            Self::Sha512(digest) => digest.finalize().to_vec(),
        }
    }
}

/// The name of a hash algorithm as it appears in the `Hash:` armor header.
///
/// Returns `None` for algorithms that cannot be used for cleartext signatures.
pub fn hash_algorithm_name(algorithm: HashAlgorithm) -> Option<&'static str> {
    match algorithm {
        HashAlgorithm::MD5 => Some("MD5"),
        HashAlgorithm::SHA1 => Some("SHA1"),
        HashAlgorithm::RIPEMD160 => Some("RIPEMD160"),
        HashAlgorithm::SHA2_256 => Some("SHA256"),
        HashAlgorithm::SHA2_384 => Some("SHA384"),
        HashAlgorithm::SHA2_512 => Some("SHA512"),
        HashAlgorithm::SHA2_224 => Some("SHA224"),
        _ => None,
    }
}

/// Incrementally computes a v4 PGP signature.
///
/// Content is fed through [Self::update()] (or the [Write] implementation) and
/// the signature is produced by [Self::finish()]. Nothing is retained besides the
/// running digest.
pub struct SignatureHasher {
    config: SignatureConfig,
    hasher: Box<dyn Hasher>,
}

impl SignatureHasher {
    /// Begin a signature created now.
    pub fn new(
        key: &impl SecretKeyTrait,
        signature_type: SignatureType,
        hash_algorithm: HashAlgorithm,
    ) -> pgp::errors::Result<Self> {
        Self::with_creation_time(
            key,
            signature_type,
            hash_algorithm,
            chrono::Utc::now().trunc_subsecs(0),
        )
    }

    /// Begin a signature with an explicit creation time.
    pub fn with_creation_time(
        key: &impl SecretKeyTrait,
        signature_type: SignatureType,
        hash_algorithm: HashAlgorithm,
        created: DateTime<Utc>,
    ) -> pgp::errors::Result<Self> {
        let hasher: Box<dyn Hasher> = match CleartextHasher::from_algorithm(hash_algorithm) {
            Some(hasher) => Box::new(hasher),
            None => hash_algorithm.new_hasher()?,
        };

        let hashed_subpackets = vec![
            Subpacket::IssuerFingerprint(KeyVersion::V4, SmallVec::from_slice(&key.fingerprint())),
            Subpacket::SignatureCreationTime(created.trunc_subsecs(0)),
        ];
        let unhashed_subpackets = vec![Subpacket::Issuer(key.key_id())];

        let config = SignatureConfig::new_v4(
            Default::default(),
            signature_type,
            key.algorithm(),
            hash_algorithm,
            hashed_subpackets,
            unhashed_subpackets,
        );

        Ok(Self { config, hasher })
    }

    /// Feed signed content into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Produce the signature over all content fed so far.
    pub fn finish<PW>(self, key: &impl SecretKeyTrait, key_pw: PW) -> pgp::errors::Result<Signature>
    where
        PW: FnOnce() -> String,
    {
        let Self { config, mut hasher } = self;

        let len = config.hash_signature_data(&mut *hasher)?;
        hasher.update(&config.trailer(len));

        let digest = hasher.finish();
        let signed_hash_value = [digest[0], digest[1]];
        let mpis = key.create_signature(key_pw, config.hash_alg, &digest)?;

        Ok(Signature::from_config(config, signed_hash_value, mpis))
    }
}

impl Write for SignatureHasher {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write an ASCII armored signature block.
pub fn write_armored_signature(
    signature: Signature,
    writer: &mut impl Write,
) -> pgp::errors::Result<()> {
    let packet = Packet::Signature(signature);
    pgp::armor::write(&packet, BlockType::Signature, writer, None)
}

/// A writer producing a PGP cleartext signature as content is written to it.
///
/// The armor header and `Hash:` line are emitted on construction. Every complete
/// line written afterwards is normalized and forwarded to the destination
/// immediately while being fed to the signature digest. [Self::finish()] flushes
/// any unterminated final line and appends the armored signature.
///
/// Per RFC 4880 Section 7.1, trailing whitespace is removed from every line,
/// lines beginning with `-` or `From ` are dash-escaped in the output, and the
/// digest covers the lines joined by CRLF without a line ending after the final
/// line.
pub struct CleartextSigningWriter<W: Write> {
    dest: W,
    signature: SignatureHasher,
    pending: Vec<u8>,
    lines: u64,
}

impl<W: Write> CleartextSigningWriter<W> {
    /// Construct a new instance writing to `dest`.
    pub fn new(
        key: &impl SecretKeyTrait,
        hash_algorithm: HashAlgorithm,
        mut dest: W,
    ) -> pgp::errors::Result<Self> {
        let name = hash_algorithm_name(hash_algorithm).ok_or_else(|| {
            pgp::errors::Error::Unsupported(
                "hash algorithm unsupported for cleartext signatures".to_string(),
            )
        })?;

        let signature = SignatureHasher::new(key, SignatureType::Text, hash_algorithm)?;

        dest.write_all(format!("{}\nHash: {}\n\n", HEADER, name).as_bytes())?;

        Ok(Self {
            dest,
            signature,
            pending: vec![],
            lines: 0,
        })
    }

    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        let mut end = line.len();
        while end > 0 && line[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        let line = &line[..end];

        if self.lines > 0 {
            self.signature.update(b"\r\n");
        }
        self.signature.update(line);

        if line.starts_with(b"-") || line.starts_with(b"From ") {
            self.dest.write_all(b"- ")?;
        }
        self.dest.write_all(line)?;
        self.dest.write_all(b"\n")?;

        self.lines += 1;

        Ok(())
    }

    /// Finish the cleartext and write out the signature.
    ///
    /// Returns the destination writer.
    pub fn finish<PW>(mut self, key: &impl SecretKeyTrait, key_pw: PW) -> pgp::errors::Result<W>
    where
        PW: FnOnce() -> String,
    {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.write_line(&line)?;
        }

        let Self {
            mut dest,
            signature,
            ..
        } = self;

        let signature = signature.finish(key, key_pw)?;
        write_armored_signature(signature, &mut dest)?;
        dest.flush()?;

        Ok(dest)
    }
}

impl<W: Write> Write for CleartextSigningWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;

        while let Some(pos) = remaining.iter().position(|b| *b == b'\n') {
            let (line, rest) = remaining.split_at(pos);

            if self.pending.is_empty() {
                self.write_line(line)?;
            } else {
                self.pending.extend_from_slice(line);
                let line = std::mem::take(&mut self.pending);
                self.write_line(&line)?;
            }

            remaining = &rest[1..];
        }

        self.pending.extend_from_slice(remaining);

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.dest.flush()
    }
}

/// Produce a cleartext signature over data.
///
/// The original cleartext data to be signed is provided by a reader.
///
/// The returned value is a multiline string with LF line endings containing the PGP
/// cleartext framework encoded cleartext and signature. The signature is produced by
/// the provided key using the specified hashing algorithm.
pub fn cleartext_sign<PW, R>(
    key: &impl SecretKeyTrait,
    key_pw: PW,
    hash_algorithm: HashAlgorithm,
    mut data: R,
) -> pgp::errors::Result<String>
where
    PW: FnOnce() -> String,
    R: Read,
{
    let mut writer = CleartextSigningWriter::new(key, hash_algorithm, Vec::new())?;
    io::copy(&mut data, &mut writer)?;
    let buffer = writer.finish(key, key_pw)?;

    // The armoring should always produce valid UTF-8. But we are careful.
    String::from_utf8(buffer).map_err(|e| pgp::errors::Error::Utf8Error(e.utf8_error()))
}
