// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! PGP signing of packages and `.changes` files.

[PgpSigner] holds a secret key loaded from a keyring. It produces cleartext
signatures (as used by `.changes` files and `dpkg-sig` manifests) and armored
detached signatures (as used by `debsig-verify`).

Signatures are computed while content streams through the signer, so content
is never read twice.
*/

use {
    crate::error::{DebianError, Result},
    pgp::{
        crypto::{HashAlgorithm, SymmetricKeyAlgorithm},
        packet::{SecretSubkey, SignatureType},
        types::{CompressionAlgorithm, KeyTrait, SecretKeyTrait},
        Deserializable, KeyType, SecretKeyParams, SecretKeyParamsBuilder, SignedPublicKey,
        SignedSecretKey,
    },
    pgp_cleartext::{write_armored_signature, CleartextSigningWriter, SignatureHasher},
    smallvec::smallvec,
    std::io::{Cursor, Read, Write},
};

/// Digest used when none is requested.
pub const DEFAULT_DIGEST: HashAlgorithm = HashAlgorithm::SHA2_256;

/// Resolve a digest algorithm from its name.
///
/// Names are matched case insensitively and may contain dashes (`SHA-256`).
pub fn digest_algorithm(name: &str) -> Result<HashAlgorithm> {
    let normalized = name.replace('-', "").to_ascii_uppercase();

    match normalized.as_str() {
        "SHA1" => Ok(HashAlgorithm::SHA1),
        "MD5" => Ok(HashAlgorithm::MD5),
        "RIPEMD160" => Ok(HashAlgorithm::RIPEMD160),
        "SHA256" => Ok(HashAlgorithm::SHA2_256),
        "SHA384" => Ok(HashAlgorithm::SHA2_384),
        "SHA512" => Ok(HashAlgorithm::SHA2_512),
        "SHA224" => Ok(HashAlgorithm::SHA2_224),
        "MD2" => Err(DebianError::Signing(
            "the MD2 digest is not supported".to_string(),
        )),
        _ => Err(DebianError::UnknownDigest(name.to_string())),
    }
}

/// Obtain a [SecretKeyParamsBuilder] defining how to generate a signing key.
///
/// The returned builder will have defaults appropriate for Debian signing keys.
/// Callers may customize the key before calling `.build()`.
pub fn signing_secret_key_params_builder(primary_user_id: impl ToString) -> SecretKeyParamsBuilder {
    let mut key_params = SecretKeyParamsBuilder::default();
    key_params
        .key_type(KeyType::Rsa(2048))
        .preferred_symmetric_algorithms(smallvec![SymmetricKeyAlgorithm::AES256])
        .preferred_hash_algorithms(smallvec![
            HashAlgorithm::SHA2_256,
            HashAlgorithm::SHA2_384,
            HashAlgorithm::SHA2_512
        ])
        .preferred_compression_algorithms(smallvec![CompressionAlgorithm::ZLIB])
        .can_create_certificates(false)
        .can_sign(true)
        .primary_user_id(primary_user_id.to_string());

    key_params
}

/// Generate a self-signed secret key and its public key.
pub fn create_self_signed_key<PW>(
    params: SecretKeyParams,
    key_passphrase: PW,
) -> Result<(SignedSecretKey, SignedPublicKey)>
where
    PW: (FnOnce() -> String) + Clone,
{
    let secret_key = params.generate()?;
    let secret_key_signed = secret_key.sign(key_passphrase.clone())?;

    let public_key = secret_key_signed.public_key();
    let public_key_signed = public_key.sign(&secret_key_signed, key_passphrase)?;

    Ok((secret_key_signed, public_key_signed))
}

/// The key material used by a [PgpSigner].
#[derive(Clone, Debug)]
pub enum SigningKey {
    Primary(SignedSecretKey),
    Subkey(SecretSubkey),
}

impl SigningKey {
    /// The 16 hex digit key id.
    pub fn key_id_hex(&self) -> String {
        let id = match self {
            Self::Primary(k) => k.key_id(),
            Self::Subkey(k) => k.key_id(),
        };

        hex::encode_upper(id.as_ref())
    }
}

/// Normalize a requested key id to upper case hex without a `0x` prefix.
fn normalize_key_id(id: &str) -> Result<String> {
    let id = id.trim();
    let id = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id)
        .to_ascii_uppercase();

    if !id.is_empty() && (id.len() != 8 && id.len() != 16 || hex::decode(&id).is_err()) {
        return Err(DebianError::Signing(format!("invalid key id: {}", id)));
    }

    Ok(id)
}

/// Signs content with a secret key from a keyring.
pub struct PgpSigner {
    key: SigningKey,
    passphrase: String,
    digest: HashAlgorithm,
}

impl PgpSigner {
    /// Load a signing key from an armored or binary secret keyring.
    ///
    /// The first signing capable primary key or subkey whose id ends with
    /// `key_id` is selected. An empty `key_id` selects the first signing key.
    /// The passphrase must unlock the selected key.
    pub fn from_keyring(
        mut keyring: impl Read,
        key_id: &str,
        passphrase: impl ToString,
        digest: HashAlgorithm,
    ) -> Result<Self> {
        let wanted = normalize_key_id(key_id)?;

        let mut data = vec![];
        keyring.read_to_end(&mut data)?;

        let armored = data
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map(|pos| data[pos..].starts_with(b"-----BEGIN"))
            .unwrap_or_default();

        let keys = if armored {
            let (keys, _) = SignedSecretKey::from_armor_many(Cursor::new(&data))?;
            keys.collect::<pgp::errors::Result<Vec<_>>>()?
        } else {
            SignedSecretKey::from_bytes_many(Cursor::new(&data))
                .collect::<pgp::errors::Result<Vec<_>>>()?
        };

        let matches = |id: pgp::types::KeyId| hex::encode_upper(id.as_ref()).ends_with(&wanted);

        let key = keys
            .into_iter()
            .find_map(|key| {
                if key.is_signing_key() && matches(key.key_id()) {
                    return Some(SigningKey::Primary(key));
                }

                key.secret_subkeys
                    .iter()
                    .find(|sub| sub.key.is_signing_key() && matches(sub.key.key_id()))
                    .map(|sub| SigningKey::Subkey(sub.key.clone()))
            })
            .ok_or_else(|| {
                DebianError::Signing(format!("secret key {} not found in keyring", key_id))
            })?;

        Self::new(key, passphrase, digest)
    }

    /// Construct an instance from a key, verifying the passphrase unlocks it.
    pub fn new(key: SigningKey, passphrase: impl ToString, digest: HashAlgorithm) -> Result<Self> {
        let passphrase = passphrase.to_string();

        let unlocked = match &key {
            SigningKey::Primary(k) => k.unlock(|| passphrase.clone(), |_| Ok(())),
            SigningKey::Subkey(k) => k.unlock(|| passphrase.clone(), |_| Ok(())),
        };
        unlocked.map_err(|e| {
            DebianError::Signing(format!(
                "unable to unlock key {}: {}",
                key.key_id_hex(),
                e
            ))
        })?;

        Ok(Self {
            key,
            passphrase,
            digest,
        })
    }

    pub fn key(&self) -> &SigningKey {
        &self.key
    }

    pub fn digest(&self) -> HashAlgorithm {
        self.digest
    }

    /// Write a cleartext signature of `reader` to `writer`.
    pub fn clear_sign<W: Write>(&self, reader: impl Read, writer: W) -> Result<W> {
        match &self.key {
            SigningKey::Primary(k) => self.clear_sign_with(k, reader, writer),
            SigningKey::Subkey(k) => self.clear_sign_with(k, reader, writer),
        }
    }

    fn clear_sign_with<W: Write>(
        &self,
        key: &impl SecretKeyTrait,
        mut reader: impl Read,
        writer: W,
    ) -> Result<W> {
        let mut signer = CleartextSigningWriter::new(key, self.digest, writer)?;
        std::io::copy(&mut reader, &mut signer)?;

        Ok(signer.finish(key, || self.passphrase.clone())?)
    }

    /// Produce an armored detached binary signature of `reader`.
    pub fn detached_signature(&self, reader: impl Read) -> Result<Vec<u8>> {
        match &self.key {
            SigningKey::Primary(k) => self.detached_signature_with(k, reader),
            SigningKey::Subkey(k) => self.detached_signature_with(k, reader),
        }
    }

    fn detached_signature_with(
        &self,
        key: &impl SecretKeyTrait,
        mut reader: impl Read,
    ) -> Result<Vec<u8>> {
        let mut hasher = SignatureHasher::new(key, SignatureType::Binary, self.digest)?;
        std::io::copy(&mut reader, &mut hasher)?;

        let signature = hasher.finish(key, || self.passphrase.clone())?;

        let mut armored = vec![];
        write_armored_signature(signature, &mut armored)?;

        Ok(armored)
    }
}

/// Generate a throwaway key pair protected by `passphrase`.
#[cfg(test)]
pub(crate) fn test_key(passphrase: &str) -> Result<(SignedSecretKey, SignedPublicKey)> {
    let params = signing_secret_key_params_builder("Packager <packager@example.com>")
        .passphrase(if passphrase.is_empty() {
            None
        } else {
            Some(passphrase.to_string())
        })
        .build()
        .map_err(|e| DebianError::Signing(e.to_string()))?;

    let passphrase = passphrase.to_string();
    create_self_signed_key(params, move || passphrase)
}
