// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Create .deb package files and their components. */

use {
    super::{DebTarWriter, TarOptions},
    crate::{
        binary_package_control::BinaryPackageControlFile,
        changes::{build_changes_file, ChangeSet, ChangesFile},
        entry::{PackageEntry, DEFAULT_DIR_MODE},
        error::{DebianError, Result},
        io::{
            ChecksumType, ContentDigest, DigestingReader, DigestingWriter, MultiContentDigest,
        },
        paths::parent_directories,
        producers::{DataConsumer, DataProducer},
        signing::PgpSigner,
    },
    chrono::{DateTime, TimeZone, Utc},
    serde::Deserialize,
    slog::{debug, info, warn},
    std::{
        collections::{BTreeMap, HashSet},
        fs::File,
        io::{BufWriter, Cursor, Read, Seek, SeekFrom, Write},
        path::Path,
        time::SystemTime,
    },
};

/// Content of the `debian-binary` member.
const DEBIAN_BINARY: &[u8] = b"2.0\n";

/// Control archive members installed executable.
pub const MAINTAINER_SCRIPTS: &[&str] = &["preinst", "postinst", "prerm", "postrm", "config"];

const CONFFILES: &str = "conffiles";

fn default_role() -> String {
    "origin".to_string()
}

/// How a built package is signed.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase", tag = "method")]
pub enum PackageSignatureMethod {
    /// An armored detached signature over the concatenated member content, as
    /// verified by `debsig-verify`.
    Debsig {
        #[serde(default = "default_role")]
        role: String,
    },
    /// A cleartext signed manifest of member digests, as produced by `dpkg-sig`.
    #[serde(rename = "dpkg-sig")]
    DpkgSig {
        #[serde(default = "default_role")]
        role: String,
    },
}

impl Default for PackageSignatureMethod {
    fn default() -> Self {
        Self::Debsig {
            role: default_role(),
        }
    }
}

impl PackageSignatureMethod {
    pub fn role(&self) -> &str {
        match self {
            Self::Debsig { role } => role,
            Self::DpkgSig { role } => role,
        }
    }

    /// Name of the ar member holding the signature.
    pub fn member_name(&self) -> String {
        format!("_gpg{}", self.role())
    }
}

/// The digest of a regular file in the data archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DigestRecord {
    pub path: String,
    pub digest: ContentDigest,
    pub size: u64,
}

/// Describes a package produced by [DebBuilder::write()].
#[derive(Clone, Debug)]
pub struct BuildSummary {
    /// The control file as written to the package.
    pub control: BinaryPackageControlFile,
    /// Total size of regular files in the data archive.
    pub data_size: u64,
    /// Digests of regular files, in archive order.
    pub files: Vec<DigestRecord>,
    /// Absolute paths listed in `conffiles`.
    pub conffiles: Vec<String>,
    /// Size of the `.deb` file.
    pub package_size: u64,
    /// Digest of the `.deb` file using the configured package checksum.
    pub package_digest: ContentDigest,
    pub package_digests: MultiContentDigest,
}

impl BuildSummary {
    /// Construct a `.changes` file describing this package.
    pub fn changes_file(
        &self,
        package_filename: &str,
        change_sets: &[ChangeSet],
        date: &DateTime<Utc>,
    ) -> Result<ChangesFile> {
        build_changes_file(
            &self.control,
            change_sets,
            package_filename,
            self.package_size,
            &self.package_digests,
            date,
        )
    }
}

/// Convert CRLF and CR line endings to LF.
fn normalize_line_endings(data: &[u8]) -> Vec<u8> {
    let mut res = Vec::with_capacity(data.len());
    let mut iter = data.iter().peekable();

    while let Some(b) = iter.next() {
        if *b == b'\r' {
            if iter.peek() == Some(&&b'\n') {
                iter.next();
            }
            res.push(b'\n');
        } else {
            res.push(*b);
        }
    }

    res
}

/// Writes produced entries to the data archive.
struct DataArchiveConsumer<'a, W: Write> {
    logger: &'a slog::Logger,
    tar: DebTarWriter<W>,
    checksum: ChecksumType,
    seen: HashSet<String>,
    files: Vec<DigestRecord>,
    conffiles: Vec<String>,
    record_conffiles: bool,
    data_size: u64,
}

impl<'a, W: Write> DataArchiveConsumer<'a, W> {
    /// Reserve the path of an entry, writing missing parent directories.
    ///
    /// Returns false if the path was already written.
    fn claim(&mut self, entry: &PackageEntry) -> Result<bool> {
        if entry.path().is_empty() {
            return Ok(false);
        }

        if self.seen.contains(entry.path()) {
            if entry.is_dir() {
                debug!(self.logger, "directory already present"; "path" => entry.path());
            } else {
                warn!(self.logger, "skipping duplicate entry"; "path" => entry.path());
            }
            return Ok(false);
        }

        for parent in parent_directories(entry.path()) {
            if self.seen.insert(parent.to_string()) {
                let mut dir = PackageEntry::directory(parent);
                dir.mode = DEFAULT_DIR_MODE;
                dir.set_owner(&entry.user_name, entry.uid, &entry.group_name, entry.gid);

                debug!(self.logger, "adding parent directory"; "path" => parent);
                self.tar.append_entry(&dir, &mut std::io::empty())?;
            }
        }

        self.seen.insert(entry.path().to_string());

        Ok(true)
    }
}

impl<'a, W: Write> DataConsumer for DataArchiveConsumer<'a, W> {
    fn on_each_file(&mut self, entry: PackageEntry, content: &mut dyn Read) -> Result<()> {
        if !self.claim(&entry)? {
            return Ok(());
        }

        let mut reader = DigestingReader::new(content, self.checksum);
        self.tar.append_entry(&entry, &mut reader)?;
        let (_, digest, size) = reader.finish();

        debug!(self.logger, "adding file";
            "path" => entry.path(),
            "size" => size,
            "mode" => format!("{:o}", entry.mode),
            "owner" => format!("{}:{}", entry.user_name, entry.group_name),
            "digest" => digest.digest_hex());

        if self.record_conffiles {
            self.conffiles.push(format!("/{}", entry.path()));
        }

        self.data_size += size;
        self.files.push(DigestRecord {
            path: entry.path().to_string(),
            digest,
            size,
        });

        Ok(())
    }

    fn on_each_dir(&mut self, entry: PackageEntry) -> Result<()> {
        if self.claim(&entry)? {
            debug!(self.logger, "adding directory";
                "path" => entry.path(),
                "mode" => format!("{:o}", entry.mode));
            self.tar.append_entry(&entry, &mut std::io::empty())?;
        }

        Ok(())
    }

    fn on_each_link(&mut self, entry: PackageEntry) -> Result<()> {
        if self.claim(&entry)? {
            debug!(self.logger, "adding link";
                "path" => entry.path(),
                "target" => entry.link_target.clone().unwrap_or_default());
            self.tar.append_entry(&entry, &mut std::io::empty())?;
        }

        Ok(())
    }
}

/// Rewind a staged archive, returning its size.
fn rewind(file: &mut File) -> Result<u64> {
    let size = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;

    Ok(size)
}

/// Digest a staged archive, leaving it rewound.
fn staged_digests(file: &mut File) -> Result<MultiContentDigest> {
    file.seek(SeekFrom::Start(0))?;
    let mut digester = DigestingWriter::new(std::io::sink());
    std::io::copy(file, &mut digester)?;
    file.seek(SeekFrom::Start(0))?;

    Ok(digester.finish().1)
}

fn append_member<W: Write>(
    ar_builder: &mut ar::Builder<W>,
    name: &str,
    size: u64,
    mtime: u64,
    data: impl Read,
) -> Result<()> {
    let mut header = ar::Header::new(name.as_bytes().to_vec(), size);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    ar_builder.append(&header, data)?;

    Ok(())
}

/// A builder for a `.deb` package file.
pub struct DebBuilder {
    logger: slog::Logger,
    control: BinaryPackageControlFile,
    control_members: BTreeMap<String, Vec<u8>>,
    data_producers: Vec<Box<dyn DataProducer>>,
    conffile_producers: Vec<Box<dyn DataProducer>>,
    tar_options: TarOptions,
    file_checksum: ChecksumType,
    package_checksum: ChecksumType,
    mtime: Option<u64>,
    signer: Option<(PgpSigner, PackageSignatureMethod)>,
}

impl DebBuilder {
    /// Construct a new instance using a control file.
    pub fn new(logger: &slog::Logger, control: BinaryPackageControlFile) -> Self {
        Self {
            logger: logger.clone(),
            control,
            control_members: BTreeMap::new(),
            data_producers: vec![],
            conffile_producers: vec![],
            tar_options: TarOptions::default(),
            file_checksum: ChecksumType::Md5,
            package_checksum: ChecksumType::Sha256,
            mtime: None,
            signer: None,
        }
    }

    /// Construct an instance from a directory holding a `control` file.
    ///
    /// Every other regular file in the directory becomes a control archive
    /// member, e.g. maintainer scripts.
    pub fn from_control_directory(logger: &slog::Logger, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let mut entries = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        let mut control = None;
        let mut members = vec![];

        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if path.is_dir() {
                warn!(logger, "ignoring directory in control directory"; "path" => %path.display());
                continue;
            }

            let data = std::fs::read(&path)?;

            if name == "control" {
                control = Some(BinaryPackageControlFile::from_reader(Cursor::new(data))?);
            } else {
                members.push((name, data));
            }
        }

        let control = control.ok_or_else(|| DebianError::ControlFileNotFound(dir.to_path_buf()))?;

        Ok(members
            .into_iter()
            .fold(Self::new(logger, control), |builder, (name, data)| {
                builder.add_control_member(name, data)
            }))
    }

    /// The control file of the package.
    pub fn control(&self) -> &BinaryPackageControlFile {
        &self.control
    }

    /// Set the tar settings of the inner archives.
    pub fn set_tar_options(mut self, options: TarOptions) -> Self {
        self.tar_options = options;
        self
    }

    /// Set the checksum used by the file checksum listing.
    pub fn set_file_checksum(mut self, checksum: ChecksumType) -> Self {
        self.file_checksum = checksum;
        self
    }

    /// Set the checksum reported for the package as a whole.
    pub fn set_package_checksum(mut self, checksum: ChecksumType) -> Self {
        self.package_checksum = checksum;
        self
    }

    /// Set the modified time to use on archive members.
    ///
    /// If set, all archive members use the specified time, in seconds since the
    /// UNIX epoch, helping to make archive content deterministic. Otherwise
    /// entries keep their own times and the current time is used for the others.
    pub fn set_mtime(mut self, mtime: Option<u64>) -> Self {
        self.mtime = mtime;
        self
    }

    /// Sign the package.
    pub fn set_signer(mut self, signer: PgpSigner, method: PackageSignatureMethod) -> Self {
        self.signer = Some((signer, method));
        self
    }

    /// Add a file to the control archive.
    ///
    /// Scripts (content starting with `#!`) have their line endings
    /// normalized to LF.
    pub fn add_control_member(mut self, name: impl ToString, data: impl Into<Vec<u8>>) -> Self {
        let mut data = data.into();

        if data.starts_with(b"#!") {
            data = normalize_line_endings(&data);
        }

        self.control_members.insert(name.to_string(), data);
        self
    }

    /// Register a producer of package content.
    pub fn add_data_producer(mut self, producer: impl DataProducer + 'static) -> Self {
        self.data_producers.push(Box::new(producer));
        self
    }

    /// Register a producer of configuration files.
    ///
    /// Regular files emitted by these producers are installed like any other
    /// content and also listed in `conffiles`.
    pub fn add_conffile_producer(mut self, producer: impl DataProducer + 'static) -> Self {
        self.conffile_producers.push(Box::new(producer));
        self
    }

    fn build_time(&self) -> u64 {
        self.mtime.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default()
        })
    }

    /// Write `.deb` file content to a writer.
    ///
    /// The control file is validated before anything is written. Failures are
    /// reported as [DebianError::Build] and leave `writer` with partial,
    /// invalid content.
    pub fn write<W: Write>(&self, writer: W) -> Result<BuildSummary> {
        let invalid = self.control.invalid_fields();
        if !invalid.is_empty() {
            return Err(DebianError::build(
                format!(
                    "control file is invalid; missing or empty mandatory fields: {}",
                    invalid.iter().cloned().collect::<Vec<_>>().join(", ")
                ),
                Some(DebianError::ControlInvalid(invalid)),
            ));
        }

        self.write_package(writer).map_err(|e| match e {
            DebianError::Build { .. } => e,
            e => DebianError::build("could not create deb package", Some(e)),
        })
    }

    fn write_data_archive(&self, mtime: u64) -> Result<(File, DataSummary)> {
        info!(self.logger, "building data archive");

        let encoder = self
            .tar_options
            .compression
            .compress(BufWriter::new(tempfile::tempfile()?))?;

        let mut tar = DebTarWriter::new(&self.logger, encoder, self.tar_options, mtime, self.mtime);
        tar.append_root()?;

        let mut consumer = DataArchiveConsumer {
            logger: &self.logger,
            tar,
            checksum: self.file_checksum,
            seen: HashSet::new(),
            files: vec![],
            conffiles: vec![],
            record_conffiles: false,
            data_size: 0,
        };

        for producer in &self.data_producers {
            producer.produce(&self.logger, &mut consumer)?;
        }

        info!(self.logger, "adding conffiles");
        consumer.record_conffiles = true;
        for producer in &self.conffile_producers {
            producer.produce(&self.logger, &mut consumer)?;
        }

        let summary = DataSummary {
            files: consumer.files,
            conffiles: consumer.conffiles,
            data_size: consumer.data_size,
        };

        let file = consumer.tar.into_inner()?.finish()?.into_inner()?;

        Ok((file, summary))
    }

    fn write_control_archive(
        &self,
        mtime: u64,
        control: &BinaryPackageControlFile,
        data: &DataSummary,
    ) -> Result<(File, Vec<String>)> {
        info!(self.logger, "building control archive");

        let mut members = self.control_members.clone();

        let conffiles = if let Some(user) = members.get(CONFFILES) {
            String::from_utf8_lossy(user)
                .lines()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
        } else {
            if !data.conffiles.is_empty() {
                let listing = data
                    .conffiles
                    .iter()
                    .map(|path| format!("{}\n", path))
                    .collect::<String>();
                members.insert(CONFFILES.to_string(), listing.into_bytes());
            }

            data.conffiles.clone()
        };

        let listing = data
            .files
            .iter()
            .map(|record| format!("{}  {}\n", record.digest.digest_hex(), record.path))
            .collect::<String>();
        members.insert(
            self.file_checksum.listing_name().to_string(),
            listing.into_bytes(),
        );

        let mut control_data = vec![];
        control.write(&mut control_data)?;
        members.insert("control".to_string(), control_data);

        let encoder = self
            .tar_options
            .compression
            .compress(BufWriter::new(tempfile::tempfile()?))?;
        let mut tar = DebTarWriter::new(&self.logger, encoder, self.tar_options, mtime, Some(mtime));
        tar.append_root()?;

        for (name, data) in &members {
            let mut entry = PackageEntry::file(name, data.len() as u64);
            entry.mode = if MAINTAINER_SCRIPTS.contains(&name.as_str()) {
                0o755
            } else {
                0o644
            };

            debug!(self.logger, "adding control member"; "name" => name, "size" => data.len());
            tar.append_data(&entry, data)?;
        }

        let file = tar.into_inner()?.finish()?.into_inner()?;

        Ok((file, conffiles))
    }

    fn write_package<W: Write>(&self, writer: W) -> Result<BuildSummary> {
        let mtime = self.build_time();

        let (mut data_file, data) = self.write_data_archive(mtime)?;

        let mut control = self.control.clone();
        // Whole KiB, truncated.
        control.set_installed_size_bytes(data.data_size);

        let (mut control_file, conffiles) = self.write_control_archive(mtime, &control, &data)?;

        let extension = self.tar_options.compression.extension();
        let control_size = rewind(&mut control_file)?;
        let data_size = rewind(&mut data_file)?;

        let signature = match &self.signer {
            Some((signer, method)) => {
                info!(self.logger, "signing package"; "role" => method.role());
                Some((
                    method.member_name(),
                    self.package_signature(
                        signer,
                        method,
                        mtime,
                        &mut control_file,
                        &mut data_file,
                    )?,
                ))
            }
            None => None,
        };

        let mut digesting = DigestingWriter::new(writer);
        {
            let mut ar_builder = ar::Builder::new(&mut digesting);

            append_member(
                &mut ar_builder,
                "debian-binary",
                DEBIAN_BINARY.len() as u64,
                mtime,
                DEBIAN_BINARY,
            )?;
            append_member(
                &mut ar_builder,
                &format!("control.tar{}", extension),
                control_size,
                mtime,
                &mut control_file,
            )?;
            append_member(
                &mut ar_builder,
                &format!("data.tar{}", extension),
                data_size,
                mtime,
                &mut data_file,
            )?;

            if let Some((name, signature)) = &signature {
                append_member(
                    &mut ar_builder,
                    name,
                    signature.len() as u64,
                    mtime,
                    &signature[..],
                )?;
            }
        }
        digesting.flush()?;

        let (_, package_digests, package_size) = digesting.finish();

        info!(self.logger, "package written"; "size" => package_size);

        Ok(BuildSummary {
            control,
            data_size: data.data_size,
            files: data.files,
            conffiles,
            package_size,
            package_digest: package_digests
                .digest_from_checksum(self.package_checksum)
                .clone(),
            package_digests,
        })
    }

    fn package_signature(
        &self,
        signer: &PgpSigner,
        method: &PackageSignatureMethod,
        mtime: u64,
        control_file: &mut File,
        data_file: &mut File,
    ) -> Result<Vec<u8>> {
        let signature = match method {
            PackageSignatureMethod::Debsig { .. } => signer.detached_signature(
                DEBIAN_BINARY
                    .chain(&mut *control_file)
                    .chain(&mut *data_file),
            )?,
            PackageSignatureMethod::DpkgSig { role } => {
                let extension = self.tar_options.compression.extension();
                let date = Utc
                    .timestamp_opt(mtime as i64, 0)
                    .single()
                    .ok_or_else(|| DebianError::InvalidTimestamp(mtime.to_string()))?;

                let mut manifest = format!(
                    "Version: 4\nSigner: \nDate: {}\nRole: {}\nFiles: \n",
                    date.format("%a %b %e %H:%M:%S %Y"),
                    role
                );

                let mut member_line = |name: &str, digests: &MultiContentDigest, size: u64| {
                    manifest.push_str(&format!(
                        "\t{} {} {} {}\n",
                        digests.md5.digest_hex(),
                        digests.sha1.digest_hex(),
                        size,
                        name
                    ));
                };

                let mut binary = DigestingWriter::new(std::io::sink());
                binary.write_all(DEBIAN_BINARY)?;
                let (_, digests, size) = binary.finish();
                member_line("debian-binary", &digests, size);

                let size = rewind(control_file)?;
                member_line(
                    &format!("control.tar{}", extension),
                    &staged_digests(control_file)?,
                    size,
                );

                let size = rewind(data_file)?;
                member_line(
                    &format!("data.tar{}", extension),
                    &staged_digests(data_file)?,
                    size,
                );

                signer.clear_sign(Cursor::new(manifest.into_bytes()), Vec::new())?
            }
        };

        control_file.seek(SeekFrom::Start(0))?;
        data_file.seek(SeekFrom::Start(0))?;

        Ok(signature)
    }
}

struct DataSummary {
    files: Vec<DigestRecord>,
    conffiles: Vec<String>,
    data_size: u64,
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            io::Compression,
            mapping::{PermMapper, PrefixMapper},
            producers::{
                test_logger, DirectoryProducer, FileProducer, LinkProducer, MissingSourcePolicy,
                PathTemplateProducer, ProducerOptions,
            },
            signing::{test_key, SigningKey, DEFAULT_DIGEST},
        },
        indoc::indoc,
        pgp::Deserializable,
        std::path::PathBuf,
    };

    const CONTROL: &str = indoc! {"
        Package: test
        Version: 1.0.1
        Section: misc
        Priority: optional
        Architecture: all
        Maintainer: Packager <packager@example.com>
        Description: test package
         This package is used for testing.
    "};

    fn control() -> Result<BinaryPackageControlFile> {
        BinaryPackageControlFile::from_str(CONTROL)
    }

    struct Member {
        name: String,
        data: Vec<u8>,
    }

    fn members(data: &[u8]) -> Result<Vec<Member>> {
        let mut archive = ar::Archive::new(Cursor::new(data));

        let mut res = vec![];
        while let Some(entry) = archive.next_entry() {
            let mut entry = entry?;
            let name = String::from_utf8_lossy(entry.header().identifier()).to_string();
            let mut data = vec![];
            entry.read_to_end(&mut data)?;
            res.push(Member { name, data });
        }

        Ok(res)
    }

    /// (path, mode, entry type, content) of every tar entry.
    fn tar_entries(
        compression: Compression,
        data: &[u8],
    ) -> Result<Vec<(String, u32, tar::EntryType, Vec<u8>)>> {
        let mut archive = tar::Archive::new(compression.decompress(Cursor::new(data))?);

        let mut res = vec![];
        for entry in archive.entries()? {
            let mut entry = entry?;
            let mut content = vec![];
            entry.read_to_end(&mut content)?;

            res.push((
                entry.path()?.to_string_lossy().to_string(),
                entry.header().mode()?,
                entry.header().entry_type(),
                content,
            ));
        }

        Ok(res)
    }

    fn file_mapper() -> PermMapper {
        PermMapper {
            file_mode: Some(0o755),
            ..Default::default()
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        source: PathBuf,
    }

    fn fixture() -> Result<Fixture> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("foo");
        std::fs::write(&source, b"0123456789")?;

        Ok(Fixture { _dir: dir, source })
    }

    #[test]
    fn single_file_package() -> Result<()> {
        let fixture = fixture()?;

        let builder = DebBuilder::new(&test_logger(), control()?)
            .set_mtime(Some(1600000000))
            .add_data_producer(
                FileProducer::new(
                    &fixture.source,
                    ProducerOptions::default().with_mapper(file_mapper()),
                )
                .with_destination("/usr/bin/foo"),
            );

        let mut buffer = vec![];
        let summary = builder.write(&mut buffer)?;

        let members = members(&buffer)?;
        assert_eq!(
            members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            vec!["debian-binary", "control.tar.gz", "data.tar.gz"]
        );
        assert_eq!(members[0].data, b"2.0\n");

        let data = tar_entries(Compression::Gzip, &members[2].data)?;
        assert_eq!(
            data.iter().map(|e| e.0.as_str()).collect::<Vec<_>>(),
            vec!["./", "./usr/", "./usr/bin/", "./usr/bin/foo"]
        );
        assert_eq!(data[3].1, 0o755);
        assert_eq!(data[3].2, tar::EntryType::Regular);
        assert_eq!(data[3].3, b"0123456789");

        let md5 = ContentDigest::compute(ChecksumType::Md5, b"0123456789");
        let listing = format!("{}  usr/bin/foo\n", md5.digest_hex());

        let control_entries = tar_entries(Compression::Gzip, &members[1].data)?;
        assert_eq!(
            control_entries
                .iter()
                .map(|e| e.0.as_str())
                .collect::<Vec<_>>(),
            vec!["./", "./control", "./md5sums"]
        );
        assert_eq!(control_entries[2].3, listing.as_bytes());
        assert!(String::from_utf8_lossy(&control_entries[1].3).contains("Installed-Size: 0\n"));

        assert_eq!(summary.data_size, 10);
        assert_eq!(summary.files.len(), 1);
        assert_eq!(summary.files[0].digest, md5);
        assert_eq!(summary.package_size, buffer.len() as u64);
        assert_eq!(
            summary.package_digest,
            ContentDigest::compute(ChecksumType::Sha256, &buffer)
        );

        let mut again = vec![];
        builder.write(&mut again)?;
        assert_eq!(buffer, again);

        Ok(())
    }

    #[test]
    fn prefixed_entries_get_parents() -> Result<()> {
        let fixture = fixture()?;

        let builder = DebBuilder::new(&test_logger(), control()?).add_data_producer(
            FileProducer::new(
                &fixture.source,
                ProducerOptions::default().with_mapper(PrefixMapper::new(0, "/opt/app/")),
            )
            .with_destination("bin/foo"),
        );

        let mut buffer = vec![];
        let summary = builder.write(&mut buffer)?;

        let members = members(&buffer)?;
        let data = tar_entries(Compression::Gzip, &members[2].data)?;
        assert_eq!(
            data.iter().map(|e| e.0.as_str()).collect::<Vec<_>>(),
            vec!["./", "./opt/", "./opt/app/", "./opt/app/bin/", "./opt/app/bin/foo"]
        );
        assert_eq!(
            summary
                .files
                .iter()
                .map(|r| r.path.as_str())
                .collect::<Vec<_>>(),
            vec!["opt/app/bin/foo"]
        );

        let control_entries = tar_entries(Compression::Gzip, &members[1].data)?;
        assert!(String::from_utf8_lossy(&control_entries[2].3).ends_with("  opt/app/bin/foo\n"));

        Ok(())
    }

    #[test]
    fn invalid_control_aborts() -> Result<()> {
        let mut control = control()?;
        control.remove("Maintainer");
        assert!(!control.is_valid());
        assert!(control.invalid_fields().contains("Maintainer"));

        let mut buffer = vec![];
        let res = DebBuilder::new(&test_logger(), control).write(&mut buffer);

        match res {
            Err(e @ DebianError::Build { .. }) => {
                assert!(e.to_string().contains("Maintainer"));
                assert!(matches!(e.root_cause(), DebianError::ControlInvalid(_)));
            }
            _ => panic!("expected build error"),
        }
        assert!(buffer.is_empty());

        Ok(())
    }

    #[test]
    fn missing_sources() -> Result<()> {
        let fixture = fixture()?;
        let missing = fixture.source.with_file_name("missing");

        let builder = DebBuilder::new(&test_logger(), control()?)
            .add_data_producer(FileProducer::new(&fixture.source, ProducerOptions::default()))
            .add_data_producer(FileProducer::new(
                &missing,
                ProducerOptions::default().with_missing_source(MissingSourcePolicy::Ignore),
            ));
        let summary = builder.write(std::io::sink())?;
        assert_eq!(
            summary
                .files
                .iter()
                .map(|r| r.path.as_str())
                .collect::<Vec<_>>(),
            vec!["foo"]
        );

        let builder = DebBuilder::new(&test_logger(), control()?)
            .add_data_producer(FileProducer::new(&missing, ProducerOptions::default()));
        let err = builder.write(std::io::sink());
        assert!(matches!(
            err.as_ref().map_err(|e| e.root_cause()),
            Err(DebianError::SourceNotFound(_))
        ));
        assert!(matches!(err, Err(DebianError::Build { .. })));

        Ok(())
    }

    #[test]
    fn duplicates_first_wins() -> Result<()> {
        let fixture = fixture()?;
        let other = fixture.source.with_file_name("other");
        std::fs::write(&other, b"other")?;

        let builder = DebBuilder::new(&test_logger(), control()?)
            .set_tar_options(TarOptions {
                compression: Compression::None,
                ..Default::default()
            })
            .add_data_producer(PathTemplateProducer::new(
                ["usr/bin"],
                ProducerOptions::default(),
            ))
            .add_data_producer(
                FileProducer::new(&fixture.source, ProducerOptions::default())
                    .with_destination("usr/bin/tool"),
            )
            .add_data_producer(
                FileProducer::new(&other, ProducerOptions::default())
                    .with_destination("usr/bin/tool"),
            )
            .add_data_producer(LinkProducer::symlink(
                "usr/bin/tool",
                "other",
                ProducerOptions::default(),
            ));

        let mut buffer = vec![];
        let summary = builder.write(&mut buffer)?;
        assert_eq!(summary.files.len(), 1);
        assert_eq!(summary.data_size, 10);

        let members = members(&buffer)?;
        assert_eq!(members[2].name, "data.tar");

        let data = tar_entries(Compression::None, &members[2].data)?;
        assert_eq!(
            data.iter().map(|e| e.0.as_str()).collect::<Vec<_>>(),
            vec!["./", "./usr/", "./usr/bin/", "./usr/bin/tool"]
        );
        assert_eq!(data[3].3, b"0123456789");

        Ok(())
    }

    #[test]
    fn control_members_and_conffiles() -> Result<()> {
        let td = tempfile::tempdir()?;
        let etc = td.path().join("etc");
        std::fs::create_dir(&etc)?;
        std::fs::write(etc.join("tool.conf"), b"key=value\n")?;

        let builder = DebBuilder::new(&test_logger(), control()?)
            .set_file_checksum(ChecksumType::Sha256)
            .add_control_member("postinst", b"#!/bin/sh\r\necho hi\r\n".to_vec())
            .add_control_member("templates", b"Template: x\r\n".to_vec())
            .add_conffile_producer(DirectoryProducer::new(
                td.path(),
                ProducerOptions::default(),
            ));

        let mut buffer = vec![];
        let summary = builder.write(&mut buffer)?;
        assert_eq!(summary.conffiles, vec!["/etc/tool.conf".to_string()]);

        let members = members(&buffer)?;
        let control_entries = tar_entries(Compression::Gzip, &members[1].data)?;
        let names = control_entries
            .iter()
            .map(|e| e.0.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "./",
                "./conffiles",
                "./control",
                "./postinst",
                "./sha256sums",
                "./templates"
            ]
        );

        assert_eq!(control_entries[1].1, 0o644);
        assert_eq!(control_entries[1].3, b"/etc/tool.conf\n");
        assert_eq!(control_entries[3].1, 0o755);
        assert_eq!(control_entries[3].3, b"#!/bin/sh\necho hi\n");
        assert_eq!(control_entries[5].1, 0o644);
        assert_eq!(control_entries[5].3, b"Template: x\r\n");

        let data = tar_entries(Compression::Gzip, &members[2].data)?;
        assert_eq!(
            data.iter().map(|e| e.0.as_str()).collect::<Vec<_>>(),
            vec!["./", "./etc/", "./etc/tool.conf"]
        );

        let builder = DebBuilder::new(&test_logger(), control()?)
            .add_control_member("conffiles", b"/etc/other.conf\n".to_vec())
            .add_conffile_producer(DirectoryProducer::new(
                td.path(),
                ProducerOptions::default(),
            ));
        let summary = builder.write(std::io::sink())?;
        assert_eq!(summary.conffiles, vec!["/etc/other.conf".to_string()]);

        Ok(())
    }

    #[test]
    fn control_directory() -> Result<()> {
        let td = tempfile::tempdir()?;
        std::fs::write(td.path().join("control"), CONTROL)?;
        std::fs::write(td.path().join("prerm"), b"#!/bin/sh\rexit 0\r")?;
        std::fs::create_dir(td.path().join("nested"))?;

        let builder = DebBuilder::from_control_directory(&test_logger(), td.path())?;
        assert_eq!(builder.control().package()?, "test");
        assert_eq!(
            builder.control_members.keys().collect::<Vec<_>>(),
            vec!["prerm"]
        );
        assert_eq!(builder.control_members["prerm"], b"#!/bin/sh\nexit 0\n");

        let empty = tempfile::tempdir()?;
        assert!(matches!(
            DebBuilder::from_control_directory(&test_logger(), empty.path()),
            Err(DebianError::ControlFileNotFound(_))
        ));

        Ok(())
    }

    #[test]
    fn compression_and_long_names() -> Result<()> {
        let fixture = fixture()?;
        let long = format!("usr/share/{}/foo", "x".repeat(120));

        let builder = DebBuilder::new(&test_logger(), control()?)
            .set_tar_options(TarOptions::from_selectors("xz", "posix", "")?)
            .add_data_producer(
                FileProducer::new(&fixture.source, ProducerOptions::default())
                    .with_destination(&long),
            );

        let mut buffer = vec![];
        builder.write(&mut buffer)?;

        let members = members(&buffer)?;
        assert_eq!(members[1].name, "control.tar.xz");
        assert_eq!(members[2].name, "data.tar.xz");

        let data = tar_entries(Compression::Xz, &members[2].data)?;
        assert_eq!(data.last().map(|e| e.0.clone()), Some(format!("./{}", long)));

        let builder = DebBuilder::new(&test_logger(), control()?)
            .set_tar_options(TarOptions::from_selectors("", "error", "")?)
            .add_data_producer(
                FileProducer::new(&fixture.source, ProducerOptions::default())
                    .with_destination(&long),
            );
        let err = builder.write(std::io::sink());
        assert!(matches!(
            err.as_ref().map_err(|e| e.root_cause()),
            Err(DebianError::TarLongName(_))
        ));

        Ok(())
    }

    #[test]
    fn signed_packages() -> Result<()> {
        let (secret, public) = test_key("")?;
        let fixture = fixture()?;

        let build = |method: PackageSignatureMethod| -> Result<Vec<u8>> {
            let signer =
                PgpSigner::new(SigningKey::Primary(secret.clone()), "", DEFAULT_DIGEST)?;

            let mut buffer = vec![];
            DebBuilder::new(&test_logger(), control()?)
                .set_mtime(Some(1600000000))
                .set_signer(signer, method)
                .add_data_producer(FileProducer::new(
                    &fixture.source,
                    ProducerOptions::default(),
                ))
                .write(&mut buffer)?;

            Ok(buffer)
        };

        let buffer = build(PackageSignatureMethod::default())?;
        let origin = members(&buffer)?;
        assert_eq!(origin.len(), 4);
        assert_eq!(origin[3].name, "_gpgorigin");

        let signed = [
            origin[0].data.clone(),
            origin[1].data.clone(),
            origin[2].data.clone(),
        ]
        .concat();
        let (signature, _) =
            pgp::StandaloneSignature::from_armor_single(Cursor::new(&origin[3].data))?;
        signature.verify(&public, &signed)?;

        let buffer = build(PackageSignatureMethod::DpkgSig {
            role: "builder".into(),
        })?;
        let dpkg_sig = members(&buffer)?;
        assert_eq!(dpkg_sig[3].name, "_gpgbuilder");

        let manifest = String::from_utf8_lossy(&dpkg_sig[3].data).to_string();
        assert!(manifest.starts_with("-----BEGIN PGP SIGNED MESSAGE-----\n"));
        assert!(manifest.contains("Version: 4\n"));
        assert!(manifest.contains("Date: Sun Sep 13 12:26:40 2020\n"));
        assert!(manifest.contains("Role: builder\n"));

        let control_digests = {
            let mut w = DigestingWriter::new(std::io::sink());
            w.write_all(&dpkg_sig[1].data)?;
            w.finish()
        };
        assert!(manifest.contains(&format!(
            "\t{} {} {} control.tar.gz\n",
            control_digests.1.md5.digest_hex(),
            control_digests.1.sha1.digest_hex(),
            control_digests.2
        )));

        Ok(())
    }

    #[test]
    fn signature_method_config() {
        assert_eq!(PackageSignatureMethod::default().member_name(), "_gpgorigin");
        assert_eq!(
            PackageSignatureMethod::DpkgSig {
                role: "maint".into()
            }
            .member_name(),
            "_gpgmaint"
        );
    }
}
