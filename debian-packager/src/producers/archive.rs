// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    super::{DataConsumer, DataProducer, ProducerOptions},
    crate::{
        entry::{EntryType, PackageEntry},
        error::Result,
        io::Compression,
    },
    slog::debug,
    std::{fs::File, io::BufReader, path::PathBuf},
};

/// Produces the entries of an existing tar archive.
///
/// The compression of the archive is detected from its file name. Regular
/// files, directories and links are re-emitted with their recorded metadata.
/// File content is streamed from the archive unchanged.
pub struct ArchiveProducer {
    archive: PathBuf,
    options: ProducerOptions,
}

impl ArchiveProducer {
    pub fn new(archive: impl Into<PathBuf>, options: ProducerOptions) -> Self {
        Self {
            archive: archive.into(),
            options,
        }
    }
}

/// Parse a numeric header field, reading a blank field as 0.
fn numeric_field(raw: &[u8], parse: impl FnOnce() -> std::io::Result<u64>) -> Result<u64> {
    if raw.iter().all(|b| *b == 0 || *b == b' ') {
        Ok(0)
    } else {
        Ok(parse()?)
    }
}

fn entry_from_header(
    path: &str,
    header: &tar::Header,
    link: Option<String>,
) -> Result<Option<PackageEntry>> {
    let mut entry = match header.entry_type() {
        tar::EntryType::Regular | tar::EntryType::Continuous => {
            PackageEntry::file(path, header.size()?)
        }
        tar::EntryType::Directory => PackageEntry::directory(path),
        tar::EntryType::Symlink => PackageEntry::symlink(path, link.unwrap_or_default()),
        tar::EntryType::Link => PackageEntry::hard_link(path, link.unwrap_or_default()),
        _ => return Ok(None),
    };

    let raw = header.as_old();
    entry.mode = numeric_field(&raw.mode, || header.mode().map(u64::from))? as u32 & 0o7777;
    entry.uid = numeric_field(&raw.uid, || header.uid())?;
    entry.gid = numeric_field(&raw.gid, || header.gid())?;
    entry.mtime = Some(numeric_field(&raw.mtime, || header.mtime())?);

    if let Ok(Some(name)) = header.username() {
        entry.user_name = name.to_string();
    }
    if let Ok(Some(name)) = header.groupname() {
        entry.group_name = name.to_string();
    }

    Ok(Some(entry))
}

impl DataProducer for ArchiveProducer {
    fn produce(&self, logger: &slog::Logger, consumer: &mut dyn DataConsumer) -> Result<()> {
        if !self.options.check_source(logger, &self.archive)? {
            return Ok(());
        }

        let compression = Compression::from_path(&self.archive);
        let fh = BufReader::new(File::open(&self.archive)?);
        let mut archive = tar::Archive::new(compression.decompress(fh)?);

        for entry in archive.entries()? {
            let mut entry = entry?;

            let path = entry.path()?.to_string_lossy().to_string();
            let link = entry
                .link_name()?
                .map(|p| p.to_string_lossy().to_string());

            let package_entry = match entry_from_header(&path, entry.header(), link)? {
                Some(e) if !e.path().is_empty() => e,
                Some(_) => continue,
                None => {
                    debug!(logger, "skipping unsupported archive entry"; "path" => &path);
                    continue;
                }
            };

            match package_entry.entry_type {
                EntryType::File => {
                    self.options.emit_file(consumer, package_entry, &mut entry)?;
                }
                _ => {
                    self.options.emit(consumer, package_entry)?;
                }
            }
        }

        Ok(())
    }
}
