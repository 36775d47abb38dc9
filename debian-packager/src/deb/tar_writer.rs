// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Writing of tar archives for .deb packages. */

use {
    super::{BigNumberMode, LongFileMode, TarOptions},
    crate::{
        entry::{EntryType, PackageEntry},
        error::{DebianError, Result},
        paths::tar_path,
    },
    slog::warn,
    std::io::{Read, Write},
};

/// Size of the name and link name header fields.
const NAME_FIELD_LEN: usize = 100;

/// Size of the user and group name header fields.
const OWNER_FIELD_LEN: usize = 32;

/// Largest value of the 8 byte octal uid and gid fields.
const MAX_ID: u64 = 0o7777777;

/// Largest value of the 12 byte octal size and mtime fields.
const MAX_SIZE: u64 = 0o77777777777;

/// Format a pax extended header record.
///
/// The record length prefix counts the whole record, itself included.
fn pax_record(key: &str, value: &str) -> Vec<u8> {
    let rest = key.len() + value.len() + 3;

    let mut len = rest + 1;
    while len != rest + len.to_string().len() {
        len = rest + len.to_string().len();
    }

    format!("{} {}={}\n", len, key, value).into_bytes()
}

#[derive(Clone, Copy)]
enum NameField {
    Name,
    LinkName,
}

impl NameField {
    fn description(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::LinkName => "link name",
        }
    }

    fn gnu_type(&self) -> u8 {
        match self {
            Self::Name => b'L',
            Self::LinkName => b'K',
        }
    }

    fn pax_key(&self) -> &'static str {
        match self {
            Self::Name => "path",
            Self::LinkName => "linkpath",
        }
    }
}

fn copy_truncated(dest: &mut [u8], value: &[u8]) {
    let len = value.len().min(dest.len());
    dest[0..len].copy_from_slice(&value[0..len]);
}

/// A tar archive writer producing entries the way dpkg expects them.
///
/// Paths are written as `./<path>`, directories with a trailing `/`. Names and
/// numbers that do not fit their header fields are handled according to
/// [TarOptions].
pub struct DebTarWriter<W: Write> {
    builder: tar::Builder<W>,
    options: TarOptions,
    default_mtime: u64,
    fixed_mtime: Option<u64>,
    logger: slog::Logger,
}

impl<W: Write> DebTarWriter<W> {
    /// Construct a new instance.
    ///
    /// Entries use `fixed_mtime` when set, otherwise their own modification
    /// time or `default_mtime`.
    pub fn new(
        logger: &slog::Logger,
        writer: W,
        options: TarOptions,
        default_mtime: u64,
        fixed_mtime: Option<u64>,
    ) -> Self {
        Self {
            builder: tar::Builder::new(writer),
            options,
            default_mtime,
            fixed_mtime,
            logger: logger.clone(),
        }
    }

    fn new_header(&self) -> tar::Header {
        match self.options.long_file_mode {
            LongFileMode::Posix => tar::Header::new_ustar(),
            _ => tar::Header::new_gnu(),
        }
    }

    fn set_name_field(
        &mut self,
        header: &mut tar::Header,
        field: NameField,
        value: &str,
        pax: &mut Vec<u8>,
    ) -> Result<()> {
        let value_bytes = value.as_bytes();

        let dest = match field {
            NameField::Name => &mut header.as_old_mut().name,
            NameField::LinkName => &mut header.as_old_mut().linkname,
        };

        if value_bytes.len() <= NAME_FIELD_LEN {
            copy_truncated(dest, value_bytes);
            return Ok(());
        }

        match self.options.long_file_mode {
            LongFileMode::Error => {
                return Err(DebianError::TarLongName(value.to_string()));
            }
            LongFileMode::Truncate => {
                warn!(self.logger, "truncating long tar {}", field.description(); "value" => value);
            }
            LongFileMode::Gnu => {
                let mut long = tar::Header::new_gnu();
                let name = b"././@LongLink";
                long.as_old_mut().name[..name.len()].clone_from_slice(&name[..]);
                long.set_mode(0o644);
                long.set_uid(0);
                long.set_gid(0);
                long.set_mtime(0);
                long.set_size(value_bytes.len() as u64 + 1);
                long.set_entry_type(tar::EntryType::new(field.gnu_type()));
                long.set_cksum();

                let mut data = value_bytes.chain(std::io::repeat(0).take(1));
                self.builder.append(&long, &mut data)?;
            }
            LongFileMode::Posix => {
                pax.extend(pax_record(field.pax_key(), value));
            }
        }

        copy_truncated(dest, value_bytes);

        Ok(())
    }

    fn check_number(
        &self,
        field: &'static str,
        value: u64,
        max: u64,
        pax: &mut Vec<u8>,
    ) -> Result<u64> {
        if value <= max {
            return Ok(value);
        }

        match self.options.big_number_mode {
            BigNumberMode::Error => Err(DebianError::TarBigNumber(field.to_string(), value)),
            BigNumberMode::Star => Ok(value),
            BigNumberMode::Posix => {
                pax.extend(pax_record(field, &value.to_string()));
                Ok(0)
            }
        }
    }

    fn check_owner(name: &str, field: &str) -> Result<()> {
        if name.len() > OWNER_FIELD_LEN {
            Err(DebianError::TarFieldTooLong(
                format!("{} {}", field, name),
                OWNER_FIELD_LEN,
            ))
        } else {
            Ok(())
        }
    }

    /// Append an entry with its content.
    ///
    /// `content` must yield exactly `entry.size` bytes for regular files and is
    /// not read for other entry types.
    pub fn append_entry(&mut self, entry: &PackageEntry, content: &mut dyn Read) -> Result<()> {
        Self::check_owner(&entry.user_name, "user name")?;
        Self::check_owner(&entry.group_name, "group name")?;

        let mut header = self.new_header();
        let mut pax = vec![];

        let path = tar_path(entry.path(), entry.is_dir());
        self.set_name_field(&mut header, NameField::Name, &path, &mut pax)?;

        let (entry_type, size) = match entry.entry_type {
            EntryType::File => (tar::EntryType::Regular, entry.size),
            EntryType::Directory => (tar::EntryType::Directory, 0),
            EntryType::Symlink => (tar::EntryType::Symlink, 0),
            EntryType::HardLink => (tar::EntryType::Link, 0),
        };
        header.set_entry_type(entry_type);

        match (entry.entry_type, &entry.link_target) {
            (EntryType::Symlink, Some(target)) => {
                self.set_name_field(&mut header, NameField::LinkName, target, &mut pax)?;
            }
            (EntryType::HardLink, Some(target)) => {
                let target = tar_path(target, false);
                self.set_name_field(&mut header, NameField::LinkName, &target, &mut pax)?;
            }
            _ => {}
        }

        let mtime = self
            .fixed_mtime
            .or(entry.mtime)
            .unwrap_or(self.default_mtime);

        header.set_mode(entry.mode);
        header.set_uid(self.check_number("uid", entry.uid, MAX_ID, &mut pax)?);
        header.set_gid(self.check_number("gid", entry.gid, MAX_ID, &mut pax)?);
        header.set_size(self.check_number("size", size, MAX_SIZE, &mut pax)?);
        header.set_mtime(self.check_number("mtime", mtime, MAX_SIZE, &mut pax)?);
        header.set_username(&entry.user_name)?;
        header.set_groupname(&entry.group_name)?;

        if !pax.is_empty() {
            let mut pax_header = tar::Header::new_ustar();
            let name = format!("./PaxHeaders/{}", entry.path().rsplit('/').next().unwrap_or_default());
            copy_truncated(&mut pax_header.as_old_mut().name, name.as_bytes());
            pax_header.set_mode(0o644);
            pax_header.set_uid(0);
            pax_header.set_gid(0);
            pax_header.set_mtime(0);
            pax_header.set_size(pax.len() as u64);
            pax_header.set_entry_type(tar::EntryType::XHeader);
            pax_header.set_cksum();

            self.builder.append(&pax_header, &*pax)?;
        }

        header.set_cksum();

        if entry.entry_type == EntryType::File {
            self.builder.append(&header, content)?;
        } else {
            self.builder.append(&header, std::io::empty())?;
        }

        Ok(())
    }

    /// Append a regular file entry with in-memory content.
    pub fn append_data(&mut self, entry: &PackageEntry, data: &[u8]) -> Result<()> {
        let mut entry = entry.clone();
        entry.size = data.len() as u64;

        self.append_entry(&entry, &mut std::io::Cursor::new(data))
    }

    /// Append the `./` root directory entry.
    pub fn append_root(&mut self) -> Result<()> {
        self.append_entry(&PackageEntry::directory(""), &mut std::io::empty())
    }

    /// Finish the archive, returning the inner writer.
    pub fn into_inner(self) -> Result<W> {
        Ok(self.builder.into_inner()?)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::io::Compression, std::io::Cursor};

    fn logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn writer(options: TarOptions) -> DebTarWriter<Vec<u8>> {
        DebTarWriter::new(&logger(), Vec::new(), options, 1000, None)
    }

    fn entries(data: Vec<u8>) -> Result<Vec<(String, tar::EntryType, u64, Vec<u8>)>> {
        let mut archive = tar::Archive::new(Cursor::new(data));

        let mut res = vec![];
        for entry in archive.entries()? {
            let mut entry = entry?;
            let mut content = vec![];
            entry.read_to_end(&mut content)?;

            res.push((
                entry.path()?.to_string_lossy().to_string(),
                entry.header().entry_type(),
                entry.header().mtime()?,
                content,
            ));
        }

        Ok(res)
    }

    #[test]
    fn pax_record_lengths() {
        assert_eq!(pax_record("path", "a"), b"9 path=a\n");
        assert_eq!(pax_record("uid", "4294967296"), b"18 uid=4294967296\n");

        let long = "x".repeat(95);
        let record = pax_record("path", &long);
        assert_eq!(record.len(), 105);
        assert!(record.starts_with(b"105 path="));
    }

    #[test]
    fn paths_and_types() -> Result<()> {
        let mut w = writer(TarOptions::default());
        w.append_root()?;
        w.append_entry(&PackageEntry::directory("usr/bin"), &mut std::io::empty())?;
        w.append_data(&PackageEntry::file("usr/bin/foo", 0), b"foo")?;
        w.append_entry(&PackageEntry::symlink("usr/bin/bar", "foo"), &mut std::io::empty())?;
        w.append_entry(
            &PackageEntry::hard_link("usr/bin/baz", "usr/bin/foo"),
            &mut std::io::empty(),
        )?;

        let data = w.into_inner()?;
        let mut archive = tar::Archive::new(Cursor::new(data.clone()));
        let names = archive
            .entries()?
            .map(|e| {
                let e = e?;
                let raw = e.header().as_old().name.to_vec();
                let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
                Ok(String::from_utf8_lossy(&raw[0..end]).to_string())
            })
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(
            names,
            vec!["./", "./usr/bin/", "./usr/bin/foo", "./usr/bin/bar", "./usr/bin/baz"]
        );

        let entries = entries(data)?;
        assert_eq!(entries[2].1, tar::EntryType::Regular);
        assert_eq!(entries[2].2, 1000);
        assert_eq!(entries[2].3, b"foo");
        assert_eq!(entries[3].1, tar::EntryType::Symlink);
        assert_eq!(entries[4].1, tar::EntryType::Link);

        let mut archive = tar::Archive::new(Cursor::new(w_link_names()?));
        let links = archive
            .entries()?
            .map(|e| {
                Ok(e?
                    .link_name()?
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default())
            })
            .collect::<Result<Vec<_>>>()?;
        assert_eq!(links, vec!["foo".to_string(), "./usr/bin/foo".to_string()]);

        Ok(())
    }

    fn w_link_names() -> Result<Vec<u8>> {
        let mut w = writer(TarOptions::default());
        w.append_entry(&PackageEntry::symlink("usr/bin/bar", "foo"), &mut std::io::empty())?;
        w.append_entry(
            &PackageEntry::hard_link("usr/bin/baz", "usr/bin/foo"),
            &mut std::io::empty(),
        )?;
        w.into_inner()
    }

    fn long_path() -> String {
        format!("usr/share/{}/file", "d".repeat(120))
    }

    #[test]
    fn long_names() -> Result<()> {
        let path = long_path();

        for mode in [LongFileMode::Gnu, LongFileMode::Posix] {
            let mut w = writer(TarOptions {
                long_file_mode: mode,
                ..Default::default()
            });
            w.append_data(&PackageEntry::file(&path, 0), b"x")?;

            let entries = entries(w.into_inner()?)?;
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].0, format!("./{}", path));
            assert_eq!(entries[0].3, b"x");
        }

        let mut w = writer(TarOptions {
            long_file_mode: LongFileMode::Truncate,
            ..Default::default()
        });
        w.append_data(&PackageEntry::file(&path, 0), b"x")?;
        let entries = entries(w.into_inner()?)?;
        assert_eq!(entries[0].0.len(), 100);

        let mut w = writer(TarOptions {
            long_file_mode: LongFileMode::Error,
            ..Default::default()
        });
        assert!(matches!(
            w.append_data(&PackageEntry::file(&path, 0), b"x"),
            Err(DebianError::TarLongName(_))
        ));

        Ok(())
    }

    #[test]
    fn big_numbers() -> Result<()> {
        let mut entry = PackageEntry::file("big", 0);
        entry.uid = 5_000_000;

        let mut w = writer(TarOptions {
            big_number_mode: BigNumberMode::Error,
            ..Default::default()
        });
        assert!(matches!(
            w.append_data(&entry, b""),
            Err(DebianError::TarBigNumber(_, 5_000_000))
        ));

        for mode in [BigNumberMode::Star, BigNumberMode::Posix] {
            let mut w = writer(TarOptions {
                big_number_mode: mode,
                ..Default::default()
            });
            w.append_data(&entry, b"")?;

            let mut archive = tar::Archive::new(Cursor::new(w.into_inner()?));
            let mut count = 0;
            for e in archive.entries()? {
                let mut e = e?;
                count += 1;

                if mode == BigNumberMode::Star {
                    assert_eq!(e.header().uid()?, 5_000_000);
                } else {
                    let uid = e
                        .pax_extensions()?
                        .map(|exts| {
                            exts.filter_map(|ext| ext.ok())
                                .find(|ext| ext.key() == Ok("uid"))
                                .and_then(|ext| ext.value().ok().map(|v| v.to_string()))
                        })
                        .flatten();
                    assert_eq!(uid.as_deref(), Some("5000000"));
                }
            }
            assert_eq!(count, 1);
        }

        Ok(())
    }

    #[test]
    fn owner_names() -> Result<()> {
        let mut entry = PackageEntry::file("f", 0);
        entry.user_name = "u".repeat(33);

        let mut w = writer(TarOptions::default());
        assert!(matches!(
            w.append_data(&entry, b""),
            Err(DebianError::TarFieldTooLong(_, 32))
        ));

        Ok(())
    }

    #[test]
    fn fixed_mtime() -> Result<()> {
        let mut entry = PackageEntry::file("f", 0);
        entry.mtime = Some(5);

        let mut w = DebTarWriter::new(&logger(), Vec::new(), TarOptions::default(), 1000, None);
        w.append_data(&entry, b"")?;
        assert_eq!(entries(w.into_inner()?)?[0].2, 5);

        let mut w = DebTarWriter::new(&logger(), Vec::new(), TarOptions::default(), 1000, Some(7));
        w.append_data(&entry, b"")?;
        assert_eq!(entries(w.into_inner()?)?[0].2, 7);

        Ok(())
    }

    #[test]
    fn compressed_output() -> Result<()> {
        let encoder = Compression::Xz.compress(Vec::new())?;
        let mut w = DebTarWriter::new(&logger(), encoder, TarOptions::default(), 0, None);
        w.append_root()?;
        let data = w.into_inner()?.finish()?;

        let mut archive = tar::Archive::new(Compression::Xz.decompress(Cursor::new(data))?);
        assert_eq!(archive.entries()?.count(), 1);

        Ok(())
    }
}
