// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Transformations of entry metadata.

A [Mapper] rewrites the path, ownership or permissions of a [PackageEntry]
before it is written. Mappers are pure and are composed with [MapperChain],
which applies them left to right.
*/

use {
    crate::{
        entry::{EntryType, PackageEntry},
        error::{DebianError, Result},
        paths::{join_path, strip_path},
    },
    once_cell::sync::Lazy,
    regex::Regex,
    serde::Deserialize,
    std::{collections::HashMap, io::BufRead},
};

/// Transforms entry metadata.
pub trait Mapper {
    /// Obtain the transformed entry.
    fn map(&self, entry: PackageEntry) -> PackageEntry;
}

/// A [Mapper] returning entries unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMapper;

impl Mapper for NullMapper {
    fn map(&self, entry: PackageEntry) -> PackageEntry {
        entry
    }
}

fn relocate(path: &str, strip: usize, prefix: &str) -> String {
    format!("{}/{}", prefix, strip_path(strip, path))
}

fn relocate_entry(entry: &mut PackageEntry, strip: usize, prefix: &str) {
    let path = relocate(entry.path(), strip, prefix);
    entry.set_path(path);

    // Hard link targets name other entries of the same archive, which move too.
    if entry.entry_type == EntryType::HardLink {
        if let Some(target) = entry.link_target.take() {
            entry.link_target = Some(crate::paths::normalize_path(&relocate(
                &target, strip, prefix,
            )));
        }
    }
}

/// A [Mapper] that strips leading path components and adds a prefix.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PrefixMapper {
    pub strip: usize,
    pub prefix: String,
}

impl PrefixMapper {
    pub fn new(strip: usize, prefix: impl ToString) -> Self {
        Self {
            strip,
            prefix: prefix.to_string(),
        }
    }
}

impl Mapper for PrefixMapper {
    fn map(&self, mut entry: PackageEntry) -> PackageEntry {
        relocate_entry(&mut entry, self.strip, &self.prefix);
        entry
    }
}

/// A [Mapper] applying fixed ownership and permissions.
///
/// Unset attributes are left untouched. The path is relocated like [PrefixMapper].
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PermMapper {
    pub uid: Option<u64>,
    pub gid: Option<u64>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub file_mode: Option<u32>,
    pub dir_mode: Option<u32>,
    pub strip: usize,
    pub prefix: Option<String>,
}

impl PermMapper {
    /// Parse an octal permission string like `0644`.
    ///
    /// An empty string means no override.
    pub fn parse_mode(mode: &str) -> Result<Option<u32>> {
        let mode = mode.trim();

        if mode.is_empty() {
            Ok(None)
        } else {
            Ok(Some(u32::from_str_radix(mode, 8)?))
        }
    }

    /// Set the owner from a symbolic `user:group` or `user` value.
    pub fn with_owner(mut self, owner: &str) -> Self {
        match owner.split_once(':') {
            Some((user, group)) => {
                if !user.is_empty() {
                    self.user = Some(user.to_string());
                }
                if !group.is_empty() {
                    self.group = Some(group.to_string());
                }
            }
            None => {
                if !owner.is_empty() {
                    self.user = Some(owner.to_string());
                }
            }
        }

        self
    }
}

impl Mapper for PermMapper {
    fn map(&self, mut entry: PackageEntry) -> PackageEntry {
        relocate_entry(
            &mut entry,
            self.strip,
            self.prefix.as_deref().unwrap_or_default(),
        );

        if let Some(uid) = self.uid {
            entry.uid = uid;
        }
        if let Some(gid) = self.gid {
            entry.gid = gid;
        }
        if let Some(user) = &self.user {
            entry.user_name = user.clone();
        }
        if let Some(group) = &self.group {
            entry.group_name = group.clone();
        }

        let mode = match entry.entry_type {
            EntryType::Directory => self.dir_mode,
            EntryType::File | EntryType::HardLink => self.file_mode,
            EntryType::Symlink => None,
        };
        if let Some(mode) = mode {
            entry.mode = mode;
        }

        entry
    }
}

static RE_LS_BASE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\./(.*):$").unwrap());
static RE_LS_TOTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^total ([0-9]+)$").unwrap());
static RE_LS_DIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^d([rwx-]{9})\s+([0-9]+)\s+(\S*)\s+(\S*)\s+([0-9]+)\s+(.*)\s+[\.]{1,2}$").unwrap()
});
static RE_LS_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([d-])([rwx-]{9})\s+([0-9]+)\s+(\S*)\s+(\S*)\s+([0-9]+)\s+(.*)\s+(.*)$").unwrap()
});

/// Ownership and permissions recorded for a path.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LsOverride {
    pub mode: u32,
    pub user: String,
    pub group: String,
}

/// Convert an `rwxr-xr-x` style permission string to mode bits.
fn mode_from_permissions(permissions: &str) -> u32 {
    permissions
        .chars()
        .rev()
        .enumerate()
        .filter(|(_, c)| *c != '-')
        .map(|(i, _)| 1 << i)
        .sum()
}

struct LsParser<'a, R> {
    lines: std::io::Lines<R>,
    line_number: usize,
    mapping: &'a mut HashMap<String, LsOverride>,
}

impl<'a, R: BufRead> LsParser<'a, R> {
    fn next_line(&mut self) -> Result<Option<String>> {
        match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                Ok(Some(line?))
            }
            None => Ok(None),
        }
    }

    fn error(&self, expected: &str, line: Option<&str>) -> DebianError {
        match line {
            Some(line) => DebianError::MappingParse(format!(
                "expected {} on line {} but got \"{}\"",
                expected, self.line_number, line
            )),
            None => DebianError::MappingParse(format!(
                "expected {} but reached end of input",
                expected
            )),
        }
    }

    /// Read a line matching `re`, returning its capture groups.
    fn expect_line(&mut self, expected: &str, re: &Regex) -> Result<Vec<String>> {
        let line = self
            .next_line()?
            .ok_or_else(|| self.error(expected, None))?;

        let caps = re
            .captures(&line)
            .ok_or_else(|| self.error(expected, Some(&line)))?;

        Ok(caps
            .iter()
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect())
    }

    fn read_block(&mut self, base: &str) -> Result<()> {
        self.expect_line("total line", &RE_LS_TOTAL)?;
        let current = self.expect_line("directory line", &RE_LS_DIR)?;
        self.expect_line("directory line", &RE_LS_DIR)?;

        self.mapping.insert(
            base.to_string(),
            LsOverride {
                mode: mode_from_permissions(&current[1]),
                user: current[3].clone(),
                group: current[4].clone(),
            },
        );

        loop {
            let line = match self.next_line()? {
                Some(line) => line,
                None => return Ok(()),
            };

            if line.is_empty() {
                return Ok(());
            }

            let caps = RE_LS_FILE
                .captures(&line)
                .ok_or_else(|| self.error("file line", Some(&line)))?;

            if &caps[1] == "-" {
                self.mapping.insert(
                    join_path(base, &caps[8]),
                    LsOverride {
                        mode: mode_from_permissions(&caps[2]),
                        user: caps[4].to_string(),
                        group: caps[5].to_string(),
                    },
                );
            }
        }
    }

    fn parse(&mut self) -> Result<()> {
        self.read_block("")?;

        loop {
            let line = match self.next_line()? {
                Some(line) => line,
                None => return Ok(()),
            };

            let base = RE_LS_BASE
                .captures(&line)
                .map(|caps| caps[1].to_string())
                .ok_or_else(|| self.error("base line", Some(&line)))?;

            self.read_block(&base)?;
        }
    }
}

/// A [Mapper] applying ownership and permissions read from `ls -laR` output.
///
/// The listing consists of blocks separated by empty lines. Every block but the
/// first starts with a `./<dir>:` line, followed by a `total N` line, the `.` and
/// `..` entries and one line per directory entry. Directory rows are skipped;
/// their attributes come from their own block.
#[derive(Clone, Debug, Default)]
pub struct LsMapper {
    mapping: HashMap<String, LsOverride>,
}

impl LsMapper {
    /// Parse a listing.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut mapping = HashMap::new();

        LsParser {
            lines: reader.lines(),
            line_number: 0,
            mapping: &mut mapping,
        }
        .parse()?;

        Ok(Self { mapping })
    }

    /// The override recorded for a path.
    pub fn get(&self, path: &str) -> Option<&LsOverride> {
        self.mapping.get(path)
    }
}

impl Mapper for LsMapper {
    fn map(&self, mut entry: PackageEntry) -> PackageEntry {
        if let Some(o) = self.mapping.get(entry.path()) {
            entry.mode = o.mode;
            entry.user_name = o.user.clone();
            entry.group_name = o.group.clone();
        }

        entry
    }
}

/// An ordered sequence of mappers, applied left to right.
#[derive(Default)]
pub struct MapperChain {
    mappers: Vec<Box<dyn Mapper>>,
}

impl MapperChain {
    pub fn new(mappers: Vec<Box<dyn Mapper>>) -> Self {
        Self { mappers }
    }

    /// Append a mapper to the end of the chain.
    pub fn push(&mut self, mapper: impl Mapper + 'static) {
        self.mappers.push(Box::new(mapper));
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }
}

impl Mapper for MapperChain {
    fn map(&self, entry: PackageEntry) -> PackageEntry {
        self.mappers.iter().fold(entry, |entry, m| m.map(entry))
    }
}
