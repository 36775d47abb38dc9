// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Sources of package content.

A [DataProducer] enumerates entries from some source (a directory tree, a list
of files, an existing archive, ...) and pushes each of them to a
[DataConsumer]. Before being pushed, an entry's source-relative path is tested
against the producer's [EntryFilter] and the entry is then rewritten by the
producer's [MapperChain].

Producers are invoked once per build and in the order they were configured.
Within a producer, entries are emitted in a stable order.
*/

mod archive;
mod directory;
mod file;
mod file_set;
mod link;
mod man_page;
mod path_template;

pub use {
    archive::ArchiveProducer,
    directory::DirectoryProducer,
    file::{FileProducer, FilesProducer},
    file_set::FileSetProducer,
    link::LinkProducer,
    man_page::ManPageProducer,
    path_template::PathTemplateProducer,
};

use {
    crate::{
        entry::{EntryType, PackageEntry},
        error::{DebianError, Result},
        mapping::{Mapper, MapperChain},
    },
    glob::{MatchOptions, Pattern},
    serde::Deserialize,
    slog::warn,
    std::{io::Read, path::Path},
};

/// Receives entries emitted by a [DataProducer].
pub trait DataConsumer {
    /// A regular file whose content is read from `content`.
    ///
    /// `entry.size` holds the number of bytes `content` yields.
    fn on_each_file(&mut self, entry: PackageEntry, content: &mut dyn Read) -> Result<()>;

    /// A directory.
    fn on_each_dir(&mut self, entry: PackageEntry) -> Result<()>;

    /// A symbolic or hard link.
    fn on_each_link(&mut self, entry: PackageEntry) -> Result<()>;
}

/// A source of package entries.
pub trait DataProducer {
    fn produce(&self, logger: &slog::Logger, consumer: &mut dyn DataConsumer) -> Result<()>;
}

/// What to do when a producer's source does not exist.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, strum::EnumString, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MissingSourcePolicy {
    /// Abort the build.
    #[default]
    Fail,
    /// Log a warning and produce nothing.
    Ignore,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Include and exclude glob patterns.
///
/// A path is accepted if it matches at least one include pattern (or no
/// include patterns are defined) and matches no exclude pattern.
///
/// `*` and `?` do not cross `/`. `**` as a full path component matches any
/// number of directories.
#[derive(Clone, Debug, Default)]
pub struct EntryFilter {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl EntryFilter {
    /// Construct an instance from include and exclude patterns.
    pub fn new(
        includes: impl IntoIterator<Item = impl AsRef<str>>,
        excludes: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let compile = |patterns: Vec<String>| -> Result<Vec<Pattern>> {
            patterns
                .iter()
                .filter(|p| !p.is_empty())
                .map(|p| Ok(Pattern::new(p.trim_start_matches('/'))?))
                .collect()
        };

        Ok(Self {
            includes: compile(includes.into_iter().map(|s| s.as_ref().to_string()).collect())?,
            excludes: compile(excludes.into_iter().map(|s| s.as_ref().to_string()).collect())?,
        })
    }

    /// Construct an instance accepting every path matching `includes`.
    pub fn including(includes: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        Self::new(includes, Vec::<String>::new())
    }

    /// Construct an instance rejecting every path matching `excludes`.
    pub fn excluding(excludes: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        Self::new(Vec::<String>::new(), excludes)
    }

    /// Whether a normalized relative path passes the filter.
    pub fn is_included(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');

        let included = self.includes.is_empty()
            || self
                .includes
                .iter()
                .any(|p| p.matches_with(path, MATCH_OPTIONS));

        included
            && !self
                .excludes
                .iter()
                .any(|p| p.matches_with(path, MATCH_OPTIONS))
    }
}

/// Filtering, mapping and missing source handling shared by producers.
#[derive(Default)]
pub struct ProducerOptions {
    pub filter: EntryFilter,
    pub mappers: MapperChain,
    pub missing_source: MissingSourcePolicy,
}

impl ProducerOptions {
    pub fn with_filter(mut self, filter: EntryFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Append a mapper to the mapper chain.
    pub fn with_mapper(mut self, mapper: impl Mapper + 'static) -> Self {
        self.mappers.push(mapper);
        self
    }

    pub fn with_missing_source(mut self, policy: MissingSourcePolicy) -> Self {
        self.missing_source = policy;
        self
    }

    /// Whether a source exists, applying the missing source policy if not.
    ///
    /// Returns `Ok(false)` if the source is missing and the policy is to ignore it.
    pub fn check_source(&self, logger: &slog::Logger, path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(true);
        }

        match self.missing_source {
            MissingSourcePolicy::Fail => Err(DebianError::SourceNotFound(path.to_path_buf())),
            MissingSourcePolicy::Ignore => {
                warn!(logger, "skipping missing source"; "path" => %path.display());
                Ok(false)
            }
        }
    }

    /// Filter and map an entry.
    ///
    /// The filter is evaluated against the unmapped path.
    pub fn apply(&self, entry: PackageEntry) -> Option<PackageEntry> {
        if self.filter.is_included(entry.path()) {
            Some(self.mappers.map(entry))
        } else {
            None
        }
    }

    /// Filter, map and forward an entry without content.
    pub fn emit(&self, consumer: &mut dyn DataConsumer, entry: PackageEntry) -> Result<()> {
        match self.apply(entry) {
            Some(entry) if entry.entry_type == EntryType::Directory => consumer.on_each_dir(entry),
            Some(entry) => consumer.on_each_link(entry),
            None => Ok(()),
        }
    }

    /// Filter, map and forward a regular file.
    ///
    /// The size of the mapped entry is restored to the size of the content.
    pub fn emit_file(
        &self,
        consumer: &mut dyn DataConsumer,
        entry: PackageEntry,
        content: &mut dyn Read,
    ) -> Result<()> {
        let size = entry.size;

        match self.apply(entry) {
            Some(mut entry) => {
                entry.size = size;
                consumer.on_each_file(entry, content)
            }
            None => Ok(()),
        }
    }
}

/// A [DataConsumer] collecting entries in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CollectingConsumer {
    pub entries: Vec<(PackageEntry, Vec<u8>)>,
}

#[cfg(test)]
impl CollectingConsumer {
    pub fn paths(&self) -> Vec<&str> {
        self.entries.iter().map(|(e, _)| e.path()).collect()
    }

    pub fn get(&self, path: &str) -> Option<&(PackageEntry, Vec<u8>)> {
        self.entries.iter().find(|(e, _)| e.path() == path)
    }
}

#[cfg(test)]
impl DataConsumer for CollectingConsumer {
    fn on_each_file(&mut self, entry: PackageEntry, content: &mut dyn Read) -> Result<()> {
        let mut data = vec![];
        content.read_to_end(&mut data)?;
        self.entries.push((entry, data));
        Ok(())
    }

    fn on_each_dir(&mut self, entry: PackageEntry) -> Result<()> {
        self.entries.push((entry, vec![]));
        Ok(())
    }

    fn on_each_link(&mut self, entry: PackageEntry) -> Result<()> {
        self.entries.push((entry, vec![]));
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}
