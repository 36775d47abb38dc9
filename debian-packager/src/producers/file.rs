// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    super::{DataConsumer, DataProducer, ProducerOptions},
    crate::{entry::PackageEntry, error::Result, paths::move_path},
    std::{
        fs::File,
        path::{Path, PathBuf},
    },
};

fn produce_file(
    options: &ProducerOptions,
    logger: &slog::Logger,
    consumer: &mut dyn DataConsumer,
    source: &Path,
    name: &str,
) -> Result<()> {
    if !options.check_source(logger, source)? {
        return Ok(());
    }

    let metadata = std::fs::metadata(source)?;
    let mut fh = File::open(source)?;

    options.emit_file(consumer, PackageEntry::file(name, metadata.len()), &mut fh)
}

/// Produces a single file.
///
/// The entry is named after the file unless a destination is given.
pub struct FileProducer {
    source: PathBuf,
    destination: Option<String>,
    options: ProducerOptions,
}

impl FileProducer {
    pub fn new(source: impl Into<PathBuf>, options: ProducerOptions) -> Self {
        Self {
            source: source.into(),
            destination: None,
            options,
        }
    }

    /// Install the file at the given path instead of its file name.
    pub fn with_destination(mut self, destination: impl ToString) -> Self {
        self.destination = Some(destination.to_string());
        self
    }

    fn entry_name(&self) -> String {
        match &self.destination {
            Some(dest) if !dest.is_empty() => dest.clone(),
            _ => self
                .source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }
}

impl DataProducer for FileProducer {
    fn produce(&self, logger: &slog::Logger, consumer: &mut dyn DataConsumer) -> Result<()> {
        produce_file(
            &self.options,
            logger,
            consumer,
            &self.source,
            &self.entry_name(),
        )
    }
}

/// Produces an explicit list of files.
///
/// Each file is installed at its given path, or inside the destination
/// directory when one is set.
pub struct FilesProducer {
    files: Vec<String>,
    destination_dir: Option<String>,
    options: ProducerOptions,
}

impl FilesProducer {
    pub fn new(files: impl IntoIterator<Item = impl ToString>, options: ProducerOptions) -> Self {
        Self {
            files: files.into_iter().map(|f| f.to_string()).collect(),
            destination_dir: None,
            options,
        }
    }

    pub fn with_destination_dir(mut self, dir: impl ToString) -> Self {
        self.destination_dir = Some(dir.to_string());
        self
    }
}

impl DataProducer for FilesProducer {
    fn produce(&self, logger: &slog::Logger, consumer: &mut dyn DataConsumer) -> Result<()> {
        for file in &self.files {
            let name = match &self.destination_dir {
                Some(dir) if !dir.is_empty() => move_path(file, dir),
                _ => file.clone(),
            };

            produce_file(&self.options, logger, consumer, Path::new(file), &name)?;
        }

        Ok(())
    }
}
