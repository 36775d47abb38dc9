// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    super::{DataConsumer, DataProducer, ProducerOptions},
    crate::{entry::PackageEntry, error::Result, paths::relative_unix_path},
    slog::debug,
    std::{fs::File, path::PathBuf},
};

/// Produces the contents of a directory tree.
///
/// The tree is walked depth first with siblings in file name order. Every
/// directory below the root is emitted, including empty ones. Symbolic links are
/// followed.
pub struct DirectoryProducer {
    root: PathBuf,
    options: ProducerOptions,
}

impl DirectoryProducer {
    pub fn new(root: impl Into<PathBuf>, options: ProducerOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }
}

impl DataProducer for DirectoryProducer {
    fn produce(&self, logger: &slog::Logger, consumer: &mut dyn DataConsumer) -> Result<()> {
        if !self.options.check_source(logger, &self.root)? {
            return Ok(());
        }

        let walker = walkdir::WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(true)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()));

        for entry in walker {
            let entry = entry?;

            let rel_path = match relative_unix_path(&self.root, entry.path()) {
                Some(p) if !p.is_empty() => p,
                _ => continue,
            };

            let file_type = entry.file_type();

            if file_type.is_dir() {
                self.options
                    .emit(consumer, PackageEntry::directory(&rel_path))?;
            } else if file_type.is_file() {
                let metadata = entry.metadata()?;
                let mut fh = File::open(entry.path())?;

                self.options.emit_file(
                    consumer,
                    PackageEntry::file(&rel_path, metadata.len()),
                    &mut fh,
                )?;
            } else {
                debug!(logger, "skipping special file"; "path" => %entry.path().display());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::DebianError,
            mapping::PermMapper,
            producers::{test_logger, CollectingConsumer, EntryFilter, MissingSourcePolicy},
        },
    };

    fn populate(root: &std::path::Path) -> Result<()> {
        std::fs::create_dir_all(root.join("usr/bin"))?;
        std::fs::create_dir_all(root.join("usr/share/doc/empty"))?;
        std::fs::write(root.join("usr/bin/tool"), b"#!/bin/sh\n")?;
        std::fs::write(root.join("usr/bin/tool.bak"), b"old")?;
        std::fs::write(root.join("usr/share/doc/README"), b"readme")?;
        std::fs::write(root.join("a.txt"), b"a")?;

        Ok(())
    }

    #[test]
    fn walk_order() -> Result<()> {
        let td = tempfile::tempdir()?;
        populate(td.path())?;

        let producer = DirectoryProducer::new(td.path(), ProducerOptions::default());
        let mut consumer = CollectingConsumer::default();
        producer.produce(&test_logger(), &mut consumer)?;

        assert_eq!(
            consumer.paths(),
            vec![
                "a.txt",
                "usr",
                "usr/bin",
                "usr/bin/tool",
                "usr/bin/tool.bak",
                "usr/share",
                "usr/share/doc",
                "usr/share/doc/README",
                "usr/share/doc/empty",
            ]
        );

        let (entry, data) = consumer.get("usr/bin/tool").unwrap();
        assert!(entry.is_file());
        assert_eq!(entry.size, 10);
        assert_eq!(entry.mode, 0o644);
        assert_eq!(entry.user_name, "root");
        assert_eq!(data, b"#!/bin/sh\n");

        let (entry, _) = consumer.get("usr/share/doc/empty").unwrap();
        assert!(entry.is_dir());
        assert_eq!(entry.mode, 0o755);

        Ok(())
    }

    #[test]
    fn filters_and_mappers() -> Result<()> {
        let td = tempfile::tempdir()?;
        populate(td.path())?;

        let options = ProducerOptions::default()
            .with_filter(EntryFilter::excluding(["usr", "a.txt", "**/*.bak"])?)
            .with_mapper(PermMapper {
                strip: 1,
                prefix: Some("opt/app".into()),
                file_mode: Some(0o755),
                ..Default::default()
            });

        let producer = DirectoryProducer::new(td.path(), options);
        let mut consumer = CollectingConsumer::default();
        producer.produce(&test_logger(), &mut consumer)?;

        assert_eq!(
            consumer.paths(),
            vec![
                "opt/app/bin",
                "opt/app/bin/tool",
                "opt/app/share",
                "opt/app/share/doc",
                "opt/app/share/doc/README",
                "opt/app/share/doc/empty",
            ]
        );
        assert_eq!(consumer.get("opt/app/bin/tool").unwrap().0.mode, 0o755);

        Ok(())
    }

    #[test]
    fn missing_directory() -> Result<()> {
        let td = tempfile::tempdir()?;
        let missing = td.path().join("missing");

        let mut consumer = CollectingConsumer::default();

        let producer = DirectoryProducer::new(&missing, ProducerOptions::default());
        assert!(matches!(
            producer.produce(&test_logger(), &mut consumer),
            Err(DebianError::SourceNotFound(_))
        ));

        let producer = DirectoryProducer::new(
            &missing,
            ProducerOptions::default().with_missing_source(MissingSourcePolicy::Ignore),
        );
        producer.produce(&test_logger(), &mut consumer)?;
        assert!(consumer.entries.is_empty());

        Ok(())
    }
}
