// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian binary package control files. */

use {
    crate::{
        control::{ControlFieldDefinition as Field, ControlFieldType, ControlFile},
        error::{DebianError, Result},
    },
    std::{
        fmt::{Display, Formatter},
        io::BufRead,
        ops::{Deref, DerefMut},
    },
};

const FOLDED: ControlFieldType = ControlFieldType::Folded;

static FIELDS: &[Field] = &[
    Field::mandatory("Package"),
    Field::optional("Source"),
    Field::mandatory("Version"),
    Field::mandatory("Section"),
    Field::mandatory("Priority"),
    Field::mandatory("Architecture"),
    Field::optional("Essential"),
    Field::optional("Depends").with_kind(FOLDED),
    Field::optional("Pre-Depends").with_kind(FOLDED),
    Field::optional("Recommends").with_kind(FOLDED),
    Field::optional("Suggests").with_kind(FOLDED),
    Field::optional("Breaks").with_kind(FOLDED),
    Field::optional("Enhances").with_kind(FOLDED),
    Field::optional("Conflicts").with_kind(FOLDED),
    Field::optional("Provides").with_kind(FOLDED),
    Field::optional("Replaces").with_kind(FOLDED),
    Field::optional("Installed-Size"),
    Field::mandatory("Maintainer"),
    Field::mandatory("Description").with_kind(ControlFieldType::Multiline),
    Field::optional("Homepage"),
];

/// A Debian binary package control file/paragraph.
///
/// See <https://www.debian.org/doc/debian-policy/ch-controlfields.html#binary-package-control-files-debian-control>.
///
/// This type is a wrapper around an inner [ControlFile] carrying the binary
/// package field table. [Deref] and [DerefMut] can be used to operate on the inner
/// [ControlFile].
///
/// Fields annotated as *mandatory* in the Debian Policy Manual have getters that
/// return [Result] and will error if a field is not present. Non-mandatory fields
/// return [Option].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BinaryPackageControlFile {
    inner: ControlFile,
}

impl Default for BinaryPackageControlFile {
    fn default() -> Self {
        let mut inner = ControlFile::new(FIELDS, 'B');
        inner.set("Architecture", "all");
        inner.set("Priority", "optional");

        Self { inner }
    }
}

impl Deref for BinaryPackageControlFile {
    type Target = ControlFile;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for BinaryPackageControlFile {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Display for BinaryPackageControlFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl BinaryPackageControlFile {
    /// Parse a control file.
    ///
    /// No defaults are applied to parsed files.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut inner = ControlFile::new(FIELDS, 'B');
        inner.parse_reader(reader)?;

        Ok(Self { inner })
    }

    /// Parse a control file from a string.
    pub fn from_str(s: &str) -> Result<Self> {
        Self::from_reader(std::io::Cursor::new(s.as_bytes()))
    }

    fn required_field_str(&self, name: &'static str) -> Result<&str> {
        self.get(name)
            .ok_or(DebianError::ControlRequiredFieldMissing(name))
    }

    /// The `Package` field value.
    pub fn package(&self) -> Result<&str> {
        self.required_field_str("Package")
    }

    /// The `Version` field as its original string.
    pub fn version(&self) -> Result<&str> {
        self.required_field_str("Version")
    }

    /// The `Architecture` field.
    pub fn architecture(&self) -> Result<&str> {
        self.required_field_str("Architecture")
    }

    /// The `Maintainer` field.
    pub fn maintainer(&self) -> Result<&str> {
        self.required_field_str("Maintainer")
    }

    /// The `Description` field.
    pub fn description(&self) -> Result<&str> {
        self.required_field_str("Description")
    }

    /// The first line of the `Description` field.
    pub fn short_description(&self) -> Option<&str> {
        self.get("Description")
            .map(|d| d.split('\n').next().unwrap_or(d))
    }

    /// The `Source` field.
    pub fn source(&self) -> Option<&str> {
        self.get("Source")
    }

    /// The `Section` field.
    pub fn section(&self) -> Option<&str> {
        self.get("Section")
    }

    /// The `Priority` field.
    pub fn priority(&self) -> Option<&str> {
        self.get("Priority")
    }

    /// The `Installed-Size` field, in KiB.
    pub fn installed_size(&self) -> Option<Result<u64>> {
        self.get("Installed-Size")
            .map(|v| v.trim().parse::<u64>().map_err(DebianError::from))
    }

    /// Set the `Installed-Size` field from a byte count.
    ///
    /// The value is in KiB and is truncated, so packages smaller than 1 KiB
    /// report 0.
    pub fn set_installed_size_bytes(&mut self, size: u64) {
        self.set("Installed-Size", size / 1024);
    }
}

#[cfg(test)]
mod tests {
    use {super::*, indoc::indoc};

    const CONTROL: &str = indoc! {"
        Package: test
        Version: 1.0.1
        Section: misc
        Priority: optional
        Architecture: i386
        Depends: some-package
        Maintainer: Torsten Curdt <torsten@vafer.org>
        Description: revision @REVISION@, test package
         This is a sample package control file.
         .
         Use for testing purposes only.
        XB-UserDefinedField: This is a user defined field.
    "};

    #[test]
    fn parse() -> Result<()> {
        let control = BinaryPackageControlFile::from_str(CONTROL)?;

        assert!(control.is_valid());
        assert_eq!(control.package()?, "test");
        assert_eq!(control.version()?, "1.0.1");
        assert_eq!(control.architecture()?, "i386");
        assert_eq!(control.section(), Some("misc"));
        assert_eq!(
            control.short_description(),
            Some("revision @REVISION@, test package")
        );
        assert_eq!(
            control.get("UserDefinedField"),
            Some("This is a user defined field.")
        );

        let expected = CONTROL.replace("XB-UserDefinedField", "UserDefinedField");
        assert_eq!(control.to_string(), expected);

        Ok(())
    }

    #[test]
    fn defaults() {
        let control = BinaryPackageControlFile::default();

        assert_eq!(control.architecture().unwrap(), "all");
        assert_eq!(control.priority(), Some("optional"));
        assert!(!control.is_valid());
        assert_eq!(
            control.invalid_fields().into_iter().collect::<Vec<_>>(),
            vec!["Description", "Maintainer", "Package", "Section", "Version"]
        );
        assert!(matches!(
            control.package(),
            Err(DebianError::ControlRequiredFieldMissing("Package"))
        ));
    }

    #[test]
    fn installed_size() -> Result<()> {
        let mut control = BinaryPackageControlFile::default();
        assert!(control.installed_size().is_none());

        control.set_installed_size_bytes(10 * 1024 + 1000);
        assert_eq!(control.get("Installed-Size"), Some("10"));
        assert_eq!(control.installed_size().unwrap()?, 10);

        Ok(())
    }
}
