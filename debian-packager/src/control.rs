// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Defines primitives in control files.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html>
for the canonical source of truth for how control files work.

A [ControlFile] is a single paragraph of fields interpreted against a fixed
table of [ControlFieldDefinition]. The definition of a field governs how its
continuation lines are parsed and re-wrapped on serialization.
*/

use {
    crate::error::{DebianError, Result},
    std::{
        borrow::Cow,
        collections::BTreeSet,
        fmt::{Display, Formatter},
        io::{BufRead, Write},
    },
};

/// The syntax class of a control field.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ControlFieldType {
    /// The value is a single line.
    Simple,
    /// The value is logically a single line that may be wrapped. Whitespace is not significant.
    Folded,
    /// The value spans multiple lines and whitespace is significant.
    Multiline,
}

/// A field value in a control file.
///
/// This represents the value after the colon (`:`) in field definitions.
///
/// There are canonically 3 types of field values: *simple*, *folded*, and *multiline*.
/// The differences between *folded* and *multiline* are semantic. *folded* is logically
/// a single line spanning multiple formatted lines and whitespace is not significant.
/// *multiline* has similar syntax as *folded* but whitespace is significant.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ControlFieldValue<'a> {
    Simple(Cow<'a, str>),
    Folded(Cow<'a, str>),
    Multiline(Cow<'a, str>),
}

impl<'a> AsRef<Cow<'a, str>> for ControlFieldValue<'a> {
    fn as_ref(&self) -> &Cow<'a, str> {
        match self {
            Self::Simple(v) => v,
            Self::Folded(v) => v,
            Self::Multiline(v) => v,
        }
    }
}

impl<'a> ControlFieldValue<'a> {
    /// Obtain an iterator over string values in this field.
    ///
    /// [Self::Simple] variants will emit a single item.
    ///
    /// [Self::Folded] and [Self::Multiline] may emit multiple items.
    pub fn iter_lines(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Self::Simple(v) => Box::new([v.as_ref()].into_iter()),
            Self::Folded(values) => Box::new(values.lines().map(|x| x.trim_start())),
            Self::Multiline(values) => Box::new(values.lines()),
        }
    }

    /// Obtain an iterator over words in the string value.
    pub fn iter_words(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        Box::new(self.as_ref().split_ascii_whitespace())
    }

    /// Obtain the inner string backing this value and consume this instance.
    pub fn into_inner(self) -> Cow<'a, str> {
        match self {
            Self::Simple(v) => v,
            Self::Folded(v) => v,
            Self::Multiline(v) => v,
        }
    }
}

/// Describes a known field of a control file flavor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ControlFieldDefinition {
    pub name: &'static str,
    pub mandatory: bool,
    pub kind: ControlFieldType,
    /// Whether the value begins on the line after the field name.
    pub first_line_empty: bool,
}

impl ControlFieldDefinition {
    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            mandatory: false,
            kind: ControlFieldType::Simple,
            first_line_empty: false,
        }
    }

    pub const fn mandatory(name: &'static str) -> Self {
        Self {
            name,
            mandatory: true,
            kind: ControlFieldType::Simple,
            first_line_empty: false,
        }
    }

    pub const fn with_kind(mut self, kind: ControlFieldType) -> Self {
        self.kind = kind;
        self
    }

    pub const fn with_first_line_empty(mut self) -> Self {
        self.first_line_empty = true;
        self
    }

    /// Format a value of this field as it appears in a control file.
    ///
    /// Blank values produce no output. Empty continuation lines are written as ` .`.
    pub fn format(&self, value: &str) -> String {
        format_field(self.name, self.first_line_empty, value)
    }
}

fn format_field(name: &str, first_line_empty: bool, value: &str) -> String {
    let mut s = String::new();

    if value.trim().is_empty() {
        return s;
    }

    s.push_str(name);
    s.push(':');

    let mut continuation = false;
    if first_line_empty {
        s.push('\n');
        continuation = true;
    }

    for line in value.split('\n') {
        if continuation && line.trim().is_empty() {
            s.push_str(" .\n");
        } else if line.is_empty() {
            s.push('\n');
        } else if continuation && line.starts_with('\t') {
            s.push_str(line);
            s.push('\n');
        } else {
            s.push(' ');
            s.push_str(line);
            s.push('\n');
        }

        continuation = true;
    }

    s
}

/// Whether a field name is in the user-defined `X<letters>-` namespace.
pub fn is_user_defined_field(name: &str) -> bool {
    name.starts_with('X') && name.find('-').map(|i| i > 0).unwrap_or(false)
}

/// A single paragraph control file interpreted against a fixed field table.
///
/// Field names are case insensitive on read and case preserving on set.
///
/// User-defined fields (`X<letters>-<name>`) are retained under their full name.
/// When the letters include the flavor's letter, the field is additionally
/// stored under `<name>` and serialized with the other fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControlFile {
    definitions: &'static [ControlFieldDefinition],
    user_defined_letter: char,
    values: Vec<(String, String)>,
    user_defined: Vec<(String, String)>,
}

impl ControlFile {
    /// Construct an empty instance.
    pub fn new(definitions: &'static [ControlFieldDefinition], user_defined_letter: char) -> Self {
        Self {
            definitions,
            user_defined_letter,
            values: vec![],
            user_defined: vec![],
        }
    }

    /// The definition of a known field.
    pub fn definition(&self, name: &str) -> Option<&'static ControlFieldDefinition> {
        self.definitions
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// All known field definitions, in serialization order.
    pub fn definitions(&self) -> &'static [ControlFieldDefinition] {
        self.definitions
    }

    /// Parse control file content and merge its fields into this instance.
    pub fn parse_reader<R: BufRead>(&mut self, reader: R) -> Result<()> {
        let mut current: Option<(String, String, usize)> = None;
        let mut blank_line = None;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.strip_suffix('\r').unwrap_or(&line);
            let line_number = i + 1;

            if line.trim().is_empty() {
                blank_line.get_or_insert(line_number);
                continue;
            }

            if let Some(blank) = blank_line {
                return Err(DebianError::ControlParseError(format!(
                    "empty line at line {}",
                    blank
                )));
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                let (_, value, continuations) = current.as_mut().ok_or_else(|| {
                    DebianError::ControlParseError(format!(
                        "continuation line without field at line {}",
                        line_number
                    ))
                })?;

                value.push('\n');
                // Tab indented lines keep their tab.
                let rest = if line.starts_with('\t') { line } else { &line[1..] };
                if rest.trim() != "." {
                    value.push_str(rest);
                }
                *continuations += 1;

                continue;
            }

            if let Some((name, value, continuations)) = current.take() {
                self.set_parsed(name, value, continuations)?;
            }

            let (name, value) = line.split_once(':').ok_or_else(|| {
                DebianError::ControlParseError(format!(
                    "line misses ':' delimiter at line {}",
                    line_number
                ))
            })?;

            current = Some((name.trim().to_string(), value.trim().to_string(), 0));
        }

        if let Some((name, value, continuations)) = current.take() {
            self.set_parsed(name, value, continuations)?;
        }

        Ok(())
    }

    /// Parse control file content from a string.
    pub fn parse_str(&mut self, s: &str) -> Result<()> {
        self.parse_reader(std::io::Cursor::new(s.as_bytes()))
    }

    fn set_parsed(&mut self, name: String, mut value: String, continuations: usize) -> Result<()> {
        if let Some(definition) = self.definition(&name) {
            if definition.kind == ControlFieldType::Simple && continuations > 0 {
                return Err(DebianError::ControlParseError(format!(
                    "field {} does not allow continuation lines",
                    name
                )));
            }

            if definition.first_line_empty && value.starts_with('\n') {
                value.remove(0);
            }
        }

        self.set(name, value);

        Ok(())
    }

    fn user_defined_name<'n>(&self, name: &'n str) -> Option<&'n str> {
        let index = name.find('-')?;

        if name[0..index].contains(self.user_defined_letter) {
            Some(&name[index + 1..])
        } else {
            None
        }
    }

    /// Set the value of a field.
    ///
    /// An existing value for a field of the same name is replaced in place.
    pub fn set(&mut self, name: impl ToString, value: impl ToString) {
        let name = name.to_string();
        let value = value.to_string();

        if is_user_defined_field(&name) {
            let stripped = self.user_defined_name(&name).map(|s| s.to_string());

            insert_field(&mut self.user_defined, name, value.clone());

            if let Some(stripped) = stripped {
                if !stripped.is_empty() {
                    insert_field(&mut self.values, stripped, value);
                }
            }
        } else if !name.is_empty() {
            insert_field(&mut self.values, name, value);
        }
    }

    /// Obtain the raw value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Obtain the value of a field interpreted according to its definition.
    ///
    /// Folded values are returned with their lines joined by single spaces.
    /// Fields without a definition are returned as multiline values.
    pub fn field_value(&self, name: &str) -> Option<ControlFieldValue<'_>> {
        let value = self.get(name)?;

        Some(match self.definition(name).map(|d| d.kind) {
            Some(ControlFieldType::Simple) => ControlFieldValue::Simple(Cow::Borrowed(value)),
            Some(ControlFieldType::Folded) => {
                if value.contains('\n') {
                    ControlFieldValue::Folded(Cow::Owned(
                        value
                            .split('\n')
                            .map(|l| l.trim())
                            .filter(|l| !l.is_empty())
                            .collect::<Vec<_>>()
                            .join(" "),
                    ))
                } else {
                    ControlFieldValue::Folded(Cow::Borrowed(value))
                }
            }
            Some(ControlFieldType::Multiline) | None => {
                ControlFieldValue::Multiline(Cow::Borrowed(value))
            }
        })
    }

    /// Remove a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self
            .values
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;

        Some(self.values.remove(pos).1)
    }

    /// User-defined fields keyed by their full `X?-` name, in insertion order.
    pub fn user_defined_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.user_defined
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Names of the mandatory fields of this flavor.
    pub fn mandatory_fields(&self) -> Vec<&'static str> {
        self.definitions
            .iter()
            .filter(|d| d.mandatory)
            .map(|d| d.name)
            .collect()
    }

    /// Mandatory fields that are absent or blank.
    pub fn invalid_fields(&self) -> BTreeSet<String> {
        self.definitions
            .iter()
            .filter(|d| d.mandatory)
            .filter(|d| self.get(d.name).map(|v| v.trim().is_empty()).unwrap_or(true))
            .map(|d| d.name.to_string())
            .collect()
    }

    /// Whether all mandatory fields have non-blank values.
    pub fn is_valid(&self) -> bool {
        self.invalid_fields().is_empty()
    }

    /// Fail with [DebianError::ControlInvalid] unless [Self::is_valid()].
    pub fn validate(&self) -> Result<()> {
        let invalid = self.invalid_fields();

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(DebianError::ControlInvalid(invalid))
        }
    }

    /// Write the serialized control file.
    ///
    /// Known fields are written in definition order, followed by all other fields
    /// in the order they were set.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.to_string().as_bytes())
    }
}

fn insert_field(fields: &mut Vec<(String, String)>, name: String, value: String) {
    if let Some(existing) = fields.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
        existing.1 = value;
    } else {
        fields.push((name, value));
    }
}

impl Display for ControlFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for definition in self.definitions {
            if let Some(value) = self.get(definition.name) {
                f.write_str(&definition.format(value))?;
            }
        }

        for (name, value) in &self.values {
            if self.definition(name).is_none() {
                f.write_str(&format_field(name, false, value))?;
            }
        }

        Ok(())
    }
}
