// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Building Debian binary packages.

This crate builds `.deb` files from declarative descriptions of their content.
Package content comes from *producers* (directory trees, single files, existing
tar archives, explicit links and directories) whose entries are filtered and
then rewritten by *mappers* that adjust paths, ownership and permissions.

# Goals

## Determinism and Reproducibility

Given the same inputs and a fixed timestamp, building a package should yield a
byte-for-byte identical `.deb` file. Producers emit entries in a stable order,
archive members are written in a fixed order and compression headers carry no
timestamps. A fixed timestamp can be taken from the `SOURCE_DATE_EPOCH`
environment variable via [deb::output_timestamp_from_env()].

## Compliance and Compatibility

Produced archives follow the layout `dpkg` itself writes: an `ar` archive with
`debian-binary`, `control.tar` and `data.tar` members, tar paths beginning with
`./` and directories ending with `/`.

# A Tour of Functionality

[deb::builder::DebBuilder] is the main type of this crate. It is constructed
from a [binary_package_control::BinaryPackageControlFile] (or a directory
holding a `control` file and maintainer scripts), given any number of
[producers::DataProducer] and writes the package to any [std::io::Write].
Writing returns a [deb::builder::BuildSummary] with the file digests and the
digests of the package itself.

Control files are modeled by [control::ControlFile], which knows about the
field types (simple, folded and multiline) of each control file flavor and
preserves the field layout when parsing and serializing.

Producers live in the [producers] module and mappers in the [mapping] module.
The [entry::PackageEntry] type describes a single archive entry as it flows
from a producer through its mappers into the data archive.

Uploads are described by `.changes` files. The [changes] module defines
[changes::ChangesFile] and readers of textual change logs.
[package_version::convert_to_debian_version()] turns arbitrary project version
strings into valid Debian versions.

The [signing] module signs packages and `.changes` files with PGP keys.
Cleartext signing itself lives in the `pgp-cleartext` crate.

Various other modules provide miscellaneous functionality. [io] defines I/O
helpers, including stream adapters computing content digests on read and write
and compression codecs. [paths] contains helpers for archive paths.
*/

pub mod binary_package_control;
pub mod changes;
pub mod control;
pub mod deb;
pub mod entry;
pub mod error;
pub mod io;
pub mod mapping;
pub mod package_version;
pub mod paths;
pub mod producers;
pub mod signing;
