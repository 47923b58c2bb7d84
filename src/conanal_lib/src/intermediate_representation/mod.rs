//! This module defines the intermediate representation of the analyzed program.
//!
//! The representation is produced by an external front end (usually a compiler lowering C code
//! to an SSA-like instruction set) and handed to the analyses as a serialized [`Program`].
//! All nodes of the program live in arenas owned by the `Program` struct
//! and reference each other through integer handles (`FuncId`, `BlockId`, `InstId`, `GlobalId`).
//! Function arguments are identified by the function they belong to and their position.
//!
//! To learn how individual instructions are encoded,
//! you should first take a look at the [`Value`] type and then at the [`Instruction`] and [`Opcode`] types,
//! which form the basis of the basic block [`Block`] struct.

use crate::prelude::*;
use derive_more::{From, Into};

mod builder;
pub use builder::*;
mod instruction;
pub use instruction::*;
mod program;
pub use program::*;
mod value;
pub use value::*;

macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Serialize,
            Deserialize,
            Debug,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Clone,
            Copy,
            Default,
            From,
            Into,
        )]
        #[serde(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Create a new handle pointing to the given arena position.
            pub fn new(index: usize) -> Self {
                $name(index)
            }

            /// The position of the referenced object in its arena.
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                write!(formatter, "{}{}", $prefix, self.0)
            }
        }
    };
}

arena_handle!(
    /// The handle of a function in the [`Program`].
    FuncId,
    "fn"
);
arena_handle!(
    /// The handle of a basic block in the [`Program`].
    BlockId,
    "blk"
);
arena_handle!(
    /// The handle of an instruction in the [`Program`].
    ///
    /// Note that the handle is an arena position.
    /// The user-facing instruction numbers are assigned by the [`InstIndex`](crate::analysis::index::InstIndex).
    InstId,
    "inst"
);
arena_handle!(
    /// The handle of a global variable in the [`Program`].
    GlobalId,
    "glob"
);

/// The source code location an instruction was generated from.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct SourceLocation {
    /// The source file as recorded by the front end. May contain a directory prefix.
    pub file: String,
    /// The line number inside the source file.
    pub line: u32,
}

impl SourceLocation {
    /// Create a new source location.
    pub fn new(file: impl ToString, line: u32) -> SourceLocation {
        SourceLocation {
            file: file.to_string(),
            line,
        }
    }

    /// Get the file name with any directory prefix stripped.
    pub fn file_name(&self) -> &str {
        file_basename(&self.file)
    }

    /// Convert to the `(basename, line)` key used by the index and the labels.
    pub fn file_line(&self) -> FileLine {
        FileLine::new(self.file_name(), self.line)
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.file_name(), self.line)
    }
}

/// A source file basename together with a line number.
///
/// This is the key type of all maps from source lines to instructions or program sites.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct FileLine {
    /// The file name without directory prefix.
    pub file: String,
    /// The line number.
    pub line: u32,
}

impl FileLine {
    /// Create a new key. Directory prefixes of `file` are stripped.
    pub fn new(file: impl AsRef<str>, line: u32) -> FileLine {
        FileLine {
            file: file_basename(file.as_ref()).to_string(),
            line,
        }
    }
}

impl std::fmt::Display for FileLine {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.file, self.line)
    }
}

/// Strip everything up to the last path separator (`/` or `\`).
pub fn file_basename(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(position) => &path[position + 1..],
        None => path,
    }
}
