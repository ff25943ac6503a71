//! # CAR archive manager
//!
//! Stores any number of files in one container, each member compressed with
//! LZSS when that pays off and stored verbatim when it does not.  Every header
//! and every payload is protected by CRC-32.
//!
//! * `crc32` is the checksum engine shared by headers and payloads
//! * `lzss` is the codec, built on the match tree and token buffer in `tools`
//! * `header` reads and writes the per-member records
//! * `archive` runs the add/extract/replace/delete/print/list/test operations
//!
//! Archives are never modified in place.  Operations that change an archive
//! stream it into a temporary file which replaces the original at the end.

mod tools;
pub mod crc32;
pub mod lzss;
pub mod header;
pub mod archive;

pub type DYNERR = Box<dyn std::error::Error>;
pub type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// Archive Errors
#[derive(thiserror::Error,Debug)]
pub enum Error {
    #[error("header checksum error for file {0}")]
    HeaderChecksum(String),
    #[error("file name exceeded maximum in header")]
    FileNameTooLong,
    #[error("can't open archive {0}")]
    ArchiveNotFound(String),
    #[error("too many file names")]
    TooManyFiles,
    #[error("no file names given")]
    MissingFileList,
    #[error("file too large")]
    FileTooLarge,
    #[error("can't rename temporary file to {0}")]
    RenameFailed(String),
    #[error("archive was not opened for writing")]
    NotWritable
}

/// Options controlling the archive manager
#[derive(Clone)]
pub struct Options {
    /// bound on a header's file name, counting the terminating NUL
    pub max_name: usize,
    /// most file names accepted in one run
    pub max_files: usize,
    /// extension tried when the archive name has none
    pub extension: &'static str
}

pub const STD_OPTIONS: Options = Options {
    max_name: 128,
    max_files: 99,
    extension: "car"
};
