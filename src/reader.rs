use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::SodbError;

/// Opens a cached experiment file. Any error marks the file as unusable and
/// gets it evicted from the cache.
pub trait DataReader {
    type Object;

    fn read(&self, path: &Utf8Path) -> Result<Self::Object, SodbError>;
}

const HDF5_SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

/// Handle to an `.h5ad` file whose HDF5 container header checked out.
/// Decoding the AnnData groups inside is left to an HDF5 library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct H5adFile {
    pub path: Utf8PathBuf,
    pub len: u64,
    pub superblock_offset: u64,
    pub superblock_version: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct H5adReader;

impl DataReader for H5adReader {
    type Object = H5adFile;

    fn read(&self, path: &Utf8Path) -> Result<H5adFile, SodbError> {
        let mut file = File::open(path.as_std_path())
            .map_err(|err| SodbError::Parse(format!("open {path}: {err}")))?;
        let len = file
            .metadata()
            .map_err(|err| SodbError::Parse(format!("stat {path}: {err}")))?
            .len();

        // The superblock sits at 0 or at a power of two from 512 when a user
        // block precedes it.
        let mut offset = 0u64;
        let mut header = [0u8; 9];
        while offset + header.len() as u64 <= len {
            file.seek(SeekFrom::Start(offset))
                .map_err(|err| SodbError::Parse(format!("seek {path}: {err}")))?;
            match file.read_exact(&mut header) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(SodbError::Parse(format!("read {path}: {err}"))),
            }
            if header[..8] == HDF5_SIGNATURE {
                return Ok(H5adFile {
                    path: path.to_path_buf(),
                    len,
                    superblock_offset: offset,
                    superblock_version: header[8],
                });
            }
            offset = if offset == 0 { 512 } else { offset * 2 };
        }

        Err(SodbError::Parse(format!(
            "{path} is not an HDF5 file (no superblock signature)"
        )))
    }
}
