use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::compression::CompressionMode;
use crate::error::BackfillResult;

/// Prefix of the private directory holding a conduit.
const CONDUIT_DIR_PREFIX: &str = "backfill-";

/// Named pipe connecting the compression stage to the destination import.
///
/// The pipe lives alone in a freshly created private directory which is removed, pipe
/// included, when the conduit is dropped. Its name ends with the codec suffix so the import
/// knows how to decode the stream.
#[derive(Debug)]
pub struct Conduit {
    path: PathBuf,
    dir: TempDir,
}

impl Conduit {
    /// Creates the pipe for `table` encoded with `compression`.
    pub fn create(table: &str, compression: CompressionMode) -> BackfillResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix(CONDUIT_DIR_PREFIX)
            .tempdir()?;

        let name = format!("{}{}", file_stem(table), compression.conduit_suffix());
        let path = dir.path().join(name);
        make_fifo(&path)?;

        debug!(path = %path.display(), "created conduit");

        Ok(Self { path, dir })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the write end if a reader has the pipe open, without ever blocking.
    ///
    /// Returns `None` while no reader is attached. The returned file is switched back to
    /// blocking mode so writers get backpressure from the reader.
    pub fn try_open_writer(&self) -> io::Result<Option<File>> {
        let file = match OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(err) if err.raw_os_error() == Some(libc::ENXIO) => return Ok(None),
            Err(err) => return Err(err),
        };

        clear_nonblocking(&file)?;

        Ok(Some(file))
    }

    /// Returns the directory the pipe lives in.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

fn clear_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();

    // SAFETY: `fd` belongs to `file`, which stays open across both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: as above.
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

fn make_fifo(path: &Path) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

    // SAFETY: `c_path` is a valid nul terminated string that outlives the call.
    let ret = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

/// Keeps table names usable as a single path component.
fn file_stem(table: &str) -> String {
    table
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::FileTypeExt;

    use super::*;

    #[test]
    fn conduit_is_a_fifo_with_codec_suffix() {
        let conduit = Conduit::create("accounts", CompressionMode::Gzip).unwrap();

        assert!(conduit.path().ends_with("accounts.gz"));
        let metadata = std::fs::metadata(conduit.path()).unwrap();
        assert!(metadata.file_type().is_fifo());
    }

    #[test]
    fn dropping_removes_the_directory() {
        let conduit = Conduit::create("blocks", CompressionMode::None).unwrap();
        let dir = conduit.dir().to_path_buf();
        assert!(conduit.path().ends_with("blocks"));

        drop(conduit);

        assert!(!dir.exists());
    }

    #[test]
    fn odd_table_names_stay_in_the_directory() {
        let conduit = Conduit::create("../weird name", CompressionMode::Lz4).unwrap();

        assert_eq!(conduit.path().parent(), Some(conduit.dir()));
        assert!(conduit.path().ends_with("___weird_name.lz4"));
    }

    #[test]
    fn writer_opens_only_once_a_reader_is_attached() {
        let conduit = Conduit::create("pending", CompressionMode::None).unwrap();

        assert!(conduit.try_open_writer().unwrap().is_none());

        let _reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(conduit.path())
            .unwrap();
        let writer = conduit.try_open_writer().unwrap().unwrap();

        // SAFETY: the descriptor belongs to `writer`, which is still open.
        let flags = unsafe { libc::fcntl(writer.as_raw_fd(), libc::F_GETFL) };
        assert_eq!(flags & libc::O_NONBLOCK, 0);
    }
}
