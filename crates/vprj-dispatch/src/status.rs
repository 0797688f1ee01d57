//! Platform status codes returned across the callback boundary.
//!
//! Codes use the HRESULT layout: zero and positive values are success,
//! negative values are failures. Win32 error numbers are wrapped with the
//! `FACILITY_WIN32` facility exactly like `HRESULT_FROM_WIN32`.

use std::fmt;
use std::io;

/// HRESULT-style status code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Status(i32);

const FACILITY_WIN32: u32 = 7;

impl Status {
    pub const OK: Status = Status(0);
    pub const FAIL: Status = Status(0x8000_4005_u32 as i32);
    pub const UNEXPECTED: Status = Status(0x8000_FFFF_u32 as i32);
    pub const OUT_OF_MEMORY: Status = Status(0x8007_000E_u32 as i32);
    pub const FILE_NOT_FOUND: Status = Status::from_win32(2);
    pub const PATH_NOT_FOUND: Status = Status::from_win32(3);
    pub const ACCESS_DENIED: Status = Status::from_win32(5);
    pub const FILE_EXISTS: Status = Status::from_win32(80);
    pub const INVALID_PARAMETER: Status = Status::from_win32(87);
    pub const INSUFFICIENT_BUFFER: Status = Status::from_win32(122);
    pub const DIR_NOT_EMPTY: Status = Status::from_win32(145);
    /// "The directory name is invalid": a file was used where a directory is required.
    pub const DIRECTORY: Status = Status::from_win32(267);

    /// Wrap a Win32 error number.
    pub const fn from_win32(code: u32) -> Status {
        if code == 0 {
            Status::OK
        } else {
            Status(((code & 0xFFFF) | (FACILITY_WIN32 << 16) | 0x8000_0000) as i32)
        }
    }

    pub const fn from_raw(raw: i32) -> Status {
        Status(raw)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    pub const fn is_err(self) -> bool {
        self.0 < 0
    }

    /// `Ok(())` for success codes, `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), Status> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(self)
        }
    }

    fn name(self) -> Option<&'static str> {
        let name = match self {
            Status::OK => "OK",
            Status::FAIL => "FAIL",
            Status::UNEXPECTED => "UNEXPECTED",
            Status::OUT_OF_MEMORY => "OUT_OF_MEMORY",
            Status::FILE_NOT_FOUND => "FILE_NOT_FOUND",
            Status::PATH_NOT_FOUND => "PATH_NOT_FOUND",
            Status::ACCESS_DENIED => "ACCESS_DENIED",
            Status::FILE_EXISTS => "FILE_EXISTS",
            Status::INVALID_PARAMETER => "INVALID_PARAMETER",
            Status::INSUFFICIENT_BUFFER => "INSUFFICIENT_BUFFER",
            Status::DIR_NOT_EMPTY => "DIR_NOT_EMPTY",
            Status::DIRECTORY => "DIRECTORY",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "0x{:08X} ({})", self.0 as u32, name),
            None => write!(f, "0x{:08X}", self.0 as u32),
        }
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({})", self)
    }
}

impl std::error::Error for Status {}

impl From<&io::Error> for Status {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Status::FILE_NOT_FOUND,
            io::ErrorKind::PermissionDenied => Status::ACCESS_DENIED,
            io::ErrorKind::AlreadyExists => Status::FILE_EXISTS,
            io::ErrorKind::InvalidInput => Status::INVALID_PARAMETER,
            io::ErrorKind::OutOfMemory => Status::OUT_OF_MEMORY,
            _ => Status::FAIL,
        }
    }
}
