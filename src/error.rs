use std::fmt::Display;

/// Filter cache errors.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Invalid on-disk data: an unparsable filter trailer, a file too short
    /// to hold one, or a checksum mismatch.
    Corruption(String),
    /// Invalid caller input, typically an out-of-range read offset.
    InvalidArgument(String),
    /// An IO error.
    IO(String),
    /// A load was requested on a reader that already has every unit resident.
    Exhausted,
    /// An evict was requested on a reader with no resident units.
    Empty,
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Corruption(msg) => write!(f, "corruption: {msg}"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::Exhausted => write!(f, "all filter units are already resident"),
            Error::Empty => write!(f, "no filter unit is resident"),
        }
    }
}

/// Constructs an Error::Corruption for the given format string.
#[macro_export]
macro_rules! errcorrupt {
    ($($args:tt)*) => { $crate::error::Error::Corruption(format!($($args)*)).into() };
}

/// Constructs an Error::InvalidArgument for the given format string.
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::error::Error::InvalidArgument(format!($($args)*)).into() };
}

/// An emberdb Result returning Error.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}
