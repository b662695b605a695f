//! This crate writes [VCD (Value Change Dump)][wp] files, a textual format
//! used by HDL simulators, logic analyzers and other EDA tools to record
//! signal transitions over time.
//!
//! [wp]: https://en.wikipedia.org/wiki/Value_change_dump
//!
//! ## Example
//!
//! ```
//! use vcdstream::{VcdWriter, VarKind, VarOptions};
//!
//! let mut buf = Vec::new();
//! let mut vcd = VcdWriter::new(&mut buf);
//! let clock = vcd.register_var("top", "clock", VarKind::Wire, VarOptions::size(1))?;
//! let data = vcd.register_var("top", "data", VarKind::Wire, VarOptions::size(1))?;
//!
//! vcd.change(&clock, 0, false)?;
//! vcd.change(&data, 0, false)?;
//!
//! vcd.change(&clock, 4, true)?;
//! vcd.change(&data, 4, true)?;
//! vcd.close()?;
//! # Ok::<(), vcdstream::VcdError>(())
//! ```
//!
//! Reading/parsing an existing VCD trace is explicitly out of scope for this
//! crate (see `DESIGN.md`): there is no `Parser` here.

use std::fmt::{self, Display};
use std::io;
use std::str::FromStr;

mod idcode;
pub use idcode::IdCode;

mod value;
pub use value::{ChangeValue, VecValue};

mod scope;
pub use scope::{Scope, ScopeItem, ScopePath};

mod variable;
pub use variable::{VarKind, VarOptions, VarSize, Variable, VarId};

mod writer;
pub use writer::{LastValue, Timestamp, VcdWriter, VcdWriterBuilder};

/// Error returned by any fallible operation on [`VcdWriter`].
///
/// The four kinds mirror the distinct failure categories of the original
/// writer this crate reimplements: an operation attempted in the wrong
/// lifecycle phase, a value that can't be encoded for a variable's kind, a
/// duplicate `(scope, name)` registration, and a caller argument of the
/// wrong shape. `Io` wraps a failure from the underlying sink.
#[derive(Debug)]
pub enum VcdError {
    /// Operation illegal in the writer's current phase, or a timestamp that
    /// moved backwards.
    Phase(String),
    /// A value couldn't be encoded for the variable's kind/size.
    Value(String),
    /// Duplicate `(scope, name)` on `register_var`.
    KeyCollision(String),
    /// Argument of the wrong shape (e.g. a non-string/sequence scope path).
    Type(String),
    /// Failure writing to the underlying sink.
    Io(io::Error),
}

impl Display for VcdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcdError::Phase(msg) => write!(f, "phase error: {msg}"),
            VcdError::Value(msg) => write!(f, "value error: {msg}"),
            VcdError::KeyCollision(msg) => write!(f, "duplicate variable: {msg}"),
            VcdError::Type(msg) => write!(f, "type error: {msg}"),
            VcdError::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for VcdError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VcdError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for VcdError {
    fn from(e: io::Error) -> VcdError {
        VcdError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, VcdError>;

/// A unit of time for the `$timescale` command.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TimescaleUnit {
    S,
    Ms,
    Us,
    Ns,
    Ps,
    Fs,
}

impl FromStr for TimescaleUnit {
    type Err = VcdError;
    fn from_str(s: &str) -> Result<Self> {
        use TimescaleUnit::*;
        match s {
            "s" => Ok(S),
            "ms" => Ok(Ms),
            "us" => Ok(Us),
            "ns" => Ok(Ns),
            "ps" => Ok(Ps),
            "fs" => Ok(Fs),
            _ => Err(VcdError::Value(format!("invalid timescale unit {s:?}"))),
        }
    }
}

impl Display for TimescaleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TimescaleUnit::*;
        write!(
            f,
            "{}",
            match *self {
                S => "s",
                Ms => "ms",
                Us => "us",
                Ns => "ns",
                Ps => "ps",
                Fs => "fs",
            }
        )
    }
}

/// A `(magnitude, unit)` pair for the `$timescale` command, e.g. `1 us`.
///
/// Immutable after construction. Accepts either a string such as `"1 us"`,
/// `"us"` (magnitude defaults to 1), `"100ps"` (no space needed), or a
/// `(magnitude, unit)` pair directly.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Timescale {
    pub magnitude: u32,
    pub unit: TimescaleUnit,
}

const VALID_MAGNITUDES: [u32; 3] = [1, 10, 100];

impl Timescale {
    pub fn new(magnitude: u32, unit: TimescaleUnit) -> Result<Timescale> {
        if !VALID_MAGNITUDES.contains(&magnitude) {
            return Err(VcdError::Value(format!(
                "invalid timescale magnitude {magnitude}, must be 1, 10 or 100"
            )));
        }
        Ok(Timescale { magnitude, unit })
    }
}

impl Default for Timescale {
    fn default() -> Timescale {
        Timescale {
            magnitude: 1,
            unit: TimescaleUnit::Us,
        }
    }
}

impl FromStr for Timescale {
    type Err = VcdError;

    /// Parses `"1 us"`, `"us"` (magnitude defaults to 1), or `"100ps"`
    /// (whitespace between magnitude and unit is optional).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let split_at = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(0);
        let (mag_str, unit_str) = s.split_at(split_at);
        let unit_str = unit_str.trim_start();
        let magnitude = if mag_str.is_empty() {
            1
        } else {
            mag_str
                .parse()
                .map_err(|_| VcdError::Value(format!("invalid timescale magnitude in {s:?}")))?
        };
        let unit = unit_str.parse()?;
        Timescale::new(magnitude, unit)
    }
}

impl TryFrom<(u32, &str)> for Timescale {
    type Error = VcdError;
    fn try_from((magnitude, unit): (u32, &str)) -> Result<Timescale> {
        Timescale::new(magnitude, unit.parse()?)
    }
}

impl TryFrom<(u32, TimescaleUnit)> for Timescale {
    type Error = VcdError;
    fn try_from((magnitude, unit): (u32, TimescaleUnit)) -> Result<Timescale> {
        Timescale::new(magnitude, unit)
    }
}

impl Display for Timescale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.magnitude, self.unit)
    }
}

/// A type of scope, as used in the `$scope` command.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ScopeType {
    Module,
    Task,
    Function,
    Begin,
    Fork,
}

impl Default for ScopeType {
    fn default() -> ScopeType {
        ScopeType::Module
    }
}

impl FromStr for ScopeType {
    type Err = VcdError;
    fn from_str(s: &str) -> Result<Self> {
        use ScopeType::*;
        match s {
            "module" => Ok(Module),
            "task" => Ok(Task),
            "function" => Ok(Function),
            "begin" => Ok(Begin),
            "fork" => Ok(Fork),
            _ => Err(VcdError::Value(format!("invalid scope type {s:?}"))),
        }
    }
}

impl Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ScopeType::*;
        write!(
            f,
            "{}",
            match *self {
                Module => "module",
                Task => "task",
                Function => "function",
                Begin => "begin",
                Fork => "fork",
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timescale_from_str() {
        assert_eq!(
            "1 us".parse::<Timescale>().unwrap(),
            Timescale::new(1, TimescaleUnit::Us).unwrap()
        );
        assert_eq!(
            "us".parse::<Timescale>().unwrap(),
            Timescale::new(1, TimescaleUnit::Us).unwrap()
        );
        assert_eq!(
            "100ps".parse::<Timescale>().unwrap(),
            Timescale::new(100, TimescaleUnit::Ps).unwrap()
        );
        assert!("2 us".parse::<Timescale>().is_err());
        assert!("1 Gs".parse::<Timescale>().is_err());
    }

    #[test]
    fn timescale_display() {
        assert_eq!(Timescale::default().to_string(), "1 us");
        assert_eq!(
            Timescale::new(10, TimescaleUnit::Fs).unwrap().to_string(),
            "10 fs"
        );
    }

    #[test]
    fn scope_type_roundtrip() {
        for s in ["module", "task", "function", "begin", "fork"] {
            assert_eq!(s.parse::<ScopeType>().unwrap().to_string(), s);
        }
        assert!("InVaLiD".parse::<ScopeType>().is_err());
    }
}
