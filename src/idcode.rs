use compact_str::CompactString;
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::{Result, VcdError};

/// A compact identifier code assigned to a registered variable.
///
/// Codes are handed out densely, in registration order, starting from
/// [`IdCode::FIRST`], using a bijective base-94 numeral system over the
/// printable ASCII range `!` (33) through `~` (126). This is the same
/// density/uniqueness guarantee spec.md calls for: `0..N-1` with no gaps
/// or reuse.
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash)]
pub struct IdCode(pub u64);

const ID_CHAR_MIN: u8 = b'!';
const ID_CHAR_MAX: u8 = b'~';
const NUM_ID_CHARS: u64 = (ID_CHAR_MAX - ID_CHAR_MIN + 1) as u64;

impl IdCode {
    #[inline]
    pub fn new(v: &[u8]) -> Result<IdCode> {
        if v.is_empty() {
            return Err(VcdError::Value("identifier cannot be empty".into()));
        }
        let mut result = 0u64;
        for &i in v.iter() {
            if i < ID_CHAR_MIN || i > ID_CHAR_MAX {
                return Err(VcdError::Value("invalid characters in identifier".into()));
            }
            let c = ((i - ID_CHAR_MIN) as u64) + 1;
            result = result
                .checked_mul(NUM_ID_CHARS)
                .and_then(|x| x.checked_add(c))
                .ok_or_else(|| VcdError::Value("identifier too long".into()))?;
        }
        Ok(IdCode(result - 1))
    }

    /// The identifier assigned to the very first registered variable.
    pub const FIRST: IdCode = IdCode(0);

    /// The identifier that would be assigned to the next registration in
    /// sequence after this one.
    #[inline]
    pub fn next(&self) -> IdCode {
        IdCode(self.0 + 1)
    }

    pub fn to_compact_string(self) -> CompactString {
        let mut i = self.0;
        let mut revname = CompactString::new("");
        loop {
            let r = i % NUM_ID_CHARS;
            revname.push((r as u8 + ID_CHAR_MIN) as char);
            if i < NUM_ID_CHARS {
                break;
            }
            i = i / NUM_ID_CHARS - 1;
        }
        revname.chars().rev().collect()
    }
}

impl FromStr for IdCode {
    type Err = VcdError;
    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        IdCode::new(s.as_bytes())
    }
}

impl From<u32> for IdCode {
    #[inline]
    fn from(i: u32) -> IdCode {
        IdCode(i as u64)
    }
}

impl From<u64> for IdCode {
    #[inline]
    fn from(i: u64) -> IdCode {
        IdCode(i)
    }
}

impl Display for IdCode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_compact_string())
    }
}
