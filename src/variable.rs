use compact_str::CompactString;
use std::fmt::{self, Display};
use std::str::FromStr;

use crate::value::{format_compound_bits, format_event, format_real, format_scalar, format_string, format_vector_bits};
use crate::{ChangeValue, IdCode, Result, VcdError};

/// The closed set of variable kinds recognized by `$var`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VarKind {
    Wire,
    Reg,
    Integer,
    Real,
    Realtime,
    Time,
    Event,
    String,
    Tri,
    TriAnd,
    TriOr,
    TriReg,
    Tri0,
    Tri1,
    WAnd,
    WOr,
    Supply0,
    Supply1,
    Parameter,
}

impl FromStr for VarKind {
    type Err = VcdError;
    fn from_str(s: &str) -> Result<Self> {
        use VarKind::*;
        Ok(match s {
            "wire" => Wire,
            "reg" => Reg,
            "integer" => Integer,
            "real" => Real,
            "realtime" => Realtime,
            "time" => Time,
            "event" => Event,
            "string" => String,
            "tri" => Tri,
            "triand" => TriAnd,
            "trior" => TriOr,
            "trireg" => TriReg,
            "tri0" => Tri0,
            "tri1" => Tri1,
            "wand" => WAnd,
            "wor" => WOr,
            "supply0" => Supply0,
            "supply1" => Supply1,
            "parameter" => Parameter,
            _ => return Err(VcdError::Value(format!("unknown variable kind {s:?}"))),
        })
    }
}

impl Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use VarKind::*;
        write!(
            f,
            "{}",
            match *self {
                Wire => "wire",
                Reg => "reg",
                Integer => "integer",
                Real => "real",
                Realtime => "realtime",
                Time => "time",
                Event => "event",
                String => "string",
                Tri => "tri",
                TriAnd => "triand",
                TriOr => "trior",
                TriReg => "trireg",
                Tri0 => "tri0",
                Tri1 => "tri1",
                WAnd => "wand",
                WOr => "wor",
                Supply0 => "supply0",
                Supply1 => "supply1",
                Parameter => "parameter",
            }
        )
    }
}

/// The declared size of a variable: a single width, or a tuple of field
/// widths for a compound (concatenated) vector.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum VarSize {
    Scalar(u32),
    Compound(Vec<u32>),
}

impl VarSize {
    pub(crate) fn total_width(&self) -> u32 {
        match self {
            VarSize::Scalar(w) => *w,
            VarSize::Compound(ws) => ws.iter().sum(),
        }
    }
}

impl From<u32> for VarSize {
    fn from(w: u32) -> VarSize {
        VarSize::Scalar(w)
    }
}

impl From<Vec<u32>> for VarSize {
    fn from(ws: Vec<u32>) -> VarSize {
        VarSize::Compound(ws)
    }
}

impl<const N: usize> From<[u32; N]> for VarSize {
    fn from(ws: [u32; N]) -> VarSize {
        VarSize::Compound(ws.to_vec())
    }
}

/// Options accepted by [`crate::VcdWriter::register_var`].
///
/// Collects `size`, `init`, and `ident` into a builder struct since Rust
/// has no optional keyword arguments.
#[derive(Debug, Clone, Default)]
pub struct VarOptions {
    pub(crate) size: Option<VarSize>,
    pub(crate) init: Option<ChangeValue>,
    pub(crate) ident: Option<IdCode>,
}

impl VarOptions {
    pub fn new() -> VarOptions {
        VarOptions::default()
    }

    /// Shorthand for `VarOptions::new().with_size(size)`.
    pub fn size(size: impl Into<VarSize>) -> VarOptions {
        VarOptions::new().with_size(size)
    }

    pub fn with_size(mut self, size: impl Into<VarSize>) -> VarOptions {
        self.size = Some(size.into());
        self
    }

    pub fn with_init(mut self, init: impl Into<ChangeValue>) -> VarOptions {
        self.init = Some(init.into());
        self
    }

    /// Pins the ident rather than letting the registry assign the next
    /// one in sequence. Intended for tests that want to assert on a
    /// specific `ident` string.
    pub fn with_ident(mut self, ident: IdCode) -> VarOptions {
        self.ident = Some(ident);
        self
    }
}

/// The internal classification of a variable's value domain, derived from
/// its kind and declared size. Dispatches straight to a value formatter —
/// no further polymorphism is needed.
#[derive(Debug, Clone)]
pub(crate) enum Shape {
    Scalar,
    Vector(u32),
    Compound(Vec<u32>),
    Real,
    Event,
    Str,
}

fn width_or_default(size: &Option<VarSize>, default: u32) -> Result<u32> {
    match size {
        None => Ok(default),
        Some(VarSize::Scalar(w)) => Ok(*w),
        Some(VarSize::Compound(_)) => Err(VcdError::Type(
            "this variable kind does not accept a compound size".into(),
        )),
    }
}

fn shape_from_size(size: VarSize) -> Result<(Shape, VarSize)> {
    match &size {
        VarSize::Scalar(w) => {
            if *w == 0 {
                return Err(VcdError::Value("size must be at least 1".into()));
            }
            let shape = if *w == 1 { Shape::Scalar } else { Shape::Vector(*w) };
            Ok((shape, size))
        }
        VarSize::Compound(widths) => {
            if widths.is_empty() || widths.iter().any(|&w| w == 0) {
                return Err(VcdError::Value(
                    "compound field widths must all be at least 1".into(),
                ));
            }
            Ok((Shape::Compound(widths.clone()), size))
        }
    }
}

/// Derives a variable's internal shape and resolved (possibly defaulted)
/// size from its kind and the caller-supplied size, per spec.md 4.3.
pub(crate) fn derive_shape(kind: VarKind, size: Option<VarSize>) -> Result<(Shape, VarSize)> {
    use VarKind::*;
    match kind {
        Event => Ok((Shape::Event, VarSize::Scalar(width_or_default(&size, 1)?))),
        String => Ok((Shape::Str, VarSize::Scalar(width_or_default(&size, 1)?))),
        Real | Realtime => Ok((Shape::Real, VarSize::Scalar(width_or_default(&size, 64)?))),
        Integer | Time => shape_from_size(size.unwrap_or(VarSize::Scalar(64))),
        _ => {
            let size = size.ok_or_else(|| {
                VcdError::Value(format!("{kind} requires an explicit size"))
            })?;
            shape_from_size(size)
        }
    }
}

/// The canonical last-emitted-value representation used both for dedup
/// comparison on `change` and for re-emitting snapshots on `$dumpon`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StoredValue {
    Scalar(char),
    /// Already-compressed bit string, shared by vector and compound shapes.
    Vector(CompactString),
    Real(f64),
    Str(CompactString),
    Event,
}

impl StoredValue {
    pub(crate) fn default_for(shape: &Shape) -> StoredValue {
        match shape {
            Shape::Scalar => StoredValue::Scalar('x'),
            Shape::Vector(_) | Shape::Compound(_) => StoredValue::Vector(CompactString::new("x")),
            Shape::Real => StoredValue::Real(0.0),
            Shape::Event => StoredValue::Event,
            Shape::Str => StoredValue::Str(CompactString::new("")),
        }
    }
}

/// Formats `value` against `shape`, producing the canonical stored
/// representation (this is also the single validation point: callers
/// surface a returned error as-is). `check_values` gates the expensive
/// numeric-range/finiteness checks (the writer's fast-path mode).
pub(crate) fn format_value(shape: &Shape, value: &ChangeValue, check_values: bool) -> Result<StoredValue> {
    match shape {
        Shape::Scalar => Ok(StoredValue::Scalar(format_scalar(value)?)),
        Shape::Vector(w) => Ok(StoredValue::Vector(format_vector_bits(value, *w, check_values)?)),
        Shape::Compound(widths) => {
            Ok(StoredValue::Vector(format_compound_bits(value, widths, check_values)?))
        }
        Shape::Real => Ok(StoredValue::Real(format_real(value, check_values)?)),
        Shape::Event => {
            format_event(value)?;
            Ok(StoredValue::Event)
        }
        Shape::Str => Ok(StoredValue::Str(format_string(value)?)),
    }
}

/// A dense index into the writer's flat variable registry; numerically
/// equal to the variable's [`IdCode`] for idents assigned in sequence.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VarId(pub(crate) u32);

/// An opaque handle to a registered variable, returned by
/// [`crate::VcdWriter::register_var`] and passed back into
/// [`crate::VcdWriter::change`].
///
/// The handle itself is immutable (ident/name/kind never change after
/// registration); the variable's last emitted value lives in the writer's
/// registry and is reachable through [`crate::VcdWriter::last_value`].
#[derive(Debug, Clone)]
pub struct Variable {
    pub(crate) id: VarId,
    pub(crate) ident: IdCode,
    pub(crate) name: CompactString,
    pub(crate) kind: VarKind,
}

impl Variable {
    pub fn ident(&self) -> IdCode {
        self.ident
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VarKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_and_string_default_to_width_one() {
        let (shape, size) = derive_shape(VarKind::Event, None).unwrap();
        assert!(matches!(shape, Shape::Event));
        assert_eq!(size, VarSize::Scalar(1));

        let (shape, size) = derive_shape(VarKind::String, None).unwrap();
        assert!(matches!(shape, Shape::Str));
        assert_eq!(size, VarSize::Scalar(1));
    }

    #[test]
    fn integer_and_time_default_to_64() {
        let (shape, size) = derive_shape(VarKind::Integer, None).unwrap();
        assert!(matches!(shape, Shape::Vector(64)));
        assert_eq!(size, VarSize::Scalar(64));
    }

    #[test]
    fn bit_vector_kinds_require_explicit_size() {
        assert!(derive_shape(VarKind::Wire, None).is_err());
        let (shape, _) = derive_shape(VarKind::Wire, Some(VarSize::Scalar(1))).unwrap();
        assert!(matches!(shape, Shape::Scalar));
        let (shape, _) = derive_shape(VarKind::Wire, Some(VarSize::Scalar(8))).unwrap();
        assert!(matches!(shape, Shape::Vector(8)));
    }

    #[test]
    fn compound_size_on_real_is_a_type_error() {
        assert!(matches!(
            derive_shape(VarKind::Real, Some(VarSize::Compound(vec![1, 2]))),
            Err(VcdError::Type(_))
        ));
    }
}
