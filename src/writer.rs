use compact_str::CompactString;
use std::io;

use crate::scope::{Scope, ScopePath, ScopeTree, VarDecl};
use crate::variable::{derive_shape, format_value, Shape, StoredValue, VarId, VarKind, VarOptions, Variable};
use crate::{ChangeValue, IdCode, Result, ScopeType, Timescale, VcdError};

/// A simulation timestamp. The writer only ever moves this forward.
pub type Timestamp = u64;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Phase {
    Registration,
    Body,
    Closed,
}

struct RegisteredVar {
    ident: IdCode,
    shape: Shape,
    last_value: StoredValue,
}

fn write_line<W: io::Write>(sink: &mut W, line: &str) -> Result<()> {
    sink.write_all(line.as_bytes())?;
    sink.write_all(b"\n")?;
    Ok(())
}

fn emit_scope<W: io::Write>(sink: &mut W, scope: &Scope) -> Result<()> {
    write_line(sink, &format!("$scope {} {} $end", scope.kind(), scope.name()))?;
    for v in &scope.vars {
        write_line(
            sink,
            &format!("$var {} {} {} {} $end", v.kind, v.size.total_width(), v.ident, v.name),
        )?;
    }
    for child in &scope.children {
        emit_scope(sink, child)?;
    }
    write_line(sink, "$upscope $end")
}

/// Renders the wire lexeme for a change, including the `event` case
/// (`1<ident>`), which never appears in a snapshot but is always emitted
/// live while dumping.
fn render_value_line(value: &StoredValue, ident: IdCode) -> String {
    match value {
        StoredValue::Scalar(c) => format!("{c}{ident}"),
        StoredValue::Vector(bits) => format!("b{bits} {ident}"),
        StoredValue::Real(f) => format!("r{f} {ident}"),
        StoredValue::Str(s) => format!("s{s} {ident}"),
        StoredValue::Event => format!("1{ident}"),
    }
}

/// As [`render_value_line`], but used for `$dumpvars`/`$dumpon` snapshots,
/// which omit events entirely.
fn render_snapshot_line(value: &StoredValue, ident: IdCode) -> Option<String> {
    match value {
        StoredValue::Event => None,
        other => Some(render_value_line(other, ident)),
    }
}

/// The `$dumpoff` snapshot sets every non-event, non-real, non-string
/// variable to all-unknown; reals and strings have no "unknown" wire form
/// and are omitted, same as events.
fn render_dumpoff_line(shape: &Shape, ident: IdCode) -> Option<String> {
    match shape {
        Shape::Scalar => Some(format!("x{ident}")),
        Shape::Vector(_) | Shape::Compound(_) => Some(format!("bx {ident}")),
        Shape::Real | Shape::Str | Shape::Event => None,
    }
}

/// A read-only view of a variable's last emitted (or stored) value, as
/// returned by [`VcdWriter::last_value`].
#[derive(Debug, Copy, Clone)]
pub enum LastValue<'a> {
    Scalar(char),
    Vector(&'a str),
    Real(f64),
    Str(&'a str),
    /// Events carry no persistent state.
    Event,
}

/// Builder for [`VcdWriter`], collecting the header metadata and tuning
/// knobs a VCD writer's constructor typically takes as keyword arguments.
pub struct VcdWriterBuilder<W: io::Write> {
    sink: W,
    timescale: Timescale,
    date: Option<CompactString>,
    comment: CompactString,
    version: CompactString,
    default_scope_type: ScopeType,
    scope_sep: char,
    check_values: bool,
    init_timestamp: Timestamp,
}

impl<W: io::Write> VcdWriterBuilder<W> {
    pub fn new(sink: W) -> VcdWriterBuilder<W> {
        VcdWriterBuilder {
            sink,
            timescale: Timescale::default(),
            date: None,
            comment: CompactString::new(""),
            version: CompactString::new(""),
            default_scope_type: ScopeType::default(),
            scope_sep: '.',
            check_values: true,
            init_timestamp: 0,
        }
    }

    pub fn timescale(mut self, timescale: Timescale) -> Self {
        self.timescale = timescale;
        self
    }

    /// Sets the `$date` text. Omitted entirely if never called, or if
    /// called with an empty string — there is no implicit wall-clock
    /// default since the clock is an external collaborator of this crate
    /// (see DESIGN.md).
    pub fn date(mut self, date: impl Into<CompactString>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<CompactString>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Accepts a multi-line string (joined by `\n`); emitted as a
    /// multi-line `$version` block when it contains a newline.
    pub fn version(mut self, version: impl Into<CompactString>) -> Self {
        self.version = version.into();
        self
    }

    pub fn default_scope_type(mut self, kind: ScopeType) -> Self {
        self.default_scope_type = kind;
        self
    }

    pub fn scope_sep(mut self, sep: char) -> Self {
        self.scope_sep = sep;
        self
    }

    /// When `false`, skips the numeric range/finiteness validation that
    /// the value formatters otherwise perform, trading safety for speed.
    pub fn check_values(mut self, check: bool) -> Self {
        self.check_values = check;
        self
    }

    pub fn init_timestamp(mut self, t: Timestamp) -> Self {
        self.init_timestamp = t;
        self
    }

    pub fn build(self) -> VcdWriter<W> {
        VcdWriter {
            sink: self.sink,
            phase: Phase::Registration,
            dumping: true,
            t_cur: self.init_timestamp,
            init_timestamp: self.init_timestamp,
            comment: self.comment,
            date: self.date,
            timescale: self.timescale,
            version: self.version,
            scope_sep: self.scope_sep,
            check_values: self.check_values,
            scopes: ScopeTree::new(self.default_scope_type),
            registry: Vec::new(),
        }
    }
}

/// A streaming writer of VCD (Value Change Dump) byte streams.
///
/// Drives the phase state machine (registration -> body -> closed) and
/// the dump on/off sub-state described in the crate's top-level docs;
/// `W` is any `io::Write` sink, written to one line at a time.
pub struct VcdWriter<W: io::Write> {
    sink: W,
    phase: Phase,
    dumping: bool,
    t_cur: Timestamp,
    init_timestamp: Timestamp,

    comment: CompactString,
    date: Option<CompactString>,
    timescale: Timescale,
    version: CompactString,
    scope_sep: char,
    check_values: bool,

    scopes: ScopeTree,
    registry: Vec<RegisteredVar>,
}

impl<W: io::Write> VcdWriter<W> {
    /// Shorthand for `VcdWriterBuilder::new(sink).build()` — default
    /// header metadata, `1 us` timescale, `init_timestamp = 0`.
    pub fn new(sink: W) -> VcdWriter<W> {
        VcdWriterBuilder::new(sink).build()
    }

    pub fn builder(sink: W) -> VcdWriterBuilder<W> {
        VcdWriterBuilder::new(sink)
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        write_line(&mut self.sink, line)
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.phase == Phase::Closed {
            clilog::warn!(VCD_OP_AFTER_CLOSE, "operation attempted on a closed writer");
            return Err(VcdError::Phase("writer is closed".into()));
        }
        Ok(())
    }

    fn check_time_order(&self, t: Timestamp) -> Result<()> {
        self.ensure_not_closed()?;
        if t < self.t_cur {
            clilog::warn!(
                VCD_TIME_WENT_BACKWARDS,
                "timestamp {t} precedes the current time {}",
                self.t_cur
            );
            return Err(VcdError::Phase(format!(
                "timestamp {t} precedes the current time {}",
                self.t_cur
            )));
        }
        Ok(())
    }

    /// Finalizes the header the first time it is called; a no-op on every
    /// subsequent call (`self.phase` is no longer `Registration`).
    fn finalize_header(&mut self) -> Result<()> {
        if self.phase != Phase::Registration {
            return Ok(());
        }

        if !self.comment.is_empty() {
            let line = format!("$comment {} $end", self.comment);
            self.write_line(&line)?;
        }
        if let Some(date) = self.date.clone() {
            if !date.is_empty() {
                self.write_line(&format!("$date {date} $end"))?;
            }
        }
        self.write_line(&format!("$timescale {} $end", self.timescale))?;
        if !self.version.is_empty() {
            if self.version.contains('\n') {
                self.write_line("$version")?;
                let version = self.version.clone();
                for line in version.split('\n') {
                    self.write_line(&format!("\t{line}"))?;
                }
                self.write_line("$end")?;
            } else {
                let line = format!("$version {} $end", self.version);
                self.write_line(&line)?;
            }
        }

        for root in self.scopes.roots() {
            emit_scope(&mut self.sink, root)?;
        }
        self.write_line("$enddefinitions $end")?;

        self.write_line(&format!("#{}", self.init_timestamp))?;
        self.write_line("$dumpvars")?;
        for entry in &self.registry {
            if let Some(line) = render_snapshot_line(&entry.last_value, entry.ident) {
                write_line(&mut self.sink, &line)?;
            }
        }
        self.write_line("$end")?;

        self.t_cur = self.init_timestamp;
        self.phase = Phase::Body;
        clilog::debug!(VCD_HEADER_DONE, "vcd header finalized at t={}", self.init_timestamp);
        Ok(())
    }

    /// The shared prelude for `dump_on`/`dump_off`/`flush`/`close`: checks
    /// time order, finalizes the header unconditionally, then emits a
    /// `#t` marker if time is actually advancing.
    fn advance_time_for_control(&mut self, t: Timestamp) -> Result<()> {
        self.check_time_order(t)?;
        self.finalize_header()?;
        if t > self.t_cur {
            self.write_line(&format!("#{t}"))?;
            self.t_cur = t;
        }
        Ok(())
    }

    /// Registers a new variable. Only legal while the header is still
    /// pending (before the first time-advancing `change`/`flush`/`dump_*`
    /// or an explicit `close`).
    pub fn register_var(
        &mut self,
        scope: impl ScopePath,
        name: impl Into<CompactString>,
        kind: VarKind,
        options: VarOptions,
    ) -> Result<Variable> {
        if self.phase != Phase::Registration {
            clilog::warn!(
                VCD_LATE_REGISTRATION,
                "attempted to register a variable after the header was finalized"
            );
            return Err(VcdError::Phase(
                "variables can only be registered before the header is finalized".into(),
            ));
        }
        let name = name.into();
        let components = scope.into_components(self.scope_sep)?;
        let (shape, resolved_size) = derive_shape(kind, options.size)?;

        // All of the above, plus the duplicate-name lookup and the init
        // value's own formatting below, must succeed before the scope tree
        // is touched: `ensure_path` creates missing intermediate scopes as a
        // side effect, and an early `?` return here must not leave behind an
        // empty scope node for a registration that never actually happened.
        if self
            .scopes
            .find(&components)
            .is_some_and(|s| s.vars.iter().any(|v| v.name == name))
        {
            clilog::warn!(
                VCD_DUPLICATE_VAR,
                "duplicate variable {name:?} in scope {components:?}"
            );
            return Err(VcdError::KeyCollision(format!(
                "duplicate variable {name:?} in scope {components:?}"
            )));
        }

        let ident = options.ident.unwrap_or_else(|| IdCode(self.registry.len() as u64));
        let last_value = match options.init {
            Some(v) => format_value(&shape, &v, self.check_values)?,
            None => StoredValue::default_for(&shape),
        };

        let id = VarId(self.registry.len() as u32);
        self.registry.push(RegisteredVar {
            ident,
            shape: shape.clone(),
            last_value,
        });

        self.scopes.ensure_path(&components)?.vars.push(VarDecl {
            id,
            ident,
            name: name.clone(),
            kind,
            size: resolved_size,
        });

        Ok(Variable { id, ident, name, kind })
    }

    /// Overrides the scope kind at `path` (default: the writer's
    /// `default_scope_type`, `module`). Creates intermediate scopes as
    /// needed, same as `register_var`.
    pub fn set_scope_type(&mut self, scope: impl ScopePath, kind: ScopeType) -> Result<()> {
        self.ensure_not_closed()?;
        let components = scope.into_components(self.scope_sep)?;
        self.scopes.set_kind(&components, kind)
    }

    /// Records a value change for `var` at time `t`.
    pub fn change(&mut self, var: &Variable, t: Timestamp, value: impl Into<ChangeValue>) -> Result<()> {
        self.check_time_order(t)?;
        if t > self.t_cur {
            self.finalize_header()?;
            self.write_line(&format!("#{t}"))?;
            self.t_cur = t;
        }

        let value = value.into();
        let idx = var.id.0 as usize;
        let shape = self.registry[idx].shape.clone();
        let formatted = format_value(&shape, &value, self.check_values)?;
        let is_event = matches!(formatted, StoredValue::Event);

        // Deferred to the header's own initial snapshot: a change at
        // t == t_cur == init_timestamp before the header is finalized
        // only updates state, it never writes a line of its own.
        if !self.dumping || self.phase != Phase::Body {
            if !is_event {
                self.registry[idx].last_value = formatted;
            }
            return Ok(());
        }

        let suppress = !is_event && self.registry[idx].last_value == formatted;
        if !suppress {
            let ident = self.registry[idx].ident;
            let line = render_value_line(&formatted, ident);
            self.write_line(&line)?;
        } else {
            clilog::trace!(VCD_CHANGE_DEDUP, "suppressed duplicate change at t={t}");
        }
        if !is_event {
            self.registry[idx].last_value = formatted;
        }
        Ok(())
    }

    /// Switches off value-line emission: subsequent `change`s still update
    /// stored state but write nothing until the matching `dump_on`.
    pub fn dump_off(&mut self, t: Timestamp) -> Result<()> {
        if !self.dumping {
            self.check_time_order(t)?;
            return Ok(());
        }
        self.advance_time_for_control(t)?;
        self.write_line("$dumpoff")?;
        for i in 0..self.registry.len() {
            let (shape, ident) = (self.registry[i].shape.clone(), self.registry[i].ident);
            if let Some(line) = render_dumpoff_line(&shape, ident) {
                self.write_line(&line)?;
            }
        }
        self.write_line("$end")?;
        self.dumping = false;
        clilog::debug!(VCD_DUMP_OFF, "dump_off at t={t}");
        Ok(())
    }

    /// Resumes value-line emission, replaying a full snapshot of every
    /// non-event variable's current stored value.
    pub fn dump_on(&mut self, t: Timestamp) -> Result<()> {
        if self.dumping {
            self.check_time_order(t)?;
            return Ok(());
        }
        self.advance_time_for_control(t)?;
        self.write_line("$dumpon")?;
        for i in 0..self.registry.len() {
            let ident = self.registry[i].ident;
            let value = self.registry[i].last_value.clone();
            if let Some(line) = render_snapshot_line(&value, ident) {
                self.write_line(&line)?;
            }
        }
        self.write_line("$end")?;
        self.dumping = true;
        clilog::debug!(VCD_DUMP_ON, "dump_on at t={t}");
        Ok(())
    }

    fn flush_impl(&mut self, t: Option<Timestamp>) -> Result<()> {
        self.ensure_not_closed()?;
        match t {
            Some(t) => self.advance_time_for_control(t)?,
            None => self.finalize_header()?,
        }
        self.sink.flush()?;
        Ok(())
    }

    /// Finalizes the header if pending and forwards any buffered bytes to
    /// the sink, without advancing time.
    pub fn flush(&mut self) -> Result<()> {
        self.flush_impl(None)
    }

    /// As [`VcdWriter::flush`], additionally advancing `t_cur` to `t`
    /// (which must be `>= t_cur`).
    pub fn flush_at(&mut self, t: Timestamp) -> Result<()> {
        self.flush_impl(Some(t))
    }

    fn close_impl(&mut self, t: Option<Timestamp>) -> Result<()> {
        if self.phase == Phase::Closed {
            return Ok(());
        }
        if let Some(t) = t {
            self.check_time_order(t)?;
        }
        self.finalize_header()?;
        if let Some(t) = t {
            if t > self.t_cur {
                self.write_line(&format!("#{t}"))?;
                self.t_cur = t;
            }
        }
        self.sink.flush()?;
        self.phase = Phase::Closed;
        clilog::debug!(VCD_CLOSE, "vcd writer closed at t={}", self.t_cur);
        Ok(())
    }

    /// Closes the writer. Idempotent: a second call is a no-op. Finalizes
    /// the header first if it was never finalized (an empty writer still
    /// produces a well-formed, var-less VCD file).
    pub fn close(&mut self) -> Result<()> {
        self.close_impl(None)
    }

    /// As [`VcdWriter::close`], first advancing time to `t`.
    pub fn close_at(&mut self, t: Timestamp) -> Result<()> {
        self.close_impl(Some(t))
    }

    /// The variable's last emitted (or, while not dumping, last stored)
    /// value.
    pub fn last_value(&self, var: &Variable) -> LastValue<'_> {
        match &self.registry[var.id.0 as usize].last_value {
            StoredValue::Scalar(c) => LastValue::Scalar(*c),
            StoredValue::Vector(s) => LastValue::Vector(s.as_str()),
            StoredValue::Real(f) => LastValue::Real(*f),
            StoredValue::Str(s) => LastValue::Str(s.as_str()),
            StoredValue::Event => LastValue::Event,
        }
    }

    /// The writer's current time.
    pub fn time(&self) -> Timestamp {
        self.t_cur
    }

    /// Whether the writer is currently emitting value lines.
    pub fn is_dumping(&self) -> bool {
        self.dumping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VarOptions;

    fn lines(buf: &[u8]) -> Vec<String> {
        std::str::from_utf8(buf)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn empty_writer_with_no_date() {
        let mut buf = Vec::new();
        let mut vcd = VcdWriter::new(&mut buf);
        vcd.close().unwrap();
        assert_eq!(
            lines(&buf),
            vec!["$timescale 1 us $end", "$enddefinitions $end", "#0", "$dumpvars", "$end"]
        );
    }

    #[test]
    fn deferred_change_folds_into_initial_snapshot() {
        let mut buf = Vec::new();
        let mut vcd = VcdWriter::new(&mut buf);
        let foo = vcd
            .register_var("sss", "nnn", VarKind::Integer, VarOptions::size(32).with_ident(IdCode(0)))
            .unwrap();
        vcd.change(&foo, 0, 0).unwrap();
        vcd.change(&foo, 1, 10).unwrap();
        let out = lines(&buf);
        assert_eq!(out.last().unwrap(), "b1010 !");
    }

    #[test]
    fn vector_signed_round_trip() {
        let mut buf = Vec::new();
        let mut vcd = VcdWriter::new(&mut buf);
        let v = vcd
            .register_var("top", "v", VarKind::Wire, VarOptions::size(3))
            .unwrap();
        for (t, value) in [(1u64, -4i64), (2, -3), (3, -2), (4, -1)] {
            vcd.change(&v, t, value).unwrap();
        }
        vcd.close().unwrap();
        let out = lines(&buf);
        assert!(out.contains(&format!("b100 {}", v.ident())));
        assert!(out.contains(&format!("b111 {}", v.ident())));
    }

    #[test]
    fn compound_vector_change() {
        let mut buf = Vec::new();
        let mut vcd = VcdWriter::new(&mut buf);
        let c = vcd
            .register_var("top", "v", VarKind::Integer, VarOptions::size(vec![8, 4, 1]))
            .unwrap();
        vcd.change(&c, 1, [0xFi32, 0, -1]).unwrap();
        vcd.close().unwrap();
        let out = lines(&buf);
        assert!(out.iter().any(|l| l == &format!("b111100001 {}", c.ident())));
    }

    #[test]
    fn dump_off_before_any_change_snapshots_init() {
        let mut buf = Vec::new();
        let mut vcd = VcdWriter::new(&mut buf);
        vcd.register_var("top", "v", VarKind::Wire, VarOptions::size(3).with_init(-1))
            .unwrap();
        vcd.dump_off(1).unwrap();
        vcd.close().unwrap();
        let out = lines(&buf);
        assert!(out.contains(&"b111 !".to_string()));
        assert_eq!(out[out.len() - 3], "$dumpoff");
        assert_eq!(out[out.len() - 2], "bx !");
        assert_eq!(out[out.len() - 1], "$end");
    }

    #[test]
    fn event_changes_emit_every_time_and_never_dedup() {
        let mut buf = Vec::new();
        let mut vcd = VcdWriter::new(&mut buf);
        let ev = vcd.register_var("top", "ev", VarKind::Event, VarOptions::new()).unwrap();
        for t in [1u64, 2, 2, 3] {
            vcd.change(&ev, t, true).unwrap();
        }
        vcd.close().unwrap();
        let out = lines(&buf);
        let hits: Vec<_> = out.iter().filter(|l| l.starts_with('1')).collect();
        assert_eq!(hits.len(), 4);
        assert!(out.contains(&"#1".to_string()));
        assert!(out.contains(&"#2".to_string()));
        assert!(out.contains(&"#3".to_string()));
    }

    #[test]
    fn close_is_idempotent() {
        let mut buf = Vec::new();
        let mut vcd = VcdWriter::new(&mut buf);
        vcd.close().unwrap();
        vcd.close().unwrap();
        assert!(vcd.register_var("top", "v", VarKind::Wire, VarOptions::size(1)).is_err());
    }

    #[test]
    fn registration_after_time_advance_is_a_phase_error() {
        let mut buf = Vec::new();
        let mut vcd = VcdWriter::new(&mut buf);
        let v = vcd
            .register_var("top", "v", VarKind::Wire, VarOptions::size(1))
            .unwrap();
        vcd.change(&v, 1, true).unwrap();
        assert!(matches!(
            vcd.register_var("top", "w", VarKind::Wire, VarOptions::size(1)),
            Err(VcdError::Phase(_))
        ));
    }

    #[test]
    fn dedup_suppresses_repeated_scalar_changes() {
        let mut buf = Vec::new();
        let mut vcd = VcdWriter::new(&mut buf);
        let v = vcd
            .register_var("top", "v", VarKind::Wire, VarOptions::size(1))
            .unwrap();
        vcd.change(&v, 1, true).unwrap();
        vcd.change(&v, 2, true).unwrap();
        vcd.close().unwrap();
        let out = lines(&buf);
        let ones: Vec<_> = out.iter().filter(|l| l.ends_with(&v.ident().to_string()) && l.starts_with('1')).collect();
        assert_eq!(ones.len(), 1);
    }
}
