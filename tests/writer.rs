//! end-to-end tests driving VcdWriter against full decoded output

use vcdstream::{ScopeType, Timescale, TimescaleUnit, VarKind, VarOptions, VcdError, VcdWriter};

fn decode(buf: &[u8]) -> Vec<String> {
    std::str::from_utf8(buf).unwrap().lines().map(String::from).collect()
}

#[test]
fn full_header_and_scope_nesting() {
    clilog::init_stdout_simple_trace();
    let mut buf = Vec::new();
    let mut vcd = VcdWriter::builder(&mut buf)
        .timescale(Timescale::new(10, TimescaleUnit::Ns).unwrap())
        .comment("generated for a test")
        .build();

    let clk = vcd
        .register_var("top.cpu", "clk", VarKind::Wire, VarOptions::size(1))
        .unwrap();
    let pc = vcd
        .register_var("top.cpu", "pc", VarKind::Reg, VarOptions::size(8))
        .unwrap();
    vcd.set_scope_type("top.cpu", ScopeType::Module).unwrap();

    vcd.change(&clk, 0, false).unwrap();
    vcd.change(&pc, 0, 0).unwrap();
    vcd.change(&clk, 5, true).unwrap();
    vcd.change(&pc, 5, 1).unwrap();
    vcd.close().unwrap();

    let out = decode(&buf);
    assert_eq!(out[0], "$comment generated for a test $end");
    assert_eq!(out[1], "$timescale 10 ns $end");
    assert_eq!(out[2], "$scope module top $end");
    assert_eq!(out[3], "$scope module cpu $end");
    assert!(out[4].starts_with("$var wire 1 "));
    assert!(out[5].starts_with("$var reg 8 "));
    assert_eq!(out[6], "$upscope $end");
    assert_eq!(out[7], "$upscope $end");
    assert_eq!(out[8], "$enddefinitions $end");
    assert_eq!(out[9], "#0");
    assert_eq!(out[10], "$dumpvars");
    // zero-value scalar and vector both present in the initial snapshot
    assert!(out[11..13].iter().any(|l| l.starts_with('0') && l.ends_with(&clk.ident().to_string())));
    assert!(out[11..13].iter().any(|l| l == &format!("b0 {}", pc.ident())));
    assert_eq!(out[13], "$end");
    assert_eq!(out[14], "#5");
    assert!(out.iter().any(|l| l == &format!("1{}", clk.ident())));
    assert!(out.iter().any(|l| l == &format!("b1 {}", pc.ident())));
}

#[test]
fn trailing_output_ends_with_compressed_vector() {
    let mut buf = Vec::new();
    let mut vcd = VcdWriter::new(&mut buf);
    let foo = vcd
        .register_var("top", "foo", VarKind::Integer, VarOptions::size(32))
        .unwrap();
    vcd.change(&foo, 0, 0).unwrap();
    vcd.change(&foo, 1, 10).unwrap();
    vcd.close().unwrap();

    let out = decode(&buf);
    assert_eq!(out[out.len() - 1], format!("b1010 {}", foo.ident()));
}

#[test]
fn dump_off_then_dump_on_replays_full_snapshot() {
    let mut buf = Vec::new();
    let mut vcd = VcdWriter::new(&mut buf);
    let a = vcd.register_var("top", "a", VarKind::Integer, VarOptions::size(4)).unwrap();
    let ev = vcd.register_var("top", "done", VarKind::Event, VarOptions::new()).unwrap();
    let r = vcd.register_var("top", "r", VarKind::Real, VarOptions::new()).unwrap();

    vcd.change(&a, 1, 5).unwrap();
    vcd.change(&r, 1, 2.5).unwrap();
    vcd.dump_off(2).unwrap();
    vcd.change(&a, 3, 6).unwrap();
    vcd.change(&ev, 3, true).unwrap();
    vcd.dump_on(4).unwrap();
    vcd.close().unwrap();

    let out = decode(&buf);

    let off_idx = out.iter().position(|l| l == "$dumpoff").unwrap();
    assert_eq!(out[off_idx + 1], format!("bx {}", a.ident()));
    assert_eq!(out[off_idx + 2], "$end");

    let on_idx = out.iter().position(|l| l == "$dumpon").unwrap();
    // dump_on replays the latest stored value (updated silently while off)
    assert_eq!(out[on_idx + 1], format!("b110 {}", a.ident()));
    assert_eq!(out[on_idx + 2], format!("r2.5 {}", r.ident()));
    assert_eq!(out[on_idx + 3], "$end");

    // the event fired while dumping was off, so it never reached the sink at all
    assert!(!out.iter().any(|l| l == &format!("1{}", ev.ident())));
}

#[test]
fn timestamps_must_move_forward() {
    let mut buf = Vec::new();
    let mut vcd = VcdWriter::new(&mut buf);
    let v = vcd.register_var("top", "v", VarKind::Wire, VarOptions::size(1)).unwrap();
    vcd.change(&v, 5, true).unwrap();
    assert!(matches!(vcd.change(&v, 3, false), Err(VcdError::Phase(_))));
}

#[test]
fn duplicate_variable_names_collide() {
    let mut buf = Vec::new();
    let mut vcd = VcdWriter::new(&mut buf);
    vcd.register_var("top", "v", VarKind::Wire, VarOptions::size(1)).unwrap();
    assert!(matches!(
        vcd.register_var("top", "v", VarKind::Wire, VarOptions::size(1)),
        Err(VcdError::KeyCollision(_))
    ));
}

#[test]
fn failed_registration_leaves_no_empty_scope_behind() {
    let mut buf = Vec::new();
    let mut vcd = VcdWriter::new(&mut buf);
    let err = vcd.register_var(
        "brand_new_scope",
        "x",
        VarKind::Real,
        VarOptions::new().with_init("not a number"),
    );
    assert!(matches!(err, Err(VcdError::Value(_))));
    vcd.close().unwrap();

    let out = decode(&buf);
    assert!(!out.iter().any(|l| l.contains("brand_new_scope")));
}

#[test]
fn vector_accepts_unsigned_top_half_of_the_range() {
    let mut buf = Vec::new();
    let mut vcd = VcdWriter::new(&mut buf);
    let v = vcd.register_var("top", "v", VarKind::Wire, VarOptions::size(3)).unwrap();
    vcd.change(&v, 1, 7).unwrap();
    vcd.close().unwrap();

    let out = decode(&buf);
    assert!(out.contains(&format!("b111 {}", v.ident())));
}

#[test]
fn string_variable_round_trip() {
    let mut buf = Vec::new();
    let mut vcd = VcdWriter::new(&mut buf);
    let s = vcd.register_var("top", "s", VarKind::String, VarOptions::new()).unwrap();
    vcd.change(&s, 1, "hello").unwrap();
    vcd.dump_off(2).unwrap();
    vcd.close().unwrap();

    let out = decode(&buf);
    assert!(out.iter().any(|l| l == &format!("shello {}", s.ident())));
    // strings are entirely absent from the dumpoff snapshot
    let off_idx = out.iter().position(|l| l == "$dumpoff").unwrap();
    assert_eq!(out[off_idx + 1], "$end");
}
