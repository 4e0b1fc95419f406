mod common;

use asdl_core::DiagCode;
use asdl_lang::CompileOptions;
use common::TestProject;

const INVERTER: &str = r#"
top: inv
modules:
  inv:
    instances:
      MN: nfet m=1
      MP: pfet m=1
    nets:
      $in:  [MN.g, MP.g]
      $out: [MN.d, MP.d]
      $vss: [MN.s]
      $vdd: [MP.s]
devices:
  nfet:
    ports: [d, g, s]
    backends: { sim.ngspice: { template: "M{name} {ports} nmos m={m}" } }
  pfet:
    ports: [d, g, s]
    backends: { sim.ngspice: { template: "M{name} {ports} pmos m={m}" } }
"#;

#[test]
fn single_inverter_end_to_end() {
    let env = TestProject::new();
    env.add_file("inv.asdl", INVERTER);

    let result = env.compile("inv.asdl");
    assert!(result.is_success(), "{:?}", result.diagnostics);
    let output = result.output.unwrap();
    assert_eq!(output.extension, ".cir");

    let lines: Vec<&str> = output.netlist.lines().collect();
    assert_eq!(lines[0], ".subckt inv in out vss vdd");
    assert_eq!(lines[1], "MMN out in vss nmos m=1");
    assert_eq!(lines[2], "MMP out in vdd pmos m=1");
    assert_eq!(lines[3], ".ends");
}

#[test]
fn flat_top_comments_wrapper_lines() {
    let env = TestProject::new();
    env.add_file("inv.asdl", INVERTER);

    let result = env.compile_with(
        "inv.asdl",
        CompileOptions {
            top_as_subckt: Some(false),
            ..CompileOptions::default()
        },
    );
    assert!(result.is_success(), "{:?}", result.diagnostics);
    let netlist = result.output.unwrap().netlist;
    assert!(netlist.starts_with("* .subckt inv"));
    assert!(netlist.contains("\n* .ends"));
    // The body stays uncommented.
    assert!(netlist.contains("\nMMN out in vss nmos m=1\n"));
}

#[test]
fn tagged_axis_broadcast() {
    let env = TestProject::new();
    env.add_file(
        "ota.asdl",
        r#"
top: ota
modules:
  ota:
    instances:
      MN_IN<diffpair=p|n>: nfet
      MP_LOAD<diffpair=p|n>: pfet
    nets:
      $d<diffpair=p|n>: [MN_IN<diffpair=p|n>.d, MP_LOAD<diffpair=p|n>.d]
devices:
  nfet:
    ports: [d]
    backends: { sim.ngspice: { template: "M{name} {ports} nmos" } }
  pfet:
    ports: [d]
    backends: { sim.ngspice: { template: "M{name} {ports} pmos" } }
"#,
    );
    let result = env.compile("ota.asdl");
    assert!(result.is_success(), "{:?}", result.diagnostics);
    let netlist = result.output.unwrap().netlist;
    let lines: Vec<&str> = netlist.lines().collect();
    assert_eq!(lines[0], ".subckt ota d_p d_n");
    assert_eq!(lines[1], "MMN_IN_p d_p nmos");
    assert_eq!(lines[2], "MMN_IN_n d_n nmos");
    assert_eq!(lines[3], "MMP_LOAD_p d_p pmos");
    assert_eq!(lines[4], "MMP_LOAD_n d_n pmos");
}

#[test]
fn range_expansion_preserves_port_direction() {
    let env = TestProject::new();
    env.add_file(
        "bus.asdl",
        r#"
top: byte
modules:
  byte:
    instances:
      BUF<7:0>: buf
    nets:
      $bus<7:0>: [BUF<7:0>.y]
devices:
  buf:
    ports: [y]
    backends: { sim.ngspice: { template: "B{name} {ports}" } }
"#,
    );
    let result = env.compile("bus.asdl");
    assert!(result.is_success(), "{:?}", result.diagnostics);
    let netlist = result.output.unwrap().netlist;
    assert!(netlist
        .starts_with(".subckt byte bus_7 bus_6 bus_5 bus_4 bus_3 bus_2 bus_1 bus_0"));
}

#[test]
fn unknown_port_suppresses_output() {
    let env = TestProject::new();
    env.add_file(
        "bad.asdl",
        r#"
top: outer
modules:
  someMod:
    nets:
      $a: []
  outer:
    instances: { X: someMod }
    nets:
      $n: [X.z]
"#,
    );
    let result = env.compile("bad.asdl");
    assert!(result.output.is_none());
    let unknown: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.code == DiagCode::UnknownPort)
        .collect();
    assert_eq!(unknown.len(), 1);
    assert!(unknown[0].message.contains("'z'"));
    assert!(unknown[0].message.contains("someMod"));
}

#[test]
fn circular_import_suppresses_output() {
    let env = TestProject::new();
    env.add_file(
        "a.asdl",
        "imports: { b: ./b }\ntop: ma\nmodules: { ma: {} }\n",
    );
    env.add_file("b.asdl", "imports: { a: ./a }\nmodules: { mb: {} }\n");

    let result = env.compile("a.asdl");
    assert!(result.output.is_none());
    let cycles: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| d.code == DiagCode::CircularImport)
        .collect();
    assert_eq!(cycles.len(), 1);
    assert!(cycles[0].message.contains("a -> b -> a"));
}

#[test]
fn imports_resolve_across_files() {
    let env = TestProject::new();
    env.add_file(
        "top.asdl",
        r#"
imports:
  lib: ./cells/devices
top: follower
modules:
  follower:
    instances:
      M1: lib.nfet m=2
    nets:
      $in:  [M1.g]
      $out: [M1.s]
      $vdd: [M1.d]
"#,
    );
    env.add_file(
        "cells/devices.asdl",
        r#"
devices:
  nfet:
    ports: [d, g, s]
    backends: { sim.ngspice: { template: "M{name} {ports} nmos m={m}" } }
"#,
    );
    let result = env.compile("top.asdl");
    assert!(result.is_success(), "{:?}", result.diagnostics);
    let netlist = result.output.unwrap().netlist;
    assert!(netlist.contains("MM1 vdd in out nmos m=2"));
}

#[test]
fn expansion_limit_is_enforced() {
    let env = TestProject::new();
    env.add_file(
        "huge.asdl",
        r#"
top: m
modules:
  m:
    instances:
      A<0:10000>: nfet
devices:
  nfet: { ports: [d, g, s] }
"#,
    );
    let result = env.compile("huge.asdl");
    assert!(result.output.is_none());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == DiagCode::ExpansionTooLarge));
}

#[test]
fn colliding_subckt_names_are_disambiguated() {
    let env = TestProject::new();
    env.add_file(
        "top.asdl",
        r#"
imports:
  a: ./alib
  b: ./blib
top: t
modules:
  t:
    instances:
      U1: a.cell
      U2: b.cell
"#,
    );
    env.add_file("alib.asdl", "modules: { cell: {} }\n");
    env.add_file("blib.asdl", "modules: { cell: {} }\n");

    let result = env.compile("top.asdl");
    assert!(result.is_success(), "{:?}", result.diagnostics);
    let netlist = result.output.unwrap().netlist;
    assert!(netlist.contains(".subckt cell\n"));
    assert!(netlist.contains(".subckt cell_blib\n"));
    assert!(netlist.contains("XU1 cell\n"));
    assert!(netlist.contains("XU2 cell_blib\n"));
}

#[test]
fn graph_dump_reports_hints() {
    let env = TestProject::new();
    env.add_file(
        "m.asdl",
        r#"
top: m
modules:
  m:
    instances:
      A<p|n>: nfet
      B: nfet
    nets:
      mid: [[A<p|n>.d], [B.d]]
devices:
  nfet: { ports: [d, g, s] }
"#,
    );
    let result =
        asdl_lang::dump_graph(&env.root().join("m.asdl"), &CompileOptions::default());
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    let json = result.output.unwrap();
    assert!(json.contains("\"name\": \"mid\""));
    assert!(json.contains("\"hub\": 0"));
}

#[test]
fn determinism_across_runs() {
    let env = TestProject::new();
    env.add_file("inv.asdl", INVERTER);
    let a = env.compile("inv.asdl").output.unwrap().netlist;
    let b = env.compile("inv.asdl").output.unwrap().netlist;
    assert_eq!(a, b);
}

#[test]
fn diagnostics_serialize_to_json() {
    let env = TestProject::new();
    env.add_file("bad.asdl", "top: ghost\nmodules: { m: {} }\n");
    let result = env.compile("bad.asdl");
    assert!(result.output.is_none());
    let json = asdl_lang::diagnostics_to_json(&result.diagnostics);
    assert!(json.contains("\"TopNotFound\""));
    assert!(json.contains("\"severity\": \"error\""));
}
