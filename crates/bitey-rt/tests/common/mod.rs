//! Native fixtures shared by the integration tests: a handful of
//! `extern "C"` functions exported from this test binary, plus the metadata
//! a toolchain would report for them.

#![allow(dead_code)]

use bitey_meta::{Encoding, MetadataBuilder, ModuleMetadata, Qualifier};
use bitey_rt::Artifact;
use std::ffi::{c_char, CStr};
use std::sync::atomic::{AtomicI32, Ordering};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

pub extern "C" fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

pub extern "C" fn make_point(x: i32, y: i32) -> Point {
    Point { x, y }
}

pub extern "C" fn manhattan(p: Point) -> i64 {
    i64::from(p.x.abs()) + i64::from(p.y.abs())
}

pub extern "C" fn greet_len(name: *const c_char) -> u32 {
    // SAFETY: the binding passes a NUL-terminated copy.
    unsafe { CStr::from_ptr(name) }.to_bytes().len() as u32
}

pub static COUNTER: AtomicI32 = AtomicI32::new(0);

pub extern "C" fn bump(by: i32) -> i32 {
    COUNTER.fetch_add(by, Ordering::SeqCst) + by
}

pub extern "C" fn half(v: f64) -> f64 {
    v / 2.0
}

/// Stand-in for a variadic export; it is never called.
pub extern "C" fn log_message(_fmt: *const c_char) {}

pub static mut ORIGIN: Point = Point { x: 3, y: -4 };

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Metadata for the fixtures, in export order:
/// `add`, `make_point`, `manhattan`, `greet_len`, `log_message` (variadic),
/// `pick` (union parameter, unsupported), `half`, `origin` (variable),
/// `bump`.
pub fn fixture_metadata() -> ModuleMetadata {
    let mut builder = MetadataBuilder::new();
    let int = builder.base("int", Encoding::Signed, 32);
    let uint = builder.base("unsigned int", Encoding::Unsigned, 32);
    let long = builder.base("long", Encoding::Signed, 64);
    let double = builder.base("double", Encoding::Float, 64);
    let chr = builder.base("char", Encoding::SignedChar, 8);
    let const_chr = builder.qualified(Qualifier::Const, chr);
    let string = builder.pointer(Some(const_chr));
    let point = builder.structure(Some("Point"), &[("x", int), ("y", int)]);
    let point_t = builder.typedef("point_t", point);
    let shape = builder.node(bitey_meta::TypeNode::Union {
        name: Some("Shape".to_string()),
        size_bits: Some(64),
        members: None,
    });

    let add = builder.subroutine(&[int, int], Some(int), false);
    let make_point = builder.subroutine(&[int, int], Some(point_t), false);
    let manhattan = builder.subroutine(&[point], Some(long), false);
    let greet_len = builder.subroutine(&[string], Some(uint), false);
    let log_message = builder.subroutine(&[string], None, true);
    let pick = builder.subroutine(&[shape], Some(int), false);
    let half = builder.subroutine(&[double], Some(double), false);
    let bump = builder.subroutine(&[int], Some(int), false);

    builder
        .function("add", add)
        .function("make_point", make_point)
        .function("manhattan", manhattan)
        .function("greet_len", greet_len)
        .function("log_message", log_message)
        .function("pick", pick)
        .function("half", half)
        .variable("origin", point)
        .function("bump", bump);
    builder.finish()
}

pub fn fixture_exports() -> Vec<(&'static str, *const u8)> {
    vec![
        ("add", add as *const u8),
        ("make_point", make_point as *const u8),
        ("manhattan", manhattan as *const u8),
        ("greet_len", greet_len as *const u8),
        ("log_message", log_message as *const u8),
        ("half", half as *const u8),
        ("origin", std::ptr::addr_of!(ORIGIN) as *const u8),
        ("bump", bump as *const u8),
    ]
}

pub fn fixture_artifact(name: &str) -> Artifact {
    Artifact::host(name, fixture_metadata(), fixture_exports())
}
