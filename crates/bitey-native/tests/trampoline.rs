//! Calls real `extern "C"` functions through JIT trampolines.

use bitey_layout::LayoutResolver;
use bitey_native::{MarshalError, NativeCall, NativeError, TrampolineCompiler, Value};
use bitey_types::{StructTable, TypeDescriptor};
use std::ffi::{c_char, CStr};
use std::sync::Arc;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Vec3 {
    x: f32,
    y: f32,
    z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Big {
    a: i64,
    b: i64,
    c: i64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Tagged {
    tag: u8,
    weight: f64,
}

extern "C" fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

extern "C" fn make_point(x: i32, y: i32) -> Point {
    Point { x, y }
}

extern "C" fn scale(v: Vec3, k: f32) -> Vec3 {
    Vec3 { x: v.x * k, y: v.y * k, z: v.z * k }
}

extern "C" fn rotate(big: Big) -> Big {
    Big { a: big.b, b: big.c, c: big.a }
}

extern "C" fn negate_byte(v: i8) -> i8 {
    v.wrapping_neg()
}

extern "C" fn widen(v: u16) -> u64 {
    u64::from(v) << 20
}

#[allow(clippy::too_many_arguments)]
extern "C" fn spill(a: i64, b: i64, c: i64, d: i64, e: i64, f: i64, g: i64, t: Tagged, p: Point) -> f64 {
    (a + b + c + d + e + f + g) as f64 + t.weight * f64::from(t.tag) + f64::from(p.x - p.y)
}

extern "C" fn c_strlen(s: *const c_char) -> u64 {
    // SAFETY: the marshaler always passes a NUL-terminated copy.
    unsafe { CStr::from_ptr(s) }.to_bytes().len() as u64
}

extern "C" fn store_sum(out: *mut i32, a: i32, b: i32) {
    // SAFETY: tests pass the address of a live i32.
    unsafe { *out = a + b };
}

struct Harness {
    structs: StructTable,
    resolver: LayoutResolver,
    compiler: TrampolineCompiler,
}

impl Harness {
    fn new(defs: &[TypeDescriptor]) -> Self {
        let mut structs = StructTable::new();
        for def in defs {
            if let TypeDescriptor::Struct(def) = def {
                structs.insert(def.clone()).unwrap();
            }
        }
        let resolver = LayoutResolver::new(Arc::new(structs.clone())).unwrap();
        Harness { structs, resolver, compiler: TrampolineCompiler::new().unwrap() }
    }

    fn prepare(&mut self, params: Vec<TypeDescriptor>, ret: TypeDescriptor) -> Result<NativeCall, NativeError> {
        let TypeDescriptor::Function(func) = TypeDescriptor::function(params, ret) else {
            unreachable!()
        };
        NativeCall::prepare(&func, &mut self.resolver, &mut self.compiler)
    }

    fn call(&mut self, entry: *const u8, params: Vec<TypeDescriptor>, ret: TypeDescriptor, args: &[Value]) -> Value {
        let call = self.prepare(params, ret).unwrap();
        // SAFETY: every entry point matches the descriptors it is called with.
        unsafe { call.invoke(entry, args, &self.structs) }.unwrap()
    }
}

fn point() -> TypeDescriptor {
    TypeDescriptor::structure(Some("Point"), [("x", TypeDescriptor::i32()), ("y", TypeDescriptor::i32())])
}

fn vec3() -> TypeDescriptor {
    TypeDescriptor::structure(
        Some("Vec3"),
        [("x", TypeDescriptor::f32()), ("y", TypeDescriptor::f32()), ("z", TypeDescriptor::f32())],
    )
}

fn big() -> TypeDescriptor {
    TypeDescriptor::structure(
        Some("Big"),
        [("a", TypeDescriptor::i64()), ("b", TypeDescriptor::i64()), ("c", TypeDescriptor::i64())],
    )
}

fn tagged() -> TypeDescriptor {
    TypeDescriptor::structure(Some("Tagged"), [("tag", TypeDescriptor::u8()), ("weight", TypeDescriptor::f64())])
}

#[test]
fn test_scalar_call() {
    let mut harness = Harness::new(&[]);
    let result = harness.call(
        add as *const u8,
        vec![TypeDescriptor::i32(), TypeDescriptor::i32()],
        TypeDescriptor::i32(),
        &[Value::Int(2), Value::Int(3)],
    );
    assert_eq!(result, Value::Int(5));
}

#[test]
fn test_small_integers_are_extended() {
    let mut harness = Harness::new(&[]);
    let result = harness.call(negate_byte as *const u8, vec![TypeDescriptor::i8()], TypeDescriptor::i8(), &[Value::Int(-7)]);
    assert_eq!(result, Value::Int(7));

    let result = harness.call(widen as *const u8, vec![TypeDescriptor::u16()], TypeDescriptor::u64(), &[Value::UInt(0xffff)]);
    assert_eq!(result, Value::UInt(0xffff << 20));
}

#[test]
fn test_struct_return_in_registers() {
    let mut harness = Harness::new(&[]);
    let result = harness.call(
        make_point as *const u8,
        vec![TypeDescriptor::i32(), TypeDescriptor::i32()],
        point(),
        &[Value::Int(3), Value::Int(-4)],
    );
    assert_eq!(result, Value::structure(Some("Point"), [("x", Value::Int(3)), ("y", Value::Int(-4))]));
}

#[test]
fn test_float_aggregate_round_trip() {
    let mut harness = Harness::new(&[]);
    let input = Value::structure(
        Some("Vec3"),
        [("x", Value::Float(1.0)), ("y", Value::Float(-2.0)), ("z", Value::Float(0.5))],
    );
    let result = harness.call(scale as *const u8, vec![vec3(), TypeDescriptor::f32()], vec3(), &[input, Value::Float(2.0)]);
    assert_eq!(
        result,
        Value::structure(Some("Vec3"), [("x", Value::Float(2.0)), ("y", Value::Float(-4.0)), ("z", Value::Float(1.0))])
    );
}

#[test]
fn test_large_aggregate_by_value_and_hidden_return() {
    let mut harness = Harness::new(&[]);
    let input = Value::structure(Some("Big"), [("a", Value::Int(1)), ("b", Value::Int(2)), ("c", Value::Int(3))]);
    let result = harness.call(rotate as *const u8, vec![big()], big(), &[input]);
    assert_eq!(
        result,
        Value::structure(Some("Big"), [("a", Value::Int(2)), ("b", Value::Int(3)), ("c", Value::Int(1))])
    );
}

#[test]
fn test_arguments_spilled_to_stack() {
    let mut harness = Harness::new(&[]);
    let mut params = vec![TypeDescriptor::i64(); 7];
    params.push(tagged());
    params.push(point());
    let mut args: Vec<Value> = (1..=7).map(Value::Int).collect();
    args.push(Value::structure(Some("Tagged"), [("tag", Value::UInt(2)), ("weight", Value::Float(0.25))]));
    args.push(Value::structure(Some("Point"), [("x", Value::Int(10)), ("y", Value::Int(4))]));

    let result = harness.call(spill as *const u8, params, TypeDescriptor::f64(), &args);
    assert_eq!(result, Value::Float(28.0 + 0.5 + 6.0));
}

#[test]
fn test_string_and_out_pointer_arguments() {
    let mut harness = Harness::new(&[]);
    let result = harness.call(
        c_strlen as *const u8,
        vec![TypeDescriptor::pointer_to(TypeDescriptor::i8())],
        TypeDescriptor::u64(),
        &[Value::from("hello")],
    );
    assert_eq!(result, Value::UInt(5));

    let mut out = 0i32;
    let result = harness.call(
        store_sum as *const u8,
        vec![TypeDescriptor::pointer_to(TypeDescriptor::i32()), TypeDescriptor::i32(), TypeDescriptor::i32()],
        TypeDescriptor::Void,
        &[Value::pointer(&mut out as *mut i32 as usize, TypeDescriptor::i32()), Value::Int(20), Value::Int(22)],
    );
    assert_eq!(result, Value::Void);
    assert_eq!(out, 42);
}

#[test]
fn test_equal_signatures_share_a_trampoline() {
    let mut harness = Harness::new(&[]);
    harness.prepare(vec![TypeDescriptor::i32(), TypeDescriptor::i32()], TypeDescriptor::i32()).unwrap();
    harness.prepare(vec![TypeDescriptor::i32(), TypeDescriptor::i32()], TypeDescriptor::i32()).unwrap();
    harness.prepare(vec![TypeDescriptor::u32(), TypeDescriptor::u32()], TypeDescriptor::u32()).unwrap();
    assert_eq!(harness.compiler.len(), 1);
}

#[test]
fn test_argument_errors() {
    let mut harness = Harness::new(&[]);
    let call = harness.prepare(vec![TypeDescriptor::i32(), TypeDescriptor::i32()], TypeDescriptor::i32()).unwrap();

    // SAFETY: validation fails before the native function is reached.
    let err = unsafe { call.invoke(add as *const u8, &[Value::Int(2), Value::from("x")], &harness.structs) }.unwrap_err();
    assert!(matches!(err, MarshalError::Argument { index: 1, .. }), "{:?}", err);

    let err = unsafe { call.invoke(add as *const u8, &[Value::Int(2)], &harness.structs) }.unwrap_err();
    assert_eq!(err, MarshalError::ArgumentCount { expected: 2, found: 1 });
}

#[test]
fn test_unbindable_signatures() {
    let mut harness = Harness::new(&[]);
    let TypeDescriptor::Function(variadic) =
        TypeDescriptor::variadic_function(vec![TypeDescriptor::pointer_to(TypeDescriptor::i8())], TypeDescriptor::i32())
    else {
        unreachable!()
    };
    assert!(matches!(
        NativeCall::prepare(&variadic, &mut harness.resolver, &mut harness.compiler),
        Err(NativeError::UnsupportedVariadic)
    ));
    assert!(matches!(
        harness.prepare(vec![TypeDescriptor::Void], TypeDescriptor::Void),
        Err(NativeError::UnsupportedType { .. })
    ));
    assert!(matches!(
        harness.prepare(vec![TypeDescriptor::opaque_struct("FILE")], TypeDescriptor::Void),
        Err(NativeError::Layout(_))
    ));
}
