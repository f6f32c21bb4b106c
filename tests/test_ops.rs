use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rstest::rstest;
use sage_graph::backend::memory::MemoryError;
use sage_graph::ops::{BinaryOp, CompareOp, UnaryOp};
use sage_graph::tensor::all_close;
use sage_graph::{
    Backend, BackendKind, ElementType, Error, Function, Graph, HostData, Manager, NodeId,
    RuntimeConfig, TensorView,
};
use std::sync::Arc;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// The backend under test comes from `SAGE_BACKEND` (INTERPRETER when unset).
fn manager() -> Manager {
    init();
    let config = RuntimeConfig::from_env().expect("invalid runtime configuration");
    Manager::new(config).expect("backend is not available")
}

fn upload(m: &Manager, element_type: ElementType, extents: &[usize], data: &HostData) -> Result<TensorView, Error> {
    let view = m.allocate_view(element_type, extents)?;
    let bytes = data.to_bytes();
    view.write(&bytes, 0, bytes.len())?;
    Ok(view)
}

fn download(view: &TensorView) -> Result<HostData, Error> {
    let len = view.size_in_bytes();
    let mut bytes = vec![0u8; len];
    view.read(&mut bytes, 0, len)?;
    Ok(HostData::from_bytes(view.element_type(), &bytes))
}

fn run_on(
    m: &Manager,
    g: &Graph,
    results: &[NodeId],
    params: &[NodeId],
    inputs: &[HostData],
) -> Result<Vec<HostData>, Error> {
    let function = Function::new(g, results, params, "test")?;
    let plan = m.compile(&function)?;

    let input_views = plan
        .parameter_descs()
        .iter()
        .zip(inputs)
        .map(|(desc, data)| upload(m, desc.element_type(), desc.extents(), data))
        .collect::<Result<Vec<_>, Error>>()?;
    let output_views = plan
        .result_descs()
        .iter()
        .map(|desc| m.allocate_view(desc.element_type(), desc.extents()))
        .collect::<Result<Vec<_>, Error>>()?;

    let ins = input_views.iter().collect::<Vec<_>>();
    let outs = output_views.iter().collect::<Vec<_>>();
    m.execute(&plan, &ins, &outs)?;
    output_views.iter().map(download).collect()
}

fn run(g: &Graph, results: &[NodeId], params: &[NodeId], inputs: &[HostData]) -> Vec<HostData> {
    run_on(&manager(), g, results, params, inputs).expect("execution failed")
}

fn as_f32(data: &HostData) -> Vec<f32> {
    match data {
        HostData::F32(v) => v.clone(),
        other => panic!("expected f32 data, got {:?}", other.element_type()),
    }
}

// ******************************** Elementwise ******************************** //

#[rstest]
#[case(BinaryOp::Add, |a: f32, b: f32| a + b)]
#[case(BinaryOp::Subtract, |a: f32, b: f32| a - b)]
#[case(BinaryOp::Multiply, |a: f32, b: f32| a * b)]
#[case(BinaryOp::Divide, |a: f32, b: f32| a / b)]
#[case(BinaryOp::Maximum, |a: f32, b: f32| a.max(b))]
#[case(BinaryOp::Minimum, |a: f32, b: f32| a.min(b))]
#[case(BinaryOp::Power, |a: f32, b: f32| a.powf(b))]
fn test_binary(#[case] op: BinaryOp, #[case] reference: fn(f32, f32) -> f32) {
    let a = vec![1.0f32, 6.0, 7.0, 4.0];
    let b = vec![5.0f32, 2.0, 3.0, 8.0];

    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[2, 2]);
    let y = g.parameter(ElementType::F32, &[2, 2]);
    let z = g.binary(op, x, y).expect("");

    let out = run(&g, &[z], &[x, y], &[HostData::F32(a.clone()), HostData::F32(b.clone())]);
    let expected = a.iter().zip(&b).map(|(&a, &b)| reference(a, b)).collect::<Vec<_>>();
    assert!(all_close(&as_f32(&out[0]), &expected, 1e-4), "{} failed", op.name());
}

#[test]
fn test_add_example() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[2, 2]);
    let y = g.parameter(ElementType::F32, &[2, 2]);
    let z = g.add(x, y).expect("");

    let out = run(
        &g,
        &[z],
        &[x, y],
        &[
            HostData::F32(vec![1.0, 6.0, 7.0, 4.0]),
            HostData::F32(vec![5.0, 2.0, 3.0, 8.0]),
        ],
    );
    assert_eq!(out, vec![HostData::F32(vec![6.0, 8.0, 10.0, 12.0])]);
}

#[rstest]
#[case(CompareOp::Equal, [false, true, false, true])]
#[case(CompareOp::NotEqual, [true, false, true, false])]
#[case(CompareOp::Greater, [false, false, true, false])]
#[case(CompareOp::GreaterEq, [false, true, true, true])]
#[case(CompareOp::Less, [true, false, false, false])]
#[case(CompareOp::LessEq, [true, true, false, true])]
fn test_compare(#[case] op: CompareOp, #[case] expected: [bool; 4]) {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::I32, &[4]);
    let y = g.parameter(ElementType::I32, &[4]);
    let z = g.compare(op, x, y).expect("");

    let out = run(
        &g,
        &[z],
        &[x, y],
        &[HostData::I32(vec![1, 2, 5, -3]), HostData::I32(vec![4, 2, 3, -3])],
    );
    assert_eq!(out[0], HostData::Boolean(expected.to_vec()));
}

#[rstest]
#[case(UnaryOp::Abs, [-1.0, 0.0, 0.5, 2.0], f32::abs)]
#[case(UnaryOp::Acos, [-1.0, 0.0, 0.5, 1.0], f32::acos)]
#[case(UnaryOp::Asin, [-1.0, 0.0, 0.5, 1.0], f32::asin)]
#[case(UnaryOp::Atan, [-1.0, 0.0, 0.5, 2.0], f32::atan)]
#[case(UnaryOp::Ceiling, [-1.5, 0.0, 0.5, 2.0], f32::ceil)]
#[case(UnaryOp::Cos, [-1.0, 0.0, 0.5, 2.0], f32::cos)]
#[case(UnaryOp::Cosh, [-1.0, 0.0, 0.5, 2.0], f32::cosh)]
#[case(UnaryOp::Exp, [-1.0, 0.0, 0.5, 2.0], f32::exp)]
#[case(UnaryOp::Floor, [-1.5, 0.0, 0.5, 2.0], f32::floor)]
#[case(UnaryOp::Log, [0.1, 0.5, 1.0, 2.0], f32::ln)]
#[case(UnaryOp::Negative, [-1.0, 0.0, 0.5, 2.0], |x: f32| -x)]
#[case(UnaryOp::Sin, [-1.0, 0.0, 0.5, 2.0], f32::sin)]
#[case(UnaryOp::Sinh, [-1.0, 0.0, 0.5, 2.0], f32::sinh)]
#[case(UnaryOp::Sqrt, [0.0, 0.5, 1.0, 2.0], f32::sqrt)]
#[case(UnaryOp::Tan, [-1.0, 0.0, 0.5, 1.0], f32::tan)]
#[case(UnaryOp::Tanh, [-1.0, 0.0, 0.5, 2.0], f32::tanh)]
fn test_unary(#[case] op: UnaryOp, #[case] input: [f32; 4], #[case] reference: fn(f32) -> f32) {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[4]);
    let y = g.unary(op, x).expect("");

    let out = run(&g, &[y], &[x], &[HostData::F32(input.to_vec())]);
    let expected = input.iter().map(|&v| reference(v)).collect::<Vec<_>>();
    assert!(all_close(&as_f32(&out[0]), &expected, 1e-5), "{} failed", op.name());
}

#[test]
fn test_sign() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F64, &[4]);
    let y = g.sign(x).expect("");

    let out = run(&g, &[y], &[x], &[HostData::F64(vec![-2.0, 0.0, 0.5, 3.0])]);
    assert_eq!(out[0], HostData::F64(vec![-1.0, 0.0, 1.0, 1.0]));
}

#[test]
fn test_unary_rejects_integers() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::I32, &[4]);
    assert!(matches!(g.sqrt(x), Err(Error::TypeMismatch(_))));
}

#[test]
fn test_not() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::Boolean, &[3]);
    let y = g.not(x).expect("");

    let out = run(&g, &[y], &[x], &[HostData::Boolean(vec![true, false, true])]);
    assert_eq!(out[0], HostData::Boolean(vec![false, true, false]));
}

#[test]
fn test_select() {
    let mut g = Graph::new();
    let c = g.parameter(ElementType::Boolean, &[1, 2]);
    let t = g.parameter(ElementType::F32, &[1, 2]);
    let e = g.parameter(ElementType::F32, &[1, 2]);
    let s = g.select(c, t, e).expect("");

    let out = run(
        &g,
        &[s],
        &[c, t, e],
        &[
            HostData::Boolean(vec![true, false]),
            HostData::F32(vec![5.0, 6.0]),
            HostData::F32(vec![7.0, 8.0]),
        ],
    );
    assert_eq!(out[0], HostData::F32(vec![5.0, 8.0]));
}

#[test]
fn test_convert() {
    let mut g = Graph::new();
    let f = g.parameter(ElementType::F32, &[4]);
    let i = g.parameter(ElementType::I32, &[3]);
    let b = g.parameter(ElementType::Boolean, &[2]);
    let fi = g.convert(f, ElementType::I32).expect("");
    let fu = g.convert(f, ElementType::U8).expect("");
    let fb = g.convert(f, ElementType::Boolean).expect("");
    let ib = g.convert(i, ElementType::Boolean).expect("");
    let bf = g.convert(b, ElementType::F32).expect("");

    let out = run(
        &g,
        &[fi, fu, fb, ib, bf],
        &[f, i, b],
        &[
            HostData::F32(vec![1.7, -2.9, 0.0, 300.0]),
            HostData::I32(vec![0, 3, -1]),
            HostData::Boolean(vec![true, false]),
        ],
    );
    assert_eq!(out[0], HostData::I32(vec![1, -2, 0, 300]));
    assert_eq!(out[1], HostData::U8(vec![1, 0, 0, 255]));
    assert_eq!(out[2], HostData::Boolean(vec![true, true, false, true]));
    assert_eq!(out[3], HostData::Boolean(vec![false, true, true]));
    assert_eq!(out[4], HostData::F32(vec![1.0, 0.0]));
}

#[test]
fn test_convert_to_boolean() {
    let mut g = Graph::new();
    let a = g.parameter(ElementType::F32, &[3]);
    let c = g.convert(a, ElementType::Boolean).expect("");

    let out = run(&g, &[c], &[a], &[HostData::F32(vec![1.0, 5.0, 3.0])]);
    assert_eq!(out[0], HostData::Boolean(vec![true, true, true]));
}

// ******************************** Contraction & reduction ******************************** //

#[test]
fn test_dot() {
    let mut g = Graph::new();
    let a = g.parameter(ElementType::F32, &[2, 3]);
    let b = g.parameter(ElementType::F32, &[3, 2]);
    let c = g.dot(a, b).expect("");
    assert_eq!(g.desc(c).expect("").extents(), &[2, 2]);

    let out = run(
        &g,
        &[c],
        &[a, b],
        &[
            HostData::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            HostData::F32(vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0]),
        ],
    );
    assert_eq!(out[0], HostData::F32(vec![58.0, 64.0, 139.0, 154.0]));
}

#[test]
fn test_reductions() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::I64, &[2, 3]);
    let sum = g.sum(x, &[0]).expect("");
    let prod = g.product(x, &[1]).expect("");
    let max = g.max(x, &[0, 1]).expect("");
    let min = g.min(x, &[1]).expect("");

    let out = run(
        &g,
        &[sum, prod, max, min],
        &[x],
        &[HostData::I64(vec![1, -2, 3, 4, 5, 6])],
    );
    assert_eq!(out[0], HostData::I64(vec![5, 3, 9]));
    assert_eq!(out[1], HostData::I64(vec![-6, 120]));
    assert_eq!(out[2], HostData::I64(vec![6]));
    assert_eq!(out[3], HostData::I64(vec![-2, 4]));
}

#[test]
fn test_reduce_with_function() {
    let mut sub = Graph::new();
    let p = sub.parameter(ElementType::F32, &[]);
    let q = sub.parameter(ElementType::F32, &[]);
    let r = sub.add(p, q).expect("");
    let add = Arc::new(Function::new(&sub, &[r], &[p, q], "add").expect(""));

    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[2, 3]);
    let init = g.constant_literal(10.0f32);
    let rows = g.reduce(x, init, add.clone(), &[1]).expect("");
    let all = g.reduce(x, init, add, &[0, 1]).expect("");

    let out = run(
        &g,
        &[rows, all],
        &[x],
        &[HostData::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])],
    );
    assert_eq!(out[0], HostData::F32(vec![16.0, 25.0]));
    assert_eq!(out[1], HostData::F32(vec![31.0]));
}

// ******************************** Layout ******************************** //

#[test]
fn test_reshape() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[2, 3]);
    let r = g.reshape(x, &[0, 1], &[3, 2]).expect("");
    let t = g.reshape(x, &[1, 0], &[3, 2]).expect("");
    assert!(matches!(g.reshape(x, &[0, 1], &[4, 2]), Err(Error::ShapeMismatch(_))));

    let data = HostData::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    let out = run(&g, &[r, t], &[x], &[data.clone()]);
    assert_eq!(out[0], data);
    assert_eq!(out[0].to_bytes(), data.to_bytes());
    assert_eq!(out[1], HostData::F32(vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]));
}

#[test]
fn test_broadcast() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::I32, &[3]);
    let rows = g.broadcast(x, &[2, 3], &[0]).expect("");
    let cols = g.broadcast(x, &[3, 2], &[1]).expect("");
    assert!(g.broadcast(x, &[2, 4], &[0]).is_err());

    let out = run(&g, &[rows, cols], &[x], &[HostData::I32(vec![1, 2, 3])]);
    assert_eq!(out[0], HostData::I32(vec![1, 2, 3, 1, 2, 3]));
    assert_eq!(out[1], HostData::I32(vec![1, 1, 2, 2, 3, 3]));
}

#[test]
fn test_one_hot() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::I32, &[5]);
    let y = g.one_hot(x, &[5, 3], 1).expect("");

    // out-of-range and negative indices leave their row empty
    let out = run(&g, &[y], &[x], &[HostData::I32(vec![1, 0, 2, 5, -1])]);
    assert_eq!(
        out[0],
        HostData::I32(vec![0, 1, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0])
    );
}

#[test]
fn test_one_hot_leading_axis() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[2]);
    let y = g.one_hot(x, &[3, 2], 0).expect("");

    let out = run(&g, &[y], &[x], &[HostData::F32(vec![2.0, 1.5])]);
    assert_eq!(out[0], HostData::F32(vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0]));
}

#[test]
fn test_concat() {
    let mut g = Graph::new();
    let a = g.parameter(ElementType::F32, &[1, 2]);
    let b = g.parameter(ElementType::F32, &[1, 2]);
    let c = g.parameter(ElementType::F32, &[1, 2]);
    let d = g.concat(&[a, b, c], 0).expect("");
    assert_eq!(g.desc(d).expect("").extents(), &[3, 2]);

    let out = run(
        &g,
        &[d],
        &[a, b, c],
        &[
            HostData::F32(vec![1.0, 2.0]),
            HostData::F32(vec![3.0, 4.0]),
            HostData::F32(vec![5.0, 6.0]),
        ],
    );
    assert_eq!(out[0], HostData::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
}

#[test]
fn test_slice() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[6, 6]);
    let s = g.slice(x, &[1, 1], &[5, 5]).expect("");
    let t = g.strided_slice(x, &[1, 1], &[5, 5], &[1, 2]).expect("");
    assert_eq!(g.desc(t).expect("").extents(), &[4, 2]);

    let range = (0..36).map(|v| v as f32).collect::<Vec<_>>();
    let out = run(&g, &[s, t], &[x], &[HostData::F32(range)]);

    let block = (1..5)
        .flat_map(|r| (1..5).map(move |c| (r * 6 + c) as f32))
        .collect::<Vec<_>>();
    let strided = (1..5)
        .flat_map(|r| [1, 3].into_iter().map(move |c| (r * 6 + c) as f32))
        .collect::<Vec<_>>();
    assert_eq!(out[0], HostData::F32(block));
    assert_eq!(out[1], HostData::F32(strided));
}

#[test]
fn test_replace_slice() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::I32, &[3, 3]);
    let s = g.parameter(ElementType::I32, &[2, 2]);
    let y = g.replace_slice(x, s, &[0, 1], &[2, 3], &[1, 1]).expect("");
    assert!(g.replace_slice(x, s, &[0, 0], &[3, 2], &[1, 1]).is_err());

    let out = run(
        &g,
        &[y],
        &[x, s],
        &[
            HostData::I32((0..9).collect()),
            HostData::I32(vec![10, 11, 12, 13]),
        ],
    );
    assert_eq!(out[0], HostData::I32(vec![0, 10, 11, 3, 12, 13, 6, 7, 8]));
}

#[rstest]
#[case(&[], vec![1, 2, 3, 4, 5, 6])]
#[case(&[0], vec![4, 5, 6, 1, 2, 3])]
#[case(&[1], vec![3, 2, 1, 6, 5, 4])]
#[case(&[0, 1], vec![6, 5, 4, 3, 2, 1])]
#[case(&[1, 0], vec![6, 5, 4, 3, 2, 1])]
fn test_reverse(#[case] axes: &[usize], #[case] expected: Vec<u32>) {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::U32, &[2, 3]);
    let y = g.reverse(x, axes).expect("");

    let out = run(&g, &[y], &[x], &[HostData::U32(vec![1, 2, 3, 4, 5, 6])]);
    assert_eq!(out[0], HostData::U32(expected));
}

#[test]
fn test_reverse_invalid_axes() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::U32, &[2, 3]);
    assert!(matches!(g.reverse(x, &[2]), Err(Error::Shape(_))));
    assert!(matches!(g.reverse(x, &[0, 0]), Err(Error::Shape(_))));
}

#[test]
fn test_pad() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[2]);
    let v = g.constant_literal(-1.0f32);
    let y = g.pad(x, v, &[1], &[2], &[1]).expect("");
    assert_eq!(g.desc(y).expect("").extents(), &[6]);

    let out = run(&g, &[y], &[x], &[HostData::F32(vec![1.0, 2.0])]);
    assert_eq!(out[0], HostData::F32(vec![-1.0, 1.0, -1.0, 2.0, -1.0, -1.0]));
}

// ******************************** Windowed ******************************** //

#[test]
fn test_max_pool() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[1, 1, 4]);
    let y = g.max_pool(x, &[2], &[1]).expect("");

    let out = run(&g, &[y], &[x], &[HostData::F32(vec![1.0, 3.0, 2.0, 5.0])]);
    assert_eq!(out[0], HostData::F32(vec![3.0, 3.0, 5.0]));
}

#[test]
fn test_convolution() {
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[1, 1, 3, 3]);
    let w = g.parameter(ElementType::F32, &[1, 1, 2, 2]);
    let y = g.convolution(x, w, &[1, 1], &[1, 1]).expect("");
    assert_eq!(g.desc(y).expect("").extents(), &[1, 1, 2, 2]);

    let out = run(
        &g,
        &[y],
        &[x, w],
        &[
            HostData::F32((1..10).map(|v| v as f32).collect()),
            HostData::F32(vec![1.0; 4]),
        ],
    );
    assert_eq!(out[0], HostData::F32(vec![12.0, 16.0, 24.0, 28.0]));
}

// ******************************** Graph & runtime ******************************** //

#[test]
fn test_constant_function() {
    let mut g = Graph::new();
    let c = g.constant_literal([[1i8, 2], [3, 4]]);
    assert!(matches!(g.negative(c), Err(Error::TypeMismatch(_))));
    let e = g.add(c, c).expect("");

    let out = run(&g, &[e], &[], &[]);
    assert_eq!(out[0], HostData::I8(vec![2, 4, 6, 8]));
}

#[test]
fn test_function_errors() {
    let mut g = Graph::new();
    let a = g.parameter(ElementType::F32, &[2]);
    let b = g.parameter(ElementType::F32, &[2]);
    let c = g.add(a, b).expect("");

    assert!(matches!(
        Function::new(&g, &[c], &[a], "partial"),
        Err(Error::UngroundedInput(id)) if id == b
    ));
    assert!(matches!(
        Function::new(&g, &[c], &[a, c], "bad"),
        Err(Error::NotAParameter(_))
    ));

    // a now reads from d, which already depends on a through c
    let d = g.multiply(c, a).expect("");
    g.replace_node(a, d).expect("");
    assert!(matches!(
        Function::new(&g, &[d], &[b], "cyclic"),
        Err(Error::CyclicGraph(_))
    ));
}

#[test]
fn test_round_trip() {
    let m = manager();
    let view = m.allocate_view(ElementType::F64, &[3, 2]).expect("");
    let src = HostData::F64(vec![0.5, -1.0, 2.25, 1e10, -0.0, 3.0]).to_bytes();

    view.write(&src, 0, src.len()).expect("");
    let mut dst = vec![0u8; src.len()];
    view.read(&mut dst, 0, src.len()).expect("");
    assert_eq!(src, dst);

    assert!(matches!(
        view.write(&src, 8, src.len()),
        Err(Error::OutOfBounds { .. })
    ));
}

#[test]
fn test_idempotent_compile() {
    let m = manager();
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[8]);
    let y = g.parameter(ElementType::F32, &[8]);
    let s = g.add(x, y).expect("");
    let t = g.tanh(s).expect("");
    let f = Function::new(&g, &[t], &[x, y], "f").expect("");

    let p1 = m.compile(&f).expect("");
    let p2 = m.compile(&f).expect("");

    let mut rng = StdRng::seed_from_u64(7);
    let normal = Normal::new(0.0f32, 2.0).expect("");
    let a = HostData::F32((0..8).map(|_| normal.sample(&mut rng)).collect());
    let b = HostData::F32((0..8).map(|_| normal.sample(&mut rng)).collect());

    let xv = upload(&m, ElementType::F32, &[8], &a).expect("");
    let yv = upload(&m, ElementType::F32, &[8], &b).expect("");
    let o1 = m.allocate_view(ElementType::F32, &[8]).expect("");
    let o2 = m.allocate_view(ElementType::F32, &[8]).expect("");

    m.execute(&p1, &[&xv, &yv], &[&o1]).expect("");
    m.execute(&p2, &[&xv, &yv], &[&o2]).expect("");
    assert_eq!(download(&o1).expect(""), download(&o2).expect(""));
}

#[test]
fn test_cpu_matches_interpreter() {
    init();
    let interpreter = Manager::get("INTERPRETER").expect("");
    let cpu = Manager::get("CPU").expect("");
    assert_eq!(cpu.kind(), BackendKind::Cpu);

    let mut g = Graph::new();
    let x = g.parameter(ElementType::F32, &[16, 8]);
    let y = g.parameter(ElementType::F32, &[16, 8]);
    let w = g.parameter(ElementType::F32, &[8, 4]);
    let s = g.add(x, y).expect("");
    let p = g.multiply(x, y).expect("");
    let t = g.tanh(s).expect("");
    let m = g.maximum(t, p).expect("");
    let h = g.dot(m, w).expect("");
    let r = g.sum(h, &[1]).expect("");
    let c = g.greater(s, p).expect("");
    let z = g.select(c, x, y).expect("");

    let mut rng = StdRng::seed_from_u64(42);
    let normal = Normal::new(0.0f32, 1.0).expect("");
    let mut sample = |n: usize| HostData::F32((0..n).map(|_| normal.sample(&mut rng)).collect());
    let inputs = [sample(128), sample(128), sample(32)];

    let expected = run_on(&interpreter, &g, &[r, z, h], &[x, y, w], &inputs).expect("");
    let actual = run_on(&cpu, &g, &[r, z, h], &[x, y, w], &inputs).expect("");
    assert_eq!(expected, actual);
}

#[test]
fn test_plan_survives_failure() {
    let m = manager();
    let mut g = Graph::new();
    let a = g.parameter(ElementType::I32, &[2]);
    let b = g.parameter(ElementType::I32, &[2]);
    let q = g.divide(a, b).expect("");
    let plan = m.compile(&Function::new(&g, &[q], &[a, b], "div").expect("")).expect("");

    let x = upload(&m, ElementType::I32, &[2], &HostData::I32(vec![9, 8])).expect("");
    let zero = upload(&m, ElementType::I32, &[2], &HostData::I32(vec![3, 0])).expect("");
    let ok = upload(&m, ElementType::I32, &[2], &HostData::I32(vec![3, 4])).expect("");
    let wrong = m.allocate_view(ElementType::I32, &[3]).expect("");
    let out = m.allocate_view(ElementType::I32, &[2]).expect("");

    assert!(matches!(
        m.execute(&plan, &[&x, &zero], &[&out]),
        Err(Error::DivisionByZero)
    ));
    assert!(matches!(
        m.execute(&plan, &[&x, &wrong], &[&out]),
        Err(Error::SignatureMismatch { role: "input", index: 1, .. })
    ));
    assert!(matches!(
        m.execute(&plan, &[&x], &[&out]),
        Err(Error::ArityMismatch { expected: 2, found: 1, .. })
    ));

    m.execute(&plan, &[&x, &ok], &[&out]).expect("");
    assert_eq!(out.to_vec::<i32>().expect(""), vec![3, 2]);
}

#[test]
fn test_call_frame_threads() {
    let m = manager();
    let mut g = Graph::new();
    let x = g.parameter(ElementType::F64, &[4]);
    let y = g.multiply(x, x).expect("");
    let plan = m.compile(&Function::new(&g, &[y], &[x], "square").expect("")).expect("");
    let frame = m.make_call_frame(plan);

    std::thread::scope(|scope| {
        for k in 0..4 {
            let frame = frame.clone();
            let m = m.clone();
            scope.spawn(move || {
                let input = m.allocate_view(ElementType::F64, &[4]).expect("");
                let output = m.allocate_view(ElementType::F64, &[4]).expect("");
                let v = k as f64;
                input.write_slice(&[v, v + 1.0, v + 2.0, v + 3.0]).expect("");
                frame.call(&[&input], &[&output]).expect("");
                assert_eq!(
                    output.to_vec::<f64>().expect(""),
                    vec![v * v, (v + 1.0).powi(2), (v + 2.0).powi(2), (v + 3.0).powi(2)]
                );
            });
        }
    });
}

#[test]
fn test_memory_accounting() {
    init();
    let m = Manager::new(RuntimeConfig::new(BackendKind::Interpreter).with_memory_capacity(64)).expect("");
    let backend = m.backend();
    let before = backend.allocator().mem_used();

    let a = m.allocate_view(ElementType::F32, &[8]).expect("");
    let b = m.allocate_view(ElementType::U8, &[16]).expect("");
    assert_eq!(backend.allocator().mem_used(), before + 48);
    assert!(matches!(
        m.allocate_view(ElementType::F64, &[4]),
        Err(Error::Memory(MemoryError::OutOfMemory { .. }))
    ));

    drop(a);
    drop(b);
    assert_eq!(backend.allocator().mem_used(), before);
}

#[test]
fn test_backend_names() {
    init();
    assert!(matches!(Manager::get("FPGA"), Err(Error::UnknownBackend(_))));
    assert!(matches!(Manager::get("GPU"), Err(Error::BackendUnavailable(_))));
    let m = Manager::get("INTERPRETER").expect("");
    assert_eq!(m.backend().kind(), BackendKind::Interpreter);
}
