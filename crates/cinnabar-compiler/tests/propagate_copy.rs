//! Copy propagation over whole modules, including the evaluation-visible
//! behavior before and after the rewrite.

use std::collections::HashMap;

use cinnabar_compiler::PropagateCopy;
use cinnabar_core::{
    evaluate_module, generate_argument, Argument, DataType, ModulePassManager, Pass, Program,
    Shape,
};
use cinnabar_operators::{CopyOp, Identity, Relu, Transpose};

fn run(p: &mut Program) {
    let root = p.main_id();
    PropagateCopy
        .apply(&mut ModulePassManager::new(p, root))
        .unwrap();
}

#[test]
fn test_copy_of_transposed_parameter() {
    let mut p = Program::new();
    let m = p.main_mut();
    let x = m
        .add_parameter("p", Shape::new(DataType::F32, vec![2, 2]))
        .unwrap();
    let t = m
        .add_instruction(
            Transpose {
                permutation: vec![1, 0],
            },
            &[x],
        )
        .unwrap();
    let c = m.add_instruction(CopyOp, &[t]).unwrap();
    m.add_return(&[c]).unwrap();

    run(&mut p);

    let m = p.main();
    m.validate().unwrap();
    let ins = m.instruction(c).unwrap();
    assert_eq!(ins.name(), "identity");
    assert_eq!(ins.inputs(), &[t]);
    // output keeps the transposed layout
    let out = &m.get_output_shapes()[0];
    assert_eq!(out.lens(), &[2, 2]);
    assert_eq!(out.strides(), &[1, 2]);
}

#[test]
fn test_no_eliminable_copy_remains() {
    // one eliminable copy, one copy of a parameter, one copy below a
    // shared alias chain
    let mut p = Program::new();
    let m = p.main_mut();
    let x = m
        .add_parameter("p", Shape::new(DataType::F32, vec![2, 2]))
        .unwrap();
    let t = m
        .add_instruction(
            Transpose {
                permutation: vec![1, 0],
            },
            &[x],
        )
        .unwrap();
    let c1 = m.add_instruction(CopyOp, &[t]).unwrap();
    let c2 = m.add_instruction(CopyOp, &[x]).unwrap();
    let shared = m.add_instruction(Identity, &[c1]).unwrap();
    let c3 = m.add_instruction(CopyOp, &[shared]).unwrap();
    let also = m.add_instruction(Relu, &[shared]).unwrap();
    m.add_return(&[c2, c3, also]).unwrap();

    run(&mut p);

    let m = p.main();
    m.validate().unwrap();
    assert_eq!(m.instruction(c1).unwrap().name(), "identity");

    // every surviving copy is justified: its source aliases a reserved
    // instruction or sits on a multi-consumer chain
    for (_, ins) in m.iter().filter(|(_, i)| i.name() == "copy") {
        let input = ins.inputs()[0];
        let alias = m.get_output_alias(input);
        let justified = m.instruction(alias).unwrap().is_reserved()
            || m.instruction(alias).unwrap().outputs().len() > 1
            || m.instruction(input).unwrap().outputs().len() > 1;
        assert!(justified, "copy {:?} should have been elided", ins);
    }
    assert_eq!(m.instruction(c2).unwrap().name(), "copy");
    assert_eq!(m.instruction(c3).unwrap().name(), "copy");
}

#[test]
fn test_evaluation_unchanged_by_rewrite() {
    let build = || {
        let mut p = Program::new();
        let m = p.main_mut();
        let x = m
            .add_parameter("p", Shape::new(DataType::F32, vec![3, 2]))
            .unwrap();
        let t = m
            .add_instruction(
                Transpose {
                    permutation: vec![1, 0],
                },
                &[x],
            )
            .unwrap();
        let c = m.add_instruction(CopyOp, &[t]).unwrap();
        let r = m.add_instruction(Relu, &[c]).unwrap();
        m.add_return(&[r]).unwrap();
        p
    };

    let arg = generate_argument(&Shape::new(DataType::F32, vec![3, 2]), 11);
    let params: HashMap<String, Argument> =
        HashMap::from([("p".to_string(), arg)]);

    let reference = build();
    let before = evaluate_module(&reference, reference.main(), &params).unwrap();

    let mut rewritten = build();
    run(&mut rewritten);
    let after = evaluate_module(&rewritten, rewritten.main(), &params).unwrap();

    assert_eq!(before, after);
}
