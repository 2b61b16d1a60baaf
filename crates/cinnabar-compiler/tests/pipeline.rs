//! The default pipeline end to end.

use std::collections::HashMap;

use cinnabar_compiler::optimize;
use cinnabar_core::{
    evaluate_module, generate_argument, Argument, DataType, Program, Shape,
};
use cinnabar_operators::{CopyOp, Identity, Softmax, Transpose};

fn build() -> Program {
    let mut p = Program::new();
    let m = p.main_mut();
    let x = m
        .add_parameter("x", Shape::new(DataType::F32, vec![4, 4]))
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
    let sm = m.add_instruction(Softmax { axis: -1 }, &[c]).unwrap();
    // dead branch
    let dead = m.add_instruction(Identity, &[t]).unwrap();
    m.add_instruction(Identity, &[dead]).unwrap();
    m.add_return(&[sm]).unwrap();
    p
}

#[test]
fn test_default_pipeline() {
    let params: HashMap<String, Argument> = HashMap::from([(
        "x".to_string(),
        generate_argument(&Shape::new(DataType::F32, vec![4, 4]), 42),
    )]);

    let reference = build();
    let before = evaluate_module(&reference, reference.main(), &params).unwrap();

    let mut p = build();
    optimize(&mut p).unwrap();
    p.validate().unwrap();

    let m = p.main();
    // dead identities are gone and nothing eliminable remains
    assert!(m.iter().all(|(_, i)| i.name() != "copy"));
    assert!(m.iter().any(|(_, i)| i.name() == "contiguous"));

    let after = evaluate_module(&p, p.main(), &params).unwrap();
    assert_eq!(before, after);
}
