//! Reduction operators: softmax and sum-reduction.

use std::any::Any;

use cinnabar_core::{
    for_each_index, normalize_axes, normalize_axis, Argument, Attributes, DataType, Error,
    Module, Operation, Result, Shape,
};

/// Softmax along one axis.
#[derive(Debug, Clone)]
pub struct Softmax {
    pub axis: i64,
}

impl Default for Softmax {
    fn default() -> Self {
        Self { axis: -1 }
    }
}

impl Operation for Softmax {
    fn name(&self) -> &str {
        "softmax"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        let [input] = inputs else {
            return Err(Error::Shape(format!(
                "softmax expects 1 input, got {}",
                inputs.len()
            )));
        };
        if input.dtype() != DataType::F32 {
            return Err(Error::Shape(format!(
                "softmax requires f32 input, got {}",
                input
            )));
        }
        normalize_axis(self.axis, input.ndim())?;
        Ok(input.normalize())
    }

    fn evaluate(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        let axis = normalize_axis(self.axis, output.ndim())?;
        let vals = args[0].to_f32_vec()?;
        let lens = output.lens();
        let alen = lens[axis];
        let inner: usize = lens[axis + 1..].iter().product();
        let outer: usize = lens[..axis].iter().product();

        let mut out = vec![0.0f32; vals.len()];
        for o in 0..outer {
            for i in 0..inner {
                let at = |a: usize| (o * alen + a) * inner + i;
                let max = (0..alen)
                    .map(|a| vals[at(a)])
                    .fold(f32::NEG_INFINITY, f32::max);
                let mut sum = 0.0;
                for a in 0..alen {
                    let e = (vals[at(a)] - max).exp();
                    out[at(a)] = e;
                    sum += e;
                }
                for a in 0..alen {
                    out[at(a)] /= sum;
                }
            }
        }
        Argument::from_f32(lens.to_vec(), out)
    }

    fn attributes(&self) -> Attributes {
        Attributes {
            normalize_axes: true,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Sum over a set of axes, keeping them as length-1 dimensions. An empty
/// axis list reduces over every axis.
#[derive(Debug, Clone, Default)]
pub struct ReduceSum {
    pub axes: Vec<i64>,
}

impl ReduceSum {
    fn reduced_axes(&self, rank: usize) -> Result<Vec<usize>> {
        if self.axes.is_empty() {
            Ok((0..rank).collect())
        } else {
            normalize_axes(&self.axes, rank)
        }
    }
}

impl Operation for ReduceSum {
    fn name(&self) -> &str {
        "reduce_sum"
    }

    fn compute_shape(&self, inputs: &[Shape], _mods: &[&Module]) -> Result<Shape> {
        let [input] = inputs else {
            return Err(Error::Shape(format!(
                "reduce_sum expects 1 input, got {}",
                inputs.len()
            )));
        };
        let axes = self.reduced_axes(input.ndim())?;
        let mut lens = input.lens().to_vec();
        for a in axes {
            lens[a] = 1;
        }
        Ok(Shape::new(input.dtype(), lens))
    }

    fn evaluate(&self, output: &Shape, args: &[Argument]) -> Result<Argument> {
        let input = args[0].shape();
        let axes = self.reduced_axes(input.ndim())?;
        let vals = args[0].to_f32_vec()?;
        let in_packed = input.normalize();

        let mut out = vec![0.0f32; output.elements()];
        for_each_index(input.lens(), |idx| {
            let mut out_idx = idx.to_vec();
            for &a in &axes {
                out_idx[a] = 0;
            }
            out[output.index(&out_idx)] += vals[in_packed.index(idx)];
        });
        Argument::from_f32(output.lens().to_vec(), out)
    }

    fn attributes(&self) -> Attributes {
        Attributes {
            normalize_axes: true,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let a = Argument::from_f32(vec![2, 3], vec![1.0, 2.0, 3.0, 1.0, 1.0, 1.0]).unwrap();
        let op = Softmax::default();
        let s = op.compute_shape(&[a.shape().clone()], &[]).unwrap();
        let out = op.evaluate(&s, &[a]).unwrap().to_f32_vec().unwrap();

        let row0: f32 = out[..3].iter().sum();
        let row1: f32 = out[3..].iter().sum();
        assert!((row0 - 1.0).abs() < 1e-6);
        assert!((row1 - 1.0).abs() < 1e-6);
        // uniform row softmaxes to uniform
        assert!((out[3] - 1.0 / 3.0).abs() < 1e-6);
        // monotone within a row
        assert!(out[0] < out[1] && out[1] < out[2]);
    }

    #[test]
    fn test_softmax_axis_zero() {
        let a = Argument::from_f32(vec![2, 2], vec![0.0, 0.0, 0.0, 0.0]).unwrap();
        let op = Softmax { axis: 0 };
        let s = op.compute_shape(&[a.shape().clone()], &[]).unwrap();
        let out = op.evaluate(&s, &[a]).unwrap().to_f32_vec().unwrap();
        assert!(out.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_softmax_rejects_bad_axis() {
        let s = Shape::new(DataType::F32, vec![2, 2]);
        assert!(Softmax { axis: 2 }.compute_shape(&[s], &[]).is_err());
    }

    #[test]
    fn test_reduce_sum_single_axis() {
        let a = Argument::from_f32(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let op = ReduceSum { axes: vec![1] };
        let s = op.compute_shape(&[a.shape().clone()], &[]).unwrap();
        assert_eq!(s.lens(), &[2, 1]);
        let out = op.evaluate(&s, &[a]).unwrap();
        assert_eq!(out.to_f32_vec().unwrap(), vec![6.0, 15.0]);
    }

    #[test]
    fn test_reduce_sum_negative_axis() {
        let a = Argument::from_f32(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let op = ReduceSum { axes: vec![-2] };
        let s = op.compute_shape(&[a.shape().clone()], &[]).unwrap();
        assert_eq!(s.lens(), &[1, 2]);
        let out = op.evaluate(&s, &[a]).unwrap();
        assert_eq!(out.to_f32_vec().unwrap(), vec![4.0, 6.0]);
    }

    #[test]
    fn test_reduce_sum_all_axes_by_default() {
        let a = Argument::from_f32(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let op = ReduceSum::default();
        let s = op.compute_shape(&[a.shape().clone()], &[]).unwrap();
        assert_eq!(s.lens(), &[1, 1]);
        let out = op.evaluate(&s, &[a]).unwrap();
        assert_eq!(out.to_f32_vec().unwrap(), vec![10.0]);
    }
}
