//! Built-in function library.
//!
//! Two families live here: scalar math (`abs`, `sqrt`, `min`, ...) and the
//! raster functions that operate on pixel vectors and neighborhoods (`bands`,
//! `dotpr`, `conv`, `ndvi`, `cat`, `mean`, `var`, `median`, `maj`, `corr`,
//! `vnorm`, `vmin`, `vmax`, `vect2scal`, the `v*` element-wise variants and
//! `cmplx`). Functions are resolved by name at compile time, so an unknown
//! name fails before any pixel is evaluated.

use crate::core::error::{ExpressionError, ExpressionResult};
use crate::expr::value::{Matrix, Value};
use std::borrow::Cow;

/// A real function of one real argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryFn {
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log2,
    Log10,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Floor,
    Ceil,
    Rint,
    Sign,
}

impl UnaryFn {
    /// Apply to a single value.
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryFn::Abs => x.abs(),
            UnaryFn::Sqrt => x.sqrt(),
            UnaryFn::Exp => x.exp(),
            UnaryFn::Ln => x.ln(),
            UnaryFn::Log2 => x.log2(),
            UnaryFn::Log10 => x.log10(),
            UnaryFn::Sin => x.sin(),
            UnaryFn::Cos => x.cos(),
            UnaryFn::Tan => x.tan(),
            UnaryFn::Asin => x.asin(),
            UnaryFn::Acos => x.acos(),
            UnaryFn::Atan => x.atan(),
            UnaryFn::Sinh => x.sinh(),
            UnaryFn::Cosh => x.cosh(),
            UnaryFn::Tanh => x.tanh(),
            UnaryFn::Floor => x.floor(),
            UnaryFn::Ceil => x.ceil(),
            UnaryFn::Rint => x.round_ties_even(),
            UnaryFn::Sign => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// A callable built-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Unary(UnaryFn),
    Min,
    Max,
    Sum,
    Avg,
    Atan2,
    Bands,
    Dotpr,
    Conv,
    Ndvi,
    Cat,
    Mean,
    Var,
    Median,
    Maj,
    Corr,
    Vnorm,
    Vmin,
    Vmax,
    Vect2scal,
    /// `v`-prefixed variant mapping a unary function over a matrix.
    Elementwise(UnaryFn),
    Cmplx,
}

const FUNCTIONS: &[(&str, Function)] = &[
    ("abs", Function::Unary(UnaryFn::Abs)),
    ("sqrt", Function::Unary(UnaryFn::Sqrt)),
    ("exp", Function::Unary(UnaryFn::Exp)),
    ("ln", Function::Unary(UnaryFn::Ln)),
    ("log", Function::Unary(UnaryFn::Ln)),
    ("log2", Function::Unary(UnaryFn::Log2)),
    ("log10", Function::Unary(UnaryFn::Log10)),
    ("sin", Function::Unary(UnaryFn::Sin)),
    ("cos", Function::Unary(UnaryFn::Cos)),
    ("tan", Function::Unary(UnaryFn::Tan)),
    ("asin", Function::Unary(UnaryFn::Asin)),
    ("acos", Function::Unary(UnaryFn::Acos)),
    ("atan", Function::Unary(UnaryFn::Atan)),
    ("sinh", Function::Unary(UnaryFn::Sinh)),
    ("cosh", Function::Unary(UnaryFn::Cosh)),
    ("tanh", Function::Unary(UnaryFn::Tanh)),
    ("floor", Function::Unary(UnaryFn::Floor)),
    ("ceil", Function::Unary(UnaryFn::Ceil)),
    ("rint", Function::Unary(UnaryFn::Rint)),
    ("sign", Function::Unary(UnaryFn::Sign)),
    ("min", Function::Min),
    ("max", Function::Max),
    ("sum", Function::Sum),
    ("avg", Function::Avg),
    ("atan2", Function::Atan2),
    ("bands", Function::Bands),
    ("dotpr", Function::Dotpr),
    ("conv", Function::Conv),
    ("ndvi", Function::Ndvi),
    ("cat", Function::Cat),
    ("mean", Function::Mean),
    ("var", Function::Var),
    ("median", Function::Median),
    ("maj", Function::Maj),
    ("corr", Function::Corr),
    ("vnorm", Function::Vnorm),
    ("vmin", Function::Vmin),
    ("vmax", Function::Vmax),
    ("vect2scal", Function::Vect2scal),
    ("vabs", Function::Elementwise(UnaryFn::Abs)),
    ("vsqrt", Function::Elementwise(UnaryFn::Sqrt)),
    ("vexp", Function::Elementwise(UnaryFn::Exp)),
    ("vlog", Function::Elementwise(UnaryFn::Ln)),
    ("vlog10", Function::Elementwise(UnaryFn::Log10)),
    ("vsin", Function::Elementwise(UnaryFn::Sin)),
    ("vcos", Function::Elementwise(UnaryFn::Cos)),
    ("vtan", Function::Elementwise(UnaryFn::Tan)),
    ("vasin", Function::Elementwise(UnaryFn::Asin)),
    ("vacos", Function::Elementwise(UnaryFn::Acos)),
    ("vatan", Function::Elementwise(UnaryFn::Atan)),
    ("vsinh", Function::Elementwise(UnaryFn::Sinh)),
    ("vcosh", Function::Elementwise(UnaryFn::Cosh)),
    ("vtanh", Function::Elementwise(UnaryFn::Tanh)),
    ("cmplx", Function::Cmplx),
];

/// Look up a built-in by name.
pub fn lookup(name: &str) -> Option<Function> {
    FUNCTIONS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
}

/// Names of every built-in, in registration order.
pub fn function_names() -> impl Iterator<Item = &'static str> {
    FUNCTIONS.iter().map(|(n, _)| *n)
}

enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

impl Function {
    /// Name the function was registered under.
    pub fn name(&self) -> &'static str {
        FUNCTIONS
            .iter()
            .find(|(_, f)| f == self)
            .map(|(n, _)| *n)
            .unwrap_or("?")
    }

    fn arity(&self) -> Arity {
        match self {
            Function::Unary(_)
            | Function::Elementwise(_)
            | Function::Vnorm
            | Function::Vmin
            | Function::Vmax
            | Function::Vect2scal => Arity::Exactly(1),
            Function::Atan2 | Function::Bands | Function::Ndvi | Function::Corr | Function::Cmplx => {
                Arity::Exactly(2)
            }
            Function::Dotpr | Function::Conv => Arity::AtLeast(2),
            Function::Min
            | Function::Max
            | Function::Sum
            | Function::Avg
            | Function::Cat
            | Function::Mean
            | Function::Var
            | Function::Median
            | Function::Maj => Arity::AtLeast(1),
        }
    }

    fn check_arity(&self, got: usize) -> ExpressionResult<()> {
        let (ok, expected) = match self.arity() {
            Arity::Exactly(n) => (got == n, n.to_string()),
            Arity::AtLeast(n) => (got >= n, format!("at least {}", n)),
        };
        if ok {
            Ok(())
        } else {
            Err(ExpressionError::Arity {
                function: self.name().to_string(),
                expected,
                got,
            })
        }
    }

    /// Call with already evaluated arguments.
    pub fn call(&self, args: &[&Value]) -> ExpressionResult<Value> {
        self.check_arity(args.len())?;
        let name = self.name();
        match *self {
            Function::Unary(f) => unary(f, &args[0], name),
            Function::Min => fold_reals(args, name, i64::min, f64::min),
            Function::Max => fold_reals(args, name, i64::max, f64::max),
            Function::Sum => sum(args, name),
            Function::Avg => {
                let total: f64 = reals(args, name)?.iter().sum();
                Ok(Value::Float(total / args.len() as f64))
            }
            Function::Atan2 => Ok(Value::Float(args[0].expect_real(name)?.atan2(args[1].expect_real(name)?))),
            Function::Bands => bands(&args[0], &args[1]),
            Function::Dotpr | Function::Conv => dot_products(args, name),
            Function::Ndvi => {
                let red = args[0].expect_real(name)?;
                let nir = args[1].expect_real(name)?;
                if (red + nir).abs() < 1e-6 {
                    Ok(Value::Float(0.0))
                } else {
                    Ok(Value::Float((nir - red) / (nir + red)))
                }
            }
            Function::Cat => cat(args),
            Function::Mean => per_argument(args, name, |v| v.iter().sum::<f64>() / v.len() as f64),
            Function::Var => per_argument(args, name, variance),
            Function::Median => per_argument(args, name, median),
            Function::Maj => per_argument(args, name, majority),
            Function::Corr => correlation(&args[0], &args[1]),
            Function::Vnorm => {
                let m = args[0].expect_matrix(name)?;
                let norm = m.data().iter().map(|v| v * v).sum::<f64>().sqrt();
                Ok(Value::Matrix(Matrix::row_vector(vec![norm])))
            }
            Function::Vmin => {
                let m = args[0].expect_matrix(name)?;
                let min = m.data().iter().copied().fold(f64::INFINITY, f64::min);
                Ok(Value::Matrix(Matrix::row_vector(vec![min])))
            }
            Function::Vmax => {
                let m = args[0].expect_matrix(name)?;
                let max = m.data().iter().copied().fold(f64::NEG_INFINITY, f64::max);
                Ok(Value::Matrix(Matrix::row_vector(vec![max])))
            }
            Function::Vect2scal => {
                let m = args[0].expect_matrix(name)?;
                if m.len() != 1 {
                    return Err(ExpressionError::TypeMismatch {
                        operation: name.to_string(),
                        found: format!("a {}x{} matrix", m.rows(), m.cols()),
                    });
                }
                Ok(Value::Float(m.data()[0]))
            }
            Function::Elementwise(f) => match &args[0] {
                Value::Matrix(m) => Ok(Value::Matrix(m.map(|v| f.apply(v)))),
                other => Ok(Value::Float(f.apply(other.expect_real(name)?))),
            },
            Function::Cmplx => Ok(Value::Complex {
                re: args[0].expect_real(name)?,
                im: args[1].expect_real(name)?,
            }),
        }
    }
}

fn unary(f: UnaryFn, arg: &Value, name: &str) -> ExpressionResult<Value> {
    match (f, arg) {
        (UnaryFn::Abs, Value::Integer(i)) => Ok(i
            .checked_abs()
            .map(Value::Integer)
            .unwrap_or(Value::Float((*i as f64).abs()))),
        (UnaryFn::Abs, Value::Complex { re, im }) => Ok(Value::Float(re.hypot(*im))),
        (_, value) => Ok(Value::Float(f.apply(value.expect_real(name)?))),
    }
}

fn reals(args: &[&Value], name: &str) -> ExpressionResult<Vec<f64>> {
    args.iter().map(|a| a.expect_real(name)).collect()
}

fn fold_reals(
    args: &[&Value],
    name: &str,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> ExpressionResult<Value> {
    if let Some(ints) = all_integers(args) {
        return Ok(Value::Integer(ints.into_iter().reduce(int_op).unwrap_or_default()));
    }
    let values = reals(args, name)?;
    Ok(Value::Float(values.into_iter().reduce(float_op).unwrap_or(f64::NAN)))
}

fn sum(args: &[&Value], name: &str) -> ExpressionResult<Value> {
    if let Some(ints) = all_integers(args) {
        if let Some(total) = ints.iter().try_fold(0i64, |acc, &v| acc.checked_add(v)) {
            return Ok(Value::Integer(total));
        }
    }
    Ok(Value::Float(reals(args, name)?.iter().sum()))
}

fn all_integers(args: &[&Value]) -> Option<Vec<i64>> {
    args.iter()
        .map(|a| match a {
            Value::Integer(i) => Some(*i),
            _ => None,
        })
        .collect()
}

/// Elements of a scalar or matrix argument.
fn elements<'a>(value: &'a Value, name: &str) -> ExpressionResult<Cow<'a, [f64]>> {
    match value {
        Value::Matrix(m) => Ok(Cow::Borrowed(m.data())),
        other => Ok(Cow::Owned(vec![other.expect_real(name)?])),
    }
}

fn bands(vector: &Value, indices: &Value) -> ExpressionResult<Value> {
    let source = elements(vector, "bands")?;
    let wanted = elements(indices, "bands")?;
    let mut picked = Vec::with_capacity(wanted.len());
    for &index in wanted.iter() {
        let band = index as i64;
        if band < 1 || band as usize > source.len() || index.fract() != 0.0 {
            return Err(ExpressionError::BandOutOfRange {
                band,
                bands: source.len(),
            });
        }
        picked.push(source[band as usize - 1]);
    }
    Ok(Value::Matrix(Matrix::row_vector(picked)))
}

fn dot_products(args: &[&Value], name: &str) -> ExpressionResult<Value> {
    let kernel = as_matrix(&args[0], name)?;
    let mut out = Vec::with_capacity(args.len() - 1);
    for arg in &args[1..] {
        let other = as_matrix(arg, name)?;
        let product = kernel.zip_with(&other, name, |a, b| a * b)?;
        out.push(product.data().iter().sum());
    }
    Ok(Value::Matrix(Matrix::row_vector(out)))
}

fn as_matrix<'a>(value: &'a Value, name: &str) -> ExpressionResult<Cow<'a, Matrix>> {
    match value {
        Value::Matrix(m) => Ok(Cow::Borrowed(m)),
        other => Ok(Cow::Owned(Matrix::row_vector(vec![other.expect_real(name)?]))),
    }
}

fn cat(args: &[&Value]) -> ExpressionResult<Value> {
    let mut out = Vec::new();
    for arg in args {
        match arg {
            Value::Matrix(m) if m.is_row_vector() => out.extend_from_slice(m.data()),
            Value::Matrix(m) => {
                return Err(ExpressionError::TypeMismatch {
                    operation: "cat".to_string(),
                    found: format!("a {}x{} matrix", m.rows(), m.cols()),
                })
            }
            other => out.push(other.expect_real("cat")?),
        }
    }
    Ok(Value::Matrix(Matrix::row_vector(out)))
}

/// Reduce each argument to one number and return them as a row vector.
/// Scalars reduce through the same function as a one-element matrix.
fn per_argument(args: &[&Value], name: &str, reduce: fn(&[f64]) -> f64) -> ExpressionResult<Value> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        out.push(reduce(&elements(arg, name)?));
    }
    Ok(Value::Matrix(Matrix::row_vector(out)))
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted[sorted.len() / 2]
}

/// Most frequent value after truncation to an integer; ties go to the
/// smallest value.
fn majority(values: &[f64]) -> f64 {
    let mut sorted: Vec<i64> = values.iter().map(|&v| v as i64).collect();
    sorted.sort_unstable();
    let mut best = (sorted[0], 0usize);
    let mut run_start = 0;
    for i in 1..=sorted.len() {
        if i == sorted.len() || sorted[i] != sorted[run_start] {
            let run = i - run_start;
            if run > best.1 {
                best = (sorted[run_start], run);
            }
            run_start = i;
        }
    }
    best.0 as f64
}

fn correlation(a: &Value, b: &Value) -> ExpressionResult<Value> {
    let a = a.expect_matrix("corr")?;
    let b = b.expect_matrix("corr")?;
    if a.shape() != b.shape() {
        return Err(ExpressionError::ShapeMismatch {
            operation: "corr".to_string(),
            left: a.shape(),
            right: b.shape(),
        });
    }
    let n = a.len() as f64;
    let mean_a = a.data().iter().sum::<f64>() / n;
    let mean_b = b.data().iter().sum::<f64>() / n;
    let mut cross = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.data().iter().zip(b.data()) {
        cross += (x - mean_a) * (y - mean_b);
        var_a += (x - mean_a) * (x - mean_a);
        var_b += (y - mean_b) * (y - mean_b);
    }
    Ok(Value::Float(cross / (var_a.sqrt() * var_b.sqrt())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[f64]) -> Value {
        Value::Matrix(Matrix::row_vector(values.to_vec()))
    }

    fn call(name: &str, args: &[Value]) -> ExpressionResult<Value> {
        let args: Vec<&Value> = args.iter().collect();
        lookup(name).expect("known function").call(&args)
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("ndvi"), Some(Function::Ndvi));
        assert_eq!(lookup("vcos"), Some(Function::Elementwise(UnaryFn::Cos)));
        assert_eq!(lookup("nope"), None);
        assert_eq!(Function::Conv.name(), "conv");
    }

    #[test]
    fn test_arity() {
        let err = call("ndvi", &[Value::Float(1.0)]).unwrap_err();
        assert!(matches!(err, ExpressionError::Arity { got: 1, .. }));
    }

    #[test]
    fn test_bands_selects_one_based() {
        let v = row(&[10.0, 20.0, 30.0]);
        let picked = call("bands", &[v.clone(), row(&[3.0, 1.0])]).unwrap();
        assert_eq!(picked, row(&[30.0, 10.0]));

        let err = call("bands", &[v, row(&[4.0])]).unwrap_err();
        assert!(matches!(err, ExpressionError::BandOutOfRange { band: 4, bands: 3 }));
    }

    #[test]
    fn test_ndvi() {
        assert_eq!(call("ndvi", &[Value::Float(1.0), Value::Float(3.0)]).unwrap(), Value::Float(0.5));
        assert_eq!(call("ndvi", &[Value::Float(0.0), Value::Float(0.0)]).unwrap(), Value::Float(0.0));
    }

    #[test]
    fn test_dotpr_and_conv() {
        let k = Value::Matrix(Matrix::new(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap());
        let a = Value::Matrix(Matrix::new(2, 2, vec![2.0, 5.0, 7.0, 3.0]).unwrap());
        let b = Value::Matrix(Matrix::filled(2, 2, 1.0));
        assert_eq!(call("dotpr", &[k.clone(), a.clone(), b]).unwrap(), row(&[5.0, 2.0]));
        assert!(call("conv", &[k, row(&[1.0, 2.0])]).is_err());
    }

    #[test]
    fn test_cat_mixes_scalars_and_vectors() {
        let out = call("cat", &[Value::Integer(1), row(&[2.0, 3.0]), Value::Float(4.5)]).unwrap();
        assert_eq!(out, row(&[1.0, 2.0, 3.0, 4.5]));
    }

    #[test]
    fn test_reductions() {
        let m = Value::Matrix(Matrix::new(3, 3, vec![1.0, 2.0, 2.0, 3.0, 9.0, 2.0, 4.0, 5.0, 8.0]).unwrap());
        assert_eq!(call("mean", &[m.clone(), Value::Float(3.0)]).unwrap(), row(&[4.0, 3.0]));
        assert_eq!(call("median", &[m.clone()]).unwrap(), row(&[3.0]));
        assert_eq!(call("maj", &[m.clone()]).unwrap(), row(&[2.0]));
        assert_eq!(call("var", &[row(&[1.0, 3.0])]).unwrap(), row(&[1.0]));
        assert_eq!(call("vmax", &[m.clone()]).unwrap(), row(&[9.0]));
        assert_eq!(call("vmin", &[m]).unwrap(), row(&[1.0]));
    }

    #[test]
    fn test_majority_counts_last_run() {
        assert_eq!(majority(&[1.0, 2.0, 2.0, 2.0]), 2.0);
        assert_eq!(majority(&[5.0]), 5.0);
    }

    #[test]
    fn test_vnorm_and_vect2scal() {
        let norm = call("vnorm", &[row(&[3.0, 4.0])]).unwrap();
        assert_eq!(norm, row(&[5.0]));
        assert_eq!(call("vect2scal", &[norm]).unwrap(), Value::Float(5.0));
        assert!(call("vect2scal", &[row(&[1.0, 2.0])]).is_err());
    }

    #[test]
    fn test_corr() {
        let a = row(&[1.0, 2.0, 3.0]);
        let b = row(&[2.0, 4.0, 6.0]);
        match call("corr", &[a, b]).unwrap() {
            Value::Float(c) => assert!((c - 1.0).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_scalar_math() {
        assert_eq!(call("abs", &[Value::Integer(-3)]).unwrap(), Value::Integer(3));
        assert_eq!(call("sqrt", &[Value::Float(16.0)]).unwrap(), Value::Float(4.0));
        assert_eq!(call("min", &[Value::Integer(4), Value::Integer(2)]).unwrap(), Value::Integer(2));
        assert_eq!(call("max", &[Value::Integer(4), Value::Float(5.5)]).unwrap(), Value::Float(5.5));
        assert_eq!(call("vabs", &[row(&[-1.0, 2.0])]).unwrap(), row(&[1.0, 2.0]));
        assert!(call("sqrt", &[row(&[1.0, 2.0])]).is_err());
    }
}
