//! Context files.
//!
//! A context is a line-oriented text record of a session's user constants,
//! matrices and expressions:
//!
//! ```text
//! #I k 3
//! #F gain 0.5
//! #M weights { 1 , 2 , 3 ; 4 , 5 , 6 }
//! #E im1b1 * gain + k
//! ```
//!
//! Export writes integers, then floats, then matrices, then expressions.
//! Import skips blank lines and lines it does not recognize, and accepts the
//! directive letter in either case.

use crate::core::error::{ContextError, RegistryError};
use crate::engine::registry::parse_matrix_definition;
use crate::expr::value::{Matrix, Scalar};
use std::fmt::Write as _;

/// One recognized line of a context file.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// `#I` or `#F`.
    Constant { name: String, value: Scalar },
    /// `#M`, already split into rows and columns.
    Matrix {
        name: String,
        rows: usize,
        cols: usize,
        values: Vec<f64>,
    },
    /// `#E`, forwarded verbatim.
    Expression(String),
}

/// A directive and the 1-based line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextLine {
    pub line: usize,
    pub directive: Directive,
}

/// Parse a context text. `origin` names the text in the "nothing to import"
/// error.
pub fn parse_context(text: &str, origin: &str) -> Result<Vec<ContextLine>, ContextError> {
    let mut parsed = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let Some(rest) = raw.trim_start().strip_prefix('#') else {
            continue;
        };
        let mut chars = rest.chars();
        let Some(letter) = chars.next() else {
            continue;
        };
        let rest = chars.as_str();
        let payload = rest.trim();

        let directive = match letter.to_ascii_uppercase() {
            'I' | 'F' => parse_constant(line, letter.to_ascii_uppercase() == 'I', payload)?,
            'M' => parse_matrix(line, payload)?,
            'E' => {
                if payload.is_empty() {
                    return Err(ContextError::MissingExpression { line });
                }
                // only the separator after the directive is dropped
                let expression = rest.strip_prefix([' ', '\t']).unwrap_or(rest);
                Directive::Expression(expression.to_string())
            }
            _ => continue,
        };
        parsed.push(ContextLine { line, directive });
    }

    if parsed.is_empty() {
        return Err(ContextError::NothingToImport {
            origin: origin.to_string(),
        });
    }
    log::debug!("Parsed {} directive(s) from '{}'", parsed.len(), origin);
    Ok(parsed)
}

fn split_name(payload: &str) -> (&str, &str) {
    match payload.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (payload, ""),
    }
}

fn parse_constant(line: usize, integer: bool, payload: &str) -> Result<Directive, ContextError> {
    if payload.is_empty() {
        return Err(ContextError::MissingName { line });
    }
    let (name, value) = split_name(payload);
    if value.contains('{') {
        return Err(ContextError::MatrixWhereScalarExpected { line });
    }
    if value.is_empty() {
        return Err(ContextError::MissingValue {
            line,
            name: name.to_string(),
        });
    }

    let invalid = || ContextError::InvalidNumber {
        line,
        text: value.to_string(),
    };
    let value = if integer {
        Scalar::Integer(value.parse::<i64>().map_err(|_| invalid())?)
    } else {
        Scalar::Float(value.parse::<f64>().map_err(|_| invalid())?)
    };

    Ok(Directive::Constant {
        name: name.to_string(),
        value,
    })
}

fn parse_matrix(line: usize, payload: &str) -> Result<Directive, ContextError> {
    if payload.is_empty() {
        return Err(ContextError::MissingName { line });
    }
    let (name, definition) = split_name(payload);
    if !definition.starts_with('{') {
        return Err(ContextError::MissingMatrixDefinition {
            line,
            name: name.to_string(),
        });
    }
    let (rows, cols, values) =
        parse_matrix_definition(definition).map_err(|source| ContextError::Directive { line, source })?;
    Ok(Directive::Matrix {
        name: name.to_string(),
        rows,
        cols,
        values,
    })
}

/// Render a context: integers, floats, matrices, then expressions.
///
/// Non-finite values are refused since the importer could not read them back
/// as the same constant.
pub fn write_context<'a>(
    constants: impl IntoIterator<Item = (&'a str, Scalar)>,
    matrices: impl IntoIterator<Item = (&'a str, &'a Matrix)>,
    expressions: &[String],
) -> Result<String, ContextError> {
    let mut integers = String::new();
    let mut floats = String::new();
    for (name, value) in constants {
        match value {
            Scalar::Integer(i) => {
                let _ = writeln!(integers, "#I {} {}", name, i);
            }
            Scalar::Float(f) if f.is_finite() => {
                let _ = writeln!(floats, "#F {} {:?}", name, f);
            }
            Scalar::Float(_) => {
                return Err(ContextError::UnsupportedConstant { name: name.to_string() });
            }
        }
    }

    let mut out = integers;
    out.push_str(&floats);
    for (name, matrix) in matrices {
        if matrix.data().iter().any(|v| !v.is_finite()) {
            return Err(ContextError::UnsupportedConstant { name: name.to_string() });
        }
        let _ = writeln!(out, "#M {} {}", name, matrix);
    }
    for expression in expressions {
        let _ = writeln!(out, "#E {}", expression);
    }
    Ok(out)
}

/// Attach a line number to a registry failure raised while applying a
/// directive.
pub fn at_line(line: usize) -> impl Fn(RegistryError) -> ContextError {
    move |source| ContextError::Directive { line, source }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_directives() {
        let text = "\
#I k 3

   #f gain 0.5
#M w { 1 , 2 , 3 ; 4 , 5 , 6 }
#e im1b1 * gain + k
# a comment line
";
        let parsed = parse_context(text, "session").unwrap();
        assert_eq!(parsed.len(), 4);
        assert_eq!(
            parsed[0].directive,
            Directive::Constant {
                name: "k".to_string(),
                value: Scalar::Integer(3)
            }
        );
        assert_eq!(parsed[1].line, 3);
        assert_eq!(
            parsed[1].directive,
            Directive::Constant {
                name: "gain".to_string(),
                value: Scalar::Float(0.5)
            }
        );
        assert_eq!(
            parsed[2].directive,
            Directive::Matrix {
                name: "w".to_string(),
                rows: 2,
                cols: 3,
                values: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
            }
        );
        assert_eq!(parsed[3].directive, Directive::Expression("im1b1 * gain + k".to_string()));
    }

    #[test]
    fn test_expression_text_is_kept_verbatim() {
        let parsed = parse_context("#E  im1b1 +  2 \n#E\tcat(im1b1,im1b2)\n", "session").unwrap();
        assert_eq!(parsed[0].directive, Directive::Expression(" im1b1 +  2 ".to_string()));
        assert_eq!(parsed[1].directive, Directive::Expression("cat(im1b1,im1b2)".to_string()));

        let err = parse_context("#E   \n", "session").unwrap_err();
        assert!(matches!(err, ContextError::MissingExpression { line: 1 }));
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let err = parse_context("\n   \n", "empty.txt").unwrap_err();
        assert!(matches!(err, ContextError::NothingToImport { ref origin } if origin == "empty.txt"));
    }

    #[test]
    fn test_ragged_matrix_names_line() {
        let err = parse_context("#I a 1\n#M m { 1 , 2 ; 3 }", "ctx").unwrap_err();
        match err {
            ContextError::Directive { line, source } => {
                assert_eq!(line, 2);
                assert!(matches!(source, RegistryError::RaggedMatrix { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_constant_errors() {
        assert!(matches!(
            parse_context("#F", "ctx").unwrap_err(),
            ContextError::MissingName { line: 1 }
        ));
        assert!(matches!(
            parse_context("#F x", "ctx").unwrap_err(),
            ContextError::MissingValue { line: 1, .. }
        ));
        assert!(matches!(
            parse_context("#I x {1, 2}", "ctx").unwrap_err(),
            ContextError::MatrixWhereScalarExpected { line: 1 }
        ));
        assert!(matches!(
            parse_context("#I x 2.5", "ctx").unwrap_err(),
            ContextError::InvalidNumber { line: 1, .. }
        ));
        assert!(matches!(
            parse_context("#M m 1 2", "ctx").unwrap_err(),
            ContextError::MissingMatrixDefinition { line: 1, .. }
        ));
        assert!(matches!(
            parse_context("#E   ", "ctx").unwrap_err(),
            ContextError::MissingExpression { line: 1 }
        ));
    }

    #[test]
    fn test_write_orders_sections() {
        let m = Matrix::new(1, 2, vec![0.25, -1.0]).unwrap();
        let text = write_context(
            vec![("f", Scalar::Float(1.0)), ("i", Scalar::Integer(-2))],
            vec![("m", &m)],
            &["im1b1 + i".to_string()],
        )
        .unwrap();
        assert_eq!(text, "#I i -2\n#F f 1.0\n#M m { 0.25 , -1 }\n#E im1b1 + i\n");
    }

    #[test]
    fn test_written_context_parses_back() {
        let m = Matrix::new(2, 3, vec![1.5, 2.0, 3.0, 4.0, 5.0, 0.1]).unwrap();
        let text = write_context(
            vec![("third", Scalar::Float(1.0 / 3.0))],
            vec![("m", &m)],
            &["a".to_string(), "b".to_string()],
        )
        .unwrap();
        let parsed = parse_context(&text, "ctx").unwrap();
        assert_eq!(
            parsed[0].directive,
            Directive::Constant {
                name: "third".to_string(),
                value: Scalar::Float(1.0 / 3.0)
            }
        );
        assert_eq!(
            parsed[1].directive,
            Directive::Matrix {
                name: "m".to_string(),
                rows: 2,
                cols: 3,
                values: m.data().to_vec()
            }
        );
    }

    #[test]
    fn test_non_finite_constant_is_refused() {
        let err = write_context(vec![("bad", Scalar::Float(f64::NAN))], Vec::new(), &[]).unwrap_err();
        assert!(matches!(err, ContextError::UnsupportedConstant { ref name } if name == "bad"));
    }
}
