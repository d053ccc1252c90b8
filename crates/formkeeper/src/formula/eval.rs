//! Formula evaluation against a scope of named field values.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tracing::trace;

use super::parser::{parse, Expr, Op};
use crate::record::Value;

/// Named values a formula can reference.
pub type Scope = BTreeMap<String, Value>;

/// Characters outside the formula alphabet.
const DISALLOWED_PATTERN: &str = r"[^A-Za-z0-9_\s+\-*/().]";

/// Leading floating-point literal of a text value.
const NUMERIC_PREFIX_PATTERN: &str =
    r"^\s*[+-]?(?:Infinity|(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)";

fn disallowed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DISALLOWED_PATTERN).expect("Invalid regex pattern"))
}

fn numeric_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(NUMERIC_PREFIX_PATTERN).expect("Invalid regex pattern"))
}

/// Strip every character that is not alphanumeric, underscore, whitespace or
/// one of `+ - * / ( ) .`.
///
/// This does not check that the result is a well-formed formula.
#[must_use]
pub fn sanitize(expression: &str) -> Cow<'_, str> {
    disallowed().replace_all(expression, "")
}

/// Evaluate `expression` against `scope`.
///
/// Returns `None` (the empty marker) when the sanitized expression is empty,
/// fails to parse, or produces a non-finite result. Variables that are
/// missing from the scope, or whose values are not numeric, count as 0.
///
/// # Examples
///
/// ```
/// use formkeeper::formula::{evaluate, Scope};
/// use formkeeper::Value;
///
/// let mut scope = Scope::new();
/// scope.insert("nights_owned".into(), Value::Number(10.0));
/// scope.insert("nights_used_ytd".into(), Value::Text("3".into()));
///
/// assert_eq!(evaluate("nights_owned - nights_used_ytd", &scope), Some(7.0));
/// assert_eq!(evaluate("a + 5", &Scope::new()), Some(5.0));
/// assert_eq!(evaluate("nights_owned +", &scope), None);
/// ```
#[must_use]
pub fn evaluate(expression: &str, scope: &Scope) -> Option<f64> {
    let sanitized = sanitize(expression);
    if sanitized.trim().is_empty() {
        return None;
    }

    let expr = match parse(&sanitized) {
        Ok(expr) => expr,
        Err(e) => {
            trace!(formula = %sanitized, error = %e, "formula did not parse");
            return None;
        }
    };

    let result = eval_expr(&expr, scope);
    result.is_finite().then_some(result)
}

/// Evaluate an already-parsed expression. May return NaN or infinities.
///
/// Recursion follows the tree, whose depth [`parse`] keeps within its token
/// limit.
#[must_use]
pub fn eval_expr(expr: &Expr, scope: &Scope) -> f64 {
    match expr {
        Expr::Number(n) => *n,
        Expr::Variable(name) => scope.get(name).map_or(0.0, to_number),
        Expr::Neg(inner) => -eval_expr(inner, scope),
        Expr::BinaryOp { op, left, right } => {
            let l = eval_expr(left, scope);
            let r = eval_expr(right, scope);
            match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => l / r,
                Op::Pow => l.powf(r),
            }
        }
    }
}

/// Coerce a field value to a number for use in a formula.
///
/// Numbers are used as-is. Text has its thousands-separator commas removed
/// and its leading numeric literal parsed, so `"1,250.50 USD"` is 1250.5.
/// Anything else is 0.
#[must_use]
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::Text(text) => parse_number_prefix(&text.replace(',', "")).unwrap_or(0.0),
        Value::Empty => 0.0,
    }
}

fn parse_number_prefix(text: &str) -> Option<f64> {
    let literal = numeric_prefix().find(text)?;
    literal.as_str().trim_start().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(pairs: &[(&str, Value)]) -> Scope {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_missing_variable_is_zero() {
        assert_eq!(evaluate("a + 5", &Scope::new()), Some(5.0));
    }

    #[test]
    fn test_malformed_is_empty() {
        let s = scope(&[("a", Value::Number(1.0))]);
        assert_eq!(evaluate("a +", &s), None);
        assert_eq!(evaluate("", &Scope::new()), None);
        assert_eq!(evaluate("   ", &Scope::new()), None);
        assert_eq!(evaluate("(a", &s), None);
    }

    #[test]
    fn test_precedence_and_parentheses() {
        let s = scope(&[("a", Value::Number(2.0)), ("b", Value::Number(3.0))]);
        assert_eq!(evaluate("a + b * 4", &s), Some(14.0));
        assert_eq!(evaluate("(a + b) * 4", &s), Some(20.0));
        assert_eq!(evaluate("a ** b", &s), Some(8.0));
        assert_eq!(evaluate("-a + b", &s), Some(1.0));
    }

    #[test]
    fn test_division_by_zero_is_empty() {
        let s = scope(&[("total", Value::Number(3600.0)), ("nights", Value::Number(0.0))]);
        assert_eq!(evaluate("total / nights", &s), None);
        assert_eq!(evaluate("nights / nights", &s), None);
    }

    #[test]
    fn test_text_values_are_coerced() {
        let s = scope(&[
            ("price", Value::Text("1,250.50".to_string())),
            ("count", Value::Text(" 4 nights".to_string())),
            ("junk", Value::Text("n/a".to_string())),
            ("blank", Value::Empty),
        ]);
        assert_eq!(evaluate("price * 2", &s), Some(2501.0));
        assert_eq!(evaluate("count + 1", &s), Some(5.0));
        assert_eq!(evaluate("junk + 1", &s), Some(1.0));
        assert_eq!(evaluate("blank + 1", &s), Some(1.0));
    }

    #[test]
    fn test_sanitize_strips_disallowed_characters() {
        assert_eq!(sanitize("a + b; alert(1)"), "a + b alert(1)");
        assert_eq!(sanitize("`x` * 2"), "x * 2");
        assert_eq!(sanitize("a_1 - (b.c) / 3"), "a_1 - (b.c) / 3");
        assert_eq!(sanitize("a[0] == b ? c : d"), "a0  b  c  d");
    }

    #[test]
    fn test_injection_attempts_only_yield_numbers_or_empty() {
        let s = scope(&[("a", Value::Number(1.0))]);
        // After sanitizing, these are plain (if odd) arithmetic or garbage.
        assert_eq!(evaluate("a;", &s), Some(1.0));
        assert_eq!(evaluate("`a`", &s), Some(1.0));
        assert_eq!(evaluate("a; process.exit(1)", &s), None);
        assert_eq!(evaluate("constructor.constructor('x')()", &s), None);
        assert_eq!(evaluate("$a + 1", &s), Some(2.0));
    }

    #[test]
    fn test_non_finite_number_input_is_empty() {
        let s = scope(&[("a", Value::Text("Infinity".to_string()))]);
        assert_eq!(evaluate("a * 1", &s), None);
    }

    #[test]
    fn test_to_number() {
        assert!((to_number(&Value::Number(3.5)) - 3.5).abs() < f64::EPSILON);
        assert!((to_number(&Value::Text("1,000".to_string())) - 1000.0).abs() < f64::EPSILON);
        assert!((to_number(&Value::Text("-2.5e2".to_string())) + 250.0).abs() < f64::EPSILON);
        assert!(to_number(&Value::Text("abc".to_string())).abs() < f64::EPSILON);
        assert!(to_number(&Value::Empty).abs() < f64::EPSILON);
    }

    #[test]
    fn test_oversized_formulas_are_empty() {
        let s = scope(&[("a", Value::Number(1.0))]);

        let deep = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(evaluate(&deep, &s), None);

        let long_sum = vec!["a"; 300_000].join("+");
        assert_eq!(evaluate(&long_sum, &s), None);

        let short_sum = vec!["a"; 200].join("+");
        assert_eq!(evaluate(&short_sum, &s), Some(200.0));
    }

    #[test]
    fn test_signed_power_base_is_empty() {
        let s = scope(&[("a", Value::Number(3.0))]);
        assert_eq!(evaluate("-a ** 2", &s), None);
        assert_eq!(evaluate("(-a) ** 2", &s), Some(9.0));
        assert_eq!(evaluate("-(a ** 2)", &s), Some(-9.0));
        assert_eq!(evaluate("2 ** -1", &s), Some(0.5));
    }

    #[test]
    fn test_literal_exponent() {
        assert_eq!(evaluate("1e3 / 10", &Scope::new()), Some(100.0));
    }
}
