//! Small pure helpers for labeled `break`/`continue` matching and `switch`
//! case selection. The loop/switch statement bodies themselves are
//! evaluated by `evaluator::mod`'s `eval_statement`, since running a loop
//! body needs the full `eval_statement`/`eval_block` machinery; this module
//! only factors out the parts that are pure data decisions.

use crate::value::Value;

/// `true` if a `break`/`continue`'s optional label matches the label a
/// loop/`switch` is currently wrapped in. An unlabeled `break`/`continue`
/// (`target is None`) always matches the nearest enclosing loop/switch.
#[must_use]
pub fn label_matches(break_label: &Option<String>, enclosing_label: &Option<String>) -> bool {
    match break_label {
        None => true,
        Some(l) => enclosing_label.as_deref() == Some(l.as_str()),
    }
}

/// Finds the index of the first `case` whose test is `===` to
/// `discriminant`, falling back to the `default:` case (if any). Returns
/// `None` if neither matches, meaning the whole `switch` body is skipped.
#[must_use]
pub fn select_case(discriminant: &Value, tests: &[Option<Value>]) -> Option<usize> {
    for (index, test) in tests.iter().enumerate() {
        if let Some(test) = test {
            if discriminant.strict_equals(test) {
                return Some(index);
            }
        }
    }
    tests.iter().position(Option::is_none)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlabeled_break_matches_any_loop() {
        assert!(label_matches(&None, &Some("outer".to_string())));
    }

    #[test]
    fn labeled_break_requires_matching_label() {
        assert!(!label_matches(&Some("inner".to_string()), &Some("outer".to_string())));
        assert!(label_matches(&Some("outer".to_string()), &Some("outer".to_string())));
    }

    #[test]
    fn select_case_falls_back_to_default() {
        let tests = vec![Some(Value::Number(1.0)), None, Some(Value::Number(2.0))];
        assert_eq!(select_case(&Value::Number(2.0), &tests), Some(2));
        assert_eq!(select_case(&Value::Number(99.0), &tests), Some(1));
    }
}
