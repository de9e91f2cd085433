//! Free-text criterion parsing: `"<category> <op> <value>"`.
//!
//! Grounded on `run_central.py::ask_for_criteria`'s interactive prompt
//! and `box.py::_gather_box_data_for_request`'s three-operator,
//! try-int-then-float-else-reject value parsing. The category name is
//! resolved against the dataset's header row here, at the CLI boundary,
//! before a [`Criterion`] (which only knows attribute *indices*) is
//! ever constructed — `tips-transport`'s wire type never sees category
//! names.
//!
//! A criterion's value is always numeric, matching
//! `_gather_box_data_for_request`'s int-then-float parse (this crate's
//! [`AttrValue`] has no float variant, so only the int attempt applies);
//! a value that doesn't parse is rejected here rather than silently
//! kept as a categorical string.

use std::io::{self, BufRead, Write};

use thiserror::Error;
use tips_hierarchy::AttrValue;
use tips_transport::{Criterion, CriterionOp};

/// A malformed or unresolvable criterion string.
#[derive(Debug, Error)]
pub enum CriteriaError {
    /// The string did not split into exactly three whitespace-separated
    /// tokens.
    #[error("criterion must be of the form '<category> <op> <value>', got {0:?}")]
    WrongArity(String),
    /// The operator token was not `=`, `<`, or `>`.
    #[error("unknown comparison operator {0:?}, expected one of =, <, >")]
    UnknownOperator(String),
    /// The category name did not match any column in the dataset's
    /// header row.
    #[error("criterion category {0:?} is not present in this dataset")]
    UnknownCategory(String),
    /// The value token did not parse as a number. Per spec.md §7's
    /// "invalid criterion" taxonomy, an unparseable numeric value empties
    /// the local dataset rather than being kept as a categorical value.
    #[error("criterion value {0:?} is not a number")]
    NotNumeric(String),
}

/// Parse one `"<category> <op> <value>"` string into a wire
/// [`Criterion`], resolving `category` against `headers`.
pub fn parse_criterion(text: &str, headers: &[String]) -> Result<Criterion, CriteriaError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let [category, op, raw_value] = tokens[..] else {
        return Err(CriteriaError::WrongArity(text.to_string()));
    };

    let op = match op {
        "=" => CriterionOp::Eq,
        "<" => CriterionOp::Lt,
        ">" => CriterionOp::Gt,
        other => return Err(CriteriaError::UnknownOperator(other.to_string())),
    };

    let attribute = headers
        .iter()
        .position(|h| h == category)
        .ok_or_else(|| CriteriaError::UnknownCategory(category.to_string()))? as u32;

    let value = raw_value
        .parse::<i64>()
        .map(AttrValue::Int)
        .map_err(|_| CriteriaError::NotNumeric(raw_value.to_string()))?;

    Ok(Criterion { attribute, op, value })
}

/// Parse every comma-separated criterion in `--criteria "Age < 65,Sex = 1"`.
pub fn parse_criteria_list(
    text: &str,
    headers: &[String],
) -> Result<Vec<Criterion>, CriteriaError> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_criterion(s, headers))
        .collect()
}

/// Prompt on stdin for criteria, one `"<category> <op> <value>"` line at a
/// time, until an empty line ends input. A line that fails to parse is
/// reported and re-prompted rather than aborting the whole request.
pub fn ask_for_criteria(headers: &[String]) -> io::Result<Vec<Criterion>> {
    let stdin = io::stdin();
    let mut criteria = Vec::new();
    loop {
        print!(
            "Criterion {} (<category> <op> <value>, empty line to finish): ",
            criteria.len() + 1
        );
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }

        match parse_criterion(line.trim(), headers) {
            Ok(criterion) => criteria.push(criterion),
            Err(err) => println!("{err}, try again"),
        }
    }
    Ok(criteria)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        vec!["Center".into(), "Age".into(), "Sex".into()]
    }

    #[test]
    fn parses_numeric_criterion() {
        let c = parse_criterion("Age < 65", &headers()).unwrap();
        assert_eq!(c.attribute, 1);
        assert!(matches!(c.op, CriterionOp::Lt));
        assert_eq!(c.value, AttrValue::Int(65));
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = parse_criterion("Age != 65", &headers()).unwrap_err();
        assert!(matches!(err, CriteriaError::UnknownOperator(_)));
    }

    #[test]
    fn rejects_unknown_category() {
        let err = parse_criterion("Weight < 80", &headers()).unwrap_err();
        assert!(matches!(err, CriteriaError::UnknownCategory(_)));
    }

    #[test]
    fn rejects_non_numeric_value() {
        let err = parse_criterion("Sex = male", &headers()).unwrap_err();
        assert!(matches!(err, CriteriaError::NotNumeric(_)));
    }

    #[test]
    fn parses_comma_separated_list() {
        let list = parse_criteria_list("Age < 65, Sex = 1", &headers()).unwrap();
        assert_eq!(list.len(), 2);
    }
}
