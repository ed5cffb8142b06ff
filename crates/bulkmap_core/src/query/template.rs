//! Placeholder expansion for hand-written SQL templates.
//!
//! # Responsibility
//! - Match one unescaped `?` per argument, left to right.
//! - Rewrite a list argument's placeholder into `(?,?,...)` and flatten its
//!   elements into the bound argument list. A placeholder the template
//!   already parenthesizes, as in `IN (?)`, reuses those parentheses.
//!
//! # Invariants
//! - `\?` is copied to the output unchanged and consumes no argument.
//! - Running out of placeholders before arguments is a usage error.
//! - Text after the last consumed placeholder is copied verbatim.

use crate::error::{MapResult, MapperError};
use crate::model::value::FieldValue;
use crate::query::sql::placeholder_group;

/// Template rewritten for the driver, with its flattened arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedQuery {
    pub sql: String,
    pub args: Vec<FieldValue>,
}

pub fn expand_template(template: &str, args: Vec<FieldValue>) -> MapResult<ExpandedQuery> {
    let supplied = args.len();
    let mut sql = String::with_capacity(template.len() + supplied * 2);
    let mut flat = Vec::with_capacity(supplied);
    let mut cursor = 0;

    for (position, arg) in args.into_iter().enumerate() {
        let marker = next_placeholder(template, cursor).ok_or_else(|| {
            MapperError::usage(format!(
                "supplied query and replaceable arguments don't match: \
                 no placeholder left for argument {} of {supplied}",
                position + 1
            ))
        })?;

        sql.push_str(&template[cursor..marker]);
        cursor = marker + 1;

        match arg {
            FieldValue::List(items) if is_enclosed(template, marker) => {
                let group = placeholder_group(items.len());
                sql.push_str(&group[1..group.len() - 1]);
                flat.extend(items);
            }
            FieldValue::List(items) => {
                sql.push_str(&placeholder_group(items.len()));
                flat.extend(items);
            }
            single => {
                sql.push('?');
                flat.push(single);
            }
        }
    }

    sql.push_str(&template[cursor..]);
    Ok(ExpandedQuery { sql, args: flat })
}

fn is_enclosed(template: &str, marker: usize) -> bool {
    template[..marker].trim_end().ends_with('(')
        && template[marker + 1..].trim_start().starts_with(')')
}

fn next_placeholder(template: &str, from: usize) -> Option<usize> {
    let bytes = template.as_bytes();
    let mut search = from;
    while let Some(offset) = template[search..].find('?') {
        let marker = search + offset;
        if marker > 0 && bytes[marker - 1] == b'\\' {
            search = marker + 1;
            continue;
        }
        return Some(marker);
    }
    None
}
