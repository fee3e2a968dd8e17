// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Selector matching.
//!
//! A selector is a JSON array describing what happened, for example
//! `[23, "Pendants", "OUTPUT", 1, 75]`. A registered selector matches an
//! observed one when
//!
//! ```text
//! (registered[0] == observed[0] || contains(registered[1], observed[1]))
//!     && registered[2..] == observed[2..]
//! ```
//!
//! so field 0 is matched exactly while field 1 of the registration may list
//! several acceptable values. Numbers compare by value (`75` equals `75.0`).

use serde_json::Value;

/// Largest integer an `f64` holds exactly.
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Returns true if `observed` triggers a reaction registered with `registered`.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use porter_lib::brainstem::selector_matches;
///
/// let registered = json!([0, ["Sleep", "Goodnight"], "DEVICE", 1, 3]);
/// assert!(selector_matches(&registered, &json!([40, "Goodnight", "DEVICE", 1, 3])));
/// assert!(!selector_matches(&registered, &json!([40, "Goodnight", "DEVICE", 1, 4])));
/// ```
#[must_use]
pub fn selector_matches(registered: &Value, observed: &Value) -> bool {
    let (Some(registered), Some(observed)) = (registered.as_array(), observed.as_array()) else {
        return values_equal(registered, observed);
    };

    let head = match (registered.first(), observed.first()) {
        (Some(a), Some(b)) => values_equal(a, b),
        _ => false,
    };
    let member = match (registered.get(1), observed.get(1)) {
        (Some(set), Some(item)) => contains(set, item),
        _ => false,
    };
    if !head && !member {
        return false;
    }

    let registered_rest = registered.get(2..).unwrap_or_default();
    let observed_rest = observed.get(2..).unwrap_or_default();
    slices_equal(registered_rest, observed_rest)
}

/// Converts a protocol number to JSON, as an integer when it is whole.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < MAX_EXACT_INT {
        // Safe: whole and within the exact integer range
        #[allow(clippy::cast_possible_truncation)]
        let whole = value as i64;
        return Value::from(whole);
    }
    serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
}

#[allow(clippy::float_cmp)]
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => slices_equal(x, y),
        _ => a == b,
    }
}

fn slices_equal(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

/// Array membership, substring for strings, key presence for objects.
fn contains(container: &Value, item: &Value) -> bool {
    match (container, item) {
        (Value::Array(items), _) => items.iter().any(|candidate| values_equal(candidate, item)),
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}
