//! Conditional field visibility
//!
//! Pure functions of a field's `visibleWhen` condition and the current form
//! values. Nothing is cached: sibling values change on every edit.

use crate::schema::{is_blank, strict_eq, ConditionOperator, FieldSchema, FormSchema, FormValues};
use serde_json::Value;

/// Whether `field` should be rendered and validated given `values`
pub fn is_visible(field: &FieldSchema, values: &FormValues) -> bool {
    let Some(condition) = &field.visible_when else {
        return true;
    };
    let current = values.get(&condition.field);

    match condition.operator {
        ConditionOperator::Equals => current.is_some_and(|v| strict_eq(v, &condition.value)),
        ConditionOperator::NotEquals => !current.is_some_and(|v| strict_eq(v, &condition.value)),
        ConditionOperator::Contains => match current {
            Some(Value::Array(items)) => items.iter().any(|item| strict_eq(item, &condition.value)),
            _ => false,
        },
        ConditionOperator::Exists => !is_blank(current),
    }
}

/// Fields of `form` that are currently visible, in declaration order
pub fn visible_fields<'a>(form: &'a FormSchema, values: &'a FormValues) -> impl Iterator<Item = &'a FieldSchema> + 'a {
    form.fields.iter().filter(move |f| is_visible(f, values))
}
