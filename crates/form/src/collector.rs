use crate::tree::{parse_field_name, ElementKind, FormTree};
use crate::validator::FieldValidator;
use condeval_protocol::FormData;
use log::warn;
use std::collections::HashSet;

/// Read the form tree into a canonical [`FormData`] snapshot.
///
/// Checkboxes contribute `"1"`/`"0"`; a hidden element sharing its
/// name with a checkbox is the checkbox's default companion and is
/// skipped; unchecked radios are skipped entirely. Every value runs
/// through the validator; a failing value is still included with its
/// best-effort sanitized form so one bad field never blocks an
/// evaluation, but the failure is logged.
pub fn collect_form_data(tree: &FormTree, validator: &FieldValidator) -> FormData {
    let checkbox_names: HashSet<&str> = tree
        .inputs()
        .filter_map(|id| tree.element(id))
        .filter(|el| el.kind == ElementKind::Checkbox)
        .map(|el| el.name.as_str())
        .collect();

    let mut data = FormData::new();
    for id in tree.inputs() {
        let Some(el) = tree.element(id) else { continue };

        let raw_value = match el.kind {
            ElementKind::Hidden if checkbox_names.contains(el.name.as_str()) => continue,
            ElementKind::Checkbox => {
                if el.checked {
                    "1".to_string()
                } else {
                    "0".to_string()
                }
            }
            ElementKind::Radio => {
                if !el.checked {
                    continue;
                }
                el.value.clone()
            }
            _ => el.value.clone(),
        };

        let field = parse_field_name(&el.name, tree.form_id())
            .unwrap_or_else(|| el.name.clone());

        let outcome = validator.validate_field(&field, &raw_value);
        if !outcome.is_valid {
            warn!(
                "Field '{field}' failed validation ({}); submitting sanitized value",
                outcome.error_message.as_deref().unwrap_or("no message")
            );
        }
        data.insert(field, outcome.sanitized_value.to_string());
    }
    data
}
