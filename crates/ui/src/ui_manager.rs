use crate::accessibility::AccessibilityManager;
use crate::{lock_tree, SharedTree};
use condeval_form::{ElementId, ElementKind, FormTree, HIDDEN_CLASS, MARKER_CLASS};
use condeval_protocol::{EngineError, FieldStateMap};
use log::{debug, warn};
use std::sync::Mutex;

type RetryCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct UiState {
    loading_surface: Option<ElementId>,
    error_surface: Option<ElementId>,
    retry_button: Option<ElementId>,
    loading_visible: bool,
    error_visible: bool,
    retry_callback: Option<RetryCallback>,
    destroyed: bool,
}

/// Applies evaluation results to the form tree and owns the injected
/// loading/error surfaces and the retry affordance.
///
/// This manager and the [`AccessibilityManager`] are the only
/// components that mutate the tree; the engine only reads it.
pub struct UiManager {
    tree: SharedTree,
    state: Mutex<UiState>,
}

impl UiManager {
    pub fn new(tree: SharedTree) -> Self {
        Self {
            tree,
            state: Mutex::new(UiState::default()),
        }
    }

    /// Inject the status surfaces and hide every conditional field so
    /// nothing flashes visible before the first evaluation lands.
    pub fn initialize(&self) {
        let mut tree = lock_tree(&self.tree);
        let loading = tree.add_bare(ElementKind::Surface, "cond-loading", "Evaluating…");
        tree.set_attr(loading, "hidden", "");
        let error = tree.add_bare(ElementKind::Surface, "cond-error", "");
        tree.set_attr(error, "role", "alert");
        tree.set_attr(error, "hidden", "");
        let retry = tree.add_bare(ElementKind::Button, "cond-retry", "Try again");
        tree.set_attr(retry, "hidden", "");

        hide_all_conditional_fields(&mut tree);
        drop(tree);

        let mut state = self.lock_state();
        state.loading_surface = Some(loading);
        state.error_surface = Some(error);
        state.retry_button = Some(retry);
    }

    /// Apply a field state map, returning the human-readable change
    /// descriptions that were announced.
    pub fn update_fields(
        &self,
        states: &FieldStateMap,
        a11y: &AccessibilityManager,
    ) -> Vec<String> {
        let mut changes = Vec::new();
        let mut enhanced = Vec::new();

        {
            let mut tree = lock_tree(&self.tree);
            for (field_id, state) in states {
                let Some(input) = tree.find_field(field_id) else {
                    let err = EngineError::InvalidFieldState {
                        field_id: field_id.clone(),
                        reason: "no element with the composed field name".to_string(),
                    };
                    warn!("{err}");
                    continue;
                };
                let label = tree.label_of(input);
                let was_focused = tree.focused() == Some(input);
                let wrapper = tree.wrapper_of(input);

                // Unwrapped fields have no visibility to toggle, and
                // no visibility transition to describe.
                let was_visible = wrapper
                    .map(|w| !tree.element(w).is_some_and(|el| el.has_class(HIDDEN_CLASS)));
                let was_required = tree
                    .element(input)
                    .is_some_and(|el| el.attr("required").is_some());

                if let Some(w) = wrapper {
                    if state.visible {
                        tree.remove_class(w, HIDDEN_CLASS);
                        tree.remove_attr(w, "hidden");
                        tree.remove_attr(input, "inert");
                    } else {
                        tree.add_class(w, HIDDEN_CLASS);
                        tree.set_attr(w, "hidden", "");
                        tree.set_attr(input, "inert", "");
                    }
                }
                if state.required {
                    tree.set_attr(input, "required", "");
                } else {
                    tree.remove_attr(input, "required");
                }

                if was_visible.is_some_and(|was| was != state.visible) {
                    changes.push(if state.visible {
                        format!("{label} is now available")
                    } else {
                        format!("{label} is now hidden")
                    });
                }
                if was_required != state.required {
                    changes.push(if state.required {
                        format!("{label} is now required")
                    } else {
                        format!("{label} is no longer required")
                    });
                }

                if was_visible == Some(true) && !state.visible && was_focused {
                    enhanced.push((input, true));
                } else {
                    enhanced.push((input, false));
                }
            }
        }

        for (input, hand_off_focus) in enhanced {
            if hand_off_focus {
                a11y.handle_field_hidden(input);
            }
            a11y.enhance_field_aria(input);
        }

        // One batched announcement per evaluation, not one per field.
        a11y.announce_field_changes(&changes);
        changes
    }

    /// Show the loading surface. Showing twice is a no-op beyond
    /// visibility.
    pub fn show_loading(&self) {
        let surface = {
            let mut state = self.lock_state();
            if state.loading_visible {
                return;
            }
            state.loading_visible = true;
            state.loading_surface
        };
        if let Some(surface) = surface {
            lock_tree(&self.tree).remove_attr(surface, "hidden");
        }
    }

    pub fn hide_loading(&self) {
        let surface = {
            let mut state = self.lock_state();
            if !state.loading_visible {
                return;
            }
            state.loading_visible = false;
            state.loading_surface
        };
        if let Some(surface) = surface {
            lock_tree(&self.tree).set_attr(surface, "hidden", "");
        }
    }

    /// Surface an error message, optionally with the retry control.
    pub fn show_error(&self, message: &str, offer_retry: bool) {
        let (error, retry) = {
            let mut state = self.lock_state();
            state.error_visible = true;
            (state.error_surface, state.retry_button)
        };
        let mut tree = lock_tree(&self.tree);
        if let Some(error) = error {
            tree.element_mut(error).value = message.to_string();
            tree.remove_attr(error, "hidden");
        }
        if let Some(retry) = retry {
            if offer_retry {
                tree.remove_attr(retry, "hidden");
            } else {
                tree.set_attr(retry, "hidden", "");
            }
        }
    }

    /// Hide the error surface; a no-op when already hidden.
    pub fn hide_error(&self) {
        let (error, retry) = {
            let mut state = self.lock_state();
            if !state.error_visible {
                return;
            }
            state.error_visible = false;
            (state.error_surface, state.retry_button)
        };
        let mut tree = lock_tree(&self.tree);
        if let Some(error) = error {
            tree.element_mut(error).value.clear();
            tree.set_attr(error, "hidden", "");
        }
        if let Some(retry) = retry {
            tree.set_attr(retry, "hidden", "");
        }
    }

    /// Mark failing fields invalid and announce the messages.
    pub fn show_validation_errors(
        &self,
        errors: &[(String, String)],
        a11y: &AccessibilityManager,
    ) {
        let mut messages = Vec::with_capacity(errors.len());
        {
            let mut tree = lock_tree(&self.tree);
            for (field_id, message) in errors {
                if let Some(input) = tree.find_field(field_id) {
                    tree.set_attr(input, "aria-invalid", "true");
                }
                messages.push(message.clone());
            }
        }
        a11y.announce_validation_errors(&messages);
    }

    pub fn clear_validation_errors(&self, a11y: &AccessibilityManager) {
        {
            let mut tree = lock_tree(&self.tree);
            let inputs: Vec<ElementId> = tree.inputs().collect();
            for input in inputs {
                tree.remove_attr(input, "aria-invalid");
            }
        }
        a11y.clear_validation_errors();
    }

    /// Register the callback the retry control invokes; replaces any
    /// previously registered one.
    pub fn set_retry_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.lock_state().retry_callback = Some(Box::new(callback));
    }

    /// Invoke the most recently registered retry callback (hosts call
    /// this when the retry control is activated).
    pub fn trigger_retry(&self) {
        let state = self.lock_state();
        if let Some(callback) = &state.retry_callback {
            debug!("retry control activated");
            callback();
        }
    }

    /// Remove the injected surfaces exactly once.
    pub fn destroy(&self) {
        let (loading, error, retry) = {
            let mut state = self.lock_state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.retry_callback = None;
            (
                state.loading_surface.take(),
                state.error_surface.take(),
                state.retry_button.take(),
            )
        };
        let mut tree = lock_tree(&self.tree);
        for id in [loading, error, retry].into_iter().flatten() {
            tree.remove(id);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, UiState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn hide_all_conditional_fields(tree: &mut FormTree) {
    let wrappers: Vec<ElementId> = tree
        .ids()
        .filter(|id| tree.element(*id).is_some_and(|el| el.has_class(MARKER_CLASS)))
        .collect();
    let inputs: Vec<(ElementId, Option<ElementId>)> = tree
        .inputs()
        .map(|input| (input, tree.wrapper_of(input)))
        .collect();
    for wrapper in &wrappers {
        tree.add_class(*wrapper, HIDDEN_CLASS);
        tree.set_attr(*wrapper, "hidden", "");
    }
    for (input, wrapper) in inputs {
        if wrapper.is_some() {
            tree.set_attr(input, "inert", "");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share_tree;
    use condeval_protocol::FieldState;
    use pretty_assertions::assert_eq;

    fn setup() -> (SharedTree, UiManager, AccessibilityManager) {
        let mut tree = FormTree::new("contact");
        let email = tree.add_text_field("email");
        tree.element_mut(email).value = String::new();
        tree.add_checkbox("newsletter", false);
        let tree = share_tree(tree);
        let ui = UiManager::new(SharedTree::clone(&tree));
        let a11y = AccessibilityManager::new(SharedTree::clone(&tree));
        ui.initialize();
        (tree, ui, a11y)
    }

    fn field_states(entries: &[(&str, bool, bool)]) -> FieldStateMap {
        entries
            .iter()
            .map(|(id, visible, required)| {
                (id.to_string(), FieldState::new(*visible, *required))
            })
            .collect()
    }

    #[test]
    fn test_initialize_hides_conditional_fields() {
        let (tree, _ui, _a11y) = setup();
        let guard = lock_tree(&tree);
        let email = guard.find_field("email").unwrap();
        let wrapper = guard.wrapper_of(email).unwrap();
        assert!(guard.element(wrapper).unwrap().has_class(HIDDEN_CLASS));
        assert!(guard.element(email).unwrap().attr("inert").is_some());
    }

    #[test]
    fn test_update_fields_shows_and_requires() {
        let (tree, ui, a11y) = setup();
        let changes = ui.update_fields(&field_states(&[("email", true, true)]), &a11y);
        assert_eq!(
            changes,
            vec![
                "Email is now available".to_string(),
                "Email is now required".to_string()
            ]
        );
        let guard = lock_tree(&tree);
        let email = guard.find_field("email").unwrap();
        let el = guard.element(email).unwrap();
        assert!(el.attr("required").is_some());
        assert_eq!(el.attr("aria-required"), Some("true"));
        assert!(el.attr("inert").is_none());
    }

    #[test]
    fn test_no_change_no_announcement() {
        let (_tree, ui, a11y) = setup();
        ui.update_fields(&field_states(&[("email", true, false)]), &a11y);
        let before = a11y.announcements().len();
        // Same state again: nothing to describe.
        let changes = ui.update_fields(&field_states(&[("email", true, false)]), &a11y);
        assert!(changes.is_empty());
        assert_eq!(a11y.announcements().len(), before);
    }

    #[test]
    fn test_hiding_focused_field_hands_off_focus() {
        let (tree, ui, a11y) = setup();
        ui.update_fields(
            &field_states(&[("email", true, false), ("newsletter", true, false)]),
            &a11y,
        );
        {
            let mut guard = lock_tree(&tree);
            let email = guard.find_field("email").unwrap();
            guard.set_focus(Some(email));
        }
        ui.update_fields(&field_states(&[("email", false, false)]), &a11y);
        let guard = lock_tree(&tree);
        let newsletter = guard.find_field("newsletter").unwrap();
        assert_eq!(guard.focused(), Some(newsletter));
    }

    #[test]
    fn test_unwrapped_field_gets_no_visibility_transition() {
        let (tree, ui, a11y) = setup();
        {
            let mut guard = lock_tree(&tree);
            guard.add_bare(ElementKind::Text, "contact[phone]", "");
        }
        // Only the required change is real; there is no wrapper whose
        // visibility could have flipped.
        let changes = ui.update_fields(&field_states(&[("phone", false, true)]), &a11y);
        assert_eq!(changes, vec!["Phone is now required".to_string()]);
        let guard = lock_tree(&tree);
        let phone = guard.find_field("phone").unwrap();
        assert!(guard.element(phone).unwrap().attr("required").is_some());
        assert!(guard.element(phone).unwrap().attr("inert").is_none());
    }

    #[test]
    fn test_unknown_field_is_skipped() {
        let (_tree, ui, a11y) = setup();
        let changes = ui.update_fields(&field_states(&[("ghost", true, true)]), &a11y);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_loading_surface_idempotent() {
        let (tree, ui, _a11y) = setup();
        ui.show_loading();
        ui.show_loading();
        {
            let guard = lock_tree(&tree);
            let loading = guard.find_input_by_name("cond-loading");
            assert!(loading.is_none()); // surfaces are not inputs
            let surface = guard
                .ids()
                .find(|id| {
                    guard
                        .element(*id)
                        .is_some_and(|el| el.name == "cond-loading")
                })
                .unwrap();
            assert!(guard.element(surface).unwrap().attr("hidden").is_none());
        }
        ui.hide_loading();
        ui.hide_loading();
        let guard = lock_tree(&tree);
        let surface = guard
            .ids()
            .find(|id| {
                guard
                    .element(*id)
                    .is_some_and(|el| el.name == "cond-loading")
            })
            .unwrap();
        assert!(guard.element(surface).unwrap().attr("hidden").is_some());
    }

    #[test]
    fn test_error_surface_and_retry() {
        let (tree, ui, _a11y) = setup();
        ui.show_error("Evaluation timed out after 30000ms", true);
        {
            let guard = lock_tree(&tree);
            let error = guard
                .ids()
                .find(|id| guard.element(*id).is_some_and(|el| el.name == "cond-error"))
                .unwrap();
            let retry = guard
                .ids()
                .find(|id| guard.element(*id).is_some_and(|el| el.name == "cond-retry"))
                .unwrap();
            assert_eq!(
                guard.element(error).unwrap().value,
                "Evaluation timed out after 30000ms"
            );
            assert!(guard.element(error).unwrap().attr("hidden").is_none());
            assert!(guard.element(retry).unwrap().attr("hidden").is_none());
        }
        ui.hide_error();
        ui.hide_error(); // no-op
        let guard = lock_tree(&tree);
        let error = guard
            .ids()
            .find(|id| guard.element(*id).is_some_and(|el| el.name == "cond-error"))
            .unwrap();
        assert!(guard.element(error).unwrap().attr("hidden").is_some());
        assert!(guard.element(error).unwrap().value.is_empty());
    }

    #[test]
    fn test_latest_retry_callback_wins() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let (_tree, ui, _a11y) = setup();
        let hits = Arc::new(AtomicU32::new(0));
        let first = Arc::clone(&hits);
        ui.set_retry_callback(move || {
            first.fetch_add(1, Ordering::SeqCst);
        });
        let second = Arc::clone(&hits);
        ui.set_retry_callback(move || {
            second.fetch_add(10, Ordering::SeqCst);
        });
        ui.trigger_retry();
        assert_eq!(hits.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_validation_error_marks_fields() {
        let (tree, ui, a11y) = setup();
        ui.show_validation_errors(
            &[("email".to_string(), "email is required".to_string())],
            &a11y,
        );
        {
            let guard = lock_tree(&tree);
            let email = guard.find_field("email").unwrap();
            assert_eq!(guard.element(email).unwrap().attr("aria-invalid"), Some("true"));
        }
        assert!(a11y
            .announcements()
            .last()
            .unwrap()
            .contains("email is required"));
        ui.clear_validation_errors(&a11y);
        let guard = lock_tree(&tree);
        let email = guard.find_field("email").unwrap();
        assert!(guard.element(email).unwrap().attr("aria-invalid").is_none());
    }

    #[test]
    fn test_destroy_removes_surfaces_once() {
        let (tree, ui, _a11y) = setup();
        let before = lock_tree(&tree).ids().count();
        ui.destroy();
        ui.destroy();
        let after = lock_tree(&tree).ids().count();
        assert_eq!(before - after, 3);
    }
}
