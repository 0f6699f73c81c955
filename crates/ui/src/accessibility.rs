use crate::{lock_tree, SharedTree};
use condeval_form::{ElementId, ElementKind, HIDDEN_CLASS, MARKER_CLASS};
use log::debug;
use std::sync::Mutex;
use std::time::Duration;

/// Delay before an announcement is written into the live region, so
/// assistive technology reliably detects the mutation.
const ANNOUNCE_DELAY: Duration = Duration::from_millis(50);
/// How long an announcement stays in the region before it is cleared,
/// making room for the next one instead of silently coalescing.
const CLEAR_DELAY: Duration = Duration::from_millis(1000);

struct AccessState {
    live_region: Option<ElementId>,
}

/// Keeps assistive technology in sync with the form: ARIA attributes,
/// focus handoff when a focused field hides, and batched live-region
/// announcements.
pub struct AccessibilityManager {
    tree: SharedTree,
    state: Mutex<AccessState>,
    /// Everything ever announced, for diagnostics and tests.
    log: Mutex<Vec<String>>,
}

impl AccessibilityManager {
    /// Create the manager and inject the off-screen live region.
    pub fn new(tree: SharedTree) -> Self {
        let live_region = {
            let mut tree = lock_tree(&tree);
            let id = tree.add_bare(ElementKind::LiveRegion, "cond-live-region", "");
            tree.add_class(id, "sr-only");
            tree.set_attr(id, "aria-live", "polite");
            tree.set_attr(id, "role", "status");
            id
        };
        Self {
            tree,
            state: Mutex::new(AccessState {
                live_region: Some(live_region),
            }),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Give every conditional wrapper a group role and label so the
    /// form reads as structured regions.
    pub fn setup_form_landmarks(&self) {
        let mut tree = lock_tree(&self.tree);
        let wrappers: Vec<ElementId> = tree
            .ids()
            .filter(|id| tree.element(*id).is_some_and(|el| el.has_class(MARKER_CLASS)))
            .collect();
        for wrapper in wrappers {
            tree.set_attr(wrapper, "role", "group");
        }
    }

    /// Sync ARIA attributes for one field after its state changed:
    /// `aria-required` mirrors the required attribute, `aria-hidden`
    /// and tab order mirror visibility.
    pub fn enhance_field_aria(&self, input: ElementId) {
        let mut tree = lock_tree(&self.tree);
        if tree.element(input).is_none() {
            return;
        }
        let required = tree
            .element(input)
            .is_some_and(|el| el.attr("required").is_some());
        tree.set_attr(input, "aria-required", if required { "true" } else { "false" });

        let hidden = tree
            .wrapper_of(input)
            .and_then(|w| tree.element(w))
            .is_some_and(|w| w.has_class(HIDDEN_CLASS));
        if let Some(wrapper) = tree.wrapper_of(input) {
            tree.set_attr(wrapper, "aria-hidden", if hidden { "true" } else { "false" });
        }
        tree.set_attr(input, "tabindex", if hidden { "-1" } else { "0" });
    }

    /// Focus handoff when the focused field is being hidden: move to
    /// the next focusable element in document order, else back to the
    /// top of the form.
    pub fn handle_field_hidden(&self, input: ElementId) {
        let mut tree = lock_tree(&self.tree);
        if tree.focused() != Some(input) {
            return;
        }
        let next = tree
            .next_focusable_after(input)
            .or_else(|| tree.first_focusable());
        debug!("focus handoff from hidden element {input} to {next:?}");
        tree.set_focus(next);
    }

    /// One batched announcement for a whole evaluation's worth of
    /// field changes, so rapid updates do not flood the reader.
    pub fn announce_field_changes(&self, changes: &[String]) {
        if changes.is_empty() {
            return;
        }
        self.announce(&changes.join(". "), false);
    }

    pub fn announce_validation_errors(&self, errors: &[String]) {
        if errors.is_empty() {
            return;
        }
        self.announce(&format!("Validation errors: {}", errors.join(". ")), true);
    }

    /// Drop whatever the live region currently says.
    pub fn clear_validation_errors(&self) {
        let region = self.lock_state().live_region;
        if let Some(region) = region {
            lock_tree(&self.tree).element_mut(region).value.clear();
        }
    }

    /// Write a message into the live region. The write lands after a
    /// short delay and is cleared later unless a newer announcement
    /// supersedes it; without an async runtime the write is immediate.
    pub fn announce(&self, message: &str, assertive: bool) {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).push(message.to_string());

        let Some(region) = self.lock_state().live_region else {
            return;
        };

        {
            let mut tree = lock_tree(&self.tree);
            if tree.element(region).is_none() {
                return;
            }
            tree.set_attr(region, "aria-live", if assertive { "assertive" } else { "polite" });
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let tree = SharedTree::clone(&self.tree);
                let message = message.to_string();
                handle.spawn(delayed_announce(tree, message, region));
            }
            Err(_) => {
                lock_tree(&self.tree).element_mut(region).value = message.to_string();
            }
        }
    }

    /// Announcements delivered so far, oldest first.
    pub fn announcements(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Remove the live region. Idempotent.
    pub fn destroy(&self) {
        let region = self.lock_state().live_region.take();
        if let Some(region) = region {
            lock_tree(&self.tree).remove(region);
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AccessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn delayed_announce(tree: SharedTree, message: String, region: ElementId) {
    tokio::time::sleep(ANNOUNCE_DELAY).await;
    {
        let mut guard = lock_tree(&tree);
        if guard.element(region).is_none() {
            return;
        }
        guard.element_mut(region).value = message.clone();
    }
    tokio::time::sleep(CLEAR_DELAY).await;
    let mut guard = lock_tree(&tree);
    // Only clear our own message; a newer announcement owns the
    // region now.
    if guard.element(region).is_some_and(|el| el.value == message) {
        guard.element_mut(region).value.clear();
    }
}
