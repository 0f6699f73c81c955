//! # Condeval UI
//!
//! Presentation layer over the headless form tree: the UI manager
//! applies field states, owns the loading/error surfaces and retry
//! affordance, and the accessibility manager keeps ARIA attributes,
//! focus, and screen-reader announcements in sync with whatever the
//! asynchronous evaluation decides.
//!
//! These two managers are the only components that mutate the tree.

mod accessibility;
mod ui_manager;

pub use accessibility::AccessibilityManager;
pub use ui_manager::UiManager;

use condeval_form::FormTree;
use std::sync::{Arc, Mutex, MutexGuard};

/// Form tree as shared between the engine and the managers.
pub type SharedTree = Arc<Mutex<FormTree>>;

pub(crate) fn lock_tree(tree: &SharedTree) -> MutexGuard<'_, FormTree> {
    // The tree is plain data; a panic while holding the lock leaves
    // it structurally intact, so keep serving it.
    tree.lock().unwrap_or_else(|e| e.into_inner())
}

/// Wrap a tree for sharing.
pub fn share_tree(tree: FormTree) -> SharedTree {
    Arc::new(Mutex::new(tree))
}
