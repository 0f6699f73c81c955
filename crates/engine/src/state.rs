use condeval_cache::EvalCache;
use condeval_form::{collect_form_data, FieldValidator, FormTree};
use condeval_protocol::{CacheStats, FieldStateMap, FormData};
use std::sync::Mutex;

/// Owns the engine's evaluation state: the result cache and the
/// snapshot of the form data that produced the most recently applied
/// field states. All caching delegates to [`EvalCache`], keyed by the
/// exact form data value.
pub struct StateManager {
    cache: EvalCache<FieldStateMap>,
    last_form_data: Mutex<Option<FormData>>,
}

impl StateManager {
    pub fn new(cache: EvalCache<FieldStateMap>) -> Self {
        Self {
            cache,
            last_form_data: Mutex::new(None),
        }
    }

    pub fn cached_result(&self, form_data: &FormData) -> Option<FieldStateMap> {
        self.cache.get(form_data)
    }

    pub fn cache_result(&self, form_data: &FormData, fields: &FieldStateMap) {
        self.cache.set(form_data, fields.clone(), None);
    }

    pub fn update_last_form_data(&self, form_data: FormData) {
        *self.lock_last() = Some(form_data);
    }

    pub fn last_form_data(&self) -> Option<FormData> {
        self.lock_last().clone()
    }

    /// Whether this snapshot differs from the one behind the most
    /// recently applied result. A fresh engine reports `true`.
    pub fn has_form_data_changed(&self, form_data: &FormData) -> bool {
        match &*self.lock_last() {
            Some(last) => last != form_data,
            None => true,
        }
    }

    /// Compose the data collector: read the tree through the
    /// validator into a canonical snapshot.
    pub fn collect_form_data(&self, tree: &FormTree, validator: &FieldValidator) -> FormData {
        collect_form_data(tree, validator)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn lock_last(&self) -> std::sync::MutexGuard<'_, Option<FormData>> {
        self.last_form_data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use condeval_protocol::FieldState;
    use pretty_assertions::assert_eq;

    fn data(pairs: &[(&str, &str)]) -> FormData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn manager() -> StateManager {
        StateManager::new(EvalCache::new(16, 64 * 1024))
    }

    #[test]
    fn test_cache_round_trip() {
        let state = manager();
        let snapshot = data(&[("email", "x@y.z"), ("newsletter", "1")]);
        assert!(state.cached_result(&snapshot).is_none());

        let mut fields = FieldStateMap::new();
        fields.insert("email".to_string(), FieldState::new(true, true));
        state.cache_result(&snapshot, &fields);
        assert_eq!(state.cached_result(&snapshot), Some(fields));
    }

    #[test]
    fn test_form_data_change_tracking() {
        let state = manager();
        let first = data(&[("email", "")]);
        assert!(state.has_form_data_changed(&first));

        state.update_last_form_data(first.clone());
        assert!(!state.has_form_data_changed(&first));
        assert!(state.has_form_data_changed(&data(&[("email", "x@y.z")])));
        assert_eq!(state.last_form_data(), Some(first));
    }

    #[test]
    fn test_clear_cache_keeps_last_form_data() {
        let state = manager();
        let snapshot = data(&[("a", "1")]);
        state.cache_result(&snapshot, &FieldStateMap::new());
        state.update_last_form_data(snapshot.clone());
        state.clear_cache();
        assert!(state.cached_result(&snapshot).is_none());
        assert_eq!(state.last_form_data(), Some(snapshot));
    }
}
