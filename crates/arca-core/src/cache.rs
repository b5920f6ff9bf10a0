//! Memoized diff views keyed by the before/after text pair.

use std::collections::HashMap;
use std::sync::Arc;

use crate::render::{DiffOptions, DiffView};

/// Pure memoization: clearing it only costs recomputation.
#[derive(Debug)]
pub struct RowCache {
    views: HashMap<(String, String), Arc<DiffView>>,
    capacity: usize,
    options: DiffOptions,
}

impl RowCache {
    pub fn new(capacity: usize, options: DiffOptions) -> Self {
        Self {
            views: HashMap::new(),
            capacity: capacity.max(1),
            options,
        }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Return the view for this pair, building it on a miss. A full cache is
    /// cleared before the new view is stored.
    pub fn view(&mut self, before: &str, after: &str) -> Arc<DiffView> {
        let key = (before.to_string(), after.to_string());
        if let Some(view) = self.views.get(&key) {
            return Arc::clone(view);
        }

        if self.views.len() >= self.capacity {
            log::debug!("[arca:cache] capacity {} reached, clearing", self.capacity);
            self.views.clear();
        }
        let view = Arc::new(DiffView::build(before, after, &self.options));
        self.views.insert(key, Arc::clone(&view));
        view
    }

    pub fn clear(&mut self) {
        self.views.clear();
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

impl Default for RowCache {
    fn default() -> Self {
        Self::new(256, DiffOptions::default())
    }
}
