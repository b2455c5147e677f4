//! Canvas document state with per-element last-write-wins.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::{CanvasChange, CanvasElement, ChangeType};

/// What applying a change did to the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    Applied,
    /// Sent by the local user; already applied when broadcast
    SelfEcho,
    /// Not newer than the last change applied to the element
    Stale,
    /// `update` for an element the document does not hold
    MissingTarget,
    /// `delete` for an element the document does not hold
    AlreadyAbsent,
}

/// Serializable document state for late joiners
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    pub elements: Vec<CanvasElement>,
    /// Last applied timestamp per element id, tombstones included
    pub versions: BTreeMap<String, i64>,
}

/// Elements of one board
#[derive(Debug, Clone, Default)]
pub struct CanvasDocument {
    elements: HashMap<String, CanvasElement>,
    last_applied: HashMap<String, i64>,
}

impl CanvasDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `change` unless an equal or newer change for the same element
    /// was already applied.
    ///
    /// A delete leaves its timestamp behind as a tombstone, so an older add
    /// or update arriving late cannot bring the element back.
    pub fn apply(&mut self, change: &CanvasChange) -> ChangeOutcome {
        let id = &change.element.id;
        if self
            .last_applied
            .get(id)
            .is_some_and(|&last| change.timestamp <= last)
        {
            return ChangeOutcome::Stale;
        }

        let outcome = match change.change_type {
            ChangeType::Add => {
                self.elements.insert(id.clone(), change.element.clone());
                ChangeOutcome::Applied
            }
            ChangeType::Update => match self.elements.get_mut(id) {
                Some(element) => {
                    *element = change.element.clone();
                    ChangeOutcome::Applied
                }
                None => return ChangeOutcome::MissingTarget,
            },
            ChangeType::Delete => match self.elements.remove(id) {
                Some(_) => ChangeOutcome::Applied,
                None => ChangeOutcome::AlreadyAbsent,
            },
        };

        self.last_applied.insert(id.clone(), change.timestamp);
        outcome
    }

    pub fn get(&self, id: &str) -> Option<&CanvasElement> {
        self.elements.get(id)
    }

    /// Whether `id` was deleted and not re-added since.
    pub fn is_tombstoned(&self, id: &str) -> bool {
        !self.elements.contains_key(id) && self.last_applied.contains_key(id)
    }

    /// Elements sorted by `(layer, id)`; later entries paint on top.
    pub fn elements_in_paint_order(&self) -> Vec<&CanvasElement> {
        let mut elements: Vec<&CanvasElement> = self.elements.values().collect();
        elements.sort_by(|a, b| a.layer.cmp(&b.layer).then_with(|| a.id.cmp(&b.id)));
        elements
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            elements: self
                .elements_in_paint_order()
                .into_iter()
                .cloned()
                .collect(),
            versions: self
                .last_applied
                .iter()
                .map(|(id, timestamp)| (id.clone(), *timestamp))
                .collect(),
        }
    }

    /// Replace the document with a snapshot.
    pub fn load_snapshot(&mut self, snapshot: CanvasSnapshot) {
        self.elements = snapshot
            .elements
            .into_iter()
            .map(|element| (element.id.clone(), element))
            .collect();
        self.last_applied = snapshot.versions.into_iter().collect();
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
