use std::collections::{BTreeMap, HashMap};

use super::params::{GlParameter, ParameterChange, ParameterValue};
use crate::error::{GpuError, Result};

/// Shadow copy of a stateful context's global parameters plus a stack of
/// saved frames.
///
/// The tracker never talks to the native context. Every method returns the
/// writes the caller must forward, and only values that actually differ from
/// the cache are ever returned. Frames hold the previous values of the
/// parameters changed while they were on top, so a push costs nothing and a
/// pop touches only what changed.
#[derive(Debug, Clone)]
pub struct StateTracker {
    values: HashMap<GlParameter, ParameterValue>,
    frames: Vec<BTreeMap<GlParameter, ParameterValue>>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    /// Tracker for a context this crate created, so defaults are accurate.
    pub fn new() -> Self {
        Self::from_values(
            GlParameter::ALL
                .iter()
                .map(|parameter| (*parameter, parameter.default_value())),
        )
    }

    /// Tracker seeded from values queried off an existing context.
    pub fn from_values(values: impl IntoIterator<Item = (GlParameter, ParameterValue)>) -> Self {
        Self {
            values: values.into_iter().collect(),
            frames: Vec::new(),
        }
    }

    pub fn get(&self, parameter: GlParameter) -> ParameterValue {
        self.values
            .get(&parameter)
            .copied()
            .unwrap_or_else(|| parameter.default_value())
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Updates the cache and returns the write to perform, if any.
    pub fn request(
        &mut self,
        parameter: GlParameter,
        value: ParameterValue,
    ) -> Option<ParameterChange> {
        let current = self.get(parameter);
        if current == value {
            return None;
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.entry(parameter).or_insert(current);
        }
        self.values.insert(parameter, value);
        Some(ParameterChange { parameter, value })
    }

    pub fn request_all<'a>(
        &mut self,
        values: impl IntoIterator<Item = &'a (GlParameter, ParameterValue)>,
    ) -> Vec<ParameterChange> {
        values
            .into_iter()
            .filter_map(|(parameter, value)| self.request(*parameter, *value))
            .collect()
    }

    pub fn push(&mut self) {
        self.frames.push(BTreeMap::new());
    }

    /// Discards the top frame and returns the writes that restore it.
    ///
    /// Restored values are not recorded into the parent frame; the parent
    /// already holds the older value for anything it saw change.
    pub fn pop(&mut self) -> Result<Vec<ParameterChange>> {
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| GpuError::state("state stack underflow: pop without matching push"))?;
        let mut changes = Vec::with_capacity(frame.len());
        for (parameter, value) in frame {
            if self.get(parameter) != value {
                self.values.insert(parameter, value);
                changes.push(ParameterChange { parameter, value });
            }
        }
        Ok(changes)
    }

    /// Writes every parameter's default through the redundant-write filter.
    pub fn reset(&mut self) -> Vec<ParameterChange> {
        GlParameter::ALL
            .iter()
            .filter_map(|parameter| self.request(*parameter, parameter.default_value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundant_writes_are_skipped() {
        let mut tracker = StateTracker::new();
        assert!(tracker
            .request(GlParameter::DepthTest, ParameterValue::Bool(true))
            .is_some());
        assert!(tracker
            .request(GlParameter::DepthTest, ParameterValue::Bool(true))
            .is_none());
        assert!(tracker
            .request(GlParameter::DepthTest, ParameterValue::Bool(false))
            .is_some());
    }

    #[test]
    fn pop_restores_values_from_before_push() {
        let mut tracker = StateTracker::new();
        tracker.request(GlParameter::LineWidth, ParameterValue::Float(2.0));
        tracker.push();
        tracker.request(GlParameter::LineWidth, ParameterValue::Float(4.0));
        tracker.request(GlParameter::LineWidth, ParameterValue::Float(8.0));
        tracker.request(GlParameter::Blend, ParameterValue::Bool(true));
        let changes = tracker.pop().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(tracker.get(GlParameter::LineWidth), ParameterValue::Float(2.0));
        assert_eq!(tracker.get(GlParameter::Blend), ParameterValue::Bool(false));
    }

    #[test]
    fn nested_frames_restore_independently() {
        let mut tracker = StateTracker::new();
        tracker.push();
        tracker.request(GlParameter::DepthMask, ParameterValue::Bool(false));
        tracker.push();
        tracker.request(GlParameter::DepthMask, ParameterValue::Bool(true));
        tracker.request(GlParameter::CullFace, ParameterValue::Bool(true));
        tracker.pop().unwrap();
        assert_eq!(tracker.get(GlParameter::DepthMask), ParameterValue::Bool(false));
        assert_eq!(tracker.get(GlParameter::CullFace), ParameterValue::Bool(false));
        tracker.pop().unwrap();
        assert_eq!(tracker.get(GlParameter::DepthMask), ParameterValue::Bool(true));
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn frame_without_changes_restores_nothing() {
        let mut tracker = StateTracker::new();
        tracker.push();
        tracker.request(GlParameter::Blend, ParameterValue::Bool(true));
        tracker.request(GlParameter::Blend, ParameterValue::Bool(false));
        assert!(tracker.pop().unwrap().is_empty());
    }

    #[test]
    fn pop_on_empty_stack_fails() {
        let mut tracker = StateTracker::new();
        assert!(tracker.pop().is_err());
    }

    #[test]
    fn reset_only_writes_changed_parameters() {
        let mut tracker = StateTracker::new();
        assert!(tracker.reset().is_empty());
        tracker.request(GlParameter::ClearDepth, ParameterValue::Float(0.5));
        let changes = tracker.reset();
        assert_eq!(
            changes,
            vec![ParameterChange {
                parameter: GlParameter::ClearDepth,
                value: ParameterValue::Float(1.0)
            }]
        );
    }
}
