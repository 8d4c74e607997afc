//! # Selection State Machine
//!
//! Tracks the one active trail of a map view. Transitions return the side
//! effects the view must apply; the machine itself never touches the map.
//!
//! ```text
//! Idle        --click(b)-------------> Selected(b)   show overlay, notify
//! Selected(a) --click(b)-------------> Selected(b)   swap overlay, notify
//! any         --programmatic(b)------> Selected(b)   pan + detail zoom, show overlay
//! Selected    --dismiss--------------> Idle          hide overlay
//! ```
//!
//! Result-set changes never force `Idle`. After a rebuild the view calls
//! [`SelectionMachine::reconcile`]; a selected id with no live marker keeps its
//! state but loses its overlay anchor.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::types::GeoPoint;

/// Map centre and zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: GeoPoint,
    pub zoom: u8,
}

impl Viewport {
    pub fn new(center: GeoPoint, zoom: u8) -> Self {
        Self { center, zoom }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionState {
    #[default]
    Idle,
    Selected(String),
}

impl SelectionState {
    pub fn trail_id(&self) -> Option<&str> {
        match self {
            SelectionState::Idle => None,
            SelectionState::Selected(id) => Some(id),
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEffect {
    ShowOverlay { trail_id: String, anchor: GeoPoint },
    HideOverlay,
    MoveViewport(Viewport),
    NotifyHost { trail_id: String },
}

#[derive(Debug, Clone)]
pub struct SelectionMachine {
    state: SelectionState,
    anchor: Option<GeoPoint>,
    detail_zoom: u8,
    notify_on_click: bool,
}

impl SelectionMachine {
    pub fn new(detail_zoom: u8) -> Self {
        Self {
            state: SelectionState::Idle,
            anchor: None,
            detail_zoom,
            notify_on_click: true,
        }
    }

    /// Whether marker clicks emit [`SelectionEffect::NotifyHost`].
    pub fn with_host_notification(mut self, enabled: bool) -> Self {
        self.notify_on_click = enabled;
        self
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn active_trail_id(&self) -> Option<&str> {
        self.state.trail_id()
    }

    pub fn is_selected(&self, trail_id: &str) -> bool {
        self.active_trail_id() == Some(trail_id)
    }

    /// Where the info overlay is pinned, if it is showing.
    pub fn overlay_anchor(&self) -> Option<GeoPoint> {
        self.anchor
    }

    pub fn detail_zoom(&self) -> u8 {
        self.detail_zoom
    }

    /// User clicked the marker of `trail_id` at `position`.
    ///
    /// Replaces any current selection directly; there is no intermediate `Idle`.
    pub fn click(&mut self, trail_id: &str, position: GeoPoint) -> Vec<SelectionEffect> {
        debug!(
            "trailmap: [Selection] click {:?} -> Selected({})",
            self.state, trail_id
        );
        self.state = SelectionState::Selected(trail_id.to_string());
        self.anchor = Some(position);

        let mut effects = vec![SelectionEffect::ShowOverlay {
            trail_id: trail_id.to_string(),
            anchor: position,
        }];
        if self.notify_on_click {
            effects.push(SelectionEffect::NotifyHost {
                trail_id: trail_id.to_string(),
            });
        }
        effects
    }

    /// Select a trail without a click, e.g. from a details view.
    ///
    /// Pans to the trail at the detail zoom.
    pub fn programmatic_select(
        &mut self,
        trail_id: &str,
        position: GeoPoint,
    ) -> Vec<SelectionEffect> {
        debug!(
            "trailmap: [Selection] programmatic {:?} -> Selected({})",
            self.state, trail_id
        );
        self.state = SelectionState::Selected(trail_id.to_string());
        self.anchor = Some(position);
        vec![
            SelectionEffect::MoveViewport(Viewport::new(position, self.detail_zoom)),
            SelectionEffect::ShowOverlay {
                trail_id: trail_id.to_string(),
                anchor: position,
            },
        ]
    }

    /// Close the overlay. The map does not move.
    pub fn dismiss(&mut self) -> Vec<SelectionEffect> {
        if self.state == SelectionState::Idle {
            return Vec::new();
        }
        debug!("trailmap: [Selection] dismiss {:?} -> Idle", self.state);
        self.state = SelectionState::Idle;
        self.anchor = None;
        vec![SelectionEffect::HideOverlay]
    }

    /// Re-anchor after the markers were rebuilt.
    ///
    /// `locate` returns the live position for a trail id. A selection whose
    /// trail has no live position stays selected with no overlay.
    pub fn reconcile<F>(&mut self, locate: F) -> Vec<SelectionEffect>
    where
        F: FnOnce(&str) -> Option<GeoPoint>,
    {
        let trail_id = match &self.state {
            SelectionState::Idle => return Vec::new(),
            SelectionState::Selected(id) => id.clone(),
        };
        match locate(&trail_id) {
            Some(anchor) => {
                self.anchor = Some(anchor);
                vec![SelectionEffect::ShowOverlay { trail_id, anchor }]
            }
            None => {
                debug!(
                    "trailmap: [Selection] Selected({}) has no live marker, dropping anchor",
                    trail_id
                );
                let had_anchor = self.anchor.take().is_some();
                if had_anchor {
                    vec![SelectionEffect::HideOverlay]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: GeoPoint = GeoPoint {
        latitude: 37.7459,
        longitude: -119.5332,
    };
    const B: GeoPoint = GeoPoint {
        latitude: 37.7270,
        longitude: -119.6010,
    };

    #[test]
    fn test_click_from_idle() {
        let mut m = SelectionMachine::new(14);
        let effects = m.click("a", A);
        assert_eq!(m.state(), &SelectionState::Selected("a".into()));
        assert_eq!(m.overlay_anchor(), Some(A));
        assert_eq!(
            effects,
            vec![
                SelectionEffect::ShowOverlay {
                    trail_id: "a".into(),
                    anchor: A
                },
                SelectionEffect::NotifyHost {
                    trail_id: "a".into()
                },
            ]
        );
    }

    #[test]
    fn test_click_a_then_b_never_idle() {
        let mut m = SelectionMachine::new(14);
        m.click("a", A);
        let effects = m.click("b", B);
        assert_eq!(m.state(), &SelectionState::Selected("b".into()));
        assert_eq!(m.overlay_anchor(), Some(B));
        assert!(!effects.contains(&SelectionEffect::HideOverlay));
    }

    #[test]
    fn test_notification_can_be_disabled() {
        let mut m = SelectionMachine::new(14).with_host_notification(false);
        let effects = m.click("a", A);
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_programmatic_select_moves_to_detail_zoom() {
        let mut m = SelectionMachine::new(14);
        m.click("a", A);
        let effects = m.programmatic_select("b", B);
        assert_eq!(effects[0], SelectionEffect::MoveViewport(Viewport::new(B, 14)));
        assert!(m.is_selected("b"));
    }

    #[test]
    fn test_dismiss() {
        let mut m = SelectionMachine::new(14);
        assert!(m.dismiss().is_empty());

        m.click("a", A);
        let effects = m.dismiss();
        assert_eq!(effects, vec![SelectionEffect::HideOverlay]);
        assert_eq!(m.state(), &SelectionState::Idle);
        assert_eq!(m.overlay_anchor(), None);
    }

    #[test]
    fn test_reconcile_keeps_selection_without_marker() {
        let mut m = SelectionMachine::new(14);
        m.click("a", A);

        let effects = m.reconcile(|_| None);
        assert_eq!(effects, vec![SelectionEffect::HideOverlay]);
        assert!(m.is_selected("a"));
        assert_eq!(m.overlay_anchor(), None);

        // Second rebuild without the marker is quiet
        assert!(m.reconcile(|_| None).is_empty());

        // Marker comes back
        let effects = m.reconcile(|id| (id == "a").then_some(A));
        assert_eq!(m.overlay_anchor(), Some(A));
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_reconcile_idle_is_noop() {
        let mut m = SelectionMachine::new(14);
        assert!(m.reconcile(|_| Some(A)).is_empty());
        assert_eq!(m.overlay_anchor(), None);
    }
}
