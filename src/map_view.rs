//! One map instance: provider, markers and selection wired together.
//!
//! All marker lifecycle changes go through [`MapView::sync`]. Clicks come back
//! from the provider as [`MarkerHandle`]s and are routed through the selection
//! machine; its effects are applied here.

use log::{error, info, warn};

use crate::config::ExplorerConfig;
use crate::error::{Result, TrailError};
use crate::markers::{MapProvider, MarkerHandle, MarkerManager, SyncReport};
use crate::selection::{SelectionEffect, SelectionMachine, SelectionState, Viewport};
use crate::types::{GeoPoint, TrailRecord};

/// Text shown in place of the map when the provider cannot create one.
pub const MAP_FALLBACK_MESSAGE: &str = "Map failed to load, please try again later";

/// Host callback for marker selection.
pub type MarkerSelectedCallback = Box<dyn FnMut(&TrailRecord)>;

pub struct MapView<P: MapProvider> {
    provider: P,
    markers: MarkerManager,
    selection: SelectionMachine,
    viewport: Viewport,
    on_marker_selected: Option<MarkerSelectedCallback>,
    /// Record selected by another component, which may not be in the results
    external: Option<TrailRecord>,
}

impl<P: MapProvider> std::fmt::Debug for MapView<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapView")
            .field("viewport", &self.viewport)
            .field("selection", self.selection.state())
            .field("markers", &self.markers.markers().len())
            .finish()
    }
}

impl<P: MapProvider> MapView<P> {
    /// Create the map at the overview viewport.
    pub fn new(mut provider: P, config: &ExplorerConfig) -> Result<Self> {
        let viewport = Viewport::new(config.viewport.default_center, config.viewport.overview_zoom);
        provider.create_map(viewport).map_err(|e| {
            error!("trailmap: [MapView] Map creation failed: {}", e);
            match e {
                TrailError::MapProvider { .. } => e,
                other => TrailError::MapProvider {
                    message: other.to_string(),
                },
            }
        })?;
        info!(
            "trailmap: [MapView] Map created at ({}, {}) zoom {}",
            viewport.center.latitude, viewport.center.longitude, viewport.zoom
        );
        Ok(Self {
            provider,
            markers: MarkerManager::new(&config.cluster, viewport.zoom),
            selection: SelectionMachine::new(config.viewport.detail_zoom),
            viewport,
            on_marker_selected: None,
            external: None,
        })
    }

    /// Register the host's "marker selected" handler.
    pub fn on_marker_selected<F>(&mut self, callback: F)
    where
        F: FnMut(&TrailRecord) + 'static,
    {
        self.on_marker_selected = Some(Box::new(callback));
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn markers(&self) -> &MarkerManager {
        &self.markers
    }

    pub fn selection(&self) -> &SelectionState {
        self.selection.state()
    }

    pub fn overlay_anchor(&self) -> Option<GeoPoint> {
        self.selection.overlay_anchor()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_clustering_available(&mut self, available: bool) {
        self.markers.set_clustering_available(available);
    }

    /// Rebuild markers for `results`.
    ///
    /// `selected` is a trail chosen elsewhere (e.g. a details view). A newly
    /// supplied one moves the map to it at detail zoom and pins the overlay at
    /// its coordinates, marker or not.
    pub fn sync(&mut self, results: &[TrailRecord], selected: Option<&TrailRecord>) -> SyncReport {
        let report = self.markers.sync(&mut self.provider, results);

        match selected {
            Some(record) => {
                let is_new = self.external.as_ref().map(|r| r.id.as_str()) != Some(record.id.as_str())
                    || !self.selection.is_selected(&record.id);
                self.external = Some(record.clone());
                let effects = if is_new {
                    self.selection.programmatic_select(&record.id, record.position())
                } else {
                    let position = record.position();
                    self.selection.reconcile(|_| Some(position))
                };
                self.apply(effects);
            }
            None => {
                self.external = None;
                let markers = &self.markers;
                let effects = self
                    .selection
                    .reconcile(|id| markers.marker_for_trail(id).map(|m| m.position));
                self.apply(effects);
            }
        }
        report
    }

    /// Route a provider click. Returns false for an unknown handle.
    pub fn handle_marker_click(&mut self, handle: MarkerHandle) -> bool {
        let Some(record) = self.markers.record_for_handle(handle) else {
            warn!("trailmap: [MapView] Click on unknown marker {:?}", handle);
            return false;
        };
        let (id, position) = (record.id.clone(), record.position());
        let effects = self.selection.click(&id, position);
        self.apply(effects);
        true
    }

    /// Click the marker of `trail_id`, if it is live.
    pub fn click_trail(&mut self, trail_id: &str) -> bool {
        match self.markers.marker_for_trail(trail_id) {
            Some(marker) => {
                let handle = marker.handle;
                self.handle_marker_click(handle)
            }
            None => false,
        }
    }

    /// Select a trail from code: pan, zoom to detail level, show overlay.
    pub fn select_trail(&mut self, record: &TrailRecord) {
        if self.markers.marker_for_trail(&record.id).is_none() {
            self.external = Some(record.clone());
        }
        let effects = self.selection.programmatic_select(&record.id, record.position());
        self.apply(effects);
    }

    /// Close the overlay.
    pub fn dismiss(&mut self) {
        let effects = self.selection.dismiss();
        self.apply(effects);
    }

    /// The user zoomed the map.
    pub fn set_zoom(&mut self, zoom: u8) {
        self.viewport.zoom = zoom;
        self.markers.set_zoom(&mut self.provider, zoom);
    }

    /// Zoom in until `cluster_id` splits, centred on it.
    pub fn expand_cluster(&mut self, cluster_id: usize) -> bool {
        let target = self.markers.cluster_index().and_then(|index| {
            let cluster = index.get_cluster(cluster_id)?;
            Some(Viewport::new(cluster.center, index.expansion_zoom(cluster_id)?))
        });
        match target {
            Some(viewport) => {
                self.move_viewport(viewport);
                true
            }
            None => false,
        }
    }

    /// Tear down markers and the map.
    pub fn close(mut self) -> P {
        self.markers.clear(&mut self.provider);
        self.provider.hide_overlay();
        self.provider.destroy_map();
        info!("trailmap: [MapView] Map destroyed");
        self.provider
    }

    fn move_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.provider.set_viewport(viewport);
        self.markers.set_zoom(&mut self.provider, viewport.zoom);
    }

    fn record(&self, trail_id: &str) -> Option<&TrailRecord> {
        self.markers
            .record_for_trail(trail_id)
            .or_else(|| self.external.as_ref().filter(|r| r.id == trail_id))
    }

    fn apply(&mut self, effects: Vec<SelectionEffect>) {
        for effect in effects {
            match effect {
                SelectionEffect::ShowOverlay { trail_id, anchor } => {
                    match self.record(&trail_id).cloned() {
                        Some(record) => self.provider.show_overlay(anchor, &record),
                        None => warn!(
                            "trailmap: [MapView] No record for overlay of '{}'",
                            trail_id
                        ),
                    }
                }
                SelectionEffect::HideOverlay => self.provider.hide_overlay(),
                SelectionEffect::MoveViewport(viewport) => self.move_viewport(viewport),
                SelectionEffect::NotifyHost { trail_id } => {
                    let record = self.markers.record_for_trail(&trail_id);
                    if let (Some(callback), Some(record)) = (self.on_marker_selected.as_mut(), record) {
                        callback(record);
                    }
                }
            }
        }
    }
}

/// What the host renders in the map slot.
pub enum MapSurface<P: MapProvider> {
    Map(MapView<P>),
    /// The provider failed; show `message` instead
    Fallback { message: String },
}

impl<P: MapProvider> MapSurface<P> {
    pub fn map(&mut self) -> Option<&mut MapView<P>> {
        match self {
            MapSurface::Map(view) => Some(view),
            MapSurface::Fallback { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, MapSurface::Fallback { .. })
    }
}

/// Create a map, or the textual fallback if the provider fails.
pub fn open_map<P: MapProvider>(provider: P, config: &ExplorerConfig) -> MapSurface<P> {
    match MapView::new(provider, config) {
        Ok(view) => MapSurface::Map(view),
        Err(e) => {
            warn!("trailmap: [MapView] Falling back to text: {}", e);
            MapSurface::Fallback {
                message: MAP_FALLBACK_MESSAGE.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{trail, RecordingMap};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn view() -> MapView<RecordingMap> {
        MapView::new(RecordingMap::default(), &ExplorerConfig::default()).unwrap()
    }

    #[test]
    fn test_new_uses_overview_viewport() {
        let v = view();
        assert_eq!(v.viewport().zoom, 6);
        assert_eq!(v.viewport().center, GeoPoint::new(37.8, -119.5));
        assert!(v.provider().map_created);
    }

    #[test]
    fn test_sync_empty_does_not_panic() {
        let mut v = view();
        let report = v.sync(&[], None);
        assert_eq!(report.rendered, 0);
        assert!(v.markers().cluster_index().is_none());
        assert!(v.provider().live_markers.is_empty());
    }

    #[test]
    fn test_external_selection_anchors_overlay() {
        let mut v = view();
        let t = trail("T123", 37.5, -119.0);
        v.sync(&[t.clone()], Some(&t));
        assert_eq!(v.overlay_anchor(), Some(GeoPoint::new(37.5, -119.0)));
        assert_eq!(v.viewport().zoom, 14);
        assert_eq!(v.provider().overlay.as_ref().map(|(_, id)| id.as_str()), Some("T123"));

        // Selected trail not among the results still gets the overlay
        let mut v = view();
        v.sync(&[], Some(&t));
        assert_eq!(v.overlay_anchor(), Some(GeoPoint::new(37.5, -119.0)));
        assert!(v.provider().overlay.is_some());
    }

    #[test]
    fn test_click_notifies_host() {
        let mut v = view();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        v.on_marker_selected(move |r| sink.borrow_mut().push(r.id.clone()));

        v.sync(&[trail("a", 37.7, -119.5), trail("b", 36.5, -118.3)], None);
        assert!(v.click_trail("a"));
        assert!(v.click_trail("b"));
        assert!(!v.click_trail("zzz"));

        assert_eq!(*seen.borrow(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(v.selection(), &SelectionState::Selected("b".into()));
        assert_eq!(v.provider().overlay_hides, 0);
        // Clicks never move the map
        assert_eq!(v.viewport().zoom, 6);
    }

    #[test]
    fn test_selection_survives_result_change() {
        let mut v = view();
        v.sync(&[trail("a", 37.7, -119.5)], None);
        v.click_trail("a");

        v.sync(&[trail("b", 36.5, -118.3)], None);
        assert_eq!(v.selection(), &SelectionState::Selected("a".into()));
        assert_eq!(v.overlay_anchor(), None);
        assert!(v.provider().overlay.is_none());

        v.sync(&[trail("a", 37.7, -119.5)], None);
        assert_eq!(v.overlay_anchor(), Some(GeoPoint::new(37.7, -119.5)));
    }

    #[test]
    fn test_dismiss_keeps_viewport() {
        let mut v = view();
        let t = trail("a", 37.7, -119.5);
        v.sync(&[t.clone()], None);
        v.select_trail(&t);
        let before = v.viewport();
        v.dismiss();
        assert_eq!(v.selection(), &SelectionState::Idle);
        assert_eq!(v.viewport(), before);
        assert!(v.provider().overlay.is_none());
    }

    #[test]
    fn test_expand_cluster_zooms_in() {
        let mut v = view();
        v.sync(
            &[trail("1", 37.7300, -119.5500), trail("2", 37.7320, -119.5520)],
            None,
        );
        let cluster = v.markers().visible_clusters().remove(0);
        assert!(v.expand_cluster(cluster.id));
        assert!(v.viewport().zoom > 6);
        assert!(!v.expand_cluster(usize::MAX));
    }

    #[test]
    fn test_open_map_falls_back_to_text() {
        let provider = RecordingMap::failing();
        let surface = open_map(provider, &ExplorerConfig::default());
        match surface {
            MapSurface::Fallback { message } => assert_eq!(message, MAP_FALLBACK_MESSAGE),
            MapSurface::Map(_) => panic!("expected fallback"),
        }
    }

    #[test]
    fn test_close_destroys_map() {
        let mut v = view();
        v.sync(&[trail("a", 37.7, -119.5)], None);
        let provider = v.close();
        assert!(!provider.map_created);
        assert!(provider.live_markers.is_empty());
    }
}
