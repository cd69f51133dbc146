//! The popup tracking tree.
//!
//! Persisted under the `popupWindowsInfo` key as a JSON object whose keys are
//! origin window ids (as strings) mapping to `{ popupId: PopupRecord }`, plus
//! the reserved `savedPositionAndSize` entry holding remembered geometry. The
//! popup -> origin index is derived on load and never written.

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::common::collections::{BTreeMap, HashMap};
use crate::model::geometry::{Rect, WindowId};
use crate::sys::browser::{WindowInfo, WindowType};

/// Reserved key for remembered geometry. Never a window id.
pub const SAVED_GEOMETRY_KEY: &str = "savedPositionAndSize";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PopupRecord {
    pub window_type: WindowType,
    pub top: i32,
    pub left: i32,
    pub width: i32,
    pub height: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,
}

impl PopupRecord {
    pub fn bounds(&self) -> Rect { Rect::new(self.top, self.left, self.width, self.height) }

    fn set_bounds(&mut self, rect: Rect) {
        self.top = rect.top;
        self.left = rect.left;
        self.width = rect.width;
        self.height = rect.height;
    }
}

impl From<&WindowInfo> for PopupRecord {
    fn from(window: &WindowInfo) -> Self {
        PopupRecord {
            window_type: window.window_type,
            top: window.bounds.top,
            left: window.bounds.left,
            width: window.bounds.width,
            height: window.bounds.height,
            focused: Some(window.focused),
        }
    }
}

/// Field names of the global entry; they share a map with the hostnames.
const GLOBAL_FIELDS: [&str; 4] = ["top", "left", "width", "height"];

/// Remembered popup geometry: the last one used anywhere plus one per hostname.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SavedGeometry {
    pub global: Option<Rect>,
    pub domains: BTreeMap<String, Rect>,
}

impl SavedGeometry {
    pub fn is_empty(&self) -> bool { self.global.is_none() && self.domains.is_empty() }

    pub fn for_domain(&self, domain: &str) -> Option<Rect> { self.domains.get(domain).copied() }

    /// Records `rect` globally and/or under `domain`, in one mutation.
    /// Hostnames that would collide with a global field are only recorded
    /// globally.
    pub fn remember(&mut self, rect: Rect, domain: Option<&str>, global: bool, per_domain: bool) {
        if global {
            self.global = Some(rect);
        }
        let Some(domain) = domain.filter(|d| !d.is_empty()) else {
            return;
        };
        if GLOBAL_FIELDS.contains(&domain) {
            debug!(%domain, "Hostname collides with global geometry; not saved per domain");
        } else if per_domain {
            self.domains.insert(domain.to_owned(), rect);
        }
    }
}

impl Serialize for SavedGeometry {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        let global_len = if self.global.is_some() { 4 } else { 0 };
        let mut map = serializer.serialize_map(Some(global_len + self.domains.len()))?;
        if let Some(rect) = self.global {
            map.serialize_entry("top", &rect.top)?;
            map.serialize_entry("left", &rect.left)?;
            map.serialize_entry("width", &rect.width)?;
            map.serialize_entry("height", &rect.height)?;
        }
        for (domain, rect) in &self.domains {
            map.serialize_entry(domain, rect)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SavedGeometry {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: Deserializer<'de> {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        Ok(SavedGeometry::from_legacy(raw))
    }
}

impl SavedGeometry {
    fn from_legacy(mut raw: Map<String, Value>) -> Self {
        let mut take = |field: &str| {
            raw.remove(field).and_then(|v| v.as_f64()).map(|v| v.round() as i32)
        };
        let [top, left, width, height] = GLOBAL_FIELDS.map(|field| take(field));
        let global = match (top, left, width, height) {
            (Some(top), Some(left), Some(width), Some(height)) => {
                Some(Rect { top, left, width, height })
            }
            _ => None,
        };

        let mut domains = BTreeMap::new();
        for (domain, value) in raw {
            match serde_json::from_value::<Rect>(value) {
                Ok(rect) => {
                    domains.insert(domain, rect);
                }
                Err(e) => debug!(%domain, "Dropping malformed saved geometry: {e}"),
            }
        }
        SavedGeometry { global, domains }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertRejected {
    /// The popup id is already registered as an origin.
    PopupIsOrigin,
    /// The origin is itself a tracked popup; only one tier is tracked.
    OriginIsPopup,
    /// A window cannot be its own popup.
    SelfReference,
}

#[derive(Debug, Clone, Default)]
pub struct PopupWindowsInfo {
    origins: BTreeMap<WindowId, BTreeMap<WindowId, PopupRecord>>,
    saved: SavedGeometry,
    owner: HashMap<WindowId, WindowId>,
}

impl PartialEq for PopupWindowsInfo {
    fn eq(&self, other: &Self) -> bool {
        self.origins == other.origins && self.saved == other.saved
    }
}

impl PopupWindowsInfo {
    pub fn has_origins(&self) -> bool { !self.origins.is_empty() }

    pub fn is_origin(&self, window: WindowId) -> bool { self.origins.contains_key(&window) }

    pub fn is_popup(&self, window: WindowId) -> bool { self.owner.contains_key(&window) }

    pub fn origin_of(&self, popup: WindowId) -> Option<WindowId> { self.owner.get(&popup).copied() }

    pub fn origins(&self) -> impl Iterator<Item = WindowId> + '_ { self.origins.keys().copied() }

    pub fn popups_of(&self, origin: WindowId) -> Option<&BTreeMap<WindowId, PopupRecord>> {
        self.origins.get(&origin)
    }

    pub fn popup(&self, popup: WindowId) -> Option<&PopupRecord> {
        let origin = self.origin_of(popup)?;
        self.origins.get(&origin)?.get(&popup)
    }

    pub fn saved(&self) -> &SavedGeometry { &self.saved }

    pub fn saved_mut(&mut self) -> &mut SavedGeometry { &mut self.saved }

    /// Registers `window` as an origin with no popups, but only while nothing
    /// is tracked yet. Returns whether it was added.
    pub fn register_first_origin(&mut self, window: WindowId) -> bool {
        if self.has_origins() {
            return false;
        }
        self.origins.insert(window, BTreeMap::new());
        true
    }

    /// Tracks `popup` under `origin`. A popup already tracked under another
    /// origin is moved; the previous origin is returned.
    pub fn insert_popup(
        &mut self,
        origin: WindowId,
        popup: WindowId,
        record: PopupRecord,
    ) -> Result<Option<WindowId>, InsertRejected> {
        if origin == popup {
            return Err(InsertRejected::SelfReference);
        }
        if self.is_origin(popup) {
            return Err(InsertRejected::PopupIsOrigin);
        }
        if self.is_popup(origin) {
            return Err(InsertRejected::OriginIsPopup);
        }

        let previous = match self.owner.get(&popup).copied() {
            Some(prev) if prev != origin => {
                warn!(%popup, from = %prev, to = %origin, "Moving popup to a new origin");
                self.remove_popup(popup);
                Some(prev)
            }
            _ => None,
        };

        self.origins.entry(origin).or_default().insert(popup, record);
        self.owner.insert(popup, origin);
        Ok(previous)
    }

    /// Forgets `popup`; drops its origin when that leaves it empty.
    pub fn remove_popup(&mut self, popup: WindowId) -> Option<(WindowId, PopupRecord)> {
        let origin = self.owner.remove(&popup)?;
        let popups = self.origins.get_mut(&origin)?;
        let record = popups.remove(&popup)?;
        if popups.is_empty() {
            self.origins.remove(&origin);
        }
        Some((origin, record))
    }

    /// Drops `origin` if it is tracked without any popups. Returns whether it
    /// was dropped.
    pub fn forget_empty_origin(&mut self, origin: WindowId) -> bool {
        if self.origins.get(&origin).is_some_and(|popups| popups.is_empty()) {
            self.origins.remove(&origin);
            return true;
        }
        false
    }

    pub fn update_popup_bounds(&mut self, popup: WindowId, rect: Rect) -> bool {
        let Some(origin) = self.origin_of(popup) else {
            return false;
        };
        match self.origins.get_mut(&origin).and_then(|popups| popups.get_mut(&popup)) {
            Some(record) => {
                record.set_bounds(rect);
                true
            }
            None => false,
        }
    }

    fn rebuild_index(&mut self) {
        self.owner.clear();
        let mut duplicates = Vec::new();
        for (&origin, popups) in &self.origins {
            for &popup in popups.keys() {
                if let Some(first) = self.owner.get(&popup) {
                    warn!(%popup, %origin, first = %first, "Popup tracked under two origins");
                    duplicates.push((origin, popup));
                } else {
                    self.owner.insert(popup, origin);
                }
            }
        }
        for (origin, popup) in duplicates {
            if let Some(popups) = self.origins.get_mut(&origin) {
                popups.remove(&popup);
            }
        }
        // An id tracked as both origin and popup keeps its origin role only.
        let conflicting: Vec<WindowId> =
            self.owner.keys().copied().filter(|popup| self.origins.contains_key(popup)).collect();
        for popup in conflicting {
            warn!(%popup, "Window tracked as both origin and popup; dropping popup entry");
            self.remove_popup(popup);
        }
    }
}

impl Serialize for PopupWindowsInfo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where S: Serializer {
        let saved = usize::from(!self.saved.is_empty());
        let mut map = serializer.serialize_map(Some(self.origins.len() + saved))?;
        for (origin, popups) in &self.origins {
            let popups: BTreeMap<String, &PopupRecord> =
                popups.iter().map(|(id, record)| (id.to_string(), record)).collect();
            map.serialize_entry(&origin.to_string(), &popups)?;
        }
        if !self.saved.is_empty() {
            map.serialize_entry(SAVED_GEOMETRY_KEY, &self.saved)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PopupWindowsInfo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where D: Deserializer<'de> {
        let raw = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
        let mut info = PopupWindowsInfo::default();

        for (key, value) in raw {
            if key == SAVED_GEOMETRY_KEY {
                match value {
                    Value::Object(saved) => info.saved = SavedGeometry::from_legacy(saved),
                    other => debug!(?other, "Ignoring malformed saved geometry"),
                }
                continue;
            }
            let Ok(origin) = key.parse::<WindowId>() else {
                debug!(%key, "Ignoring non-window key in popup tracking record");
                continue;
            };
            let Value::Object(entries) = value else {
                debug!(%origin, "Ignoring malformed origin entry");
                continue;
            };
            let popups = info.origins.entry(origin).or_default();
            for (popup, record) in entries {
                let Ok(popup) = popup.parse::<WindowId>() else {
                    continue;
                };
                match serde_json::from_value::<PopupRecord>(record) {
                    Ok(record) => {
                        popups.insert(popup, record);
                    }
                    Err(e) => debug!(%origin, %popup, "Ignoring malformed popup record: {e}"),
                }
            }
        }

        info.rebuild_index();
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn record(top: i32, left: i32) -> PopupRecord {
        PopupRecord {
            window_type: WindowType::Popup,
            top,
            left,
            width: 1000,
            height: 800,
            focused: Some(true),
        }
    }

    fn w(id: u32) -> WindowId { WindowId::new(id) }

    #[test]
    fn serializes_with_legacy_shape() {
        let mut info = PopupWindowsInfo::default();
        info.insert_popup(w(10), w(20), record(140, 460)).unwrap();
        info.saved_mut().remember(
            Rect::new(140, 460, 1000, 800),
            Some("example.com"),
            true,
            true,
        );

        let value = serde_json::to_value(&info).expect("serialize PopupWindowsInfo");
        let expected = json!({
            "10": {
                "20": {
                    "windowType": "popup",
                    "top": 140,
                    "left": 460,
                    "width": 1000,
                    "height": 800,
                    "focused": true,
                }
            },
            "savedPositionAndSize": {
                "top": 140,
                "left": 460,
                "width": 1000,
                "height": 800,
                "example.com": { "top": 140, "left": 460, "width": 1000, "height": 800 },
            }
        });
        assert_eq!(value, expected);
    }

    #[test]
    fn reserved_key_is_never_an_origin() {
        let info: PopupWindowsInfo = serde_json::from_value(json!({
            "savedPositionAndSize": { "top": 1, "left": 2, "width": 3, "height": 4 },
            "7": {},
        }))
        .unwrap();

        assert_eq!(info.origins().collect::<Vec<_>>(), vec![w(7)]);
        assert_eq!(info.saved().global, Some(Rect::new(1, 2, 3, 4)));
        assert!(info.saved().domains.is_empty());
    }

    #[test]
    fn partial_global_geometry_is_not_used() {
        let info: PopupWindowsInfo = serde_json::from_value(json!({
            "savedPositionAndSize": {
                "top": 1,
                "left": 2,
                "docs.rs": { "top": 5, "left": 6, "width": 7, "height": 8 },
            },
        }))
        .unwrap();
        assert_eq!(info.saved().global, None);
        assert_eq!(info.saved().for_domain("docs.rs"), Some(Rect::new(5, 6, 7, 8)));
        assert!(!info.has_origins());
    }

    #[test]
    fn null_record_loads_empty() {
        let info: PopupWindowsInfo = serde_json::from_value(Value::Null).unwrap();
        assert_eq!(info, PopupWindowsInfo::default());
    }

    #[test]
    fn index_is_rebuilt_on_load() {
        let info: PopupWindowsInfo = serde_json::from_value(json!({
            "10": { "20": { "windowType": "popup", "top": 0, "left": 0, "width": 1, "height": 1 } },
            "11": { "21": { "windowType": "normal" } },
        }))
        .unwrap();
        assert_eq!(info.origin_of(w(20)), Some(w(10)));
        assert_eq!(info.origin_of(w(21)), Some(w(11)));
        assert_eq!(info.popup(w(21)).map(|r| r.window_type), Some(WindowType::Normal));
        assert_eq!(info.origin_of(w(10)), None);
    }

    #[test]
    fn duplicate_popup_keeps_first_origin_only() {
        let info: PopupWindowsInfo = serde_json::from_value(json!({
            "10": { "20": {} },
            "11": { "20": {}, "22": {} },
        }))
        .unwrap();
        assert_eq!(info.origin_of(w(20)), Some(w(10)));
        assert_eq!(info.popups_of(w(11)).map(|p| p.len()), Some(1));
    }

    #[test]
    fn removing_last_popup_drops_origin() {
        let mut info = PopupWindowsInfo::default();
        info.insert_popup(w(10), w(20), record(0, 0)).unwrap();
        info.insert_popup(w(10), w(21), record(0, 0)).unwrap();

        assert_eq!(info.remove_popup(w(20)).map(|(o, _)| o), Some(w(10)));
        assert!(info.is_origin(w(10)));
        assert!(info.remove_popup(w(21)).is_some());
        assert!(!info.is_origin(w(10)));
        assert_eq!(info.remove_popup(w(21)), None);
    }

    #[test]
    fn popup_cannot_be_an_origin() {
        let mut info = PopupWindowsInfo::default();
        assert!(info.register_first_origin(w(10)));
        assert!(!info.register_first_origin(w(11)));
        assert_eq!(
            info.insert_popup(w(30), w(10), record(0, 0)),
            Err(InsertRejected::PopupIsOrigin)
        );
        assert_eq!(
            info.insert_popup(w(10), w(10), record(0, 0)),
            Err(InsertRejected::SelfReference)
        );
        info.insert_popup(w(10), w(20), record(0, 0)).unwrap();
        assert_eq!(
            info.insert_popup(w(20), w(21), record(0, 0)),
            Err(InsertRejected::OriginIsPopup)
        );
    }

    #[test]
    fn reinserting_under_new_origin_moves_popup() {
        let mut info = PopupWindowsInfo::default();
        info.insert_popup(w(10), w(20), record(0, 0)).unwrap();
        info.insert_popup(w(10), w(21), record(0, 0)).unwrap();
        assert_eq!(info.insert_popup(w(11), w(20), record(0, 0)), Ok(Some(w(10))));
        assert_eq!(info.origin_of(w(20)), Some(w(11)));
        assert!(!info.popups_of(w(10)).unwrap().contains_key(&w(20)));
    }

    #[test]
    fn saved_geometry_per_domain_entries_are_independent() {
        let mut saved = SavedGeometry::default();
        saved.remember(Rect::new(1, 1, 100, 100), Some("a.com"), true, true);
        saved.remember(Rect::new(2, 2, 200, 200), Some("b.com"), true, true);
        assert_eq!(saved.for_domain("a.com"), Some(Rect::new(1, 1, 100, 100)));
        assert_eq!(saved.for_domain("b.com"), Some(Rect::new(2, 2, 200, 200)));
        assert_eq!(saved.global, Some(Rect::new(2, 2, 200, 200)));

        saved.remember(Rect::new(3, 3, 300, 300), Some("a.com"), false, true);
        assert_eq!(saved.global, Some(Rect::new(2, 2, 200, 200)));
        assert_eq!(saved.for_domain("a.com"), Some(Rect::new(3, 3, 300, 300)));
    }

    #[test]
    fn hostnames_named_like_global_fields_are_not_saved() {
        let mut saved = SavedGeometry::default();
        saved.remember(Rect::new(1, 1, 100, 100), Some("top"), true, true);
        assert_eq!(saved.for_domain("top"), None);
        assert_eq!(saved.global, Some(Rect::new(1, 1, 100, 100)));

        let value = serde_json::to_value(&saved).unwrap();
        assert_eq!(value, json!({ "top": 1, "left": 1, "width": 100, "height": 100 }));
    }

    #[test]
    fn forgetting_an_empty_origin_frees_its_id() {
        let mut info = PopupWindowsInfo::default();
        assert!(info.register_first_origin(w(10)));
        assert!(!info.forget_empty_origin(w(11)));
        assert!(info.forget_empty_origin(w(10)));
        assert!(!info.has_origins());
        info.insert_popup(w(30), w(10), record(0, 0)).unwrap();

        // An origin that still has popups stays.
        assert!(!info.forget_empty_origin(w(30)));
        assert!(info.is_origin(w(30)));
    }
}
