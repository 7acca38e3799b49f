// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Machining state: a flat set of placed shells and toolpaths
//!
//! Unlike an [`Assembly`](crate::Assembly) an NC state has no product or
//! shape hierarchy. Each entry places one shell or one polyline with its
//! own transform, and state deltas move entries and advance the working
//! step clock while shell deltas grow the keyframed shells in place.

use cadview_core::{
    DocumentKind, NcDocument, NcSource, Rgb, ShellDelta, ShellKeyframe, ShellPayload, DEFAULT_PRECISION,
};
use cadview_geometry::{to_matrix, AnnotationGeometry, BoundingBox, Matrix4, ShellGeometry};
use rustc_hash::FxHashMap;
use slotmap::{SecondaryMap, SlotMap};

use crate::assembly::ROOT_ALIAS;
use crate::error::{LoadError, Result};
use crate::keys::{AnnotationKey, DocumentKey, ShellKey};
use crate::loader::{LoadRequest, RequestTarget};
use crate::shell::{Annotation, Shell};
use crate::tree::{TreeNode, TreeState};

/// Geometry placed by one NC entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcGeometry {
    Shell(ShellKey),
    Polyline(AnnotationKey),
}

#[derive(Debug, Clone)]
pub struct NcModel {
    pub id: String,
    pub usage: Option<String>,
    pub geometry: NcGeometry,
    pub transform: Matrix4<f64>,
    /// Box announced by the state, in the model's own frame
    pub bounding_box: BoundingBox,
}

/// Value table a keyframed shell's deltas index into
#[derive(Debug, Clone)]
struct ValueTable {
    values: Vec<f32>,
    precision: i32,
}

#[derive(Debug)]
pub struct NcState {
    project: String,
    workingstep: Option<String>,
    time_in_workingstep: f64,
    models: Vec<NcModel>,
    by_id: FxHashMap<String, usize>,
    shells: SlotMap<ShellKey, Shell>,
    annotations: SlotMap<AnnotationKey, Annotation>,
    tables: SecondaryMap<ShellKey, ValueTable>,
}

/// A freshly built NC state and the payload requests it needs
#[derive(Debug)]
pub struct NcOutput {
    pub state: NcState,
    pub requests: Vec<LoadRequest>,
}

impl NcState {
    /// Build the state for `doc`; payload hrefs resolve against `base`
    pub fn build(doc: &NcDocument, document: DocumentKey, base: &str) -> Result<NcOutput> {
        let mut state = NcState {
            project: doc.project.clone(),
            workingstep: doc.workingstep.clone(),
            time_in_workingstep: doc.time_in_workingstep,
            models: Vec::with_capacity(doc.geom.len()),
            by_id: FxHashMap::default(),
            shells: SlotMap::with_key(),
            annotations: SlotMap::with_key(),
            tables: SecondaryMap::new(),
        };
        let mut requests = Vec::new();

        for entry in &doc.geom {
            if entry.id.is_empty() {
                return Err(LoadError::EmptyId);
            }
            if state.by_id.contains_key(&entry.id) {
                tracing::warn!(project = %doc.project, geom = %entry.id, "Duplicate NC entry ignored");
                continue;
            }
            let bounding_box = entry
                .bbox
                .as_ref()
                .map(BoundingBox::from_extent)
                .unwrap_or_else(BoundingBox::empty);
            let (geometry, request) = match &entry.source {
                Some(NcSource::Shell { href }) => {
                    let shell = Shell::new(entry.id.clone(), entry.size, Rgb::default_shell(), bounding_box);
                    let key = state.shells.insert(shell);
                    let request = LoadRequest::new(
                        document,
                        base,
                        href.clone(),
                        DocumentKind::Shell,
                        RequestTarget::NcShell(key),
                    )
                    .with_size_hint(entry.size);
                    (NcGeometry::Shell(key), request)
                }
                Some(NcSource::Polyline { href }) => {
                    let key = state.annotations.insert(Annotation::new(entry.id.clone()));
                    let request = LoadRequest::new(
                        document,
                        base,
                        href.clone(),
                        DocumentKind::Annotation,
                        RequestTarget::NcAnnotation(key),
                    );
                    (NcGeometry::Polyline(key), request)
                }
                None => {
                    tracing::warn!(project = %doc.project, geom = %entry.id, "NC entry names neither a shell nor a polyline");
                    continue;
                }
            };
            state.by_id.insert(entry.id.clone(), state.models.len());
            state.models.push(NcModel {
                id: entry.id.clone(),
                usage: entry.usage.clone(),
                geometry,
                transform: entry.transform.as_ref().map(to_matrix).unwrap_or_else(Matrix4::identity),
                bounding_box,
            });
            requests.push(request);
        }

        tracing::debug!(
            project = %state.project,
            models = state.models.len(),
            requests = requests.len(),
            "NC state built"
        );
        Ok(NcOutput { state, requests })
    }

    #[inline]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[inline]
    pub fn workingstep(&self) -> Option<&str> {
        self.workingstep.as_deref()
    }

    #[inline]
    pub fn time_in_workingstep(&self) -> f64 {
        self.time_in_workingstep
    }

    pub fn models(&self) -> &[NcModel] {
        &self.models
    }

    pub fn model(&self, id: &str) -> Option<&NcModel> {
        self.by_id.get(id).map(|&i| &self.models[i])
    }

    pub fn shell(&self, key: ShellKey) -> Option<&Shell> {
        self.shells.get(key)
    }

    pub fn annotation(&self, key: AnnotationKey) -> Option<&Annotation> {
        self.annotations.get(key)
    }

    /// True once every shell and polyline has its payload
    pub fn is_loaded(&self) -> bool {
        self.shells.values().all(Shell::is_loaded) && self.annotations.values().all(Annotation::is_loaded)
    }

    pub(crate) fn load_shell(&mut self, key: ShellKey, keyframe: KeyframeGeometry) -> bool {
        let Some(shell) = self.shells.get_mut(key) else {
            return false;
        };
        if !shell.add_geometry(keyframe.geometry) {
            return false;
        }
        self.tables.insert(
            key,
            ValueTable {
                values: keyframe.values,
                precision: keyframe.precision,
            },
        );
        true
    }

    pub(crate) fn load_annotation(&mut self, key: AnnotationKey, geometry: AnnotationGeometry) -> bool {
        self.annotations
            .get_mut(key)
            .map(|a| a.add_geometry(geometry))
            .unwrap_or(false)
    }

    /// Apply a state delta for this project; returns true if anything moved
    ///
    /// Entries the delta names but this state lacks are ignored, as are
    /// deltas for other projects.
    pub fn apply_delta(&mut self, delta: &NcDocument) -> bool {
        if delta.project != self.project {
            return false;
        }
        let mut changed = false;
        if delta.workingstep.is_some() && delta.workingstep != self.workingstep {
            self.workingstep = delta.workingstep.clone();
            changed = true;
        }
        if delta.time_in_workingstep != self.time_in_workingstep {
            self.time_in_workingstep = delta.time_in_workingstep;
            changed = true;
        }
        for entry in &delta.geom {
            let (Some(&i), Some(transform)) = (self.by_id.get(&entry.id), entry.transform.as_ref()) else {
                continue;
            };
            let matrix = to_matrix(transform);
            if self.models[i].transform != matrix {
                self.models[i].transform = matrix;
                changed = true;
            }
        }
        changed
    }

    /// Grow a loaded keyframed shell; false while the keyframe is pending
    pub fn apply_shell_delta(&mut self, id: &str, delta: &ShellDelta) -> Result<bool> {
        let key = match self.model(id).map(|m| m.geometry) {
            Some(NcGeometry::Shell(key)) => key,
            Some(NcGeometry::Polyline(_)) | None => return Err(LoadError::UnknownReference(id.to_string())),
        };
        let Some(shell) = self.shells.get_mut(key) else {
            return Err(LoadError::UnknownReference(id.to_string()));
        };
        let Some(geometry) = shell.geometry.take() else {
            tracing::debug!(shell = id, "Delta for a shell that is not loaded yet");
            return Ok(false);
        };
        let table = self.tables.remove(key).unwrap_or(ValueTable {
            values: Vec::new(),
            precision: DEFAULT_PRECISION,
        });

        let mut keyframe = ShellKeyframe {
            values: table.values,
            precision: table.precision,
            payload: ShellPayload {
                id: None,
                position: geometry.positions,
                normals: geometry.normals,
                colors: geometry.colors,
            },
        };
        // A rejected delta leaves the keyframe untouched, so it is restored either way
        let applied = keyframe.apply_delta(delta);
        let rebuilt = ShellGeometry::from_payload(keyframe.payload).map_err(|e| LoadError::geometry(id, e))?;
        shell.replace_geometry(rebuilt);
        self.tables.insert(
            key,
            ValueTable {
                values: keyframe.values,
                precision: keyframe.precision,
            },
        );
        applied.map_err(|e| LoadError::parse(id, e))?;
        Ok(true)
    }

    /// World bounds of every placed model, loaded or announced
    pub fn get_bounding_box(&self) -> BoundingBox {
        self.models.iter().fold(BoundingBox::empty(), |acc, model| {
            let local = match model.geometry {
                NcGeometry::Shell(key) => self
                    .shells
                    .get(key)
                    .map(|s| *s.bounding_box())
                    .unwrap_or(model.bounding_box),
                NcGeometry::Polyline(key) => self
                    .annotations
                    .get(key)
                    .and_then(Annotation::geometry)
                    .map(AnnotationGeometry::bounds)
                    .unwrap_or(model.bounding_box),
            };
            if local.is_empty() {
                acc
            } else {
                acc.union_with(&local.apply_matrix(&model.transform))
            }
        })
    }

    pub fn get_tree(&self) -> TreeNode {
        TreeNode {
            id: ROOT_ALIAS.to_string(),
            text: self.project.clone(),
            state: TreeState::default(),
            children: self
                .models
                .iter()
                .map(|m| TreeNode {
                    id: m.id.clone(),
                    text: m.usage.clone().unwrap_or_else(|| m.id.clone()),
                    state: TreeState::default(),
                    children: Vec::new(),
                })
                .collect(),
        }
    }
}

/// A decoded NC shell and the value table later deltas extend
#[derive(Debug)]
pub struct KeyframeGeometry {
    pub geometry: ShellGeometry,
    pub values: Vec<f32>,
    pub precision: i32,
}

impl KeyframeGeometry {
    pub fn from_keyframe(keyframe: ShellKeyframe) -> cadview_geometry::Result<Self> {
        Ok(Self {
            geometry: ShellGeometry::from_payload(keyframe.payload)?,
            values: keyframe.values,
            precision: keyframe.precision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cadview_core::ContentType;
    use cadview_geometry::translation;

    const STATE: &str = r#"{
        "project": "bracket-op10",
        "workingstep": "WS1",
        "time_in_workingstep": 0.5,
        "geom": [
            {"id": "stock", "usage": "asis", "shell": "stock.json", "size": 1,
             "xform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 10,0,0,1], "bbox": [0,0,0,1,1,1]},
            {"id": "path", "usage": "toolpath", "polyline": "path.json"},
            {"id": "clamp", "usage": "fixture"}
        ]
    }"#;

    const KEYFRAME: &str = r#"{
        "values": [0, 100, 200],
        "pointsIndex": [0,0,0, 1,0,0, 0,1,0],
        "normalsIndex": [0,0,1, 0,0,1, 0,0,1]
    }"#;

    fn built() -> NcOutput {
        let doc = NcDocument::parse(STATE, ContentType::Json).unwrap();
        NcState::build(&doc, DocumentKey::default(), "nc/").unwrap()
    }

    fn stock_key(state: &NcState) -> ShellKey {
        match state.model("stock").unwrap().geometry {
            NcGeometry::Shell(key) => key,
            other => panic!("unexpected geometry {:?}", other),
        }
    }

    fn load_stock(state: &mut NcState) {
        let keyframe = ShellKeyframe::parse(KEYFRAME, ContentType::Json).unwrap();
        let key = stock_key(state);
        assert!(state.load_shell(key, KeyframeGeometry::from_keyframe(keyframe).unwrap()));
    }

    #[test]
    fn test_build_requests_and_skips() {
        let NcOutput { state, requests } = built();
        assert_eq!(state.project(), "bracket-op10");
        assert_eq!(state.models().len(), 2);
        assert!(state.model("clamp").is_none());

        let urls: Vec<&str> = requests.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["nc/stock.json", "nc/path.json"]);
        assert!(matches!(requests[0].target, RequestTarget::NcShell(_)));
        assert_eq!(requests[0].size_hint, 1);
        assert!(matches!(requests[1].target, RequestTarget::NcAnnotation(_)));

        let stock = state.model("stock").unwrap();
        assert_relative_eq!(translation(&stock.transform).x, 10.0);
        assert!(!state.is_loaded());
    }

    #[test]
    fn test_bounds_and_tree() {
        let NcOutput { mut state, .. } = built();
        // Announced box shifted by the placement
        let bounds = state.get_bounding_box();
        assert_relative_eq!(bounds.min.x, 10.0);
        assert_relative_eq!(bounds.max.x, 11.0);

        load_stock(&mut state);
        let bounds = state.get_bounding_box();
        assert_relative_eq!(bounds.max.y, 1.0);

        let tree = state.get_tree();
        assert_eq!(tree.id, ROOT_ALIAS);
        assert_eq!(tree.text, "bracket-op10");
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.find("path").map(|n| n.text.as_str()), Some("toolpath"));
    }

    #[test]
    fn test_state_delta_moves_models() {
        let NcOutput { mut state, .. } = built();
        let delta = NcDocument::parse_json(
            r#"{"project": "bracket-op10", "workingstep": "WS1", "time_in_workingstep": 0.5,
                "prev": "state.json",
                "geom": [{"id": "stock", "shell": "stock.json", "xform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,5,0,1]},
                         {"id": "ghost", "xform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1]}]}"#,
        )
        .unwrap();
        assert!(state.apply_delta(&delta));
        let stock = state.model("stock").unwrap();
        assert_relative_eq!(translation(&stock.transform).y, 5.0);
        // Same delta again changes nothing
        assert!(!state.apply_delta(&delta));

        let other = NcDocument {
            project: "other".into(),
            time_in_workingstep: 9.0,
            ..Default::default()
        };
        assert!(!state.apply_delta(&other));
        assert_relative_eq!(state.time_in_workingstep(), 0.5);
    }

    #[test]
    fn test_shell_delta() {
        let NcOutput { mut state, .. } = built();
        let delta = ShellDelta::parse(
            r#"{"values": [300], "pointsIndex": [3,0,0, 0,3,0, 0,0,3],
                "normalsIndex": [0,0,2, 0,0,2, 0,0,2], "remove": [0]}"#,
        )
        .unwrap();
        // Pending keyframe: nothing to grow yet
        assert!(!state.apply_shell_delta("stock", &delta).unwrap());

        load_stock(&mut state);
        assert!(state.apply_shell_delta("stock", &delta).unwrap());
        let key = stock_key(&state);
        let geometry = state.shell(key).and_then(Shell::geometry).unwrap();
        assert_eq!(geometry.triangle_count(), 2);
        assert_eq!(&geometry.positions[9..12], &[3.0, 0.0, 0.0]);
        assert!(geometry.positions[..9].iter().all(|&v| v == 0.0));
        assert_relative_eq!(state.shell(key).unwrap().bounding_box().max.z, 3.0);

        assert!(matches!(
            state.apply_shell_delta("path", &delta),
            Err(LoadError::UnknownReference(_))
        ));
    }

    #[test]
    fn test_rejected_shell_delta_keeps_geometry() {
        let NcOutput { mut state, .. } = built();
        load_stock(&mut state);
        let bad = ShellDelta::parse(r#"{"values": [], "remove": [3]}"#).unwrap();
        assert!(matches!(
            state.apply_shell_delta("stock", &bad),
            Err(LoadError::Parse { .. })
        ));
        let key = stock_key(&state);
        assert_eq!(state.shell(key).and_then(Shell::geometry).unwrap().triangle_count(), 1);
    }
}
