// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Machining (NC) state documents and incremental shell updates
//!
//! An NC state is a flat list of placed geometry for one working step of a
//! machining project: stock, tool and fixture shells plus toolpath
//! polylines. The same document shape arrives again as a state delta that
//! moves geometry and advances the working step clock.
//!
//! NC shells are sent as keyframes (the indexed JSON shell form) and then
//! grown by [`ShellDelta`]s. A delta appends values to the keyframe's
//! value table, indexes into the combined table and may blank out removed
//! triangles, so the decoder keeps the value table alive between updates.

use serde::Deserialize;

use crate::color::Rgb;
use crate::content::ContentType;
use crate::error::{Error, Result};
use crate::index::INDEX_MATRIX_ORDER;
use crate::payload::{expand_color_runs, parse_shell_json, unindex, ColorRun, ShellPayload, FLOATS_PER_TRIANGLE};
use crate::values::{Extent, ExtentValue, Transform, TransformValue};

/// Decimal places assumed for keyframe and delta values that do not say
pub const DEFAULT_PRECISION: i32 = 2;

/// Root file of an NC directory
pub const NC_STATE_FILE: &str = "state.json";

/// Geometry referenced by one NC entry
#[derive(Debug, Clone, PartialEq)]
pub enum NcSource {
    Shell { href: String },
    Polyline { href: String },
}

/// One placed piece of geometry in an NC state
#[derive(Debug, Clone, PartialEq)]
pub struct NcGeom {
    pub id: String,
    /// Role in the machining setup (`tobe`, `asis`, `cutter`, `toolpath`, ...)
    pub usage: Option<String>,
    /// `None` for entries naming neither a shell nor a polyline
    pub source: Option<NcSource>,
    /// Triangle count announced for shells
    pub size: usize,
    /// `None` when the entry carries no `xform`
    pub transform: Option<Transform>,
    pub bbox: Option<Extent>,
}

/// A full NC state, or a state delta when only some entries are present
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NcDocument {
    pub project: String,
    pub workingstep: Option<String>,
    pub time_in_workingstep: f64,
    /// State this delta was computed against
    pub prev: Option<String>,
    pub geom: Vec<NcGeom>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Label {
    Text(String),
    Number(f64),
}

impl Label {
    fn into_string(self) -> String {
        match self {
            Label::Text(text) => text,
            Label::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct JsonNc {
    #[serde(default)]
    project: String,
    workingstep: Option<Label>,
    time_in_workingstep: Option<f64>,
    prev: Option<String>,
    #[serde(default)]
    geom: Vec<JsonGeom>,
}

#[derive(Deserialize)]
struct JsonGeom {
    id: String,
    usage: Option<String>,
    shell: Option<String>,
    polyline: Option<String>,
    size: Option<f64>,
    xform: Option<TransformValue>,
    bbox: Option<ExtentValue>,
}

impl NcDocument {
    /// NC states are published as JSON only
    pub fn parse(text: &str, content_type: ContentType) -> Result<Self> {
        match content_type {
            ContentType::Json => Self::parse_json(text),
            ContentType::Xml => Err(Error::payload("NC state documents must be JSON")),
        }
    }

    pub fn parse_json(text: &str) -> Result<Self> {
        let raw: JsonNc = serde_json::from_str(text)?;
        let geom = raw
            .geom
            .into_iter()
            .map(|g| {
                let source = match (g.shell, g.polyline) {
                    (Some(href), _) => Some(NcSource::Shell { href }),
                    (None, Some(href)) => Some(NcSource::Polyline { href }),
                    (None, None) => None,
                };
                Ok(NcGeom {
                    transform: g.xform.map(|x| x.resolve(INDEX_MATRIX_ORDER)).transpose()?,
                    bbox: g.bbox.as_ref().map(ExtentValue::resolve).transpose()?,
                    size: g.size.unwrap_or(0.0).max(0.0) as usize,
                    usage: g.usage,
                    source,
                    id: g.id,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            project: raw.project,
            workingstep: raw.workingstep.map(Label::into_string),
            time_in_workingstep: raw.time_in_workingstep.unwrap_or(0.0),
            prev: raw.prev,
            geom,
        })
    }

    pub fn geom(&self, id: &str) -> Option<&NcGeom> {
        self.geom.iter().find(|g| g.id == id)
    }
}

// --- Keyframes and deltas ---

/// Run of faces sharing a color, the newer alternative to `colorsData`
#[derive(Deserialize)]
struct FaceRun {
    color: [f32; 3],
    count: usize,
}

/// Vertex colors of a keyframe or delta; runs are counted in vertices
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ColorRuns {
    Runs(Vec<([f32; 3], usize)>),
    /// Neither `colorsData` nor `faces`: the default shell color
    #[default]
    Default,
}

impl ColorRuns {
    fn from_json(colors_data: Option<Vec<ColorRun>>, faces: Option<Vec<FaceRun>>) -> Self {
        match (colors_data, faces) {
            (Some(runs), _) => ColorRuns::Runs(runs.into_iter().map(|r| (r.data, r.duration)).collect()),
            (None, Some(faces)) => ColorRuns::Runs(faces.into_iter().map(|f| (f.color, f.count)).collect()),
            (None, None) => ColorRuns::Default,
        }
    }

    fn expand(&self, len: usize) -> Result<Vec<f32>> {
        match self {
            ColorRuns::Runs(runs) => {
                let runs: Vec<ColorRun> = runs
                    .iter()
                    .map(|&(data, duration)| ColorRun { data, duration })
                    .collect();
                expand_color_runs(&runs, len)
            }
            ColorRuns::Default => Ok(Rgb::default_shell()
                .to_array()
                .iter()
                .copied()
                .cycle()
                .take(len)
                .collect()),
        }
    }
}

/// A decoded NC shell together with the value table its deltas index into
#[derive(Debug, Clone, PartialEq)]
pub struct ShellKeyframe {
    /// Scaled values; empty for shells sent in the flat form
    pub values: Vec<f32>,
    pub precision: i32,
    pub payload: ShellPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonIndexed {
    #[serde(default)]
    values: Vec<f64>,
    precision: Option<i32>,
    points_index: Option<Vec<usize>>,
    #[serde(default)]
    normals_index: Vec<usize>,
    colors_data: Option<Vec<ColorRun>>,
    faces: Option<Vec<FaceRun>>,
    #[serde(default)]
    remove: Vec<usize>,
}

fn scale(values: &[f64], precision: i32) -> impl Iterator<Item = f32> + '_ {
    let factor = 10f64.powi(precision);
    values.iter().map(move |v| (v / factor) as f32)
}

fn check_index_lengths(points: &[usize], normals: &[usize]) -> Result<()> {
    if points.len() != normals.len() {
        return Err(Error::payload(format!(
            "normalsIndex length {} does not match pointsIndex length {}",
            normals.len(),
            points.len()
        )));
    }
    if points.len() % FLOATS_PER_TRIANGLE != 0 {
        return Err(Error::payload(format!(
            "pointsIndex length {} is not a multiple of {}",
            points.len(),
            FLOATS_PER_TRIANGLE
        )));
    }
    Ok(())
}

impl ShellKeyframe {
    /// Decode an NC shell; the indexed form keeps its value table, the
    /// flat form decodes like any JSON shell
    pub fn parse(text: &str, content_type: ContentType) -> Result<Self> {
        if content_type == ContentType::Xml {
            return Err(Error::payload("NC shells must be JSON"));
        }
        let raw: JsonIndexed = serde_json::from_str(text)?;
        let Some(points_index) = raw.points_index else {
            return Ok(Self {
                values: Vec::new(),
                precision: DEFAULT_PRECISION,
                payload: parse_shell_json(text)?,
            });
        };
        check_index_lengths(&points_index, &raw.normals_index)?;

        let precision = raw.precision.unwrap_or(DEFAULT_PRECISION);
        let values: Vec<f32> = scale(&raw.values, precision).collect();
        let position = unindex(&values, &points_index)?;
        let normals = unindex(&values, &raw.normals_index)?;
        let colors = ColorRuns::from_json(raw.colors_data, raw.faces).expand(position.len())?;
        let payload = ShellPayload {
            id: None,
            position,
            normals,
            colors,
        }
        .validate()?;
        Ok(Self {
            values,
            precision,
            payload,
        })
    }

    /// Append a delta's triangles and blank the triangles it removes
    ///
    /// Nothing changes when the delta is rejected.
    pub fn apply_delta(&mut self, delta: &ShellDelta) -> Result<()> {
        let triangles = self.payload.triangle_count();
        if let Some(&bad) = delta.remove.iter().find(|&&t| t >= triangles) {
            return Err(Error::payload(format!(
                "delta removes triangle {} of {}",
                bad, triangles
            )));
        }

        let base = self.values.len();
        let precision = delta.precision.unwrap_or(self.precision);
        self.values.extend(scale(&delta.values, precision));
        let added = unindex(&self.values, &delta.points_index)
            .and_then(|p| Ok((p, unindex(&self.values, &delta.normals_index)?)))
            .and_then(|(p, n)| {
                let c = delta.colors.expand(p.len())?;
                Ok((p, n, c))
            });
        let (position, normals, colors) = match added {
            Ok(buffers) => buffers,
            Err(err) => {
                self.values.truncate(base);
                return Err(err);
            }
        };

        let payload = &mut self.payload;
        for &t in &delta.remove {
            let range = t * FLOATS_PER_TRIANGLE..(t + 1) * FLOATS_PER_TRIANGLE;
            payload.position[range.clone()].fill(0.0);
            payload.normals[range.clone()].fill(0.0);
            payload.colors[range].fill(0.0);
        }
        payload.position.extend(position);
        payload.normals.extend(normals);
        payload.colors.extend(colors);
        Ok(())
    }
}

/// Incremental update to an NC shell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellDelta {
    /// Unscaled values appended to the keyframe's table
    pub values: Vec<f64>,
    /// Falls back to the keyframe's precision
    pub precision: Option<i32>,
    pub points_index: Vec<usize>,
    pub normals_index: Vec<usize>,
    pub colors: ColorRuns,
    /// Triangles of the current shell to blank out
    pub remove: Vec<usize>,
}

impl ShellDelta {
    pub fn parse(text: &str) -> Result<Self> {
        let raw: JsonIndexed = serde_json::from_str(text)?;
        let points_index = raw.points_index.unwrap_or_default();
        check_index_lengths(&points_index, &raw.normals_index)?;
        Ok(Self {
            values: raw.values,
            precision: raw.precision,
            points_index,
            normals_index: raw.normals_index,
            colors: ColorRuns::from_json(raw.colors_data, raw.faces),
            remove: raw.remove,
        })
    }
}
