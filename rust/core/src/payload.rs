// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shell, batch and annotation payload decoding
//!
//! Payloads are decoded into flat per-vertex buffers: every triangle owns
//! three vertex records, so positions, normals and colors each hold
//! `triangles * 9` floats. No shared-vertex topology survives decoding.

use quick_xml::events::{BytesStart, Event};
use serde::Deserialize;

use crate::color::Rgb;
use crate::content::ContentType;
use crate::error::{Error, Result};
use crate::values::parse_float_vec;
use crate::xml;

/// Floats per triangle in each of the position, normal and color buffers
pub const FLOATS_PER_TRIANGLE: usize = 9;

/// Decoded triangle soup for one shell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShellPayload {
    /// Shell id, present for payloads that arrive inside a batch
    pub id: Option<String>,
    pub position: Vec<f32>,
    pub normals: Vec<f32>,
    pub colors: Vec<f32>,
}

impl ShellPayload {
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.position.len() / FLOATS_PER_TRIANGLE
    }

    pub(crate) fn validate(self) -> Result<Self> {
        let len = self.position.len();
        if len % FLOATS_PER_TRIANGLE != 0 {
            return Err(Error::payload(format!(
                "position buffer length {} is not a multiple of {}",
                len, FLOATS_PER_TRIANGLE
            )));
        }
        if self.normals.len() != len || self.colors.len() != len {
            return Err(Error::payload(format!(
                "buffer lengths differ: position {}, normals {}, colors {}",
                len,
                self.normals.len(),
                self.colors.len()
            )));
        }
        Ok(self)
    }
}

/// Decoded polylines for one annotation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationPayload {
    /// One flat `x y z` list per line strip
    pub lines: Vec<Vec<f32>>,
    /// One color per line strip
    pub colors: Vec<Rgb>,
}

impl AnnotationPayload {
    pub fn vertex_count(&self) -> usize {
        self.lines.iter().map(|l| l.len() / 3).sum()
    }
}

pub fn parse_shell(text: &str, content_type: ContentType, expected_size: usize) -> Result<ShellPayload> {
    match content_type {
        ContentType::Xml => parse_shell_xml(text, expected_size),
        ContentType::Json => parse_shell_json(text),
    }
}

pub fn parse_annotation(text: &str, content_type: ContentType) -> Result<AnnotationPayload> {
    match content_type {
        ContentType::Xml => parse_annotation_xml(text),
        ContentType::Json => parse_annotation_json(text),
    }
}

pub fn parse_batch(text: &str, content_type: ContentType) -> Result<Vec<ShellPayload>> {
    match content_type {
        ContentType::Json => parse_batch_json(text),
        ContentType::Xml => Err(Error::payload("batches are only supported as JSON")),
    }
}

// --- XML shells ---

#[derive(Default)]
struct Facet {
    indices: Option<[usize; 3]>,
    normals: Vec<[f32; 3]>,
}

fn parse_vec3(e: &BytesStart, name: &'static str) -> Result<[f32; 3]> {
    let values = parse_float_vec(&xml::required(e, name)?, Some(3))?;
    Ok([values[0] as f32, values[1] as f32, values[2] as f32])
}

fn parse_indices(e: &BytesStart) -> Result<[usize; 3]> {
    let text = xml::required(e, "v")?;
    let mut out = [0usize; 3];
    let mut found = 0;
    for (slot, token) in out.iter_mut().zip(text.split_ascii_whitespace()) {
        *slot = token
            .parse::<usize>()
            .map_err(|_| Error::InvalidNumber(token.to_string()))?;
        found += 1;
    }
    if found != 3 {
        return Err(Error::ValueCount {
            expected: 3,
            found,
        });
    }
    Ok(out)
}

/// Expand an XML shell (`<verts>` plus `<facets>` of `<f>` index triplets)
/// into flat per-vertex buffers
///
/// Each facet group's color is broadcast to all three vertices of its
/// triangles; per-corner normals are copied verbatim.
pub fn parse_shell_xml(text: &str, expected_size: usize) -> Result<ShellPayload> {
    let mut reader = xml::reader(text);
    let mut buf = Vec::new();

    let mut points: Vec<[f32; 3]> = Vec::new();
    let capacity = expected_size * FLOATS_PER_TRIANGLE;
    let mut out = ShellPayload {
        id: None,
        position: Vec::with_capacity(capacity),
        normals: Vec::with_capacity(capacity),
        colors: Vec::with_capacity(capacity),
    };
    let mut in_verts = false;
    let mut color = Rgb::default_facet();
    let mut facet: Option<Facet> = None;

    loop {
        buf.clear();
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => return Err(xml::xml_error(&reader, e)),
        };
        let is_empty = matches!(event, Event::Empty(_));
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"verts" => in_verts = !is_empty,
                b"v" if in_verts => points.push(parse_vec3(e, "p")?),
                b"facets" => {
                    color = match xml::attribute(e, "color") {
                        Some(hex) => Rgb::from_hex(&hex)?,
                        None => Rgb::default_facet(),
                    };
                }
                b"f" => {
                    let started = Facet {
                        indices: Some(parse_indices(e)?),
                        normals: Vec::with_capacity(3),
                    };
                    if is_empty {
                        emit_facet(&mut out, &points, started, color)?;
                    } else {
                        facet = Some(started);
                    }
                }
                b"n" => {
                    if let Some(f) = facet.as_mut() {
                        f.normals.push(parse_vec3(e, "d")?);
                    }
                }
                _ => {}
            },
            Event::End(ref e) => match e.name().as_ref() {
                b"verts" => in_verts = false,
                b"f" => {
                    if let Some(f) = facet.take() {
                        emit_facet(&mut out, &points, f, color)?;
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if expected_size != 0 && out.triangle_count() != expected_size {
        tracing::warn!(
            expected = expected_size,
            found = out.triangle_count(),
            "Shell triangle count differs from index"
        );
    }
    out.validate()
}

fn emit_facet(out: &mut ShellPayload, points: &[[f32; 3]], facet: Facet, color: Rgb) -> Result<()> {
    let indices = facet
        .indices
        .ok_or_else(|| Error::MissingAttribute {
            element: "f".into(),
            attribute: "v",
        })?;
    if facet.normals.len() != 3 {
        return Err(Error::payload(format!(
            "facet needs 3 normals, found {}",
            facet.normals.len()
        )));
    }
    for (corner, &index) in indices.iter().enumerate() {
        let p = points.get(index).ok_or_else(|| {
            Error::payload(format!(
                "vertex index {} out of range ({} vertices)",
                index,
                points.len()
            ))
        })?;
        out.position.extend_from_slice(p);
        out.normals.extend_from_slice(&facet.normals[corner]);
        out.colors.extend_from_slice(&color.to_array());
    }
    Ok(())
}

// --- JSON shells ---

#[derive(Deserialize)]
pub(crate) struct ColorRun {
    pub(crate) data: [f32; 3],
    pub(crate) duration: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonShell {
    id: Option<String>,
    #[serde(alias = "positions")]
    position: Option<Vec<f32>>,
    normals: Option<Vec<f32>>,
    colors: Option<Vec<f32>>,
    values: Option<Vec<f64>>,
    precision: Option<i32>,
    points_index: Option<Vec<usize>>,
    normals_index: Option<Vec<usize>>,
    colors_data: Option<Vec<ColorRun>>,
}

impl JsonShell {
    fn decode(self) -> Result<ShellPayload> {
        let (position, normals) = match self.points_index {
            Some(points_index) => {
                let factor = self.precision.map(|p| 10f64.powi(p)).unwrap_or(1.0);
                let values: Vec<f32> = self
                    .values
                    .unwrap_or_default()
                    .into_iter()
                    .map(|v| (v / factor) as f32)
                    .collect();
                let normals_index = self.normals_index.unwrap_or_default();
                if normals_index.len() != points_index.len() {
                    return Err(Error::payload(format!(
                        "normalsIndex length {} does not match pointsIndex length {}",
                        normals_index.len(),
                        points_index.len()
                    )));
                }
                (unindex(&values, &points_index)?, unindex(&values, &normals_index)?)
            }
            None => (
                self.position.unwrap_or_default(),
                self.normals.unwrap_or_default(),
            ),
        };

        let colors = match (self.colors_data, self.colors) {
            (Some(runs), _) => expand_color_runs(&runs, position.len())?,
            (None, Some(colors)) => colors,
            (None, None) => Rgb::default_shell()
                .to_array()
                .iter()
                .copied()
                .cycle()
                .take(position.len())
                .collect(),
        };

        ShellPayload {
            id: self.id,
            position,
            normals,
            colors,
        }
        .validate()
    }
}

pub(crate) fn unindex(values: &[f32], index: &[usize]) -> Result<Vec<f32>> {
    index
        .iter()
        .map(|&i| {
            values.get(i).copied().ok_or_else(|| {
                Error::payload(format!("value index {} out of range ({})", i, values.len()))
            })
        })
        .collect()
}

/// Expand run-length encoded vertex colors; unwritten slots stay zero
pub(crate) fn expand_color_runs(runs: &[ColorRun], len: usize) -> Result<Vec<f32>> {
    let mut colors = vec![0.0f32; len];
    let mut index = 0;
    for run in runs {
        for _ in 0..run.duration {
            if index + 3 > len {
                return Err(Error::payload("colorsData covers more vertices than the shell"));
            }
            colors[index..index + 3].copy_from_slice(&run.data);
            index += 3;
        }
    }
    Ok(colors)
}

/// Decode a JSON shell in either the flat form (`position`, `normals`,
/// `colors`) or the indexed form (`values`, `pointsIndex`, `normalsIndex`,
/// `precision`, `colorsData`)
pub fn parse_shell_json(text: &str) -> Result<ShellPayload> {
    let raw: JsonShell = serde_json::from_str(text)?;
    raw.decode()
}

#[derive(Deserialize)]
struct JsonBatch {
    shells: Vec<JsonShell>,
}

/// Decode a batch file holding several indexed shells; every shell must carry its id
pub fn parse_batch_json(text: &str) -> Result<Vec<ShellPayload>> {
    let raw: JsonBatch = serde_json::from_str(text)?;
    raw.shells
        .into_iter()
        .map(|shell| {
            if shell.id.is_none() {
                return Err(Error::payload("batch shell without id"));
            }
            shell.decode()
        })
        .collect()
}

// --- Annotations ---

/// `<polyline><p l="x y z"/>...</polyline>` repeated
pub fn parse_annotation_xml(text: &str) -> Result<AnnotationPayload> {
    let mut reader = xml::reader(text);
    let mut buf = Vec::new();
    let mut payload = AnnotationPayload::default();
    let mut current: Option<Vec<f32>> = None;

    loop {
        buf.clear();
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => return Err(xml::xml_error(&reader, e)),
        };
        let is_empty = matches!(event, Event::Empty(_));
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"polyline" => {
                    if is_empty {
                        payload.lines.push(Vec::new());
                    } else {
                        current = Some(Vec::new());
                    }
                }
                b"p" => {
                    if let Some(line) = current.as_mut() {
                        let values = parse_float_vec(&xml::required(e, "l")?, None)?;
                        line.extend(values.into_iter().map(|v| v as f32));
                    }
                }
                _ => {}
            },
            Event::End(ref e) if e.name().as_ref() == b"polyline" => {
                if let Some(line) = current.take() {
                    payload.lines.push(line);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    payload.colors = strip_colors(payload.lines.len(), None);
    Ok(payload)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonAnnotation {
    lines: Vec<Vec<f32>>,
    colors_data: Option<Vec<ColorRun>>,
}

/// `{ lines: [[x,y,z,...], ...], colorsData?: [{data, duration}] }`
pub fn parse_annotation_json(text: &str) -> Result<AnnotationPayload> {
    let raw: JsonAnnotation = serde_json::from_str(text)?;
    let colors = strip_colors(raw.lines.len(), raw.colors_data.as_deref());
    Ok(AnnotationPayload {
        lines: raw.lines,
        colors,
    })
}

/// Strip `i` takes the first run whose cumulative duration exceeds `i`,
/// or the last run when none does; red without runs
fn strip_colors(strips: usize, runs: Option<&[ColorRun]>) -> Vec<Rgb> {
    (0..strips)
        .map(|strip| {
            let runs = match runs {
                Some(runs) if !runs.is_empty() => runs,
                _ => return Rgb::RED,
            };
            let mut covered = 0;
            let mut color = runs[0].data;
            for run in runs {
                covered += run.duration;
                color = run.data;
                if covered > strip {
                    break;
                }
            }
            Rgb::new(color[0], color[1], color[2])
        })
        .collect()
}
