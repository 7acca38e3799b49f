// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Index documents
//!
//! The index is the root of a streamed model. It lists products, shapes,
//! shells and annotations by id; shells and annotations point at payload
//! files through `href`. The XML and JSON variants describe the same
//! schema and parse into one [`IndexDocument`].
//!
//! ```xml
//! <step-assembly root="P1">
//!   <product id="P1" name="Widget" step="widget.stp" shape="S1" children="P2"/>
//!   <shape id="S1" unit="mm 0.001" shell="SH1">
//!     <child ref="S2" xform="I"/>
//!   </shape>
//!   <shell id="SH1" href="sh1.xml" bbox="0 0 0 1 1 1" size="2"/>
//! </step-assembly>
//! ```
//!
//! Transforms in the index are column-major.

use quick_xml::events::{BytesStart, Event};
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::color::Rgb;
use crate::content::ContentType;
use crate::error::{Error, Result};
use crate::units::{Unit, DEFAULT_JSON_UNIT};
use crate::values::{
    parse_float_vec, parse_id_list, Extent, ExtentValue, MatrixOrder, Transform, TransformValue,
};
use crate::xml;

/// Matrix order used by every transform in an index document
pub const INDEX_MATRIX_ORDER: MatrixOrder = MatrixOrder::ColumnMajor;

/// A named grouping of shapes and child products
#[derive(Debug, Clone, PartialEq)]
pub struct ProductEntry {
    pub id: String,
    pub name: String,
    pub step: Option<String>,
    pub shapes: Vec<String>,
    pub children: Vec<String>,
}

/// A reference from a shape to a child shape, with the placement of that
/// occurrence
#[derive(Debug, Clone, PartialEq)]
pub struct ChildRef {
    pub reference: String,
    pub transform: Transform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeEntry {
    pub id: String,
    pub unit: Option<Unit>,
    pub shells: Vec<String>,
    pub annotations: Vec<String>,
    pub children: Vec<ChildRef>,
}

/// Shell metadata known before its payload is fetched
#[derive(Debug, Clone, PartialEq)]
pub struct ShellEntry {
    pub id: String,
    pub href: Option<String>,
    pub bbox: Option<Extent>,
    /// Triangle count
    pub size: usize,
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEntry {
    pub id: String,
    pub href: Option<String>,
}

/// Parsed index document with id lookup tables
#[derive(Debug, Clone, Default)]
pub struct IndexDocument {
    pub root: String,
    pub products: FxHashMap<String, ProductEntry>,
    pub shapes: FxHashMap<String, ShapeEntry>,
    pub shells: FxHashMap<String, ShellEntry>,
    pub annotations: FxHashMap<String, AnnotationEntry>,
    /// Number of batch files carrying the shell payloads (0 = one file per shell)
    pub batches: usize,
}

impl IndexDocument {
    pub fn parse(text: &str, content_type: ContentType) -> Result<Self> {
        match content_type {
            ContentType::Xml => Self::parse_xml(text),
            ContentType::Json => Self::parse_json(text),
        }
    }

    #[inline]
    pub fn product(&self, id: &str) -> Option<&ProductEntry> {
        self.products.get(id)
    }

    #[inline]
    pub fn shape(&self, id: &str) -> Option<&ShapeEntry> {
        self.shapes.get(id)
    }

    #[inline]
    pub fn shell(&self, id: &str) -> Option<&ShellEntry> {
        self.shells.get(id)
    }

    #[inline]
    pub fn annotation(&self, id: &str) -> Option<&AnnotationEntry> {
        self.annotations.get(id)
    }

    // --- XML ---

    pub fn parse_xml(text: &str) -> Result<Self> {
        let mut reader = xml::reader(text);
        let mut buf = Vec::new();
        let mut doc = IndexDocument::default();
        let mut depth = 0usize;
        let mut seen_root = false;
        // Shape whose <child> elements are being collected
        let mut open_shape: Option<(ShapeEntry, usize)> = None;

        loop {
            buf.clear();
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => return Err(xml::xml_error(&reader, e)),
            };
            let is_start = matches!(event, Event::Start(_));
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    if !seen_root {
                        doc.root = xml::required(e, "root")?;
                        seen_root = true;
                    } else if let Some((shape, _)) = open_shape.as_mut() {
                        if e.name().as_ref() == b"child" {
                            shape.children.push(parse_child_xml(e)?);
                        }
                    } else if depth == 1 {
                        if e.name().as_ref() == b"shape" && is_start {
                            open_shape = Some((parse_shape_xml(e)?, depth + 1));
                        } else {
                            doc.insert_xml_element(e)?;
                        }
                    }
                    if is_start {
                        depth += 1;
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if matches!(open_shape, Some((_, d)) if d == depth + 1) {
                        if let Some((shape, _)) = open_shape.take() {
                            doc.shapes.insert(shape.id.clone(), shape);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(Error::MissingElement("index root element".into()));
        }
        Ok(doc)
    }

    fn insert_xml_element(&mut self, e: &BytesStart) -> Result<()> {
        match e.name().as_ref() {
            b"product" => {
                let id = xml::required(e, "id")?;
                let entry = ProductEntry {
                    name: xml::attribute(e, "name").unwrap_or_else(|| id.clone()),
                    step: xml::attribute(e, "step"),
                    shapes: parse_id_list(xml::attribute(e, "shape").as_deref()),
                    children: parse_id_list(xml::attribute(e, "children").as_deref()),
                    id,
                };
                self.products.insert(entry.id.clone(), entry);
            }
            b"shape" => {
                let entry = parse_shape_xml(e)?;
                self.shapes.insert(entry.id.clone(), entry);
            }
            b"shell" => {
                let bbox = xml::attribute(e, "bbox")
                    .map(|s| Extent::parse(&s))
                    .transpose()?;
                let size = match xml::attribute(e, "size") {
                    Some(s) => parse_float_vec(&s, Some(1))?[0].max(0.0) as usize,
                    None => 0,
                };
                let color = xml::attribute(e, "color")
                    .map(|s| Rgb::from_hex(&s))
                    .transpose()?;
                let entry = ShellEntry {
                    id: xml::required(e, "id")?,
                    href: xml::attribute(e, "href"),
                    bbox,
                    size,
                    color,
                };
                self.shells.insert(entry.id.clone(), entry);
            }
            b"annotation" => {
                let entry = AnnotationEntry {
                    id: xml::required(e, "id")?,
                    href: xml::attribute(e, "href"),
                };
                self.annotations.insert(entry.id.clone(), entry);
            }
            other => {
                tracing::debug!(
                    element = %String::from_utf8_lossy(other),
                    "Skipping unknown index element"
                );
            }
        }
        Ok(())
    }

    // --- JSON ---

    pub fn parse_json(text: &str) -> Result<Self> {
        let raw: JsonIndex = serde_json::from_str(text)?;
        let mut doc = IndexDocument {
            root: raw.root,
            batches: raw.batches,
            ..Default::default()
        };

        for p in raw.products {
            let entry = ProductEntry {
                name: p.name.unwrap_or_else(|| p.id.clone()),
                step: p.step,
                shapes: p.shapes,
                children: p.children,
                id: p.id,
            };
            doc.products.insert(entry.id.clone(), entry);
        }

        for s in raw.shapes {
            let unit = Unit::parse(s.unit.as_deref().unwrap_or(DEFAULT_JSON_UNIT))?;
            let children = s
                .children
                .into_iter()
                .map(|c| {
                    let transform = match c.xform {
                        Some(x) => x.resolve(INDEX_MATRIX_ORDER)?,
                        None => Transform::IDENTITY,
                    };
                    Ok(ChildRef {
                        reference: c.reference,
                        transform,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let entry = ShapeEntry {
                id: s.id,
                unit: Some(unit),
                shells: s.shells,
                annotations: s.annotations,
                children,
            };
            doc.shapes.insert(entry.id.clone(), entry);
        }

        for s in raw.shells {
            let entry = ShellEntry {
                bbox: s.bbox.as_ref().map(ExtentValue::resolve).transpose()?,
                size: s.size.unwrap_or(0.0).max(0.0) as usize,
                color: s.color.as_deref().map(Rgb::from_hex).transpose()?,
                href: s.href,
                id: s.id,
            };
            doc.shells.insert(entry.id.clone(), entry);
        }

        for a in raw.annotations {
            doc.annotations.insert(
                a.id.clone(),
                AnnotationEntry {
                    id: a.id,
                    href: a.href,
                },
            );
        }

        Ok(doc)
    }
}

fn parse_shape_xml(e: &BytesStart) -> Result<ShapeEntry> {
    Ok(ShapeEntry {
        id: xml::required(e, "id")?,
        unit: xml::attribute(e, "unit")
            .map(|s| Unit::parse(&s))
            .transpose()?,
        shells: parse_id_list(xml::attribute(e, "shell").as_deref()),
        annotations: parse_id_list(xml::attribute(e, "annotation").as_deref()),
        children: Vec::new(),
    })
}

fn parse_child_xml(e: &BytesStart) -> Result<ChildRef> {
    let transform = match xml::attribute(e, "xform") {
        Some(x) => Transform::parse(&x, INDEX_MATRIX_ORDER)?,
        None => Transform::IDENTITY,
    };
    Ok(ChildRef {
        reference: xml::required(e, "ref")?,
        transform,
    })
}

#[derive(Deserialize)]
struct JsonIndex {
    root: String,
    #[serde(default)]
    products: Vec<JsonProduct>,
    #[serde(default)]
    shapes: Vec<JsonShape>,
    #[serde(default)]
    shells: Vec<JsonShell>,
    #[serde(default)]
    annotations: Vec<JsonAnnotation>,
    #[serde(default)]
    batches: usize,
}

#[derive(Deserialize)]
struct JsonProduct {
    id: String,
    name: Option<String>,
    step: Option<String>,
    #[serde(default)]
    shapes: Vec<String>,
    #[serde(default)]
    children: Vec<String>,
}

#[derive(Deserialize)]
struct JsonShape {
    id: String,
    unit: Option<String>,
    #[serde(default)]
    shells: Vec<String>,
    #[serde(default)]
    annotations: Vec<String>,
    #[serde(default)]
    children: Vec<JsonChild>,
}

#[derive(Deserialize)]
struct JsonChild {
    #[serde(rename = "ref")]
    reference: String,
    xform: Option<TransformValue>,
}

#[derive(Deserialize)]
struct JsonShell {
    id: String,
    href: Option<String>,
    bbox: Option<ExtentValue>,
    size: Option<f64>,
    color: Option<String>,
}

#[derive(Deserialize)]
struct JsonAnnotation {
    id: String,
    href: Option<String>,
}
