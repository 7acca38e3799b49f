// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Small helpers over quick-xml events

use quick_xml::events::BytesStart;
use quick_xml::Reader;

use crate::error::{Error, Result};

pub(crate) fn reader(text: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    reader
}

pub(crate) fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

/// Get an optional attribute value, unescaped
pub(crate) fn attribute(e: &BytesStart, name: &str) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == name.as_bytes() {
            return attr
                .unescape_value()
                .map(|v| v.into_owned())
                .ok()
                .or_else(|| String::from_utf8(attr.value.to_vec()).ok());
        }
    }
    None
}

/// Get a required attribute value
pub(crate) fn required(e: &BytesStart, name: &'static str) -> Result<String> {
    attribute(e, name).ok_or_else(|| Error::MissingAttribute {
        element: element_name(e),
        attribute: name,
    })
}

pub(crate) fn xml_error<R>(reader: &Reader<R>, err: quick_xml::Error) -> Error {
    Error::xml(reader.buffer_position() as u64, err)
}
