// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixtures shared by the server tests.

use std::path::PathBuf;

/// Two shapes sharing one shell, plus an annotation on the root shape.
pub const WIDGET_INDEX: &str = r#"{
    "root": "P1",
    "products": [{"id": "P1", "name": "Widget", "shapes": ["S0"]}],
    "shapes": [
        {"id": "S0", "children": [
            {"ref": "S1"},
            {"ref": "S2", "xform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 1000,0,0,1]}
        ], "annotations": ["A1"]},
        {"id": "S1", "shells": ["SH1"]},
        {"id": "S2", "shells": ["SH1"]}
    ],
    "shells": [{"id": "SH1", "href": "shell_SH1.json", "size": 1}],
    "annotations": [{"id": "A1", "href": "annotation_A1.json"}]
}"#;

pub const WIDGET_SHELL: &str = r#"{
    "position": [0,0,0, 2000,0,0, 0,2000,0],
    "normals":  [0,0,1, 0,0,1, 0,0,1]
}"#;

pub const WIDGET_ANNOTATION: &str = r#"{"lines": [[0,0,0, 1000,0,0]]}"#;

/// One stock shell placed by an NC state.
pub const MILL_STATE: &str = r#"{
    "project": "mill-op10",
    "workingstep": "WS1",
    "geom": [{"id": "stock", "usage": "asis", "shell": "stock.json", "size": 1}]
}"#;

/// Fresh, empty directory unique to this process and `name`.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("cadview-server-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Store root holding the widget model under `widget/`.
pub fn widget_store(name: &str) -> PathBuf {
    let root = scratch_dir(name);
    let model = root.join("widget");
    std::fs::create_dir_all(&model).unwrap();
    std::fs::write(model.join("index.json"), WIDGET_INDEX).unwrap();
    std::fs::write(model.join("shell_SH1.json"), WIDGET_SHELL).unwrap();
    std::fs::write(model.join("annotation_A1.json"), WIDGET_ANNOTATION).unwrap();

    let mill = root.join("mill");
    std::fs::create_dir_all(&mill).unwrap();
    std::fs::write(mill.join("state.json"), MILL_STATE).unwrap();
    std::fs::write(mill.join("stock.json"), WIDGET_SHELL).unwrap();
    root
}
