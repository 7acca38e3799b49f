// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end loader tests against in-memory model directories.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use approx::assert_relative_eq;
use cadview_core::{DocumentKind, NcDocument, ShellDelta};
use cadview_geometry::{translation, Point3};
use cadview_processing::{
    AssemblyEvent, DataLoader, LoadError, LoaderConfig, LoaderEvent, MemoryFetcher, NcGeometry, NodeRef,
    Resolved, Shell,
};

/// S1 and S2 both include SH1; S2 sits 10 units along x
const SHARED_INDEX: &str = r#"<?xml version="1.0"?>
<step-assembly root="P1">
  <product id="P1" name="Widget" step="widget.stp" shape="S0"/>
  <shape id="S0" unit="mm 1">
    <child ref="S1" xform="I"/>
    <child ref="S2" xform="1 0 0 0 0 1 0 0 0 0 1 0 10 0 0 1"/>
  </shape>
  <shape id="S1" unit="mm 1" shell="SH1"/>
  <shape id="S2" unit="mm 1" shell="SH1"/>
  <shell id="SH1" href="sh1.xml" bbox="0 0 0 1 1 0" size="1"/>
</step-assembly>"#;

/// One triangle spanning (0,0,0)..(2,2,0)
const TRIANGLE_XML: &str = r#"<shell id="SH1">
  <verts><v p="0 0 0"/><v p="2 0 0"/><v p="0 2 0"/></verts>
  <facets color="00ff00">
    <f v="0 1 2"><n d="0 0 1"/><n d="0 0 1"/><n d="0 0 1"/></f>
  </facets>
</shell>"#;

fn triangle_json(x: f32) -> String {
    format!(
        r#"{{"position": [{x},0,0, {x1},0,0, {x},1,0], "normals": [0,0,1, 0,0,1, 0,0,1]}}"#,
        x = x,
        x1 = x + 1.0
    )
}

fn recorder(loader: &mut DataLoader) -> Rc<RefCell<Vec<LoaderEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    loader
        .events_mut()
        .subscribe(move |event: &LoaderEvent| sink.borrow_mut().push(event.clone()));
    events
}

/// `count` shapes under the root, each with its own shell file
fn wide_index(count: usize) -> (String, MemoryFetcher) {
    let shape_ids: Vec<String> = (0..count).map(|i| format!("S{}", i)).collect();
    let mut index = format!(
        r#"{{"root": "P1", "products": [{{"id": "P1", "name": "Wide", "shapes": {}}}], "shapes": ["#,
        serde_json::to_string(&shape_ids).unwrap()
    );
    let shapes: Vec<String> = (0..count)
        .map(|i| format!(r#"{{"id": "S{i}", "unit": "mm 1", "shells": ["SH{i}"]}}"#, i = i))
        .collect();
    index.push_str(&shapes.join(","));
    index.push_str(r#"], "shells": ["#);
    let shells: Vec<String> = (0..count)
        .map(|i| format!(r#"{{"id": "SH{i}", "href": "sh{i}.json", "size": 1}}"#, i = i))
        .collect();
    index.push_str(&shells.join(","));
    index.push_str("]}");

    let mut fetcher = MemoryFetcher::new();
    for i in 0..count {
        fetcher.insert(format!("wide/sh{}.json", i), triangle_json(i as f32 * 2.0));
    }
    (index, fetcher)
}

#[test]
fn test_shared_shell_loads_once() {
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_document("widget/index.xml", SHARED_INDEX)
            .with_document("widget/sh1.xml", TRIANGLE_XML),
    );
    let mut loader = DataLoader::new(LoaderConfig::default(), fetcher.clone()).unwrap();
    let doc = loader.load("widget/", DocumentKind::Assembly).unwrap();

    let loaded = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&loaded);
    loader
        .assembly_mut(doc)
        .unwrap()
        .events_mut()
        .subscribe(move |event: &AssemblyEvent| sink.borrow_mut().push(*event));
    loader.wait();

    assert_eq!(fetcher.fetch_count("widget/sh1.xml"), 1);
    let assembly = loader.assembly(doc).unwrap();
    assert_eq!(assembly.shells().count(), 1);
    let (_, shell) = assembly.shells().next().unwrap();
    assert!(shell.is_loaded());

    // One notification per including shape
    let s1 = assembly.get_child("S1").and_then(|n| n.as_shape()).unwrap();
    let s2 = assembly.get_child("S2").and_then(|n| n.as_shape()).unwrap();
    let mut shapes: Vec<_> = loaded
        .borrow()
        .iter()
        .map(|e| match e {
            AssemblyEvent::ShapeLoaded { shape, .. } => *shape,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    shapes.sort();
    let mut expected = vec![s1, s2];
    expected.sort();
    assert_eq!(shapes, expected);
}

#[test]
fn test_bounds_follow_loaded_geometry() {
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_document("widget/index.xml", SHARED_INDEX)
            .with_document("widget/sh1.xml", TRIANGLE_XML),
    );
    let mut loader = DataLoader::new(LoaderConfig::default(), fetcher).unwrap();
    let doc = loader.load("widget/", DocumentKind::Assembly).unwrap();

    // Index boxes until the payload arrives
    let before = loader.assembly(doc).unwrap().get_bounding_box();
    assert_relative_eq!(before.max, Point3::new(11.0, 1.0, 0.0));

    loader.wait();
    let after = loader.assembly(doc).unwrap().get_bounding_box();
    assert_relative_eq!(after.min, Point3::new(0.0, 0.0, 0.0));
    assert_relative_eq!(after.max, Point3::new(12.0, 2.0, 0.0));
    assert!(after.contains(&before));
}

#[test]
fn test_event_sequence_for_one_payload() {
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_document("widget/index.xml", SHARED_INDEX)
            .with_document("widget/sh1.xml", TRIANGLE_XML),
    );
    let mut loader = DataLoader::new(LoaderConfig::default(), fetcher).unwrap();
    let events = recorder(&mut loader);
    loader.load("widget/", DocumentKind::Assembly).unwrap();
    loader.wait();

    let shell_events: Vec<String> = events
        .borrow()
        .iter()
        .filter(|e| e.file() == Some("sh1.xml"))
        .map(|e| serde_json::to_value(e).unwrap()["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        shell_events,
        vec![
            "addRequest",
            "loadProgress",
            "loadComplete",
            "parseComplete",
            "shellLoad",
            "workerFinish"
        ]
    );
    let root_events = events.borrow().iter().filter(|e| e.file() == Some("index.xml")).count();
    assert!(root_events >= 5);
    assert_eq!(events.borrow().last(), Some(&LoaderEvent::QueueEmpty));
}

#[test]
fn test_worker_pool_saturation() {
    let (index, fetcher) = wide_index(10);
    let fetcher = Arc::new(fetcher.with_document("wide/index.json", index));
    let mut loader = DataLoader::new(LoaderConfig::default().with_max_workers(3), fetcher.clone()).unwrap();
    let doc = loader.load("wide/index.json", DocumentKind::Assembly).unwrap();

    // The root's worker was refilled as soon as the graph queued its payloads
    assert_eq!(loader.queue_length(true), 3);
    assert_eq!(loader.queue_length(false), 10);

    loader.wait();
    assert_eq!(loader.queue_length(false), 0);
    assert_eq!(fetcher.total_fetches(), 11);
    let assembly = loader.assembly(doc).unwrap();
    assert!(assembly.shells().all(|(_, shell)| shell.is_loaded()));
    assert_relative_eq!(assembly.get_bounding_box().max.x, 19.0);
}

#[test]
fn test_poll_drains_without_blocking() {
    let (index, fetcher) = wide_index(4);
    let fetcher = Arc::new(fetcher.with_document("wide/index.json", index));
    let mut loader = DataLoader::new(LoaderConfig::default().with_max_workers(2), fetcher).unwrap();
    let doc = loader.load("wide/index.json", DocumentKind::Assembly).unwrap();

    let mut rounds = 0;
    while !loader.is_idle() {
        loader.poll();
        std::thread::yield_now();
        rounds += 1;
        assert!(rounds < 1_000_000, "loader never became idle");
    }
    let assembly = loader.assembly(doc).unwrap();
    assert_eq!(assembly.shells().filter(|(_, s)| s.is_loaded()).count(), 4);
}

#[test]
fn test_root_failure_keeps_no_document() {
    let fetcher = Arc::new(MemoryFetcher::new());
    let mut loader = DataLoader::new(LoaderConfig::default(), fetcher).unwrap();
    let events = recorder(&mut loader);

    let err = loader.load("missing/", DocumentKind::Assembly).unwrap_err();
    assert!(matches!(err, LoadError::Http { status: 404, .. }));
    assert_eq!(loader.documents().count(), 0);
    assert!(events
        .borrow()
        .iter()
        .any(|e| matches!(e, LoaderEvent::LoadError { file, .. } if file == "index.xml")));
}

#[test]
fn test_root_without_root_product_fails() {
    let fetcher = Arc::new(MemoryFetcher::new().with_document(
        "broken/index.json",
        r#"{"root": "P9", "products": [{"id": "P1"}]}"#,
    ));
    let mut loader = DataLoader::new(LoaderConfig::default(), fetcher).unwrap();
    let err = loader.load("broken/index.json", DocumentKind::Assembly).unwrap_err();
    assert!(matches!(err, LoadError::MissingRoot(id) if id == "P9"));
    assert_eq!(loader.documents().count(), 0);
}

#[test]
fn test_payload_failure_does_not_stop_queue() {
    let (index, mut fetcher) = wide_index(3);
    fetcher.insert("wide/sh1.json", "{not json");
    let fetcher = Arc::new(fetcher.with_document("wide/index.json", index));
    let mut loader = DataLoader::new(LoaderConfig::default().with_max_workers(1), fetcher).unwrap();
    let events = recorder(&mut loader);
    let doc = loader.load("wide/index.json", DocumentKind::Assembly).unwrap();
    loader.wait();

    let errors: Vec<String> = events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            LoaderEvent::LoadError { file, .. } => Some(file.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(errors, vec!["sh1.json"]);

    let assembly = loader.assembly(doc).unwrap();
    let loaded: Vec<&str> = assembly
        .shells()
        .filter(|(_, s)| s.is_loaded())
        .map(|(_, s)| s.id())
        .collect();
    assert_eq!(loaded.len(), 2);
    assert!(!loaded.contains(&"SH1"));
}

#[test]
fn test_batches_route_shells_by_id() {
    let index = r#"{
        "root": "P1",
        "batches": 1,
        "products": [{"id": "P1", "name": "Batched", "shapes": ["S1"]}],
        "shapes": [{"id": "S1", "unit": "mm 1", "shells": ["SH1", "SH2"]}],
        "shells": [{"id": "SH1", "href": "sh1.json", "size": 1}, {"id": "SH2", "href": "sh2.json", "size": 1}]
    }"#;
    let batch = r#"{"shells": [
        {"id": "SH2", "position": [0,0,0, 1,0,0, 0,1,0], "normals": [0,0,1, 0,0,1, 0,0,1]},
        {"id": "SH1", "position": [5,0,0, 6,0,0, 5,1,0], "normals": [0,0,1, 0,0,1, 0,0,1]},
        {"id": "SH9", "position": [], "normals": []}
    ]}"#;
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_document("batched/index.json", index)
            .with_document("batched/batch0.json", batch),
    );
    let mut loader = DataLoader::new(LoaderConfig::default(), fetcher.clone()).unwrap();
    let doc = loader.load("batched/index.json", DocumentKind::Assembly).unwrap();
    loader.wait();

    assert_eq!(fetcher.fetch_count("batched/batch0.json"), 1);
    assert_eq!(fetcher.fetch_count("batched/sh1.json"), 0);
    let assembly = loader.assembly(doc).unwrap();
    let sh1 = assembly.get_child("SH1").and_then(|n| n.as_shell()).unwrap();
    let shell = assembly.shell(sh1).unwrap();
    assert!(shell.is_loaded());
    assert_relative_eq!(shell.bounding_box().min.x, 5.0);
}

#[test]
fn test_id_resolution_after_load() {
    let index = r#"<step-assembly root="P1">
      <product id="P1" name="Pair" shape="S0"/>
      <shape id="S0" unit="mm 1">
        <child ref="S1" xform="I"/>
        <child ref="S1" xform="1 0 0 0 0 1 0 0 0 0 1 0 4 0 0 1"/>
      </shape>
      <shape id="S1" unit="mm 1" shell="SH1"/>
      <shell id="SH1" href="sh1.xml" size="1"/>
    </step-assembly>"#;
    let fetcher = Arc::new(
        MemoryFetcher::new()
            .with_document("pair/index.xml", index)
            .with_document("pair/sh1.xml", TRIANGLE_XML),
    );
    let mut loader = DataLoader::new(LoaderConfig::default(), fetcher).unwrap();
    let doc = loader.load("pair/", DocumentKind::Assembly).unwrap();
    loader.wait();
    let assembly = loader.assembly(doc).unwrap();

    assert_eq!(assembly.get_by_id("id0"), Some(Resolved::Assembly));
    let canonical = assembly.get_child("S1").unwrap();
    assert_eq!(assembly.get_by_id("S1_0"), Some(Resolved::Node(canonical)));
    let Some(Resolved::Node(NodeRef::Shape(instance))) = assembly.get_by_id("S1_1") else {
        panic!("S1_1 should be an instance");
    };
    assert_eq!(assembly.shape(instance).unwrap().id(), "S1_1");
    assert_eq!(assembly.get_by_id("S1_2"), None);
    assert_eq!(assembly.get_by_id("nope"), None);

    // The shared shell reached both occurrences
    assert_relative_eq!(assembly.get_bounding_box().max.x, 6.0);
}

#[test]
fn test_cancel_discards_pending_work() {
    let (index, fetcher) = wide_index(6);
    let fetcher = Arc::new(fetcher.with_document("wide/index.json", index));
    let mut loader = DataLoader::new(LoaderConfig::default().with_max_workers(2), fetcher.clone()).unwrap();
    let events = recorder(&mut loader);
    let doc = loader.load("wide/index.json", DocumentKind::Assembly).unwrap();

    let assembly = loader.cancel(doc).unwrap();
    assert_eq!(assembly.name(), "Wide");
    assert!(loader.assembly(doc).is_none());
    assert_eq!(loader.queue_length(false), 2);

    loader.wait();
    assert!(loader.is_idle());
    // Only the two requests already in flight were fetched
    assert_eq!(fetcher.total_fetches(), 3);
    assert!(!events
        .borrow()
        .iter()
        .any(|e| matches!(e, LoaderEvent::ShellLoad { .. })));
}

#[test]
fn test_non_assembly_root_is_rejected() {
    let mut loader = DataLoader::new(LoaderConfig::default(), Arc::new(MemoryFetcher::new())).unwrap();
    assert!(matches!(
        loader.load("m/sh1.xml", DocumentKind::Shell),
        Err(LoadError::UnsupportedRoot(DocumentKind::Shell))
    ));
}

/// Stock keyframe at two decimal places plus a toolpath polyline
fn mill_fetcher() -> MemoryFetcher {
    let state = r#"{
        "project": "mill-op10",
        "workingstep": "WS1",
        "time_in_workingstep": 0,
        "geom": [
            {"id": "stock", "usage": "asis", "shell": "stock.json", "size": 1,
             "xform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,5,1], "bbox": [0,0,0,1,1,0]},
            {"id": "path", "usage": "toolpath", "polyline": "path.json"}
        ]
    }"#;
    let stock = r#"{
        "values": [0, 100, 200],
        "pointsIndex": [0,0,0, 2,0,0, 0,2,0],
        "normalsIndex": [0,0,1, 0,0,1, 0,0,1],
        "colorsData": [{"data": [0, 1, 0], "duration": 3}]
    }"#;
    let path = r#"{"lines": [[0,0,1, 4,0,1]]}"#;
    MemoryFetcher::new()
        .with_document("mill/state.json", state)
        .with_document("mill/stock.json", stock)
        .with_document("mill/path.json", path)
}

#[test]
fn test_nc_state_loads_keyframes_and_polylines() {
    let fetcher = Arc::new(mill_fetcher());
    let mut loader = DataLoader::new(LoaderConfig::default(), fetcher.clone()).unwrap();
    let events = recorder(&mut loader);
    let doc = loader.load("mill/", DocumentKind::Nc).unwrap();
    loader.wait();

    assert!(loader.assembly(doc).is_none());
    let nc = loader.nc(doc).unwrap();
    assert_eq!(nc.project(), "mill-op10");
    assert_eq!(nc.workingstep(), Some("WS1"));
    assert!(nc.is_loaded());
    assert_eq!(fetcher.total_fetches(), 3);

    // Keyframe values scaled by the default two decimal places
    let NcGeometry::Shell(stock) = nc.model("stock").unwrap().geometry else {
        panic!("stock should be a shell");
    };
    let geometry = nc.shell(stock).and_then(Shell::geometry).unwrap();
    assert_eq!(&geometry.positions[3..6], &[2.0, 0.0, 0.0]);
    assert_eq!(&geometry.colors[..3], &[0.0, 1.0, 0.0]);

    // Stock lifted to z = 5, toolpath reaching x = 4 at z = 1
    let bounds = nc.get_bounding_box();
    assert_relative_eq!(bounds.max.x, 4.0);
    assert_relative_eq!(bounds.min.z, 1.0);
    assert_relative_eq!(bounds.max.z, 5.0);

    let events = events.borrow();
    let count = |f: fn(&LoaderEvent) -> bool| events.iter().filter(|e| f(e)).count();
    assert_eq!(count(|e| matches!(e, LoaderEvent::RootLoad { .. })), 1);
    assert_eq!(count(|e| matches!(e, LoaderEvent::ShellLoad { .. })), 1);
    assert_eq!(count(|e| matches!(e, LoaderEvent::AnnotationLoad { .. })), 1);
    assert!(matches!(events.last(), Some(LoaderEvent::QueueEmpty)));
}

#[test]
fn test_nc_deltas_after_load() {
    let mut loader = DataLoader::new(LoaderConfig::default(), Arc::new(mill_fetcher())).unwrap();
    let doc = loader.load("mill/state.json", DocumentKind::Nc).unwrap();
    loader.wait();

    let moved = NcDocument::parse_json(
        r#"{"project": "mill-op10", "workingstep": "WS2", "time_in_workingstep": 0.5,
            "geom": [{"id": "stock", "xform": [1,0,0,0, 0,1,0,0, 0,0,1,0, 3,0,0,1]}]}"#,
    )
    .unwrap();
    assert!(loader.apply_delta(&moved));
    let nc = loader.nc(doc).unwrap();
    assert_eq!(nc.workingstep(), Some("WS2"));
    assert_relative_eq!(nc.time_in_workingstep(), 0.5);
    assert_relative_eq!(translation(&nc.model("stock").unwrap().transform).x, 3.0);

    let unrelated = NcDocument {
        project: "lathe-op20".into(),
        ..Default::default()
    };
    assert!(!loader.apply_delta(&unrelated));

    // Value 3 is the delta's 400 at the keyframe's precision
    let grow = ShellDelta::parse(
        r#"{"values": [400], "pointsIndex": [3,0,0, 0,3,0, 0,0,0],
            "normalsIndex": [0,0,1, 0,0,1, 0,0,1], "remove": [0]}"#,
    )
    .unwrap();
    let nc = loader.nc_mut(doc).unwrap();
    assert!(nc.apply_shell_delta("stock", &grow).unwrap());
    let NcGeometry::Shell(stock) = nc.model("stock").unwrap().geometry else {
        panic!("stock should be a shell");
    };
    let geometry = nc.shell(stock).and_then(Shell::geometry).unwrap();
    assert_eq!(geometry.triangle_count(), 2);
    assert!(geometry.positions[..9].iter().all(|&v| v == 0.0));
    assert_eq!(&geometry.positions[9..15], &[4.0, 0.0, 0.0, 0.0, 4.0, 0.0]);
}

#[test]
fn test_nc_root_must_be_json() {
    let fetcher = Arc::new(MemoryFetcher::new().with_document("mill/state.xml", "<nc/>"));
    let mut loader = DataLoader::new(LoaderConfig::default(), fetcher).unwrap();
    assert!(matches!(
        loader.load("mill/state.xml", DocumentKind::Nc),
        Err(LoadError::Parse { .. })
    ));
    assert_eq!(loader.documents().count(), 0);
}
