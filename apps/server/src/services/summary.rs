// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Full model load for the tree endpoint.
//!
//! Runs the data loader against the store directory and waits for every
//! payload, so it must run on a blocking thread.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use cadview_core::DocumentKind;
use cadview_processing::{Assembly, DataLoader, FsFetcher, LoaderConfig, LoaderEvent};

use crate::error::ApiError;
use crate::types::{BoundsInfo, LoadStats, TreeResponse};

/// Load model `id` (whose index is `index_name`) from `root` and summarize it.
pub fn load_summary(
    root: &Path,
    id: &str,
    index_name: &str,
    max_workers: usize,
) -> Result<TreeResponse, ApiError> {
    let start = Instant::now();
    let config = LoaderConfig::default().with_max_workers(max_workers);
    let mut loader = DataLoader::new(config, Arc::new(FsFetcher::new(root)))?;

    let failures: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = Rc::clone(&failures);
    loader.events_mut().subscribe(move |event: &LoaderEvent| {
        if let LoaderEvent::LoadError { file, message } = event {
            sink.borrow_mut().push(format!("{}: {}", file, message));
        }
    });

    let document = loader.load(&format!("{}/{}", id, index_name), DocumentKind::Assembly)?;
    loader.wait();

    let assembly = loader
        .assembly(document)
        .ok_or_else(|| ApiError::Internal(format!("Model {} vanished while loading", id)))?;

    let failures = failures.borrow().clone();
    let mut stats = count(assembly);
    stats.failures = failures.len();
    stats.load_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        model = %id,
        products = stats.products,
        shapes = stats.shapes,
        shells = stats.shells,
        shells_loaded = stats.shells_loaded,
        failures = stats.failures,
        load_time_ms = stats.load_time_ms,
        "Model loaded"
    );

    Ok(TreeResponse {
        name: assembly.name().to_string(),
        tree: assembly.get_tree(),
        bounding_box: BoundsInfo::from_box(&assembly.get_bounding_box()),
        stats,
        errors: failures,
    })
}

fn count(assembly: &Assembly) -> LoadStats {
    let (instances, shapes) = assembly
        .shapes()
        .fold((0, 0), |(i, s), (_, shape)| if shape.is_instance() { (i + 1, s) } else { (i, s + 1) });
    LoadStats {
        products: assembly.products().count(),
        shapes,
        instances,
        shells: assembly.shells().count(),
        shells_loaded: assembly.shells().filter(|(_, s)| s.is_loaded()).count(),
        annotations: assembly.annotations().count(),
        annotations_loaded: assembly.annotations().filter(|(_, a)| a.is_loaded()).count(),
        failures: 0,
        load_time_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::widget_store;

    #[test]
    fn test_widget_summary() {
        let root = widget_store("summary");
        let summary = load_summary(&root, "widget", "index.json", 2).unwrap();

        assert_eq!(summary.name, "Widget");
        assert_eq!(summary.tree.id, "id0");
        assert_eq!(summary.tree.node_count(), 3);
        assert!(summary.tree.find("S0").is_some());

        assert_eq!(summary.stats.products, 1);
        assert_eq!(summary.stats.shapes, 3);
        assert_eq!(summary.stats.instances, 0);
        assert_eq!((summary.stats.shells, summary.stats.shells_loaded), (1, 1));
        assert_eq!((summary.stats.annotations, summary.stats.annotations_loaded), (1, 1));
        assert!(summary.errors.is_empty());
        assert!(summary.bounding_box.is_some());

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_missing_shell_is_reported_not_fatal() {
        let root = widget_store("summary-missing");
        std::fs::remove_file(root.join("widget/shell_SH1.json")).unwrap();

        let summary = load_summary(&root, "widget", "index.json", 2).unwrap();
        assert_eq!(summary.stats.shells_loaded, 0);
        assert_eq!(summary.stats.failures, 1);
        assert!(summary.errors[0].starts_with("shell_SH1.json"));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_missing_index_is_an_error() {
        let root = widget_store("summary-noindex");
        let err = load_summary(&root, "widget", "index.xml", 2).unwrap_err();
        assert!(matches!(err, ApiError::Load(_)));

        std::fs::remove_dir_all(&root).unwrap();
    }
}
