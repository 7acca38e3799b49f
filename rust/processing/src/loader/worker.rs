// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fetch-and-decode jobs
//!
//! A job runs on a pool thread. It never sees the assembly: it reads the
//! document, decodes it into buffers and reports back over the loader's
//! channel. Messages for one job arrive in order, ending with `Done`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use cadview_core::{
    parse_annotation, parse_batch, parse_shell, ContentType, DocumentKind, Error as CoreError,
    IndexDocument, NcDocument, ShellKeyframe,
};
use cadview_geometry::{AnnotationGeometry, ShellGeometry};
use tokio::sync::mpsc::UnboundedSender;

use super::fetch::Fetcher;
use super::request::short_file_name;
use crate::error::{LoadError, Result};
use crate::nc::KeyframeGeometry;

/// Identifies one dispatched request across its messages
pub type Ticket = u64;

/// Payload contents, ready to attach to the graph
#[derive(Debug)]
pub enum Decoded {
    Index(IndexDocument),
    Shell(ShellGeometry),
    Annotation(AnnotationGeometry),
    /// Shells of a batch file with the id each one belongs to
    Batch(Vec<(String, ShellGeometry)>),
    Nc(NcDocument),
    /// NC shell with the value table its deltas extend
    Keyframe(KeyframeGeometry),
}

#[derive(Debug)]
pub enum MessageKind {
    Progress(Option<f64>),
    /// The body has been read; decoding follows
    Fetched,
    Done(Result<Decoded>),
}

#[derive(Debug)]
pub struct WorkerMessage {
    pub ticket: Ticket,
    pub worker: usize,
    pub kind: MessageKind,
}

/// Everything a worker needs to serve one request
#[derive(Debug, Clone)]
pub struct Job {
    pub ticket: Ticket,
    pub worker: usize,
    pub url: String,
    pub content_type: Option<ContentType>,
    pub kind: DocumentKind,
    pub size_hint: usize,
    /// Decode a shell as an NC keyframe
    pub keyframe: bool,
}

impl Job {
    /// Fetch, decode and report; always sends exactly one `Done`
    pub fn run(self, fetcher: Arc<dyn Fetcher>, tx: UnboundedSender<WorkerMessage>) {
        let (ticket, worker) = (self.ticket, self.worker);
        let send = |kind: MessageKind| {
            // The loader may have been dropped; nothing is waiting then
            let _ = tx.send(WorkerMessage { ticket, worker, kind });
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            tracing::debug!(worker, url = %self.url, kind = %self.kind, "Fetching");
            let text = fetcher.fetch(&self.url, &mut |loaded| send(MessageKind::Progress(loaded)))?;
            send(MessageKind::Fetched);
            decode(&text, &self)
        }));

        let result = outcome.unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            Err(LoadError::Worker { worker, message })
        });
        send(MessageKind::Done(result));
    }
}

/// Decode a fetched document according to the request's expected kind
pub fn decode(text: &str, job: &Job) -> Result<Decoded> {
    let file = short_file_name(&job.url);
    let content_type = resolve_content_type(text, job.content_type, &job.url)
        .map_err(|e| LoadError::parse(file, e))?;

    match job.kind {
        DocumentKind::Assembly => IndexDocument::parse(text, content_type)
            .map(Decoded::Index)
            .map_err(|e| LoadError::parse(file, e)),
        DocumentKind::Shell if job.keyframe => {
            let keyframe = ShellKeyframe::parse(text, content_type).map_err(|e| LoadError::parse(file, e))?;
            KeyframeGeometry::from_keyframe(keyframe)
                .map(Decoded::Keyframe)
                .map_err(|e| LoadError::geometry(file, e))
        }
        DocumentKind::Shell => {
            let payload =
                parse_shell(text, content_type, job.size_hint).map_err(|e| LoadError::parse(file, e))?;
            ShellGeometry::from_payload(payload)
                .map(Decoded::Shell)
                .map_err(|e| LoadError::geometry(file, e))
        }
        DocumentKind::Annotation => parse_annotation(text, content_type)
            .map(|payload| Decoded::Annotation(AnnotationGeometry::from_payload(payload)))
            .map_err(|e| LoadError::parse(file, e)),
        DocumentKind::Batch => {
            let payloads = parse_batch(text, content_type).map_err(|e| LoadError::parse(file, e))?;
            let mut shells = Vec::with_capacity(payloads.len());
            for mut payload in payloads {
                let id = payload.id.take().unwrap_or_default();
                let geometry = ShellGeometry::from_payload(payload).map_err(|e| LoadError::geometry(file, e))?;
                shells.push((id, geometry));
            }
            Ok(Decoded::Batch(shells))
        }
        DocumentKind::Nc => NcDocument::parse(text, content_type)
            .map(Decoded::Nc)
            .map_err(|e| LoadError::parse(file, e)),
    }
}

fn resolve_content_type(
    text: &str,
    declared: Option<ContentType>,
    url: &str,
) -> std::result::Result<ContentType, CoreError> {
    if let Some(content_type) = declared {
        return Ok(content_type);
    }
    match ContentType::sniff(text) {
        Some(content_type) => {
            tracing::warn!(url, content_type = content_type.extension(), "No file extension, guessed from content");
            Ok(content_type)
        }
        None => Err(CoreError::UnknownContentType(url.to_string())),
    }
}
