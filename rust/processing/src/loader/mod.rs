// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Streaming data loader
//!
//! The loader owns a FIFO request queue and a fixed pool of workers. The
//! root index is fetched first; once it is parsed the assembly graph is
//! built on the calling thread and every payload it names is queued.
//! Workers fetch and decode payloads and report back over a channel; the
//! calling thread drains that channel with [`DataLoader::poll`] or
//! [`DataLoader::wait`] and attaches the buffers to the graph.
//!
//! An NC root (`state.json`) takes the same path but builds an
//! [`NcState`] and requests its shells as keyframes.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cadview_core::{DocumentKind, NcDocument, NC_STATE_FILE};
//! use cadview_processing::{DataLoader, FsFetcher, LoaderConfig};
//!
//! let mut loader = DataLoader::new(LoaderConfig::default(), Arc::new(FsFetcher::new("./data")))?;
//! let doc = loader.load("bracket/", DocumentKind::Assembly)?;
//! loader.wait();
//! println!("{}", loader.assembly(doc).unwrap().name());
//! ```

mod builder;
mod config;
mod fetch;
mod pool;
mod request;
mod worker;

pub use builder::{BuildStats, GraphBuilder, GraphOutput};
pub use config::{LoaderConfig, DEFAULT_FILE, DEFAULT_MAX_WORKERS};
pub use fetch::{Fetcher, FsFetcher, HttpFetcher, MemoryFetcher};
pub use pool::WorkerPool;
pub use request::{base_of, batch_file_name, resolve_url, root_url, short_file_name, LoadRequest, RequestTarget};
pub use worker::{Decoded, Job, MessageKind, Ticket, WorkerMessage};

use std::collections::VecDeque;
use std::sync::Arc;

use cadview_core::{DocumentKind, NcDocument, NC_STATE_FILE};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::assembly::Assembly;
use crate::error::{LoadError, Result};
use crate::events::{EventBus, LoaderEvent};
use crate::keys::DocumentKey;
use crate::nc::NcState;

/// One root load and, once its root document arrives, what it produced
#[derive(Debug)]
enum DocumentState {
    Pending,
    Ready(Box<Assembly>),
    Nc(Box<NcState>),
    Failed(LoadError),
}

#[derive(Debug)]
struct Document {
    url: String,
    state: DocumentState,
}

/// A dispatched request and the worker serving it
#[derive(Debug)]
struct InFlight {
    worker: usize,
    request: LoadRequest,
}

pub struct DataLoader {
    config: LoaderConfig,
    fetcher: Arc<dyn Fetcher>,
    pool: WorkerPool,
    queue: VecDeque<LoadRequest>,
    loading: FxHashMap<Ticket, InFlight>,
    next_ticket: Ticket,
    documents: SlotMap<DocumentKey, Document>,
    tx: UnboundedSender<WorkerMessage>,
    rx: UnboundedReceiver<WorkerMessage>,
    events: EventBus<LoaderEvent>,
}

impl DataLoader {
    pub fn new(config: LoaderConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let pool = WorkerPool::new(config.max_workers)?;
        let (tx, rx) = unbounded_channel();
        tracing::debug!(workers = pool.size(), "Data loader ready");
        Ok(Self {
            config,
            fetcher,
            pool,
            queue: VecDeque::new(),
            loading: FxHashMap::default(),
            next_ticket: 0,
            documents: SlotMap::with_key(),
            tx,
            rx,
            events: EventBus::new(),
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn events_mut(&mut self) -> &mut EventBus<LoaderEvent> {
        &mut self.events
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Load a root document and build its assembly or NC state
    ///
    /// Blocks until the root has been fetched, parsed and turned into a
    /// graph. Payload requests discovered on the way stay queued; drain
    /// them with [`poll`](Self::poll) or [`wait`](Self::wait). A failed
    /// root leaves no document behind.
    pub fn load(&mut self, url: &str, kind: DocumentKind) -> Result<DocumentKey> {
        let default_file = match kind {
            DocumentKind::Assembly => self.config.default_file.as_str(),
            DocumentKind::Nc => NC_STATE_FILE,
            _ => return Err(LoadError::UnsupportedRoot(kind)),
        };
        let url = root_url(url, default_file);
        tracing::info!(url = %url, kind = %kind, "Loading root document");
        let document = self.documents.insert(Document {
            url: url.clone(),
            state: DocumentState::Pending,
        });
        self.add_request(LoadRequest::new(document, "", url.as_str(), kind, RequestTarget::Root));
        self.run_load_queue();

        loop {
            let Some(doc) = self.documents.get(document) else {
                return Err(LoadError::Cancelled(url));
            };
            match doc.state {
                DocumentState::Ready(_) | DocumentState::Nc(_) => return Ok(document),
                DocumentState::Failed(_) => return Err(self.take_failure(document, url)),
                DocumentState::Pending => {}
            }
            self.run_load_queue();
            if self.loading.is_empty() {
                self.documents.remove(document);
                return Err(LoadError::Pool(format!("no work left while loading {}", url)));
            }
            match self.rx.blocking_recv() {
                Some(message) => self.handle_message(message),
                None => {
                    self.documents.remove(document);
                    return Err(LoadError::Pool("worker channel closed".into()));
                }
            }
        }
    }

    fn take_failure(&mut self, document: DocumentKey, url: String) -> LoadError {
        match self.documents.remove(document).map(|d| d.state) {
            Some(DocumentState::Failed(err)) => err,
            _ => LoadError::Cancelled(url),
        }
    }

    /// Queue a request and announce it
    pub fn add_request(&mut self, request: LoadRequest) {
        let file = request.file_name().to_string();
        tracing::debug!(url = %request.url, kind = %request.kind, "Queued request");
        self.queue.push_back(request);
        self.emit(LoaderEvent::AddRequest { file });
    }

    /// Dispatch queued requests, oldest first, while a worker is free
    pub fn run_load_queue(&mut self) {
        while self.pool.has_free() {
            let Some(request) = self.queue.pop_front() else {
                break;
            };
            if !self.documents.contains_key(request.document) {
                continue;
            }
            let Some(worker) = self.pool.acquire() else {
                self.queue.push_front(request);
                break;
            };
            let ticket = self.next_ticket;
            self.next_ticket += 1;

            let job = Job {
                ticket,
                worker,
                url: request.url.clone(),
                content_type: request.content_type,
                kind: request.kind,
                size_hint: request.size_hint,
                keyframe: matches!(request.target, RequestTarget::NcShell(_)),
            };
            self.loading.insert(ticket, InFlight { worker, request });

            let fetcher = Arc::clone(&self.fetcher);
            let tx = self.tx.clone();
            self.pool.spawn(move || job.run(fetcher, tx));
        }
    }

    /// Requests being served, plus queued ones unless `only_in_flight`
    pub fn queue_length(&self, only_in_flight: bool) -> usize {
        let in_flight = self.loading.len();
        if only_in_flight {
            in_flight
        } else {
            in_flight + self.queue.len()
        }
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.queue_length(false) == 0
    }

    /// Handle every worker message that has already arrived
    ///
    /// Never blocks. Returns the number of messages handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle_message(message);
            handled += 1;
        }
        handled
    }

    /// Block until nothing is queued or in flight
    pub fn wait(&mut self) {
        loop {
            self.run_load_queue();
            if self.loading.is_empty() {
                break;
            }
            match self.rx.blocking_recv() {
                Some(message) => self.handle_message(message),
                None => break,
            }
        }
    }

    /// Drop a document: queued requests are removed, in-flight results
    /// are discarded on arrival, and the assembly (if built) is returned
    pub fn cancel(&mut self, document: DocumentKey) -> Option<Assembly> {
        let removed = self.documents.remove(document)?;
        let before = self.queue.len();
        self.queue.retain(|r| r.document != document);
        tracing::info!(
            url = %removed.url,
            dropped = before - self.queue.len(),
            in_flight = self.loading.values().filter(|f| f.request.document == document).count(),
            "Cancelled document"
        );
        match removed.state {
            DocumentState::Ready(assembly) => Some(*assembly),
            _ => None,
        }
    }

    // ========================================================================
    // Documents
    // ========================================================================

    pub fn assembly(&self, document: DocumentKey) -> Option<&Assembly> {
        match &self.documents.get(document)?.state {
            DocumentState::Ready(assembly) => Some(assembly.as_ref()),
            _ => None,
        }
    }

    pub fn assembly_mut(&mut self, document: DocumentKey) -> Option<&mut Assembly> {
        match &mut self.documents.get_mut(document)?.state {
            DocumentState::Ready(assembly) => Some(assembly.as_mut()),
            _ => None,
        }
    }

    pub fn nc(&self, document: DocumentKey) -> Option<&NcState> {
        match &self.documents.get(document)?.state {
            DocumentState::Nc(state) => Some(state.as_ref()),
            _ => None,
        }
    }

    pub fn nc_mut(&mut self, document: DocumentKey) -> Option<&mut NcState> {
        match &mut self.documents.get_mut(document)?.state {
            DocumentState::Nc(state) => Some(state.as_mut()),
            _ => None,
        }
    }

    /// Hand a state delta to every NC document of its project
    ///
    /// Returns true when any of them changed and needs redrawing.
    pub fn apply_delta(&mut self, delta: &NcDocument) -> bool {
        let mut changed = false;
        for doc in self.documents.values_mut() {
            if let DocumentState::Nc(state) = &mut doc.state {
                changed |= state.apply_delta(delta);
            }
        }
        tracing::debug!(project = %delta.project, changed, "State delta applied");
        changed
    }

    /// Root URL a document was loaded from
    pub fn document_url(&self, document: DocumentKey) -> Option<&str> {
        self.documents.get(document).map(|d| d.url.as_str())
    }

    pub fn documents(&self) -> impl Iterator<Item = DocumentKey> + '_ {
        self.documents.keys()
    }

    // ========================================================================
    // Worker messages
    // ========================================================================

    fn handle_message(&mut self, message: WorkerMessage) {
        let WorkerMessage { ticket, worker, kind } = message;
        match kind {
            MessageKind::Progress(loaded) => {
                if let Some(file) = self.in_flight_file(ticket) {
                    self.emit(LoaderEvent::LoadProgress { file, loaded });
                }
            }
            MessageKind::Fetched => {
                if let Some(file) = self.in_flight_file(ticket) {
                    self.emit(LoaderEvent::LoadComplete { file });
                }
            }
            MessageKind::Done(result) => self.finish(ticket, worker, result),
        }
    }

    fn in_flight_file(&self, ticket: Ticket) -> Option<String> {
        self.loading
            .get(&ticket)
            .map(|f| f.request.file_name().to_string())
    }

    fn finish(&mut self, ticket: Ticket, worker: usize, result: Result<Decoded>) {
        let Some(InFlight { worker, request }) = self.loading.remove(&ticket) else {
            tracing::warn!(ticket, worker, "Result for unknown request");
            return;
        };
        self.pool.release(worker);
        // Refill the freed worker before touching the graph
        self.run_load_queue();

        let file = request.file_name().to_string();
        if !self.documents.contains_key(request.document) {
            tracing::debug!(file = %file, "Discarding result for cancelled document");
        } else {
            let outcome = match result {
                Ok(decoded) => {
                    self.emit(LoaderEvent::ParseComplete { file: file.clone() });
                    self.deliver(&request, worker, decoded)
                }
                Err(err) => Err(err),
            };
            if let Err(err) = outcome {
                self.fail(&request, err);
            }
        }

        self.emit(LoaderEvent::WorkerFinish { file });
        if self.is_idle() {
            self.emit(LoaderEvent::QueueEmpty);
        }
    }

    /// Attach a decoded payload to its target
    fn deliver(&mut self, request: &LoadRequest, worker: usize, decoded: Decoded) -> Result<()> {
        let file = request.file_name().to_string();
        match (request.target, decoded) {
            (RequestTarget::Root, Decoded::Index(index)) => {
                let output = GraphBuilder::new(
                    &index,
                    request.document,
                    request.child_base(),
                    self.config.default_color,
                )
                .build()?;
                if let Some(doc) = self.documents.get_mut(request.document) {
                    doc.state = DocumentState::Ready(Box::new(output.assembly));
                }
                for payload in output.requests {
                    self.add_request(payload);
                }
                self.emit(LoaderEvent::RootLoad { file });
                self.run_load_queue();
            }
            (RequestTarget::Root, Decoded::Nc(nc)) => {
                let output = NcState::build(&nc, request.document, request.child_base())?;
                if let Some(doc) = self.documents.get_mut(request.document) {
                    doc.state = DocumentState::Nc(Box::new(output.state));
                }
                for payload in output.requests {
                    self.add_request(payload);
                }
                self.emit(LoaderEvent::RootLoad { file });
                self.run_load_queue();
            }
            (RequestTarget::NcShell(key), Decoded::Keyframe(keyframe)) => {
                let state = self.ready_nc(request)?;
                if !state.load_shell(key, keyframe) {
                    tracing::warn!(file = %file, "NC shell was already loaded");
                }
                self.emit(LoaderEvent::ShellLoad { file });
            }
            (RequestTarget::NcAnnotation(key), Decoded::Annotation(geometry)) => {
                let state = self.ready_nc(request)?;
                if !state.load_annotation(key, geometry) {
                    tracing::warn!(file = %file, "NC polyline was already loaded");
                }
                self.emit(LoaderEvent::AnnotationLoad { file });
            }
            (RequestTarget::Shell(key), Decoded::Shell(geometry)) => {
                let assembly = self.ready_assembly(request)?;
                if !assembly.load_shell(key, geometry) {
                    tracing::warn!(file = %file, "Shell was already loaded");
                }
                self.emit(LoaderEvent::ShellLoad { file });
            }
            (RequestTarget::Annotation(key), Decoded::Annotation(geometry)) => {
                let assembly = self.ready_assembly(request)?;
                if !assembly.load_annotation(key, geometry) {
                    tracing::warn!(file = %file, "Annotation was already loaded");
                }
                self.emit(LoaderEvent::AnnotationLoad { file });
            }
            (RequestTarget::Batch, Decoded::Batch(shells)) => {
                let assembly = self.ready_assembly(request)?;
                let mut loaded = 0usize;
                for (id, geometry) in shells {
                    match assembly.get_child(&id).and_then(|node| node.as_shell()) {
                        Some(key) => {
                            if assembly.load_shell(key, geometry) {
                                loaded += 1;
                            }
                        }
                        None => tracing::warn!(file = %file, shell = %id, "Batch names an unknown shell"),
                    }
                }
                tracing::debug!(file = %file, loaded, "Batch loaded");
                self.emit(LoaderEvent::ShellLoad { file });
            }
            (target, _) => {
                return Err(LoadError::Worker {
                    worker,
                    message: format!("{} decoded into the wrong payload for {:?}", file, target),
                });
            }
        }
        Ok(())
    }

    fn ready_assembly(&mut self, request: &LoadRequest) -> Result<&mut Assembly> {
        self.assembly_mut(request.document)
            .ok_or_else(|| LoadError::Cancelled(request.url.clone()))
    }

    fn ready_nc(&mut self, request: &LoadRequest) -> Result<&mut NcState> {
        self.nc_mut(request.document)
            .ok_or_else(|| LoadError::Cancelled(request.url.clone()))
    }

    /// Record a failure: fatal for the root, an event for payloads
    fn fail(&mut self, request: &LoadRequest, err: LoadError) {
        let file = request.file_name().to_string();
        tracing::warn!(file = %file, error = %err, "Load failed");
        self.emit(LoaderEvent::LoadError {
            file,
            message: err.to_string(),
        });
        if request.target == RequestTarget::Root {
            if let Some(doc) = self.documents.get_mut(request.document) {
                doc.state = DocumentState::Failed(err);
            }
        }
    }

    fn emit(&mut self, event: LoaderEvent) {
        match &event {
            LoaderEvent::LoadProgress { .. } => tracing::trace!(?event, "Loader event"),
            _ => tracing::debug!(?event, "Loader event"),
        }
        self.events.emit(&event);
    }
}

impl std::fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLoader")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("queued", &self.queue.len())
            .field("in_flight", &self.loading.len())
            .field("documents", &self.documents.len())
            .finish()
    }
}
