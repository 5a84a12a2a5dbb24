//! Render worker - owns the open document on a dedicated thread
//!
//! All engine calls happen here. The session thread only exchanges
//! [`RenderRequest`]s and [`RenderResponse`]s with it, so the session state is
//! never touched by more than one thread.

use std::io;
use std::thread::JoinHandle;

use flume::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use super::engine::{DocumentEngine, EngineDocument};
use super::renderer::{RenderOutcome, render_page};
use super::request::{CancelToken, RenderFault, RenderRequest, RenderResponse};

/// Worker thread setup, passed explicitly when a session is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Stack size for the worker thread, platform default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_size_kb: Option<usize>,
}

fn default_thread_name() -> String {
    "pdfpane-render".to_string()
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            stack_size_kb: None,
        }
    }
}

/// Spawn the worker thread
pub fn spawn_worker<E: DocumentEngine>(
    engine: E,
    config: &WorkerConfig,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    cancel: CancelToken,
) -> io::Result<JoinHandle<()>> {
    let mut builder = std::thread::Builder::new().name(config.thread_name.clone());
    if let Some(kb) = config.stack_size_kb {
        builder = builder.stack_size(kb * 1024);
    }
    builder.spawn(move || render_worker(engine, requests, responses, cancel))
}

/// Main worker function - runs in a dedicated thread
pub fn render_worker<E: DocumentEngine>(
    mut engine: E,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    cancel: CancelToken,
) {
    let mut doc: Option<Box<dyn EngineDocument>> = None;

    for request in requests {
        let response = match request {
            RenderRequest::Open { id, source } => {
                // Drop the previous handle before opening the next one
                doc = None;
                match engine.open(&source) {
                    Ok(opened) => {
                        let page_count = opened.page_count();
                        log::debug!("Worker opened {} ({page_count} pages)", source.label());
                        doc = Some(opened);
                        RenderResponse::Opened { id, page_count }
                    }
                    Err(e) => {
                        log::warn!("Worker failed to open {}: {e}", source.label());
                        RenderResponse::OpenFailed {
                            id,
                            error: e.into(),
                        }
                    }
                }
            }

            RenderRequest::Page { id, params } => match doc.as_deref() {
                None => RenderResponse::Error {
                    id,
                    error: RenderFault::NoDocument,
                },
                Some(doc) => match render_page(doc, id, &params, &cancel) {
                    Ok(RenderOutcome::Rendered(page)) => RenderResponse::Page {
                        id,
                        page: Box::new(page),
                    },
                    Ok(RenderOutcome::Cancelled(stage)) => RenderResponse::Cancelled { id, stage },
                    Err(error) => RenderResponse::Error { id, error },
                },
            },

            RenderRequest::Shutdown => break,
        };

        if responses.send(response).is_err() {
            // Session is gone
            break;
        }
    }

    log::trace!("Render worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::link_service::ExternalLinkTarget;
    use crate::pdf::request::{RenderParams, RequestId};
    use crate::pdf::scale::DisplayMode;
    use crate::pdf::types::ContainerSize;
    use crate::test_utils::ScriptedEngine;

    fn page_params(page: usize) -> RenderParams {
        RenderParams {
            page,
            previous_scale: 1.0,
            container: ContainerSize::new(612, 792),
            mode: DisplayMode::Normal,
            link_target: ExternalLinkTarget::Blank,
        }
    }

    fn run(engine: ScriptedEngine, requests: Vec<RenderRequest>) -> Vec<RenderResponse> {
        let (req_tx, req_rx) = flume::unbounded();
        let (resp_tx, resp_rx) = flume::unbounded();
        for request in requests {
            req_tx.send(request).expect("queue request");
        }
        req_tx.send(RenderRequest::Shutdown).expect("queue shutdown");
        render_worker(engine, req_rx, resp_tx, CancelToken::new());
        resp_rx.drain().collect()
    }

    #[test]
    fn render_without_document_reports_no_document() {
        let responses = run(
            ScriptedEngine::with_page_count(1),
            vec![RenderRequest::Page {
                id: RequestId::new(1),
                params: page_params(1),
            }],
        );
        assert!(matches!(
            responses.as_slice(),
            [RenderResponse::Error {
                error: RenderFault::NoDocument,
                ..
            }]
        ));
    }

    #[test]
    fn open_then_render() {
        let responses = run(
            ScriptedEngine::with_page_count(3),
            vec![
                RenderRequest::Open {
                    id: RequestId::new(1),
                    source: ScriptedEngine::source("a.pdf"),
                },
                RenderRequest::Page {
                    id: RequestId::new(2),
                    params: page_params(3),
                },
            ],
        );
        assert!(matches!(
            responses[0],
            RenderResponse::Opened { page_count: 3, .. }
        ));
        match &responses[1] {
            RenderResponse::Page { id, page } => {
                assert_eq!(*id, RequestId::new(2));
                assert_eq!(page.page, 3);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[test]
    fn failed_open_drops_previous_document() {
        let engine = ScriptedEngine::empty()
            .with_document("good.pdf", vec![crate::test_utils::ScriptedPage::letter()]);
        let responses = run(
            engine,
            vec![
                RenderRequest::Open {
                    id: RequestId::new(1),
                    source: ScriptedEngine::source("good.pdf"),
                },
                RenderRequest::Open {
                    id: RequestId::new(2),
                    source: ScriptedEngine::source("missing.pdf"),
                },
                RenderRequest::Page {
                    id: RequestId::new(3),
                    params: page_params(1),
                },
            ],
        );
        assert!(matches!(responses[1], RenderResponse::OpenFailed { .. }));
        assert!(matches!(
            responses[2],
            RenderResponse::Error {
                error: RenderFault::NoDocument,
                ..
            }
        ));
    }
}
