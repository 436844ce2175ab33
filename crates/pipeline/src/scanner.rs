//! Streaming backup scanner.
//!
//! [`scan`] reads an entity-engine XML document with quick-xml's async
//! reader and hands every top-level element to the handlers registered for
//! its tag in a [`DispatchTable`]. Only the element being dispatched is held
//! in memory, so backups far larger than RAM can be processed.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::fs::File;
use tokio::io::BufReader;

use carryover_core::external::BackupElement;
use carryover_core::progress::EntityCountProgress;

use crate::error::{HandlerError, ScanError};

/// Receives the backup elements it subscribed to, in document order.
#[async_trait]
pub trait EntityHandler: Send {
    /// Tags this handler wants to see.
    fn entity_names(&self) -> &'static [&'static str];

    async fn handle_entity(&mut self, element: &BackupElement) -> Result<(), HandlerError>;

    async fn start_document(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    async fn end_document(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Handlers of one scan, indexed by tag.
pub struct DispatchTable<'h> {
    handlers: Vec<&'h mut dyn EntityHandler>,
    by_tag: HashMap<String, Vec<usize>>,
    progress: Option<&'h EntityCountProgress>,
}

impl<'h> DispatchTable<'h> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            by_tag: HashMap::new(),
            progress: None,
        }
    }

    /// Register a handler; handlers of the same tag run in registration order.
    pub fn register(&mut self, handler: &'h mut dyn EntityHandler) {
        let index = self.handlers.len();
        for name in handler.entity_names() {
            self.by_tag.entry((*name).to_string()).or_default().push(index);
        }
        self.handlers.push(handler);
    }

    /// Tick `progress` for every top-level element.
    pub fn with_progress(mut self, progress: &'h EntityCountProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    async fn dispatch(&mut self, element: &BackupElement) -> Result<bool, HandlerError> {
        if let Some(progress) = self.progress {
            progress.tick();
        }
        let Some(indices) = self.by_tag.get(&element.name) else {
            return Ok(false);
        };
        for &index in indices {
            self.handlers[index].handle_entity(element).await?;
        }
        Ok(true)
    }
}

impl Default for DispatchTable<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Top-level elements read.
    pub elements_seen: usize,
    /// Top-level elements that had at least one handler.
    pub elements_dispatched: usize,
}

/// Stream the document at `path` through `table`.
pub async fn scan(path: &Path, table: &mut DispatchTable<'_>) -> Result<ScanSummary, ScanError> {
    let file = File::open(path).await.map_err(|source| ScanError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    // Text is kept untrimmed; only text inside a child element is collected.
    let mut reader = Reader::from_reader(BufReader::new(file));

    for handler in table.handlers.iter_mut() {
        handler.start_document().await?;
    }

    let mut summary = ScanSummary::default();
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut current: Option<BackupElement> = None;
    // Child element of `current` whose text is being collected.
    let mut child: Option<(String, String)> = None;

    loop {
        match reader.read_event_into_async(&mut buf).await? {
            Event::Start(start) => {
                depth += 1;
                match depth {
                    1 => root_seen = true,
                    2 => current = Some(element_from_start(&start)?),
                    3 => child = Some((tag_name(&start), String::new())),
                    _ => {}
                }
            }
            Event::Empty(start) => match depth {
                0 => root_seen = true,
                1 => {
                    let element = element_from_start(&start)?;
                    summary.elements_seen += 1;
                    if table.dispatch(&element).await? {
                        summary.elements_dispatched += 1;
                    }
                }
                _ => {}
            },
            Event::Text(text) => {
                if let Some((_, value)) = child.as_mut() {
                    value.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some((_, value)) = child.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                match depth {
                    3 => {
                        if let (Some(element), Some((name, value))) = (current.as_mut(), child.take()) {
                            element.attributes.insert(name, value);
                        }
                    }
                    2 => {
                        if let Some(element) = current.take() {
                            summary.elements_seen += 1;
                            if table.dispatch(&element).await? {
                                summary.elements_dispatched += 1;
                            }
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !root_seen {
        return Err(ScanError::Malformed {
            path: path.to_path_buf(),
            reason: "no root element".into(),
        });
    }
    if depth > 0 {
        return Err(ScanError::Malformed {
            path: path.to_path_buf(),
            reason: format!("document ended inside {depth} open element(s)"),
        });
    }

    for handler in table.handlers.iter_mut() {
        handler.end_document().await?;
    }

    tracing::debug!(
        path = %path.display(),
        seen = summary.elements_seen,
        dispatched = summary.elements_dispatched,
        "Scan finished"
    );
    Ok(summary)
}

fn tag_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn element_from_start(start: &BytesStart<'_>) -> Result<BackupElement, quick_xml::Error> {
    let mut element = BackupElement::new(tag_name(start));
    for attr in start.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        element.attributes.insert(key, value);
    }
    Ok(element)
}
