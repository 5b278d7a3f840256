//! Incremental loading of server-ordered collections through opaque cursors.
//!
//! A [`Feed`] only ever holds a prefix of the server's ordering: pages are
//! appended after what is already loaded and the continuation cursor is
//! replaced wholesale. Local edits (prepend on create, in-place replace,
//! removal) never touch the cursor.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::data::{CommentService, Parent};
use crate::error::ApiError;
use crate::model::{Comment, CommentPage, Id};

pub const PAGE_SIZE: usize = 10;

/// Items with a stable identity inside their collection.
pub trait Keyed {
    type Key: PartialEq + Clone + fmt::Debug;

    fn key(&self) -> Self::Key;
}

impl Keyed for Comment {
    type Key = Id;

    fn key(&self) -> Id {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl From<CommentPage> for CursorPage<Comment> {
    fn from(page: CommentPage) -> Self {
        Self {
            items: page.comments,
            next_cursor: page.next_cursor,
        }
    }
}

pub trait PageSource: Send + Sync {
    type Item: Keyed + Clone + Send;

    fn fetch(&self, cursor: Option<&str>, limit: usize)
        -> Result<CursorPage<Self::Item>, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    LoadingMore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMore {
    /// Number of items appended.
    Loaded(usize),
    /// Nothing to do: no cursor, another load in flight, or the feed was
    /// reset or detached while the page was on its way.
    Skipped,
}

/// Raises a flag for the lifetime of the guard. Acquisition fails while the
/// flag is already raised.
pub(crate) struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct State<T> {
    items: Vec<T>,
    cursor: Option<String>,
    loading: bool,
    // Bumped on every initial load so late pages from before a reset are
    // dropped instead of appended.
    generation: u64,
}

pub struct Feed<S: PageSource> {
    source: S,
    page_size: usize,
    state: Mutex<State<S::Item>>,
    loading_more: AtomicBool,
    detached: AtomicBool,
}

impl<S: PageSource> Feed<S> {
    pub fn new(source: S) -> Self {
        Self::with_page_size(source, PAGE_SIZE)
    }

    pub fn with_page_size(source: S, page_size: usize) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            state: Mutex::new(State {
                items: Vec::new(),
                cursor: None,
                loading: false,
                generation: 0,
            }),
            loading_more: AtomicBool::new(false),
            detached: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn items(&self) -> Vec<S::Item> {
        self.state.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn next_cursor(&self) -> Option<String> {
        self.state.lock().cursor.clone()
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().cursor.is_some()
    }

    pub fn phase(&self) -> Phase {
        if self.state.lock().loading {
            Phase::Loading
        } else if self.loading_more.load(Ordering::Acquire) {
            Phase::LoadingMore
        } else {
            Phase::Idle
        }
    }

    /// Stops applying results. Calls still in flight finish, but their pages
    /// are discarded.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Fetches the first page and replaces whatever was loaded. On failure the
    /// feed is left empty with no cursor.
    pub fn load_initial(&self) -> Result<(), ApiError> {
        let generation = {
            let mut state = self.state.lock();
            state.loading = true;
            state.generation += 1;
            state.generation
        };

        let result = self.source.fetch(None, self.page_size);

        let mut state = self.state.lock();
        if state.generation == generation {
            state.loading = false;
        }
        if self.is_detached() || state.generation != generation {
            return result.map(|_| ());
        }
        match result {
            Ok(page) => {
                state.items = page.items;
                state.cursor = page.next_cursor;
                Ok(())
            }
            Err(err) => {
                state.items.clear();
                state.cursor = None;
                Err(err)
            }
        }
    }

    /// Appends the next page. A no-op when there is no cursor or another
    /// load-more is already running; on failure the list is left untouched.
    pub fn load_more(&self) -> Result<LoadMore, ApiError> {
        let Some(_in_flight) = InFlight::acquire(&self.loading_more) else {
            return Ok(LoadMore::Skipped);
        };
        let (cursor, generation) = {
            let state = self.state.lock();
            match (&state.cursor, state.loading) {
                (Some(cursor), false) => (cursor.clone(), state.generation),
                _ => return Ok(LoadMore::Skipped),
            }
        };

        let page = self.source.fetch(Some(&cursor), self.page_size)?;

        if self.is_detached() {
            return Ok(LoadMore::Skipped);
        }
        let mut state = self.state.lock();
        if state.generation != generation || state.cursor.as_deref() != Some(cursor.as_str()) {
            return Ok(LoadMore::Skipped);
        }
        let before = state.items.len();
        for item in page.items {
            let key = item.key();
            if !state.items.iter().any(|existing| existing.key() == key) {
                state.items.push(item);
            }
        }
        state.cursor = page.next_cursor;
        Ok(LoadMore::Loaded(state.items.len() - before))
    }

    /// Puts a freshly created item at the head of the list.
    pub fn prepend(&self, item: S::Item) {
        if self.is_detached() {
            return;
        }
        let mut state = self.state.lock();
        let key = item.key();
        state.items.retain(|existing| existing.key() != key);
        state.items.insert(0, item);
    }

    /// Swaps in an edited item at its current position. Returns false when the
    /// item is not loaded.
    pub fn replace(&self, item: S::Item) -> bool {
        if self.is_detached() {
            return false;
        }
        let mut state = self.state.lock();
        let key = item.key();
        match state.items.iter_mut().find(|existing| existing.key() == key) {
            Some(slot) => {
                *slot = item;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, key: &<S::Item as Keyed>::Key) -> bool {
        if self.is_detached() {
            return false;
        }
        let mut state = self.state.lock();
        let before = state.items.len();
        state.items.retain(|existing| &existing.key() != key);
        state.items.len() != before
    }

    /// Removes an item and, when the list has dropped below a page while more
    /// items remain on the server, tops it up with one best-effort load-more.
    pub fn remove_and_backfill(&self, key: &<S::Item as Keyed>::Key) -> bool {
        if !self.remove(key) {
            return false;
        }
        let short = {
            let state = self.state.lock();
            state.items.len() < self.page_size && state.cursor.is_some()
        };
        if short {
            if let Err(err) = self.load_more() {
                tracing::debug!(error = %err, "backfill after removal failed");
            }
        }
        true
    }
}

/// Comment thread of one article or product.
pub type CommentFeed = Feed<CommentSource>;

pub struct CommentSource {
    service: Arc<dyn CommentService>,
    parent: Parent,
}

impl CommentSource {
    pub fn new(service: Arc<dyn CommentService>, parent: Parent) -> Self {
        Self { service, parent }
    }

    pub fn parent(&self) -> Parent {
        self.parent
    }
}

impl PageSource for CommentSource {
    type Item = Comment;

    fn fetch(&self, cursor: Option<&str>, limit: usize) -> Result<CursorPage<Comment>, ApiError> {
        self.service
            .list_comments(self.parent, cursor, limit)
            .map(CursorPage::from)
    }
}

impl Feed<CommentSource> {
    pub fn for_parent(service: Arc<dyn CommentService>, parent: Parent) -> Self {
        Self::new(CommentSource::new(service, parent))
    }

    pub fn post(&self, content: &str) -> Result<Comment, ApiError> {
        let source = self.source();
        let comment = source.service.create_comment(source.parent, content)?;
        self.prepend(comment.clone());
        Ok(comment)
    }

    pub fn edit(&self, id: Id, content: &str) -> Result<Comment, ApiError> {
        let source = self.source();
        let comment = source.service.update_comment(source.parent, id, content)?;
        self.replace(comment.clone());
        Ok(comment)
    }

    /// Deletes on the server, then drops the comment locally. Backfill
    /// failures are not reported; the deletion itself succeeded.
    pub fn delete(&self, id: Id) -> Result<(), ApiError> {
        let source = self.source();
        source.service.delete_comment(source.parent, id)?;
        self.remove_and_backfill(&id);
        Ok(())
    }
}
