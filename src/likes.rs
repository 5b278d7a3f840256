use std::sync::atomic::AtomicBool;

use parking_lot::Mutex;

use crate::error::ApiError;
use crate::feed::InFlight;
use crate::model::LikeState;

/// Like button state for one article or product.
///
/// A toggle already in flight swallows further presses. The state only ever
/// changes to what the server returned; a failed toggle leaves it as it was.
#[derive(Debug)]
pub struct LikeToggle {
    state: Mutex<LikeState>,
    busy: AtomicBool,
}

impl LikeToggle {
    pub fn new(initial: LikeState) -> Self {
        Self {
            state: Mutex::new(initial),
            busy: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LikeState {
        *self.state.lock()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Runs `request` unless a toggle is already running. Returns `Ok(None)`
    /// when the press was ignored.
    pub fn toggle<F>(&self, request: F) -> Result<Option<LikeState>, ApiError>
    where
        F: FnOnce() -> Result<LikeState, ApiError>,
    {
        let Some(_in_flight) = InFlight::acquire(&self.busy) else {
            return Ok(None);
        };
        let next = request()?;
        *self.state.lock() = next;
        Ok(Some(next))
    }
}
