use crate::dom::TextRange;
use parking_lot::Mutex;

/// Where user text selections come from.
///
/// Both ways of highlighting reduce to the same call: selection mode highlights the live selection
/// on every mouse-up, and the quick-highlight button highlights a range remembered when the
/// button was shown. Either way the selection is cleared afterwards.
pub trait SelectionSource: Send + Sync {
    fn current(&self) -> Option<TextRange>;
    fn clear(&self);
}

/// In-process selection holder.
#[derive(Debug, Default)]
pub struct ManualSelection {
    range: Mutex<Option<TextRange>>,
}

impl ManualSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(range: TextRange) -> Self {
        ManualSelection {
            range: Mutex::new(Some(range)),
        }
    }

    pub fn set(&self, range: TextRange) {
        *self.range.lock() = Some(range);
    }

    pub fn take(&self) -> Option<TextRange> {
        self.range.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.range.lock().is_none()
    }
}

impl SelectionSource for ManualSelection {
    fn current(&self) -> Option<TextRange> {
        *self.range.lock()
    }

    fn clear(&self) {
        self.range.lock().take();
    }
}
