//! Cooperative cancellation for unbounded-cost operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A cloneable cancellation flag. The attacks check it once per sampled
/// pair and the trail search once per expanded node; a tripped token makes
/// the running operation return `Error::Cancelled`.
#[derive(Clone, Default, Debug)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Requests cancellation of every operation holding a clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Returns `Error::Cancelled` if the token has been tripped.
    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_trips_all_clones() {
        let token = CancelToken::new();
        let other = token.clone();

        assert!(!other.is_cancelled());
        assert!(other.check().is_ok());

        token.cancel();
        assert!(other.is_cancelled());
        assert_eq!(other.check(), Err(Error::Cancelled));
    }
}
