use crate::StateError;

/// A range-scan cursor over `(key, value)` pairs.
///
/// Open cursors may pin resources in the backing store, so they carry an
/// explicit `close`. Wrap them in a [`ScanGuard`] rather than calling `close`
/// by hand.
pub trait StateIterator: Iterator<Item = Result<(String, Vec<u8>), StateError>> {
    /// Release the cursor. Items must not be requested afterwards.
    fn close(&mut self) -> Result<(), StateError>;
}

/// Owns a scan cursor and closes it exactly once.
///
/// [`ScanGuard::finish`] closes on the normal path and reports the close
/// result. Any other exit (an early `?` return, a panic, or simply dropping
/// the guard half-way) closes it in `Drop`, where a close failure can only be
/// logged.
pub struct ScanGuard<I: StateIterator> {
    iter: I,
    closed: bool,
}

impl<I: StateIterator> ScanGuard<I> {
    /// Take ownership of an open cursor.
    pub fn new(iter: I) -> Self {
        Self {
            iter,
            closed: false,
        }
    }

    /// Close the cursor and surface any close error.
    pub fn finish(mut self) -> Result<(), StateError> {
        self.closed = true;
        self.iter.close()
    }
}

impl<I: StateIterator> Iterator for ScanGuard<I> {
    type Item = Result<(String, Vec<u8>), StateError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        self.iter.next()
    }
}

impl<I: StateIterator> Drop for ScanGuard<I> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.iter.close() {
            tracing::warn!(error = %e, "failed to close world state scan");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counted {
        items: std::vec::IntoIter<(String, Vec<u8>)>,
        closes: Rc<Cell<u32>>,
        fail_close: bool,
    }

    impl Counted {
        fn new(n: usize, closes: Rc<Cell<u32>>) -> Self {
            let items: Vec<_> = (0..n).map(|i| (format!("k{i}"), vec![i as u8])).collect();
            Self {
                items: items.into_iter(),
                closes,
                fail_close: false,
            }
        }
    }

    impl Iterator for Counted {
        type Item = Result<(String, Vec<u8>), StateError>;

        fn next(&mut self) -> Option<Self::Item> {
            self.items.next().map(Ok)
        }
    }

    impl StateIterator for Counted {
        fn close(&mut self) -> Result<(), StateError> {
            self.closes.set(self.closes.get() + 1);
            if self.fail_close {
                Err(StateError::Backend("close failed".into()))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn finish_closes_once() {
        let closes = Rc::new(Cell::new(0));
        let mut guard = ScanGuard::new(Counted::new(3, closes.clone()));
        assert_eq!(guard.by_ref().count(), 3);
        guard.finish().unwrap();
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn drop_closes_abandoned_scan() {
        let closes = Rc::new(Cell::new(0));
        {
            let mut guard = ScanGuard::new(Counted::new(5, closes.clone()));
            let _first = guard.next();
        }
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn finish_reports_close_error() {
        let closes = Rc::new(Cell::new(0));
        let mut inner = Counted::new(1, closes.clone());
        inner.fail_close = true;
        let guard = ScanGuard::new(inner);
        assert!(guard.finish().is_err());
        assert_eq!(closes.get(), 1);
    }

    #[test]
    fn drop_swallows_close_error() {
        let closes = Rc::new(Cell::new(0));
        let mut inner = Counted::new(1, closes.clone());
        inner.fail_close = true;
        drop(ScanGuard::new(inner));
        assert_eq!(closes.get(), 1);
    }
}
