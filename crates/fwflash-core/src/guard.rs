//! Scoped acquire/restore
//!
//! A [`Guard`] mutably borrows some state for the duration of an operation
//! and runs a restore action when it goes out of scope, whether the
//! operation returned normally, bailed out with `?`, or panicked.

use std::ops::{Deref, DerefMut};

use crate::error::Result;

/// Borrow of `T` that runs `restore` on drop
pub struct Guard<'a, T: ?Sized, F: FnOnce(&mut T)> {
    target: &'a mut T,
    restore: Option<F>,
}

impl<'a, T: ?Sized, F: FnOnce(&mut T)> Guard<'a, T, F> {
    /// Guard `target`, which is already in the state to be undone
    pub fn new(target: &'a mut T, restore: F) -> Self {
        Self {
            target,
            restore: Some(restore),
        }
    }

    /// Run `enter` on `target` and guard it if that succeeds
    ///
    /// If `enter` fails, `restore` is not run.
    pub fn acquire(
        target: &'a mut T,
        enter: impl FnOnce(&mut T) -> Result<()>,
        restore: F,
    ) -> Result<Self> {
        enter(target)?;
        Ok(Self::new(target, restore))
    }

    /// Drop the restore action; leaving scope becomes a no-op
    pub fn disarm(&mut self) {
        self.restore = None;
    }

    pub fn is_armed(&self) -> bool {
        self.restore.is_some()
    }
}

impl<T: ?Sized, F: FnOnce(&mut T)> Deref for Guard<'_, T, F> {
    type Target = T;

    fn deref(&self) -> &T {
        self.target
    }
}

impl<T: ?Sized, F: FnOnce(&mut T)> DerefMut for Guard<'_, T, F> {
    fn deref_mut(&mut self) -> &mut T {
        self.target
    }
}

impl<T: ?Sized, F: FnOnce(&mut T)> Drop for Guard<'_, T, F> {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore(self.target);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn fails(page: &mut u8) -> Result<()> {
        let guard = Guard::acquire(
            page,
            |p| {
                *p = 7;
                Ok(())
            },
            |p: &mut u8| *p = 2,
        )?;
        assert_eq!(*guard, 7);
        Err(Error::Protocol("boom".into()))
    }

    #[test]
    fn test_restores_on_error() {
        let mut page = 2u8;
        assert!(fails(&mut page).is_err());
        assert_eq!(page, 2);
    }

    #[test]
    fn test_enter_failure_skips_restore() {
        let mut restored = false;
        let mut state = 0u8;
        {
            let result = Guard::acquire(
                &mut state,
                |_| Err(Error::transport("nope")),
                |_: &mut u8| restored = true,
            );
            assert!(result.is_err());
        }
        assert!(!restored);
    }

    #[test]
    fn test_disarm() {
        let mut value = 1u8;
        {
            let mut guard = Guard::new(&mut value, |v: &mut u8| *v = 0);
            *guard = 5;
            guard.disarm();
            assert!(!guard.is_armed());
        }
        assert_eq!(value, 5);
    }

    #[test]
    fn test_restores_on_panic() {
        let mut value = 1u8;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut guard = Guard::new(&mut value, |v: &mut u8| *v = 9);
            *guard = 3;
            panic!("interrupted");
        }));
        assert!(result.is_err());
        assert_eq!(value, 9);
    }
}
