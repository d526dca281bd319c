use tracing::debug;

use crate::error::{Error, Result};

use super::backend::Closeable;

/// Session slot holding at most one live handle.
///
/// `release` surfaces close errors; `release_quietly` logs them at debug and
/// moves on. Either way the slot is empty afterwards.
pub struct Slot<T: ?Sized> {
    role: &'static str,
    handle: Option<Box<T>>,
}

impl<T: ?Sized + Closeable> Slot<T> {
    pub fn empty(role: &'static str) -> Self {
        Self { role, handle: None }
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn get(&self) -> Result<&T> {
        self.handle.as_deref().ok_or(Error::NotConnected)
    }

    /// Store `handle`, quietly releasing whatever was held before
    pub async fn replace(&mut self, handle: Box<T>) {
        self.release_quietly().await;
        self.handle = Some(handle);
    }

    pub async fn release(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(mut handle) => {
                handle.close().await?;
                debug!(role = self.role, "Closed Doris handle");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub async fn release_quietly(&mut self) {
        if let Err(e) = self.release().await {
            debug!(role = self.role, error = %e, "Ignoring close error");
        }
    }
}

/// Close a handle that is not kept in a slot, ignoring failures
pub async fn close_quietly<T: ?Sized + Closeable>(handle: &mut T, role: &'static str) {
    match handle.close().await {
        Ok(()) => debug!(role, "Closed Doris handle"),
        Err(e) => debug!(role, error = %e, "Ignoring close error"),
    }
}
