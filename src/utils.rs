use std::{marker::PhantomData, sync::atomic::{AtomicUsize, Ordering}};

/// Structure holding possibly uninitialized data.
///
/// Access is not synchronised in any way; instead it is assumed safe to
/// initialize the value multiple times, keeping only one result.
#[derive(Debug)]
pub struct SingleInit<T> {
    cell: AtomicUsize,
    _type: PhantomData<T>,
}

impl<T> SingleInit<T> {
    /// Create a new uninitialized atomic cell.
    pub const fn uninit() -> Self {
        SingleInit {
            cell: AtomicUsize::new(0),
            _type: PhantomData,
        }
    }
}

impl<T> SingleInit<T>
where
    T: Sync,
    Self: 'static,
{
    /// Get stored value, or `None` if it hasn't been initialized yet.
    pub fn get(&self) -> Option<&'static T> {
        let ptr = self.cell.load(Ordering::Relaxed);

        if ptr != 0 {
            Some(unsafe { &*(ptr as *const T) })
        } else {
            None
        }
    }

    /// Get stored value, initializing it if necessary.
    pub fn get_or_init<F>(&self, init: F) -> &'static T
    where
        F: FnOnce() -> T,
    {
        self.get_or_try_init::<(), _>(|| Ok(init())).unwrap()
    }

    /// Same as [`SingleInit::get_or_init`] except that the initialisation
    /// function can fail.
    ///
    /// If it does, the cell remains unchanged and another thread (or the same
    /// thread) can safely attempt to initialise it again.
    pub fn get_or_try_init<E, F>(&self, init: F) -> Result<&'static T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let ptr = self.cell.load(Ordering::Relaxed);

        if ptr != 0 {
            return Ok(unsafe { &*(ptr as *const T) });
        }

        // Create the value on the heap, keep a raw pointer to it, and prevent
        // the destructor from running until ownership is settled.
        let value = Box::leak(Box::new(init()?)) as *mut T;

        let old = self.cell.compare_and_swap(ptr, value as usize, Ordering::Relaxed);

        if old == ptr {
            // Update succeeded, value is now the content of the cell.
            Ok(unsafe { &*value })
        } else {
            // Another thread initialised the cell first; drop our copy and
            // return theirs.
            std::mem::drop(unsafe { Box::from_raw(value) });
            Ok(unsafe { &*(old as *const T) })
        }
    }
}
