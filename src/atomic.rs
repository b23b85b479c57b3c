//! Implementation of an atomic i64 cell. On targets with 64 bit atomics, this
//! is a wrapper around `AtomicI64`. On targets without them, this is
//! implemented using a `Mutex`.

pub(crate) use self::imp::AtomicI64;

#[cfg(target_has_atomic = "64")]
mod imp {
    use std::sync::atomic::Ordering;

    #[derive(Debug)]
    pub(crate) struct AtomicI64 {
        inner: std::sync::atomic::AtomicI64,
    }

    impl AtomicI64 {
        pub(crate) fn new(val: i64) -> AtomicI64 {
            AtomicI64 {
                inner: std::sync::atomic::AtomicI64::new(val),
            }
        }

        pub(crate) fn load(&self, ordering: Ordering) -> i64 {
            self.inner.load(ordering)
        }

        pub(crate) fn store(&self, val: i64, ordering: Ordering) {
            self.inner.store(val, ordering)
        }

        pub(crate) fn swap(&self, val: i64, ordering: Ordering) -> i64 {
            self.inner.swap(val, ordering)
        }
    }
}

#[cfg(not(target_has_atomic = "64"))]
mod imp {
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    #[derive(Debug)]
    pub(crate) struct AtomicI64 {
        inner: Mutex<i64>,
    }

    impl AtomicI64 {
        pub(crate) fn new(val: i64) -> AtomicI64 {
            AtomicI64 {
                inner: Mutex::new(val),
            }
        }

        pub(crate) fn load(&self, _: Ordering) -> i64 {
            *self.inner.lock().unwrap()
        }

        pub(crate) fn store(&self, val: i64, _: Ordering) {
            *self.inner.lock().unwrap() = val;
        }

        pub(crate) fn swap(&self, val: i64, _: Ordering) -> i64 {
            let mut lock = self.inner.lock().unwrap();
            let prev = *lock;
            *lock = val;
            prev
        }
    }
}
