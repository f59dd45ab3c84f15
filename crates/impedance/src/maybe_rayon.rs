//! rayon when the `parallel` feature is on, plain iterators otherwise.
//!
//! Kernels call `into_par_iter()` on row/column ranges; without the feature
//! that resolves to `into_iter()` and the rest of the chain (`map`,
//! `flat_map`, `collect`) runs on `std::iter::Iterator`.

#[cfg(feature = "parallel")]
pub use rayon::prelude::*;

/// Number of worker threads kernels will fan out to
#[cfg(feature = "parallel")]
pub fn worker_count() -> usize {
    rayon::current_num_threads()
}

#[cfg(not(feature = "parallel"))]
pub fn worker_count() -> usize {
    1
}

#[cfg(not(feature = "parallel"))]
mod sequential {
    /// Stand-in for `rayon::iter::IntoParallelIterator`
    pub trait IntoParallelIterator {
        type Iter: Iterator<Item = Self::Item>;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;

        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "parallel"))]
pub use sequential::*;
