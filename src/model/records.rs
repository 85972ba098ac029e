//! Lazy, one-shot scans over a partition.

use std::iter::FusedIterator;
use std::marker::PhantomData;

use super::Model;
use crate::backend::PartitionIter;
use crate::codec;
use crate::error::Result;
use crate::options::{KeyEncoding, ValueEncoding};

/// Shared scan state: applies the limit and stops for good after the first
/// error or the end of the partition.
struct Cursor {
    inner: PartitionIter,
    remaining: Option<usize>,
    finished: bool,
}

impl Cursor {
    fn new(inner: PartitionIter, limit: Option<usize>) -> Self {
        Cursor {
            inner,
            remaining: limit,
            finished: false,
        }
    }

    fn next_entry(&mut self) -> Option<Result<(Vec<u8>, Vec<u8>)>> {
        if self.finished {
            return None;
        }
        if self.remaining == Some(0) {
            self.finished = true;
            return None;
        }

        match self.inner.next() {
            None => {
                self.finished = true;
                None
            }
            Some(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            Some(Ok(entry)) => {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                Some(Ok(entry))
            }
        }
    }

    fn finish_with<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.finished = true;
        }
        result
    }
}

/// Models of one partition in store key order.
///
/// Finite and not restartable. The first error (storage or decoding) is
/// yielded once, after which the iterator ends.
pub struct Records<M> {
    cursor: Cursor,
    encoding: ValueEncoding,
    _marker: PhantomData<fn() -> M>,
}

impl<M: Model> Records<M> {
    pub(crate) fn new(inner: PartitionIter, encoding: ValueEncoding, limit: Option<usize>) -> Self {
        Records {
            cursor: Cursor::new(inner, limit),
            encoding,
            _marker: PhantomData,
        }
    }

    /// Drain the scan into a vector, failing on the first error.
    pub fn collect_all(self) -> Result<Vec<M>> {
        self.collect()
    }
}

impl<M: Model> Iterator for Records<M> {
    type Item = Result<M>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.cursor.next_entry()? {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err)),
        };
        let (_, value) = entry;
        let decoded = codec::decode_value(&value, self.encoding);
        if decoded.is_ok() {
            tracing::trace!(collection = M::COLLECTION, "scan record");
        }
        Some(self.cursor.finish_with(decoded))
    }
}

impl<M: Model> FusedIterator for Records<M> {}

/// Primary keys of one partition in store key order, decoded to text.
pub struct Keys {
    cursor: Cursor,
    encoding: KeyEncoding,
}

impl Keys {
    pub(crate) fn new(inner: PartitionIter, encoding: KeyEncoding, limit: Option<usize>) -> Self {
        Keys {
            cursor: Cursor::new(inner, limit),
            encoding,
        }
    }
}

impl Iterator for Keys {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, _) = match self.cursor.next_entry()? {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err)),
        };
        let decoded = codec::decode_key(&key, self.encoding);
        Some(self.cursor.finish_with(decoded))
    }
}

impl FusedIterator for Keys {}
