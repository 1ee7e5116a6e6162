// Copyright (c) 2023 - 2025 readgate developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::future::Future;
use std::io;
use std::ops::Deref;

use bytes::Bytes;

use crate::permit::{ReadPermit, ResourceUnits};

/// The slice of the file interface that read paths run on. Implementations
/// are free to back it with anything that can serve bulk reads.
pub trait StorageFile: Send + Sync {
    fn read_bulk(
        &self,
        offset: u64,
        len: usize,
    ) -> impl Future<Output = io::Result<Bytes>> + Send;

    fn size(&self) -> impl Future<Output = io::Result<u64>> + Send;

    fn flush(&self) -> impl Future<Output = io::Result<()>> + Send;

    fn close(&self) -> impl Future<Output = io::Result<()>> + Send;
}

/// A read buffer whose memory footprint stays charged to the issuing
/// permit until the buffer is dropped.
pub struct TrackedBuffer {
    data: Bytes,
    _units: ResourceUnits,
}

impl TrackedBuffer {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

impl Deref for TrackedBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl AsRef<[u8]> for TrackedBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// Decorator that charges bulk-read buffers to a permit.
///
/// Everything except `read_bulk` is forwarded verbatim. Buffers may outlive
/// the tracking file: their accounting is bound to the permit, not to the
/// file.
pub struct TrackedFile<F> {
    inner: F,
    permit: ReadPermit,
}

impl<F: StorageFile> TrackedFile<F> {
    pub fn new(inner: F, permit: ReadPermit) -> Self {
        Self { inner, permit }
    }

    /// Reads `len` bytes at `offset`. The requested range is charged to the
    /// permit for the duration of the read; the returned buffer carries
    /// units sized to the bytes actually read.
    pub async fn read_bulk(&self, offset: u64, len: usize) -> io::Result<TrackedBuffer> {
        let _admission = self.permit.consume_memory(len as u64);
        let data = self.inner.read_bulk(offset, len).await?;
        let units = self.permit.consume_memory(data.len() as u64);
        Ok(TrackedBuffer {
            data,
            _units: units,
        })
    }

    pub async fn size(&self) -> io::Result<u64> {
        self.inner.size().await
    }

    pub async fn flush(&self) -> io::Result<()> {
        self.inner.flush().await
    }

    pub async fn close(&self) -> io::Result<()> {
        self.inner.close().await
    }

    pub fn permit(&self) -> &ReadPermit {
        &self.permit
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ReadResources;
    use crate::semaphore::ReaderSemaphore;

    struct DummyFile;

    impl StorageFile for DummyFile {
        async fn read_bulk(&self, _offset: u64, _len: usize) -> io::Result<Bytes> {
            // Always serves a full kilobyte, regardless of the requested
            // range, like a block-aligned read would.
            Ok(Bytes::from(vec![0xff; 1024]))
        }

        async fn size(&self) -> io::Result<u64> {
            Ok(0)
        }

        async fn flush(&self) -> io::Result<()> {
            Ok(())
        }

        async fn close(&self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn buffers_charge_the_permit_and_may_overdraw() {
        let semaphore = ReaderSemaphore::new(100, 4 * 1024, "file_tracking");
        {
            let permit = semaphore.make_permit(None, "file_tracking");
            let _admitted = permit.wait_admission(0, None).await.unwrap();

            let tracked = TrackedFile::new(DummyFile, permit.clone());
            assert_eq!(semaphore.available_resources().memory, 4 * 1024);

            let mut buf1 = tracked.read_bulk(0, 0).await.unwrap();
            assert_eq!(buf1.len(), 1024);
            assert_eq!(semaphore.available_resources().memory, 3 * 1024);

            let _buf2 = tracked.read_bulk(0, 0).await.unwrap();
            assert_eq!(semaphore.available_resources().memory, 2 * 1024);

            let _buf3 = tracked.read_bulk(0, 0).await.unwrap();
            assert_eq!(semaphore.available_resources().memory, 1024);

            let buf4 = tracked.read_bulk(0, 0).await.unwrap();
            assert_eq!(semaphore.available_resources().memory, 0);

            // The pool is exhausted; buffers overdraw it into the negative.
            let buf5 = tracked.read_bulk(0, 0).await.unwrap();
            assert_eq!(semaphore.available_resources().memory, -1024);

            // Reassigning a buffer keeps the same amount of units.
            buf1 = tracked.read_bulk(0, 0).await.unwrap();
            assert_eq!(semaphore.available_resources().memory, -1024);

            drop(buf1);
            assert_eq!(semaphore.available_resources().memory, 0);

            // Buffers outlive the tracking file; releasing them afterwards
            // still deposits into the permit.
            drop(tracked);
            assert_eq!(semaphore.available_resources().memory, 0);
            drop(buf4);
            assert_eq!(semaphore.available_resources().memory, 1024);

            drop(buf5);
        }

        // Everything deposited back once permits and buffers are gone.
        assert_eq!(
            semaphore.available_resources(),
            ReadResources::new(100, 4 * 1024)
        );
        semaphore.stop().await;
    }
}
