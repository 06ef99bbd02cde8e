//! Prefetching sample loader.
//!
//! Worker threads decode samples ahead of the evaluation loop; results are
//! handed out strictly in manifest order.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use crossbeam_channel::Receiver;

use crate::common::Sample;
use crate::dataset::ValDataset;

type Loaded = (usize, Result<Sample>);

pub struct Loader {
    rx: Option<Receiver<Loaded>>,
    workers: Vec<JoinHandle<()>>,
    pending: BTreeMap<usize, Result<Sample>>,
    next: usize,
    len: usize,
}

impl Loader {
    pub fn new(dataset: Arc<ValDataset>, num_workers: usize) -> Result<Self> {
        let len = dataset.len();
        let num_workers = num_workers.clamp(1, len.max(1));
        let (tx, rx) = crossbeam_channel::bounded::<Loaded>(num_workers * 2);
        let cursor = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let tx = tx.clone();
            let cursor = Arc::clone(&cursor);
            let dataset = Arc::clone(&dataset);
            let handle = thread::Builder::new()
                .name(format!("loader-{i}"))
                .spawn(move || loop {
                    let idx = cursor.fetch_add(1, Ordering::Relaxed);
                    if idx >= len {
                        break;
                    }
                    let sample = dataset.get(idx);
                    if tx.send((idx, sample)).is_err() {
                        log::trace!("loader-{i}: receiver dropped");
                        break;
                    }
                })?;
            workers.push(handle);
        }
        log::debug!("Started {num_workers} loader workers for {len} samples");

        Ok(Self {
            rx: Some(rx),
            workers,
            pending: BTreeMap::new(),
            next: 0,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Iterator for Loader {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.len {
            return None;
        }
        loop {
            if let Some(sample) = self.pending.remove(&self.next) {
                self.next += 1;
                return Some(sample);
            }
            let rx = self.rx.as_ref()?;
            match rx.recv() {
                Ok((idx, sample)) => {
                    self.pending.insert(idx, sample);
                }
                Err(_) => {
                    let idx = self.next;
                    self.next = self.len;
                    return Some(Err(anyhow::anyhow!(
                        "loader workers exited before sample {idx} was produced"
                    )));
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.len - self.next;
        (n, Some(n))
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        // unblock workers waiting on a full channel
        drop(self.rx.take());
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("A loader worker panicked");
            }
        }
    }
}
