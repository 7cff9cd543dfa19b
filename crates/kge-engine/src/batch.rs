//! Mini-batch generation for training.
//!
//! Each epoch shuffles the training split, cuts it into contiguous groups of
//! `batch_size` positives (the last group may be smaller) and attaches `k`
//! negatives to every positive.
//!
//! # Pipelining
//!
//! Batches are assembled on a worker thread and handed over through a
//! zero-capacity channel. While the training step consumes batch `i`, the
//! worker builds batch `i + 1` and then blocks until it is taken, so exactly
//! one batch is ever in preparation and memory stays O(batch_size * k)
//! regardless of epoch length.
//!
//! ```text
//! worker:    [build 0]──send──[build 1]──────send──[build 2]───send─...
//! consumer:             recv──[train 0]───recv──[train 1]───recv─...
//! ```
//!
//! [`BatchGenerator::epoch`] borrows the generator mutably, so one generator
//! never runs two epochs (and two shuffles) at once.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;

use crate::cancel::CancelToken;
use crate::config::BatchConfig;
use crate::error::{Error, Result};
use crate::sampler::NegativeSampler;
use crate::store::TripleStore;
use crate::triple::{Split, Triple};

/// A positive triple and the negatives sampled for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositiveGroup {
    pub positive: Triple,
    pub negatives: Vec<Triple>,
}

impl PositiveGroup {
    /// (positive, negative) pairs, as consumed by margin ranking losses.
    pub fn pairs(&self) -> impl Iterator<Item = (Triple, Triple)> + '_ {
        self.negatives.iter().map(move |&n| (self.positive, n))
    }
}

/// One training step's worth of positives with their negatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Position of this batch within its epoch.
    pub index: usize,
    pub groups: Vec<PositiveGroup>,
    /// `k` as configured.
    pub requested_negatives: usize,
    /// Groups that received fewer than `requested_negatives` negatives.
    pub underfilled: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn positives(&self) -> impl Iterator<Item = Triple> + '_ {
        self.groups.iter().map(|g| g.positive)
    }

    /// All (positive, negative) pairs in group order.
    pub fn pairs(&self) -> impl Iterator<Item = (Triple, Triple)> + '_ {
        self.groups.iter().flat_map(PositiveGroup::pairs)
    }

    pub fn negative_count(&self) -> usize {
        self.groups.iter().map(|g| g.negatives.len()).sum()
    }

    pub fn is_underfilled(&self) -> bool {
        self.underfilled > 0
    }
}

/// Aggregate bookkeeping for one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochReport {
    /// Zero-based epoch number within the generator.
    pub epoch: usize,
    pub expected_batches: usize,
    pub batches: usize,
    pub positives: usize,
    pub negatives: usize,
    pub underfilled_groups: usize,
    pub underfilled_batches: usize,
    pub cancelled: bool,
}

impl EpochReport {
    /// Every batch was delivered.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.batches == self.expected_batches
    }
}

/// Produces shuffled epochs of batches over the training split.
pub struct BatchGenerator {
    store: Arc<TripleStore>,
    config: BatchConfig,
    rng: XorShiftRng,
    epochs_started: usize,
    cancel: CancelToken,
}

impl BatchGenerator {
    /// `seed` makes the whole sequence of epochs reproducible.
    pub fn new(store: Arc<TripleStore>, config: BatchConfig, seed: u64) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            rng: XorShiftRng::seed_from_u64(seed),
            epochs_started: 0,
            cancel: CancelToken::new(),
        })
    }

    /// Stop epochs between batches once `token` is cancelled.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Batches per epoch: ceil(train / batch_size).
    pub fn batch_count(&self) -> usize {
        self.store.len(Split::Train).div_ceil(self.config.batch_size)
    }

    pub fn epochs_started(&self) -> usize {
        self.epochs_started
    }

    /// Start a fresh shuffled pass over the training split.
    ///
    /// Fails with [`Error::Cancelled`] if the token is already cancelled.
    pub fn epoch(&mut self) -> Result<Epoch<'_>> {
        self.cancel.check()?;

        let epoch = self.epochs_started;
        self.epochs_started += 1;
        let seed: u64 = self.rng.gen();

        let (tx, rx) = bounded(0);
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let cancel = self.cancel.clone();
        let assembled = Arc::new(AtomicUsize::new(0));
        let worker_assembled = Arc::clone(&assembled);

        let worker = std::thread::Builder::new()
            .name(format!("kge-batch-{epoch}"))
            .spawn(move || {
                let assembler = Worker {
                    store: &store,
                    config: &config,
                    cancel: &cancel,
                    assembled: &worker_assembled,
                };
                assembler.run(seed, &tx)
            })
            .map_err(|e| Error::Worker(e.to_string()))?;

        Ok(Epoch {
            rx: Some(rx),
            worker: Some(worker),
            cancel: self.cancel.clone(),
            assembled,
            report: EpochReport {
                epoch,
                expected_batches: self.batch_count(),
                ..EpochReport::default()
            },
            worker_panicked: false,
            _generator: PhantomData,
        })
    }
}

/// Batch assembly state borrowed by the worker thread.
struct Worker<'w> {
    store: &'w TripleStore,
    config: &'w BatchConfig,
    cancel: &'w CancelToken,
    assembled: &'w AtomicUsize,
}

impl Worker<'_> {
    fn run(&self, seed: u64, tx: &Sender<Batch>) {
        let (store, config) = (self.store, self.config);
        let mut rng = XorShiftRng::seed_from_u64(seed);
        let train = store.split(Split::Train);

        let mut order: Vec<usize> = (0..train.len()).collect();
        order.shuffle(&mut rng);

        let sampler = NegativeSampler::new(store).with_retry_factor(config.retry_factor);

        for (index, chunk) in order.chunks(config.batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                return;
            }

            let mut underfilled = 0;
            let groups = chunk
                .iter()
                .map(|&i| {
                    let positive = train[i];
                    let outcome = sampler.sample(
                        positive,
                        config.negatives,
                        config.mode,
                        config.filter_policy,
                        &mut rng,
                    );
                    if !outcome.is_complete() {
                        underfilled += 1;
                    }
                    PositiveGroup {
                        positive,
                        negatives: outcome.negatives,
                    }
                })
                .collect();

            let batch = Batch {
                index,
                groups,
                requested_negatives: config.negatives,
                underfilled,
            };
            self.assembled.fetch_add(1, Ordering::Release);

            // The consumer hung up: epoch dropped early.
            if tx.send(batch).is_err() {
                return;
            }
        }
    }
}

/// A lazy, finite pass over the training split.
///
/// Yields [`Batch`]es in shuffled order. Dropping it early stops and joins
/// the worker.
///
/// If the worker thread panics, iteration simply ends early. Call
/// [`finish`](Epoch::finish) to tell a short epoch apart from a failed one:
/// it returns [`Error::Worker`] in that case.
pub struct Epoch<'a> {
    rx: Option<Receiver<Batch>>,
    worker: Option<JoinHandle<()>>,
    cancel: CancelToken,
    /// Batches the worker has finished building, delivered or not.
    assembled: Arc<AtomicUsize>,
    report: EpochReport,
    worker_panicked: bool,
    _generator: PhantomData<&'a mut BatchGenerator>,
}

impl Epoch<'_> {
    /// Bookkeeping for the batches yielded so far.
    pub fn report(&self) -> EpochReport {
        self.report
    }

    /// Batches built by the worker so far, including the one waiting to be
    /// taken. Never more than one ahead of the batches yielded.
    pub fn assembled(&self) -> usize {
        self.assembled.load(Ordering::Acquire)
    }

    /// Stop the worker and return the final report.
    ///
    /// Fails with [`Error::Worker`] if the worker thread panicked.
    pub fn finish(mut self) -> Result<EpochReport> {
        self.shutdown();
        if self.worker_panicked {
            return Err(Error::Worker(format!(
                "batch preparation for epoch {} panicked",
                self.report.epoch
            )));
        }
        Ok(self.report)
    }

    fn shutdown(&mut self) {
        // Disconnect first so a worker blocked in `send` wakes up.
        self.rx.take();
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.report.cancelled =
            self.cancel.is_cancelled() && self.report.batches < self.report.expected_batches;
        if handle.join().is_err() {
            log::warn!("batch worker for epoch {} panicked", self.report.epoch);
            self.worker_panicked = true;
        }
    }

    fn record(&mut self, batch: &Batch) {
        self.report.batches += 1;
        self.report.positives += batch.len();
        self.report.negatives += batch.negative_count();
        self.report.underfilled_groups += batch.underfilled;
        if batch.is_underfilled() {
            self.report.underfilled_batches += 1;
            log::debug!(
                "epoch {} batch {}: {}/{} positives short of {} negatives",
                self.report.epoch,
                batch.index,
                batch.underfilled,
                batch.len(),
                batch.requested_negatives
            );
        }
    }
}

impl Iterator for Epoch<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cancel.is_cancelled() {
            self.shutdown();
            return None;
        }
        let received = self.rx.as_ref()?.recv();
        match received {
            Ok(batch) => {
                self.record(&batch);
                Some(batch)
            }
            Err(_) => {
                self.shutdown();
                None
            }
        }
    }
}

impl Drop for Epoch<'_> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
