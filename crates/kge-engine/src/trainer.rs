//! Training loop driving a [`ScoringModel`] over pipelined batches.
//!
//! Per epoch: pull batches from a [`BatchGenerator`] epoch and hand each to
//! [`ScoringModel::train_step`]. Every `eval_every` epochs the model is
//! ranked on the validation split; filtered MRR drives early stopping.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::batch::BatchGenerator;
use crate::cancel::CancelToken;
use crate::config::TrainingConfig;
use crate::error::{Error, Result};
use crate::eval::{CorpusMetrics, RankEvaluator};
use crate::model::ScoringModel;
use crate::store::TripleStore;
use crate::triple::Split;

/// Validation metrics recorded after an epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationPoint {
    /// Zero-based epoch after which validation ran.
    pub epoch: usize,
    pub metrics: CorpusMetrics,
}

/// Outcome of [`Trainer::fit`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Mean batch loss per completed epoch.
    pub loss_history: Vec<f32>,
    pub validation: Vec<ValidationPoint>,
    /// Epoch with the best validation MRR, if validation ran.
    pub best_epoch: Option<usize>,
    pub best_mrr: Option<f64>,
    /// Fully completed epochs.
    pub epochs_run: usize,
    pub underfilled_batches: usize,
    pub underfilled_groups: usize,
    pub stopped_early: bool,
    pub cancelled: bool,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.loss_history.last().copied()
    }
}

/// Runs the epoch / validate / early-stop loop.
///
/// # Example
///
/// ```rust,ignore
/// use kge_engine::{Trainer, TrainingConfig};
///
/// let trainer = Trainer::new(store.clone(), TrainingConfig::default().with_epochs(50))?;
/// let report = trainer.fit(&mut model)?;
/// println!("best MRR {:?} at epoch {:?}", report.best_mrr, report.best_epoch);
/// ```
#[derive(Debug, Clone)]
pub struct Trainer {
    store: Arc<TripleStore>,
    config: TrainingConfig,
    cancel: CancelToken,
}

impl Trainer {
    pub fn new(store: Arc<TripleStore>, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Observe `token` between batches and between validation triples.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `model` in place.
    ///
    /// Cancellation is not an error: the report comes back with `cancelled`
    /// set and the model holds whatever the last finished step left in it.
    /// A non-finite batch loss aborts with [`Error::Model`].
    pub fn fit<M: ScoringModel + ?Sized>(&self, model: &mut M) -> Result<TrainingReport> {
        let mut generator = BatchGenerator::new(
            Arc::clone(&self.store),
            self.config.batch.clone(),
            self.config.seed,
        )?
        .with_cancel_token(self.cancel.clone());
        let evaluator = RankEvaluator::new(Arc::clone(&self.store), self.config.eval.clone())?
            .with_cancel_token(self.cancel.clone());

        let validate = self.config.eval_every > 0 && self.store.len(Split::Valid) > 0;
        if self.config.eval_every > 0 && !validate {
            log::warn!("validation split is empty; training without early stopping");
        }

        log::info!(
            "training {} for up to {} epochs ({} train triples, {} batches/epoch)",
            model.name(),
            self.config.epochs,
            self.store.len(Split::Train),
            generator.batch_count()
        );

        let mut report = TrainingReport::default();
        let mut evals_since_best = 0usize;

        for epoch in 0..self.config.epochs {
            let mut batches = match generator.epoch() {
                Ok(batches) => batches,
                Err(Error::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            };

            let mut loss_sum = 0.0f64;
            let mut steps = 0usize;
            for batch in &mut batches {
                let loss = model.train_step(&batch)?;
                if !loss.is_finite() {
                    return Err(Error::model(format!(
                        "non-finite loss {loss} at epoch {epoch}, batch {}",
                        batch.index
                    )));
                }
                loss_sum += f64::from(loss);
                steps += 1;
            }
            let epoch_report = batches.finish()?;

            report.underfilled_batches += epoch_report.underfilled_batches;
            report.underfilled_groups += epoch_report.underfilled_groups;
            if epoch_report.underfilled_groups > 0 {
                log::warn!(
                    "epoch {epoch}: {} positives in {} batches got fewer than {} negatives",
                    epoch_report.underfilled_groups,
                    epoch_report.underfilled_batches,
                    self.config.batch.negatives
                );
            }
            if epoch_report.cancelled {
                log::info!("training cancelled during epoch {epoch}");
                report.cancelled = true;
                break;
            }

            let mean_loss = if steps > 0 {
                (loss_sum / steps as f64) as f32
            } else {
                0.0
            };
            report.loss_history.push(mean_loss);
            report.epochs_run += 1;
            log::debug!("epoch {epoch}: loss = {mean_loss:.4}");

            if !validate || (epoch + 1) % self.config.eval_every != 0 {
                continue;
            }

            let metrics = match evaluator.evaluate(Split::Valid, &*model) {
                Ok(metrics) => metrics,
                Err(Error::Cancelled) => {
                    report.cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            };
            let mrr = metrics.mean_reciprocal_rank();
            log::info!("epoch {epoch}: loss = {mean_loss:.4}, valid MRR = {mrr:.4}");
            report.validation.push(ValidationPoint { epoch, metrics });

            if report.best_mrr.map_or(true, |best| mrr > best) {
                report.best_mrr = Some(mrr);
                report.best_epoch = Some(epoch);
                evals_since_best = 0;
            } else {
                evals_since_best += 1;
            }

            if let Some(patience) = self.config.patience {
                if evals_since_best >= patience {
                    log::info!(
                        "early stopping at epoch {epoch} (best was {:?})",
                        report.best_epoch
                    );
                    report.stopped_early = true;
                    break;
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::triple::Triple;

    /// Counts steps; reports a fixed loss and scores every triple equally.
    struct Counting {
        steps: usize,
        loss: f32,
        cancel_after: Option<(usize, CancelToken)>,
    }

    impl Counting {
        fn new(loss: f32) -> Self {
            Self {
                steps: 0,
                loss,
                cancel_after: None,
            }
        }
    }

    impl ScoringModel for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn score(&self, triples: &[Triple]) -> Result<Vec<f32>> {
            Ok(vec![0.0; triples.len()])
        }

        fn train_step(&mut self, _batch: &Batch) -> Result<f32> {
            self.steps += 1;
            if let Some((n, token)) = &self.cancel_after {
                if self.steps >= *n {
                    token.cancel();
                }
            }
            Ok(self.loss)
        }
    }

    fn store() -> Arc<TripleStore> {
        let train: Vec<Triple> = (0..6).map(|i| Triple::new(i, 0, (i + 1) % 8)).collect();
        Arc::new(TripleStore::new(8, 1, train, vec![Triple::new(6, 0, 7)], vec![]).unwrap())
    }

    fn config() -> TrainingConfig {
        TrainingConfig::default()
            .with_epochs(4)
            .with_batch_size(2)
            .with_negative_samples(1)
            .with_eval_every(0)
    }

    #[test]
    fn test_runs_every_batch_of_every_epoch() {
        let trainer = Trainer::new(store(), config()).unwrap();
        let mut model = Counting::new(0.5);
        let report = trainer.fit(&mut model).unwrap();

        assert_eq!(model.steps, 4 * 3);
        assert_eq!(report.epochs_run, 4);
        assert_eq!(report.loss_history, vec![0.5; 4]);
        assert!(report.validation.is_empty());
        assert!(!report.stopped_early && !report.cancelled);
    }

    #[test]
    fn test_early_stopping_on_flat_mrr() {
        // Constant scores never improve MRR after the first evaluation.
        let config = config()
            .with_epochs(20)
            .with_eval_every(1)
            .with_patience(Some(2));
        let trainer = Trainer::new(store(), config).unwrap();
        let report = trainer.fit(&mut Counting::new(0.1)).unwrap();

        assert!(report.stopped_early);
        assert_eq!(report.epochs_run, 3);
        assert_eq!(report.validation.len(), 3);
        assert_eq!(report.best_epoch, Some(0));
    }

    #[test]
    fn test_non_finite_loss_is_model_error() {
        let trainer = Trainer::new(store(), config()).unwrap();
        let err = trainer.fit(&mut Counting::new(f32::NAN)).unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }

    #[test]
    fn test_cancel_mid_training() {
        let token = CancelToken::new();
        let trainer = Trainer::new(store(), config().with_epochs(10))
            .unwrap()
            .with_cancel_token(token.clone());
        let mut model = Counting::new(0.2);
        model.cancel_after = Some((4, token));

        let report = trainer.fit(&mut model).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.epochs_run, 1);
        assert_eq!(model.steps, 4);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Trainer::new(store(), config().with_epochs(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
