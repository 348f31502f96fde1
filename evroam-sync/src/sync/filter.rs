//! Filter chain
//!
//! Narrows and rewrites a batch before it leaves the adapter. Stages run in
//! a fixed order; each sees one change at a time and keeps, drops or
//! rewrites it:
//!
//! 1. connector inclusion (prunes connectors of facility records)
//! 2. facility inclusion (cascades to statuses and sessions)
//! 3. stream-specific record filter
//! 4. default operator injection
//! 5. operator name selection
//! 6. identity conversion
//! 7. record transform
//!
//! An empty result is elided by the caller. Changes keep their local key
//! whatever a stage does to the record, and filtering never adds changes.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::error::FilterError;
use crate::model::{Record, StreamKind};
use crate::policy::{
    ConnectorPredicate, DefaultOperator, FacilityPredicate, IdentityConverter,
    OperatorNameSelector, Policy, RecordPredicate, RecordTransform,
};

use super::batch::{ActionKind, Change, ChangeBatch};
use super::outcome::Warning;

/// Decision of a stage about one change
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Keep(Change),
    Drop(String),
}

/// One step of the filter chain
pub trait FilterStage: Send + Sync {
    fn name(&self) -> &str;

    /// Called once per batch before any change is seen
    fn prepare(&self, _stream: StreamKind) -> Result<(), FilterError> {
        Ok(())
    }

    /// Keep, drop or rewrite one change
    ///
    /// `FilterError::Record` drops the change; `FilterError::Misconfigured`
    /// suppresses the whole batch.
    fn apply(&self, change: Change, warnings: &mut Vec<Warning>) -> Result<Verdict, FilterError>;
}

/// Stage backed by a closure
pub struct FnStage<F> {
    name: String,
    f: F,
}

impl<F> FnStage<F>
where
    F: Fn(Change) -> Result<Verdict, FilterError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> FilterStage for FnStage<F>
where
    F: Fn(Change) -> Result<Verdict, FilterError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, change: Change, _warnings: &mut Vec<Warning>) -> Result<Verdict, FilterError> {
        (self.f)(change)
    }
}

/// Result of running a batch through the chain
#[derive(Debug, Clone)]
pub struct FilterOutput {
    /// What goes to the remote
    pub batch: ChangeBatch,
    /// Local values of the changes in `batch`, same order and keys
    pub source: ChangeBatch,
    /// Local values of the changes a stage excluded by policy
    pub dropped: Vec<Change>,
    /// Local values of the changes a stage failed or panicked on
    pub failed: Vec<Change>,
    pub warnings: Vec<Warning>,
    /// Set when a stage reported a misconfiguration
    pub fatal: Option<FilterError>,
}

impl FilterOutput {
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Ordered pipeline of filter stages
#[derive(Default)]
pub struct FilterChain {
    stages: Vec<Box<dyn FilterStage>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the default stage order from the hooks the policy sets
    pub fn from_policy(policy: &Policy) -> Self {
        let mut chain = Self::new();
        if let Some(include) = &policy.include_connector {
            chain.push(ConnectorInclusion(include.clone()));
        }
        if let Some(include) = &policy.include_facility {
            chain.push(FacilityInclusion(include.clone()));
        }
        if let Some(keep) = &policy.record_filter {
            chain.push(RecordFilter(keep.clone()));
        }
        if let Some(operator) = &policy.default_operator {
            chain.push(OperatorDefault(operator.clone()));
        }
        if let Some(select) = &policy.operator_name_selector {
            chain.push(OperatorName(select.clone()));
        }
        if let Some(convert) = &policy.identity_converter {
            chain.push(IdentityConversion(convert.clone()));
        }
        if let Some(transform) = &policy.record_transform {
            chain.push(Transform(transform.clone()));
        }
        chain
    }

    pub fn push(&mut self, stage: impl FilterStage + 'static) -> &mut Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn push_boxed(&mut self, stage: Box<dyn FilterStage>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run a batch through every stage
    pub fn apply(&self, batch: &ChangeBatch) -> FilterOutput {
        let stream = batch.stream();
        let mut warnings = Vec::new();

        for stage in &self.stages {
            if let Err(e) = stage.prepare(stream) {
                return fatal(batch, e, warnings);
            }
        }

        let mut kept = Vec::with_capacity(batch.len());
        let mut source = Vec::with_capacity(batch.len());
        let mut dropped = Vec::new();
        let mut failed = Vec::new();

        'changes: for original in batch.changes() {
            let mut current = original.clone();

            for stage in &self.stages {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    stage.apply(current.clone(), &mut warnings)
                }));

                let (reason, excluded) = match result {
                    Ok(Ok(Verdict::Keep(mut change))) => {
                        change.key = original.key.clone();
                        change.action = original.action;
                        current = change;
                        continue;
                    }
                    Ok(Ok(Verdict::Drop(reason))) => (reason, true),
                    Ok(Err(FilterError::Record { reason, .. })) => {
                        (format!("{} failed: {}", stage.name(), reason), false)
                    }
                    Ok(Err(e @ FilterError::Misconfigured { .. })) => {
                        return fatal(batch, e, warnings);
                    }
                    Err(_) => (format!("{} panicked", stage.name()), false),
                };

                debug!("Dropping {} {}: {}", stream, original.key, reason);
                warnings.push(Warning::for_record(stream, original.key.clone(), reason));
                if excluded {
                    dropped.push(original.clone());
                } else {
                    failed.push(original.clone());
                }
                continue 'changes;
            }

            kept.push(current);
            source.push(original.clone());
        }

        FilterOutput {
            batch: batch.derive(kept),
            source: batch.derive(source),
            dropped,
            failed,
            warnings,
            fatal: None,
        }
    }
}

fn fatal(batch: &ChangeBatch, error: FilterError, mut warnings: Vec<Warning>) -> FilterOutput {
    let stream = batch.stream();
    warn!("Suppressing {} batch of {}: {}", stream, batch.len(), error);
    warnings.push(Warning::new(stream, error.to_string()));
    FilterOutput {
        batch: ChangeBatch::empty(stream),
        source: ChangeBatch::empty(stream),
        dropped: Vec::new(),
        failed: Vec::new(),
        warnings,
        fatal: Some(error),
    }
}

// ============================================================================
// Built-in stages
// ============================================================================

struct ConnectorInclusion(ConnectorPredicate);

impl FilterStage for ConnectorInclusion {
    fn name(&self) -> &str {
        "connector-inclusion"
    }

    fn apply(&self, mut change: Change, warnings: &mut Vec<Warning>) -> Result<Verdict, FilterError> {
        let include = &self.0;
        match &mut change.record {
            Record::Facility(facility) => {
                let total = facility.connectors.len();
                facility.connectors.retain(|c| {
                    let keep = include(&c.id);
                    if !keep {
                        warnings.push(Warning::for_record(
                            StreamKind::Facility,
                            change.key.clone(),
                            format!("connector {} excluded by policy", c.id),
                        ));
                    }
                    keep
                });
                if total > 0 && facility.connectors.is_empty() {
                    return Ok(Verdict::Drop("all connectors excluded by policy".to_string()));
                }
                Ok(Verdict::Keep(change))
            }
            Record::Status(status) => {
                if include(&status.connector_id) {
                    Ok(Verdict::Keep(change))
                } else {
                    Ok(Verdict::Drop("connector excluded by policy".to_string()))
                }
            }
            Record::Session(session) => {
                if include(&session.connector_id) {
                    Ok(Verdict::Keep(change))
                } else {
                    Ok(Verdict::Drop("connector excluded by policy".to_string()))
                }
            }
        }
    }
}

struct FacilityInclusion(FacilityPredicate);

impl FilterStage for FacilityInclusion {
    fn name(&self) -> &str {
        "facility-inclusion"
    }

    fn apply(&self, change: Change, _warnings: &mut Vec<Warning>) -> Result<Verdict, FilterError> {
        if (self.0)(change.record.facility_id()) {
            Ok(Verdict::Keep(change))
        } else {
            Ok(Verdict::Drop(format!(
                "facility {} excluded by policy",
                change.record.facility_id()
            )))
        }
    }
}

struct RecordFilter(RecordPredicate);

impl FilterStage for RecordFilter {
    fn name(&self) -> &str {
        "record-filter"
    }

    fn apply(&self, change: Change, _warnings: &mut Vec<Warning>) -> Result<Verdict, FilterError> {
        if (self.0)(change.record.stream(), &change.record) {
            Ok(Verdict::Keep(change))
        } else {
            Ok(Verdict::Drop("rejected by record filter".to_string()))
        }
    }
}

struct OperatorDefault(DefaultOperator);

impl FilterStage for OperatorDefault {
    fn name(&self) -> &str {
        "operator-default"
    }

    fn prepare(&self, _stream: StreamKind) -> Result<(), FilterError> {
        if self.0.id.as_str().trim().is_empty() {
            return Err(FilterError::Misconfigured {
                stage: self.name().to_string(),
                reason: "default operator identity is empty".to_string(),
            });
        }
        Ok(())
    }

    fn apply(&self, mut change: Change, _warnings: &mut Vec<Warning>) -> Result<Verdict, FilterError> {
        if change.action == ActionKind::Delete {
            return Ok(Verdict::Keep(change));
        }
        match &mut change.record {
            Record::Facility(facility) if facility.operator_id.is_none() => {
                facility.operator_id = Some(self.0.id.clone());
                if facility.operator_name.is_none() {
                    facility.operator_name = Some(self.0.name.clone());
                }
            }
            Record::Session(session) if session.operator_id.is_none() => {
                session.operator_id = Some(self.0.id.clone());
            }
            _ => {}
        }
        Ok(Verdict::Keep(change))
    }
}

struct OperatorName(OperatorNameSelector);

impl FilterStage for OperatorName {
    fn name(&self) -> &str {
        "operator-name"
    }

    fn apply(&self, mut change: Change, _warnings: &mut Vec<Warning>) -> Result<Verdict, FilterError> {
        if let Record::Facility(facility) = &mut change.record {
            if facility.operator_name.is_none() {
                if let Some(operator_id) = &facility.operator_id {
                    facility.operator_name = (self.0)(operator_id);
                }
            }
        }
        Ok(Verdict::Keep(change))
    }
}

struct IdentityConversion(IdentityConverter);

impl FilterStage for IdentityConversion {
    fn name(&self) -> &str {
        "identity-converter"
    }

    fn apply(&self, mut change: Change, _warnings: &mut Vec<Warning>) -> Result<Verdict, FilterError> {
        let convert = &self.0;
        let key = change.key.clone();
        let unmapped = |id: &crate::model::ConnectorId| FilterError::Record {
            key: key.clone(),
            reason: format!("no remote identity for connector {}", id),
        };

        match &mut change.record {
            Record::Facility(facility) => {
                for connector in &mut facility.connectors {
                    connector.id = convert(&connector.id).ok_or_else(|| unmapped(&connector.id))?;
                }
            }
            Record::Status(status) => {
                status.connector_id =
                    convert(&status.connector_id).ok_or_else(|| unmapped(&status.connector_id))?;
            }
            Record::Session(session) => {
                session.connector_id =
                    convert(&session.connector_id).ok_or_else(|| unmapped(&session.connector_id))?;
            }
        }
        Ok(Verdict::Keep(change))
    }
}

struct Transform(RecordTransform);

impl FilterStage for Transform {
    fn name(&self) -> &str {
        "record-transform"
    }

    fn apply(&self, mut change: Change, _warnings: &mut Vec<Warning>) -> Result<Verdict, FilterError> {
        if change.action == ActionKind::Delete {
            return Ok(Verdict::Keep(change));
        }
        let stream = change.record.stream();
        let record = (self.0)(change.record).map_err(|reason| FilterError::Record {
            key: change.key.clone(),
            reason,
        })?;
        if record.stream() != stream {
            return Ok(Verdict::Drop(format!(
                "transform changed stream from {} to {}",
                stream,
                record.stream()
            )));
        }
        change.record = record;
        Ok(Verdict::Keep(change))
    }
}
