// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured logs and OpenTelemetry metrics for cache tree operations.
//!
//! Every lookup and invalidation round is reported as one event carrying the entity type,
//! the operation and what came of it. Events go to `tracing` when logging is enabled and
//! to OpenTelemetry counters when a meter is attached (`metrics` feature).

#[cfg(any(feature = "metrics", test))]
use std::sync::Arc;

#[cfg(any(feature = "metrics", test))]
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter, MeterProvider},
};

use crate::value::EntityType;

pub(crate) mod attributes;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

/// Reports cache tree events as logs and metrics.
///
/// Disabled by default. Pass one to the cache tree builder via `.telemetry()`.
///
/// # Examples
///
/// ```
/// use cachetree::CacheTreeTelemetry;
///
/// let telemetry = CacheTreeTelemetry::new(true);
/// assert!(telemetry.is_logging_enabled());
/// assert!(!CacheTreeTelemetry::default().is_logging_enabled());
/// ```
#[derive(Clone, Debug)]
pub struct CacheTreeTelemetry {
    logging_enabled: bool,
    #[cfg(any(feature = "metrics", test))]
    instruments: Option<Arc<Instruments>>,
}

#[cfg(any(feature = "metrics", test))]
#[derive(Debug)]
struct Instruments {
    event_counter: Counter<u64>,
    invalidated_keys: Counter<u64>,
}

impl CacheTreeTelemetry {
    /// Reports nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            logging_enabled: false,
            #[cfg(any(feature = "metrics", test))]
            instruments: None,
        }
    }

    /// Reports events to `tracing` if `logging_enabled`.
    #[must_use]
    pub const fn new(logging_enabled: bool) -> Self {
        Self {
            logging_enabled,
            #[cfg(any(feature = "metrics", test))]
            instruments: None,
        }
    }

    /// Also counts events with instruments created from `meter`.
    #[cfg(any(feature = "metrics", test))]
    #[must_use]
    pub fn with_meter(mut self, meter: &Meter) -> Self {
        self.instruments = Some(Arc::new(Instruments {
            event_counter: metrics::create_event_counter(meter),
            invalidated_keys: metrics::create_invalidated_keys_counter(meter),
        }));
        self
    }

    /// Also counts events with a `cachetree` meter obtained from `meter_provider`.
    #[cfg(any(feature = "metrics", test))]
    #[must_use]
    pub fn with_meter_provider(self, meter_provider: &dyn MeterProvider) -> Self {
        self.with_meter(&metrics::create_meter(meter_provider))
    }

    /// Returns `true` if events are logged.
    #[must_use]
    pub fn is_logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    /// Records one event. `keys` is the number of cache keys the event touched.
    pub(crate) fn record(&self, entity_type: &EntityType, operation: Operation, activity: Activity, keys: usize) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(instruments) = &self.instruments {
            let attrs = [
                KeyValue::new(attributes::ENTITY_TYPE_NAME, entity_type.to_string()),
                KeyValue::new(attributes::OPERATION_NAME, operation.as_str()),
                KeyValue::new(attributes::ACTIVITY_NAME, activity.as_str()),
            ];
            instruments.event_counter.add(1, &attrs);
            if matches!(activity, Activity::Invalidated) && keys > 0 {
                instruments.invalidated_keys.add(u64::try_from(keys).unwrap_or(u64::MAX), &attrs);
            }
        }

        if self.logging_enabled {
            Self::emit(entity_type, operation, activity, keys);
        }
    }

    fn emit(entity_type: &EntityType, operation: Operation, activity: Activity, keys: usize) {
        let entity_type = entity_type.as_str();
        let op = operation.as_str();
        let ev = activity.as_str();

        // Field names must match the constants in attributes.rs.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cachetree.entity_type = entity_type,
                    cachetree.operation = op,
                    cachetree.activity = ev,
                    cachetree.keys = keys,
                    "cachetree.event"
                )
            };
        }

        match activity.severity() {
            Severity::Error => emit_event!(error),
            Severity::Info => emit_event!(info),
            Severity::Debug => emit_event!(debug),
        }
    }
}

impl Default for CacheTreeTelemetry {
    fn default() -> Self {
        Self::disabled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Get,
    GetMany,
    InvalidateInstance,
    LinkChange,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "cachetree.get",
            Self::GetMany => "cachetree.get_many",
            Self::InvalidateInstance => "cachetree.invalidate_instance",
            Self::LinkChange => "cachetree.link_change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activity {
    Hit,
    Miss,
    Stored,
    Bypassed,
    Invalidated,
    Ignored,
    Error,
}

impl Activity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cachetree.hit",
            Self::Miss => "cachetree.miss",
            Self::Stored => "cachetree.stored",
            Self::Bypassed => "cachetree.bypassed",
            Self::Invalidated => "cachetree.invalidated",
            Self::Ignored => "cachetree.ignored",
            Self::Error => "cachetree.error",
        }
    }

    fn severity(self) -> Severity {
        match self {
            Self::Hit | Self::Miss | Self::Bypassed | Self::Ignored => Severity::Debug,
            Self::Stored | Self::Invalidated => Severity::Info,
            Self::Error => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Debug,
    Info,
    Error,
}
