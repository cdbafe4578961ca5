// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use opentelemetry::{
    InstrumentationScope,
    metrics::{Counter, Meter, MeterProvider},
};

const METER_NAME: &str = "cachetree";
const VERSION: &str = "v0.1.0";
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";
const EVENT_COUNT_NAME: &str = "cachetree.event.count";
const INVALIDATED_KEYS_NAME: &str = "cachetree.invalidated_keys";

pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
    meter_provider.meter_with_scope(
        InstrumentationScope::builder(METER_NAME)
            .with_version(VERSION)
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

pub(crate) fn create_event_counter(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter(EVENT_COUNT_NAME)
        .with_description("Cache tree events")
        .with_unit("{event}")
        .build()
}

pub(crate) fn create_invalidated_keys_counter(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter(INVALIDATED_KEYS_NAME)
        .with_description("Cache keys dropped by invalidation")
        .with_unit("{key}")
        .build()
}
