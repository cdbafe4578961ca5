// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[cfg(any(feature = "metrics", test))]
pub(crate) const ENTITY_TYPE_NAME: &str = "cachetree.entity_type";

#[cfg(any(feature = "metrics", test))]
pub(crate) const OPERATION_NAME: &str = "cachetree.operation";

#[cfg(any(feature = "metrics", test))]
pub(crate) const ACTIVITY_NAME: &str = "cachetree.activity";

#[cfg(test)]
pub(crate) const KEYS_NAME: &str = "cachetree.keys";

#[cfg(test)]
pub(crate) const EVENT_NAME: &str = "cachetree.event";
