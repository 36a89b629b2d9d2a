/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Supporting pieces of the delivery engine.

pub mod background_tasks;
pub mod event_bus;
pub mod filters;
pub mod notifications;
pub mod signing;
