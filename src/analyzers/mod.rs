//! Ghost trip detection and congestion zone compliance.
//!
//! This module classifies trips with rule predicates, audits surcharge
//! compliance on trips entering the zone, and runs both over chunks of a
//! table with mergeable aggregates so chunked and whole-table runs agree.

pub mod analyzer;
pub mod ghost;
pub mod types;
pub mod utility;
pub mod zone;
