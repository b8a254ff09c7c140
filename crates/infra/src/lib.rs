//! Infrastructure layer: stores, ledger and scheduler services, background
//! workers.

pub mod jobs;
pub mod ledger;
pub mod workers;
