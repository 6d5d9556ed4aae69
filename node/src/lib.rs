// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod config;
pub mod errors;
pub mod telemetry;
pub mod retry;
pub mod signer;
pub mod channel;
pub mod ledger;
pub mod storage;
pub mod processor;
pub mod query;
pub mod checkpoint;
pub mod runtime;
pub mod load;

pub use config::LedgerConfig;
pub use errors::{LedgerError, Result};
pub use ledger::{LedgerDeps, NeuralLedger};
pub use processor::{FanOutProcessor, StoragePorts};
pub use query::QueryService;
pub use runtime::LedgerRuntime;
