//! Multipath subsystem.
//!
//! # Data Flow
//! ```text
//! multipath -ll (host::multipath)
//!     → topology.rs (WWIDs, keyword errors, path counts)
//!     → Fibre Channel LUN alias, config validation, metrics
//!
//! ConnectorConfig multipath-* options
//!     → conf.rs (parse JSON sections, render drop-in)
//! ```

pub mod conf;
pub mod topology;

pub use conf::{LunAlias, MultipathContext, SectionError};
pub use topology::{parse, MultipathDevice, MultipathTopology};
