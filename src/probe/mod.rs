//! Probe measurements and visit records at the ingestion boundary.

mod types;

pub use types::{
    parse_visit_line, ProbeResult, RawProbe, RawVisit, SuspicionLevel, Visit, VpnSignal,
};
