//! The core pipeline: quality codec, SAM/CIGAR projection, mate merging,
//! fingerprinting, barcode policy and family consensus. Everything in this
//! module is pure and has no I/O dependency; see [`crate::io`] and
//! [`crate::processes::consensus`] for the boundary and driver.

pub mod family;
pub mod fingerprint;
pub mod mate_merge;
pub mod quality;
pub mod sam;
