//! tof-codec: decoder, checker and compressor for raw TOF readout data
//!
//! The raw stream (CRU pages carrying DRM/TRM words) is decoded one event at
//! a time into a [`raw::Summary`], checked for protocol consistency, its hits
//! paired into leading edges with a time-over-threshold, and re-encoded into
//! the denser compressed format.

pub mod common;
pub mod compressed;
pub mod config;
pub mod converter;
pub mod emulator;
pub mod raw;
