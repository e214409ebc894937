//! Crate-internal logging.
//!
//! With the `defmt` feature the macros forward to `defmt`; without it they
//! compile to nothing so the smallest targets pay no formatting cost.

#![allow(unused_macros)]

#[cfg(feature = "defmt")]
macro_rules! trace_log {
    ($($arg:tt)*) => { defmt::trace!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "defmt")]
macro_rules! debug_log {
    ($($arg:tt)*) => { defmt::debug!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "defmt")]
macro_rules! warn_log {
    ($($arg:tt)*) => { defmt::warn!($($arg)*) };
}

#[cfg(not(feature = "defmt"))]
macro_rules! warn_log {
    ($($arg:tt)*) => {};
}

pub(crate) use {debug_log, trace_log, warn_log};
