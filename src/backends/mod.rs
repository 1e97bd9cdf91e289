//! Platform input sources.
//!
//! The only real backend is Windows Raw Input; other platforms get a stub
//! [`native_source`] that fails at start-up so callers can fall back to a
//! [`ChannelSource`](crate::source::ChannelSource) (replay, tests) without
//! platform-specific code of their own.

#[cfg(target_os = "windows")]
pub mod windows;

use crate::source::SourceError;

/// Constructs the platform's raw input source.
///
/// Must be called on the thread that will pump it; the Windows source owns a
/// message-only window and is thread-affine. [`Listener::start`]
/// (crate::pump::Listener::start) arranges this when given `native_source` as
/// the factory.
#[cfg(target_os = "windows")]
pub fn native_source() -> Result<windows::WindowsSource, SourceError> {
    windows::WindowsSource::new()
}

#[cfg(not(target_os = "windows"))]
pub fn native_source() -> Result<crate::source::ChannelSource, SourceError> {
    Err(SourceError::Init(
        "no native raw input backend on this platform".into(),
    ))
}
